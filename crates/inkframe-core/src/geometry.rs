//! Geometry helpers shared by picking, transform sessions and tessellation.

use kurbo::{Point, Rect, Vec2};

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    point.distance(closest_point_on_segment(point, a, b))
}

/// Closest point to `point` on the segment a→b.
pub fn closest_point_on_segment(point: Point, a: Point, b: Point) -> Point {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return a;
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    a + seg * t
}

/// Minimum distance from a point to a polyline (sequence of connected segments).
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Rotate `point` around `center` by `angle` radians.
pub fn rotate_about(point: Point, center: Point, angle: f64) -> Point {
    let (sin, cos) = angle.sin_cos();
    let d = point - center;
    Point::new(
        center.x + d.x * cos - d.y * sin,
        center.y + d.x * sin + d.y * cos,
    )
}

/// Rotate a vector by `angle` radians.
pub fn rotate_vec(v: Vec2, angle: f64) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Test if any line segment (defined by consecutive points) intersects or is inside a rectangle.
pub fn polyline_intersects_rect(points: &[Point], rect: Rect) -> bool {
    if points.iter().any(|p| rect.contains(*p)) {
        return true;
    }
    let corners = [
        Point::new(rect.x0, rect.y0),
        Point::new(rect.x1, rect.y0),
        Point::new(rect.x1, rect.y1),
        Point::new(rect.x0, rect.y1),
    ];
    let edges = [
        (corners[0], corners[1]),
        (corners[1], corners[2]),
        (corners[2], corners[3]),
        (corners[3], corners[0]),
    ];
    points.windows(2).any(|w| {
        edges
            .iter()
            .any(|&(c, d)| segments_intersect(w[0], w[1], c, d))
    })
}

/// Test if two line segments (a-b) and (c-d) intersect.
pub fn segments_intersect(a: Point, b: Point, c: Point, d: Point) -> bool {
    let cross = |o: Point, p: Point, q: Point| -> f64 {
        (p.x - o.x) * (q.y - o.y) - (p.y - o.y) * (q.x - o.x)
    };
    let d1 = cross(c, d, a);
    let d2 = cross(c, d, b);
    let d3 = cross(a, b, c);
    let d4 = cross(a, b, d);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    // Collinear cases: check if endpoint lies on the other segment
    let on_segment = |p: Point, q: Point, r: Point| -> bool {
        r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
    };
    (d1.abs() < 1e-10 && on_segment(c, d, a))
        || (d2.abs() < 1e-10 && on_segment(c, d, b))
        || (d3.abs() < 1e-10 && on_segment(a, b, c))
        || (d4.abs() < 1e-10 && on_segment(a, b, d))
}

/// Bounding box of a set of points, or `None` when empty.
pub fn bounds_of(points: impl IntoIterator<Item = Point>) -> Option<Rect> {
    let mut iter = points.into_iter();
    let first = iter.next()?;
    Some(iter.fold(Rect::from_points(first, first), |r, p| r.union_pt(p)))
}

/// Whether `inner` lies entirely within `outer` (edges inclusive).
pub fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    inner.x0 >= outer.x0 && inner.y0 >= outer.y0 && inner.x1 <= outer.x1 && inner.y1 <= outer.y1
}

/// Whether two rectangles overlap (touching edges count).
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Closest point on the axis-aligned ellipse `x²/rx² + y²/ry² = 1` to `local`.
///
/// Solves for the root of the projection equation by bisection, which stays
/// stable for very eccentric ellipses. Both radii must be positive.
pub fn closest_point_on_ellipse(rx: f64, ry: f64, local: Vec2) -> Vec2 {
    // Work in the first quadrant with the major axis along x.
    let swap = rx < ry;
    let (e0, e1) = if swap { (ry, rx) } else { (rx, ry) };
    let (y0, y1) = if swap {
        (local.y.abs(), local.x.abs())
    } else {
        (local.x.abs(), local.y.abs())
    };

    let (x0, x1) = if y1 > 0.0 {
        if y0 > 0.0 {
            let z0 = y0 / e0;
            let z1 = y1 / e1;
            let g = z0 * z0 + z1 * z1 - 1.0;
            if g == 0.0 {
                (y0, y1)
            } else {
                let r0 = (e0 / e1) * (e0 / e1);
                let s = ellipse_root(r0, z0, z1, g);
                (r0 * y0 / (s + r0), y1 / (s + 1.0))
            }
        } else {
            (0.0, e1)
        }
    } else {
        let numer = e0 * y0;
        let denom = e0 * e0 - e1 * e1;
        if numer < denom {
            let t = numer / denom;
            (e0 * t, e1 * (1.0 - t * t).max(0.0).sqrt())
        } else {
            (e0, 0.0)
        }
    };

    let (px, py) = if swap { (x1, x0) } else { (x0, x1) };
    Vec2::new(px.copysign(local.x), py.copysign(local.y))
}

fn ellipse_root(r0: f64, z0: f64, z1: f64, g: f64) -> f64 {
    const MAX_STEPS: usize = 160;
    let n0 = r0 * z0;
    let mut s0 = z1 - 1.0;
    let mut s1 = if g < 0.0 { 0.0 } else { n0.hypot(z1) - 1.0 };
    let mut s = 0.0;
    for _ in 0..MAX_STEPS {
        s = 0.5 * (s0 + s1);
        if s == s0 || s == s1 {
            break;
        }
        let a = n0 / (s + r0);
        let b = z1 / (s + 1.0);
        let g = a * a + b * b - 1.0;
        if g > 0.0 {
            s0 = s;
        } else if g < 0.0 {
            s1 = s;
        } else {
            break;
        }
    }
    s
}

/// A rectangle rotated about its centre.
///
/// Corner indices run clockwise on screen starting at the unrotated top-left:
/// `0 = top-left, 1 = top-right, 2 = bottom-right, 3 = bottom-left`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    pub center: Point,
    pub half_width: f64,
    pub half_height: f64,
    pub rotation: f64,
}

/// Unrotated corner signs for each corner index.
pub const CORNER_SIGNS: [(f64, f64); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

impl OrientedBox {
    pub fn new(center: Point, half_width: f64, half_height: f64, rotation: f64) -> Self {
        Self {
            center,
            half_width,
            half_height,
            rotation,
        }
    }

    /// Corner `index` in the box's local frame (relative to the centre).
    pub fn local_corner(&self, index: usize) -> Vec2 {
        let (sx, sy) = CORNER_SIGNS[index % 4];
        Vec2::new(sx * self.half_width, sy * self.half_height)
    }

    /// Corner `index` in world space.
    pub fn corner(&self, index: usize) -> Point {
        self.to_world(self.local_corner(index))
    }

    pub fn corners(&self) -> [Point; 4] {
        [self.corner(0), self.corner(1), self.corner(2), self.corner(3)]
    }

    /// Unit vector pointing diagonally outward from corner `index`, in world space.
    pub fn corner_outward(&self, index: usize) -> Vec2 {
        let (sx, sy) = CORNER_SIGNS[index % 4];
        rotate_vec(Vec2::new(sx, sy) * std::f64::consts::FRAC_1_SQRT_2, self.rotation)
    }

    /// Convert a world point into the box's local (unrotated, centred) frame.
    pub fn to_local(&self, point: Point) -> Vec2 {
        rotate_vec(point - self.center, -self.rotation)
    }

    /// Convert a local offset back to a world point.
    pub fn to_world(&self, local: Vec2) -> Point {
        self.center + rotate_vec(local, self.rotation)
    }

    /// Axis-aligned bounds of the rotated box.
    pub fn aabb(&self) -> Rect {
        let (sin, cos) = self.rotation.sin_cos();
        let ex = (self.half_width * cos).abs() + (self.half_height * sin).abs();
        let ey = (self.half_width * sin).abs() + (self.half_height * cos).abs();
        Rect::new(
            self.center.x - ex,
            self.center.y - ey,
            self.center.x + ex,
            self.center.y + ey,
        )
    }

    /// Distance from `point` to the box outline, and whether it lies inside.
    pub fn outline_distance(&self, point: Point) -> (f64, bool) {
        let local = self.to_local(point);
        let dx = local.x.abs() - self.half_width;
        let dy = local.y.abs() - self.half_height;
        if dx <= 0.0 && dy <= 0.0 {
            (dx.max(dy).abs(), true)
        } else {
            (Vec2::new(dx.max(0.0), dy.max(0.0)).hypot(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_point_to_segment_dist() {
        let d = point_to_segment_dist(Point::new(5.0, 5.0), Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!((d - 5.0).abs() < f64::EPSILON);
        // Beyond the end clamps to the endpoint.
        let d = point_to_segment_dist(Point::new(13.0, 4.0), Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_segments_intersect() {
        assert!(segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 0.0)
        ));
        assert!(!segments_intersect(
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(5.0, 0.0),
            Point::new(6.0, 1.0)
        ));
    }

    #[test]
    fn test_polyline_crossing_rect_without_vertices_inside() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let pts = [Point::new(-5.0, 5.0), Point::new(15.0, 5.0)];
        assert!(polyline_intersects_rect(&pts, rect));
        let pts = [Point::new(-5.0, -5.0), Point::new(-1.0, 20.0)];
        assert!(!polyline_intersects_rect(&pts, rect));
    }

    #[test]
    fn test_oriented_box_corners_follow_rotation() {
        let obb = OrientedBox::new(Point::new(0.0, 0.0), 10.0, 5.0, FRAC_PI_2);
        // Top-left (-10, -5) rotated by 90° lands at (5, -10).
        let tl = obb.corner(0);
        assert!((tl.x - 5.0).abs() < 1e-9);
        assert!((tl.y + 10.0).abs() < 1e-9);

        let aabb = obb.aabb();
        assert!((aabb.width() - 10.0).abs() < 1e-9);
        assert!((aabb.height() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_local_world_roundtrip() {
        let obb = OrientedBox::new(Point::new(3.0, 4.0), 2.0, 1.0, 0.7);
        let p = Point::new(-1.0, 8.5);
        let back = obb.to_world(obb.to_local(p));
        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
    }

    #[test]
    fn test_outline_distance() {
        let obb = OrientedBox::new(Point::new(0.0, 0.0), 10.0, 10.0, 0.0);
        let (d, inside) = obb.outline_distance(Point::new(8.0, 0.0));
        assert!(inside);
        assert!((d - 2.0).abs() < 1e-12);
        let (d, inside) = obb.outline_distance(Point::new(13.0, 14.0));
        assert!(!inside);
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_closest_point_on_thin_ellipse() {
        let at = closest_point_on_ellipse(100.0, 2.0, Vec2::new(50.0, 4.0));
        let on_curve = (at.x / 100.0).powi(2) + (at.y / 2.0).powi(2);
        assert!((on_curve - 1.0).abs() < 1e-9);
        let d = (Vec2::new(50.0, 4.0) - at).hypot();
        assert!((d - 2.27).abs() < 0.01, "distance {d}");

        // Same ellipse with the axes swapped, in another quadrant.
        let at = closest_point_on_ellipse(2.0, 100.0, Vec2::new(-4.0, -50.0));
        let d = (Vec2::new(-4.0, -50.0) - at).hypot();
        assert!((d - 2.27).abs() < 0.01, "distance {d}");
        assert!(at.x < 0.0 && at.y < 0.0);
    }

    #[test]
    fn test_closest_point_on_circle_and_axes() {
        let at = closest_point_on_ellipse(10.0, 10.0, Vec2::new(6.0, 8.0));
        assert!((at.x - 6.0).abs() < 1e-9 && (at.y - 8.0).abs() < 1e-9);
        let at = closest_point_on_ellipse(10.0, 10.0, Vec2::new(3.0, 4.0));
        assert!((at.x - 6.0).abs() < 1e-9 && (at.y - 8.0).abs() < 1e-9);
        let at = closest_point_on_ellipse(20.0, 10.0, Vec2::new(0.0, 15.0));
        assert!((at.x).abs() < 1e-12 && (at.y - 10.0).abs() < 1e-12);
        let at = closest_point_on_ellipse(20.0, 10.0, Vec2::new(30.0, 0.0));
        assert!((at.x - 20.0).abs() < 1e-12 && at.y.abs() < 1e-12);
    }
}
