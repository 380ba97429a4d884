//! Grid, angle and axis snapping used by transform sessions.

use kurbo::{Point, Vec2};

use crate::config::InteractionConfig;

/// Round a point to the nearest grid intersection.
pub fn snap_to_grid(point: Point, grid_size: f64) -> Point {
    if grid_size <= 0.0 {
        return point;
    }
    Point::new(
        (point.x / grid_size).round() * grid_size,
        (point.y / grid_size).round() * grid_size,
    )
}

/// Round an angle in radians to the nearest multiple of `increment_degrees`.
pub fn snap_angle(angle: f64, increment_degrees: f64) -> f64 {
    if increment_degrees <= 0.0 {
        return angle;
    }
    let step = increment_degrees.to_radians();
    (angle / step).round() * step
}

/// Snap the direction `from -> to` to angle increments, keeping its length.
pub fn snap_segment_end(from: Point, to: Point, increment_degrees: f64) -> Point {
    let d = to - from;
    let length = d.hypot();
    if length < 1e-3 {
        return to;
    }
    let angle = snap_angle(d.y.atan2(d.x), increment_degrees);
    from + Vec2::new(angle.cos(), angle.sin()) * length
}

/// Shift-drag axis constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisLock {
    #[default]
    Free,
    X,
    Y,
}

impl AxisLock {
    /// Advance the lock for screen-space drag `(dx, dy)`.
    ///
    /// Below `axis_lock_min_px` nothing is locked. From free, an axis locks
    /// once it exceeds the other by the enter ratio; a held lock switches only
    /// when the other axis exceeds it by the (larger) switch ratio.
    pub fn advance(self, dx: f64, dy: f64, config: &InteractionConfig) -> AxisLock {
        let (ax, ay) = (dx.abs(), dy.abs());
        if ax.max(ay) < config.axis_lock_min_px {
            return AxisLock::Free;
        }
        match self {
            AxisLock::Free => {
                if ax >= config.axis_lock_enter_ratio * ay {
                    AxisLock::X
                } else if ay >= config.axis_lock_enter_ratio * ax {
                    AxisLock::Y
                } else {
                    AxisLock::Free
                }
            }
            AxisLock::X if ay >= config.axis_lock_switch_ratio * ax => AxisLock::Y,
            AxisLock::Y if ax >= config.axis_lock_switch_ratio * ay => AxisLock::X,
            held => held,
        }
    }

    /// Zero the constrained component of `delta`.
    pub fn constrain(self, delta: Vec2) -> Vec2 {
        match self {
            AxisLock::Free => delta,
            AxisLock::X => Vec2::new(delta.x, 0.0),
            AxisLock::Y => Vec2::new(0.0, delta.y),
        }
    }
}
