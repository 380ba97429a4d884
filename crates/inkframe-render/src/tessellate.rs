//! Per-kind tessellation of entity records into indexed triangle meshes.

use bytemuck::{Pod, Zeroable};
use inkframe_core::entity::{EntityRecord, Geometry, Rgba, Style, TextGeometry, polygon_vertex};
use inkframe_core::geometry::{OrientedBox, rotate_about};
use inkframe_core::text::GlyphProvider;
use kurbo::{Point, Vec2};

/// Segments used for ellipse fans and rings.
pub const ELLIPSE_SEGMENTS: u32 = 72;

/// UV carried by untextured vertices. Negative coordinates lie outside the atlas.
pub const SOLID_UV: [f32; 2] = [-1.0, -1.0];

/// Arrow heads never take more than this share of the arrow length.
const MAX_HEAD_SHARE: f64 = 0.45;
const HEAD_WIDTH_RATIO: f64 = 0.6;
const MIN_MITER_COS: f64 = 0.2;
const MAX_MITER_WIDTHS: f64 = 4.0;

/// GPU vertex layout, 36 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub z: f32,
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

/// Raw bytes of a vertex slice, as uploaded to a GPU buffer.
pub fn vertex_bytes(vertices: &[Vertex]) -> &[u8] {
    bytemuck::cast_slice(vertices)
}

/// Vertices plus indices local to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    fn base(&self) -> u32 {
        self.vertices.len() as u32
    }
}

/// Writes the triangles of one record with a fixed elevation.
pub(crate) struct MeshWriter<'a> {
    pub(crate) mesh: &'a mut Mesh,
    pub(crate) z: f32,
}

impl MeshWriter<'_> {
    fn vertex(&mut self, p: Point, color: Rgba, uv: [f32; 2]) -> u32 {
        let index = self.mesh.base();
        self.mesh.vertices.push(Vertex {
            position: [p.x as f32, p.y as f32],
            z: self.z,
            color: color.to_array(),
            uv,
        });
        index
    }

    fn triangle(&mut self, a: Point, b: Point, c: Point, color: Rgba) {
        let i = self.vertex(a, color, SOLID_UV);
        self.vertex(b, color, SOLID_UV);
        self.vertex(c, color, SOLID_UV);
        self.mesh.indices.extend_from_slice(&[i, i + 1, i + 2]);
    }

    /// Quad `a b c d` in winding order.
    pub(crate) fn quad(&mut self, corners: [Point; 4], color: Rgba, uvs: [[f32; 2]; 4]) {
        let i = self.mesh.base();
        for (corner, uv) in corners.into_iter().zip(uvs) {
            self.vertex(corner, color, uv);
        }
        self.mesh
            .indices
            .extend_from_slice(&[i, i + 1, i + 2, i, i + 2, i + 3]);
    }

    /// Fan around `center` over a closed outline.
    fn fan(&mut self, center: Point, outline: &[Point], color: Rgba) {
        let n = outline.len() as u32;
        if n < 3 {
            return;
        }
        let c = self.vertex(center, color, SOLID_UV);
        for p in outline {
            self.vertex(*p, color, SOLID_UV);
        }
        for k in 0..n {
            let next = (k + 1) % n;
            self.mesh.indices.extend_from_slice(&[c, c + 1 + k, c + 1 + next]);
        }
    }

    /// Band between two closed outlines of equal length.
    fn ring(&mut self, outer: &[Point], inner: &[Point], color: Rgba) {
        let n = outer.len().min(inner.len()) as u32;
        if n < 2 {
            return;
        }
        let base = self.mesh.base();
        for (o, i) in outer.iter().zip(inner) {
            self.vertex(*o, color, SOLID_UV);
            self.vertex(*i, color, SOLID_UV);
        }
        for k in 0..n {
            let next = (k + 1) % n;
            let (o0, i0) = (base + 2 * k, base + 2 * k + 1);
            let (o1, i1) = (base + 2 * next, base + 2 * next + 1);
            self.mesh.indices.extend_from_slice(&[o0, i0, o1, i0, i1, o1]);
        }
    }

    /// Stroke quad centred on segment `a b`.
    pub(crate) fn segment(&mut self, a: Point, b: Point, width: f64, color: Rgba) {
        let d = b - a;
        let len = d.hypot();
        if !(len > 1e-9) || !(width > 0.0) {
            return;
        }
        let n = Vec2::new(-d.y, d.x) * (width * 0.5 / len);
        self.quad([a + n, b + n, b - n, a - n], color, [SOLID_UV; 4]);
    }
}

fn has_fill(style: &Style) -> bool {
    style.fill.a > 0.0
}

fn has_stroke(style: &Style) -> bool {
    style.stroke_enabled && style.stroke.a > 0.0 && style.stroke_width > 0.0
}

/// Tessellate `record` into `out`, which is cleared first.
pub fn tessellate(record: &EntityRecord, glyphs: &dyn GlyphProvider, out: &mut Mesh) {
    out.clear();
    let mut w = MeshWriter {
        mesh: out,
        z: record.z as f32,
    };
    let style = &record.style;
    match &record.geometry {
        Geometry::Rect { .. } => {
            let Some(obb) = record.geometry.oriented_box() else {
                return;
            };
            box_shape(&mut w, &obb, style);
        }
        Geometry::Line { p0, p1 } => {
            if has_stroke(style) {
                w.segment(*p0, *p1, style.stroke_width, style.stroke);
            }
        }
        Geometry::Polyline { points } => {
            if has_stroke(style) {
                for pair in points.windows(2) {
                    w.segment(pair[0], pair[1], style.stroke_width, style.stroke);
                }
            }
        }
        Geometry::Arrow { tail, tip, head } => arrow(&mut w, *tail, *tip, *head, style),
        Geometry::Circle { center, rx, ry, rotation } => {
            let outline = ellipse_outline(*center, *rx, *ry, *rotation);
            if has_fill(style) {
                w.fan(*center, &outline, style.fill);
            }
            if has_stroke(style) {
                let inner = ellipse_outline(
                    *center,
                    (rx - style.stroke_width).max(0.0),
                    (ry - style.stroke_width).max(0.0),
                    *rotation,
                );
                w.ring(&outline, &inner, style.stroke);
            }
        }
        Geometry::Polygon { center, rx, ry, rotation, sides } => {
            let outline: Vec<Point> = (0..*sides)
                .map(|i| polygon_vertex(*center, *rx, *ry, *rotation, *sides, i))
                .collect();
            if has_fill(style) {
                w.fan(*center, &outline, style.fill);
            }
            if has_stroke(style) {
                let inner = inset_outline(&outline, *center, style.stroke_width);
                w.ring(&outline, &inner, style.stroke);
            }
        }
        Geometry::Text(text) => glyph_quads(&mut w, text, style, glyphs),
    }
}

fn box_shape(w: &mut MeshWriter<'_>, obb: &OrientedBox, style: &Style) {
    let outer = obb.corners();
    if has_fill(style) {
        w.quad(outer, style.fill, [SOLID_UV; 4]);
    }
    if has_stroke(style) {
        let inset = OrientedBox::new(
            obb.center,
            (obb.half_width - style.stroke_width).max(0.0),
            (obb.half_height - style.stroke_width).max(0.0),
            obb.rotation,
        );
        w.ring(&outer, &inset.corners(), style.stroke);
    }
}

fn ellipse_outline(center: Point, rx: f64, ry: f64, rotation: f64) -> Vec<Point> {
    let obb = OrientedBox::new(center, rx, ry, rotation);
    (0..ELLIPSE_SEGMENTS)
        .map(|i| {
            let t = std::f64::consts::TAU * i as f64 / ELLIPSE_SEGMENTS as f64;
            obb.to_world(Vec2::new(rx * t.cos(), ry * t.sin()))
        })
        .collect()
}

/// Offset a convex outline inward by `width`, mitering at the corners.
fn inset_outline(outline: &[Point], center: Point, width: f64) -> Vec<Point> {
    let n = outline.len();
    let mut inner = Vec::with_capacity(n);
    for i in 0..n {
        let prev = outline[(i + n - 1) % n];
        let curr = outline[i];
        let next = outline[(i + 1) % n];
        let mut n1 = unit_normal(curr - prev);
        let mut n2 = unit_normal(next - curr);
        if n1.dot(center - curr) < 0.0 {
            n1 = -n1;
        }
        if n2.dot(center - curr) < 0.0 {
            n2 = -n2;
        }
        let sum = n1 + n2;
        let dir = if sum.hypot() > 1e-9 { sum.normalize() } else { n1 };
        let cos_half = dir.dot(n1).max(MIN_MITER_COS);
        let miter = (width / cos_half).min(width * MAX_MITER_WIDTHS);
        // Never cross the centre on tiny shapes.
        let reach = (center - curr).hypot();
        inner.push(curr + dir * miter.min(reach));
    }
    inner
}

fn unit_normal(d: Vec2) -> Vec2 {
    let len = d.hypot();
    if len > 1e-9 { Vec2::new(-d.y / len, d.x / len) } else { Vec2::ZERO }
}

fn arrow(w: &mut MeshWriter<'_>, tail: Point, tip: Point, head: f64, style: &Style) {
    if !has_stroke(style) {
        return;
    }
    let d = tip - tail;
    let len = d.hypot();
    if !(len > 1e-9) {
        return;
    }
    let dir = d / len;
    let head_len = head.min(len * MAX_HEAD_SHARE);
    let half_width = head_len * HEAD_WIDTH_RATIO * 0.5;
    let base = tip - dir * head_len;
    let perp = Vec2::new(-dir.y, dir.x);
    w.segment(tail, base, style.stroke_width, style.stroke);
    if head_len > 0.0 {
        w.triangle(tip, base + perp * half_width, base - perp * half_width, style.stroke);
    }
}

fn glyph_quads(w: &mut MeshWriter<'_>, text: &TextGeometry, style: &Style, glyphs: &dyn GlyphProvider) {
    let metrics = glyphs.measure(&text.content, text.font_id, text.font_size);
    let center = text.origin + Vec2::new(text.extent.width, text.extent.height) * 0.5;
    let mut pen = Vec2::ZERO;
    for ch in text.content.chars() {
        if ch == '\n' {
            pen = Vec2::new(0.0, pen.y + metrics.line_height);
            continue;
        }
        let Some(glyph) = glyphs.glyph(ch, text.font_id, text.font_size) else {
            continue;
        };
        if glyph.size.width > 0.0 && glyph.size.height > 0.0 {
            let top_left = text.origin + pen + glyph.bearing;
            let (gw, gh) = (glyph.size.width, glyph.size.height);
            let corners = [
                top_left,
                top_left + Vec2::new(gw, 0.0),
                top_left + Vec2::new(gw, gh),
                top_left + Vec2::new(0.0, gh),
            ]
            .map(|p| rotate_about(p, center, text.rotation));
            let [u0, v0, u1, v1] = glyph.uv;
            w.quad(corners, style.fill, [[u0, v0], [u1, v0], [u1, v1], [u0, v1]]);
        }
        pen.x += glyph.advance;
    }
}
