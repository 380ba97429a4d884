//! Selection outlines and handle markers.
//!
//! Primitives are flat point lists an overlay pass can draw directly, or
//! tessellate into a [`Mesh`] with [`SelectionOverlay::tessellate`].

use bytemuck::{Pod, Zeroable};
use inkframe_core::entity::{EntityRecord, Geometry, Rgba};
use inkframe_core::selection::{HandleKind, HandleMetrics, handles_for};
use kurbo::{Point, Vec2};

use crate::buffer::{RenderError, RenderResult};
use crate::tessellate::{Mesh, MeshWriter, SOLID_UV};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OverlayKind {
    /// Two points.
    Segment = 0,
    /// Open chain of points.
    Polyline = 1,
    /// Closed loop of points.
    Polygon = 2,
    /// Independent markers.
    Point = 3,
}

/// Set on handle primitives holding rotate handles.
pub const FLAG_ROTATE: u16 = 1;

/// One primitive: `count` points starting at float `offset` of the data buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct OverlayPrimitive {
    pub kind: u16,
    pub flags: u16,
    pub count: u32,
    pub offset: u32,
}

/// Primitives plus their interleaved `x, y` coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayBuffer {
    pub primitives: Vec<OverlayPrimitive>,
    pub data: Vec<f32>,
}

impl OverlayBuffer {
    pub fn clear(&mut self) {
        self.primitives.clear();
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Points of `primitive`.
    pub fn points(&self, primitive: &OverlayPrimitive) -> impl Iterator<Item = Point> + '_ {
        let start = primitive.offset as usize;
        let end = start + primitive.count as usize * 2;
        self.data
            .get(start..end)
            .unwrap_or(&[])
            .chunks_exact(2)
            .map(|xy| Point::new(xy[0] as f64, xy[1] as f64))
    }

    fn push(&mut self, kind: OverlayKind, flags: u16, points: &[Point]) -> RenderResult<()> {
        if points.is_empty() {
            return Ok(());
        }
        let too_large = |_| RenderError::TooManyVertices(self.data.len() + points.len() * 2);
        let offset = u32::try_from(self.data.len()).map_err(too_large)?;
        let count = u32::try_from(points.len()).map_err(too_large)?;
        self.data.try_reserve(points.len() * 2)?;
        self.primitives.try_reserve(1)?;
        for p in points {
            self.data.push(p.x as f32);
            self.data.push(p.y as f32);
        }
        self.primitives.push(OverlayPrimitive {
            kind: kind as u16,
            flags,
            count,
            offset,
        });
        Ok(())
    }
}

/// Appearance of a tessellated overlay, in world units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub line_width: f64,
    /// Edge length of a handle square.
    pub handle_size: f64,
    pub color: Rgba,
    pub handle_color: Rgba,
    pub z: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            handle_size: 8.0,
            color: Rgba::new(0.2, 0.5, 1.0, 1.0),
            handle_color: Rgba::WHITE,
            z: 0.0,
        }
    }
}

/// Outline and handle buffers for the current selection.
#[derive(Debug, Default)]
pub struct SelectionOverlay {
    outline: OverlayBuffer,
    handles: OverlayBuffer,
    generation: u64,
}

impl SelectionOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outline(&self) -> &OverlayBuffer {
        &self.outline
    }

    pub fn handles(&self) -> &OverlayBuffer {
        &self.handles
    }

    /// Bumped by every build.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Rebuild from the selected records, in selection order.
    ///
    /// Line-like kinds are outlined along their segments and get a marker per
    /// vertex. Box kinds are outlined by their oriented box and get resize
    /// markers in corner order followed by rotate markers.
    pub fn build<'r>(
        &mut self,
        records: impl IntoIterator<Item = &'r EntityRecord>,
        metrics: &HandleMetrics,
    ) -> RenderResult<()> {
        self.outline.clear();
        self.handles.clear();
        self.generation += 1;
        for record in records {
            let geometry = &record.geometry;
            if geometry.is_line_like() {
                let vertices: Vec<Point> = (0..geometry.vertex_count())
                    .filter_map(|i| geometry.vertex(i))
                    .collect();
                if vertices.len() < 2 {
                    continue;
                }
                let kind = match geometry {
                    Geometry::Polyline { .. } => OverlayKind::Polyline,
                    _ => OverlayKind::Segment,
                };
                self.outline.push(kind, 0, &vertices)?;
                self.handles.push(OverlayKind::Point, 0, &vertices)?;
                continue;
            }
            let Some(obb) = geometry.oriented_box() else {
                continue;
            };
            self.outline.push(OverlayKind::Polygon, 0, &obb.corners())?;

            let set = handles_for(geometry, metrics);
            let resize: Vec<Point> = set
                .iter()
                .filter(|h| matches!(h.kind, HandleKind::Resize(_)))
                .map(|h| h.position)
                .collect();
            let rotate: Vec<Point> = set
                .iter()
                .filter(|h| matches!(h.kind, HandleKind::Rotate(_)))
                .map(|h| h.position)
                .collect();
            self.handles.push(OverlayKind::Point, 0, &resize)?;
            self.handles.push(OverlayKind::Point, FLAG_ROTATE, &rotate)?;
        }
        Ok(())
    }

    /// Triangulate outlines as stroke quads and handles as squares into `out`.
    pub fn tessellate(&self, style: &OverlayStyle, out: &mut Mesh) {
        out.clear();
        let mut w = MeshWriter { mesh: out, z: style.z };
        for primitive in &self.outline.primitives {
            let points: Vec<Point> = self.outline.points(primitive).collect();
            let closed = primitive.kind == OverlayKind::Polygon as u16;
            for pair in points.windows(2) {
                w.segment(pair[0], pair[1], style.line_width, style.color);
            }
            if closed && points.len() > 2 {
                w.segment(points[points.len() - 1], points[0], style.line_width, style.color);
            }
        }
        let half = style.handle_size * 0.5;
        if !(half > 0.0) {
            return;
        }
        for primitive in &self.handles.primitives {
            for p in self.handles.points(primitive) {
                let corners = [
                    p + Vec2::new(-half, -half),
                    p + Vec2::new(half, -half),
                    p + Vec2::new(half, half),
                    p + Vec2::new(-half, half),
                ];
                w.quad(corners, style.handle_color, [SOLID_UV; 4]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkframe_core::config::PickConfig;
    use inkframe_core::entity::Style;
    use kurbo::Size;
    use std::f64::consts::FRAC_PI_2;

    fn record(id: u32, geometry: Geometry) -> EntityRecord {
        EntityRecord::new(id, geometry, Style::default())
    }

    fn metrics() -> HandleMetrics {
        HandleMetrics::new(&PickConfig::default(), 1.0, 0.0)
    }

    #[test]
    fn test_primitive_is_12_bytes() {
        assert_eq!(std::mem::size_of::<OverlayPrimitive>(), 12);
    }

    #[test]
    fn test_rect_outline_and_handles() {
        let rect = record(
            1,
            Geometry::Rect {
                origin: Point::new(0.0, 0.0),
                size: Size::new(100.0, 50.0),
                rotation: 0.0,
            },
        );
        let mut overlay = SelectionOverlay::new();
        overlay.build([&rect], &metrics()).unwrap();

        let outline = overlay.outline();
        assert_eq!(outline.primitives.len(), 1);
        assert_eq!(outline.primitives[0].kind, OverlayKind::Polygon as u16);
        let corners: Vec<Point> = outline.points(&outline.primitives[0]).collect();
        assert_eq!(
            corners,
            vec![
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(100.0, 50.0),
                Point::new(0.0, 50.0)
            ]
        );

        let handles = overlay.handles();
        assert_eq!(handles.primitives.len(), 2);
        assert_eq!(handles.primitives[0].count, 4);
        assert_eq!(handles.primitives[0].flags, 0);
        assert_eq!(handles.primitives[1].flags, FLAG_ROTATE);
        let resize: Vec<Point> = handles.points(&handles.primitives[0]).collect();
        assert_eq!(resize[2], Point::new(100.0, 50.0));
    }

    #[test]
    fn test_rotated_outline_follows_rotation() {
        let rect = record(
            1,
            Geometry::Rect {
                origin: Point::new(-20.0, -10.0),
                size: Size::new(40.0, 20.0),
                rotation: FRAC_PI_2,
            },
        );
        let mut overlay = SelectionOverlay::new();
        overlay.build([&rect], &metrics()).unwrap();
        let outline = overlay.outline();
        for p in outline.points(&outline.primitives[0]) {
            assert!((p.x.abs() - 10.0).abs() < 1e-4, "{p:?}");
            assert!((p.y.abs() - 20.0).abs() < 1e-4, "{p:?}");
        }
    }

    #[test]
    fn test_line_like_outline_and_vertex_markers() {
        let line = record(
            1,
            Geometry::Line {
                p0: Point::new(0.0, 0.0),
                p1: Point::new(10.0, 0.0),
            },
        );
        let poly = record(
            2,
            Geometry::Polyline {
                points: vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0), Point::new(10.0, 0.0)],
            },
        );
        let mut overlay = SelectionOverlay::new();
        overlay.build([&line, &poly], &metrics()).unwrap();
        let kinds: Vec<u16> = overlay.outline().primitives.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![OverlayKind::Segment as u16, OverlayKind::Polyline as u16]);
        let counts: Vec<u32> = overlay.handles().primitives.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![2, 3]);
        assert_eq!(overlay.outline().primitives[1].offset, 4);
    }

    #[test]
    fn test_rebuild_replaces_and_counts_generations() {
        let line = record(
            1,
            Geometry::Line {
                p0: Point::new(0.0, 0.0),
                p1: Point::new(10.0, 0.0),
            },
        );
        let mut overlay = SelectionOverlay::new();
        overlay.build([&line], &metrics()).unwrap();
        overlay.build(std::iter::empty(), &metrics()).unwrap();
        assert!(overlay.outline().is_empty());
        assert!(overlay.handles().is_empty());
        assert_eq!(overlay.generation(), 2);
    }

    #[test]
    fn test_build_from_document_selection() {
        use inkframe_core::{CommandWriter, Document, SelectMode};

        let mut doc = Document::default();
        let mut w = CommandWriter::new();
        w.upsert_rect(1, Point::new(0.0, 0.0), Size::new(10.0, 10.0), 0.0, &Style::default());
        w.upsert_rect(2, Point::new(50.0, 0.0), Size::new(10.0, 10.0), 0.0, &Style::default());
        doc.apply_commands(&w.finish()).unwrap();
        doc.select(&[2], SelectMode::Replace).unwrap();

        let mut overlay = SelectionOverlay::new();
        overlay.build(doc.selected_records(), &doc.handle_metrics()).unwrap();
        let outline = overlay.outline();
        assert_eq!(outline.primitives.len(), 1);
        let first = outline.points(&outline.primitives[0]).next().unwrap();
        assert_eq!(first, Point::new(50.0, 0.0));
    }

    #[test]
    fn test_tessellate_outline_and_handles() {
        let rect = record(
            1,
            Geometry::Rect {
                origin: Point::new(0.0, 0.0),
                size: Size::new(100.0, 100.0),
                rotation: 0.0,
            },
        );
        let mut overlay = SelectionOverlay::new();
        overlay.build([&rect], &metrics()).unwrap();
        let mut mesh = Mesh::new();
        overlay.tessellate(&OverlayStyle::default(), &mut mesh);
        // Four closed outline edges plus eight handle squares.
        assert_eq!(mesh.indices.len(), (4 + 8) * 6);
        assert_eq!(mesh.vertices.len(), (4 + 8) * 4);
    }
}
