//! Entity records, layers, draw order and the store that owns them.

mod layer;
mod order;
mod store;

pub use layer::{Layer, LayerFlags};
pub use order::{DrawOrder, ReorderAction};
pub use store::{EntityStore, RenderDirty, StoreChange, StoreCheckpoint, StoreError};

use bitflags::bitflags;
use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

use crate::geometry::{OrientedBox, bounds_of};

/// Stable handle to an entity. `0` is reserved for "no entity".
pub type EntityId = u32;

/// Handle to a layer.
pub type LayerId = u32;

/// The reserved "no entity" id.
pub const NO_ENTITY: EntityId = 0;

/// Layer that always exists and receives entities of deleted layers.
pub const DEFAULT_LAYER: LayerId = 0;

/// Largest side count accepted for regular polygons.
pub const MAX_POLYGON_SIDES: u32 = 1024;

bitflags! {
    /// Per-entity state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityFlags: u32 {
        const VISIBLE = 1 << 0;
        const LOCKED = 1 << 1;
    }
}

impl Default for EntityFlags {
    fn default() -> Self {
        EntityFlags::VISIBLE
    }
}

/// Linear RGBA color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }
}

/// Fill and stroke appearance of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub fill: Rgba,
    pub stroke: Rgba,
    pub stroke_enabled: bool,
    /// Stroke width in world units.
    pub stroke_width: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            fill: Rgba::TRANSPARENT,
            stroke: Rgba::BLACK,
            stroke_enabled: true,
            stroke_width: 1.0,
        }
    }
}

impl Style {
    /// A stroke-only style.
    pub fn stroke(color: Rgba, width: f64) -> Self {
        Self {
            fill: Rgba::TRANSPARENT,
            stroke: color,
            stroke_enabled: true,
            stroke_width: width,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if !self.fill.is_finite() || !self.stroke.is_finite() {
            return Err("non-finite color channel");
        }
        if !self.stroke_width.is_finite() || self.stroke_width < 0.0 {
            return Err("stroke width must be finite and non-negative");
        }
        Ok(())
    }
}

/// Discriminant of [`Geometry`], stable on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityKind {
    Rect = 1,
    Line = 2,
    Polyline = 3,
    Circle = 4,
    Polygon = 5,
    Arrow = 6,
    Text = 7,
}

impl EntityKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => EntityKind::Rect,
            2 => EntityKind::Line,
            3 => EntityKind::Polyline,
            4 => EntityKind::Circle,
            5 => EntityKind::Polygon,
            6 => EntityKind::Arrow,
            7 => EntityKind::Text,
            _ => return None,
        })
    }
}

/// Text content plus the layout extent measured by the glyph provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGeometry {
    /// Top-left of the unrotated layout box.
    pub origin: Point,
    pub content: String,
    pub font_id: u32,
    pub font_size: f64,
    /// Rotation in radians around the layout box centre.
    pub rotation: f64,
    /// Measured layout size.
    pub extent: Size,
}

/// Shape of an entity. Each variant holds only what its geometry needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Geometry {
    /// Rectangle; `origin` is the unrotated top-left, rotation is about the centre.
    Rect { origin: Point, size: Size, rotation: f64 },
    Line { p0: Point, p1: Point },
    Arrow { tail: Point, tip: Point, head: f64 },
    Polyline { points: Vec<Point> },
    /// Ellipse with radii `rx`/`ry`.
    Circle { center: Point, rx: f64, ry: f64, rotation: f64 },
    /// Regular polygon inscribed in the ellipse `rx`/`ry`.
    Polygon { center: Point, rx: f64, ry: f64, rotation: f64, sides: u32 },
    Text(TextGeometry),
}

fn finite_point(p: Point) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

fn finite_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Vertex `index` of a regular polygon. The first vertex sits at the top.
pub fn polygon_vertex(center: Point, rx: f64, ry: f64, rotation: f64, sides: u32, index: u32) -> Point {
    let step = std::f64::consts::TAU / sides.max(3) as f64;
    let angle = -std::f64::consts::FRAC_PI_2 + step * index as f64;
    let local = Vec2::new(rx * angle.cos(), ry * angle.sin());
    center + crate::geometry::rotate_vec(local, rotation)
}

impl Geometry {
    pub fn kind(&self) -> EntityKind {
        match self {
            Geometry::Rect { .. } => EntityKind::Rect,
            Geometry::Line { .. } => EntityKind::Line,
            Geometry::Arrow { .. } => EntityKind::Arrow,
            Geometry::Polyline { .. } => EntityKind::Polyline,
            Geometry::Circle { .. } => EntityKind::Circle,
            Geometry::Polygon { .. } => EntityKind::Polygon,
            Geometry::Text(_) => EntityKind::Text,
        }
    }

    /// Structural validation: finite coordinates, non-negative extents.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            Geometry::Rect { origin, size, rotation } => {
                if !finite_point(*origin) || !rotation.is_finite() {
                    return Err("non-finite rectangle");
                }
                if !finite_non_negative(size.width) || !finite_non_negative(size.height) {
                    return Err("rectangle size must be non-negative");
                }
            }
            Geometry::Line { p0, p1 } => {
                if !finite_point(*p0) || !finite_point(*p1) {
                    return Err("non-finite line");
                }
            }
            Geometry::Arrow { tail, tip, head } => {
                if !finite_point(*tail) || !finite_point(*tip) || !finite_non_negative(*head) {
                    return Err("invalid arrow");
                }
            }
            Geometry::Polyline { points } => {
                if points.len() < 2 {
                    return Err("polyline needs at least two points");
                }
                if !points.iter().all(|p| finite_point(*p)) {
                    return Err("non-finite polyline vertex");
                }
            }
            Geometry::Circle { center, rx, ry, rotation } => {
                if !finite_point(*center) || !rotation.is_finite() {
                    return Err("non-finite circle");
                }
                if !finite_non_negative(*rx) || !finite_non_negative(*ry) {
                    return Err("circle radii must be non-negative");
                }
            }
            Geometry::Polygon { center, rx, ry, rotation, sides } => {
                if !finite_point(*center) || !rotation.is_finite() {
                    return Err("non-finite polygon");
                }
                if !finite_non_negative(*rx) || !finite_non_negative(*ry) {
                    return Err("polygon radii must be non-negative");
                }
                if !(3..=MAX_POLYGON_SIDES).contains(sides) {
                    return Err("polygon side count out of range");
                }
            }
            Geometry::Text(text) => {
                if !finite_point(text.origin) || !text.rotation.is_finite() {
                    return Err("non-finite text");
                }
                if !text.font_size.is_finite() || text.font_size <= 0.0 {
                    return Err("font size must be positive");
                }
                if !finite_non_negative(text.extent.width) || !finite_non_negative(text.extent.height) {
                    return Err("text extent must be non-negative");
                }
            }
        }
        Ok(())
    }

    /// Whether the geometry is made of vertices joined by segments.
    pub fn is_line_like(&self) -> bool {
        matches!(
            self,
            Geometry::Line { .. } | Geometry::Arrow { .. } | Geometry::Polyline { .. }
        )
    }

    /// Oriented box for box-shaped kinds; `None` for line-like kinds.
    pub fn oriented_box(&self) -> Option<OrientedBox> {
        match self {
            Geometry::Rect { origin, size, rotation } => Some(OrientedBox::new(
                Point::new(origin.x + size.width / 2.0, origin.y + size.height / 2.0),
                size.width / 2.0,
                size.height / 2.0,
                *rotation,
            )),
            Geometry::Circle { center, rx, ry, rotation }
            | Geometry::Polygon { center, rx, ry, rotation, .. } => {
                Some(OrientedBox::new(*center, *rx, *ry, *rotation))
            }
            Geometry::Text(text) => Some(OrientedBox::new(
                Point::new(
                    text.origin.x + text.extent.width / 2.0,
                    text.origin.y + text.extent.height / 2.0,
                ),
                text.extent.width / 2.0,
                text.extent.height / 2.0,
                text.rotation,
            )),
            Geometry::Line { .. } | Geometry::Arrow { .. } | Geometry::Polyline { .. } => None,
        }
    }

    /// Tight axis-aligned bounds in world space.
    pub fn aabb(&self) -> Rect {
        match self {
            Geometry::Rect { .. } | Geometry::Text(_) => self
                .oriented_box()
                .map(|obb| obb.aabb())
                .unwrap_or(Rect::ZERO),
            Geometry::Circle { center, rx, ry, rotation } => {
                let (sin, cos) = rotation.sin_cos();
                let ex = ((rx * cos).powi(2) + (ry * sin).powi(2)).sqrt();
                let ey = ((rx * sin).powi(2) + (ry * cos).powi(2)).sqrt();
                Rect::new(center.x - ex, center.y - ey, center.x + ex, center.y + ey)
            }
            Geometry::Polygon { center, rx, ry, rotation, sides } => {
                bounds_of((0..*sides).map(|i| polygon_vertex(*center, *rx, *ry, *rotation, *sides, i)))
                    .unwrap_or(Rect::from_points(*center, *center))
            }
            Geometry::Line { p0, p1 } => Rect::from_points(*p0, *p1),
            Geometry::Arrow { tail, tip, head } => {
                Rect::from_points(*tail, *tip).inflate(*head, *head)
            }
            Geometry::Polyline { points } => {
                bounds_of(points.iter().copied()).unwrap_or(Rect::ZERO)
            }
        }
    }

    /// Number of editable vertices (line-like kinds only).
    pub fn vertex_count(&self) -> usize {
        match self {
            Geometry::Line { .. } | Geometry::Arrow { .. } => 2,
            Geometry::Polyline { points } => points.len(),
            _ => 0,
        }
    }

    pub fn vertex(&self, index: usize) -> Option<Point> {
        match (self, index) {
            (Geometry::Line { p0, .. }, 0) => Some(*p0),
            (Geometry::Line { p1, .. }, 1) => Some(*p1),
            (Geometry::Arrow { tail, .. }, 0) => Some(*tail),
            (Geometry::Arrow { tip, .. }, 1) => Some(*tip),
            (Geometry::Polyline { points }, i) => points.get(i).copied(),
            _ => None,
        }
    }

    /// Move vertex `index`. Returns false when the index does not exist.
    pub fn set_vertex(&mut self, index: usize, point: Point) -> bool {
        let slot = match (self, index) {
            (Geometry::Line { p0, .. }, 0) => p0,
            (Geometry::Line { p1, .. }, 1) => p1,
            (Geometry::Arrow { tail, .. }, 0) => tail,
            (Geometry::Arrow { tip, .. }, 1) => tip,
            (Geometry::Polyline { points }, i) => match points.get_mut(i) {
                Some(p) => p,
                None => return false,
            },
            _ => return false,
        };
        *slot = point;
        true
    }

    /// Number of segments (line-like kinds only).
    pub fn segment_count(&self) -> usize {
        self.vertex_count().saturating_sub(1)
    }

    pub fn segment(&self, index: usize) -> Option<(Point, Point)> {
        Some((self.vertex(index)?, self.vertex(index + 1)?))
    }

    /// Rotation in radians for kinds that carry one.
    pub fn rotation(&self) -> Option<f64> {
        match self {
            Geometry::Rect { rotation, .. }
            | Geometry::Circle { rotation, .. }
            | Geometry::Polygon { rotation, .. } => Some(*rotation),
            Geometry::Text(text) => Some(text.rotation),
            _ => None,
        }
    }

    pub fn set_rotation(&mut self, angle: f64) {
        match self {
            Geometry::Rect { rotation, .. }
            | Geometry::Circle { rotation, .. }
            | Geometry::Polygon { rotation, .. } => *rotation = angle,
            Geometry::Text(text) => text.rotation = angle,
            _ => {}
        }
    }

    /// Translate in place.
    pub fn translate(&mut self, delta: Vec2) {
        match self {
            Geometry::Rect { origin, .. } => *origin += delta,
            Geometry::Line { p0, p1 } => {
                *p0 += delta;
                *p1 += delta;
            }
            Geometry::Arrow { tail, tip, .. } => {
                *tail += delta;
                *tip += delta;
            }
            Geometry::Polyline { points } => {
                for p in points.iter_mut() {
                    *p += delta;
                }
            }
            Geometry::Circle { center, .. } | Geometry::Polygon { center, .. } => *center += delta,
            Geometry::Text(text) => text.origin += delta,
        }
    }

    /// Replace the box of a box-shaped kind, keeping its rotation.
    pub fn set_box(&mut self, center: Point, half_width: f64, half_height: f64) {
        match self {
            Geometry::Rect { origin, size, .. } => {
                *origin = Point::new(center.x - half_width, center.y - half_height);
                *size = Size::new(half_width * 2.0, half_height * 2.0);
            }
            Geometry::Circle { center: c, rx, ry, .. } | Geometry::Polygon { center: c, rx, ry, .. } => {
                *c = center;
                *rx = half_width;
                *ry = half_height;
            }
            Geometry::Text(text) => {
                text.origin = Point::new(center.x - half_width, center.y - half_height);
            }
            _ => {}
        }
    }

    /// Copy `other` into `self`, reusing existing allocations when the kinds match.
    pub fn assign_from(&mut self, other: &Geometry) {
        match (self, other) {
            (Geometry::Polyline { points }, Geometry::Polyline { points: src }) => {
                points.clone_from(src);
            }
            (Geometry::Text(dst), Geometry::Text(src)) => {
                dst.origin = src.origin;
                dst.content.clone_from(&src.content);
                dst.font_id = src.font_id;
                dst.font_size = src.font_size;
                dst.rotation = src.rotation;
                dst.extent = src.extent;
            }
            (dst, src) => *dst = src.clone(),
        }
    }
}

/// A geometric record owned by the [`EntityStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub layer: LayerId,
    pub flags: EntityFlags,
    /// Elevation used by the render builder as the vertex z.
    pub z: f64,
    pub style: Style,
    pub geometry: Geometry,
}

impl EntityRecord {
    pub fn new(id: EntityId, geometry: Geometry, style: Style) -> Self {
        Self {
            id,
            layer: DEFAULT_LAYER,
            flags: EntityFlags::default(),
            z: 0.0,
            style,
            geometry,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.geometry.kind()
    }

    pub fn aabb(&self) -> Rect {
        self.geometry.aabb()
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(EntityFlags::VISIBLE)
    }

    pub fn is_locked(&self) -> bool {
        self.flags.contains(EntityFlags::LOCKED)
    }

    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if !self.z.is_finite() {
            return Err("non-finite elevation");
        }
        self.style.validate()?;
        self.geometry.validate()
    }

    /// Copy `other` into `self` without reallocating when possible.
    pub fn assign_from(&mut self, other: &EntityRecord) {
        self.id = other.id;
        self.layer = other.layer;
        self.flags = other.flags;
        self.z = other.z;
        self.style = other.style;
        self.geometry.assign_from(&other.geometry);
    }
}

/// Partial update applied by [`EntityStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub geometry: Option<Geometry>,
    pub style: Option<Style>,
    pub layer: Option<LayerId>,
    pub flags: Option<EntityFlags>,
    pub z: Option<f64>,
}

impl EntityPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_layer(mut self, layer: LayerId) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_flags(mut self, flags: EntityFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.is_none()
            && self.style.is_none()
            && self.layer.is_none()
            && self.flags.is_none()
            && self.z.is_none()
    }
}
