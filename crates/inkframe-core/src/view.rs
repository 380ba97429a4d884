//! Pan/zoom view state and the collaborator trait that exposes it.

use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Supplies the current screen-to-world scale to picking and sessions.
pub trait ViewProvider {
    /// Screen pixels per world unit.
    fn current_scale(&self) -> f64;
    /// Viewport size in screen pixels.
    fn viewport_size(&self) -> Size;
}

/// Pan and zoom of a document view.
///
/// `world_to_screen(p) = p * zoom + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Screen-space translation.
    pub offset: Vec2,
    pub zoom: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub size: Size,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            zoom: 1.0,
            min_zoom: 0.05,
            max_zoom: 64.0,
            size: Size::new(1280.0, 800.0),
        }
    }
}

impl ViewProvider for Viewport {
    fn current_scale(&self) -> f64 {
        self.zoom
    }

    fn viewport_size(&self) -> Size {
        self.size
    }
}

impl Viewport {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset) * Affine::scale(self.zoom)
    }

    pub fn screen_to_world(&self, screen: Point) -> Point {
        Point::new(
            (screen.x - self.offset.x) / self.zoom,
            (screen.y - self.offset.y) / self.zoom,
        )
    }

    pub fn world_to_screen(&self, world: Point) -> Point {
        self.transform() * world
    }

    /// Visible world rectangle.
    pub fn visible_world(&self) -> Rect {
        Rect::from_points(
            self.screen_to_world(Point::ORIGIN),
            self.screen_to_world(Point::new(self.size.width, self.size.height)),
        )
    }

    /// Set the zoom directly, clamped to the allowed range. Non-finite or
    /// non-positive values are ignored.
    pub fn set_scale(&mut self, scale: f64) -> bool {
        if !scale.is_finite() || scale <= 0.0 {
            return false;
        }
        self.zoom = scale.clamp(self.min_zoom, self.max_zoom);
        true
    }

    pub fn pan(&mut self, delta: Vec2) {
        self.offset += delta;
    }

    /// Zoom by `factor` keeping `anchor` (screen space) fixed.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        let zoom = (self.zoom * factor).clamp(self.min_zoom, self.max_zoom);
        if (zoom - self.zoom).abs() < f64::EPSILON {
            return;
        }
        let world = self.screen_to_world(anchor);
        self.zoom = zoom;
        let moved = self.world_to_screen(world);
        self.offset += anchor - moved;
    }

    pub fn resize(&mut self, size: Size) {
        self.size = size;
    }
}
