//! Point and area hit-testing over the entity store.
//!
//! The broad phase is a [`SpatialHash`] kept in sync with the store's
//! pick-dirty set; the narrow phase tests the closed [`Geometry`] variants
//! exactly. Candidates within tolerance are ranked by: handles of a selected
//! entity first, then distance, then draw-order rank (higher wins), then id
//! (higher wins).

mod grid;

pub use grid::SpatialHash;

use std::cmp::Ordering;

use bitflags::bitflags;
use kurbo::{Point, Rect, Vec2};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::PickConfig;
use crate::entity::{EntityId, EntityRecord, EntityStore, Geometry, NO_ENTITY, polygon_vertex};
use crate::geometry::{
    OrientedBox, closest_point_on_ellipse, closest_point_on_segment, polyline_intersects_rect, rect_contains_rect,
    rects_overlap,
};
use crate::selection::{HandleKind, HandleMetrics, Selection, handles_for};

bitflags! {
    /// Which parts of an entity a pick may report.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PickMask: u32 {
        const BODY = 1 << 0;
        const EDGE = 1 << 1;
        const VERTEX = 1 << 2;
        const HANDLES = 1 << 3;
    }
}

/// What part of an entity was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SubTarget {
    None = 0,
    Body = 1,
    Vertex = 2,
    Edge = 3,
    ResizeHandle = 4,
    RotateHandle = 5,
}

impl SubTarget {
    fn is_handle(self) -> bool {
        matches!(self, SubTarget::ResizeHandle | SubTarget::RotateHandle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickResult {
    /// `0` when nothing was hit.
    pub id: EntityId,
    pub sub_target: SubTarget,
    /// Corner, vertex or edge index; `0` otherwise.
    pub sub_index: u32,
    /// World distance from the query point to the hit feature.
    pub distance: f64,
    /// World position of the hit feature.
    pub hit: Point,
}

impl PickResult {
    pub fn miss() -> Self {
        Self {
            id: NO_ENTITY,
            sub_target: SubTarget::None,
            sub_index: 0,
            distance: f64::INFINITY,
            hit: Point::ZERO,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.id != NO_ENTITY
    }
}

/// Area selection semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AreaMode {
    /// Entity must lie fully inside the area.
    Window,
    /// Any overlap counts.
    Crossing,
}

/// Parameters of a point pick.
#[derive(Debug, Clone, Copy)]
pub struct PickQuery {
    pub point: Point,
    pub tolerance: f64,
    pub mask: PickMask,
    /// Screen pixels per world unit, used to size handle zones.
    pub scale: f64,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    result: PickResult,
    selected_handle: bool,
    rank: usize,
}

impl Candidate {
    /// `Less` means `self` wins.
    fn compare(&self, other: &Candidate) -> Ordering {
        other
            .selected_handle
            .cmp(&self.selected_handle)
            .then(self.result.distance.total_cmp(&other.result.distance))
            .then(other.rank.cmp(&self.rank))
            .then(other.result.id.cmp(&self.result.id))
    }
}

/// Incrementally maintained pick index.
#[derive(Debug, Clone)]
pub struct PickIndex {
    hash: SpatialHash,
    config: PickConfig,
    scratch: Vec<EntityId>,
}

impl PickIndex {
    pub fn new(config: &PickConfig) -> Self {
        Self {
            hash: SpatialHash::new(config.cell_size, config.max_cells_per_entity),
            config: config.clone(),
            scratch: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }

    /// Apply pending store changes to the hash.
    pub fn sync(&mut self, store: &mut EntityStore) {
        if !store.has_index_dirty() {
            return;
        }
        let dirty = store.take_index_dirty();
        for id in &dirty {
            match store.get(*id) {
                Some(record) => self.hash.update(*id, record.aabb()),
                None => {
                    self.hash.remove(*id);
                }
            }
        }
        debug!("Pick index synced {} entities", dirty.len());
    }

    /// Drop everything and re-insert every entity.
    pub fn rebuild(&mut self, store: &mut EntityStore) {
        store.take_index_dirty();
        self.hash.clear();
        for record in store.iter_ordered() {
            self.hash.update(record.id, record.aabb());
        }
    }

    /// Hit-test a point. Call [`sync`](Self::sync) first.
    pub fn pick(&mut self, store: &EntityStore, selection: &Selection, query: &PickQuery) -> PickResult {
        if query.mask.is_empty() || !query.point.x.is_finite() || !query.point.y.is_finite() {
            return PickResult::miss();
        }
        let tolerance = if query.tolerance.is_finite() { query.tolerance.max(0.0) } else { 0.0 };
        let metrics = HandleMetrics::new(&self.config, query.scale, tolerance);
        let mut reach = tolerance;
        if query.mask.contains(PickMask::HANDLES) {
            reach = reach
                .max(metrics.resize_radius)
                .max(metrics.rotate_offset + metrics.rotate_radius);
        }
        let area = Rect::from_points(query.point, query.point).inflate(reach, reach);
        let mut candidates = std::mem::take(&mut self.scratch);
        self.hash.query(area, &mut candidates);

        let mut best: Option<Candidate> = None;
        for id in &candidates {
            if !store.is_pickable(*id) {
                continue;
            }
            let Some(record) = store.get(*id) else {
                continue;
            };
            let Some(result) = hit_record(record, query.point, tolerance, query.mask, &metrics) else {
                continue;
            };
            let candidate = Candidate {
                selected_handle: result.sub_target.is_handle() && selection.contains(*id),
                rank: store.rank(*id).unwrap_or(0),
                result,
            };
            if best.is_none_or(|b| candidate.compare(&b) == Ordering::Less) {
                best = Some(candidate);
            }
        }
        self.scratch = candidates;
        best.map(|c| c.result).unwrap_or_else(PickResult::miss)
    }

    /// Entities inside (`Window`) or touching (`Crossing`) `area`, by rank descending then id.
    pub fn pick_area(&mut self, store: &EntityStore, area: Rect, mode: AreaMode) -> Vec<EntityId> {
        let area = area.abs();
        let mut candidates = std::mem::take(&mut self.scratch);
        self.hash.query(area, &mut candidates);
        let mut hits: Vec<EntityId> = candidates
            .iter()
            .copied()
            .filter(|id| store.is_pickable(*id))
            .filter(|id| {
                store
                    .get(*id)
                    .is_some_and(|record| area_test(record, area, mode))
            })
            .collect();
        self.scratch = candidates;
        hits.sort_by(|a, b| {
            let ra = store.rank(*a).unwrap_or(0);
            let rb = store.rank(*b).unwrap_or(0);
            rb.cmp(&ra).then(a.cmp(b))
        });
        hits
    }
}

fn area_test(record: &EntityRecord, area: Rect, mode: AreaMode) -> bool {
    let bounds = record.aabb();
    match mode {
        AreaMode::Window => rect_contains_rect(area, bounds),
        AreaMode::Crossing => match &record.geometry {
            Geometry::Line { p0, p1 } => polyline_intersects_rect(&[*p0, *p1], area),
            Geometry::Arrow { tail, tip, .. } => polyline_intersects_rect(&[*tail, *tip], area),
            Geometry::Polyline { points } => polyline_intersects_rect(points, area),
            _ => rects_overlap(area, bounds),
        },
    }
}

fn result(id: EntityId, sub_target: SubTarget, sub_index: usize, distance: f64, hit: Point) -> PickResult {
    PickResult {
        id,
        sub_target,
        sub_index: sub_index as u32,
        distance,
        hit,
    }
}

/// Best hit on one record, testing handles, then vertices, then edges, then the body.
fn hit_record(
    record: &EntityRecord,
    point: Point,
    tolerance: f64,
    mask: PickMask,
    metrics: &HandleMetrics,
) -> Option<PickResult> {
    let id = record.id;
    let geometry = &record.geometry;

    if mask.contains(PickMask::HANDLES) {
        let mut best: Option<PickResult> = None;
        for handle in handles_for(geometry, metrics).iter() {
            if !handle.hit_test(point) {
                continue;
            }
            let distance = point.distance(handle.position);
            let (sub, index) = match handle.kind {
                HandleKind::Resize(i) => (SubTarget::ResizeHandle, i),
                HandleKind::Rotate(i) => (SubTarget::RotateHandle, i),
            };
            if best.is_none_or(|b| distance < b.distance) {
                best = Some(result(id, sub, index, distance, handle.position));
            }
        }
        if best.is_some() {
            return best;
        }
    }

    if geometry.is_line_like() {
        return hit_line_like(record, point, tolerance, mask);
    }

    let (edge_distance, edge_index, edge_point, inside) = match geometry {
        Geometry::Rect { .. } | Geometry::Text(_) => {
            let obb = geometry.oriented_box()?;
            let (d, inside) = obb.outline_distance(point);
            let (index, at) = nearest_box_side(&obb, point);
            (d, index, at, inside)
        }
        Geometry::Circle { center, rx, ry, rotation } => {
            let obb = OrientedBox::new(*center, *rx, *ry, *rotation);
            let (d, inside, at) = ellipse_outline(&obb, point);
            (d, 0, at, inside)
        }
        Geometry::Polygon { center, rx, ry, rotation, sides } => {
            polygon_outline(*center, *rx, *ry, *rotation, *sides, point)
        }
        Geometry::Line { .. } | Geometry::Arrow { .. } | Geometry::Polyline { .. } => return None,
    };

    if edge_distance <= tolerance {
        if mask.contains(PickMask::EDGE) {
            return Some(result(id, SubTarget::Edge, edge_index, edge_distance, edge_point));
        }
        if mask.contains(PickMask::BODY) {
            let d = if inside { 0.0 } else { edge_distance };
            return Some(result(id, SubTarget::Body, 0, d, point));
        }
    }
    if inside && mask.contains(PickMask::BODY) {
        return Some(result(id, SubTarget::Body, 0, 0.0, point));
    }
    None
}

fn hit_line_like(record: &EntityRecord, point: Point, tolerance: f64, mask: PickMask) -> Option<PickResult> {
    let geometry = &record.geometry;
    if mask.contains(PickMask::VERTEX) {
        let mut best: Option<(usize, f64, Point)> = None;
        for i in 0..geometry.vertex_count() {
            let Some(v) = geometry.vertex(i) else { continue };
            let d = point.distance(v);
            if d <= tolerance && best.is_none_or(|(_, bd, _)| d < bd) {
                best = Some((i, d, v));
            }
        }
        if let Some((i, d, v)) = best {
            return Some(result(record.id, SubTarget::Vertex, i, d, v));
        }
    }
    if !mask.intersects(PickMask::EDGE | PickMask::BODY) {
        return None;
    }
    let mut best: Option<(usize, f64, Point)> = None;
    for i in 0..geometry.segment_count() {
        let Some((a, b)) = geometry.segment(i) else { continue };
        let at = closest_point_on_segment(point, a, b);
        let d = point.distance(at);
        if d <= tolerance && best.is_none_or(|(_, bd, _)| d < bd) {
            best = Some((i, d, at));
        }
    }
    let (i, d, at) = best?;
    if mask.contains(PickMask::EDGE) {
        Some(result(record.id, SubTarget::Edge, i, d, at))
    } else {
        Some(result(record.id, SubTarget::Body, 0, d, at))
    }
}

/// Side index (0 top, 1 right, 2 bottom, 3 left) nearest to `point`, and the
/// closest point on it.
fn nearest_box_side(obb: &OrientedBox, point: Point) -> (usize, Point) {
    let mut best = (0, Point::ZERO, f64::INFINITY);
    for side in 0..4 {
        let a = obb.corner(side);
        let b = obb.corner((side + 1) % 4);
        let at = closest_point_on_segment(point, a, b);
        let d = point.distance(at);
        if d < best.2 {
            best = (side, at, d);
        }
    }
    (best.0, best.1)
}

/// Distance from `point` to an ellipse outline, whether it lies inside, and
/// the closest outline point.
fn ellipse_outline(obb: &OrientedBox, point: Point) -> (f64, bool, Point) {
    let local = obb.to_local(point);
    let (rx, ry) = (obb.half_width, obb.half_height);
    if rx <= f64::EPSILON || ry <= f64::EPSILON {
        let a = obb.to_world(Vec2::new(-rx, -ry));
        let b = obb.to_world(Vec2::new(rx, ry));
        let at = closest_point_on_segment(point, a, b);
        return (point.distance(at), false, at);
    }
    let inside = (local.x / rx).powi(2) + (local.y / ry).powi(2) <= 1.0;
    let on_outline = closest_point_on_ellipse(rx, ry, local);
    ((local - on_outline).hypot(), inside, obb.to_world(on_outline))
}

fn polygon_outline(
    center: Point,
    rx: f64,
    ry: f64,
    rotation: f64,
    sides: u32,
    point: Point,
) -> (f64, usize, Point, bool) {
    let mut best = (f64::INFINITY, 0, center);
    let mut inside = false;
    for i in 0..sides {
        let a = polygon_vertex(center, rx, ry, rotation, sides, i);
        let b = polygon_vertex(center, rx, ry, rotation, sides, (i + 1) % sides);
        let at = closest_point_on_segment(point, a, b);
        let d = point.distance(at);
        if d < best.0 {
            best = (d, i as usize, at);
        }
        if (a.y > point.y) != (b.y > point.y) {
            let x = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if point.x < x {
                inside = !inside;
            }
        }
    }
    (best.0, best.1, best.2, inside)
}
