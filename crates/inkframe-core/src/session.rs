//! Interactive transform sessions: begin, stream updates, then commit or cancel.
//!
//! Updates only ever write the session's scratch records, so cancelling has
//! nothing to revert and per-frame work does not allocate.

use kurbo::{Point, Rect, Vec2};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::InteractionConfig;
use crate::entity::{EntityId, EntityKind, EntityRecord, EntityStore, NO_ENTITY, StoreError};
use crate::error::ErrorKind;
use crate::geometry::{OrientedBox, bounds_of, rotate_about};
use crate::history::History;
use crate::input::Modifiers;
use crate::selection::Selection;
use crate::snap::{AxisLock, snap_angle, snap_segment_end, snap_to_grid};
use crate::view::{ViewProvider, Viewport};
use crate::wire::{WireError, try_reserve};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a transform session is already active")]
    AlreadyActive,
    #[error("no transform session is active")]
    NotActive,
    #[error("no pickable entity to transform")]
    NoTargets,
    #[error("{mode:?} is not supported for entity {id}")]
    UnsupportedMode { id: EntityId, mode: TransformMode },
    #[error("entity {id} has no handle, vertex or edge {index}")]
    InvalidHandle { id: EntityId, index: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Buffer(#[from] WireError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Store(e) => e.kind(),
            SessionError::Buffer(e) => e.kind(),
            _ => ErrorKind::SessionMisuse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransformMode {
    Move = 0,
    Resize = 1,
    Rotate = 2,
    VertexDrag = 3,
    EdgeDrag = 4,
}

/// Arguments of [`InteractionSession::begin`].
#[derive(Debug, Clone, Copy)]
pub struct BeginTransform<'a> {
    /// Fallback targets when there is neither a specific id nor a selection.
    pub ids: &'a [EntityId],
    pub mode: TransformMode,
    /// Entity whose handle, vertex or edge was grabbed.
    pub specific_id: EntityId,
    /// Resize corner, vertex or edge index, depending on the mode.
    pub handle_index: u32,
    /// Pointer position in screen pixels.
    pub screen: Point,
    pub modifiers: Modifiers,
}

/// Result of [`InteractionSession::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing moved; no history entry was written.
    Discarded,
    Committed { entity_count: usize },
}

#[derive(Debug, Clone)]
struct Target {
    original: EntityRecord,
    scratch: EntityRecord,
}

/// Resize anchor in the grabbed entity's unrotated frame.
#[derive(Debug, Clone, Copy)]
enum ResizeFrame {
    /// Box kinds: the oriented box at begin and the fixed opposite corner.
    Box { frame: OrientedBox, anchor: Vec2, base: Vec2 },
    /// Line-like kinds: points scale inside their axis-aligned bounds.
    Points { anchor: Point, base: Vec2 },
}

#[derive(Debug)]
struct ActiveSession {
    mode: TransformMode,
    targets: Vec<Target>,
    specific_id: EntityId,
    /// Current handle index; resize swaps it when the cursor crosses the anchor.
    handle_index: usize,
    /// Starting point of the drag in world space.
    start_point: Point,
    /// Latest cursor position in world space.
    current_point: Point,
    /// Screen pixels per world unit at begin.
    scale: f64,
    dragging: bool,
    axis_lock: AxisLock,
    resize: Option<ResizeFrame>,
    /// Rotation pivot in world space.
    pivot: Point,
}

/// At most one active transform at a time.
#[derive(Debug)]
pub struct InteractionSession {
    config: InteractionConfig,
    active: Option<ActiveSession>,
}

impl InteractionSession {
    pub fn new(config: &InteractionConfig) -> Self {
        Self {
            config: config.clone(),
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn mode(&self) -> Option<TransformMode> {
        self.active.as_ref().map(|s| s.mode)
    }

    /// Whether the drag threshold has been crossed.
    pub fn is_dragging(&self) -> bool {
        self.active.as_ref().is_some_and(|s| s.dragging)
    }

    pub fn handle_index(&self) -> Option<usize> {
        self.active.as_ref().map(|s| s.handle_index)
    }

    pub fn target_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.active
            .iter()
            .flat_map(|s| s.targets.iter().map(|t| t.original.id))
    }

    /// Live preview records, one per target.
    pub fn scratch(&self) -> impl Iterator<Item = &EntityRecord> + '_ {
        self.active.iter().flat_map(|s| s.targets.iter().map(|t| &t.scratch))
    }

    pub fn begin(
        &mut self,
        request: &BeginTransform<'_>,
        store: &EntityStore,
        selection: &Selection,
        viewport: &Viewport,
    ) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        let specific = (request.specific_id != NO_ENTITY)
            .then(|| store.get(request.specific_id))
            .flatten();
        let line_like_specific = specific.is_some_and(|r| r.geometry.is_line_like());
        let uses_specific = match request.mode {
            TransformMode::Resize | TransformMode::Rotate | TransformMode::VertexDrag => {
                request.specific_id != NO_ENTITY
            }
            TransformMode::EdgeDrag => line_like_specific,
            TransformMode::Move => false,
        };
        let candidates: &[EntityId] = if uses_specific {
            std::slice::from_ref(&request.specific_id)
        } else if !selection.is_empty() {
            selection.ids()
        } else {
            request.ids
        };

        let mut targets = Vec::new();
        try_reserve(&mut targets, candidates.len())?;
        for id in candidates {
            if !store.is_pickable(*id) || targets.iter().any(|t: &Target| t.original.id == *id) {
                continue;
            }
            if let Some(record) = store.get(*id) {
                targets.push(Target {
                    original: record.clone(),
                    scratch: record.clone(),
                });
            }
        }
        if targets.is_empty() {
            return Err(SessionError::NoTargets);
        }

        // EdgeDrag on a box-shaped kind moves it like any other drag.
        let mode = match request.mode {
            TransformMode::EdgeDrag if !uses_specific => TransformMode::Move,
            mode => mode,
        };
        let index = request.handle_index as usize;
        let first = &targets[0].original;
        let invalid = || SessionError::InvalidHandle {
            id: first.id,
            index: request.handle_index,
        };
        let mut resize = None;
        match mode {
            TransformMode::Resize => {
                if index > 3 {
                    return Err(invalid());
                }
                resize = Some(resize_frame(first, index).ok_or(SessionError::UnsupportedMode {
                    id: first.id,
                    mode,
                })?);
            }
            TransformMode::VertexDrag => {
                if !first.geometry.is_line_like() {
                    return Err(SessionError::UnsupportedMode { id: first.id, mode });
                }
                if index >= first.geometry.vertex_count() {
                    return Err(invalid());
                }
            }
            TransformMode::EdgeDrag => {
                if index >= first.geometry.segment_count() {
                    return Err(invalid());
                }
            }
            TransformMode::Move | TransformMode::Rotate => {}
        }

        let pivot = if targets.len() == 1 {
            match first.geometry.oriented_box() {
                Some(frame) => frame.center,
                None => first.aabb().center(),
            }
        } else {
            targets
                .iter()
                .map(|t| t.original.aabb())
                .reduce(|a, b| a.union(b))
                .unwrap_or(Rect::ZERO)
                .center()
        };

        let start_point = viewport.screen_to_world(request.screen);
        debug!(
            "Session begin: {:?} on {} entities at {:?}",
            mode,
            targets.len(),
            start_point
        );
        self.active = Some(ActiveSession {
            mode,
            targets,
            specific_id: request.specific_id,
            handle_index: index,
            start_point,
            current_point: start_point,
            scale: viewport.current_scale(),
            dragging: false,
            axis_lock: AxisLock::Free,
            resize,
            pivot,
        });
        Ok(())
    }

    /// Recompute every scratch record for the cursor at `world`.
    ///
    /// Returns whether the drag threshold has been crossed.
    pub fn update(&mut self, world: Point, modifiers: Modifiers) -> Result<bool, SessionError> {
        let config = &self.config;
        let session = self.active.as_mut().ok_or(SessionError::NotActive)?;
        session.current_point = world;
        let raw = world - session.start_point;
        let screen = raw * session.scale;
        if !session.dragging {
            if screen.hypot() < config.drag_threshold_px {
                return Ok(false);
            }
            session.dragging = true;
        }
        let grid = config.grid_snap && !modifiers.suppresses_grid();
        let cursor = if grid {
            snap_to_grid(world, config.grid_size)
        } else {
            world
        };

        match session.mode {
            TransformMode::Move => {
                session.axis_lock = if modifiers.shift() {
                    session.axis_lock.advance(screen.x, screen.y, config)
                } else {
                    AxisLock::Free
                };
                let mut delta = session.axis_lock.constrain(raw);
                if grid {
                    delta = snap_to_grid(delta.to_point(), config.grid_size).to_vec2();
                }
                for target in &mut session.targets {
                    target.scratch.assign_from(&target.original);
                    target.scratch.geometry.translate(delta);
                }
            }
            TransformMode::Resize => {
                if let Some(frame) = session.resize {
                    let target = &mut session.targets[0];
                    target.scratch.assign_from(&target.original);
                    session.handle_index = apply_resize(&mut target.scratch, frame, cursor, modifiers.shift());
                }
            }
            TransformMode::Rotate => {
                let start = session.start_point - session.pivot;
                let now = world - session.pivot;
                let delta = now.y.atan2(now.x) - start.y.atan2(start.x);
                for target in &mut session.targets {
                    target.scratch.assign_from(&target.original);
                    rotate_record(
                        &mut target.scratch,
                        session.pivot,
                        delta,
                        modifiers.shift().then_some(config.rotation_snap_degrees),
                    );
                }
            }
            TransformMode::VertexDrag => {
                let index = session.handle_index;
                let target = &mut session.targets[0];
                target.scratch.assign_from(&target.original);
                let geometry = &target.original.geometry;
                if let Some(vertex) = geometry.vertex(index) {
                    let mut moved = vertex + raw;
                    if grid {
                        moved = snap_to_grid(moved, config.grid_size);
                    }
                    if modifiers.shift() {
                        let neighbour = if index > 0 {
                            geometry.vertex(index - 1)
                        } else {
                            geometry.vertex(1)
                        };
                        if let Some(neighbour) = neighbour {
                            moved = snap_segment_end(neighbour, moved, config.vertex_snap_degrees);
                        }
                    }
                    target.scratch.geometry.set_vertex(index, moved);
                }
            }
            TransformMode::EdgeDrag => {
                let index = session.handle_index;
                let mut delta = raw;
                if grid {
                    delta = snap_to_grid(delta.to_point(), config.grid_size).to_vec2();
                }
                let target = &mut session.targets[0];
                target.scratch.assign_from(&target.original);
                for vertex in [index, index + 1] {
                    if let Some(p) = target.original.geometry.vertex(vertex) {
                        target.scratch.geometry.set_vertex(vertex, p + delta);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Write the scratch records into the store as one history entry.
    pub fn commit(&mut self, store: &mut EntityStore, history: &mut History) -> Result<CommitOutcome, SessionError> {
        let session = self.active.take().ok_or(SessionError::NotActive)?;
        let changed = session
            .targets
            .iter()
            .filter(|t| t.scratch != t.original)
            .count();
        if !session.dragging || changed == 0 {
            debug!("Session discarded without displacement");
            return Ok(CommitOutcome::Discarded);
        }
        for target in &session.targets {
            if target.scratch != target.original && !store.contains(target.original.id) {
                warn!("Session target {} vanished before commit", target.original.id);
                return Err(StoreError::UnknownEntity(target.original.id).into());
            }
        }
        history.begin(store);
        for target in session.targets.iter().filter(|t| t.scratch != t.original) {
            history.mark_entity(store, target.original.id);
            if let Err(e) = store.write_record(&target.scratch) {
                if let Err(rollback) = history.rollback(store) {
                    warn!("Session rollback failed: {rollback}");
                }
                return Err(e.into());
            }
        }
        history.commit(store);
        debug!(
            "Session committed: {:?} on {changed} entities (grabbed {})",
            session.mode, session.specific_id
        );
        Ok(CommitOutcome::Committed { entity_count: changed })
    }

    /// Drop the session. The store was never touched.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        let session = self.active.take().ok_or(SessionError::NotActive)?;
        debug!("Session cancelled after reaching {:?}", session.current_point);
        Ok(())
    }
}

fn resize_frame(record: &EntityRecord, handle: usize) -> Option<ResizeFrame> {
    let geometry = &record.geometry;
    if geometry.is_line_like() {
        let bounds = bounds_of((0..geometry.vertex_count()).filter_map(|i| geometry.vertex(i)))?;
        let corners = rect_corners(bounds);
        let anchor = corners[(handle + 2) % 4];
        return Some(ResizeFrame::Points {
            anchor,
            base: corners[handle] - anchor,
        });
    }
    if record.kind() == EntityKind::Text {
        return None;
    }
    let frame = geometry.oriented_box()?;
    let anchor = frame.local_corner((handle + 2) % 4);
    Some(ResizeFrame::Box {
        frame,
        anchor,
        base: frame.local_corner(handle) - anchor,
    })
}

fn rect_corners(r: Rect) -> [Point; 4] {
    [
        Point::new(r.x0, r.y0),
        Point::new(r.x1, r.y0),
        Point::new(r.x1, r.y1),
        Point::new(r.x0, r.y1),
    ]
}

/// Keep `d` at the aspect of `base`, letting the dominant normalized axis drive.
fn lock_aspect(d: Vec2, base: Vec2) -> Vec2 {
    let (bw, bh) = (base.x.abs(), base.y.abs());
    if bw < 1e-9 || bh < 1e-9 {
        return d;
    }
    let aspect = bw / bh;
    let sign = |v: f64| if v < 0.0 { -1.0 } else { 1.0 };
    if d.x.abs() / bw >= d.y.abs() / bh {
        Vec2::new(d.x, sign(d.y) * d.x.abs() / aspect)
    } else {
        Vec2::new(sign(d.x) * d.y.abs() * aspect, d.y)
    }
}

/// Corner index the cursor sits at relative to the anchor (y-down).
fn handle_for(d: Vec2) -> usize {
    match (d.x >= 0.0, d.y >= 0.0) {
        (false, false) => 0,
        (true, false) => 1,
        (true, true) => 2,
        (false, true) => 3,
    }
}

fn apply_resize(scratch: &mut EntityRecord, frame: ResizeFrame, cursor: Point, keep_aspect: bool) -> usize {
    match frame {
        ResizeFrame::Box { frame, anchor, base } => {
            let mut d = frame.to_local(cursor) - anchor;
            if keep_aspect {
                d = lock_aspect(d, base);
            }
            let center = frame.to_world(anchor + d * 0.5);
            scratch.geometry.set_box(center, d.x.abs() / 2.0, d.y.abs() / 2.0);
            handle_for(d)
        }
        ResizeFrame::Points { anchor, base } => {
            let mut d = cursor - anchor;
            if keep_aspect {
                d = lock_aspect(d, base);
            }
            let sx = if base.x.abs() > 1e-9 { d.x / base.x } else { 1.0 };
            let sy = if base.y.abs() > 1e-9 { d.y / base.y } else { 1.0 };
            for i in 0..scratch.geometry.vertex_count() {
                if let Some(p) = scratch.geometry.vertex(i) {
                    let scaled = Point::new(anchor.x + (p.x - anchor.x) * sx, anchor.y + (p.y - anchor.y) * sy);
                    scratch.geometry.set_vertex(i, scaled);
                }
            }
            handle_for(d)
        }
    }
}

fn rotate_record(scratch: &mut EntityRecord, pivot: Point, delta: f64, snap_degrees: Option<f64>) {
    let geometry = &mut scratch.geometry;
    if let Some(frame) = geometry.oriented_box() {
        let mut angle = frame.rotation + delta;
        if let Some(step) = snap_degrees {
            angle = snap_angle(angle, step);
        }
        let center = rotate_about(frame.center, pivot, angle - frame.rotation);
        geometry.set_box(center, frame.half_width, frame.half_height);
        geometry.set_rotation(angle);
        return;
    }
    let delta = match snap_degrees {
        Some(step) => snap_angle(delta, step),
        None => delta,
    };
    for i in 0..geometry.vertex_count() {
        if let Some(p) = geometry.vertex(i) {
            geometry.set_vertex(i, rotate_about(p, pivot, delta));
        }
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Size;

    use super::*;
    use crate::config::HistoryConfig;
    use crate::entity::{EntityFlags, Geometry, Style};
    use crate::selection::SelectMode;

    const EPS: f64 = 1e-9;

    struct Fixture {
        store: EntityStore,
        history: History,
        selection: Selection,
        viewport: Viewport,
        session: InteractionSession,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: EntityStore::new(),
                history: History::new(&HistoryConfig::default()),
                selection: Selection::new(),
                viewport: Viewport::new(Size::new(800.0, 600.0)),
                session: InteractionSession::new(&InteractionConfig::default()),
            }
        }

        fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) -> EntityId {
            let geometry = Geometry::Rect {
                origin: Point::new(x, y),
                size: Size::new(w, h),
                rotation: 0.0,
            };
            self.store.create(geometry, Style::default()).unwrap()
        }

        fn begin(&mut self, mode: TransformMode, ids: &[EntityId], specific_id: EntityId, handle: u32, at: Point) {
            let request = BeginTransform {
                ids,
                mode,
                specific_id,
                handle_index: handle,
                screen: at,
                modifiers: Modifiers::empty(),
            };
            self.session
                .begin(&request, &self.store, &self.selection, &self.viewport)
                .unwrap();
        }

        fn commit(&mut self) -> CommitOutcome {
            self.session.commit(&mut self.store, &mut self.history).unwrap()
        }
    }

    fn rect_of(store: &EntityStore, id: EntityId) -> (Point, Size, f64) {
        match &store.get(id).unwrap().geometry {
            Geometry::Rect { origin, size, rotation } => (*origin, *size, *rotation),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_resize_bottom_right_then_undo() {
        let mut fx = Fixture::new();
        let id = fx.rect(0.0, 0.0, 100.0, 100.0);
        fx.begin(TransformMode::Resize, &[], id, 2, Point::new(100.0, 100.0));
        assert!(fx.session.update(Point::new(150.0, 150.0), Modifiers::empty()).unwrap());
        assert_eq!(fx.commit(), CommitOutcome::Committed { entity_count: 1 });

        let (origin, size, _) = rect_of(&fx.store, id);
        assert!(origin.x.abs() < EPS && origin.y.abs() < EPS);
        assert!((size.width - 150.0).abs() < EPS);
        assert!((size.height - 150.0).abs() < EPS);

        fx.history.undo(&mut fx.store).unwrap();
        let (_, size, _) = rect_of(&fx.store, id);
        assert!((size.width - 100.0).abs() < EPS);
        assert!((size.height - 100.0).abs() < EPS);
    }

    #[test]
    fn test_resize_crossing_anchor_flips_handle() {
        let mut fx = Fixture::new();
        let id = fx.rect(0.0, 0.0, 100.0, 100.0);
        fx.begin(TransformMode::Resize, &[], id, 2, Point::new(100.0, 100.0));
        fx.session.update(Point::new(-50.0, 150.0), Modifiers::empty()).unwrap();
        assert_eq!(fx.session.handle_index(), Some(3));
        let scratch = fx.session.scratch().next().unwrap();
        match &scratch.geometry {
            Geometry::Rect { origin, size, .. } => {
                assert!((origin.x + 50.0).abs() < EPS);
                assert!((size.width - 50.0).abs() < EPS);
                assert!((size.height - 150.0).abs() < EPS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_resize_keeps_aspect_with_shift() {
        let mut fx = Fixture::new();
        let id = fx.rect(0.0, 0.0, 200.0, 100.0);
        fx.begin(TransformMode::Resize, &[], id, 2, Point::new(200.0, 100.0));
        fx.session.update(Point::new(400.0, 120.0), Modifiers::SHIFT).unwrap();
        fx.commit();
        let (_, size, _) = rect_of(&fx.store, id);
        assert!((size.width - 400.0).abs() < EPS);
        assert!((size.height - 200.0).abs() < EPS);
    }

    #[test]
    fn test_resize_rotated_rect_keeps_anchor() {
        let mut fx = Fixture::new();
        let geometry = Geometry::Rect {
            origin: Point::new(0.0, 0.0),
            size: Size::new(100.0, 100.0),
            rotation: std::f64::consts::FRAC_PI_2,
        };
        let id = fx.store.create(geometry.clone(), Style::default()).unwrap();
        let frame = geometry.oriented_box().unwrap();
        let anchor = frame.corner(0);
        let handle = frame.corner(2);
        fx.begin(TransformMode::Resize, &[], id, 2, handle);
        let target = frame.to_world(frame.local_corner(2) * 1.5 + Vec2::new(25.0, 25.0));
        fx.session.update(target, Modifiers::empty()).unwrap();
        fx.commit();
        let resized = fx.store.get(id).unwrap().geometry.oriented_box().unwrap();
        assert!((resized.corner(0) - anchor).hypot() < 1e-6);
    }

    #[test]
    fn test_cancel_leaves_store_untouched() {
        let mut fx = Fixture::new();
        let id = fx.rect(0.0, 0.0, 10.0, 10.0);
        let before = fx.store.get(id).unwrap().clone();
        let generation = fx.store.generation();
        fx.begin(TransformMode::Move, &[id], NO_ENTITY, 0, Point::new(5.0, 5.0));
        fx.session.update(Point::new(50.0, 80.0), Modifiers::empty()).unwrap();
        fx.session.cancel().unwrap();
        assert_eq!(fx.store.get(id).unwrap(), &before);
        assert_eq!(fx.store.generation(), generation);
        assert!(fx.history.is_empty());
        assert!(!fx.session.is_active());
    }

    #[test]
    fn test_below_threshold_is_discarded() {
        let mut fx = Fixture::new();
        let id = fx.rect(0.0, 0.0, 10.0, 10.0);
        fx.begin(TransformMode::Move, &[id], NO_ENTITY, 0, Point::new(5.0, 5.0));
        assert!(!fx.session.update(Point::new(6.0, 6.0), Modifiers::empty()).unwrap());
        assert_eq!(fx.commit(), CommitOutcome::Discarded);
        assert!(fx.history.is_empty());
    }

    #[test]
    fn test_multi_move_is_one_undo_step() {
        let mut fx = Fixture::new();
        let a = fx.rect(0.0, 0.0, 10.0, 10.0);
        let b = fx.rect(50.0, 0.0, 10.0, 10.0);
        fx.selection.apply(&[a, b], SelectMode::Replace);
        fx.begin(TransformMode::Move, &[], NO_ENTITY, 0, Point::new(5.0, 5.0));
        fx.session.update(Point::new(25.0, 35.0), Modifiers::empty()).unwrap();
        assert_eq!(fx.commit(), CommitOutcome::Committed { entity_count: 2 });
        assert_eq!(fx.history.len(), 1);
        assert!((rect_of(&fx.store, b).0.x - 70.0).abs() < EPS);

        fx.history.undo(&mut fx.store).unwrap();
        assert!(rect_of(&fx.store, a).0.x.abs() < EPS);
        assert!((rect_of(&fx.store, b).0.x - 50.0).abs() < EPS);
    }

    #[test]
    fn test_shift_move_locks_axis() {
        let mut fx = Fixture::new();
        let id = fx.rect(0.0, 0.0, 10.0, 10.0);
        fx.begin(TransformMode::Move, &[id], NO_ENTITY, 0, Point::new(0.0, 0.0));
        fx.session.update(Point::new(30.0, 5.0), Modifiers::SHIFT).unwrap();
        fx.commit();
        let (origin, _, _) = rect_of(&fx.store, id);
        assert!((origin.x - 30.0).abs() < EPS);
        assert!(origin.y.abs() < EPS);
    }

    #[test]
    fn test_shift_axis_lock_flips_mid_drag() {
        let mut fx = Fixture::new();
        let id = fx.rect(0.0, 0.0, 10.0, 10.0);
        fx.begin(TransformMode::Move, &[id], NO_ENTITY, 0, Point::new(0.0, 0.0));
        let origin = |session: &InteractionSession| match &session.scratch().next().unwrap().geometry {
            Geometry::Rect { origin, .. } => *origin,
            other => panic!("unexpected {other:?}"),
        };

        fx.session.update(Point::new(30.0, 5.0), Modifiers::SHIFT).unwrap();
        let at = origin(&fx.session);
        assert!((at.x - 30.0).abs() < EPS && at.y.abs() < EPS);

        // Not dominant enough to leave the x lock yet.
        fx.session.update(Point::new(30.0, 33.0), Modifiers::SHIFT).unwrap();
        let at = origin(&fx.session);
        assert!((at.x - 30.0).abs() < EPS && at.y.abs() < EPS);

        fx.session.update(Point::new(30.0, 80.0), Modifiers::SHIFT).unwrap();
        let at = origin(&fx.session);
        assert!(at.x.abs() < EPS && (at.y - 80.0).abs() < EPS);

        fx.commit();
        let (committed, _, _) = rect_of(&fx.store, id);
        assert!(committed.x.abs() < EPS && (committed.y - 80.0).abs() < EPS);
    }

    #[test]
    fn test_grid_snap_unless_ctrl() {
        let mut fx = Fixture::new();
        fx.session = InteractionSession::new(&InteractionConfig {
            grid_snap: true,
            ..InteractionConfig::default()
        });
        let id = fx.rect(0.0, 0.0, 10.0, 10.0);
        fx.begin(TransformMode::Move, &[id], NO_ENTITY, 0, Point::new(0.0, 0.0));
        fx.session.update(Point::new(27.0, 13.0), Modifiers::empty()).unwrap();
        let snapped = fx.session.scratch().next().unwrap().aabb();
        assert!((snapped.x0 - 20.0).abs() < EPS && (snapped.y0 - 20.0).abs() < EPS);
        fx.session.update(Point::new(27.0, 13.0), Modifiers::CTRL).unwrap();
        let free = fx.session.scratch().next().unwrap().aabb();
        assert!((free.x0 - 27.0).abs() < EPS && (free.y0 - 13.0).abs() < EPS);
    }

    #[test]
    fn test_rotate_snaps_to_fifteen_degrees() {
        let mut fx = Fixture::new();
        let id = fx.rect(-50.0, -50.0, 100.0, 100.0);
        fx.begin(TransformMode::Rotate, &[], id, 0, Point::new(100.0, 0.0));
        let angle = 50f64.to_radians();
        fx.session
            .update(Point::new(100.0 * angle.cos(), 100.0 * angle.sin()), Modifiers::SHIFT)
            .unwrap();
        fx.commit();
        let (origin, _, rotation) = rect_of(&fx.store, id);
        assert!((rotation - 45f64.to_radians()).abs() < 1e-9);
        assert!((origin.x + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_vertex_drag_with_angle_snap() {
        let mut fx = Fixture::new();
        let line = Geometry::Line {
            p0: Point::new(0.0, 0.0),
            p1: Point::new(100.0, 0.0),
        };
        let id = fx.store.create(line, Style::default()).unwrap();
        fx.begin(TransformMode::VertexDrag, &[], id, 1, Point::new(100.0, 0.0));
        fx.session.update(Point::new(100.0, 90.0), Modifiers::SHIFT).unwrap();
        fx.commit();
        match &fx.store.get(id).unwrap().geometry {
            Geometry::Line { p0, p1 } => {
                assert_eq!(*p0, Point::new(0.0, 0.0));
                assert!((p1.x - p1.y).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_edge_drag_moves_both_vertices() {
        let mut fx = Fixture::new();
        let points = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(20.0, 0.0)];
        let id = fx
            .store
            .create(Geometry::Polyline { points }, Style::default())
            .unwrap();
        fx.begin(TransformMode::EdgeDrag, &[], id, 1, Point::new(15.0, 0.0));
        fx.session.update(Point::new(15.0, 10.0), Modifiers::empty()).unwrap();
        fx.commit();
        match &fx.store.get(id).unwrap().geometry {
            Geometry::Polyline { points } => {
                assert_eq!(points[0], Point::new(0.0, 0.0));
                assert_eq!(points[1], Point::new(10.0, 10.0));
                assert_eq!(points[2], Point::new(20.0, 10.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_misuse_errors() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.session.update(Point::ORIGIN, Modifiers::empty()),
            Err(SessionError::NotActive)
        );
        assert_eq!(fx.session.cancel(), Err(SessionError::NotActive));

        let id = fx.rect(0.0, 0.0, 10.0, 10.0);
        fx.begin(TransformMode::Move, &[id], NO_ENTITY, 0, Point::ORIGIN);
        let request = BeginTransform {
            ids: &[id],
            mode: TransformMode::Move,
            specific_id: NO_ENTITY,
            handle_index: 0,
            screen: Point::ORIGIN,
            modifiers: Modifiers::empty(),
        };
        let err = fx
            .session
            .begin(&request, &fx.store, &fx.selection, &fx.viewport)
            .unwrap_err();
        assert_eq!(err, SessionError::AlreadyActive);
        assert_eq!(err.kind(), ErrorKind::SessionMisuse);
        assert!(fx.session.is_active());
    }

    #[test]
    fn test_locked_entities_are_skipped() {
        let mut fx = Fixture::new();
        let id = fx.rect(0.0, 0.0, 10.0, 10.0);
        fx.store
            .set_flags(id, EntityFlags::VISIBLE | EntityFlags::LOCKED)
            .unwrap();
        let request = BeginTransform {
            ids: &[id],
            mode: TransformMode::Move,
            specific_id: NO_ENTITY,
            handle_index: 0,
            screen: Point::ORIGIN,
            modifiers: Modifiers::empty(),
        };
        let err = fx
            .session
            .begin(&request, &fx.store, &fx.selection, &fx.viewport)
            .unwrap_err();
        assert_eq!(err, SessionError::NoTargets);
    }
}
