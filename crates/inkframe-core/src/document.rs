//! The owned per-document context tying every component together.

use kurbo::{Point, Rect};
use log::{debug, info, warn};

use crate::command::{ApplyContext, ApplyReport, apply_commands};
use crate::config::EngineConfig;
use crate::digest::{self, DocumentDigest};
use crate::entity::{EntityId, EntityRecord, EntityStore, RenderDirty, StoreChange, StoreError};
use crate::error::EngineResult;
use crate::events::{Event, EventQueue};
use crate::history::History;
use crate::input::Modifiers;
use crate::pick::{AreaMode, PickIndex, PickMask, PickQuery, PickResult};
use crate::selection::{HandleMetrics, SelectMode, Selection};
use crate::session::{BeginTransform, CommitOutcome, InteractionSession};
use crate::snapshot::{self, DocumentMeta};
use crate::style::{self, SelectionStyleSummary};
use crate::text::{GlyphProvider, MonospaceGlyphs};
use crate::transform_log::{TransformLog, TransformLogEntry};
use crate::view::{ViewProvider, Viewport};

/// One open document. Documents share nothing, so any number may live in a process.
pub struct Document {
    meta: DocumentMeta,
    config: EngineConfig,
    store: EntityStore,
    pick: PickIndex,
    selection: Selection,
    history: History,
    events: EventQueue,
    session: InteractionSession,
    viewport: Viewport,
    glyphs: Box<dyn GlyphProvider>,
    transform_log: Option<TransformLog>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("meta", &self.meta)
            .field("entities", &self.store.len())
            .field("selection", &self.selection)
            .field("history", &self.history.len())
            .field("session", &self.session.mode())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Document {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_glyphs(config, Box::new(MonospaceGlyphs::new()))
    }

    pub fn with_glyphs(config: EngineConfig, glyphs: Box<dyn GlyphProvider>) -> Self {
        Self {
            meta: DocumentMeta::default(),
            store: EntityStore::new(),
            pick: PickIndex::new(&config.pick),
            selection: Selection::new(),
            history: History::new(&config.history),
            events: EventQueue::new(config.events.capacity),
            session: InteractionSession::new(&config.interaction),
            viewport: Viewport::default(),
            glyphs,
            transform_log: None,
            config,
        }
    }

    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.meta.name = name.into();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn glyphs(&self) -> &dyn GlyphProvider {
        self.glyphs.as_ref()
    }

    /// Bumped by every store mutation.
    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    /// Entities the render builder has to revisit since the last call.
    pub fn take_render_dirty(&mut self) -> RenderDirty {
        self.store.take_render_dirty()
    }

    /// Content digest over layers, entities, order, selection and next id.
    pub fn digest(&self) -> DocumentDigest {
        digest::digest(&self.store, self.selection.ids())
    }

    /// Cancel a running session before a mutation that would invalidate it.
    fn interrupt_session(&mut self, reason: &str) {
        if self.session.is_active() {
            warn!("Cancelling the active transform session before {reason}");
            self.session.cancel().ok();
            self.log_transform(TransformLogEntry::Cancel);
        }
    }

    fn log_transform(&mut self, entry: TransformLogEntry) {
        if let Some(log) = self.transform_log.as_mut() {
            log.record(entry);
        }
    }

    /// Move journaled store changes into the event queue and prune the selection.
    fn publish(&mut self, history_changed: bool) {
        let journal = self.store.take_journal();
        self.events.record_all(journal);
        let store = &self.store;
        if self.selection.retain_live(|id| store.contains(id)) {
            self.events.record_selection();
        }
        if history_changed {
            self.events.record_history();
        }
    }

    // --- commands ---

    /// Apply a binary command buffer atomically.
    pub fn apply_commands(&mut self, bytes: &[u8]) -> EngineResult<ApplyReport> {
        self.interrupt_session("applying commands");
        let result = apply_commands(
            bytes,
            ApplyContext {
                store: &mut self.store,
                history: &mut self.history,
                glyphs: self.glyphs.as_ref(),
                viewport: &mut self.viewport,
            },
        );
        match result {
            Ok(report) => {
                self.publish(report.recorded);
                Ok(report)
            }
            Err(e) => {
                // A rolled-back batch must not leak events.
                self.store.take_journal();
                debug!("Command buffer rejected: {e}");
                Err(e.into())
            }
        }
    }

    /// Remove every entity as one undoable step.
    pub fn clear(&mut self) {
        self.interrupt_session("clearing the document");
        if self.store.is_empty() {
            return;
        }
        self.history.begin(&self.store);
        self.history.mark_order(&self.store);
        for id in self.store.draw_order().to_vec() {
            self.history.mark_entity(&self.store, id);
        }
        self.store.clear();
        let recorded = self.history.commit(&self.store);
        self.publish(recorded);
    }

    // --- selection and picking ---

    pub fn select(&mut self, ids: &[EntityId], mode: SelectMode) -> EngineResult<bool> {
        if let Some(unknown) = ids.iter().find(|id| !self.store.contains(**id)) {
            return Err(StoreError::UnknownEntity(*unknown).into());
        }
        let changed = self.selection.apply(ids, mode);
        if changed {
            self.events.record_selection();
        }
        Ok(changed)
    }

    pub fn clear_selection(&mut self) -> bool {
        let changed = self.selection.clear();
        if changed {
            self.events.record_selection();
        }
        changed
    }

    /// Hit-test a world point with a world-space tolerance.
    pub fn pick(&mut self, point: Point, tolerance: f64, mask: PickMask) -> PickResult {
        self.pick.sync(&mut self.store);
        let query = PickQuery {
            point,
            tolerance,
            mask,
            scale: self.viewport.current_scale(),
        };
        self.pick.pick(&self.store, &self.selection, &query)
    }

    /// Hit-test a screen point using the configured pixel tolerance.
    pub fn pick_screen(&mut self, screen: Point, mask: PickMask) -> PickResult {
        let world = self.viewport.screen_to_world(screen);
        let tolerance = self.config.pick.tolerance_px / self.viewport.current_scale();
        self.pick(world, tolerance, mask)
    }

    pub fn pick_area(&mut self, area: Rect, mode: AreaMode) -> Vec<EntityId> {
        self.pick.sync(&mut self.store);
        self.pick.pick_area(&self.store, area, mode)
    }

    /// Shared style of the selected entities, for a style panel.
    pub fn selection_style(&self) -> SelectionStyleSummary {
        style::summarize(&self.store, self.selection.ids())
    }

    /// Selected pickable records in selection order. Targets of a running
    /// session are returned in their previewed state.
    pub fn selected_records(&self) -> Vec<&EntityRecord> {
        self.selection
            .ids()
            .iter()
            .filter(|id| self.store.is_pickable(**id))
            .filter_map(|id| {
                self.session
                    .scratch()
                    .find(|r| r.id == *id)
                    .or_else(|| self.store.get(*id))
            })
            .collect()
    }

    /// Handle sizes in world units at the current zoom.
    pub fn handle_metrics(&self) -> HandleMetrics {
        HandleMetrics::new(&self.config.pick, self.viewport.current_scale(), 0.0)
    }

    // --- transform sessions ---

    pub fn begin_transform(&mut self, request: &BeginTransform<'_>) -> EngineResult<()> {
        self.session
            .begin(request, &self.store, &self.selection, &self.viewport)?;
        if self.transform_log.is_some() {
            let entry = TransformLogEntry::Begin {
                ids: self.session.target_ids().collect(),
                mode: request.mode,
                specific_id: request.specific_id,
                handle_index: request.handle_index,
                screen: request.screen,
                modifiers: request.modifiers,
            };
            self.log_transform(entry);
        }
        Ok(())
    }

    pub fn update_transform(&mut self, world: Point, modifiers: Modifiers) -> EngineResult<bool> {
        let dragging = self.session.update(world, modifiers)?;
        self.log_transform(TransformLogEntry::Update { world, modifiers });
        Ok(dragging)
    }

    pub fn commit_transform(&mut self) -> EngineResult<CommitOutcome> {
        let outcome = self.session.commit(&mut self.store, &mut self.history);
        match outcome {
            Ok(CommitOutcome::Committed { .. }) => self.publish(true),
            Ok(CommitOutcome::Discarded) => {}
            Err(_) => {
                self.store.take_journal();
            }
        }
        let outcome = outcome?;
        self.log_transform(TransformLogEntry::Commit);
        Ok(outcome)
    }

    pub fn cancel_transform(&mut self) -> EngineResult<()> {
        self.session.cancel()?;
        self.log_transform(TransformLogEntry::Cancel);
        Ok(())
    }

    pub fn is_transforming(&self) -> bool {
        self.session.is_active()
    }

    /// Live session preview records for overlay rendering.
    pub fn transform_preview(&self) -> impl Iterator<Item = &EntityRecord> + '_ {
        self.session.scratch()
    }

    // --- transform log ---

    /// Start recording transform sessions, keeping at most `capacity` entries.
    pub fn enable_transform_log(&mut self, capacity: usize) {
        self.transform_log = Some(TransformLog::new(capacity));
    }

    pub fn disable_transform_log(&mut self) {
        self.transform_log = None;
    }

    pub fn transform_log(&self) -> Option<&TransformLog> {
        self.transform_log.as_ref()
    }

    /// Re-run the recorded session against the current document.
    ///
    /// Returns `Ok(false)` when there is nothing replayable or a session is
    /// already running. A failed replay cancels the session it started.
    pub fn replay_transform_log(&mut self) -> EngineResult<bool> {
        if self.session.is_active() {
            return Ok(false);
        }
        let Some(log) = self.transform_log.take() else {
            return Ok(false);
        };
        if !log.is_replayable() {
            self.transform_log = Some(log);
            return Ok(false);
        }
        debug!("Replaying {} transform log entries", log.entries().len());
        let result = self.replay_entries(log.entries());
        if result.is_err() && self.session.is_active() {
            self.session.cancel().ok();
        }
        self.transform_log = Some(log);
        result.map(|()| true)
    }

    fn replay_entries(&mut self, entries: &[TransformLogEntry]) -> EngineResult<()> {
        for entry in entries {
            match entry {
                TransformLogEntry::Begin {
                    ids,
                    mode,
                    specific_id,
                    handle_index,
                    screen,
                    modifiers,
                } => {
                    if !ids.is_empty() {
                        self.select(ids, SelectMode::Replace)?;
                    }
                    let request = BeginTransform {
                        ids,
                        mode: *mode,
                        specific_id: *specific_id,
                        handle_index: *handle_index,
                        screen: *screen,
                        modifiers: *modifiers,
                    };
                    self.begin_transform(&request)?;
                }
                TransformLogEntry::Update { world, modifiers } => {
                    self.update_transform(*world, *modifiers)?;
                }
                TransformLogEntry::Commit => {
                    self.commit_transform()?;
                }
                TransformLogEntry::Cancel => self.cancel_transform()?,
            }
        }
        Ok(())
    }

    // --- history ---

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> EngineResult<bool> {
        self.interrupt_session("undo");
        let undone = self.history.undo(&mut self.store)?;
        if undone {
            self.publish(true);
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> EngineResult<bool> {
        self.interrupt_session("redo");
        let redone = self.history.redo(&mut self.store)?;
        if redone {
            self.publish(true);
        }
        Ok(redone)
    }

    /// Move the history cursor to `target`, walking or restoring a checkpoint.
    pub fn jump_to_history(&mut self, target: usize) -> EngineResult<()> {
        self.interrupt_session("a history jump");
        self.history.jump_to(target, &mut self.store)?;
        self.publish(true);
        Ok(())
    }

    // --- persistence ---

    pub fn save_snapshot(&self) -> EngineResult<Vec<u8>> {
        Ok(snapshot::save(&self.store, self.selection.ids(), &self.meta)?)
    }

    /// Replace the whole document. On error nothing changes.
    pub fn load_snapshot(&mut self, bytes: &[u8]) -> EngineResult<()> {
        let state = snapshot::load(bytes)?;
        self.interrupt_session("loading a snapshot");

        let mut layers: Vec<u32> = self.store.layers().map(|l| l.id).collect();
        self.store.clear();
        self.events.record_all(self.store.take_journal());
        let stale = self.store.take_render_dirty();

        let previous = self.store.generation();
        self.store = state.store;
        self.store.continue_generation(previous);
        self.store.absorb_render_dirty(stale);
        self.store.take_journal();
        for id in self.store.draw_order() {
            self.events.record(StoreChange::Created(*id));
        }
        layers.extend(self.store.layers().map(|l| l.id));
        layers.sort_unstable();
        layers.dedup();
        for id in layers {
            self.events.record(StoreChange::Layer(id));
        }
        self.events.record(StoreChange::Order);

        self.pick.rebuild(&mut self.store);
        self.history.clear();
        self.events.record_history();
        if self.selection.ids() != state.selection.as_slice() {
            self.selection = Selection::new();
            self.selection.apply(&state.selection, SelectMode::Replace);
            self.events.record_selection();
        }
        self.meta = state.meta;
        info!("Document \"{}\" replaced from snapshot", self.meta.name);
        Ok(())
    }

    // --- events ---

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.poll()
    }

    pub fn drain_events(&mut self, out: &mut Vec<Event>) {
        self.events.drain_into(out);
    }

    /// Acknowledge an overflow after re-reading the document at `generation`.
    pub fn ack_resync(&mut self, generation: u64) -> bool {
        self.events.ack_resync(generation)
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Size;

    use super::*;
    use crate::command::CommandWriter;
    use crate::config::EventConfig;
    use crate::entity::{Geometry, Style};
    use crate::error::ErrorKind;
    use crate::events::EventKind;
    use crate::pick::SubTarget;
    use crate::session::TransformMode;
    use crate::snapshot::SNAPSHOT_VERSION;

    fn square(doc: &mut Document, id: EntityId, x: f64, size: f64) {
        let mut w = CommandWriter::new();
        w.upsert_rect(id, Point::new(x, 0.0), Size::new(size, size), 0.0, &Style::default());
        doc.apply_commands(&w.finish()).unwrap();
    }

    fn events(doc: &mut Document) -> Vec<Event> {
        let mut out = Vec::new();
        doc.drain_events(&mut out);
        out
    }

    fn begin(doc: &mut Document, mode: TransformMode, specific_id: EntityId, handle: u32, at: Point) {
        let request = BeginTransform {
            ids: &[],
            mode,
            specific_id,
            handle_index: handle,
            screen: at,
            modifiers: Modifiers::empty(),
        };
        doc.begin_transform(&request).unwrap();
    }

    #[test]
    fn test_resize_scenario_through_document() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 100.0);
        let hit = doc.pick(Point::new(100.0, 100.0), 1.0, PickMask::all());
        assert_eq!(hit.id, 1);
        assert_eq!(hit.sub_target, SubTarget::ResizeHandle);
        assert_eq!(hit.sub_index, 2);

        begin(&mut doc, TransformMode::Resize, 1, 2, Point::new(100.0, 100.0));
        doc.update_transform(Point::new(150.0, 150.0), Modifiers::empty())
            .unwrap();
        doc.commit_transform().unwrap();
        assert_eq!(doc.store().get(1).unwrap().aabb(), Rect::new(0.0, 0.0, 150.0, 150.0));

        assert!(doc.undo().unwrap());
        assert_eq!(doc.store().get(1).unwrap().aabb(), Rect::new(0.0, 0.0, 100.0, 100.0));
    }

    #[test]
    fn test_failed_batch_emits_nothing() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        events(&mut doc);
        let saved = doc.save_snapshot().unwrap();

        let mut w = CommandWriter::new();
        w.delete(1);
        w.raw(42, 0, &[]);
        let err = doc.apply_commands(&w.finish()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let mut w = CommandWriter::new();
        w.delete(1);
        w.delete(1);
        let err = doc.apply_commands(&w.finish()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Referential);

        assert!(events(&mut doc).is_empty());
        assert_eq!(doc.save_snapshot().unwrap(), saved);
        assert_eq!(doc.history().len(), 1);
    }

    #[test]
    fn test_apply_emits_coalesced_events() {
        let mut doc = Document::default();
        square(&mut doc, 4, 0.0, 10.0);
        let kinds: Vec<EventKind> = events(&mut doc).iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::DocChanged,
                EventKind::EntityCreated,
                EventKind::HistoryChanged
            ]
        );
    }

    #[test]
    fn test_apply_cancels_running_session() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        doc.select(&[1], SelectMode::Replace).unwrap();
        begin(&mut doc, TransformMode::Move, 0, 0, Point::new(5.0, 5.0));
        doc.update_transform(Point::new(50.0, 5.0), Modifiers::empty())
            .unwrap();
        square(&mut doc, 2, 100.0, 10.0);
        assert!(!doc.is_transforming());
        assert_eq!(doc.store().get(1).unwrap().aabb().x0, 0.0);
    }

    #[test]
    fn test_delete_prunes_selection() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        square(&mut doc, 2, 20.0, 10.0);
        doc.select(&[2, 1], SelectMode::Replace).unwrap();
        events(&mut doc);

        let mut w = CommandWriter::new();
        w.delete(2);
        doc.apply_commands(&w.finish()).unwrap();
        assert_eq!(doc.selection().ids(), &[1]);
        assert!(
            events(&mut doc)
                .iter()
                .any(|e| e.kind == EventKind::SelectionChanged)
        );
    }

    #[test]
    fn test_snapshot_roundtrip_and_version_guard() {
        let mut doc = Document::default();
        doc.set_name("Floor plan");
        square(&mut doc, 1, 0.0, 10.0);
        square(&mut doc, 2, 20.0, 10.0);
        doc.select(&[2], SelectMode::Replace).unwrap();
        let bytes = doc.save_snapshot().unwrap();

        let mut copy = Document::default();
        copy.load_snapshot(&bytes).unwrap();
        assert_eq!(copy.meta(), doc.meta());
        assert_eq!(copy.selection().ids(), &[2]);
        assert_eq!(copy.save_snapshot().unwrap(), bytes);
        assert_eq!(copy.pick(Point::new(25.0, 5.0), 1.0, PickMask::BODY).id, 2);

        let mut future = bytes.clone();
        future[4..8].copy_from_slice(&(SNAPSHOT_VERSION + 1).to_le_bytes());
        let generation = copy.generation();
        let err = copy.load_snapshot(&future).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Version);
        assert_eq!(copy.generation(), generation);
        assert_eq!(copy.save_snapshot().unwrap(), bytes);
    }

    #[test]
    fn test_clear_is_undoable() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        square(&mut doc, 2, 20.0, 10.0);
        doc.clear();
        assert!(doc.store().is_empty());
        doc.undo().unwrap();
        assert_eq!(doc.store().draw_order(), &[1, 2]);
    }

    #[test]
    fn test_overflow_then_resync() {
        let config = EngineConfig {
            events: EventConfig { capacity: 3 },
            ..EngineConfig::default()
        };
        let mut doc = Document::new(config);
        let mut w = CommandWriter::new();
        for id in 1..=5 {
            w.upsert_rect(id, Point::new(0.0, 0.0), Size::new(1.0, 1.0), 0.0, &Style::default());
        }
        doc.apply_commands(&w.finish()).unwrap();
        let first = events(&mut doc);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, EventKind::Overflow);

        square(&mut doc, 9, 0.0, 1.0);
        assert!(events(&mut doc).is_empty());
        assert!(doc.ack_resync(doc.generation()));
        square(&mut doc, 10, 0.0, 1.0);
        assert!(!events(&mut doc).is_empty());
    }

    #[test]
    fn test_text_measured_through_glyph_provider() {
        let mut doc = Document::default();
        let mut w = CommandWriter::new();
        w.upsert_text(3, Point::new(0.0, 0.0), "ab\ncde", 0, 10.0, &Style::default());
        doc.apply_commands(&w.finish()).unwrap();
        match &doc.store().get(3).unwrap().geometry {
            Geometry::Text(text) => {
                assert!((text.extent.width - 18.0).abs() < 1e-9);
                assert!((text.extent.height - 24.0).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_digest_follows_content() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        square(&mut doc, 2, 20.0, 10.0);
        let before = doc.digest();

        let mut copy = Document::default();
        copy.set_name("another name");
        copy.load_snapshot(&doc.save_snapshot().unwrap()).unwrap();
        assert_eq!(copy.digest(), before);

        square(&mut doc, 1, 5.0, 10.0);
        assert_ne!(doc.digest(), before);
        doc.undo().unwrap();
        assert_eq!(doc.digest(), before);

        doc.select(&[2], SelectMode::Replace).unwrap();
        assert_ne!(doc.digest(), before);
    }

    #[test]
    fn test_transform_log_replays_session() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        doc.select(&[1], SelectMode::Replace).unwrap();
        doc.enable_transform_log(16);

        begin(&mut doc, TransformMode::Move, 0, 0, Point::new(5.0, 5.0));
        doc.update_transform(Point::new(25.0, 5.0), Modifiers::empty())
            .unwrap();
        doc.update_transform(Point::new(45.0, 5.0), Modifiers::empty())
            .unwrap();
        doc.commit_transform().unwrap();
        let moved = doc.digest();
        let log = doc.transform_log().unwrap();
        assert_eq!(log.entries().len(), 4);
        assert!(matches!(log.entries()[3], TransformLogEntry::Commit));

        doc.undo().unwrap();
        assert_ne!(doc.digest(), moved);
        assert!(doc.replay_transform_log().unwrap());
        assert_eq!(doc.digest(), moved);
        // Replaying does not record itself.
        assert_eq!(doc.transform_log().unwrap().entries().len(), 4);
        assert!(doc.can_undo());
    }

    #[test]
    fn test_replay_needs_a_complete_log() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        assert!(!doc.replay_transform_log().unwrap());

        doc.enable_transform_log(1);
        doc.select(&[1], SelectMode::Replace).unwrap();
        begin(&mut doc, TransformMode::Move, 0, 0, Point::new(5.0, 5.0));
        doc.update_transform(Point::new(45.0, 5.0), Modifiers::empty())
            .unwrap();
        assert!(doc.transform_log().unwrap().is_overflowed());
        doc.cancel_transform().unwrap();
        assert!(!doc.replay_transform_log().unwrap());
    }

    #[test]
    fn test_interrupted_session_is_logged_as_cancel() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        doc.select(&[1], SelectMode::Replace).unwrap();
        doc.enable_transform_log(8);
        begin(&mut doc, TransformMode::Move, 0, 0, Point::new(5.0, 5.0));
        doc.clear();
        let entries = doc.transform_log().unwrap().entries();
        assert!(matches!(entries.last(), Some(TransformLogEntry::Cancel)));
    }

    #[test]
    fn test_selected_records_show_session_preview() {
        let mut doc = Document::default();
        square(&mut doc, 1, 0.0, 10.0);
        square(&mut doc, 2, 20.0, 10.0);
        doc.select(&[2, 1], SelectMode::Replace).unwrap();
        begin(&mut doc, TransformMode::Move, 0, 0, Point::new(5.0, 5.0));
        doc.update_transform(Point::new(45.0, 5.0), Modifiers::empty())
            .unwrap();

        let records = doc.selected_records();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2, 1]);
        assert!((records[1].aabb().x0 - 40.0).abs() < 1e-9);
        assert_eq!(doc.store().get(1).unwrap().aabb().x0, 0.0);
        assert_eq!(doc.selection_style().count, 2);
    }
}
