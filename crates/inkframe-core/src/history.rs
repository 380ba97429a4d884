//! Bounded undo/redo history with periodic store checkpoints.

use std::collections::{BTreeMap, VecDeque};

use log::{debug, warn};

use crate::config::HistoryConfig;
use crate::entity::{EntityId, EntityRecord, EntityStore, Layer, StoreCheckpoint, StoreError};

/// Before and after state of one entity. `None` means "did not exist".
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    pub id: EntityId,
    pub before: Option<EntityRecord>,
    pub after: Option<EntityRecord>,
}

/// One undo step.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Sorted by id.
    pub changes: Vec<EntityChange>,
    pub order: Option<(Vec<EntityId>, Vec<EntityId>)>,
    pub layers: Option<(Vec<Layer>, Vec<Layer>)>,
    pub next_id: (EntityId, EntityId),
    checkpoint: Option<StoreCheckpoint>,
}

impl HistoryEntry {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.order.is_none() && self.layers.is_none()
    }

    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Ids touched by this entry.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.changes.iter().map(|c| c.id)
    }
}

/// Captures "before" state while a batch of mutations is applied.
#[derive(Debug, Default)]
struct Transaction {
    entities: BTreeMap<EntityId, Option<EntityRecord>>,
    order_before: Option<Vec<EntityId>>,
    layers_before: Option<Vec<Layer>>,
    next_id_before: EntityId,
}

#[derive(Debug)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    /// Number of entries currently applied.
    cursor: usize,
    capacity: usize,
    checkpoint_interval: usize,
    /// Entries ever pushed; drives checkpoint placement.
    pushed: u64,
    transaction: Option<Transaction>,
}

impl History {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(config.capacity.min(1024)),
            cursor: 0,
            capacity: config.capacity.max(1),
            checkpoint_interval: config.checkpoint_interval.max(1),
            pushed: 0,
            transaction: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.transaction = None;
    }

    // --- transactions ---

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Start collecting a batch. A transaction already in progress is kept.
    pub fn begin(&mut self, store: &EntityStore) {
        if self.transaction.is_some() {
            debug!("History transaction already open");
            return;
        }
        self.transaction = Some(Transaction {
            next_id_before: store.next_id(),
            ..Transaction::default()
        });
    }

    /// Record the current state of `id` before it is mutated. Later calls for
    /// the same id are ignored.
    pub fn mark_entity(&mut self, store: &EntityStore, id: EntityId) {
        if let Some(tx) = &mut self.transaction {
            tx.entities.entry(id).or_insert_with(|| store.get(id).cloned());
        }
    }

    pub fn mark_order(&mut self, store: &EntityStore) {
        if let Some(tx) = &mut self.transaction {
            if tx.order_before.is_none() {
                tx.order_before = Some(store.draw_order().to_vec());
            }
        }
    }

    pub fn mark_layers(&mut self, store: &EntityStore) {
        if let Some(tx) = &mut self.transaction {
            if tx.layers_before.is_none() {
                tx.layers_before = Some(store.layers().cloned().collect());
            }
        }
    }

    /// Close the transaction, pushing one entry if anything changed.
    pub fn commit(&mut self, store: &EntityStore) -> bool {
        let Some(tx) = self.transaction.take() else {
            return false;
        };
        let changes: Vec<EntityChange> = tx
            .entities
            .into_iter()
            .filter_map(|(id, before)| {
                let after = store.get(id).cloned();
                (before != after).then_some(EntityChange { id, before, after })
            })
            .collect();
        let order = tx.order_before.and_then(|before| {
            let after = store.draw_order();
            (before.as_slice() != after).then(|| (before, after.to_vec()))
        });
        let layers = tx.layers_before.and_then(|before| {
            let after: Vec<Layer> = store.layers().cloned().collect();
            (before != after).then_some((before, after))
        });
        let entry = HistoryEntry {
            changes,
            order,
            layers,
            next_id: (tx.next_id_before, store.next_id()),
            checkpoint: None,
        };
        if entry.is_empty() {
            return false;
        }
        self.execute(entry, store);
        true
    }

    pub fn discard(&mut self) {
        self.transaction = None;
    }

    /// Close the transaction and revert whatever it captured, recording nothing.
    pub fn rollback(&mut self, store: &mut EntityStore) -> Result<(), StoreError> {
        let Some(tx) = self.transaction.take() else {
            return Ok(());
        };
        let entry = HistoryEntry {
            changes: tx
                .entities
                .into_iter()
                .map(|(id, before)| EntityChange {
                    id,
                    after: store.get(id).cloned(),
                    before,
                })
                .collect(),
            order: tx.order_before.map(|before| (before, store.draw_order().to_vec())),
            layers: tx
                .layers_before
                .map(|before| (before, store.layers().cloned().collect())),
            next_id: (tx.next_id_before, store.next_id()),
            checkpoint: None,
        };
        warn!("Rolling back {} entity changes", entry.changes.len());
        apply_entry(&entry, store, false)
    }

    // --- stack ---

    /// Record an entry whose changes are already applied to `store`.
    pub fn execute(&mut self, mut entry: HistoryEntry, store: &EntityStore) {
        self.entries.truncate(self.cursor);
        self.pushed += 1;
        if self.pushed % self.checkpoint_interval as u64 == 0 {
            entry.checkpoint = Some(store.checkpoint());
        }
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front();
            warn!("History full at {} entries; evicted the oldest", self.capacity);
        }
        self.cursor = self.entries.len();
        debug!("History entry recorded, cursor {}", self.cursor);
    }

    /// Revert the entry before the cursor. Returns whether anything was undone.
    pub fn undo(&mut self, store: &mut EntityStore) -> Result<bool, StoreError> {
        if self.cursor == 0 {
            return Ok(false);
        }
        let entry = &self.entries[self.cursor - 1];
        apply_entry(entry, store, false)?;
        self.cursor -= 1;
        Ok(true)
    }

    /// Re-apply the entry at the cursor. Returns whether anything was redone.
    pub fn redo(&mut self, store: &mut EntityStore) -> Result<bool, StoreError> {
        if self.cursor >= self.entries.len() {
            return Ok(false);
        }
        let entry = &self.entries[self.cursor];
        apply_entry(entry, store, true)?;
        self.cursor += 1;
        Ok(true)
    }

    /// Move the cursor to `target` (clamped to the history length), restoring
    /// the nearest checkpoint when that takes fewer steps than walking.
    pub fn jump_to(&mut self, target: usize, store: &mut EntityStore) -> Result<(), StoreError> {
        let target = target.min(self.entries.len());
        let walk = self.cursor.abs_diff(target);
        let checkpoint = (0..target)
            .rev()
            .find(|i| self.entries[*i].checkpoint.is_some())
            .map(|i| (i + 1, 1 + (target - (i + 1))));
        if let Some((at, cost)) = checkpoint {
            if cost < walk {
                if let Some(cp) = &self.entries[at - 1].checkpoint {
                    store.restore_checkpoint(cp)?;
                }
                self.cursor = at;
                debug!("History restored checkpoint at {at}");
            }
        }
        while self.cursor < target {
            self.redo(store)?;
        }
        while self.cursor > target {
            self.undo(store)?;
        }
        Ok(())
    }
}

fn apply_entry(entry: &HistoryEntry, store: &mut EntityStore, forward: bool) -> Result<(), StoreError> {
    let pick = |pair: &(Vec<Layer>, Vec<Layer>)| if forward { pair.1.clone() } else { pair.0.clone() };
    let layers = entry.layers.as_ref().map(pick);
    if let Some(layers) = &layers {
        store.ensure_layers(layers);
    }
    for change in &entry.changes {
        let target = if forward { &change.after } else { &change.before };
        match target {
            Some(record) => store.restore(record)?,
            None => {
                if store.contains(change.id) {
                    store.delete(change.id)?;
                }
            }
        }
    }
    if let Some(layers) = &layers {
        store.restore_layers(layers)?;
    }
    if let Some((before, after)) = &entry.order {
        store.set_draw_order(if forward { after } else { before })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityPatch, Geometry, Style};
    use kurbo::{Point, Size};

    fn rect(x: f64) -> Geometry {
        Geometry::Rect {
            origin: Point::new(x, 0.0),
            size: Size::new(10.0, 10.0),
            rotation: 0.0,
        }
    }

    fn create(history: &mut History, store: &mut EntityStore, x: f64) -> EntityId {
        history.begin(store);
        history.mark_order(store);
        let id = store.next_id();
        history.mark_entity(store, id);
        store.create(rect(x), Style::default()).unwrap();
        assert!(history.commit(store));
        id
    }

    fn move_to(history: &mut History, store: &mut EntityStore, id: EntityId, x: f64) {
        history.begin(store);
        history.mark_entity(store, id);
        store.update(id, EntityPatch::new().with_geometry(rect(x))).unwrap();
        assert!(history.commit(store));
    }

    fn origin_x(store: &EntityStore, id: EntityId) -> f64 {
        match &store.get(id).unwrap().geometry {
            Geometry::Rect { origin, .. } => origin.x,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_undo_redo_create() {
        let mut store = EntityStore::new();
        let mut history = History::new(&HistoryConfig::default());
        let id = create(&mut history, &mut store, 0.0);
        assert!(history.can_undo());
        assert!(history.undo(&mut store).unwrap());
        assert!(store.get(id).is_none());
        assert!(store.draw_order().is_empty());
        // Undo never hands an id out twice.
        assert_eq!(store.next_id(), 2);
        assert!(history.redo(&mut store).unwrap());
        assert!(store.get(id).is_some());
        assert_eq!(store.draw_order(), &[id]);
    }

    #[test]
    fn test_unchanged_transaction_records_nothing() {
        let mut store = EntityStore::new();
        let mut history = History::new(&HistoryConfig::default());
        let id = create(&mut history, &mut store, 0.0);
        history.begin(&store);
        history.mark_entity(&store, id);
        history.mark_order(&store);
        assert!(!history.commit(&store));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_new_entry_truncates_redo() {
        let mut store = EntityStore::new();
        let mut history = History::new(&HistoryConfig::default());
        let id = create(&mut history, &mut store, 0.0);
        move_to(&mut history, &mut store, id, 5.0);
        history.undo(&mut store).unwrap();
        assert!(history.can_redo());
        move_to(&mut history, &mut store, id, 9.0);
        assert!(!history.can_redo());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut store = EntityStore::new();
        let config = HistoryConfig {
            capacity: 3,
            checkpoint_interval: 32,
        };
        let mut history = History::new(&config);
        let id = create(&mut history, &mut store, 0.0);
        for x in 1..=5 {
            move_to(&mut history, &mut store, id, x as f64);
        }
        assert_eq!(history.len(), 3);
        while history.undo(&mut store).unwrap() {}
        assert!((origin_x(&store, id) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_jump_uses_checkpoint() {
        let mut store = EntityStore::new();
        let config = HistoryConfig {
            capacity: 64,
            checkpoint_interval: 4,
        };
        let mut history = History::new(&config);
        let id = create(&mut history, &mut store, 0.0);
        for x in 1..=10 {
            move_to(&mut history, &mut store, id, x as f64);
        }
        assert_eq!(history.len(), 11);
        assert!(history.entry(3).unwrap().has_checkpoint());
        assert!(history.entry(7).unwrap().has_checkpoint());

        history.jump_to(0, &mut store).unwrap();
        assert!(store.get(id).is_none());
        history.jump_to(9, &mut store).unwrap();
        assert_eq!(history.cursor(), 9);
        assert!((origin_x(&store, id) - 8.0).abs() < f64::EPSILON);
        history.jump_to(3, &mut store).unwrap();
        assert!((origin_x(&store, id) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rollback_reverts_open_transaction() {
        let mut store = EntityStore::new();
        let mut history = History::new(&HistoryConfig::default());
        let id = create(&mut history, &mut store, 0.0);
        history.begin(&store);
        history.mark_entity(&store, id);
        history.mark_order(&store);
        store.delete(id).unwrap();
        history.rollback(&mut store).unwrap();
        assert!((origin_x(&store, id) - 0.0).abs() < f64::EPSILON);
        assert_eq!(store.draw_order(), &[id]);
        assert!(!history.in_transaction());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_layer_delete_undo_restores_membership() {
        let mut store = EntityStore::new();
        let mut history = History::new(&HistoryConfig::default());
        store.upsert_layer(Layer::new(4, "Sketch")).unwrap();
        let id = store.create(rect(0.0), Style::default()).unwrap();
        store.set_layer(id, 4).unwrap();

        history.begin(&store);
        history.mark_layers(&store);
        history.mark_entity(&store, id);
        store.delete_layer(4).unwrap();
        assert!(history.commit(&store));

        history.undo(&mut store).unwrap();
        assert!(store.layer(4).is_some());
        assert_eq!(store.get(id).unwrap().layer, 4);
        history.redo(&mut store).unwrap();
        assert!(store.layer(4).is_none());
        assert_eq!(store.get(id).unwrap().layer, 0);
    }
}
