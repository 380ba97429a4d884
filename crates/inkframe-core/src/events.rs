//! Bounded, coalescing notification queue.
//!
//! Mutations are recorded as pending changes keyed by entity id. On
//! [`EventQueue::poll`] the pending set is flushed into the ring buffer in a
//! fixed order: document, entities by ascending id, layers, draw order,
//! selection, history. When the ring fills up everything queued is dropped,
//! one [`EventKind::Overflow`] is delivered, and nothing else is recorded
//! until the consumer calls [`EventQueue::ack_resync`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bitflags::bitflags;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, LayerId, StoreChange};

bitflags! {
    /// Which aspects of an entity changed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ChangeMask: u32 {
        const GEOMETRY = 1 << 0;
        const STYLE = 1 << 1;
        const FLAGS = 1 << 2;
        const LAYER = 1 << 3;
        const ORDER = 1 << 4;
        const TEXT = 1 << 5;
        const BOUNDS = 1 << 6;
        const RENDER_DATA = 1 << 7;
    }
}

/// Event discriminant, stable for consumers reading raw records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventKind {
    Overflow = 1,
    DocChanged = 2,
    EntityChanged = 3,
    EntityCreated = 4,
    EntityDeleted = 5,
    LayerChanged = 6,
    SelectionChanged = 7,
    OrderChanged = 8,
    HistoryChanged = 9,
}

/// A single notification. `entity_id` holds the layer id for layer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub entity_id: u32,
    pub change_mask: ChangeMask,
}

impl Event {
    pub fn new(kind: EventKind, entity_id: u32, change_mask: ChangeMask) -> Self {
        Self {
            kind,
            entity_id,
            change_mask,
        }
    }

    /// `(kind, entity_id, change_mask)` as plain integers.
    pub fn to_raw(self) -> (u16, u32, u32) {
        (self.kind as u16, self.entity_id, self.change_mask.bits())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PendingEntity {
    created: bool,
    deleted: bool,
    /// Deleted first, then created again in the same batch.
    recreated: bool,
    mask: ChangeMask,
}

#[derive(Debug, Default)]
struct Pending {
    entities: BTreeMap<EntityId, PendingEntity>,
    layers: BTreeSet<LayerId>,
    doc: bool,
    order: bool,
    selection: bool,
    history: bool,
}

impl Pending {
    fn is_empty(&self) -> bool {
        !self.doc
            && !self.order
            && !self.selection
            && !self.history
            && self.entities.is_empty()
            && self.layers.is_empty()
    }

    fn clear(&mut self) {
        self.entities.clear();
        self.layers.clear();
        self.doc = false;
        self.order = false;
        self.selection = false;
        self.history = false;
    }
}

#[derive(Debug)]
pub struct EventQueue {
    ring: VecDeque<Event>,
    capacity: usize,
    pending: Pending,
    overflowed: bool,
    resync_generation: Option<u64>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
            pending: Pending::default(),
            overflowed: false,
            resync_generation: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events ready to be polled, not counting pending changes.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty() && self.pending.is_empty()
    }

    /// Whether the queue is waiting for [`ack_resync`](Self::ack_resync).
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Generation passed to the last successful [`ack_resync`](Self::ack_resync).
    pub fn resync_generation(&self) -> Option<u64> {
        self.resync_generation
    }

    /// Record a store journal entry.
    pub fn record(&mut self, change: StoreChange) {
        if self.overflowed {
            return;
        }
        self.pending.doc = true;
        match change {
            StoreChange::Created(id) => {
                let entry = self.pending.entities.entry(id).or_default();
                if entry.deleted {
                    entry.deleted = false;
                    entry.recreated = true;
                } else {
                    entry.created = true;
                }
            }
            StoreChange::Deleted(id) => {
                let entry = self.pending.entities.entry(id).or_default();
                if entry.created {
                    // Created and deleted within one batch: nothing to report.
                    self.pending.entities.remove(&id);
                } else {
                    entry.deleted = true;
                    entry.recreated = false;
                    entry.mask = ChangeMask::empty();
                }
            }
            StoreChange::Changed { id, mask } => {
                let entry = self.pending.entities.entry(id).or_default();
                if !entry.deleted {
                    entry.mask |= mask;
                }
            }
            StoreChange::Layer(id) => {
                self.pending.layers.insert(id);
            }
            StoreChange::Order => self.pending.order = true,
        }
    }

    pub fn record_all(&mut self, changes: impl IntoIterator<Item = StoreChange>) {
        for change in changes {
            self.record(change);
        }
    }

    pub fn record_selection(&mut self) {
        if !self.overflowed {
            self.pending.selection = true;
        }
    }

    pub fn record_history(&mut self) {
        if !self.overflowed {
            self.pending.history = true;
        }
    }

    /// Move every pending change into the ring buffer.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        if pending.doc {
            self.push(Event::new(EventKind::DocChanged, 0, ChangeMask::empty()));
        }
        for (id, entry) in &pending.entities {
            let event = if entry.deleted {
                Event::new(EventKind::EntityDeleted, *id, ChangeMask::empty())
            } else if entry.created {
                Event::new(EventKind::EntityCreated, *id, entry.mask)
            } else if entry.recreated {
                Event::new(EventKind::EntityChanged, *id, ChangeMask::all())
            } else {
                Event::new(EventKind::EntityChanged, *id, entry.mask)
            };
            self.push(event);
        }
        for layer in &pending.layers {
            self.push(Event::new(EventKind::LayerChanged, *layer, ChangeMask::LAYER));
        }
        if pending.order {
            self.push(Event::new(EventKind::OrderChanged, 0, ChangeMask::ORDER));
        }
        if pending.selection {
            self.push(Event::new(EventKind::SelectionChanged, 0, ChangeMask::empty()));
        }
        if pending.history {
            self.push(Event::new(EventKind::HistoryChanged, 0, ChangeMask::empty()));
        }
    }

    fn push(&mut self, event: Event) {
        if self.overflowed {
            return;
        }
        if self.ring.len() >= self.capacity {
            warn!(
                "Event queue overflowed at {} events; dropping until resync",
                self.capacity
            );
            self.ring.clear();
            self.pending.clear();
            self.ring.push_back(Event::new(EventKind::Overflow, 0, ChangeMask::empty()));
            self.overflowed = true;
            return;
        }
        self.ring.push_back(event);
    }

    /// Flush pending changes and pop the oldest event.
    pub fn poll(&mut self) -> Option<Event> {
        self.flush();
        self.ring.pop_front()
    }

    /// Flush and move every queued event into `out`.
    pub fn drain_into(&mut self, out: &mut Vec<Event>) {
        self.flush();
        out.extend(self.ring.drain(..));
    }

    /// Resume recording after an overflow. Returns whether the queue was overflowed.
    pub fn ack_resync(&mut self, generation: u64) -> bool {
        let was = self.overflowed;
        self.overflowed = false;
        self.resync_generation = Some(generation);
        was
    }

    /// Drop every queued and pending event without touching the overflow state.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut EventQueue) -> Vec<Event> {
        let mut out = Vec::new();
        queue.drain_into(&mut out);
        out
    }

    #[test]
    fn test_changes_coalesce_per_entity() {
        let mut q = EventQueue::new(16);
        q.record(StoreChange::Changed { id: 4, mask: ChangeMask::GEOMETRY });
        q.record(StoreChange::Changed { id: 4, mask: ChangeMask::STYLE });
        q.record(StoreChange::Created(2));
        let events = drain(&mut q);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::DocChanged);
        assert_eq!(events[1], Event::new(EventKind::EntityCreated, 2, ChangeMask::empty()));
        assert_eq!(events[2].kind, EventKind::EntityChanged);
        assert_eq!(events[2].change_mask, ChangeMask::GEOMETRY | ChangeMask::STYLE);
    }

    #[test]
    fn test_create_then_delete_cancels_out() {
        let mut q = EventQueue::new(16);
        q.record(StoreChange::Created(9));
        q.record(StoreChange::Deleted(9));
        let events = drain(&mut q);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::DocChanged);
    }

    #[test]
    fn test_fixed_flush_order() {
        let mut q = EventQueue::new(16);
        q.record_history();
        q.record_selection();
        q.record(StoreChange::Order);
        q.record(StoreChange::Layer(3));
        let kinds: Vec<EventKind> = drain(&mut q).into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::DocChanged,
                EventKind::LayerChanged,
                EventKind::OrderChanged,
                EventKind::SelectionChanged,
                EventKind::HistoryChanged
            ]
        );
    }

    #[test]
    fn test_overflow_delivers_single_event_until_resync() {
        let mut q = EventQueue::new(4);
        for id in 1..=10 {
            q.record(StoreChange::Created(id));
        }
        q.flush();
        // More changes after the overflow are dropped as well.
        q.record(StoreChange::Created(50));
        let events = drain(&mut q);
        assert_eq!(events, vec![Event::new(EventKind::Overflow, 0, ChangeMask::empty())]);
        assert!(q.is_overflowed());

        q.record(StoreChange::Created(60));
        assert!(drain(&mut q).is_empty());

        assert!(q.ack_resync(7));
        assert_eq!(q.resync_generation(), Some(7));
        q.record(StoreChange::Created(70));
        let events = drain(&mut q);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].entity_id, 70);
    }

    #[test]
    fn test_raw_layout() {
        let e = Event::new(EventKind::EntityChanged, 5, ChangeMask::GEOMETRY | ChangeMask::BOUNDS);
        assert_eq!(e.to_raw(), (3, 5, 0b100_0001));
    }
}
