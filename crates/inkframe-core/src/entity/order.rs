//! Global back-to-front draw order with O(1) rank lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::EntityId;

/// Explicit reorder operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ReorderAction {
    /// Move to the topmost slot.
    BringToFront = 1,
    /// Move to the bottom slot.
    SendToBack = 2,
    /// Swap with the entity directly above.
    BringForward = 3,
    /// Swap with the entity directly below.
    SendBackward = 4,
}

impl ReorderAction {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => ReorderAction::BringToFront,
            2 => ReorderAction::SendToBack,
            3 => ReorderAction::BringForward,
            4 => ReorderAction::SendBackward,
            _ => return None,
        })
    }
}

/// Ids of live entities, back to front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawOrder {
    ids: Vec<EntityId>,
    rank: HashMap<EntityId, usize>,
}

impl DrawOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn as_slice(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.rank.contains_key(&id)
    }

    /// Position of `id` counted from the back; higher draws later.
    pub fn rank(&self, id: EntityId) -> Option<usize> {
        self.rank.get(&id).copied()
    }

    /// Append at the top. No-op if already present.
    pub fn push(&mut self, id: EntityId) {
        if self.rank.contains_key(&id) {
            return;
        }
        self.rank.insert(id, self.ids.len());
        self.ids.push(id);
    }

    /// Remove `id` and compact the ranks above it.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(pos) = self.rank.remove(&id) else {
            return false;
        };
        self.ids.remove(pos);
        self.reindex_from(pos);
        true
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.rank.clear();
    }

    /// Replace the whole order. The caller guarantees `ids` has no duplicates.
    pub fn replace(&mut self, ids: &[EntityId]) {
        self.ids.clear();
        self.ids.extend_from_slice(ids);
        self.rank.clear();
        self.reindex_from(0);
    }

    /// Apply `action` to `id`. Returns whether the order changed.
    pub fn apply(&mut self, id: EntityId, action: ReorderAction) -> bool {
        let Some(pos) = self.rank(id) else {
            return false;
        };
        let last = self.ids.len() - 1;
        match action {
            ReorderAction::BringToFront => {
                if pos == last {
                    return false;
                }
                self.ids.remove(pos);
                self.ids.push(id);
                self.reindex_from(pos);
            }
            ReorderAction::SendToBack => {
                if pos == 0 {
                    return false;
                }
                self.ids.remove(pos);
                self.ids.insert(0, id);
                self.reindex_from(0);
            }
            ReorderAction::BringForward => {
                if pos == last {
                    return false;
                }
                self.ids.swap(pos, pos + 1);
                self.reindex_from(pos);
            }
            ReorderAction::SendBackward => {
                if pos == 0 {
                    return false;
                }
                self.ids.swap(pos, pos - 1);
                self.reindex_from(pos - 1);
            }
        }
        true
    }

    fn reindex_from(&mut self, start: usize) {
        for (i, id) in self.ids.iter().enumerate().skip(start) {
            self.rank.insert(*id, i);
        }
    }
}
