//! Bounded recording of the most recent transform session, for replay.

use kurbo::Point;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::input::Modifiers;
use crate::session::TransformMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformLogEntry {
    Begin {
        /// Entities the session actually picked up.
        ids: Vec<EntityId>,
        mode: TransformMode,
        specific_id: EntityId,
        handle_index: u32,
        screen: Point,
        modifiers: Modifiers,
    },
    Update {
        world: Point,
        modifiers: Modifiers,
    },
    Commit,
    Cancel,
}

/// Holds the entries of one session. A new `Begin` discards the previous
/// session; running out of room marks the log overflowed and stops recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformLog {
    entries: Vec<TransformLogEntry>,
    capacity: usize,
    overflowed: bool,
    /// Between a recorded `Begin` and its `Commit`/`Cancel`.
    recording: bool,
}

impl TransformLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            overflowed: false,
            recording: false,
        }
    }

    pub fn entries(&self) -> &[TransformLogEntry] {
        &self.entries
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.overflowed = false;
        self.recording = false;
    }

    /// Whether the log holds one complete replayable session prefix.
    pub fn is_replayable(&self) -> bool {
        !self.overflowed && matches!(self.entries.first(), Some(TransformLogEntry::Begin { .. }))
    }

    pub(crate) fn record(&mut self, entry: TransformLogEntry) {
        let starts = matches!(entry, TransformLogEntry::Begin { .. });
        if starts {
            self.clear();
        } else if !self.recording {
            return;
        }
        if self.entries.len() >= self.capacity {
            warn!("Transform log full after {} entries", self.entries.len());
            self.overflowed = true;
            self.recording = false;
            return;
        }
        let ends = matches!(entry, TransformLogEntry::Commit | TransformLogEntry::Cancel);
        self.entries.push(entry);
        self.recording = !ends;
    }
}
