use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::{DEFAULT_LAYER, LayerId, Rgba};

bitflags! {
    /// Layer visibility and locking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LayerFlags: u32 {
        const VISIBLE = 1 << 0;
        const LOCKED = 1 << 1;
    }
}

impl Default for LayerFlags {
    fn default() -> Self {
        LayerFlags::VISIBLE
    }
}

/// A named group of entities sharing visibility and lock state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    /// Tint used by editors to mark the layer; not applied to entities.
    pub color: Rgba,
    pub flags: LayerFlags,
}

impl Layer {
    pub fn new(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: Rgba::BLACK,
            flags: LayerFlags::default(),
        }
    }

    /// The layer every document starts with.
    pub fn default_layer() -> Self {
        Self::new(DEFAULT_LAYER, "Default")
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(LayerFlags::VISIBLE)
    }

    pub fn is_locked(&self) -> bool {
        self.flags.contains(LayerFlags::LOCKED)
    }
}
