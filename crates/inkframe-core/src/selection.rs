//! Selection state and transform handle geometry.

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::config::PickConfig;
use crate::entity::{EntityId, Geometry};

/// How a set of ids is combined with the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SelectMode {
    #[default]
    Replace,
    Add,
    Remove,
    Toggle,
}

/// Ordered, de-duplicated selection. The first id is the anchor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    ids: Vec<EntityId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn anchor(&self) -> Option<EntityId> {
        self.ids.first().copied()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Combine `ids` with the selection. Returns whether anything changed.
    pub fn apply(&mut self, ids: &[EntityId], mode: SelectMode) -> bool {
        let before = self.ids.clone();
        match mode {
            SelectMode::Replace => {
                self.ids.clear();
                for id in ids {
                    self.push_unique(*id);
                }
            }
            SelectMode::Add => {
                for id in ids {
                    self.push_unique(*id);
                }
            }
            SelectMode::Remove => self.ids.retain(|id| !ids.contains(id)),
            SelectMode::Toggle => {
                for id in ids {
                    if let Some(pos) = self.ids.iter().position(|x| x == id) {
                        self.ids.remove(pos);
                    } else {
                        self.ids.push(*id);
                    }
                }
            }
        }
        self.ids != before
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.ids.is_empty();
        self.ids.clear();
        changed
    }

    /// Drop ids for which `live` returns false. Returns whether anything was pruned.
    pub fn retain_live(&mut self, live: impl Fn(EntityId) -> bool) -> bool {
        let before = self.ids.len();
        self.ids.retain(|id| live(*id));
        self.ids.len() != before
    }

    fn push_unique(&mut self, id: EntityId) {
        if id != crate::entity::NO_ENTITY && !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }
}

/// Kind of transform handle, carrying the corner index it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Resize(usize),
    Rotate(usize),
}

/// A handle with its world-space hit zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    pub position: Point,
    pub radius: f64,
    pub kind: HandleKind,
}

impl Handle {
    pub fn hit_test(&self, point: Point) -> bool {
        (point - self.position).hypot2() <= self.radius * self.radius
    }
}

/// Handle sizes converted from screen pixels into world units at one scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleMetrics {
    pub resize_radius: f64,
    pub rotate_offset: f64,
    pub rotate_radius: f64,
}

impl HandleMetrics {
    /// Resize zones never shrink below the world tolerance.
    pub fn new(config: &PickConfig, scale: f64, tolerance_world: f64) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        Self {
            resize_radius: (config.resize_handle_px / scale).max(tolerance_world),
            rotate_offset: config.rotate_handle_offset_px / scale,
            rotate_radius: config.rotate_handle_radius_px / scale,
        }
    }
}

/// Fixed-capacity handle list; building one never allocates.
#[derive(Debug, Clone, Copy)]
pub struct HandleSet {
    handles: [Option<Handle>; 8],
}

impl HandleSet {
    pub fn iter(&self) -> impl Iterator<Item = &Handle> {
        self.handles.iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.iter().all(Option::is_none)
    }
}

/// Handles of a geometry. Box kinds get four resize and four rotate handles
/// oriented by the actual rotation; text gets rotate handles only; line-like
/// kinds have none.
pub fn handles_for(geometry: &Geometry, metrics: &HandleMetrics) -> HandleSet {
    let mut handles = [None; 8];
    let Some(obb) = geometry.oriented_box() else {
        return HandleSet { handles };
    };
    let resizable = !matches!(geometry, Geometry::Text(_));
    for corner in 0..4 {
        let at = obb.corner(corner);
        if resizable {
            handles[corner] = Some(Handle {
                position: at,
                radius: metrics.resize_radius,
                kind: HandleKind::Resize(corner),
            });
        }
        handles[4 + corner] = Some(Handle {
            position: at + obb.corner_outward(corner) * metrics.rotate_offset,
            radius: metrics.rotate_radius,
            kind: HandleKind::Rotate(corner),
        });
    }
    HandleSet { handles }
}
