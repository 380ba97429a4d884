//! The arena that owns every entity record, the layer table and the draw order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use thiserror::Error;

use super::{
    DEFAULT_LAYER, DrawOrder, EntityFlags, EntityId, EntityKind, EntityPatch, EntityRecord,
    Geometry, Layer, LayerId, NO_ENTITY, ReorderAction, Style,
};
use crate::error::ErrorKind;
use crate::events::ChangeMask;

/// Errors raised by store mutations. Every check runs before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("unknown layer {0}")]
    UnknownLayer(LayerId),
    #[error("entity id 0 is reserved")]
    ReservedId,
    #[error("entity {0} already exists")]
    DuplicateEntity(EntityId),
    #[error("invalid geometry for entity {id}: {reason}")]
    InvalidGeometry { id: EntityId, reason: &'static str },
    #[error("entity {id} is a {found:?}, patch carries a {expected:?}")]
    KindMismatch {
        id: EntityId,
        expected: EntityKind,
        found: EntityKind,
    },
    #[error("layer {0} cannot be deleted")]
    ProtectedLayer(LayerId),
    #[error("invalid draw order: {0}")]
    InvalidOrder(&'static str),
    #[error("entity id space exhausted")]
    IdExhausted,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::UnknownEntity(_)
            | StoreError::UnknownLayer(_)
            | StoreError::DuplicateEntity(_)
            | StoreError::ProtectedLayer(_) => ErrorKind::Referential,
            StoreError::IdExhausted => ErrorKind::Resource,
            StoreError::ReservedId
            | StoreError::InvalidGeometry { .. }
            | StoreError::KindMismatch { .. }
            | StoreError::InvalidOrder(_) => ErrorKind::Protocol,
        }
    }
}

/// One journaled mutation, drained by the document into the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Created(EntityId),
    Deleted(EntityId),
    Changed { id: EntityId, mask: ChangeMask },
    Layer(LayerId),
    Order,
}

/// Entities waiting for retessellation, plus whether the draw order moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderDirty {
    pub entities: BTreeSet<EntityId>,
    pub order_changed: bool,
}

impl RenderDirty {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && !self.order_changed
    }
}

/// Full copy of the store contents, used by history checkpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCheckpoint {
    pub(crate) records: Vec<EntityRecord>,
    pub(crate) layers: Vec<Layer>,
    pub(crate) order: Vec<EntityId>,
    pub(crate) next_id: EntityId,
}

/// Owner of all entity records and layers.
#[derive(Debug, Clone)]
pub struct EntityStore {
    entities: HashMap<EntityId, EntityRecord>,
    layers: BTreeMap<LayerId, Layer>,
    order: DrawOrder,
    next_id: EntityId,
    generation: u64,
    render_dirty: RenderDirty,
    index_dirty: BTreeSet<EntityId>,
    journal: Vec<StoreChange>,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    /// An empty store holding only the default layer.
    pub fn new() -> Self {
        let mut layers = BTreeMap::new();
        layers.insert(DEFAULT_LAYER, Layer::default_layer());
        Self {
            entities: HashMap::new(),
            layers,
            order: DrawOrder::new(),
            next_id: 1,
            generation: 0,
            render_dirty: RenderDirty::default(),
            index_dirty: BTreeSet::new(),
            journal: Vec::new(),
        }
    }

    /// Build a store from decoded parts, checking every invariant.
    pub fn from_parts(
        layers: Vec<Layer>,
        records: Vec<EntityRecord>,
        order: Vec<EntityId>,
        next_id: EntityId,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.layers.clear();
        for layer in layers {
            store.layers.insert(layer.id, layer);
        }
        if !store.layers.contains_key(&DEFAULT_LAYER) {
            return Err(StoreError::UnknownLayer(DEFAULT_LAYER));
        }
        for record in records {
            store.check_record(&record)?;
            if store.entities.contains_key(&record.id) {
                return Err(StoreError::DuplicateEntity(record.id));
            }
            store.bump_next_id(record.id);
            store.entities.insert(record.id, record);
        }
        store.check_permutation(&order)?;
        store.order.replace(&order);
        store.next_id = store.next_id.max(next_id).max(1);
        store.mark_everything_dirty();
        store.journal.clear();
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Records in draw order, back to front.
    pub fn iter_ordered(&self) -> impl Iterator<Item = &EntityRecord> {
        self.order.as_slice().iter().filter_map(|id| self.entities.get(id))
    }

    /// Records sorted by id.
    pub fn records_by_id(&self) -> Vec<&EntityRecord> {
        let mut records: Vec<&EntityRecord> = self.entities.values().collect();
        records.sort_unstable_by_key(|r| r.id);
        records
    }

    /// Id the next `create` will hand out.
    pub fn next_id(&self) -> EntityId {
        self.next_id
    }

    /// Counter bumped by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(&id)
    }

    /// Layers sorted by id.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn rank(&self, id: EntityId) -> Option<usize> {
        self.order.rank(id)
    }

    pub fn draw_order(&self) -> &[EntityId] {
        self.order.as_slice()
    }

    /// Whether the record and its layer are both visible.
    pub fn is_rendered(&self, record: &EntityRecord) -> bool {
        record.is_visible() && self.layers.get(&record.layer).is_some_and(Layer::is_visible)
    }

    /// Whether `id` may take part in picking and transform sessions.
    pub fn is_pickable(&self, id: EntityId) -> bool {
        let Some(record) = self.entities.get(&id) else {
            return false;
        };
        let Some(layer) = self.layers.get(&record.layer) else {
            return false;
        };
        record.is_visible() && !record.is_locked() && layer.is_visible() && !layer.is_locked()
    }

    // --- entity mutations ---

    /// Create an entity on the default layer, appended at the top of the draw order.
    pub fn create(&mut self, geometry: Geometry, style: Style) -> Result<EntityId, StoreError> {
        if self.next_id == EntityId::MAX {
            return Err(StoreError::IdExhausted);
        }
        let id = self.next_id;
        let record = EntityRecord::new(id, geometry, style);
        self.check_record(&record)?;
        self.next_id += 1;
        self.insert_unchecked(record);
        Ok(id)
    }

    /// Create with an explicit id, or replace geometry and style of an existing entity.
    ///
    /// Returns `true` when the entity was created.
    pub fn upsert(&mut self, id: EntityId, geometry: Geometry, style: Style) -> Result<bool, StoreError> {
        if id == NO_ENTITY {
            return Err(StoreError::ReservedId);
        }
        geometry
            .validate()
            .and_then(|()| style.validate())
            .map_err(|reason| StoreError::InvalidGeometry { id, reason })?;
        if let Some(record) = self.entities.get_mut(&id) {
            let mut mask = ChangeMask::GEOMETRY | ChangeMask::BOUNDS | ChangeMask::RENDER_DATA;
            if record.style != style {
                mask |= ChangeMask::STYLE;
            }
            if record.kind() == EntityKind::Text || geometry.kind() == EntityKind::Text {
                mask |= ChangeMask::TEXT;
            }
            record.geometry = geometry;
            record.style = style;
            self.touch(id, mask);
            return Ok(false);
        }
        let record = EntityRecord::new(id, geometry, style);
        self.check_record(&record)?;
        self.bump_next_id(id);
        self.insert_unchecked(record);
        Ok(true)
    }

    /// Apply a partial update. Geometry must keep the entity's kind.
    pub fn update(&mut self, id: EntityId, patch: EntityPatch) -> Result<ChangeMask, StoreError> {
        let record = self.entities.get(&id).ok_or(StoreError::UnknownEntity(id))?;
        if let Some(geometry) = &patch.geometry {
            if geometry.kind() != record.kind() {
                return Err(StoreError::KindMismatch {
                    id,
                    expected: geometry.kind(),
                    found: record.kind(),
                });
            }
            geometry
                .validate()
                .map_err(|reason| StoreError::InvalidGeometry { id, reason })?;
        }
        if let Some(layer) = patch.layer {
            if !self.layers.contains_key(&layer) {
                return Err(StoreError::UnknownLayer(layer));
            }
        }
        if let Some(z) = patch.z {
            if !z.is_finite() {
                return Err(StoreError::InvalidGeometry {
                    id,
                    reason: "non-finite elevation",
                });
            }
        }
        if let Some(style) = &patch.style {
            let mut restyled = record.clone();
            restyled.style = *style;
            restyled
                .validate()
                .map_err(|reason| StoreError::InvalidGeometry { id, reason })?;
        }

        let mut mask = ChangeMask::empty();
        let Some(record) = self.entities.get_mut(&id) else {
            return Err(StoreError::UnknownEntity(id));
        };
        if let Some(geometry) = patch.geometry {
            if record.kind() == EntityKind::Text {
                mask |= ChangeMask::TEXT;
            }
            record.geometry = geometry;
            mask |= ChangeMask::GEOMETRY | ChangeMask::BOUNDS | ChangeMask::RENDER_DATA;
        }
        if let Some(style) = patch.style {
            record.style = style;
            mask |= ChangeMask::STYLE | ChangeMask::RENDER_DATA;
        }
        if let Some(layer) = patch.layer {
            record.layer = layer;
            mask |= ChangeMask::LAYER | ChangeMask::RENDER_DATA;
        }
        if let Some(flags) = patch.flags {
            record.flags = flags;
            mask |= ChangeMask::FLAGS | ChangeMask::RENDER_DATA;
        }
        if let Some(z) = patch.z {
            record.z = z;
            mask |= ChangeMask::RENDER_DATA;
        }
        if !mask.is_empty() {
            self.touch(id, mask);
        }
        Ok(mask)
    }

    /// Overwrite an existing record in place, reusing its allocations.
    pub fn write_record(&mut self, source: &EntityRecord) -> Result<ChangeMask, StoreError> {
        self.check_record(source)?;
        let id = source.id;
        let record = self.entities.get_mut(&id).ok_or(StoreError::UnknownEntity(id))?;
        let mut mask = ChangeMask::empty();
        if record.geometry != source.geometry {
            mask |= ChangeMask::GEOMETRY | ChangeMask::BOUNDS | ChangeMask::RENDER_DATA;
            if source.kind() == EntityKind::Text {
                mask |= ChangeMask::TEXT;
            }
        }
        if record.style != source.style {
            mask |= ChangeMask::STYLE | ChangeMask::RENDER_DATA;
        }
        if record.layer != source.layer {
            mask |= ChangeMask::LAYER | ChangeMask::RENDER_DATA;
        }
        if record.flags != source.flags {
            mask |= ChangeMask::FLAGS | ChangeMask::RENDER_DATA;
        }
        if record.z != source.z {
            mask |= ChangeMask::RENDER_DATA;
        }
        if mask.is_empty() {
            return Ok(mask);
        }
        record.assign_from(source);
        self.touch(id, mask);
        Ok(mask)
    }

    /// Insert or replace a whole record (history and snapshot restore path).
    pub fn restore(&mut self, record: &EntityRecord) -> Result<(), StoreError> {
        if self.entities.contains_key(&record.id) {
            self.write_record(record)?;
            return Ok(());
        }
        self.check_record(record)?;
        self.bump_next_id(record.id);
        self.insert_unchecked(record.clone());
        Ok(())
    }

    pub fn delete(&mut self, id: EntityId) -> Result<EntityRecord, StoreError> {
        let record = self.entities.remove(&id).ok_or(StoreError::UnknownEntity(id))?;
        self.order.remove(id);
        self.render_dirty.entities.insert(id);
        self.render_dirty.order_changed = true;
        self.index_dirty.insert(id);
        self.journal.push(StoreChange::Deleted(id));
        self.generation += 1;
        debug!("Deleted entity {id}");
        Ok(record)
    }

    pub fn set_layer(&mut self, id: EntityId, layer: LayerId) -> Result<(), StoreError> {
        self.update(id, EntityPatch::new().with_layer(layer)).map(drop)
    }

    pub fn set_flags(&mut self, id: EntityId, flags: EntityFlags) -> Result<(), StoreError> {
        self.update(id, EntityPatch::new().with_flags(flags)).map(drop)
    }

    pub fn set_z(&mut self, id: EntityId, z: f64) -> Result<(), StoreError> {
        self.update(id, EntityPatch::new().with_z(z)).map(drop)
    }

    /// Remove every entity. Layers and `next_id` are kept.
    pub fn clear(&mut self) {
        if self.entities.is_empty() {
            return;
        }
        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            self.render_dirty.entities.insert(id);
            self.index_dirty.insert(id);
            self.journal.push(StoreChange::Deleted(id));
        }
        self.entities.clear();
        self.order.clear();
        self.render_dirty.order_changed = true;
        self.journal.push(StoreChange::Order);
        self.generation += 1;
        debug!("Cleared all entities");
    }

    // --- layers ---

    /// Create or replace a layer.
    pub fn upsert_layer(&mut self, layer: Layer) -> Result<(), StoreError> {
        let id = layer.id;
        let visibility_changed = self
            .layers
            .get(&id)
            .is_some_and(|old| old.flags != layer.flags);
        self.layers.insert(id, layer);
        if visibility_changed {
            let members: Vec<EntityId> = self
                .entities
                .values()
                .filter(|r| r.layer == id)
                .map(|r| r.id)
                .collect();
            for member in members {
                self.render_dirty.entities.insert(member);
                self.index_dirty.insert(member);
            }
        }
        self.journal.push(StoreChange::Layer(id));
        self.generation += 1;
        Ok(())
    }

    /// Delete a layer, moving its entities to the default layer.
    ///
    /// Returns the ids that were reassigned, sorted.
    pub fn delete_layer(&mut self, id: LayerId) -> Result<Vec<EntityId>, StoreError> {
        if id == DEFAULT_LAYER {
            return Err(StoreError::ProtectedLayer(id));
        }
        if !self.layers.contains_key(&id) {
            return Err(StoreError::UnknownLayer(id));
        }
        let mut moved: Vec<EntityId> = self
            .entities
            .values()
            .filter(|r| r.layer == id)
            .map(|r| r.id)
            .collect();
        moved.sort_unstable();
        for member in &moved {
            if let Some(record) = self.entities.get_mut(member) {
                record.layer = DEFAULT_LAYER;
            }
            self.touch(*member, ChangeMask::LAYER | ChangeMask::RENDER_DATA);
        }
        self.layers.remove(&id);
        self.journal.push(StoreChange::Layer(id));
        self.generation += 1;
        debug!("Deleted layer {id}, reassigned {} entities", moved.len());
        Ok(moved)
    }

    /// Replace the layer table. Every entity must still reference a listed layer.
    pub fn restore_layers(&mut self, layers: &[Layer]) -> Result<(), StoreError> {
        if !layers.iter().any(|l| l.id == DEFAULT_LAYER) {
            return Err(StoreError::UnknownLayer(DEFAULT_LAYER));
        }
        if let Some(orphan) = self
            .entities
            .values()
            .find(|r| !layers.iter().any(|l| l.id == r.layer))
        {
            return Err(StoreError::UnknownLayer(orphan.layer));
        }
        let before: Vec<Layer> = self.layers.values().cloned().collect();
        if before.as_slice() == layers {
            return Ok(());
        }
        self.layers.clear();
        for layer in layers {
            self.layers.insert(layer.id, layer.clone());
        }
        for layer in before.iter().chain(layers) {
            self.journal.push(StoreChange::Layer(layer.id));
        }
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.render_dirty.entities.insert(id);
            self.index_dirty.insert(id);
        }
        self.generation += 1;
        Ok(())
    }

    /// Insert layers from `layers` that are missing, leaving existing ones alone.
    pub(crate) fn ensure_layers(&mut self, layers: &[Layer]) {
        for layer in layers {
            if !self.layers.contains_key(&layer.id) {
                self.layers.insert(layer.id, layer.clone());
                self.journal.push(StoreChange::Layer(layer.id));
                self.generation += 1;
            }
        }
    }

    // --- order ---

    /// Returns whether the order changed.
    pub fn reorder(&mut self, id: EntityId, action: ReorderAction) -> Result<bool, StoreError> {
        if !self.entities.contains_key(&id) {
            return Err(StoreError::UnknownEntity(id));
        }
        let changed = self.order.apply(id, action);
        if changed {
            self.order_touched();
        }
        Ok(changed)
    }

    /// Replace the draw order with a permutation of the live ids.
    pub fn set_draw_order(&mut self, ids: &[EntityId]) -> Result<(), StoreError> {
        self.check_permutation(ids)?;
        if self.order.as_slice() == ids {
            return Ok(());
        }
        self.order.replace(ids);
        self.order_touched();
        Ok(())
    }

    // --- checkpoints ---

    pub fn checkpoint(&self) -> StoreCheckpoint {
        StoreCheckpoint {
            records: self.records_by_id().into_iter().cloned().collect(),
            layers: self.layers.values().cloned().collect(),
            order: self.order.as_slice().to_vec(),
            next_id: self.next_id,
        }
    }

    /// Replace the whole contents with `checkpoint`. `next_id` never decreases.
    pub fn restore_checkpoint(&mut self, checkpoint: &StoreCheckpoint) -> Result<(), StoreError> {
        let restored = Self::from_parts(
            checkpoint.layers.clone(),
            checkpoint.records.clone(),
            checkpoint.order.clone(),
            checkpoint.next_id,
        )?;
        let mut previous: Vec<EntityId> = self.entities.keys().copied().collect();
        previous.sort_unstable();
        for id in previous {
            if !restored.entities.contains_key(&id) {
                self.journal.push(StoreChange::Deleted(id));
            }
            self.render_dirty.entities.insert(id);
            self.index_dirty.insert(id);
        }
        for record in &checkpoint.records {
            let change = match self.entities.get(&record.id) {
                None => StoreChange::Created(record.id),
                Some(old) if old != record => StoreChange::Changed {
                    id: record.id,
                    mask: ChangeMask::all(),
                },
                Some(_) => continue,
            };
            self.journal.push(change);
        }
        for id in restored.entities.keys() {
            self.render_dirty.entities.insert(*id);
            self.index_dirty.insert(*id);
        }
        let next_id = self.next_id.max(restored.next_id);
        self.entities = restored.entities;
        self.layers = restored.layers;
        self.order = restored.order;
        self.next_id = next_id;
        self.render_dirty.order_changed = true;
        self.journal.push(StoreChange::Order);
        self.generation += 1;
        Ok(())
    }

    // --- dirty tracking ---

    /// Carry the generation counter over from a store this one replaces.
    pub fn continue_generation(&mut self, previous: u64) {
        self.generation = self.generation.max(previous.saturating_add(1));
    }

    /// Drain the set of entities the render builder must revisit.
    pub fn take_render_dirty(&mut self) -> RenderDirty {
        std::mem::take(&mut self.render_dirty)
    }

    /// Fold render work left over from a store this one replaces.
    pub fn absorb_render_dirty(&mut self, other: RenderDirty) {
        self.render_dirty.entities.extend(other.entities);
        self.render_dirty.order_changed |= other.order_changed;
    }

    /// Drain the set of entities the pick index must revisit.
    pub fn take_index_dirty(&mut self) -> BTreeSet<EntityId> {
        std::mem::take(&mut self.index_dirty)
    }

    pub fn has_index_dirty(&self) -> bool {
        !self.index_dirty.is_empty()
    }

    /// Drain journaled changes.
    pub fn take_journal(&mut self) -> Vec<StoreChange> {
        std::mem::take(&mut self.journal)
    }

    /// Mark every live entity dirty and request a full index re-emit.
    pub fn mark_everything_dirty(&mut self) {
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.render_dirty.entities.insert(id);
            self.index_dirty.insert(id);
            self.journal.push(StoreChange::Created(id));
        }
        self.render_dirty.order_changed = true;
        self.generation += 1;
    }

    // --- internals ---

    fn check_record(&self, record: &EntityRecord) -> Result<(), StoreError> {
        if record.id == NO_ENTITY {
            return Err(StoreError::ReservedId);
        }
        if !self.layers.contains_key(&record.layer) {
            return Err(StoreError::UnknownLayer(record.layer));
        }
        record.validate().map_err(|reason| StoreError::InvalidGeometry {
            id: record.id,
            reason,
        })
    }

    fn check_permutation(&self, ids: &[EntityId]) -> Result<(), StoreError> {
        if ids.len() != self.entities.len() {
            return Err(StoreError::InvalidOrder("length differs from the live entity count"));
        }
        let mut seen = BTreeSet::new();
        for id in ids {
            if !self.entities.contains_key(id) {
                return Err(StoreError::UnknownEntity(*id));
            }
            if !seen.insert(*id) {
                return Err(StoreError::InvalidOrder("duplicate id"));
            }
        }
        Ok(())
    }

    fn bump_next_id(&mut self, id: EntityId) {
        self.next_id = self.next_id.max(id.saturating_add(1));
    }

    fn insert_unchecked(&mut self, record: EntityRecord) {
        let id = record.id;
        self.entities.insert(id, record);
        self.order.push(id);
        self.render_dirty.entities.insert(id);
        self.render_dirty.order_changed = true;
        self.index_dirty.insert(id);
        self.journal.push(StoreChange::Created(id));
        self.generation += 1;
        debug!("Created entity {id}");
    }

    fn touch(&mut self, id: EntityId, mask: ChangeMask) {
        self.render_dirty.entities.insert(id);
        if mask.intersects(ChangeMask::GEOMETRY | ChangeMask::BOUNDS | ChangeMask::FLAGS | ChangeMask::LAYER) {
            self.index_dirty.insert(id);
        }
        self.journal.push(StoreChange::Changed { id, mask });
        self.generation += 1;
    }

    fn order_touched(&mut self) {
        self.render_dirty.order_changed = true;
        self.journal.push(StoreChange::Order);
        self.generation += 1;
    }
}
