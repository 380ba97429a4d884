//! Validate-then-apply for decoded command batches.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error};

use super::{Command, CommandError, decode_commands};
use crate::entity::{DEFAULT_LAYER, EntityId, EntityRecord, EntityStore, Geometry, LayerId, NO_ENTITY, StoreError};
use crate::history::History;
use crate::text::GlyphProvider;
use crate::view::Viewport;

/// Everything a batch may touch.
pub struct ApplyContext<'a> {
    pub store: &'a mut EntityStore,
    pub history: &'a mut History,
    pub glyphs: &'a dyn GlyphProvider,
    pub viewport: &'a mut Viewport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub commands: usize,
    /// Whether the batch produced an undo entry.
    pub recorded: bool,
}

/// The store as it would look part-way through a batch.
struct Scope<'a> {
    store: &'a EntityStore,
    cleared: bool,
    entities: BTreeMap<EntityId, bool>,
    layers: BTreeMap<LayerId, bool>,
}

impl<'a> Scope<'a> {
    fn new(store: &'a EntityStore) -> Self {
        Self {
            store,
            cleared: false,
            entities: BTreeMap::new(),
            layers: BTreeMap::new(),
        }
    }

    fn entity_exists(&self, id: EntityId) -> bool {
        match self.entities.get(&id) {
            Some(live) => *live,
            None => !self.cleared && self.store.contains(id),
        }
    }

    fn layer_exists(&self, id: LayerId) -> bool {
        match self.layers.get(&id) {
            Some(live) => *live,
            None => self.store.layer(id).is_some(),
        }
    }

    fn live_ids(&self) -> BTreeSet<EntityId> {
        let mut ids: BTreeSet<EntityId> = if self.cleared {
            BTreeSet::new()
        } else {
            self.store.draw_order().iter().copied().collect()
        };
        for (id, live) in &self.entities {
            if *live {
                ids.insert(*id);
            } else {
                ids.remove(id);
            }
        }
        ids
    }

    fn require_entity(&self, index: usize, id: EntityId) -> Result<(), CommandError> {
        if self.entity_exists(id) {
            Ok(())
        } else {
            Err(reject(index, StoreError::UnknownEntity(id)))
        }
    }

    fn check(&mut self, index: usize, command: &Command) -> Result<(), CommandError> {
        match command {
            Command::ClearAll => {
                self.cleared = true;
                self.entities.clear();
            }
            Command::Upsert { id, geometry, style } => {
                if *id == NO_ENTITY {
                    return Err(reject(index, StoreError::ReservedId));
                }
                EntityRecord::new(*id, geometry.clone(), *style)
                    .validate()
                    .map_err(|reason| reject(index, StoreError::InvalidGeometry { id: *id, reason }))?;
                self.entities.insert(*id, true);
            }
            Command::Delete { id, if_present } => {
                if !*if_present {
                    self.require_entity(index, *id)?;
                }
                self.entities.insert(*id, false);
            }
            Command::SetDrawOrder(ids) => {
                let live = self.live_ids();
                if ids.len() != live.len() {
                    return Err(reject(
                        index,
                        StoreError::InvalidOrder("length differs from the live entity count"),
                    ));
                }
                let mut seen = BTreeSet::new();
                for id in ids {
                    if !live.contains(id) {
                        return Err(reject(index, StoreError::UnknownEntity(*id)));
                    }
                    if !seen.insert(*id) {
                        return Err(reject(index, StoreError::InvalidOrder("duplicate id")));
                    }
                }
            }
            Command::SetLayer { id, layer } => {
                self.require_entity(index, *id)?;
                if !self.layer_exists(*layer) {
                    return Err(reject(index, StoreError::UnknownLayer(*layer)));
                }
            }
            Command::SetFlags { id, .. } | Command::SetZ { id, .. } | Command::Reorder { id, .. } => {
                self.require_entity(index, *id)?;
            }
            Command::UpsertLayer(layer) => {
                self.layers.insert(layer.id, true);
            }
            Command::DeleteLayer(id) => {
                if *id == DEFAULT_LAYER {
                    return Err(reject(index, StoreError::ProtectedLayer(*id)));
                }
                if !self.layer_exists(*id) {
                    return Err(reject(index, StoreError::UnknownLayer(*id)));
                }
                self.layers.insert(*id, false);
            }
            Command::SetViewScale(scale) => {
                if *scale <= 0.0 {
                    return Err(CommandError::InvalidPayload {
                        index,
                        reason: "view scale must be positive",
                    });
                }
            }
        }
        Ok(())
    }
}

fn reject(index: usize, source: StoreError) -> CommandError {
    CommandError::Rejected { index, source }
}

/// Decode and validate a buffer against `store` without mutating anything.
pub fn validate_commands(bytes: &[u8], store: &EntityStore) -> Result<Vec<Command>, CommandError> {
    let commands = decode_commands(bytes)?;
    let mut scope = Scope::new(store);
    for (index, command) in commands.iter().enumerate() {
        scope.check(index, command)?;
    }
    Ok(commands)
}

/// Apply a whole buffer or nothing. A batch that changes the document
/// becomes exactly one undo entry.
pub fn apply_commands(bytes: &[u8], ctx: ApplyContext<'_>) -> Result<ApplyReport, CommandError> {
    let ApplyContext {
        store,
        history,
        glyphs,
        viewport,
    } = ctx;
    let commands = validate_commands(bytes, store)?;
    let count = commands.len();

    history.begin(store);
    for (index, command) in commands.into_iter().enumerate() {
        if let Err(source) = apply_one(command, store, history, glyphs, viewport) {
            error!("Command {index} failed after validation: {source}");
            if let Err(rollback) = history.rollback(store) {
                error!("Rollback failed: {rollback}");
            }
            return Err(reject(index, source));
        }
    }
    let recorded = history.commit(store);
    debug!("Applied {count} commands (recorded: {recorded})");
    Ok(ApplyReport {
        commands: count,
        recorded,
    })
}

fn apply_one(
    command: Command,
    store: &mut EntityStore,
    history: &mut History,
    glyphs: &dyn GlyphProvider,
    viewport: &mut Viewport,
) -> Result<(), StoreError> {
    match command {
        Command::ClearAll => {
            history.mark_order(store);
            for id in store.draw_order().to_vec() {
                history.mark_entity(store, id);
            }
            store.clear();
        }
        Command::Upsert {
            id,
            mut geometry,
            style,
        } => {
            if let Geometry::Text(text) = &mut geometry {
                text.extent = glyphs.measure(&text.content, text.font_id, text.font_size).size();
            }
            history.mark_entity(store, id);
            if !store.contains(id) {
                history.mark_order(store);
            }
            store.upsert(id, geometry, style)?;
        }
        Command::Delete { id, if_present } => {
            if if_present && !store.contains(id) {
                return Ok(());
            }
            history.mark_entity(store, id);
            history.mark_order(store);
            store.delete(id)?;
        }
        Command::SetDrawOrder(ids) => {
            history.mark_order(store);
            store.set_draw_order(&ids)?;
        }
        Command::SetLayer { id, layer } => {
            history.mark_entity(store, id);
            store.set_layer(id, layer)?;
        }
        Command::SetFlags { id, flags } => {
            history.mark_entity(store, id);
            store.set_flags(id, flags)?;
        }
        Command::SetZ { id, z } => {
            history.mark_entity(store, id);
            store.set_z(id, z)?;
        }
        Command::UpsertLayer(layer) => {
            history.mark_layers(store);
            store.upsert_layer(layer)?;
        }
        Command::DeleteLayer(layer) => {
            history.mark_layers(store);
            let members: Vec<EntityId> = store
                .iter_ordered()
                .filter(|r| r.layer == layer)
                .map(|r| r.id)
                .collect();
            for id in members {
                history.mark_entity(store, id);
            }
            store.delete_layer(layer)?;
        }
        Command::Reorder { id, action } => {
            history.mark_order(store);
            store.reorder(id, action)?;
        }
        Command::SetViewScale(scale) => {
            viewport.set_scale(scale);
        }
    }
    Ok(())
}
