//! Incremental vertex/index buffers for a document's entities.

use std::collections::HashMap;
use std::collections::TryReserveError;

use inkframe_core::entity::{EntityId, EntityRecord, EntityStore, RenderDirty};
use inkframe_core::error::ErrorKind;
use inkframe_core::text::GlyphProvider;
use log::{debug, warn};
use thiserror::Error;

use crate::tessellate::{Mesh, Vertex, tessellate};

/// Render buffer errors.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render buffer allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
    #[error("vertex buffer would exceed u32 indexing ({0} vertices)")]
    TooManyVertices(usize),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Resource
    }
}

/// Result type for render buffer operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Borrowed view of the built buffers.
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
    /// Bumped whenever the buffer contents change.
    pub generation: u64,
}

/// Where one entity's vertices live in the shared buffer.
#[derive(Debug, Clone)]
struct Slot {
    offset: u32,
    len: u32,
    /// Indices relative to `offset`.
    indices: Vec<u32>,
}

#[derive(Debug, Default)]
struct Overlay {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    generation: u64,
}

/// Keeps a flat vertex buffer and a draw-ordered index buffer in sync with a store.
///
/// Only entities reported dirty are retessellated. A new builder, or one that
/// failed a rebuild, tessellates everything on its next rebuild.
#[derive(Debug)]
pub struct RenderBufferBuilder {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    slots: HashMap<EntityId, Slot>,
    /// Vertices no slot points at any more.
    freed: usize,
    generation: u64,
    full_rebuild: bool,
    scratch: Mesh,
    overlay: Overlay,
}

impl Default for RenderBufferBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBufferBuilder {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            slots: HashMap::new(),
            freed: 0,
            generation: 0,
            full_rebuild: true,
            scratch: Mesh::new(),
            overlay: Overlay::default(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Vertices still allocated to removed or resized entities.
    pub fn freed_vertices(&self) -> usize {
        self.freed
    }

    pub fn frame(&self) -> RenderFrame<'_> {
        RenderFrame {
            vertices: &self.vertices,
            indices: &self.indices,
            generation: self.generation,
        }
    }

    /// Force the next rebuild to retessellate everything.
    pub fn invalidate(&mut self) {
        self.full_rebuild = true;
    }

    /// Bring the buffers up to date with `store`.
    pub fn rebuild(
        &mut self,
        store: &EntityStore,
        dirty: &RenderDirty,
        glyphs: &dyn GlyphProvider,
    ) -> RenderResult<RenderFrame<'_>> {
        let result = if self.full_rebuild {
            self.rebuild_all(store, glyphs)
        } else {
            self.rebuild_dirty(store, dirty, glyphs)
        };
        if let Err(e) = result {
            warn!("Render rebuild failed, next rebuild starts from scratch: {e}");
            self.full_rebuild = true;
            return Err(e);
        }
        Ok(self.frame())
    }

    fn rebuild_all(&mut self, store: &EntityStore, glyphs: &dyn GlyphProvider) -> RenderResult<()> {
        self.vertices.clear();
        self.slots.clear();
        self.freed = 0;
        for record in store.iter_ordered() {
            if !store.is_rendered(record) {
                continue;
            }
            tessellate(record, glyphs, &mut self.scratch);
            if self.scratch.is_empty() {
                continue;
            }
            let slot = self.append_scratch()?;
            self.slots.insert(record.id, slot);
        }
        self.emit_indices(store)?;
        self.full_rebuild = false;
        self.generation += 1;
        debug!(
            "Full render rebuild: {} entities, {} vertices",
            self.slots.len(),
            self.vertices.len()
        );
        Ok(())
    }

    fn rebuild_dirty(
        &mut self,
        store: &EntityStore,
        dirty: &RenderDirty,
        glyphs: &dyn GlyphProvider,
    ) -> RenderResult<()> {
        let mut changed = false;
        let mut reindex = dirty.order_changed;
        for id in &dirty.entities {
            let record = store.get(*id).filter(|r| store.is_rendered(r));
            match record {
                Some(record) => {
                    let (c, r) = self.update_entity(record, glyphs)?;
                    changed |= c;
                    reindex |= r;
                }
                None => {
                    if let Some(slot) = self.slots.remove(id) {
                        self.freed += slot.len as usize;
                        changed = true;
                        reindex = true;
                    }
                }
            }
        }
        if self.freed * 2 > self.vertices.len() {
            self.compact()?;
            changed = true;
            reindex = true;
        }
        if reindex {
            let before = self.indices.len();
            self.emit_indices(store)?;
            changed |= before != self.indices.len() || dirty.order_changed;
        }
        if changed {
            self.generation += 1;
        }
        Ok(())
    }

    /// Returns `(content changed, index buffer must be re-emitted)`.
    fn update_entity(&mut self, record: &EntityRecord, glyphs: &dyn GlyphProvider) -> RenderResult<(bool, bool)> {
        tessellate(record, glyphs, &mut self.scratch);
        if self.scratch.is_empty() {
            return Ok(match self.slots.remove(&record.id) {
                Some(slot) => {
                    self.freed += slot.len as usize;
                    (true, true)
                }
                None => (false, false),
            });
        }
        let same_len = self
            .slots
            .get(&record.id)
            .is_some_and(|slot| slot.len as usize == self.scratch.vertices.len());
        if let Some(slot) = self.slots.get_mut(&record.id).filter(|_| same_len) {
            let start = slot.offset as usize;
            let range = &mut self.vertices[start..start + slot.len as usize];
            let vertices_changed = range != self.scratch.vertices.as_slice();
            if vertices_changed {
                range.copy_from_slice(&self.scratch.vertices);
            }
            let indices_changed = slot.indices != self.scratch.indices;
            if indices_changed {
                slot.indices.clone_from(&self.scratch.indices);
            }
            return Ok((vertices_changed || indices_changed, indices_changed));
        }
        let slot = self.append_scratch()?;
        if let Some(old) = self.slots.insert(record.id, slot) {
            self.freed += old.len as usize;
        }
        Ok((true, true))
    }

    fn append_scratch(&mut self) -> RenderResult<Slot> {
        let offset = self.vertices.len();
        let len = self.scratch.vertices.len();
        let end = offset + len;
        if end > u32::MAX as usize {
            return Err(RenderError::TooManyVertices(end));
        }
        self.vertices.try_reserve(len)?;
        self.vertices.extend_from_slice(&self.scratch.vertices);
        Ok(Slot {
            offset: offset as u32,
            len: len as u32,
            indices: self.scratch.indices.clone(),
        })
    }

    /// Copy live ranges into a fresh buffer, dropping freed space.
    fn compact(&mut self) -> RenderResult<()> {
        let live = self.vertices.len() - self.freed;
        let mut packed: Vec<Vertex> = Vec::new();
        packed.try_reserve_exact(live)?;
        let mut ids: Vec<EntityId> = self.slots.keys().copied().collect();
        ids.sort_unstable_by_key(|id| self.slots[id].offset);
        for id in ids {
            if let Some(slot) = self.slots.get_mut(&id) {
                let start = slot.offset as usize;
                slot.offset = packed.len() as u32;
                packed.extend_from_slice(&self.vertices[start..start + slot.len as usize]);
            }
        }
        debug!(
            "Compacted render buffer from {} to {} vertices",
            self.vertices.len(),
            packed.len()
        );
        self.vertices = packed;
        self.freed = 0;
        Ok(())
    }

    fn emit_indices(&mut self, store: &EntityStore) -> RenderResult<()> {
        self.indices.clear();
        let total: usize = self.slots.values().map(|s| s.indices.len()).sum();
        self.indices.try_reserve(total)?;
        for id in store.draw_order() {
            if let Some(slot) = self.slots.get(id) {
                self.indices
                    .extend(slot.indices.iter().map(|i| slot.offset + i));
            }
        }
        Ok(())
    }

    /// Tessellate transient records (a session preview) into the overlay buffer.
    ///
    /// The overlay is independent of the main buffers and reuses its allocation.
    pub fn build_overlay<'r>(
        &mut self,
        records: impl IntoIterator<Item = &'r EntityRecord>,
        glyphs: &dyn GlyphProvider,
    ) -> RenderResult<RenderFrame<'_>> {
        self.overlay.vertices.clear();
        self.overlay.indices.clear();
        for record in records {
            tessellate(record, glyphs, &mut self.scratch);
            let base = self.overlay.vertices.len();
            if base + self.scratch.vertices.len() > u32::MAX as usize {
                return Err(RenderError::TooManyVertices(base + self.scratch.vertices.len()));
            }
            self.overlay.vertices.try_reserve(self.scratch.vertices.len())?;
            self.overlay.indices.try_reserve(self.scratch.indices.len())?;
            self.overlay.vertices.extend_from_slice(&self.scratch.vertices);
            self.overlay
                .indices
                .extend(self.scratch.indices.iter().map(|i| base as u32 + i));
        }
        self.overlay.generation += 1;
        Ok(RenderFrame {
            vertices: &self.overlay.vertices,
            indices: &self.overlay.indices,
            generation: self.overlay.generation,
        })
    }
}
