//! # Tile World
//!
//! The engine instance. Owns the generator, the chunk cache, the overlay,
//! the streaming state, the render sink and the persistence store, and is
//! driven by its owner once per tick.
//!
//! ## Frame Flow
//!
//! ```text
//! tick(viewer) ──► StreamingController::plan
//!                     │
//!          ┌──────────┴───────────┐
//!          ▼                      ▼
//!    ensure_loaded(c)        unload(c)
//!    cache hit or generate   detach from sink, apply retention
//!    attach to sink
//!
//! on_tile_placed / on_tile_removed ──► MutationOverlay ──► cached chunk ──► sink
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkCoord, ChunkGenerator, WorldCell};
use crate::config::WorldConfig;
use crate::error::{WorldError, WorldResult};
use crate::overlay::{MutationOverlay, Removal};
use crate::persistence::{KeyValueStore, PersistenceCodec};
use crate::sink::{RenderSink, TileLayer, VisualHandle};
use crate::store::ChunkStore;
use crate::streaming::{StreamingController, TickReport};
use crate::structure::{StructureCatalog, StructureInstance};
use crate::terrain::TileKind;

/// Kind of build-tool edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    /// A tile was placed.
    Placed,
    /// A tile was removed.
    Removed,
}

/// An edit as emitted by the build tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileEdit {
    /// What happened.
    pub action: EditAction,
    /// Where.
    pub cell: WorldCell,
    /// Tile placed; required for `Placed`.
    #[serde(default)]
    pub tile: Option<TileKind>,
}

impl TileEdit {
    /// A placement edit.
    #[must_use]
    pub const fn placed(cell: WorldCell, tile: TileKind) -> Self {
        Self {
            action: EditAction::Placed,
            cell,
            tile: Some(tile),
        }
    }

    /// A removal edit.
    #[must_use]
    pub const fn removed(cell: WorldCell) -> Self {
        Self {
            action: EditAction::Removed,
            cell,
            tile: None,
        }
    }
}

/// World statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    /// Chunks built by the generator since open.
    pub generated: u64,
    /// Chunk loads served from the cache.
    pub cache_hits: u64,
    /// Payloads discarded by the retention policy.
    pub evicted: u64,
    /// Chunks currently attached to the sink.
    pub loaded_chunks: usize,
    /// Chunks currently cached.
    pub cached_chunks: usize,
    /// Destroyed cells in the overlay.
    pub destroyed_cells: usize,
    /// Registered structures.
    pub structures: usize,
    /// Buffered tile edits.
    pub buffered_edits: usize,
}

/// A streamed, editable, persistent tile world.
pub struct TileWorld<S: RenderSink, K: KeyValueStore> {
    config: WorldConfig,
    generator: ChunkGenerator,
    store: ChunkStore,
    overlay: MutationOverlay,
    streaming: StreamingController,
    visuals: HashMap<WorldCell, VisualHandle>,
    sink: S,
    storage: K,
}

impl<S: RenderSink, K: KeyValueStore> TileWorld<S, K> {
    /// Opens a world.
    ///
    /// The configuration is validated and the persisted overlay restored
    /// before any chunk is generated.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, or [`WorldError::CorruptPersistence`]
    /// if the stored overlay is damaged.
    pub fn open(config: WorldConfig, sink: S, storage: K) -> WorldResult<Self> {
        let generator = config.generator()?;
        let mut overlay = MutationOverlay::new(config.chunk_size);
        PersistenceCodec::load(&storage, generator.placer().catalog())?.restore_into(&mut overlay)?;

        tracing::info!(
            "Opened world: seed {}, {}x{} chunks, radius {}, {} restored structures",
            config.seed.value(),
            config.chunk_size,
            config.chunk_size,
            config.streaming.radius,
            overlay.structure_count()
        );

        Ok(Self {
            store: ChunkStore::new(config.streaming.retention),
            streaming: StreamingController::new(config.streaming.radius),
            config,
            generator,
            overlay,
            visuals: HashMap::new(),
            sink,
            storage,
        })
    }

    /// Advances streaming for a viewer at world position `(viewer_x, viewer_y)`.
    ///
    /// Positions that are not finite, or so far out that the neighborhood's
    /// cells would not fit in `i32`, are ignored with a warning and the
    /// report names the previous viewer chunk.
    pub fn tick(&mut self, viewer_x: f32, viewer_y: f32) -> TickReport {
        if !self.in_bounds(viewer_x) || !self.in_bounds(viewer_y) {
            tracing::warn!("Ignoring viewer position ({}, {}) outside the world", viewer_x, viewer_y);
            return TickReport {
                viewer_chunk: self.streaming.current().unwrap_or_default(),
                ..TickReport::default()
            };
        }
        let viewer_chunk = ChunkCoord::from_world_pos(viewer_x, viewer_y, self.config.chunk_size);
        let mut report = TickReport {
            viewer_chunk,
            ..TickReport::default()
        };

        let Some(plan) = self.streaming.plan(viewer_chunk) else {
            return report;
        };
        tracing::info!("Viewer entered chunk [{},{}]", viewer_chunk.x, viewer_chunk.y);

        for coord in plan.load {
            if self.ensure_loaded(coord) {
                report.generated += 1;
            }
            report.loaded.push(coord);
        }
        for coord in plan.unload {
            self.unload(coord);
            report.unloaded.push(coord);
        }
        report
    }

    /// Attaches the chunk at `coord` to the sink, generating it on a cache
    /// miss. Returns true if the chunk was generated.
    ///
    /// Does nothing for a chunk that is already attached.
    pub fn ensure_loaded(&mut self, coord: ChunkCoord) -> bool {
        if self.streaming.is_loaded(coord) {
            return false;
        }

        let generator = &self.generator;
        let overlay = &mut self.overlay;
        let (chunk, fresh) = self
            .store
            .get_or_generate(coord, || generator.generate(coord, overlay));

        if fresh {
            for instance in chunk.structures() {
                let registered = overlay.register(instance.clone())
                    || overlay.structure_at(instance.anchor) == Some(instance);
                debug_assert!(registered, "placer produced an overlapping structure");
            }
            tracing::debug!(
                "Chunk [{},{}] generated with {} structures",
                coord.x,
                coord.y,
                chunk.structures().len()
            );
        }

        attach(&mut self.sink, &mut self.visuals, generator.placer().catalog(), chunk);
        self.streaming.mark_loaded(coord);
        tracing::debug!("Chunk [{},{}] loaded", coord.x, coord.y);
        fresh
    }

    /// Detaches the chunk at `coord` from the sink and applies the retention
    /// policy. Returns false if it was not attached.
    pub fn unload(&mut self, coord: ChunkCoord) -> bool {
        if !self.streaming.is_loaded(coord) {
            return false;
        }

        if let Some(chunk) = self.store.get(coord) {
            detach(&mut self.sink, &mut self.visuals, chunk);
        }
        self.streaming.mark_unloaded(coord);
        let dropped = self.store.release(coord);
        tracing::debug!(
            "Chunk [{},{}] unloaded{}",
            coord.x,
            coord.y,
            if dropped { " and dropped" } else { "" }
        );
        true
    }

    /// Handles a tile placed by the build tool.
    ///
    /// The cell is projected onto the ground plane. Returns true if the
    /// buffered edit changed.
    pub fn on_tile_placed(&mut self, cell: WorldCell, tile: TileKind) -> bool {
        let cell = cell.on_ground();
        let changed = self.overlay.record_placed(cell, tile);
        self.write_ground(cell, Some(tile));
        changed
    }

    /// Handles a tile removed by the build tool.
    ///
    /// Removing any cell of a structure removes the whole structure and
    /// destroys its footprint. The cell is projected onto the ground plane.
    pub fn on_tile_removed(&mut self, cell: WorldCell) -> Removal {
        let cell = cell.on_ground();
        let removal = self.overlay.record_removed(cell);

        let footprint: Vec<WorldCell> = match &removal.structure {
            Some(instance) => {
                self.tear_down(instance);
                instance.cells().to_vec()
            }
            None => vec![cell],
        };
        for cell in footprint {
            self.write_ground(cell, None);
        }

        if !removal.is_noop() {
            tracing::debug!(
                "Removed [{},{}]: {} cells destroyed{}",
                cell.x,
                cell.y,
                removal.newly_destroyed,
                if removal.structure.is_some() { " with structure" } else { "" }
            );
        }
        removal
    }

    /// Applies a build-tool edit.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::MissingTile`] for a placement without a tile.
    pub fn apply(&mut self, edit: &TileEdit) -> WorldResult<()> {
        match edit.action {
            EditAction::Placed => {
                let tile = edit.tile.ok_or(WorldError::MissingTile(edit.cell.triple()))?;
                self.on_tile_placed(edit.cell, tile);
            }
            EditAction::Removed => {
                self.on_tile_removed(edit.cell);
            }
        }
        Ok(())
    }

    /// Writes the durable overlay to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn save(&mut self) -> WorldResult<()> {
        PersistenceCodec::save(&mut self.storage, &self.overlay)
    }

    /// Saves and shuts the world down, handing back the sink and the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the final save fails.
    pub fn close(mut self) -> WorldResult<(S, K)> {
        self.save()?;
        tracing::info!("Closed world after generating {} chunks", self.store.stats().generated);
        Ok((self.sink, self.storage))
    }

    /// True if every cell of a neighborhood around `coordinate` fits in `i32`.
    fn in_bounds(&self, coordinate: f32) -> bool {
        let margin = (f64::from(self.config.streaming.radius) + 2.0) * self.config.chunk_size as f64;
        coordinate.is_finite() && f64::from(coordinate).abs() <= f64::from(i32::MAX) - margin
    }

    /// Writes a ground tile into the cached chunk, and to the sink if attached.
    fn write_ground(&mut self, cell: WorldCell, tile: Option<TileKind>) {
        let coord = ChunkCoord::from_cell(cell, self.config.chunk_size);
        let Some(chunk) = self.store.get_mut(coord) else {
            return;
        };
        if chunk.set_tile_at(cell, tile) && self.streaming.is_loaded(coord) {
            self.sink.set_tile(TileLayer::Ground, cell, tile);
        }
    }

    /// Removes a structure from its cached chunk and from the sink.
    fn tear_down(&mut self, instance: &StructureInstance) {
        let coord = ChunkCoord::from_cell(instance.anchor, self.config.chunk_size);
        if let Some(chunk) = self.store.get_mut(coord) {
            chunk.remove_structure(instance.anchor);
        }
        if let Some(handle) = self.visuals.remove(&instance.anchor) {
            self.sink.despawn_structure_visual(handle);
            for cell in instance.cells() {
                self.sink.set_tile(TileLayer::Structure, *cell, None);
            }
        }
    }

    /// Returns the cached ground tile at `cell`.
    ///
    /// The outer `None` means the chunk is not cached.
    #[must_use]
    pub fn tile_at(&self, cell: WorldCell) -> Option<Option<TileKind>> {
        let cell = cell.on_ground();
        self.store
            .get(ChunkCoord::from_cell(cell, self.config.chunk_size))
            .map(|chunk| chunk.tile_at(cell))
    }

    /// Returns the structure occupying `cell`.
    #[must_use]
    pub fn structure_at(&self, cell: WorldCell) -> Option<&StructureInstance> {
        self.overlay.structure_at(cell.on_ground())
    }

    /// Returns the cached chunk at `coord`.
    #[must_use]
    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.store.get(coord)
    }

    /// Returns true if `coord` is attached to the sink.
    #[must_use]
    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.streaming.is_loaded(coord)
    }

    /// Iterates attached chunks in lexicographic order.
    pub fn loaded_chunks(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.streaming.loaded()
    }

    /// Returns the mutation overlay.
    #[must_use]
    pub fn overlay(&self) -> &MutationOverlay {
        &self.overlay
    }

    /// Returns the structure catalog.
    #[must_use]
    pub fn catalog(&self) -> &StructureCatalog {
        self.generator.placer().catalog()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Returns the render sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Returns the persistence store.
    #[must_use]
    pub fn storage(&self) -> &K {
        &self.storage
    }

    /// Returns world statistics.
    #[must_use]
    pub fn stats(&self) -> WorldStats {
        let store = self.store.stats();
        WorldStats {
            generated: store.generated,
            cache_hits: store.cache_hits,
            evicted: store.evicted,
            loaded_chunks: self.streaming.loaded().count(),
            cached_chunks: self.store.len(),
            destroyed_cells: self.overlay.destroyed_len(),
            structures: self.overlay.structure_count(),
            buffered_edits: self.overlay.override_count(),
        }
    }
}

/// Pushes a chunk's ground tiles, structure tiles and visuals to the sink.
fn attach<S: RenderSink>(
    sink: &mut S,
    visuals: &mut HashMap<WorldCell, VisualHandle>,
    catalog: &StructureCatalog,
    chunk: &Chunk,
) {
    for (cell, tile) in chunk.cells() {
        if tile.is_some() {
            sink.set_tile(TileLayer::Ground, cell, tile);
        }
    }
    for instance in chunk.structures() {
        if let Some(template) = catalog.get(instance.template) {
            for (cell, tile) in instance.tiles(template) {
                sink.set_tile(TileLayer::Structure, cell, Some(tile));
            }
        }
        let handle = sink.spawn_structure_visual(instance.anchor, instance.template);
        visuals.insert(instance.anchor, handle);
    }
}

/// Clears a chunk's tiles from the sink and despawns its visuals.
fn detach<S: RenderSink>(sink: &mut S, visuals: &mut HashMap<WorldCell, VisualHandle>, chunk: &Chunk) {
    for (cell, tile) in chunk.cells() {
        if tile.is_some() {
            sink.set_tile(TileLayer::Ground, cell, None);
        }
    }
    for instance in chunk.structures() {
        for cell in instance.cells() {
            sink.set_tile(TileLayer::Structure, *cell, None);
        }
        if let Some(handle) = visuals.remove(&instance.anchor) {
            sink.despawn_structure_visual(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::sink::RecordingSink;

    fn open() -> TileWorld<RecordingSink, MemoryStore> {
        TileWorld::open(WorldConfig::default(), RecordingSink::new(), MemoryStore::new()).unwrap()
    }

    #[test]
    fn test_first_tick_loads_neighborhood() {
        let mut world = open();
        let report = world.tick(0.5, 0.5);
        assert_eq!(report.loaded.len(), 9);
        assert_eq!(report.generated, 9);
        assert!(world.tick(3.0, 3.0).is_idle());
        assert_eq!(world.sink().tile_count(TileLayer::Ground), 9 * 256);
    }

    #[test]
    fn test_placement_reaches_cache_and_sink() {
        let mut world = open();
        world.tick(0.0, 0.0);
        let cell = WorldCell::new(2, 2);

        assert!(world.on_tile_placed(cell, TileKind(50)));
        assert!(!world.on_tile_placed(cell, TileKind(50)));
        assert_eq!(world.tile_at(cell), Some(Some(TileKind(50))));
        assert_eq!(world.sink().tile(TileLayer::Ground, cell), Some(TileKind(50)));
    }

    #[test]
    fn test_removal_clears_cell() {
        let mut world = open();
        world.tick(0.0, 0.0);
        let cell = WorldCell::new(-3, 7);

        let removal = world.on_tile_removed(cell);
        assert_eq!(world.tile_at(cell), Some(None));
        assert_eq!(world.sink().tile(TileLayer::Ground, cell), None);
        assert!(world.overlay().is_destroyed(cell));
        if removal.structure.is_none() {
            assert_eq!(removal.newly_destroyed, 1);
        }
        assert!(world.on_tile_removed(cell).is_noop());
    }

    #[test]
    fn test_apply_rejects_placement_without_tile() {
        let mut world = open();
        let edit = TileEdit {
            action: EditAction::Placed,
            cell: WorldCell::new(1, 1),
            tile: None,
        };
        assert!(matches!(world.apply(&edit), Err(WorldError::MissingTile([1, 1, 0]))));
        world.apply(&TileEdit::removed(WorldCell::new(1, 1))).unwrap();
        assert!(world.overlay().is_destroyed(WorldCell::new(1, 1)));
    }

    #[test]
    fn test_edits_to_uncached_chunks_are_buffered() {
        let mut world = open();
        let far = WorldCell::new(1000, 1000);
        world.on_tile_placed(far, TileKind(60));
        assert_eq!(world.tile_at(far), None);

        world.tick(1000.0, 1000.0);
        assert_eq!(world.tile_at(far), Some(Some(TileKind(60))));
    }

    #[test]
    fn test_ignores_positions_outside_the_world() {
        let mut world = open();
        world.tick(8.0, 8.0);
        let stats = world.stats();

        for (x, y) in [(3.0e10, 0.0), (0.0, -3.0e10), (f32::NAN, 0.0), (0.0, f32::INFINITY)] {
            let report = world.tick(x, y);
            assert!(report.is_idle());
            assert_eq!(report.viewer_chunk, ChunkCoord::new(0, 0));
        }
        assert_eq!(world.stats(), stats);

        // The far edge itself still streams
        let edge = 2.0e9;
        let report = world.tick(edge, -edge);
        assert_eq!(report.loaded.len(), 9);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let config = WorldConfig {
            chunk_size: 0,
            ..WorldConfig::default()
        };
        assert!(TileWorld::open(config, RecordingSink::new(), MemoryStore::new()).is_err());
    }
}
