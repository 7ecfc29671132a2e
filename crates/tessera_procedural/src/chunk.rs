//! # Chunk System
//!
//! The world is organized into fixed-size square chunks of tiles:
//! - Generated on first demand, at most once per cache residency
//! - Cached by coordinate and streamed to the render sink
//! - Mutated only through the overlay, in place
//!
//! ## Chunk Format
//!
//! A chunk of side `N` stores `N * N` ground cells in row-major order
//! (`index = x + y * N`). Each cell is an `Option<TileKind>`; `None` is a
//! cell the player cleared.

use serde::{Deserialize, Serialize};

use crate::noise::NoiseField;
use crate::overlay::MutationOverlay;
use crate::shoreline::{smooth_water, SmoothingSettings};
use crate::structure::{StructureInstance, StructurePlacer};
use crate::terrain::{TerrainClassifier, TerrainKind, TileKind};

/// A world cell. `z` is the tile plane and is 0 for every generated cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldCell {
    /// X coordinate (in cells).
    pub x: i32,
    /// Y coordinate (in cells).
    pub y: i32,
    /// Tile plane.
    pub z: i32,
}

impl WorldCell {
    /// Creates a cell on the ground plane.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y, z: 0 }
    }

    /// Creates a cell from a full triple.
    #[inline]
    #[must_use]
    pub const fn from_triple(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the same column on the ground plane.
    #[inline]
    #[must_use]
    pub const fn on_ground(self) -> Self {
        Self::new(self.x, self.y)
    }

    /// Returns this cell shifted by `(dx, dy)`.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z,
        }
    }

    /// Returns the `(x, y, z)` triple.
    #[inline]
    #[must_use]
    pub const fn triple(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Chunk coordinate (identifies a chunk in the world grid).
///
/// Ordered lexicographically by `(x, y)`; that order is the generation
/// traversal order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkCoord {
    /// X coordinate (in chunks, not cells).
    pub x: i32,
    /// Y coordinate (in chunks, not cells).
    pub y: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the chunk containing `cell`. Floors toward negative infinity.
    #[inline]
    #[must_use]
    pub const fn from_cell(cell: WorldCell, side: usize) -> Self {
        Self {
            x: cell.x.div_euclid(side as i32),
            y: cell.y.div_euclid(side as i32),
        }
    }

    /// Returns the chunk containing a continuous world position.
    #[inline]
    #[must_use]
    pub fn from_world_pos(world_x: f32, world_y: f32, side: usize) -> Self {
        let side = side as f32;
        Self {
            x: (world_x / side).floor() as i32,
            y: (world_y / side).floor() as i32,
        }
    }

    /// Returns the cell at this chunk's origin (lowest corner).
    #[inline]
    #[must_use]
    pub const fn origin(self, side: usize) -> WorldCell {
        WorldCell::new(self.x * side as i32, self.y * side as i32)
    }

    /// Returns the Chebyshev distance to `other`.
    #[inline]
    #[must_use]
    pub const fn chebyshev(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        if dx > dy { dx } else { dy }
    }

    /// Returns true if `cell` lies inside this chunk.
    #[inline]
    #[must_use]
    pub const fn contains(self, cell: WorldCell, side: usize) -> bool {
        let c = Self::from_cell(cell, side);
        c.x == self.x && c.y == self.y
    }

    /// Returns the row-major index of `cell` within this chunk, if inside.
    #[inline]
    #[must_use]
    pub const fn local_index(self, cell: WorldCell, side: usize) -> Option<usize> {
        if !self.contains(cell, side) {
            return None;
        }
        let origin = self.origin(side);
        Some((cell.x - origin.x) as usize + (cell.y - origin.y) as usize * side)
    }
}

/// A chunk of world data.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Chunk position in the world.
    pub coord: ChunkCoord,
    side: usize,
    tiles: Vec<Option<TileKind>>,
    structures: Vec<StructureInstance>,
}

impl Chunk {
    /// Creates a chunk of side `side` with every cell empty.
    #[must_use]
    pub fn new(coord: ChunkCoord, side: usize) -> Self {
        Self {
            coord,
            side,
            tiles: vec![None; side * side],
            structures: Vec::new(),
        }
    }

    /// Returns the side length in cells.
    #[inline]
    #[must_use]
    pub const fn side(&self) -> usize {
        self.side
    }

    /// Gets the ground tile at local coordinates. Out of range reads as empty.
    #[inline]
    #[must_use]
    pub fn get_tile(&self, x: usize, y: usize) -> Option<TileKind> {
        if x < self.side && y < self.side {
            self.tiles[x + y * self.side]
        } else {
            None
        }
    }

    /// Gets the ground tile at a world cell inside this chunk.
    #[inline]
    #[must_use]
    pub fn tile_at(&self, cell: WorldCell) -> Option<TileKind> {
        self.coord
            .local_index(cell, self.side)
            .and_then(|index| self.tiles[index])
    }

    /// Sets the ground tile at a world cell inside this chunk.
    ///
    /// Returns true if the stored tile changed.
    pub fn set_tile_at(&mut self, cell: WorldCell, tile: Option<TileKind>) -> bool {
        let Some(index) = self.coord.local_index(cell, self.side) else {
            return false;
        };
        if self.tiles[index] == tile {
            return false;
        }
        self.tiles[index] = tile;
        true
    }

    /// Returns the ground tiles in row-major order.
    #[inline]
    #[must_use]
    pub fn tiles(&self) -> &[Option<TileKind>] {
        &self.tiles
    }

    /// Iterates `(cell, tile)` over every ground cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (WorldCell, Option<TileKind>)> + '_ {
        let origin = self.coord.origin(self.side);
        self.tiles.iter().enumerate().map(move |(index, tile)| {
            let x = (index % self.side) as i32;
            let y = (index / self.side) as i32;
            (origin.offset(x, y), *tile)
        })
    }

    /// Returns the structures anchored in this chunk.
    #[inline]
    #[must_use]
    pub fn structures(&self) -> &[StructureInstance] {
        &self.structures
    }

    /// Removes the structure anchored at `anchor`, returning it.
    pub fn remove_structure(&mut self, anchor: WorldCell) -> Option<StructureInstance> {
        let position = self.structures.iter().position(|s| s.anchor == anchor)?;
        Some(self.structures.remove(position))
    }
}

/// Chunk generator: noise, classification, smoothing, structures, overlay.
pub struct ChunkGenerator {
    noise: NoiseField,
    classifier: TerrainClassifier,
    smoothing: SmoothingSettings,
    placer: StructurePlacer,
    side: usize,
}

impl ChunkGenerator {
    /// Creates a new chunk generator.
    #[must_use]
    pub fn new(
        noise: NoiseField,
        classifier: TerrainClassifier,
        smoothing: SmoothingSettings,
        placer: StructurePlacer,
        side: usize,
    ) -> Self {
        Self {
            noise,
            classifier,
            smoothing,
            placer,
            side,
        }
    }

    /// Returns the chunk side length in cells.
    #[inline]
    #[must_use]
    pub const fn side(&self) -> usize {
        self.side
    }

    /// Returns the structure placer (and through it, the catalog).
    #[inline]
    #[must_use]
    pub const fn placer(&self) -> &StructurePlacer {
        &self.placer
    }

    /// Classifies and smooths the baseline terrain of a chunk.
    ///
    /// This is a pure function of the seed, the coordinate and the terrain
    /// configuration.
    #[must_use]
    pub fn terrain(&self, coord: ChunkCoord) -> Vec<TerrainKind> {
        let origin = coord.origin(self.side);
        let mut terrain = Vec::with_capacity(self.side * self.side);

        for local_y in 0..self.side {
            for local_x in 0..self.side {
                let value = self
                    .noise
                    .sample(origin.x + local_x as i32, origin.y + local_y as i32);
                terrain.push(self.classifier.classify(value));
            }
        }

        smooth_water(&mut terrain, self.side, &self.smoothing);
        terrain
    }

    /// Generates the chunk at `coord`, reconciled with the overlay.
    ///
    /// Structures in the returned chunk are not yet registered with the
    /// overlay; the caller does that once the chunk is cached.
    #[must_use]
    pub fn generate(&self, coord: ChunkCoord, overlay: &MutationOverlay) -> Chunk {
        let terrain = self.terrain(coord);

        let mut chunk = Chunk::new(coord, self.side);
        chunk.structures = self.placer.place(coord, self.side, &terrain, overlay);

        // Pass 1: baseline terrain
        for (slot, kind) in chunk.tiles.iter_mut().zip(&terrain) {
            *slot = Some(kind.tile());
        }

        // Pass 2: durable removals, then the player's latest edits on top
        let origin = coord.origin(self.side);
        for (index, slot) in chunk.tiles.iter_mut().enumerate() {
            let cell = origin.offset((index % self.side) as i32, (index / self.side) as i32);
            if overlay.is_destroyed(cell) {
                *slot = None;
            }
            if let Some(edit) = overlay.tile_override(cell) {
                *slot = edit;
            }
        }

        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::{NoiseSettings, WorldSeed};
    use crate::structure::StructureCatalog;

    fn generator(seed: u64) -> ChunkGenerator {
        let seed = WorldSeed::new(seed);
        ChunkGenerator::new(
            NoiseField::new(seed, NoiseSettings::default()),
            TerrainClassifier::default(),
            SmoothingSettings::default(),
            StructurePlacer::new(seed, StructureCatalog::default(), 1),
            16,
        )
    }

    #[test]
    fn test_chunk_coord_from_cell() {
        let c = |x, y| ChunkCoord::from_cell(WorldCell::new(x, y), 16);
        assert_eq!(c(0, 0), ChunkCoord::new(0, 0));
        assert_eq!(c(15, 15), ChunkCoord::new(0, 0));
        assert_eq!(c(16, 16), ChunkCoord::new(1, 1));
        assert_eq!(c(-1, -1), ChunkCoord::new(-1, -1));
        assert_eq!(c(-16, -16), ChunkCoord::new(-1, -1));
        assert_eq!(c(-17, -17), ChunkCoord::new(-2, -2));
    }

    #[test]
    fn test_chunk_coord_from_world_pos() {
        assert_eq!(ChunkCoord::from_world_pos(16.0, 0.0, 16), ChunkCoord::new(1, 0));
        assert_eq!(ChunkCoord::from_world_pos(15.99, 0.0, 16), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_world_pos(-1.0, 0.0, 16), ChunkCoord::new(-1, 0));
        assert_eq!(ChunkCoord::from_world_pos(-0.01, -16.0, 16), ChunkCoord::new(-1, -1));
    }

    #[test]
    fn test_local_index() {
        let coord = ChunkCoord::new(-1, 2);
        assert_eq!(coord.origin(16), WorldCell::new(-16, 32));
        assert_eq!(coord.local_index(WorldCell::new(-16, 32), 16), Some(0));
        assert_eq!(coord.local_index(WorldCell::new(-1, 33), 16), Some(15 + 16));
        assert_eq!(coord.local_index(WorldCell::new(0, 33), 16), None);
    }

    #[test]
    fn test_chebyshev() {
        let a = ChunkCoord::new(0, 0);
        assert_eq!(a.chebyshev(ChunkCoord::new(1, 1)), 1);
        assert_eq!(a.chebyshev(ChunkCoord::new(-3, 2)), 3);
    }

    #[test]
    fn test_chunk_generation_determinism() {
        let overlay = MutationOverlay::new(16);
        let coord = ChunkCoord::new(5, -10);

        let chunk1 = generator(42).generate(coord, &overlay);
        let chunk2 = generator(42).generate(coord, &overlay);

        assert_eq!(chunk1, chunk2);
    }

    #[test]
    fn test_generated_chunk_is_fully_populated() {
        let chunk = generator(42).generate(ChunkCoord::new(0, 0), &MutationOverlay::new(16));
        assert_eq!(chunk.tiles().len(), 256);
        assert!(chunk.tiles().iter().all(Option::is_some));
    }

    #[test]
    fn test_overlay_applies_to_generation() {
        let mut overlay = MutationOverlay::new(16);
        let cleared = WorldCell::new(3, 4);
        let placed = WorldCell::new(5, 5);
        overlay.record_removed(cleared);
        overlay.record_placed(placed, TileKind(77));

        let chunk = generator(42).generate(ChunkCoord::new(0, 0), &overlay);
        assert_eq!(chunk.tile_at(cleared), None);
        assert_eq!(chunk.tile_at(placed), Some(TileKind(77)));
    }

    #[test]
    fn test_set_tile_reports_changes() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0), 4);
        let cell = WorldCell::new(1, 2);
        assert!(chunk.set_tile_at(cell, Some(TileKind(1))));
        assert!(!chunk.set_tile_at(cell, Some(TileKind(1))));
        assert!(!chunk.set_tile_at(WorldCell::new(9, 9), Some(TileKind(1))));
        assert_eq!(chunk.get_tile(1, 2), Some(TileKind(1)));
    }
}
