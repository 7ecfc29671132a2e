//! # Structures
//!
//! Multi-tile features (trees, boulders, huts) scattered onto grass.
//!
//! ## Placement Rules
//!
//! 1. Candidate anchors are visited in row-major order.
//! 2. Every cell consumes exactly one draw from a ChaCha8 stream seeded by
//!    `(world seed, chunk coordinate)`, eligible or not. The draw that
//!    belongs to a cell therefore never depends on what was placed, removed
//!    or restored elsewhere.
//! 3. Templates are tried in catalog order; the first one that fits wins.
//! 4. A structure must fit entirely inside its chunk, on grass, on cells that
//!    are neither occupied nor destroyed, and at least `spacing + 1` cells
//!    away from other structures and destroyed cells of the same chunk.
//!
//! Rule 4 keeps every chunk's placement independent of its neighbors. Since
//! removed structures leave destroyed cells behind, whatever blocked a
//! placement once keeps blocking it: regenerating a chunk never grows a
//! structure that was not there the first time.

use std::collections::HashSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkCoord, WorldCell};
use crate::error::{WorldError, WorldResult};
use crate::noise::WorldSeed;
use crate::overlay::MutationOverlay;
use crate::terrain::{TerrainKind, TileKind};

/// Index of a template in catalog order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub u32);

impl TemplateId {
    /// Returns the catalog index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One cell of a structure template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureCell {
    /// Offset from the anchor, `[dx, dy]`.
    pub offset: [i32; 2],
    /// Tile drawn on the structure layer.
    pub tile: TileKind,
}

impl StructureCell {
    /// Creates a template cell.
    #[must_use]
    pub const fn new(dx: i32, dy: i32, tile: u16) -> Self {
        Self {
            offset: [dx, dy],
            tile: TileKind(tile),
        }
    }
}

/// A structure shape plus its spawn probability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureTemplate {
    /// Stable human-readable name.
    pub name: String,
    /// Chance in [0, 1) that an eligible anchor tries this template.
    pub probability: f64,
    /// Cells relative to the anchor, in draw order.
    pub cells: Vec<StructureCell>,
}

impl StructureTemplate {
    /// Checks the template on its own.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty shape, a duplicated offset
    /// or a probability outside [0, 1).
    pub fn validate(&self) -> WorldResult<()> {
        if self.cells.is_empty() {
            return Err(WorldError::EmptyTemplate(self.name.clone()));
        }
        if !(0.0..1.0).contains(&self.probability) {
            return Err(WorldError::InvalidProbability {
                name: self.name.clone(),
                probability: self.probability,
            });
        }
        let mut seen = HashSet::with_capacity(self.cells.len());
        for cell in &self.cells {
            if !seen.insert(cell.offset) {
                return Err(WorldError::InvalidConfig(format!(
                    "structure template `{}` repeats offset {:?}",
                    self.name, cell.offset
                )));
            }
        }
        Ok(())
    }
}

/// Read-only set of templates.
#[derive(Clone, Debug, PartialEq)]
pub struct StructureCatalog {
    templates: Vec<StructureTemplate>,
}

impl StructureCatalog {
    /// Builds a validated catalog.
    ///
    /// # Errors
    ///
    /// Returns the first template validation error.
    pub fn new(templates: Vec<StructureTemplate>) -> WorldResult<Self> {
        for template in &templates {
            template.validate()?;
        }
        Ok(Self { templates })
    }

    /// Returns the template for `id`.
    #[must_use]
    pub fn get(&self, id: TemplateId) -> Option<&StructureTemplate> {
        self.templates.get(id.index())
    }

    /// Iterates templates in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (TemplateId, &StructureTemplate)> {
        self.templates
            .iter()
            .enumerate()
            .map(|(index, template)| (TemplateId(index as u32), template))
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Consumes the catalog, returning its templates.
    #[must_use]
    pub fn into_templates(self) -> Vec<StructureTemplate> {
        self.templates
    }
}

impl Default for StructureCatalog {
    fn default() -> Self {
        Self {
            templates: vec![
                StructureTemplate {
                    name: "hut".to_string(),
                    probability: 0.004,
                    cells: vec![
                        StructureCell::new(0, 0, 120),
                        StructureCell::new(1, 0, 121),
                        StructureCell::new(0, 1, 122),
                        StructureCell::new(1, 1, 123),
                    ],
                },
                StructureTemplate {
                    name: "tree".to_string(),
                    probability: 0.03,
                    cells: vec![StructureCell::new(0, 0, 100), StructureCell::new(0, 1, 101)],
                },
                StructureTemplate {
                    name: "boulder".to_string(),
                    probability: 0.05,
                    cells: vec![StructureCell::new(0, 0, 110)],
                },
            ],
        }
    }
}

/// A placed structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructureInstance {
    /// Reference cell the template is placed relative to.
    pub anchor: WorldCell,
    /// Template used.
    pub template: TemplateId,
    cells: Vec<WorldCell>,
}

impl StructureInstance {
    /// Places `template` at `anchor`.
    ///
    /// The occupied set is the anchor shifted by every template offset, in
    /// template order, followed by the anchor itself when no offset is
    /// `[0, 0]`. An anchor always belongs to its structure.
    #[must_use]
    pub fn new(anchor: WorldCell, id: TemplateId, template: &StructureTemplate) -> Self {
        let mut cells: Vec<WorldCell> = template
            .cells
            .iter()
            .map(|c| anchor.offset(c.offset[0], c.offset[1]))
            .collect();
        if !cells.contains(&anchor) {
            cells.push(anchor);
        }
        Self {
            anchor,
            template: id,
            cells,
        }
    }

    /// Returns the absolute occupied cells.
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[WorldCell] {
        &self.cells
    }

    /// Returns `(cell, tile)` pairs for the structure layer.
    pub fn tiles<'a>(
        &'a self,
        template: &'a StructureTemplate,
    ) -> impl Iterator<Item = (WorldCell, TileKind)> + 'a {
        self.cells.iter().copied().zip(template.cells.iter().map(|c| c.tile))
    }
}

/// Scatters structures onto freshly generated chunks.
pub struct StructurePlacer {
    seed: WorldSeed,
    catalog: StructureCatalog,
    spacing: u32,
}

impl StructurePlacer {
    /// Seed purpose for the placement stream.
    const PLACEMENT_STREAM: u64 = 0x5354_5255_4354;

    /// Creates a placer.
    ///
    /// `spacing` is the empty margin (in cells) kept around structures of
    /// the same chunk.
    #[must_use]
    pub fn new(seed: WorldSeed, catalog: StructureCatalog, spacing: u32) -> Self {
        Self {
            seed,
            catalog,
            spacing,
        }
    }

    /// Returns the catalog.
    #[inline]
    #[must_use]
    pub const fn catalog(&self) -> &StructureCatalog {
        &self.catalog
    }

    /// Seed of the draw stream for one chunk.
    fn chunk_seed(&self, coord: ChunkCoord) -> u64 {
        let key = (u64::from(coord.x as u32) << 32) | u64::from(coord.y as u32);
        self.seed.derive(Self::PLACEMENT_STREAM).derive(key).value()
    }

    /// Places structures for the chunk at `coord`.
    ///
    /// `terrain` is the chunk's classified terrain in row-major order.
    /// Instances restored from the overlay whose anchor lies in this chunk
    /// are adopted first and returned alongside the newly placed ones.
    #[must_use]
    pub fn place(
        &self,
        coord: ChunkCoord,
        side: usize,
        terrain: &[TerrainKind],
        overlay: &MutationOverlay,
    ) -> Vec<StructureInstance> {
        let mut state = PlacementState {
            coord,
            side,
            terrain,
            overlay,
            occupied: vec![false; side * side],
            // Clipped to the chunk, so anything wider behaves like a full side
            spacing: i32::try_from(self.spacing).map_or(side as i32, |s| s.min(side as i32)),
        };
        let mut placed: Vec<StructureInstance> = Vec::new();

        for restored in overlay.structures_in_chunk(coord) {
            state.occupy(restored);
            placed.push(restored.clone());
        }

        let origin = coord.origin(side);
        let mut rng = ChaCha8Rng::seed_from_u64(self.chunk_seed(coord));

        for local_y in 0..side {
            for local_x in 0..side {
                let roll: f64 = rng.gen();
                let anchor = origin.offset(local_x as i32, local_y as i32);
                if !state.is_free(anchor) {
                    continue;
                }

                for (id, template) in self.catalog.iter() {
                    if roll >= template.probability {
                        continue;
                    }
                    let candidate = StructureInstance::new(anchor, id, template);
                    if candidate.cells().iter().all(|&cell| state.is_free(cell)) {
                        state.occupy(&candidate);
                        placed.push(candidate);
                        break;
                    }
                }
            }
        }

        placed
    }
}

/// Working state of one placement pass.
struct PlacementState<'a> {
    coord: ChunkCoord,
    side: usize,
    terrain: &'a [TerrainKind],
    overlay: &'a MutationOverlay,
    occupied: Vec<bool>,
    spacing: i32,
}

impl PlacementState<'_> {
    fn occupy(&mut self, instance: &StructureInstance) {
        for cell in instance.cells() {
            if let Some(index) = self.coord.local_index(*cell, self.side) {
                self.occupied[index] = true;
            }
        }
    }

    /// True if `cell` is inside the chunk, grass, not destroyed, not occupied
    /// (locally or in the overlay) and clear of the spacing margin around
    /// occupied and destroyed cells.
    fn is_free(&self, cell: WorldCell) -> bool {
        let Some(index) = self.coord.local_index(cell, self.side) else {
            return false;
        };
        if self.terrain[index] != TerrainKind::Grass
            || self.occupied[index]
            || self.overlay.is_destroyed(cell)
            || self.overlay.is_occupied(cell)
        {
            return false;
        }

        for dy in -self.spacing..=self.spacing {
            for dx in -self.spacing..=self.spacing {
                let near_cell = cell.offset(dx, dy);
                if let Some(near) = self.coord.local_index(near_cell, self.side) {
                    if self.occupied[near] || self.overlay.is_destroyed(near_cell) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_grass(side: usize) -> Vec<TerrainKind> {
        vec![TerrainKind::Grass; side * side]
    }

    fn catalog(probability: f64) -> StructureCatalog {
        StructureCatalog::new(vec![StructureTemplate {
            name: "square".to_string(),
            probability,
            cells: vec![
                StructureCell::new(0, 0, 1),
                StructureCell::new(1, 0, 1),
                StructureCell::new(0, 1, 1),
                StructureCell::new(1, 1, 1),
            ],
        }])
        .unwrap()
    }

    fn assert_disjoint(instances: &[StructureInstance]) {
        let mut seen = HashSet::new();
        for instance in instances {
            for cell in instance.cells() {
                assert!(seen.insert(*cell), "cell {cell:?} occupied twice");
            }
        }
    }

    #[test]
    fn test_placement_is_deterministic() {
        let placer = StructurePlacer::new(WorldSeed::new(42), catalog(0.3), 0);
        let overlay = MutationOverlay::new(16);
        let coord = ChunkCoord::new(3, -2);

        let first = placer.place(coord, 16, &all_grass(16), &overlay);
        let second = placer.place(coord, 16, &all_grass(16), &overlay);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_overlap_and_inside_chunk() {
        let placer = StructurePlacer::new(WorldSeed::new(7), catalog(0.9), 0);
        let overlay = MutationOverlay::new(16);
        let coord = ChunkCoord::new(-1, 0);

        let placed = placer.place(coord, 16, &all_grass(16), &overlay);
        assert!(placed.len() > 10);
        assert_disjoint(&placed);
        for instance in &placed {
            assert!(instance.cells().iter().all(|c| coord.contains(*c, 16)));
        }
    }

    #[test]
    fn test_spacing_keeps_a_margin() {
        let placer = StructurePlacer::new(WorldSeed::new(7), catalog(0.9), 1);
        let placed = placer.place(ChunkCoord::new(0, 0), 16, &all_grass(16), &MutationOverlay::new(16));

        let cells: Vec<Vec<WorldCell>> = placed.iter().map(|s| s.cells().to_vec()).collect();
        for (i, a) in cells.iter().enumerate() {
            for b in cells.iter().skip(i + 1) {
                for ca in a {
                    for cb in b {
                        assert!(
                            (ca.x - cb.x).abs() > 1 || (ca.y - cb.y).abs() > 1,
                            "structures touch at {ca:?} / {cb:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_oversized_spacing_leaves_one_structure() {
        let single = StructureCatalog::new(vec![StructureTemplate {
            name: "stone".to_string(),
            probability: 0.9,
            cells: vec![StructureCell::new(0, 0, 1)],
        }])
        .unwrap();
        let coord = ChunkCoord::new(0, 0);

        for spacing in [16, 1_000_000, u32::MAX] {
            let placer = StructurePlacer::new(WorldSeed::new(3), single.clone(), spacing);
            let placed = placer.place(coord, 16, &all_grass(16), &MutationOverlay::new(16));
            assert_eq!(placed.len(), 1, "spacing {spacing} packed the chunk");
        }
    }

    #[test]
    fn test_only_grass_is_eligible() {
        let placer = StructurePlacer::new(WorldSeed::new(1), catalog(0.99), 0);
        let sand = vec![TerrainKind::Sand; 256];
        assert!(placer.place(ChunkCoord::new(0, 0), 16, &sand, &MutationOverlay::new(16)).is_empty());
    }

    #[test]
    fn test_destroyed_cells_block_placement_without_shifting_others() {
        let placer = StructurePlacer::new(WorldSeed::new(11), catalog(0.2), 0);
        let coord = ChunkCoord::new(0, 0);
        let clean = placer.place(coord, 16, &all_grass(16), &MutationOverlay::new(16));
        assert!(clean.len() >= 2);

        let victim = clean[0].clone();
        let mut overlay = MutationOverlay::new(16);
        overlay.restore(victim.cells().iter().copied(), Vec::new()).unwrap();

        let replaced = placer.place(coord, 16, &all_grass(16), &overlay);
        for instance in &replaced {
            assert!(instance.cells().iter().all(|c| !victim.cells().contains(c)));
        }
        // Placements that never touched the removed footprint are unchanged.
        let untouched = clean.iter().skip(1).filter(|s| replaced.contains(s)).count();
        assert!(untouched >= 1);
    }

    #[test]
    fn test_restored_instances_are_adopted() {
        let placer = StructurePlacer::new(WorldSeed::new(5), catalog(0.0), 0);
        let template = placer.catalog().get(TemplateId(0)).unwrap().clone();
        let restored = StructureInstance::new(WorldCell::new(4, 4), TemplateId(0), &template);

        let mut overlay = MutationOverlay::new(16);
        overlay.restore(Vec::new(), vec![restored.clone()]).unwrap();

        let placed = placer.place(ChunkCoord::new(0, 0), 16, &all_grass(16), &overlay);
        assert_eq!(placed, vec![restored]);
    }

    #[test]
    fn test_anchor_always_occupied() {
        let template = StructureTemplate {
            name: "offset".to_string(),
            probability: 0.5,
            cells: vec![StructureCell::new(1, 0, 9)],
        };
        let instance = StructureInstance::new(WorldCell::new(2, 2), TemplateId(0), &template);
        assert_eq!(instance.cells(), &[WorldCell::new(3, 2), WorldCell::new(2, 2)]);
        assert_eq!(instance.tiles(&template).count(), 1);
    }

    #[test]
    fn test_template_validation() {
        let mut template = StructureTemplate {
            name: "bad".to_string(),
            probability: 1.0,
            cells: vec![StructureCell::new(0, 0, 1)],
        };
        assert!(matches!(template.validate(), Err(WorldError::InvalidProbability { .. })));

        template.probability = 0.5;
        template.cells.push(StructureCell::new(0, 0, 2));
        assert!(matches!(template.validate(), Err(WorldError::InvalidConfig(_))));

        template.cells.clear();
        assert!(matches!(template.validate(), Err(WorldError::EmptyTemplate(_))));
    }
}
