//! # Mutation Overlay
//!
//! Every deviation the player has made from the generated baseline.
//!
//! | Table          | Key      | Persisted | Purpose                              |
//! |----------------|----------|-----------|--------------------------------------|
//! | `destroyed`    | cell     | yes       | cells that must stay cleared         |
//! | `structures`   | anchor   | yes       | structure registry                   |
//! | `occupancy`    | cell     | derived   | cell -> owning anchor, O(1) removal  |
//! | `by_chunk`     | chunk    | derived   | anchors per chunk, for adoption      |
//! | `overrides`    | cell     | no        | last place/remove per edited cell    |
//!
//! Entries are only ever added or superseded, never forgotten: the destroyed
//! set grows monotonically for the lifetime of the world.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::chunk::{ChunkCoord, WorldCell};
use crate::error::{WorldError, WorldResult};
use crate::persistence::STRUCTURES_KEY;
use crate::structure::StructureInstance;
use crate::terrain::TileKind;

/// Outcome of a removal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Removal {
    /// The structure torn down, if the cell belonged to one.
    pub structure: Option<StructureInstance>,
    /// Ground cells whose override changed to empty.
    pub cleared: Vec<WorldCell>,
    /// Cells newly added to the destroyed set.
    pub newly_destroyed: usize,
}

impl Removal {
    /// Returns true if the removal changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.structure.is_none() && self.cleared.is_empty() && self.newly_destroyed == 0
    }
}

/// Player mutations layered over procedural generation.
#[derive(Clone, Debug, Default)]
pub struct MutationOverlay {
    side: usize,
    destroyed: HashSet<WorldCell>,
    structures: BTreeMap<WorldCell, StructureInstance>,
    occupancy: HashMap<WorldCell, WorldCell>,
    by_chunk: HashMap<ChunkCoord, BTreeSet<WorldCell>>,
    overrides: HashMap<WorldCell, Option<TileKind>>,
}

impl MutationOverlay {
    /// Creates an empty overlay for chunks of side `side`.
    #[must_use]
    pub fn new(side: usize) -> Self {
        Self {
            side,
            ..Self::default()
        }
    }

    /// Returns true if `cell` was explicitly removed at some point.
    #[inline]
    #[must_use]
    pub fn is_destroyed(&self, cell: WorldCell) -> bool {
        self.destroyed.contains(&cell)
    }

    /// Returns the destroyed cells in ascending order.
    #[must_use]
    pub fn destroyed_cells(&self) -> Vec<WorldCell> {
        let mut cells: Vec<WorldCell> = self.destroyed.iter().copied().collect();
        cells.sort_unstable();
        cells
    }

    /// Number of destroyed cells.
    #[must_use]
    pub fn destroyed_len(&self) -> usize {
        self.destroyed.len()
    }

    /// Returns true if a registered structure occupies `cell`.
    #[inline]
    #[must_use]
    pub fn is_occupied(&self, cell: WorldCell) -> bool {
        self.occupancy.contains_key(&cell)
    }

    /// Returns the structure occupying `cell`.
    #[must_use]
    pub fn structure_at(&self, cell: WorldCell) -> Option<&StructureInstance> {
        self.occupancy
            .get(&cell)
            .and_then(|anchor| self.structures.get(anchor))
    }

    /// Iterates registered structures in anchor order.
    pub fn structures(&self) -> impl Iterator<Item = &StructureInstance> {
        self.structures.values()
    }

    /// Number of registered structures.
    #[must_use]
    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    /// Iterates structures anchored in `coord`, in anchor order.
    pub fn structures_in_chunk(&self, coord: ChunkCoord) -> impl Iterator<Item = &StructureInstance> {
        self.by_chunk
            .get(&coord)
            .into_iter()
            .flatten()
            .filter_map(|anchor| self.structures.get(anchor))
    }

    /// Returns the buffered edit for `cell`.
    ///
    /// `None` means the cell was never edited; `Some(None)` means its last
    /// edit cleared it.
    #[inline]
    #[must_use]
    pub fn tile_override(&self, cell: WorldCell) -> Option<Option<TileKind>> {
        self.overrides.get(&cell).copied()
    }

    /// Number of buffered edits.
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Registers a structure instance.
    ///
    /// Returns false without changing anything if the anchor is already
    /// registered or any of its cells is occupied by another structure.
    pub fn register(&mut self, instance: StructureInstance) -> bool {
        if self.structures.contains_key(&instance.anchor)
            || instance.cells().iter().any(|cell| self.occupancy.contains_key(cell))
        {
            return false;
        }

        for cell in instance.cells() {
            self.occupancy.insert(*cell, instance.anchor);
        }
        self.by_chunk
            .entry(ChunkCoord::from_cell(instance.anchor, self.side))
            .or_default()
            .insert(instance.anchor);
        self.structures.insert(instance.anchor, instance);
        true
    }

    /// Records a tile placed at `cell`.
    ///
    /// Returns true if the buffered edit changed. The destroyed set is left
    /// alone: generation clears the cell and this override puts the tile back.
    pub fn record_placed(&mut self, cell: WorldCell, tile: TileKind) -> bool {
        self.overrides.insert(cell, Some(tile)) != Some(Some(tile))
    }

    /// Records a removal at `cell`.
    ///
    /// If `cell` belongs to a registered structure, the whole structure is
    /// unregistered and every cell of its footprint is destroyed and cleared.
    /// Otherwise only `cell` is.
    pub fn record_removed(&mut self, cell: WorldCell) -> Removal {
        let structure = self.unregister(cell);
        let footprint = match &structure {
            Some(instance) => instance.cells().to_vec(),
            None => vec![cell],
        };

        let mut removal = Removal {
            structure,
            ..Removal::default()
        };
        for cell in footprint {
            if self.overrides.insert(cell, None) != Some(None) {
                removal.cleared.push(cell);
            }
            if self.destroyed.insert(cell) {
                removal.newly_destroyed += 1;
            }
        }
        removal
    }

    /// Removes the structure occupying `cell` from every index.
    fn unregister(&mut self, cell: WorldCell) -> Option<StructureInstance> {
        let anchor = *self.occupancy.get(&cell)?;
        let instance = self.structures.remove(&anchor)?;
        for occupied in instance.cells() {
            self.occupancy.remove(occupied);
        }
        let coord = ChunkCoord::from_cell(anchor, self.side);
        if let Some(anchors) = self.by_chunk.get_mut(&coord) {
            anchors.remove(&anchor);
            if anchors.is_empty() {
                self.by_chunk.remove(&coord);
            }
        }
        Some(instance)
    }

    /// Restores persisted state into this overlay.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::CorruptPersistence`] if two restored structures
    /// share an anchor or overlap.
    pub fn restore(
        &mut self,
        destroyed: impl IntoIterator<Item = WorldCell>,
        structures: Vec<StructureInstance>,
    ) -> WorldResult<()> {
        self.destroyed.extend(destroyed);
        for instance in structures {
            let anchor = instance.anchor;
            if !self.register(instance) {
                return Err(WorldError::corrupt(
                    STRUCTURES_KEY,
                    format!("restored structure at {:?} overlaps another", anchor.triple()),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{StructureCell, StructureTemplate, TemplateId};

    fn tree() -> StructureTemplate {
        StructureTemplate {
            name: "tree".to_string(),
            probability: 0.1,
            cells: vec![StructureCell::new(0, 0, 100), StructureCell::new(0, 1, 101)],
        }
    }

    fn tree_at(x: i32, y: i32) -> StructureInstance {
        StructureInstance::new(WorldCell::new(x, y), TemplateId(0), &tree())
    }

    #[test]
    fn test_register_rejects_overlap() {
        let mut overlay = MutationOverlay::new(16);
        assert!(overlay.register(tree_at(2, 2)));
        assert!(!overlay.register(tree_at(2, 2)));
        assert!(!overlay.register(tree_at(2, 1)));
        assert!(overlay.register(tree_at(3, 2)));
        assert_eq!(overlay.structure_count(), 2);
        assert_eq!(overlay.structure_at(WorldCell::new(2, 3)).unwrap().anchor, WorldCell::new(2, 2));
    }

    #[test]
    fn test_removing_any_structure_cell_removes_structure() {
        let mut overlay = MutationOverlay::new(16);
        overlay.register(tree_at(2, 2));

        let removal = overlay.record_removed(WorldCell::new(2, 3));
        assert_eq!(removal.structure.unwrap().anchor, WorldCell::new(2, 2));
        assert_eq!(removal.newly_destroyed, 2);
        assert_eq!(removal.cleared.len(), 2);
        assert!(overlay.is_destroyed(WorldCell::new(2, 2)));
        assert!(overlay.is_destroyed(WorldCell::new(2, 3)));
        assert!(!overlay.is_occupied(WorldCell::new(2, 2)));
        assert_eq!(overlay.structures_in_chunk(ChunkCoord::new(0, 0)).count(), 0);
        assert_eq!(overlay.tile_override(WorldCell::new(2, 2)), Some(None));
    }

    #[test]
    fn test_removal_is_idempotent() {
        let mut overlay = MutationOverlay::new(16);
        let cell = WorldCell::new(-5, 9);
        let first = overlay.record_removed(cell);
        assert_eq!(first.newly_destroyed, 1);
        assert!(overlay.record_removed(cell).is_noop());
        assert_eq!(overlay.destroyed_len(), 1);
    }

    #[test]
    fn test_placement_overrides_without_undestroying() {
        let mut overlay = MutationOverlay::new(16);
        let cell = WorldCell::new(1, 1);
        overlay.record_removed(cell);

        assert!(overlay.record_placed(cell, TileKind(9)));
        assert!(!overlay.record_placed(cell, TileKind(9)));
        assert!(overlay.is_destroyed(cell));
        assert_eq!(overlay.tile_override(cell), Some(Some(TileKind(9))));
        assert_eq!(overlay.tile_override(WorldCell::new(0, 0)), None);
    }

    #[test]
    fn test_structures_in_chunk_uses_anchor_chunk() {
        let mut overlay = MutationOverlay::new(16);
        overlay.register(tree_at(-1, 15));
        overlay.register(tree_at(0, 0));
        assert_eq!(overlay.structures_in_chunk(ChunkCoord::new(-1, 0)).count(), 1);
        assert_eq!(overlay.structures_in_chunk(ChunkCoord::new(0, 0)).count(), 1);
        assert_eq!(overlay.structures_in_chunk(ChunkCoord::new(5, 5)).count(), 0);
    }

    #[test]
    fn test_restore_rejects_overlapping_structures() {
        let mut overlay = MutationOverlay::new(16);
        let err = overlay
            .restore(Vec::new(), vec![tree_at(4, 4), tree_at(4, 5)])
            .unwrap_err();
        assert!(matches!(err, WorldError::CorruptPersistence { .. }));
    }

    #[test]
    fn test_destroyed_cells_sorted() {
        let mut overlay = MutationOverlay::new(16);
        overlay
            .restore([WorldCell::new(3, 4), WorldCell::new(-2, 7)], Vec::new())
            .unwrap();
        assert_eq!(
            overlay.destroyed_cells(),
            vec![WorldCell::new(-2, 7), WorldCell::new(3, 4)]
        );
    }
}
