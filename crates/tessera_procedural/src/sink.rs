//! # Render Sink
//!
//! The boundary between the engine and whatever draws tiles. The engine only
//! ever pushes copies of its state through this trait.

use std::collections::HashMap;

use crate::chunk::WorldCell;
use crate::structure::TemplateId;
use crate::terrain::TileKind;

/// Tile layer a tile is drawn on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileLayer {
    /// Terrain and player-placed tiles.
    Ground,
    /// Structure tiles, drawn above the ground.
    Structure,
}

/// Opaque handle to a spawned structure visual.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VisualHandle(pub u64);

/// Receiver of tile and structure updates.
pub trait RenderSink {
    /// Sets (or clears, with `None`) the tile at `cell` on `layer`.
    fn set_tile(&mut self, layer: TileLayer, cell: WorldCell, tile: Option<TileKind>);

    /// Spawns the visual for a structure anchored at `anchor`.
    fn spawn_structure_visual(&mut self, anchor: WorldCell, template: TemplateId) -> VisualHandle;

    /// Despawns a visual previously returned by `spawn_structure_visual`.
    fn despawn_structure_visual(&mut self, handle: VisualHandle);
}

/// A sink that keeps what it is told in memory.
///
/// Used by the headless driver and by tests to observe exactly what a real
/// renderer would have drawn.
#[derive(Debug, Default)]
pub struct RecordingSink {
    ground: HashMap<WorldCell, TileKind>,
    structure: HashMap<WorldCell, TileKind>,
    visuals: HashMap<VisualHandle, (WorldCell, TemplateId)>,
    next_handle: u64,
    /// Total `set_tile` calls.
    pub tile_writes: u64,
    /// Total spawns.
    pub spawns: u64,
    /// Total despawns.
    pub despawns: u64,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the drawn tile at `cell` on `layer`.
    #[must_use]
    pub fn tile(&self, layer: TileLayer, cell: WorldCell) -> Option<TileKind> {
        match layer {
            TileLayer::Ground => self.ground.get(&cell).copied(),
            TileLayer::Structure => self.structure.get(&cell).copied(),
        }
    }

    /// Number of drawn tiles on `layer`.
    #[must_use]
    pub fn tile_count(&self, layer: TileLayer) -> usize {
        match layer {
            TileLayer::Ground => self.ground.len(),
            TileLayer::Structure => self.structure.len(),
        }
    }

    /// Number of live structure visuals.
    #[must_use]
    pub fn visual_count(&self) -> usize {
        self.visuals.len()
    }

    /// Returns true if a live visual is anchored at `anchor`.
    #[must_use]
    pub fn has_visual_at(&self, anchor: WorldCell) -> bool {
        self.visuals.values().any(|(a, _)| *a == anchor)
    }
}

impl RenderSink for RecordingSink {
    fn set_tile(&mut self, layer: TileLayer, cell: WorldCell, tile: Option<TileKind>) {
        self.tile_writes += 1;
        let map = match layer {
            TileLayer::Ground => &mut self.ground,
            TileLayer::Structure => &mut self.structure,
        };
        match tile {
            Some(tile) => {
                map.insert(cell, tile);
            }
            None => {
                map.remove(&cell);
            }
        }
    }

    fn spawn_structure_visual(&mut self, anchor: WorldCell, template: TemplateId) -> VisualHandle {
        self.spawns += 1;
        let handle = VisualHandle(self.next_handle);
        self.next_handle += 1;
        self.visuals.insert(handle, (anchor, template));
        handle
    }

    fn despawn_structure_visual(&mut self, handle: VisualHandle) {
        if self.visuals.remove(&handle).is_some() {
            self.despawns += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_are_independent() {
        let mut sink = RecordingSink::new();
        let cell = WorldCell::new(1, 1);
        sink.set_tile(TileLayer::Ground, cell, Some(TileKind(3)));
        sink.set_tile(TileLayer::Structure, cell, Some(TileKind(100)));
        sink.set_tile(TileLayer::Ground, cell, None);

        assert_eq!(sink.tile(TileLayer::Ground, cell), None);
        assert_eq!(sink.tile(TileLayer::Structure, cell), Some(TileKind(100)));
        assert_eq!(sink.tile_writes, 3);
    }

    #[test]
    fn test_visual_handles_are_unique() {
        let mut sink = RecordingSink::new();
        let a = sink.spawn_structure_visual(WorldCell::new(0, 0), TemplateId(0));
        let b = sink.spawn_structure_visual(WorldCell::new(5, 0), TemplateId(1));
        assert_ne!(a, b);

        sink.despawn_structure_visual(a);
        sink.despawn_structure_visual(a);
        assert_eq!(sink.visual_count(), 1);
        assert_eq!(sink.despawns, 1);
        assert!(sink.has_visual_at(WorldCell::new(5, 0)));
    }
}
