//! # Streaming Controller
//!
//! Decides which chunks must be attached to the render sink as the viewer
//! moves.
//!
//! ## Algorithm
//!
//! 1. Each tick, compute the viewer's chunk.
//! 2. If it has not changed since the last tick, do nothing.
//! 3. Otherwise compute the `(2r + 1)²` neighborhood (Chebyshev radius `r`).
//! 4. Load every neighborhood chunk not yet loaded, unload every loaded chunk
//!    outside it. Both lists are in lexicographic coordinate order.

use std::collections::BTreeSet;

use crate::chunk::ChunkCoord;

/// Chunks to attach and detach after a viewer chunk change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamingPlan {
    /// Chunks entering the neighborhood.
    pub load: Vec<ChunkCoord>,
    /// Chunks leaving the neighborhood.
    pub unload: Vec<ChunkCoord>,
}

/// Result of one world tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The viewer's chunk.
    pub viewer_chunk: ChunkCoord,
    /// Chunks attached this tick.
    pub loaded: Vec<ChunkCoord>,
    /// Chunks detached this tick.
    pub unloaded: Vec<ChunkCoord>,
    /// Chunks built by the generator this tick.
    pub generated: usize,
}

impl TickReport {
    /// Returns true if nothing was attached or detached.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.loaded.is_empty() && self.unloaded.is_empty()
    }
}

/// Returns the neighborhood of `center` in lexicographic order.
#[must_use]
pub fn neighborhood(center: ChunkCoord, radius: u32) -> Vec<ChunkCoord> {
    let r = radius as i32;
    let mut coords = Vec::with_capacity((2 * radius as usize + 1).pow(2));
    for x in center.x - r..=center.x + r {
        for y in center.y - r..=center.y + r {
            coords.push(ChunkCoord::new(x, y));
        }
    }
    coords
}

/// Tracks the viewer chunk and the set of attached chunks.
#[derive(Clone, Debug)]
pub struct StreamingController {
    radius: u32,
    current: Option<ChunkCoord>,
    loaded: BTreeSet<ChunkCoord>,
}

impl StreamingController {
    /// Creates a controller with Chebyshev radius `radius`.
    #[must_use]
    pub fn new(radius: u32) -> Self {
        Self {
            radius,
            current: None,
            loaded: BTreeSet::new(),
        }
    }

    /// Returns the viewer chunk of the last plan.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> Option<ChunkCoord> {
        self.current
    }

    /// Returns true if `coord` is attached.
    #[must_use]
    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.loaded.contains(&coord)
    }

    /// Iterates attached chunks in lexicographic order.
    pub fn loaded(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.loaded.iter().copied()
    }

    /// Plans the transition to `viewer`.
    ///
    /// Returns `None` when the viewer chunk is unchanged.
    pub fn plan(&mut self, viewer: ChunkCoord) -> Option<StreamingPlan> {
        if self.current == Some(viewer) {
            return None;
        }
        self.current = Some(viewer);

        Some(StreamingPlan {
            load: neighborhood(viewer, self.radius)
                .into_iter()
                .filter(|coord| !self.loaded.contains(coord))
                .collect(),
            unload: self
                .loaded
                .iter()
                .copied()
                .filter(|coord| coord.chebyshev(viewer) > self.radius)
                .collect(),
        })
    }

    /// Records that `coord` is attached.
    pub fn mark_loaded(&mut self, coord: ChunkCoord) {
        self.loaded.insert(coord);
    }

    /// Records that `coord` is detached.
    pub fn mark_unloaded(&mut self, coord: ChunkCoord) {
        self.loaded.remove(&coord);
    }
}
