//! # Chunk Store
//!
//! Authoritative cache of generated chunk payloads, keyed by coordinate.
//!
//! The store never talks to the render sink: what is cached and what is on
//! screen are tracked separately, so a chunk can stay cached after it has
//! been detached from the sink.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkCoord};

/// What happens to a payload when its chunk leaves the neighborhood.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep the payload for revisits.
    #[default]
    Retain,
    /// Discard the payload; a revisit regenerates it from the overlay.
    Drop,
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Chunks built by the generator.
    pub generated: u64,
    /// Lookups served from the cache.
    pub cache_hits: u64,
    /// Payloads discarded.
    pub evicted: u64,
}

/// Cache of generated chunks.
#[derive(Debug, Default)]
pub struct ChunkStore {
    chunks: HashMap<ChunkCoord, Chunk>,
    policy: RetentionPolicy,
    stats: StoreStats,
}

impl ChunkStore {
    /// Creates an empty store with the given retention policy.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            chunks: HashMap::new(),
            policy,
            stats: StoreStats::default(),
        }
    }

    /// Returns the cached chunk at `coord`, generating it with `generate`
    /// on a miss.
    ///
    /// Lookup and insertion are a single step. The flag is true when the
    /// chunk was freshly generated.
    pub fn get_or_generate<F>(&mut self, coord: ChunkCoord, generate: F) -> (&mut Chunk, bool)
    where
        F: FnOnce() -> Chunk,
    {
        match self.chunks.entry(coord) {
            Entry::Occupied(entry) => {
                self.stats.cache_hits += 1;
                (entry.into_mut(), false)
            }
            Entry::Vacant(entry) => {
                self.stats.generated += 1;
                (entry.insert(generate()), true)
            }
        }
    }

    /// Returns the cached chunk at `coord`.
    #[must_use]
    pub fn get(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    /// Returns the cached chunk at `coord` for in-place edits.
    pub fn get_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        self.chunks.get_mut(&coord)
    }

    /// Returns true if `coord` is cached.
    #[must_use]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Applies the retention policy to a chunk that just left the
    /// neighborhood. Returns true if the payload was discarded.
    pub fn release(&mut self, coord: ChunkCoord) -> bool {
        match self.policy {
            RetentionPolicy::Retain => false,
            RetentionPolicy::Drop => self.evict(coord).is_some(),
        }
    }

    /// Removes the payload at `coord` regardless of policy.
    pub fn evict(&mut self, coord: ChunkCoord) -> Option<Chunk> {
        let chunk = self.chunks.remove(&coord)?;
        self.stats.evicted += 1;
        Some(chunk)
    }

    /// Number of cached chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Returns the cache counters.
    #[must_use]
    pub const fn stats(&self) -> StoreStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_once_per_residency() {
        let mut store = ChunkStore::default();
        let coord = ChunkCoord::new(1, -1);
        let mut calls = 0;

        let (_, fresh) = store.get_or_generate(coord, || {
            calls += 1;
            Chunk::new(coord, 4)
        });
        assert!(fresh);
        let (chunk, fresh) = store.get_or_generate(coord, || unreachable!("cached"));
        assert!(!fresh);
        assert_eq!(chunk.coord, coord);

        assert_eq!(calls, 1);
        assert_eq!(store.stats().generated, 1);
        assert_eq!(store.stats().cache_hits, 1);
    }

    #[test]
    fn test_retain_keeps_payload() {
        let mut store = ChunkStore::new(RetentionPolicy::Retain);
        let coord = ChunkCoord::new(0, 0);
        store.get_or_generate(coord, || Chunk::new(coord, 4));
        assert!(!store.release(coord));
        assert!(store.contains(coord));
    }

    #[test]
    fn test_drop_discards_payload() {
        let mut store = ChunkStore::new(RetentionPolicy::Drop);
        let coord = ChunkCoord::new(0, 0);
        store.get_or_generate(coord, || Chunk::new(coord, 4));
        assert!(store.release(coord));
        assert!(store.is_empty());
        assert_eq!(store.stats().evicted, 1);
        assert!(!store.release(coord));
    }
}
