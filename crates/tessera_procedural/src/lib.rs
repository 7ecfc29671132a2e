//! # TESSERA Procedural World
//!
//! Deterministic, streamed, editable 2D tile worlds.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: Same seed and configuration always produce the same world
//! 2. **Chunked**: The world is generated in fixed-size square chunks
//! 3. **Streamable**: Chunks attach and detach as the viewer moves
//! 4. **Durable**: Player removals survive unloads and restarts
//!
//! ## Core Components
//!
//! - `NoiseField`: Seeded simplex noise over world cells
//! - `TerrainClassifier`: Noise value to terrain kind
//! - `StructurePlacer`: Non-overlapping multi-tile structures
//! - `ChunkStore` / `StreamingController`: Chunk cache and neighborhood diffing
//! - `MutationOverlay`: Player edits layered over generation
//! - `PersistenceCodec`: Durable overlay records in a key-value store
//! - `TileWorld`: The engine instance tying it all together
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_procedural::{MemoryStore, RecordingSink, TileWorld, WorldCell, WorldConfig};
//!
//! let mut world = TileWorld::open(WorldConfig::default(), RecordingSink::new(), MemoryStore::new())?;
//!
//! // Viewer at world position (100, 200)
//! world.tick(100.0, 200.0);
//!
//! // The build tool removed a tile
//! world.on_tile_removed(WorldCell::new(101, 200));
//! world.save()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod noise;
pub mod overlay;
pub mod persistence;
pub mod shoreline;
pub mod sink;
pub mod store;
pub mod streaming;
pub mod structure;
pub mod terrain;
pub mod world;

pub use chunk::{Chunk, ChunkCoord, ChunkGenerator, WorldCell};
pub use config::{StreamingConfig, StructureConfig, TerrainConfig, WorldConfig};
pub use error::{WorldError, WorldResult};
pub use noise::{NoiseField, NoiseSettings, SimplexNoise, WorldSeed};
pub use overlay::{MutationOverlay, Removal};
pub use persistence::{FileStore, KeyValueStore, MemoryStore, PersistedOverlay, PersistenceCodec};
pub use shoreline::{smooth_water, SmoothingSettings};
pub use sink::{RecordingSink, RenderSink, TileLayer, VisualHandle};
pub use store::{ChunkStore, RetentionPolicy, StoreStats};
pub use streaming::{neighborhood, StreamingController, StreamingPlan, TickReport};
pub use structure::{
    StructureCatalog, StructureCell, StructureInstance, StructurePlacer, StructureTemplate, TemplateId,
};
pub use terrain::{classify, TerrainClassifier, TerrainKind, TileKind};
pub use world::{EditAction, TileEdit, TileWorld, WorldStats};
