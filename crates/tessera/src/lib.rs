//! # TESSERA
//!
//! Headless driver for the procedural tile world.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        GameLoop                          │
//! │   scripted viewer ──► TileWorld::tick ──► build tool     │
//! └──────────────────────────────┬───────────────────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        ▼                       ▼                       ▼
//!   ChunkGenerator         MutationOverlay          RenderSink
//!   noise, terrain,        removals, buffered       (recording,
//!   structures             edits, persistence        headless)
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub use tessera_procedural as procedural;

pub mod game_loop;

pub use game_loop::{
    FrameStats, FrameStatsAccumulator, GameLoop, GameLoopConfig, ViewerPath, ViewerWalker, WalkSummary,
    MAX_FRAME_TIME, TARGET_FRAME_TIME,
};
