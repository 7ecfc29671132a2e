//! # TESSERA Headless Walk
//!
//! Opens a world from a TOML file, walks a scripted viewer through it with
//! periodic build-tool edits, and saves the overlay to a directory.
//!
//! ```bash
//! headless_walk [world.toml] [save_dir]
//! ```
//!
//! The world file may carry a `[walk]` table next to the world settings:
//!
//! ```toml
//! seed = 7
//!
//! [walk]
//! ticks = 5000
//! edit_every = 10
//! path = { kind = "spiral", step = 4.0 }
//! ```
//!
//! Running twice against the same directory resumes the previous world.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tessera::procedural::{FileStore, RecordingSink, TileWorld, WorldConfig, WorldResult};
use tessera::{GameLoop, GameLoopConfig};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WalkFile {
    walk: GameLoopConfig,
}

fn load(config_path: Option<&Path>) -> WorldResult<(WorldConfig, GameLoopConfig)> {
    let Some(path) = config_path else {
        return Ok((WorldConfig::default(), GameLoopConfig::default()));
    };
    let text = std::fs::read_to_string(path)?;
    let world = WorldConfig::from_toml_str(&text)?;
    let walk: WalkFile = toml::from_str(&text)?;
    Ok((world, walk.walk))
}

fn run(config_path: Option<&Path>, save_dir: &Path) -> WorldResult<()> {
    let (world_config, loop_config) = load(config_path)?;
    println!("🌱 Seed {}, chunk size {}", world_config.seed.value(), world_config.chunk_size);
    println!("💾 Save directory: {}", save_dir.display());

    let store = FileStore::open(save_dir)?;
    let world = TileWorld::open(world_config, RecordingSink::new(), store)?;
    println!("   ✓ Restored {} structures", world.overlay().structure_count());
    println!("   ✓ Restored {} destroyed cells", world.overlay().destroyed_len());
    println!();

    let mut game_loop = GameLoop::new(world, loop_config);
    game_loop.run()?;
    let (summary, sink, _) = game_loop.finish()?;

    summary.frames.print_summary();
    println!();
    println!("┌─ WORLD ────────────────────────────────────────────────────────┐");
    println!("│ Final Position:     ({:.1}, {:.1})", summary.final_position.0, summary.final_position.1);
    println!("│ Cached Chunks:      {}", summary.world.cached_chunks);
    println!("│ Structures:         {}", summary.world.structures);
    println!("│ Destroyed Cells:    {}", summary.world.destroyed_cells);
    println!("│ Sink Writes:        {}", sink.tile_writes);
    println!("└──────────────────────────────────────────────────────────────────┘");
    Ok(())
}

fn main() {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("                   TESSERA HEADLESS WALK v0.1.0");
    println!("═══════════════════════════════════════════════════════════════════");
    println!();

    let mut args = std::env::args().skip(1).map(PathBuf::from);
    let config_path = args.next();
    let save_dir = args
        .next()
        .unwrap_or_else(|| std::env::temp_dir().join("tessera_world"));

    if let Err(e) = run(config_path.as_deref(), &save_dir) {
        eprintln!("   ✗ FATAL: {e}");
        std::process::exit(1);
    }
}
