//! # Resume Walk Test
//!
//! A walk saved to disk resumes with every removal intact.

use tessera::procedural::{FileStore, RecordingSink, TileWorld, WorldConfig};
use tessera::{GameLoop, GameLoopConfig, ViewerPath};

#[test]
fn test_walk_resumes_from_disk() {
    let dir = std::env::temp_dir().join(format!("tessera_resume_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let config = GameLoopConfig {
        ticks: 200,
        path: ViewerPath::Spiral { step: 3.0 },
        edit_every: 4,
        save_every: 50,
        ..GameLoopConfig::default()
    };

    let world = TileWorld::open(WorldConfig::default(), RecordingSink::new(), FileStore::open(&dir).unwrap()).unwrap();
    let mut game_loop = GameLoop::new(world, config.clone());
    game_loop.run().unwrap();
    let destroyed = game_loop.world().overlay().destroyed_cells();
    let structures = game_loop.world().overlay().structure_count();
    let (summary, _, _) = game_loop.finish().unwrap();
    assert_eq!(summary.frames.edits_applied, 50);
    assert!(!destroyed.is_empty());

    let world = TileWorld::open(WorldConfig::default(), RecordingSink::new(), FileStore::open(&dir).unwrap()).unwrap();
    assert_eq!(world.overlay().destroyed_cells(), destroyed);
    assert_eq!(world.overlay().structure_count(), structures);

    // A second session over the same ground keeps the old holes
    let mut game_loop = GameLoop::new(world, GameLoopConfig { edit_every: 0, ..config });
    game_loop.run().unwrap();
    for cell in &destroyed {
        if let Some(tile) = game_loop.world().tile_at(*cell) {
            assert_eq!(tile, None, "Removed cell {cell:?} came back");
        }
    }

    let _ = std::fs::remove_dir_all(&dir);
}
