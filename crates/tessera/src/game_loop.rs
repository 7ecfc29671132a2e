//! # TESSERA Game Loop
//!
//! Drives a [`TileWorld`] at a fixed tick rate along a scripted viewer path.
//!
//! ```text
//! Tick N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. MOVE VIEWER                                                      │
//! │    └─ Advance the scripted path by one step                         │
//! │                                                                     │
//! │ 2. STREAM                                                           │
//! │    └─ TileWorld::tick attaches/detaches the neighborhood            │
//! │                                                                     │
//! │ 3. BUILD TOOL (every `edit_every` ticks)                            │
//! │    └─ Alternate: remove the viewer's cell / place east of it        │
//! │                                                                     │
//! │ 4. SAVE (every `save_every` ticks)                                  │
//! │    └─ Write the durable overlay                                     │
//! │                                                                     │
//! │ 5. END TICK                                                         │
//! │    └─ Record timing, warn on slow ticks                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tessera_procedural::{
    KeyValueStore, RenderSink, TileEdit, TileKind, TileWorld, WorldCell, WorldResult, WorldStats,
};

/// Target tick time for 60 ticks per second.
pub const TARGET_FRAME_TIME: Duration = Duration::from_micros(16_666);

/// Maximum allowed tick time before warning.
pub const MAX_FRAME_TIME: Duration = Duration::from_millis(33);

/// Scripted viewer movement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewerPath {
    /// Constant velocity, in cells per tick.
    Line {
        /// X step.
        dx: f32,
        /// Y step.
        dy: f32,
    },
    /// Square spiral out from the start: E, S, W, N with legs growing
    /// by one step every two turns.
    Spiral {
        /// Step length in cells.
        step: f32,
    },
}

impl Default for ViewerPath {
    fn default() -> Self {
        Self::Line { dx: 1.0, dy: 0.0 }
    }
}

/// Configuration for the game loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameLoopConfig {
    /// Number of ticks to run.
    pub ticks: u64,
    /// Viewer start position.
    pub start: [f32; 2],
    /// Viewer movement.
    pub path: ViewerPath,
    /// Ticks between scripted edits; 0 disables them.
    pub edit_every: u64,
    /// Tile placed by the scripted build tool.
    pub placed_tile: u16,
    /// Ticks between saves; 0 saves only on shutdown.
    pub save_every: u64,
    /// Enable tick timing logs.
    pub enable_timing_logs: bool,
}

impl Default for GameLoopConfig {
    fn default() -> Self {
        Self {
            ticks: 1_000,
            start: [0.5, 0.5],
            path: ViewerPath::default(),
            edit_every: 25,
            placed_tile: 42,
            save_every: 0,
            enable_timing_logs: false,
        }
    }
}

/// Viewer position along a [`ViewerPath`].
#[derive(Clone, Debug)]
pub struct ViewerWalker {
    path: ViewerPath,
    x: f32,
    y: f32,
    direction: u8, // 0=E, 1=S, 2=W, 3=N
    leg_length: u32,
    steps_in_leg: u32,
    legs_completed: u32,
}

impl ViewerWalker {
    /// Creates a walker at `start`.
    #[must_use]
    pub fn new(path: ViewerPath, start: [f32; 2]) -> Self {
        Self {
            path,
            x: start[0],
            y: start[1],
            direction: 0,
            leg_length: 1,
            steps_in_leg: 0,
            legs_completed: 0,
        }
    }

    /// Current position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    /// Cell under the viewer.
    #[must_use]
    pub fn cell(&self) -> WorldCell {
        WorldCell::new(self.x.floor() as i32, self.y.floor() as i32)
    }

    /// Moves one step and returns the new position.
    pub fn advance(&mut self) -> (f32, f32) {
        match self.path {
            ViewerPath::Line { dx, dy } => {
                self.x += dx;
                self.y += dy;
            }
            ViewerPath::Spiral { step } => {
                match self.direction {
                    0 => self.x += step,
                    1 => self.y += step,
                    2 => self.x -= step,
                    _ => self.y -= step,
                }
                self.steps_in_leg += 1;
                if self.steps_in_leg >= self.leg_length {
                    self.steps_in_leg = 0;
                    self.direction = (self.direction + 1) % 4;
                    self.legs_completed += 1;
                    if self.legs_completed % 2 == 0 {
                        self.leg_length += 1;
                    }
                }
            }
        }
        self.position()
    }
}

/// Per-tick statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    /// Tick number.
    pub frame: u64,
    /// Total tick time in microseconds.
    pub total_us: u64,
    /// Streaming time in microseconds.
    pub streaming_us: u64,
    /// Chunks attached.
    pub loaded: u32,
    /// Chunks detached.
    pub unloaded: u32,
    /// Chunks generated.
    pub generated: u32,
    /// Edits applied.
    pub edits: u32,
}

/// Outcome of a finished walk.
#[derive(Clone, Debug)]
pub struct WalkSummary {
    /// Where the viewer ended.
    pub final_position: (f32, f32),
    /// World counters at the end of the walk.
    pub world: WorldStats,
    /// Accumulated tick statistics.
    pub frames: FrameStatsAccumulator,
}

/// The tick driver.
///
/// Owns the world and the scripted viewer.
pub struct GameLoop<S: RenderSink, K: KeyValueStore> {
    world: TileWorld<S, K>,
    walker: ViewerWalker,
    config: GameLoopConfig,
    frame_count: u64,
    stats_accumulator: FrameStatsAccumulator,
}

impl<S: RenderSink, K: KeyValueStore> GameLoop<S, K> {
    /// Creates a loop around an opened world.
    #[must_use]
    pub fn new(world: TileWorld<S, K>, config: GameLoopConfig) -> Self {
        Self {
            world,
            walker: ViewerWalker::new(config.path, config.start),
            config,
            frame_count: 0,
            stats_accumulator: FrameStatsAccumulator::new(),
        }
    }

    /// Runs a single tick.
    ///
    /// # Errors
    ///
    /// Returns an error if a periodic save fails.
    pub fn run_frame(&mut self) -> WorldResult<FrameStats> {
        let frame_start = Instant::now();
        let (x, y) = self.walker.advance();

        let report = self.world.tick(x, y);
        let streaming_us = frame_start.elapsed().as_micros() as u64;

        let mut edits = 0;
        let frame = self.frame_count + 1;
        if self.config.edit_every > 0 && frame % self.config.edit_every == 0 {
            let edit = self.scripted_edit(frame / self.config.edit_every);
            self.world.apply(&edit)?;
            edits += 1;
        }
        if self.config.save_every > 0 && frame % self.config.save_every == 0 {
            self.world.save()?;
        }

        let stats = FrameStats {
            frame: self.frame_count,
            total_us: frame_start.elapsed().as_micros() as u64,
            streaming_us,
            loaded: report.loaded.len() as u32,
            unloaded: report.unloaded.len() as u32,
            generated: report.generated as u32,
            edits,
        };
        self.end_frame(stats);
        Ok(stats)
    }

    /// Runs the configured number of ticks.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a tick.
    pub fn run(&mut self) -> WorldResult<WalkSummary> {
        for _ in 0..self.config.ticks {
            self.run_frame()?;
        }
        Ok(self.summary())
    }

    /// Saves, closes the world and hands back the sink and store.
    ///
    /// # Errors
    ///
    /// Returns an error if the final save fails.
    pub fn finish(self) -> WorldResult<(WalkSummary, S, K)> {
        let summary = self.summary();
        let (sink, store) = self.world.close()?;
        Ok((summary, sink, store))
    }

    /// Records timing and advances the tick counter.
    fn end_frame(&mut self, stats: FrameStats) {
        self.frame_count += 1;
        self.stats_accumulator.record(stats);

        if self.config.enable_timing_logs && stats.total_us > MAX_FRAME_TIME.as_micros() as u64 {
            tracing::warn!(
                "Tick {} exceeded budget: {:.2}ms (target: {:.2}ms), {} chunks generated",
                self.frame_count,
                stats.total_us as f64 / 1000.0,
                TARGET_FRAME_TIME.as_micros() as f64 / 1000.0,
                stats.generated
            );
        }
    }

    /// Even edits remove the cell under the viewer, odd ones place a tile
    /// one cell east of it.
    fn scripted_edit(&self, index: u64) -> TileEdit {
        let cell = self.walker.cell();
        if index % 2 == 0 {
            TileEdit::removed(cell)
        } else {
            TileEdit::placed(cell.offset(1, 0), TileKind(self.config.placed_tile))
        }
    }

    fn summary(&self) -> WalkSummary {
        WalkSummary {
            final_position: self.walker.position(),
            world: self.world.stats(),
            frames: self.stats_accumulator.clone(),
        }
    }

    /// Returns the tick count.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the world.
    #[must_use]
    pub fn world(&self) -> &TileWorld<S, K> {
        &self.world
    }

    /// Returns the accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats_accumulator
    }
}

/// Accumulator for tick statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Total ticks recorded.
    pub frames_recorded: u64,
    /// Sum of total tick times.
    pub total_us_sum: u64,
    /// Sum of streaming times.
    pub streaming_us_sum: u64,
    /// Min tick time.
    pub min_frame_us: u64,
    /// Max tick time.
    pub max_frame_us: u64,
    /// Ticks that exceeded budget.
    pub frames_over_budget: u64,
    /// Chunks attached.
    pub chunks_loaded: u64,
    /// Chunks detached.
    pub chunks_unloaded: u64,
    /// Chunks generated.
    pub chunks_generated: u64,
    /// Edits applied.
    pub edits_applied: u64,
}

impl FrameStatsAccumulator {
    /// Creates a new accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            streaming_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            chunks_loaded: 0,
            chunks_unloaded: 0,
            chunks_generated: 0,
            edits_applied: 0,
        }
    }

    /// Records a tick's statistics.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_recorded += 1;
        self.total_us_sum += stats.total_us;
        self.streaming_us_sum += stats.streaming_us;
        self.min_frame_us = self.min_frame_us.min(stats.total_us);
        self.max_frame_us = self.max_frame_us.max(stats.total_us);
        self.chunks_loaded += u64::from(stats.loaded);
        self.chunks_unloaded += u64::from(stats.unloaded);
        self.chunks_generated += u64::from(stats.generated);
        self.edits_applied += u64::from(stats.edits);

        if stats.total_us > TARGET_FRAME_TIME.as_micros() as u64 {
            self.frames_over_budget += 1;
        }
    }

    /// Returns average tick time in milliseconds.
    #[must_use]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Returns the fraction of ticks over budget.
    #[must_use]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }

    /// Prints a summary of the statistics.
    pub fn print_summary(&self) {
        let min_us = if self.frames_recorded == 0 { 0 } else { self.min_frame_us };

        println!("╔══════════════════════════════════════════════════════════════════╗");
        println!("║                     TICK STATISTICS SUMMARY                      ║");
        println!("╚══════════════════════════════════════════════════════════════════╝");
        println!();
        println!("┌─ TIMING ───────────────────────────────────────────────────────┐");
        println!("│ Ticks Recorded:     {}", self.frames_recorded);
        println!("│ Average Tick:       {:.3} ms", self.avg_frame_ms());
        println!("│ Min Tick:           {:.3} ms", min_us as f64 / 1000.0);
        println!("│ Max Tick:           {:.3} ms", self.max_frame_us as f64 / 1000.0);
        println!(
            "│ Over Budget:        {} ticks ({:.1}%)",
            self.frames_over_budget,
            self.over_budget_ratio() * 100.0
        );
        println!("└──────────────────────────────────────────────────────────────────┘");
        println!();
        println!("┌─ STREAMING ────────────────────────────────────────────────────┐");
        println!("│ Chunks Attached:    {}", self.chunks_loaded);
        println!("│ Chunks Detached:    {}", self.chunks_unloaded);
        println!("│ Chunks Generated:   {}", self.chunks_generated);
        println!("│ Edits Applied:      {}", self.edits_applied);
        println!("└──────────────────────────────────────────────────────────────────┘");
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_procedural::{MemoryStore, RecordingSink, WorldConfig};

    fn game_loop(config: GameLoopConfig) -> GameLoop<RecordingSink, MemoryStore> {
        let world = TileWorld::open(WorldConfig::default(), RecordingSink::new(), MemoryStore::new()).unwrap();
        GameLoop::new(world, config)
    }

    #[test]
    fn test_line_walk() {
        let mut walker = ViewerWalker::new(ViewerPath::Line { dx: 2.0, dy: -1.0 }, [0.0, 0.0]);
        walker.advance();
        assert_eq!(walker.advance(), (4.0, -2.0));
        assert_eq!(walker.cell(), WorldCell::new(4, -2));
    }

    #[test]
    fn test_spiral_walk() {
        let mut walker = ViewerWalker::new(ViewerPath::Spiral { step: 1.0 }, [0.0, 0.0]);
        let visited: Vec<_> = (0..6).map(|_| walker.advance()).collect();
        assert_eq!(
            visited,
            vec![(1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (-1.0, 1.0), (-1.0, 0.0), (-1.0, -1.0)]
        );
    }

    #[test]
    fn test_run_counts_ticks_and_edits() {
        let mut game_loop = game_loop(GameLoopConfig {
            ticks: 100,
            edit_every: 10,
            ..GameLoopConfig::default()
        });

        let summary = game_loop.run().unwrap();
        assert_eq!(game_loop.frame_count(), 100);
        assert_eq!(summary.frames.frames_recorded, 100);
        assert_eq!(summary.frames.edits_applied, 10);
        assert_eq!(summary.final_position, (100.5, 0.5));
        assert!(summary.world.destroyed_cells >= 5);
        assert_eq!(summary.frames.chunks_generated, summary.world.generated);
    }

    #[test]
    fn test_finish_persists_overlay() {
        let mut game_loop = game_loop(GameLoopConfig {
            ticks: 20,
            edit_every: 5,
            ..GameLoopConfig::default()
        });
        game_loop.run().unwrap();

        let (summary, _, store) = game_loop.finish().unwrap();
        assert!(summary.world.destroyed_cells > 0);
        assert!(store.get("tessera.destroyed_cells").unwrap().is_some());
    }

    #[test]
    fn test_no_edits_when_disabled() {
        let mut game_loop = game_loop(GameLoopConfig {
            ticks: 30,
            edit_every: 0,
            ..GameLoopConfig::default()
        });
        let summary = game_loop.run().unwrap();
        assert_eq!(summary.frames.edits_applied, 0);
        assert_eq!(summary.world.destroyed_cells, 0);
    }

    #[test]
    fn test_stats_accumulator() {
        let mut acc = FrameStatsAccumulator::new();

        for i in 0..100 {
            acc.record(FrameStats {
                frame: i,
                total_us: 10_000 + (i * 100),
                streaming_us: 5_000,
                loaded: 3,
                unloaded: 3,
                generated: 1,
                edits: 0,
            });
        }

        assert_eq!(acc.frames_recorded, 100);
        assert_eq!(acc.chunks_generated, 100);
        // 10.0ms to 19.9ms; everything past 16.666ms is over budget
        assert_eq!(acc.frames_over_budget, 33);
        assert!(acc.avg_frame_ms() > 14.0 && acc.avg_frame_ms() < 15.0);
    }
}
