//! # Shoreline Smoothing
//!
//! Dissolves stray water cells left behind by classification: single puddles,
//! one-cell-wide channels and lakes too small to read as a body of water.
//!
//! The pass works on one chunk's classified terrain with an explicit FIFO
//! work-list. Each cell can be dissolved at most once, so the work done is
//! bounded by the chunk's cell count no matter how the water is shaped.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::terrain::TerrainKind;

/// Smoothing parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSettings {
    /// Whether the pass runs at all.
    pub enabled: bool,
    /// Minimum orthogonal water neighbors a water cell needs to survive.
    pub min_neighbors: u8,
    /// Minimum horizontal run of water through a surviving cell.
    pub min_width: u8,
    /// Minimum vertical run of water through a surviving cell.
    pub min_height: u8,
    /// Terrain a dissolved water cell becomes.
    pub replacement: TerrainKind,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_neighbors: 2,
            min_width: 2,
            min_height: 2,
            replacement: TerrainKind::Grass,
        }
    }
}

/// Orthogonal neighbor offsets.
const DIRECTIONS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Row-major view over a square terrain grid.
struct Grid<'a> {
    cells: &'a mut [TerrainKind],
    side: usize,
}

impl Grid<'_> {
    fn is_water(&self, x: i32, y: i32) -> bool {
        let side = self.side as i32;
        if x < 0 || y < 0 || x >= side || y >= side {
            return false;
        }
        self.cells[x as usize + y as usize * self.side].is_water()
    }

    fn water_neighbors(&self, x: i32, y: i32) -> u8 {
        DIRECTIONS
            .iter()
            .filter(|(dx, dy)| self.is_water(x + dx, y + dy))
            .count() as u8
    }

    fn run_length(&self, x: i32, y: i32, dx: i32, dy: i32) -> usize {
        let mut length = 1;
        for sign in [1, -1] {
            let (mut cx, mut cy) = (x + dx * sign, y + dy * sign);
            while self.is_water(cx, cy) {
                length += 1;
                cx += dx * sign;
                cy += dy * sign;
            }
        }
        length
    }

    fn survives(&self, x: i32, y: i32, settings: &SmoothingSettings) -> bool {
        self.water_neighbors(x, y) >= settings.min_neighbors
            && self.run_length(x, y, 1, 0) >= usize::from(settings.min_width)
            && self.run_length(x, y, 0, 1) >= usize::from(settings.min_height)
    }
}

/// Smooths the water in a `side x side` row-major terrain grid in place.
///
/// Returns the number of cells dissolved.
pub fn smooth_water(cells: &mut [TerrainKind], side: usize, settings: &SmoothingSettings) -> usize {
    debug_assert_eq!(cells.len(), side * side);
    if !settings.enabled || settings.replacement.is_water() {
        return 0;
    }

    let grid = Grid { cells, side };
    let mut queue: VecDeque<(i32, i32)> = VecDeque::with_capacity(side * side);
    let mut queued = vec![false; side * side];

    for y in 0..side {
        for x in 0..side {
            if grid.cells[x + y * side].is_water() {
                queue.push_back((x as i32, y as i32));
                queued[x + y * side] = true;
            }
        }
    }

    let mut dissolved = 0;
    while let Some((x, y)) = queue.pop_front() {
        let index = x as usize + y as usize * side;
        queued[index] = false;
        if !grid.is_water(x, y) || grid.survives(x, y, settings) {
            continue;
        }

        grid.cells[index] = settings.replacement;
        dissolved += 1;

        for (dx, dy) in DIRECTIONS {
            let (nx, ny) = (x + dx, y + dy);
            if grid.is_water(nx, ny) {
                let neighbor = nx as usize + ny as usize * side;
                if !queued[neighbor] {
                    queued[neighbor] = true;
                    queue.push_back((nx, ny));
                }
            }
        }
    }

    dissolved
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: TerrainKind = TerrainKind::Grass;
    const W: TerrainKind = TerrainKind::Water;

    fn enabled() -> SmoothingSettings {
        SmoothingSettings {
            enabled: true,
            ..SmoothingSettings::default()
        }
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut cells = vec![G, W, G, G];
        assert_eq!(smooth_water(&mut cells, 2, &SmoothingSettings::default()), 0);
        assert_eq!(cells, vec![G, W, G, G]);
    }

    #[test]
    fn test_isolated_puddle_dissolves() {
        #[rustfmt::skip]
        let mut cells = vec![
            G, G, G,
            G, W, G,
            G, G, G,
        ];
        assert_eq!(smooth_water(&mut cells, 3, &enabled()), 1);
        assert!(cells.iter().all(|&c| c == G));
    }

    #[test]
    fn test_solid_lake_survives() {
        #[rustfmt::skip]
        let mut cells = vec![
            G, G, G, G,
            G, W, W, G,
            G, W, W, G,
            G, G, G, G,
        ];
        let before = cells.clone();
        assert_eq!(smooth_water(&mut cells, 4, &enabled()), 0);
        assert_eq!(cells, before);
    }

    #[test]
    fn test_channel_collapses_iteratively() {
        // A one-wide channel dissolves cell by cell; the work-list carries the
        // collapse along without recursion.
        let side = 64;
        let mut cells = vec![G; side * side];
        for x in 0..side {
            cells[x + 10 * side] = W;
        }
        let dissolved = smooth_water(&mut cells, side, &enabled());
        assert_eq!(dissolved, side);
        assert!(cells.iter().all(|&c| c == G));
    }

    #[test]
    fn test_water_replacement_is_rejected() {
        let mut cells = vec![W, G, G, G];
        let settings = SmoothingSettings {
            replacement: TerrainKind::DeepWater,
            ..enabled()
        };
        assert_eq!(smooth_water(&mut cells, 2, &settings), 0);
    }
}
