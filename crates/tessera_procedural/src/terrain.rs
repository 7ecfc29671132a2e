//! # Terrain Classification
//!
//! Maps noise values to terrain kinds through an ascending threshold table.
//!
//! ```text
//! value:  0.0 ──── 0.30 ──── 0.45 ──── 0.50 ──── 0.75 ──── 1.0
//! kind:   DeepWater   Water      Sand      Grass      Rock (fallback)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{WorldError, WorldResult};

/// Terrain types, ordered from lowest to highest ground.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TerrainKind {
    /// Open sea.
    DeepWater = 0,
    /// Shallow water, lakes.
    Water = 1,
    /// Beach/shoreline.
    Sand = 2,
    /// Grassland. The only kind structures spawn on.
    Grass = 3,
    /// Rocky highland.
    Rock = 4,
}

impl TerrainKind {
    /// Every kind, in order.
    pub const ALL: [Self; 5] = [Self::DeepWater, Self::Water, Self::Sand, Self::Grass, Self::Rock];

    /// Returns the tile drawn for this terrain.
    #[inline]
    #[must_use]
    pub const fn tile(self) -> TileKind {
        TileKind(self as u16)
    }

    /// Returns true for the water kinds.
    #[inline]
    #[must_use]
    pub const fn is_water(self) -> bool {
        matches!(self, Self::DeepWater | Self::Water)
    }

    /// Converts from u8, saturating to the highest kind.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::DeepWater,
            1 => Self::Water,
            2 => Self::Sand,
            3 => Self::Grass,
            _ => Self::Rock,
        }
    }
}

/// A tile identifier as understood by the render sink.
///
/// Ids 0-4 are the terrain kinds; placed tiles and structure tiles may use any id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileKind(pub u16);

impl TileKind {
    /// Returns the terrain kind this tile stands for, if any.
    #[must_use]
    pub const fn terrain(self) -> Option<TerrainKind> {
        if self.0 <= TerrainKind::Rock as u16 {
            Some(TerrainKind::from_u8(self.0 as u8))
        } else {
            None
        }
    }
}

impl From<TerrainKind> for TileKind {
    fn from(kind: TerrainKind) -> Self {
        kind.tile()
    }
}

/// Classifies a value against an ascending threshold table.
///
/// Returns the first kind whose threshold is >= `value`, or the last kind
/// when `value` exceeds every threshold.
///
/// # Panics
///
/// Panics if `kinds` is empty. Validated tables never are.
#[must_use]
pub fn classify(value: f64, thresholds: &[f64], kinds: &[TerrainKind]) -> TerrainKind {
    thresholds
        .iter()
        .zip(kinds)
        .find(|(threshold, _)| value <= **threshold)
        .map_or_else(|| kinds[kinds.len() - 1], |(_, kind)| *kind)
}

/// Validated threshold table.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainClassifier {
    thresholds: Vec<f64>,
    kinds: Vec<TerrainKind>,
}

impl TerrainClassifier {
    /// Builds a classifier from a threshold table.
    ///
    /// `kinds` must have as many entries as `thresholds`, or one more (an
    /// explicit fallback kind).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the thresholds are not finite and
    /// non-decreasing or the tables do not line up.
    pub fn new(thresholds: Vec<f64>, kinds: Vec<TerrainKind>) -> WorldResult<Self> {
        let lines_up = kinds.len() == thresholds.len() || kinds.len() == thresholds.len() + 1;
        if kinds.is_empty() || !lines_up {
            return Err(WorldError::KindTableMismatch {
                kinds: kinds.len(),
                thresholds: thresholds.len(),
            });
        }

        for (index, threshold) in thresholds.iter().enumerate() {
            if !threshold.is_finite() {
                return Err(WorldError::InvalidConfig(format!(
                    "terrain threshold {index} is not finite"
                )));
            }
            if index > 0 && thresholds[index - 1] > *threshold {
                return Err(WorldError::NonMonotonicThresholds {
                    index,
                    previous: thresholds[index - 1],
                    next: *threshold,
                });
            }
        }

        Ok(Self { thresholds, kinds })
    }

    /// Classifies a noise value.
    #[inline]
    #[must_use]
    pub fn classify(&self, value: f64) -> TerrainKind {
        classify(value, &self.thresholds, &self.kinds)
    }

    /// Returns the fallback kind.
    #[must_use]
    pub fn fallback(&self) -> TerrainKind {
        self.kinds[self.kinds.len() - 1]
    }
}

impl Default for TerrainClassifier {
    fn default() -> Self {
        Self {
            thresholds: vec![0.30, 0.45, 0.50, 0.75],
            kinds: TerrainKind::ALL.to_vec(),
        }
    }
}
