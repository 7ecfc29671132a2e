//! # World Configuration
//!
//! Everything that shapes a world, loadable from TOML. Every section has a
//! default, so an empty file is a playable world:
//!
//! ```toml
//! seed = 12345
//! chunk_size = 16
//!
//! [noise]
//! scale = 10.0
//! octaves = 1
//!
//! [terrain]
//! thresholds = [0.30, 0.45, 0.50, 0.75]
//! kinds = ["deep_water", "water", "sand", "grass", "rock"]
//!
//! [streaming]
//! radius = 1
//! retention = "retain"
//!
//! [[structures.templates]]
//! name = "boulder"
//! probability = 0.05
//! cells = [{ offset = [0, 0], tile = 110 }]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkGenerator;
use crate::error::{WorldError, WorldResult};
use crate::noise::{NoiseField, NoiseSettings, WorldSeed};
use crate::shoreline::SmoothingSettings;
use crate::store::RetentionPolicy;
use crate::structure::{StructureCatalog, StructurePlacer, StructureTemplate};
use crate::terrain::{TerrainClassifier, TerrainKind};

/// Largest accepted chunk side.
pub const MAX_CHUNK_SIZE: usize = 1024;

/// Largest accepted streaming radius.
pub const MAX_STREAMING_RADIUS: u32 = 32;

/// Largest accepted octave count.
pub const MAX_OCTAVES: u32 = 16;

/// Threshold table and post-processing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Ascending upper bounds, one per kind.
    pub thresholds: Vec<f64>,
    /// Kinds in threshold order; the last one is the fallback.
    pub kinds: Vec<TerrainKind>,
    /// Water smoothing.
    pub smoothing: SmoothingSettings,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![0.30, 0.45, 0.50, 0.75],
            kinds: TerrainKind::ALL.to_vec(),
            smoothing: SmoothingSettings::default(),
        }
    }
}

/// Structure catalog and placement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Empty margin kept between structures of one chunk.
    pub spacing: u32,
    /// Templates in catalog order.
    pub templates: Vec<StructureTemplate>,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            spacing: 1,
            templates: StructureCatalog::default().into_templates(),
        }
    }
}

/// Neighborhood and cache behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Chebyshev radius, in chunks, kept attached around the viewer.
    pub radius: u32,
    /// What happens to payloads leaving the neighborhood.
    pub retention: RetentionPolicy,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            radius: 1,
            retention: RetentionPolicy::Retain,
        }
    }
}

/// Complete world configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World seed.
    pub seed: WorldSeed,
    /// Chunk side length in cells.
    pub chunk_size: usize,
    /// Noise sampling.
    pub noise: NoiseSettings,
    /// Terrain classification.
    pub terrain: TerrainConfig,
    /// Structures.
    pub structures: StructureConfig,
    /// Streaming.
    pub streaming: StreamingConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: WorldSeed::default(),
            chunk_size: 16,
            noise: NoiseSettings::default(),
            terrain: TerrainConfig::default(),
            structures: StructureConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Parses a configuration from TOML text. Does not validate.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::ConfigParse`] on malformed TOML.
    pub fn from_toml_str(text: &str) -> WorldResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file. Does not validate.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or
    /// [`WorldError::ConfigParse`] on malformed TOML.
    pub fn from_toml_file(path: impl AsRef<Path>) -> WorldResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks every value before any generation happens.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn validate(&self) -> WorldResult<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(WorldError::InvalidConfig(format!(
                "chunk_size must be in 1..={MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if !self.noise.scale.is_finite() || self.noise.scale <= 0.0 {
            return Err(WorldError::InvalidConfig(format!(
                "noise scale must be positive, got {}",
                self.noise.scale
            )));
        }
        if !self.noise.offset.is_finite() {
            return Err(WorldError::InvalidConfig("noise offset must be finite".to_string()));
        }
        if self.noise.octaves == 0 || self.noise.octaves > MAX_OCTAVES {
            return Err(WorldError::InvalidConfig(format!(
                "noise octaves must be in 1..={MAX_OCTAVES}, got {}",
                self.noise.octaves
            )));
        }
        if self.terrain.smoothing.replacement.is_water() {
            return Err(WorldError::InvalidConfig(
                "smoothing replacement must not be water".to_string(),
            ));
        }
        if self.streaming.radius > MAX_STREAMING_RADIUS {
            return Err(WorldError::InvalidConfig(format!(
                "streaming radius must be at most {MAX_STREAMING_RADIUS}, got {}",
                self.streaming.radius
            )));
        }
        if self.structures.spacing as usize >= self.chunk_size {
            return Err(WorldError::InvalidConfig(format!(
                "structure spacing must be below chunk_size {}, got {}",
                self.chunk_size, self.structures.spacing
            )));
        }
        // A footprint never leaves its chunk, so no offset may reach a full side
        for template in &self.structures.templates {
            for cell in &template.cells {
                if cell.offset.iter().any(|d| d.unsigned_abs() as usize >= self.chunk_size) {
                    return Err(WorldError::InvalidConfig(format!(
                        "structure template `{}` offset {:?} exceeds chunk_size {}",
                        template.name, cell.offset, self.chunk_size
                    )));
                }
            }
        }

        self.classifier()?;
        self.catalog()?;
        Ok(())
    }

    /// Builds the terrain classifier.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed threshold table.
    pub fn classifier(&self) -> WorldResult<TerrainClassifier> {
        TerrainClassifier::new(self.terrain.thresholds.clone(), self.terrain.kinds.clone())
    }

    /// Builds the structure catalog.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed template.
    pub fn catalog(&self) -> WorldResult<StructureCatalog> {
        StructureCatalog::new(self.structures.templates.clone())
    }

    /// Builds the chunk generator described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found.
    pub fn generator(&self) -> WorldResult<ChunkGenerator> {
        self.validate()?;
        Ok(ChunkGenerator::new(
            NoiseField::new(self.seed, self.noise),
            self.classifier()?,
            self.terrain.smoothing,
            StructurePlacer::new(self.seed, self.catalog()?, self.structures.spacing),
            self.chunk_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::StructureCell;

    #[test]
    fn test_default_is_valid() {
        let config = WorldConfig::default();
        config.validate().unwrap();
        assert_eq!(config.catalog().unwrap().len(), 3);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(WorldConfig::from_toml_str("").unwrap(), WorldConfig::default());
    }

    #[test]
    fn test_parses_full_file() {
        let text = r#"
            seed = 7
            chunk_size = 32

            [noise]
            scale = 20.0
            offset = 1000.0

            [terrain]
            thresholds = [0.3, 0.6]
            kinds = ["water", "sand", "grass"]

            [terrain.smoothing]
            enabled = true

            [streaming]
            radius = 2
            retention = "drop"

            [structures]
            spacing = 0

            [[structures.templates]]
            name = "rock"
            probability = 0.1
            cells = [{ offset = [0, 0], tile = 110 }]
        "#;
        let config = WorldConfig::from_toml_str(text).unwrap();
        config.validate().unwrap();

        assert_eq!(config.seed, WorldSeed::new(7));
        assert_eq!(config.chunk_size, 32);
        assert_eq!(config.noise.octaves, 1);
        assert_eq!(config.terrain.kinds.len(), 3);
        assert!(config.terrain.smoothing.enabled);
        assert_eq!(config.streaming.retention, RetentionPolicy::Drop);
        assert_eq!(config.structures.templates[0].name, "rock");
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = WorldConfig {
            chunk_size: 0,
            ..WorldConfig::default()
        };
        assert!(matches!(config.validate(), Err(WorldError::InvalidConfig(_))));

        config.chunk_size = 16;
        config.terrain.thresholds = vec![0.9, 0.1, 0.5, 0.7];
        assert!(matches!(config.validate(), Err(WorldError::NonMonotonicThresholds { .. })));

        config.terrain = TerrainConfig::default();
        config.structures.templates[0].probability = 1.5;
        assert!(matches!(config.validate(), Err(WorldError::InvalidProbability { .. })));
    }

    #[test]
    fn test_rejects_offsets_beyond_a_chunk() {
        let mut config = WorldConfig::default();
        config.structures.templates[0]
            .cells
            .push(StructureCell::new(i32::MAX, 0, 1));
        assert!(matches!(config.validate(), Err(WorldError::InvalidConfig(_))));
        assert!(config.generator().is_err());

        config.structures.templates[0].cells.pop();
        config.structures.templates[0]
            .cells
            .push(StructureCell::new(0, -16, 1));
        assert!(matches!(config.validate(), Err(WorldError::InvalidConfig(_))));

        config.structures.templates[0].cells.pop();
        config.structures.templates[0]
            .cells
            .push(StructureCell::new(0, -15, 1));
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_spacing_beyond_a_chunk() {
        let mut config = WorldConfig::default();
        config.structures.spacing = u32::MAX;
        assert!(matches!(config.validate(), Err(WorldError::InvalidConfig(_))));

        config.structures.spacing = 16;
        assert!(matches!(config.validate(), Err(WorldError::InvalidConfig(_))));

        config.structures.spacing = 15;
        config.validate().unwrap();
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            WorldConfig::from_toml_str("seed = \"forty-two\""),
            Err(WorldError::ConfigParse(_))
        ));
    }
}
