//! # World Error Types
//!
//! All errors that can occur while configuring, generating or persisting the
//! tile world.

use thiserror::Error;

/// Errors that can occur in the tile world engine.
#[derive(Error, Debug)]
pub enum WorldError {
    /// Threshold table is not sorted ascending (or contains NaN).
    #[error("terrain thresholds must be non-decreasing: {previous} is followed by {next} at index {index}")]
    NonMonotonicThresholds {
        /// Index of the offending threshold.
        index: usize,
        /// Threshold before the offending one.
        previous: f64,
        /// The offending threshold.
        next: f64,
    },

    /// Kind table does not line up with the threshold table.
    #[error("terrain kind table has {kinds} entries for {thresholds} thresholds")]
    KindTableMismatch {
        /// Number of configured kinds.
        kinds: usize,
        /// Number of configured thresholds.
        thresholds: usize,
    },

    /// A structure template has no cells.
    #[error("structure template `{0}` has no cells")]
    EmptyTemplate(String),

    /// A spawn probability lies outside [0, 1).
    #[error("structure template `{name}` has probability {probability}, expected [0, 1)")]
    InvalidProbability {
        /// Template name.
        name: String,
        /// The rejected probability.
        probability: f64,
    },

    /// Any other invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A `placed` edit arrived without a tile.
    #[error("placed edit at {0:?} carries no tile")]
    MissingTile([i32; 3]),

    /// The persisted overlay is damaged. Loading is aborted rather than
    /// resuming with partial state.
    #[error("corrupt persisted record `{key}`: {reason}")]
    CorruptPersistence {
        /// Storage key of the damaged record.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Underlying storage failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorldError {
    /// Shorthand for a corruption error on `key`.
    pub(crate) fn corrupt(key: &str, reason: impl Into<String>) -> Self {
        Self::CorruptPersistence {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
