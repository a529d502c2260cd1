//! # World Error Types
//!
//! All errors that can surface from the voxel world's public API.
//!
//! Lookups never produce an error: an out-of-range chunk or voxel simply yields `None`.
//! Errors are reserved for mutations the caller asked for explicitly and for setup
//! failures (bad configuration, thread creation).

use thiserror::Error;

use super::voxels::coordinates::GlobalVoxelCoordinate;

/// Errors that can occur in the voxel world.
#[derive(Error, Debug)]
pub enum WorldError {
    /// A write targeted a voxel outside every chunk of the world grid.
    #[error("voxel {0} is outside the world")]
    OutOfBounds(GlobalVoxelCoordinate),

    /// A configuration value was rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operating system refused to create a background thread.
    #[error("failed to spawn thread `{name}`: {source}")]
    ThreadSpawn {
        /// Name of the thread that failed to start.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The background threads were started twice.
    #[error("background threads are already running")]
    AlreadyRunning,

    /// Reading a configuration file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration document could not be parsed.
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used across the engine.
pub type WorldResult<T> = Result<T, WorldError>;
