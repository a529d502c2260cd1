//! # Engine Configuration
//!
//! Every tunable of the voxel world lives in `EngineConfig`. The defaults reproduce the
//! behaviour the engine was tuned for; a JSON document can override any subset of them.
//!
//! ```
//! use voxel_world::engine_state::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "world": { "chunks_x": 2 } }"#).unwrap();
//! assert_eq!(config.world.chunks_x, 2);
//! assert_eq!(config.threading.tick_interval_secs, 0.1);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{WorldError, WorldResult};

/// Largest accepted multiplier from wall-clock to simulated time.
pub const MAX_TIME_SCALE: f32 = 1000.0;

/// Brings a time scale into `[0, MAX_TIME_SCALE]`. NaN becomes `0.0`.
pub fn clamp_time_scale(scale: f32) -> f32 {
    if scale.is_nan() {
        0.0
    } else {
        scale.clamp(0.0, MAX_TIME_SCALE)
    }
}

/// Converts an interval in seconds, rejecting NaN, negative and unrepresentable values.
pub(crate) fn interval(name: &str, secs: f32) -> WorldResult<Duration> {
    Duration::try_from_secs_f32(secs).map_err(|_| {
        WorldError::InvalidConfig(format!(
            "{name} must be a finite, non-negative number of seconds, got {secs}"
        ))
    })
}

/// Top-level configuration of the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Extents of the chunk grid and world seed.
    pub world: WorldConfig,
    /// Liquid automaton tuning.
    pub liquids: LiquidConfig,
    /// Adaptive spatial index tuning.
    pub octree: OctreeConfig,
    /// Uniform grid hash tuning.
    pub spatial_hash: SpatialHashConfig,
    /// Background thread tuning.
    pub threading: ThreadingConfig,
}

/// Size of the chunk grid. Chunks occupy coordinates `0..chunks_x` etc.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub chunks_x: i32,
    pub chunks_y: i32,
    pub chunks_z: i32,
    /// Seed for world generation and the liquid simulator's random source.
    pub seed: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunks_x: 4,
            chunks_y: 2,
            chunks_z: 4,
            seed: 0,
        }
    }
}

/// Tuning of the liquid automaton.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidConfig {
    /// Voxels at or below this level may evaporate.
    pub evaporation_threshold: u8,
    /// Probability per tick that a shallow voxel evaporates.
    pub evaporation_chance: f32,
    /// Fraction of its level a water voxel pushes sideways per tick.
    pub water_spread_rate: f32,
    /// Fraction of its level a lava voxel pushes sideways per tick.
    pub lava_spread_rate: f32,
    /// Transfers of at least this many units produce a splash event.
    pub splash_threshold: u8,
    /// Maximum number of undrained splash events.
    pub splash_capacity: usize,
}

impl Default for LiquidConfig {
    fn default() -> Self {
        Self {
            evaporation_threshold: 1,
            evaporation_chance: 0.01,
            water_spread_rate: 0.5,
            lava_spread_rate: 0.25,
            splash_threshold: 4,
            splash_capacity: 256,
        }
    }
}

/// Tuning of the adaptive octree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// A leaf splits once it holds more objects than this.
    pub max_objects_per_node: usize,
    /// A subtree collapses once it holds fewer objects than this.
    pub min_objects_per_node: usize,
    /// Leaves at this depth never split.
    pub max_depth: u32,
    /// Minimum time between two deferred-update passes.
    pub update_interval_secs: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_objects_per_node: 8,
            min_objects_per_node: 4,
            max_depth: 6,
            update_interval_secs: 0.1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialHashConfig {
    /// Edge length of one grid cell in world units.
    pub cell_size: f32,
}

impl Default for SpatialHashConfig {
    fn default() -> Self {
        Self { cell_size: 4.0 }
    }
}

/// Tuning of the background threads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadingConfig {
    /// Simulated seconds between two world ticks.
    pub tick_interval_secs: f32,
    /// Multiplier from wall-clock time to simulated time.
    pub time_scale: f32,
    /// Upper bound on liquid simulation workers.
    pub max_liquid_workers: usize,
    /// Number of liquid chunks one worker is expected to handle per tick.
    pub chunks_per_worker: usize,
    /// Number of chunks kept live by the rebuild worker before the least recently
    /// visible one is evicted.
    pub live_chunk_cap: usize,
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        let max_liquid_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .clamp(1, 8);
        Self {
            tick_interval_secs: 0.1,
            time_scale: 1.0,
            max_liquid_workers,
            chunks_per_worker: 4,
            live_chunk_cap: 512,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON. Missing fields fall back to their defaults.
    pub fn from_json_str(json: &str) -> WorldResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> WorldResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> WorldResult<()> {
        let world = &self.world;
        if world.chunks_x <= 0 || world.chunks_y <= 0 || world.chunks_z <= 0 {
            return Err(WorldError::InvalidConfig(format!(
                "chunk grid must be non-empty, got {}x{}x{}",
                world.chunks_x, world.chunks_y, world.chunks_z
            )));
        }

        let liquids = &self.liquids;
        if !(0.0..=1.0).contains(&liquids.evaporation_chance) {
            return Err(WorldError::InvalidConfig(
                "evaporation_chance must lie in [0, 1]".to_string(),
            ));
        }
        for (name, rate) in [
            ("water_spread_rate", liquids.water_spread_rate),
            ("lava_spread_rate", liquids.lava_spread_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(WorldError::InvalidConfig(format!("{name} must lie in [0, 1]")));
            }
        }

        let octree = &self.octree;
        if octree.max_objects_per_node == 0 {
            return Err(WorldError::InvalidConfig(
                "max_objects_per_node must be positive".to_string(),
            ));
        }
        if octree.min_objects_per_node > octree.max_objects_per_node {
            return Err(WorldError::InvalidConfig(
                "min_objects_per_node must not exceed max_objects_per_node".to_string(),
            ));
        }
        interval("update_interval_secs", octree.update_interval_secs)?;

        if self.spatial_hash.cell_size <= 0.0 || !self.spatial_hash.cell_size.is_finite() {
            return Err(WorldError::InvalidConfig("cell_size must be positive".to_string()));
        }

        let threading = &self.threading;
        if interval("tick_interval_secs", threading.tick_interval_secs)?.is_zero() {
            return Err(WorldError::InvalidConfig(
                "tick_interval_secs must be positive".to_string(),
            ));
        }
        if !(0.0..=MAX_TIME_SCALE).contains(&threading.time_scale) {
            return Err(WorldError::InvalidConfig(format!(
                "time_scale must lie in [0, {MAX_TIME_SCALE}]"
            )));
        }
        if threading.max_liquid_workers == 0 || threading.chunks_per_worker == 0 {
            return Err(WorldError::InvalidConfig(
                "liquid worker pool needs at least one worker and one chunk per worker".to_string(),
            ));
        }
        if threading.live_chunk_cap == 0 {
            return Err(WorldError::InvalidConfig("live_chunk_cap must be positive".to_string()));
        }
        Ok(())
    }
}
