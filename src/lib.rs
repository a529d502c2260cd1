#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel World
//!
//! The simulation core of a block-based voxel game: a chunked world kept current by
//! background threads, spatial indices for the objects living in it, and a liquid
//! cellular automaton.
//!
//! ## Key Modules
//!
//! * `core` - the shared-resource primitive used throughout the engine
//! * `engine_state` - the world, its chunk store, spatial indices and liquid simulation
//!
//! ## Architecture
//!
//! The engine separates:
//! * Voxel storage (a fixed grid of chunks, each behind its own lock)
//! * Change propagation (chunk invalidation and per-tick change notification)
//! * Spatial indexing (an adaptive octree and a pair of uniform spatial hashes)
//! * Simulation (the liquid automaton on an autoscaling worker pool)
//!
//! Rendering and the game's AI live outside the crate, behind the traits in
//! `engine_state::interfaces`.
//!
//! ## Usage
//!
//! ```rust
//! use voxel_world::engine_state::EngineState;
//! use voxel_world::engine_state::config::EngineConfig;
//! use voxel_world::engine_state::voxels::block::block_type::LiquidType;
//! use voxel_world::engine_state::voxels::block::Voxel;
//! use voxel_world::engine_state::voxels::chunk_store::Collaborators;
//! use voxel_world::engine_state::voxels::coordinates::GlobalVoxelCoordinate;
//! use voxel_world::engine_state::voxels::generation::EmptyGenerator;
//!
//! let mut config = EngineConfig::default();
//! config.world.chunks_y = 1;
//! let engine = EngineState::new(&config, &EmptyGenerator, Collaborators::default()).unwrap();
//!
//! let top = GlobalVoxelCoordinate::new(8, 5, 8);
//! engine.set_voxel(top, Voxel::with_liquid(LiquidType::WATER, 8)).unwrap();
//! engine.tick();
//! assert!(engine.get_voxel(top).unwrap().liquid_level() < 8);
//! ```

use std::sync::Arc;
use std::time::Duration;

use cgmath::Point3;
use log::{info, trace};

use engine_state::config::EngineConfig;
use engine_state::error::WorldResult;
use engine_state::interfaces::{TaskSystem, VoxelChange};
use engine_state::spatial::bounded_object::{Body, ObjectId};
use engine_state::spatial::bounds::BoundingBox;
use engine_state::spatial::collision_manager::CollisionType;
use engine_state::voxels::block::block_type::LiquidType;
use engine_state::voxels::chunk_store::Collaborators;
use engine_state::voxels::coordinates::GlobalVoxelCoordinate;
use engine_state::voxels::generation::PerlinGenerator;
use engine_state::EngineState;

pub mod core;
pub mod engine_state;

/// How long the demo lets the background threads run.
const DEMO_DURATION: Duration = Duration::from_secs(3);

/// Initializes the `env_logger` backend, writing to stdout and honouring `RUST_LOG`.
///
/// Safe to call more than once; later calls do nothing.
pub fn init_logger() {
    let mut log_builder = env_logger::Builder::new();
    let _ = log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init();
}

/// Task system of the demo: traces every change it is told about.
struct TracingTaskSystem;

impl TaskSystem for TracingTaskSystem {
    fn on_voxel_changed(&self, change: &VoxelChange) {
        trace!(
            "Voxel {} changed from {:?} to {:?}",
            change.position,
            change.previous,
            change.current
        );
    }
}

/// Runs the demo world: generates terrain, drops some water and a few objects into it
/// and lets the background threads run for a few seconds.
///
/// The first command-line argument, if any, names a JSON configuration file.
pub fn run() -> WorldResult<()> {
    init_logger();
    info!("Logger initialized");

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let engine = EngineState::new(
        &config,
        &PerlinGenerator::new(config.world.seed),
        Collaborators {
            tasks: Arc::new(TracingTaskSystem),
            ..Collaborators::default()
        },
    )?;

    let bounds = *engine.store().bounds();
    let top = bounds.max.y as i32 - 1;
    for x in (4..bounds.max.x as i32).step_by(8) {
        for z in (4..bounds.max.z as i32).step_by(8) {
            engine.store().set_liquid(GlobalVoxelCoordinate::new(x, top, z), LiquidType::WATER, 8)?;
        }
    }

    for i in 0..16u64 {
        let corner = Point3::new(2.0 + i as f32 * 3.0, top as f32 - 2.0, 2.0 + i as f32);
        let body = Arc::new(Body::listening(
            ObjectId(i),
            BoundingBox::new(corner, corner + cgmath::Vector3::new(1.0, 2.0, 1.0)),
        ));
        engine.spawn_object(body.into(), Some(CollisionType::Dynamic));
    }

    engine.start()?;
    std::thread::sleep(DEMO_DURATION);
    engine.shutdown();

    let stats = engine.store().last_tick_stats();
    info!(
        "Ran {} ticks; last tick moved liquid {} times, {} splashes pending, {} chunk rebuilds",
        stats.tick,
        stats.transfers,
        engine.store().drain_splashes().len(),
        engine.store().rebuild_count()
    );
    Ok(())
}
