//! # Liquid Simulation
//!
//! A cellular automaton that moves water and lava between voxels once per world tick.
//!
//! ## Rules
//!
//! For every voxel holding liquid, bottom slice first:
//!
//! 1. **Evaporation** - a voxel at or below `evaporation_threshold` dries up with a small
//!    probability. Evaporating lava leaves stone behind.
//! 2. **Gravity** - liquid falls into the voxel below as far as it has room. A different
//!    liquid below reacts instead: both lose their liquid and the falling voxel becomes
//!    stone.
//! 3. **Spread** - a voxel above level 1 pushes `floor(level * spread_rate)` into the
//!    first lateral neighbour with a lower level, trying neighbours in one of a few fixed
//!    orders picked at random. At most one lateral transfer per voxel per tick. A
//!    neighbour holding a different liquid reacts as above.
//!
//! ## Parallelism
//!
//! Chunks are split into eight parity classes (coordinate parity on each axis). Chunks of
//! one class never touch, so a class is simulated in parallel on the worker pool and the
//! classes run one after another. The number of active workers follows the number of
//! chunks holding liquid.

pub mod simulator;
pub mod splash;
pub mod tasks;

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use crate::engine_state::config::{LiquidConfig, ThreadingConfig};
use crate::engine_state::task_management::TaskManager;
use crate::engine_state::voxels::coordinates::ChunkCoordinate;
use crate::engine_state::voxels::world::World;

use splash::{SplashEvent, SplashQueue};
use tasks::LiquidChunkTask;

/// Number of chunk parity classes.
const PARITY_CLASSES: usize = 8;

/// What one simulation tick did.
#[derive(Clone, Debug, Default)]
pub struct LiquidTickOutcome {
    pub chunks_simulated: usize,
    pub transfers: u64,
    pub evaporations: u64,
    pub reactions: u64,
    /// Chunks whose contents changed and need a rebuild.
    pub touched_chunks: HashSet<ChunkCoordinate>,
    /// Splashes produced this tick, before they enter the bounded queue.
    pub splashes: Vec<SplashEvent>,
}

impl LiquidTickOutcome {
    pub fn merge(&mut self, other: LiquidTickOutcome) {
        self.chunks_simulated += other.chunks_simulated;
        self.transfers += other.transfers;
        self.evaporations += other.evaporations;
        self.reactions += other.reactions;
        self.touched_chunks.extend(other.touched_chunks);
        self.splashes.extend(other.splashes);
    }
}

pub struct LiquidSimulator {
    config: Arc<LiquidConfig>,
    rng: fastrand::Rng,
    pool: TaskManager<LiquidTickOutcome>,
    chunks_per_worker: usize,
    splashes: SplashQueue,
}

impl LiquidSimulator {
    pub fn new(liquids: &LiquidConfig, threading: &ThreadingConfig, seed: u64) -> Self {
        Self {
            config: Arc::new(liquids.clone()),
            rng: fastrand::Rng::with_seed(seed),
            pool: TaskManager::new("liquid", threading.max_liquid_workers),
            chunks_per_worker: threading.chunks_per_worker.max(1),
            splashes: SplashQueue::new(liquids.splash_capacity),
        }
    }

    /// Runs one tick over every chunk that holds liquid.
    ///
    /// Splash events are moved into the bounded splash queue; the returned outcome
    /// keeps only the counters and the touched chunks.
    pub fn step(&mut self, world: &Arc<World>) -> LiquidTickOutcome {
        let mut outcome = LiquidTickOutcome::default();

        let liquid_chunks: Vec<ChunkCoordinate> = world
            .chunk_coordinates()
            .iter()
            .copied()
            .filter(|c| world.get_chunk_at(*c).is_some_and(|chunk| chunk.get().has_liquid()))
            .collect();
        if liquid_chunks.is_empty() {
            return outcome;
        }

        let workers = self
            .pool
            .scale_to(liquid_chunks.len().div_ceil(self.chunks_per_worker));

        for class in 0..PARITY_CLASSES {
            let members: Vec<ChunkCoordinate> = liquid_chunks
                .iter()
                .copied()
                .filter(|c| c.parity_class() == class)
                .collect();
            if members.is_empty() {
                continue;
            }

            let mut groups = vec![Vec::new(); workers.min(members.len())];
            let group_count = groups.len();
            for (i, coordinate) in members.into_iter().enumerate() {
                groups[i % group_count].push(coordinate);
            }
            for group in groups {
                self.pool.publish_task(Box::new(LiquidChunkTask::new(
                    world.clone(),
                    group,
                    self.config.clone(),
                    self.rng.u64(..),
                )));
            }
            // Classes must not overlap in time.
            self.pool.run_to_completion(&mut outcome);
        }

        for splash in std::mem::take(&mut outcome.splashes) {
            self.splashes.push(splash);
        }

        debug!(
            "Liquid tick: {} chunks on {} workers, {} transfers, {} evaporations, {} reactions",
            outcome.chunks_simulated,
            workers,
            outcome.transfers,
            outcome.evaporations,
            outcome.reactions
        );
        outcome
    }

    /// Removes and returns every queued splash event.
    pub fn drain_splashes(&mut self) -> Vec<SplashEvent> {
        self.splashes.drain()
    }

    pub fn splashes_dropped(&self) -> u64 {
        self.splashes.dropped()
    }

    pub fn active_workers(&self) -> usize {
        self.pool.active_workers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::config::WorldConfig;
    use crate::engine_state::voxels::block::block_type::{BlockType, LiquidType};
    use crate::engine_state::voxels::coordinates::GlobalVoxelCoordinate;
    use crate::engine_state::voxels::generation::FlatGenerator;

    fn world(chunks_x: i32, chunks_z: i32) -> Arc<World> {
        Arc::new(World::new(
            &WorldConfig {
                chunks_x,
                chunks_y: 1,
                chunks_z,
                seed: 0,
            },
            &FlatGenerator {
                ground_height: 1,
                block: BlockType::STONE,
            },
        ))
    }

    fn threading(max: usize, per_worker: usize) -> ThreadingConfig {
        ThreadingConfig {
            max_liquid_workers: max,
            chunks_per_worker: per_worker,
            ..ThreadingConfig::default()
        }
    }

    #[test]
    fn test_workers_follow_liquid_chunk_count() {
        let world = world(4, 4);
        let mut simulator = LiquidSimulator::new(&LiquidConfig::default(), &threading(3, 2), 1);

        simulator.step(&world);
        assert_eq!(simulator.active_workers(), 1);

        for x in 0..4 {
            for z in 0..2 {
                let p = GlobalVoxelCoordinate::new(x * 16 + 8, 4, z * 16 + 8);
                world
                    .modify_voxel(p, |v| v.set_liquid(LiquidType::WATER, 8))
                    .unwrap();
            }
        }
        let outcome = simulator.step(&world);
        assert_eq!(outcome.chunks_simulated, 8);
        // ceil(8 / 2) = 4, clamped to the maximum of 3.
        assert_eq!(simulator.active_workers(), 3);
    }

    #[test]
    fn test_liquid_conserved_across_chunk_borders() {
        let world = world(2, 2);
        let config = LiquidConfig {
            evaporation_chance: 0.0,
            ..LiquidConfig::default()
        };
        let mut simulator = LiquidSimulator::new(&config, &threading(4, 1), 9);

        // Straddle the corner where all four chunks meet.
        for (x, z) in [(15, 15), (16, 15), (15, 16), (16, 16)] {
            world
                .modify_voxel(GlobalVoxelCoordinate::new(x, 3, z), |v| {
                    v.set_liquid(LiquidType::WATER, 8)
                })
                .unwrap();
        }
        let total = world.total_liquid();
        for _ in 0..20 {
            let outcome = simulator.step(&world);
            assert_eq!(world.total_liquid(), total);
            assert!(outcome.touched_chunks.len() <= 4);
        }
    }

    #[test]
    fn test_splashes_are_queued_and_bounded() {
        let world = world(1, 1);
        let config = LiquidConfig {
            evaporation_chance: 0.0,
            splash_capacity: 1,
            ..LiquidConfig::default()
        };
        let mut simulator = LiquidSimulator::new(&config, &threading(1, 1), 3);
        for x in [2, 6, 10] {
            world
                .modify_voxel(GlobalVoxelCoordinate::new(x, 5, 2), |v| {
                    v.set_liquid(LiquidType::WATER, 8)
                })
                .unwrap();
        }

        simulator.step(&world);
        assert_eq!(simulator.drain_splashes().len(), 1);
        assert_eq!(simulator.splashes_dropped(), 2);
    }
}
