//! Worker-pool tasks for the liquid simulation: one task simulates a group of chunks of
//! the same parity class with its own seeded random source.

use std::sync::Arc;

use crate::engine_state::config::LiquidConfig;
use crate::engine_state::task_management::task::{Task, TaskResult};
use crate::engine_state::voxels::coordinates::ChunkCoordinate;
use crate::engine_state::voxels::world::World;

use super::simulator::simulate_chunk;
use super::LiquidTickOutcome;

pub struct LiquidChunkTask {
    world: Arc<World>,
    chunks: Vec<ChunkCoordinate>,
    config: Arc<LiquidConfig>,
    seed: u64,
}

impl LiquidChunkTask {
    pub fn new(
        world: Arc<World>,
        chunks: Vec<ChunkCoordinate>,
        config: Arc<LiquidConfig>,
        seed: u64,
    ) -> Self {
        Self {
            world,
            chunks,
            config,
            seed,
        }
    }
}

impl Task<LiquidTickOutcome> for LiquidChunkTask {
    fn process(&self) -> Box<dyn TaskResult<LiquidTickOutcome> + Send> {
        let mut rng = fastrand::Rng::with_seed(self.seed);
        let mut outcome = LiquidTickOutcome::default();
        for &coordinate in &self.chunks {
            simulate_chunk(&self.world, coordinate, &self.config, &mut rng, &mut outcome);
        }
        Box::new(LiquidChunkResult(outcome))
    }
}

pub struct LiquidChunkResult(LiquidTickOutcome);

impl TaskResult<LiquidTickOutcome> for LiquidChunkResult {
    fn handle_result(
        self: Box<Self>,
        context: &mut LiquidTickOutcome,
    ) -> Vec<Box<dyn Task<LiquidTickOutcome> + Send>> {
        context.merge(self.0);
        Vec::new()
    }
}
