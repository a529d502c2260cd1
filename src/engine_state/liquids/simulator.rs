//! The per-chunk liquid automaton.
//!
//! A chunk is simulated while its own write lock is held. Voxels in neighbouring chunks
//! are touched one at a time, each under a short lock on that neighbour. Chunks that are
//! simulated at the same moment never share a face, so no two workers ever hold each
//! other's chunks.
//!
//! Slices are processed from the bottom up. Inside a slice the cells are visited in a
//! freshly shuffled order every tick so no direction is favoured.

use std::sync::RwLockWriteGuard;

use log::trace;

use crate::engine_state::config::LiquidConfig;
use crate::engine_state::voxels::block::block_side::{VoxelFace, LATERAL_FACES};
use crate::engine_state::voxels::block::block_type::{BlockType, LiquidType};
use crate::engine_state::voxels::block::Voxel;
use crate::engine_state::voxels::chunk::{
    VoxelChunk, CHUNK_PLANE_SIZE, CHUNK_SIZE_X, CHUNK_SIZE_Y,
};
use crate::engine_state::voxels::coordinates::{
    ChunkCoordinate, GlobalVoxelCoordinate, LocalVoxelCoordinate,
};
use crate::engine_state::voxels::world::World;

use super::splash::SplashEvent;
use super::LiquidTickOutcome;

const F: VoxelFace = VoxelFace::FRONT;
const B: VoxelFace = VoxelFace::BACK;
const L: VoxelFace = VoxelFace::LEFT;
const R: VoxelFace = VoxelFace::RIGHT;

/// The lateral orders a voxel may try its neighbours in: the four rotations of the
/// clockwise and of the counter-clockwise walk around the voxel.
pub const NEIGHBOR_PERMUTATIONS: [[VoxelFace; 4]; 8] = [
    [F, R, B, L],
    [R, B, L, F],
    [B, L, F, R],
    [L, F, R, B],
    [F, L, B, R],
    [L, B, R, F],
    [B, R, F, L],
    [R, F, L, B],
];

/// Result of offering liquid to a neighbouring voxel.
enum Flow {
    Blocked,
    Moved(u8),
    Reacted(BlockType),
}

/// Access to the voxels of one locked chunk and, through short locks, its neighbours.
struct ChunkCursor<'a> {
    world: &'a World,
    coordinate: ChunkCoordinate,
    chunk: RwLockWriteGuard<'a, VoxelChunk>,
}

impl ChunkCursor<'_> {
    /// Applies `change` to the voxel at `position` and stores the result.
    ///
    /// Returns `None` when the position lies outside the world.
    fn update<T>(
        &mut self,
        position: GlobalVoxelCoordinate,
        outcome: &mut LiquidTickOutcome,
        change: impl FnOnce(&mut Voxel) -> T,
    ) -> Option<T> {
        let (chunk_coordinate, local) = position.decompose();
        if chunk_coordinate == self.coordinate {
            let mut voxel = self.chunk.get(local)?;
            let result = change(&mut voxel);
            self.chunk.set(local, voxel);
            return Some(result);
        }

        let neighbor = self.world.get_chunk_at(chunk_coordinate)?;
        let mut neighbor = neighbor.get_mut();
        let mut voxel = neighbor.get(local)?;
        let result = change(&mut voxel);
        if neighbor.set(local, voxel) && neighbor.needs_rebuild() {
            outcome.touched_chunks.insert(chunk_coordinate);
        }
        Some(result)
    }

    fn own(&self, local: LocalVoxelCoordinate) -> Voxel {
        self.chunk.voxel(local)
    }

    fn set_own(&mut self, local: LocalVoxelCoordinate, voxel: Voxel) {
        self.chunk.set(local, voxel);
    }
}

/// Offers up to `amount` of `liquid` to `target`, or reacts with a foreign liquid.
fn offer(target: &mut Voxel, liquid: LiquidType, amount: u8, only_if_lower: Option<u8>) -> Flow {
    if target.is_solid() {
        return Flow::Blocked;
    }
    if target.has_liquid() && target.liquid_type() != liquid {
        return match liquid.reaction_with(target.liquid_type()) {
            Some(product) => {
                target.clear_liquid();
                Flow::Reacted(product)
            }
            None => Flow::Blocked,
        };
    }
    if let Some(level) = only_if_lower {
        if target.liquid_level() >= level {
            return Flow::Blocked;
        }
    }
    let moved = amount.min(target.spare_capacity());
    if moved == 0 {
        return Flow::Blocked;
    }
    target.set_liquid(liquid, target.liquid_level() + moved);
    Flow::Moved(moved)
}

/// Runs one tick of the automaton over a chunk.
///
/// # Returns
/// `false` if the chunk does not exist.
pub fn simulate_chunk(
    world: &World,
    coordinate: ChunkCoordinate,
    config: &LiquidConfig,
    rng: &mut fastrand::Rng,
    outcome: &mut LiquidTickOutcome,
) -> bool {
    let Some(resource) = world.get_chunk_at(coordinate) else {
        return false;
    };
    let mut cursor = ChunkCursor {
        world,
        coordinate,
        chunk: resource.get_mut(),
    };

    let mut order: Vec<u16> = (0..CHUNK_PLANE_SIZE as u16).collect();
    for y in 0..CHUNK_SIZE_Y {
        if !cursor.chunk.is_liquid_present(y) {
            continue;
        }
        rng.shuffle(&mut order);
        for &offset in &order {
            let offset = offset as usize;
            let local = LocalVoxelCoordinate::new(offset % CHUNK_SIZE_X, y, offset / CHUNK_SIZE_X);
            let voxel = cursor.own(local);
            if voxel.is_solid() || !voxel.has_liquid() {
                continue;
            }
            update_voxel(&mut cursor, local, voxel, config, rng, outcome);
        }
    }

    if cursor.chunk.needs_rebuild() {
        outcome.touched_chunks.insert(coordinate);
    }
    outcome.chunks_simulated += 1;
    true
}

fn update_voxel(
    cursor: &mut ChunkCursor<'_>,
    local: LocalVoxelCoordinate,
    mut voxel: Voxel,
    config: &LiquidConfig,
    rng: &mut fastrand::Rng,
    outcome: &mut LiquidTickOutcome,
) {
    let position = GlobalVoxelCoordinate::from_parts(cursor.coordinate, local);
    let liquid = voxel.liquid_type();
    let mut level = voxel.liquid_level();

    if level <= config.evaporation_threshold && rng.f32() < config.evaporation_chance {
        voxel.clear_liquid();
        voxel.set_block(liquid.evaporation_residue());
        cursor.set_own(local, voxel);
        outcome.evaporations += 1;
        return;
    }

    // Gravity. Below the bottom of the world counts as solid.
    let below = position.neighbor(VoxelFace::BOTTOM);
    let flow = cursor
        .update(below, outcome, |under| offer(under, liquid, level, None))
        .unwrap_or(Flow::Blocked);
    match flow {
        Flow::Blocked => {}
        Flow::Moved(moved) => {
            level -= moved;
            record_transfer(config, below, liquid, moved, outcome);
            if level == 0 {
                voxel.clear_liquid();
                cursor.set_own(local, voxel);
                return;
            }
        }
        Flow::Reacted(product) => {
            react(cursor, local, voxel, product, outcome);
            return;
        }
    }

    if level > 1 {
        let rate = match liquid {
            LiquidType::LAVA => config.lava_spread_rate,
            _ => config.water_spread_rate,
        };
        let amount = (level as f32 * rate).floor() as u8;
        let faces = &NEIGHBOR_PERMUTATIONS[rng.usize(..NEIGHBOR_PERMUTATIONS.len())];
        debug_assert!(faces.iter().all(|f| LATERAL_FACES.contains(f)));

        for &face in faces {
            let target = position.neighbor(face);
            let flow = cursor
                .update(target, outcome, |neighbor| {
                    offer(neighbor, liquid, amount, Some(level))
                })
                .unwrap_or(Flow::Blocked);
            match flow {
                Flow::Blocked => continue,
                Flow::Moved(moved) => {
                    level -= moved;
                    record_transfer(config, target, liquid, moved, outcome);
                    break;
                }
                Flow::Reacted(product) => {
                    react(cursor, local, voxel, product, outcome);
                    return;
                }
            }
        }
    }

    voxel.set_liquid(liquid, level);
    cursor.set_own(local, voxel);
}

/// The initiating voxel loses its liquid and turns into the reaction product.
fn react(
    cursor: &mut ChunkCursor<'_>,
    local: LocalVoxelCoordinate,
    mut voxel: Voxel,
    product: BlockType,
    outcome: &mut LiquidTickOutcome,
) {
    voxel.clear_liquid();
    voxel.set_block(product);
    cursor.set_own(local, voxel);
    outcome.reactions += 1;
    trace!(
        "Liquids reacted at {} into {:?}",
        GlobalVoxelCoordinate::from_parts(cursor.coordinate, local),
        product
    );
}

fn record_transfer(
    config: &LiquidConfig,
    target: GlobalVoxelCoordinate,
    liquid: LiquidType,
    moved: u8,
    outcome: &mut LiquidTickOutcome,
) {
    outcome.transfers += 1;
    if moved >= config.splash_threshold {
        outcome.splashes.push(SplashEvent {
            position: target,
            liquid,
            amount: moved,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::config::WorldConfig;
    use crate::engine_state::voxels::block::MAX_LIQUID_LEVEL;
    use crate::engine_state::voxels::generation::{EmptyGenerator, FlatGenerator};

    fn single_chunk(ground_height: i32) -> World {
        let config = WorldConfig {
            chunks_x: 1,
            chunks_y: 1,
            chunks_z: 1,
            seed: 0,
        };
        if ground_height > 0 {
            World::new(
                &config,
                &FlatGenerator {
                    ground_height,
                    block: BlockType::STONE,
                },
            )
        } else {
            World::new(&config, &EmptyGenerator)
        }
    }

    fn no_evaporation() -> LiquidConfig {
        LiquidConfig {
            evaporation_chance: 0.0,
            ..LiquidConfig::default()
        }
    }

    fn put(world: &World, p: GlobalVoxelCoordinate, v: impl FnOnce(&mut Voxel)) {
        world.modify_voxel(p, v).unwrap();
    }

    fn tick(world: &World, config: &LiquidConfig, rng: &mut fastrand::Rng) -> LiquidTickOutcome {
        let mut outcome = LiquidTickOutcome::default();
        simulate_chunk(world, ChunkCoordinate::new(0, 0, 0), config, rng, &mut outcome);
        outcome
    }

    #[test]
    fn test_permutations_are_distinct_orders_of_lateral_faces() {
        for (i, a) in NEIGHBOR_PERMUTATIONS.iter().enumerate() {
            for face in LATERAL_FACES {
                assert!(a.contains(&face));
            }
            for b in &NEIGHBOR_PERMUTATIONS[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_full_voxel_falls_into_empty_space() {
        let world = single_chunk(1);
        let top = GlobalVoxelCoordinate::new(5, 3, 5);
        put(&world, top, |v| v.set_liquid(LiquidType::WATER, MAX_LIQUID_LEVEL));

        let mut rng = fastrand::Rng::with_seed(1);
        let outcome = tick(&world, &no_evaporation(), &mut rng);

        assert!(!world.get_voxel(top).unwrap().has_liquid());
        let below = world.get_voxel(top.offset(0, -1, 0)).unwrap();
        assert_eq!(below.liquid_level(), MAX_LIQUID_LEVEL);
        assert_eq!(outcome.transfers, 1);
        // A full voxel moving at once splashes.
        assert_eq!(outcome.splashes.len(), 1);
    }

    #[test]
    fn test_water_column_settles_at_the_bottom() {
        let world = single_chunk(1);
        let config = no_evaporation();
        let column: Vec<_> = (1..6).map(|y| GlobalVoxelCoordinate::new(8, y, 8)).collect();
        put(&world, column[4], |v| v.set_liquid(LiquidType::WATER, MAX_LIQUID_LEVEL));

        let mut rng = fastrand::Rng::with_seed(2);
        // Enough ticks to fall four voxels; the water cannot spread while falling
        // because a full column always empties downwards first.
        for _ in 0..4 {
            tick(&world, &config, &mut rng);
        }
        assert_eq!(world.get_voxel(column[0]).unwrap().liquid_level(), MAX_LIQUID_LEVEL);
        for p in &column[1..] {
            assert!(!world.get_voxel(*p).unwrap().has_liquid());
        }
    }

    #[test]
    fn test_partial_transfer_into_same_liquid() {
        let world = single_chunk(1);
        let upper = GlobalVoxelCoordinate::new(2, 2, 2);
        let lower = GlobalVoxelCoordinate::new(2, 1, 2);
        put(&world, lower, |v| v.set_liquid(LiquidType::WATER, 6));
        put(&world, upper, |v| v.set_liquid(LiquidType::WATER, 5));
        // Wall the pair in so nothing spreads sideways.
        for face in LATERAL_FACES {
            put(&world, lower.neighbor(face), |v| v.set_block(BlockType::STONE));
            put(&world, upper.neighbor(face), |v| v.set_block(BlockType::STONE));
        }

        let mut rng = fastrand::Rng::with_seed(3);
        tick(&world, &no_evaporation(), &mut rng);
        assert_eq!(world.get_voxel(lower).unwrap().liquid_level(), MAX_LIQUID_LEVEL);
        assert_eq!(world.get_voxel(upper).unwrap().liquid_level(), 3);
    }

    #[test]
    fn test_lava_over_water_turns_to_stone() {
        let world = single_chunk(1);
        let lava = GlobalVoxelCoordinate::new(4, 2, 4);
        let water = GlobalVoxelCoordinate::new(4, 1, 4);
        put(&world, water, |v| v.set_liquid(LiquidType::WATER, 3));
        put(&world, lava, |v| v.set_liquid(LiquidType::LAVA, 3));

        let mut rng = fastrand::Rng::with_seed(4);
        let config = LiquidConfig {
            evaporation_chance: 0.0,
            water_spread_rate: 0.0,
            ..LiquidConfig::default()
        };
        let outcome = tick(&world, &config, &mut rng);

        let lava_cell = world.get_voxel(lava).unwrap();
        let water_cell = world.get_voxel(water).unwrap();
        assert_eq!(lava_cell.block(), BlockType::STONE);
        assert!(!lava_cell.has_liquid());
        assert!(!water_cell.has_liquid());
        assert_eq!(outcome.reactions, 1);
    }

    #[test]
    fn test_shallow_liquid_evaporates_to_residue() {
        let world = single_chunk(1);
        let water = GlobalVoxelCoordinate::new(3, 1, 3);
        let lava = GlobalVoxelCoordinate::new(10, 1, 10);
        put(&world, water, |v| v.set_liquid(LiquidType::WATER, 1));
        put(&world, lava, |v| v.set_liquid(LiquidType::LAVA, 1));
        assert_eq!(world.total_liquid(), 2);

        let config = LiquidConfig {
            evaporation_chance: 1.0,
            ..LiquidConfig::default()
        };
        let mut rng = fastrand::Rng::with_seed(6);
        let outcome = tick(&world, &config, &mut rng);

        let water_cell = world.get_voxel(water).unwrap();
        assert!(!water_cell.has_liquid());
        assert_eq!(water_cell.block(), BlockType::AIR);
        let lava_cell = world.get_voxel(lava).unwrap();
        assert!(!lava_cell.has_liquid());
        assert_eq!(lava_cell.block(), BlockType::STONE);

        assert_eq!(outcome.evaporations, 2);
        assert_eq!(outcome.transfers, 0);
        assert_eq!(world.total_liquid(), 0);
    }

    #[test]
    fn test_spread_moves_half_to_one_lower_neighbor() {
        let world = single_chunk(1);
        let center = GlobalVoxelCoordinate::new(8, 1, 8);
        put(&world, center, |v| v.set_liquid(LiquidType::WATER, 8));

        let mut rng = fastrand::Rng::with_seed(5);
        let outcome = tick(&world, &no_evaporation(), &mut rng);

        // Half the level leaves for one neighbour; that neighbour may pass some of it on
        // later in the same tick, but never back to the centre.
        assert_eq!(world.get_voxel(center).unwrap().liquid_level(), 4);
        let wet_neighbors = LATERAL_FACES
            .iter()
            .filter(|f| world.get_voxel(center.neighbor(**f)).unwrap().has_liquid())
            .count();
        assert!(wet_neighbors >= 1);
        assert_eq!(world.total_liquid(), 8);
        assert!(outcome.transfers >= 1);
    }

    #[test]
    fn test_liquid_is_conserved_without_evaporation() {
        let world = single_chunk(1);
        let config = no_evaporation();
        let mut rng = fastrand::Rng::with_seed(6);
        let mut total = 0u64;
        for i in 0..40 {
            let p = GlobalVoxelCoordinate::new(rng.i32(0..16), rng.i32(1..16), rng.i32(0..16));
            let level = (i % MAX_LIQUID_LEVEL as usize) as u8 + 1;
            if !world.get_voxel(p).unwrap().has_liquid() {
                put(&world, p, |v| v.set_liquid(LiquidType::WATER, level));
                total += level as u64;
            }
        }
        assert_eq!(world.total_liquid(), total);

        // The edges of the world behave like walls, so nothing can leave.
        for _ in 0..25 {
            tick(&world, &config, &mut rng);
            assert_eq!(world.total_liquid(), total);
        }
    }

    #[test]
    fn test_levels_stay_in_range() {
        let world = single_chunk(0);
        let mut rng = fastrand::Rng::with_seed(7);
        for x in 0..16 {
            put(&world, GlobalVoxelCoordinate::new(x, 10, 3), |v| {
                v.set_liquid(LiquidType::WATER, MAX_LIQUID_LEVEL)
            });
        }
        for _ in 0..10 {
            tick(&world, &LiquidConfig::default(), &mut rng);
            let chunk = world.get_chunk_at(ChunkCoordinate::new(0, 0, 0)).unwrap().get();
            for (_, voxel) in crate::engine_state::voxels::chunk::chunk_iteration::LiquidVoxelIterator::new(&chunk) {
                assert!(voxel.is_consistent());
            }
        }
    }
}
