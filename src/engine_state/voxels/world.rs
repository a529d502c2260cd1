//! # World Module
//!
//! This module provides the `World` struct: the fixed grid of chunks that makes up the
//! voxel world.
//!
//! ## Architecture
//!
//! The chunk map is populated once, when the world is created, and never changes shape
//! afterwards. That makes the map itself safe to read from any thread without locking;
//! only the chunks inside it are guarded, each by its own `MtResource`.
//!
//! Chunks occupy chunk coordinates `0..chunks_x`, `0..chunks_y` and `0..chunks_z`.
//!
//! ## Performance Considerations
//!
//! - Chunk lookup is O(1) using a hash map
//! - Voxel reads lock a single chunk for reading, briefly
//! - The world bounding box is computed once and cached

use crate::core::MtResource;
use crate::engine_state::config::WorldConfig;
use crate::engine_state::error::{WorldError, WorldResult};
use crate::engine_state::spatial::bounds::BoundingBox;
use crate::engine_state::voxels::block::Voxel;
use crate::engine_state::voxels::chunk::{VoxelChunk, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};
use crate::engine_state::voxels::coordinates::{ChunkCoordinate, GlobalVoxelCoordinate};
use crate::engine_state::voxels::generation::ChunkGenerator;
use cgmath::Point3;
use log::info;
use std::collections::HashMap;

/// A voxel world composed of a fixed grid of chunks.
///
/// # Examples
///
/// ```
/// use voxel_world::engine_state::config::WorldConfig;
/// use voxel_world::engine_state::voxels::generation::EmptyGenerator;
/// use voxel_world::engine_state::voxels::coordinates::GlobalVoxelCoordinate;
/// use voxel_world::engine_state::voxels::world::World;
///
/// let config = WorldConfig { chunks_x: 2, chunks_y: 1, chunks_z: 2, seed: 0 };
/// let world = World::new(&config, &EmptyGenerator);
///
/// assert_eq!(world.chunk_count(), 4);
/// assert!(world.get_voxel(GlobalVoxelCoordinate::new(0, 0, 0)).is_some());
/// assert!(world.get_voxel(GlobalVoxelCoordinate::new(-1, 0, 0)).is_none());
/// ```
pub struct World {
    /// A mapping from chunk coordinates to chunk data.
    chunks: HashMap<ChunkCoordinate, MtResource<VoxelChunk>>,
    /// Chunk coordinates in ascending order, for deterministic iteration.
    coordinates: Vec<ChunkCoordinate>,
    bounds: BoundingBox,
}

impl World {
    /// Creates the chunk grid described by `config`, asking `generator` for the contents
    /// of every chunk.
    pub fn new(config: &WorldConfig, generator: &dyn ChunkGenerator) -> Self {
        let mut chunks = HashMap::new();
        let mut coordinates = Vec::new();

        for y in 0..config.chunks_y.max(0) {
            for z in 0..config.chunks_z.max(0) {
                for x in 0..config.chunks_x.max(0) {
                    let coordinate = ChunkCoordinate::new(x, y, z);
                    chunks.insert(coordinate, MtResource::new(generator.generate(coordinate)));
                    coordinates.push(coordinate);
                }
            }
        }
        coordinates.sort();

        let bounds = BoundingBox::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(
                (config.chunks_x.max(0) as usize * CHUNK_SIZE_X) as f32,
                (config.chunks_y.max(0) as usize * CHUNK_SIZE_Y) as f32,
                (config.chunks_z.max(0) as usize * CHUNK_SIZE_Z) as f32,
            ),
        );

        info!(
            "Created world of {}x{}x{} chunks ({} total)",
            config.chunks_x,
            config.chunks_y,
            config.chunks_z,
            coordinates.len()
        );

        World {
            chunks,
            coordinates,
            bounds,
        }
    }

    /// Returns the chunk at `coordinate`, or `None` outside the grid.
    pub fn get_chunk_at(&self, coordinate: ChunkCoordinate) -> Option<&MtResource<VoxelChunk>> {
        self.chunks.get(&coordinate)
    }

    /// Returns the chunk that holds `position`, or `None` outside the grid.
    pub fn get_chunk_containing(
        &self,
        position: GlobalVoxelCoordinate,
    ) -> Option<&MtResource<VoxelChunk>> {
        self.chunks.get(&position.chunk())
    }

    /// All chunk coordinates, ascending.
    pub fn chunk_coordinates(&self) -> &[ChunkCoordinate] {
        &self.coordinates
    }

    pub fn chunk_count(&self) -> usize {
        self.coordinates.len()
    }

    /// The world-space box covering every chunk.
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Whether `position` lies inside some chunk.
    pub fn contains(&self, position: GlobalVoxelCoordinate) -> bool {
        self.chunks.contains_key(&position.chunk())
    }

    /// Reads the voxel at `position`.
    ///
    /// # Returns
    /// `None` when `position` lies outside the world.
    pub fn get_voxel(&self, position: GlobalVoxelCoordinate) -> Option<Voxel> {
        let (chunk, local) = position.decompose();
        self.chunks.get(&chunk)?.get().get(local)
    }

    /// Applies `change` to the voxel at `position` while holding its chunk's write lock.
    ///
    /// # Returns
    /// The previous and the stored voxel, or `OutOfBounds` when `position` lies outside
    /// the world.
    pub(crate) fn modify_voxel(
        &self,
        position: GlobalVoxelCoordinate,
        change: impl FnOnce(&mut Voxel),
    ) -> WorldResult<(Voxel, Voxel, bool)> {
        let (chunk_coordinate, local) = position.decompose();
        let chunk = self
            .chunks
            .get(&chunk_coordinate)
            .ok_or(WorldError::OutOfBounds(position))?;

        let mut chunk = chunk.get_mut();
        let previous = chunk.voxel(local);
        chunk.modify(local, change);
        let stored = chunk.voxel(local);
        let needs_rebuild = chunk.take_needs_rebuild();
        Ok((previous, stored, needs_rebuild))
    }

    /// Sum of all liquid levels in the world.
    pub fn total_liquid(&self) -> u64 {
        self.coordinates
            .iter()
            .filter_map(|c| self.chunks.get(c))
            .map(|chunk| chunk.get().total_liquid())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::{BlockType, LiquidType};
    use crate::engine_state::voxels::generation::{EmptyGenerator, FlatGenerator};

    fn config(x: i32, y: i32, z: i32) -> WorldConfig {
        WorldConfig {
            chunks_x: x,
            chunks_y: y,
            chunks_z: z,
            seed: 0,
        }
    }

    #[test]
    fn test_grid_is_populated_once() {
        let world = World::new(&config(3, 2, 1), &EmptyGenerator);
        assert_eq!(world.chunk_count(), 6);
        assert!(world.get_chunk_at(ChunkCoordinate::new(2, 1, 0)).is_some());
        assert!(world.get_chunk_at(ChunkCoordinate::new(3, 0, 0)).is_none());
        assert_eq!(world.bounds().max.x, (3 * CHUNK_SIZE_X) as f32);
    }

    #[test]
    fn test_out_of_range_lookups_yield_none() {
        let world = World::new(&config(1, 1, 1), &EmptyGenerator);
        assert!(world.get_voxel(GlobalVoxelCoordinate::new(0, -1, 0)).is_none());
        assert!(world
            .get_voxel(GlobalVoxelCoordinate::new(CHUNK_SIZE_X as i32, 0, 0))
            .is_none());
        assert!(!world.contains(GlobalVoxelCoordinate::new(0, 0, CHUNK_SIZE_Z as i32)));
    }

    #[test]
    fn test_modify_outside_world_is_an_error() {
        let world = World::new(&config(1, 1, 1), &EmptyGenerator);
        let result = world.modify_voxel(GlobalVoxelCoordinate::new(-5, 0, 0), |v| {
            v.set_block(BlockType::DIRT)
        });
        assert!(matches!(result, Err(WorldError::OutOfBounds(_))));
    }

    #[test]
    fn test_modify_reports_previous_value() {
        let world = World::new(
            &config(1, 1, 1),
            &FlatGenerator {
                ground_height: 1,
                block: BlockType::DIRT,
            },
        );
        let position = GlobalVoxelCoordinate::new(2, 1, 2);
        let (previous, stored, _) = world
            .modify_voxel(position, |v| v.set_liquid(LiquidType::WATER, 5))
            .unwrap();
        assert!(!previous.has_liquid());
        assert_eq!(stored.liquid_level(), 5);
        assert_eq!(world.total_liquid(), 5);
    }
}
