//! # Chunk Generation
//!
//! World generation is an external collaborator: the chunk store only asks a
//! `ChunkGenerator` for the initial contents of each chunk, once, when the world grid is
//! created. A handful of simple generators live here for tools, tests and the demo:
//!
//! - `EmptyGenerator`: every voxel is air
//! - `SolidGenerator`: every voxel is one solid block
//! - `FlatGenerator`: solid ground up to a fixed height, air above
//! - `PerlinGenerator`: 3D Perlin noise caves and overhangs

use noise::{NoiseFn, Perlin};

use super::block::block_type::BlockType;
use super::chunk::chunk_creation::ChunkCreationIterator;
use super::chunk::VoxelChunk;
use super::coordinates::{ChunkCoordinate, GlobalVoxelCoordinate};

/// Supplies the initial contents of a chunk.
pub trait ChunkGenerator: Send + Sync {
    fn generate(&self, coordinate: ChunkCoordinate) -> VoxelChunk;
}

/// Fills every chunk with air.
pub struct EmptyGenerator;

impl ChunkGenerator for EmptyGenerator {
    fn generate(&self, coordinate: ChunkCoordinate) -> VoxelChunk {
        VoxelChunk::empty(coordinate)
    }
}

/// Fills every chunk with a single solid block type.
pub struct SolidGenerator(pub BlockType);

impl ChunkGenerator for SolidGenerator {
    fn generate(&self, coordinate: ChunkCoordinate) -> VoxelChunk {
        fill_by_position(coordinate, |_| self.0)
    }
}

/// Solid `block` for every voxel with global `y < ground_height`, air above.
pub struct FlatGenerator {
    pub ground_height: i32,
    pub block: BlockType,
}

impl ChunkGenerator for FlatGenerator {
    fn generate(&self, coordinate: ChunkCoordinate) -> VoxelChunk {
        fill_by_position(coordinate, |position| {
            if position.y < self.ground_height {
                self.block
            } else {
                BlockType::AIR
            }
        })
    }
}

/// Threshold above which Perlin noise is considered solid for terrain generation.
pub const PERLIN_POSITIVE_THRESHOLD: f64 = 0.2;
/// Threshold below which Perlin noise is considered solid for terrain generation.
pub const PERLIN_NEGATIVE_THRESHOLD: f64 = -0.2;
/// Scaling factor applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;

/// Generates terrain by thresholding 3D Perlin noise.
///
/// Noise samples outside `[PERLIN_NEGATIVE_THRESHOLD, PERLIN_POSITIVE_THRESHOLD]` become
/// solid. The block type of a solid voxel is picked by a generator seeded from the chunk
/// coordinate, so a chunk always regenerates identically.
pub struct PerlinGenerator {
    perlin: Perlin,
    seed: u64,
}

impl PerlinGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            perlin: Perlin::new(seed as u32),
            seed,
        }
    }

    fn to_perlin_pos(pos: GlobalVoxelCoordinate, scale_factor: f64) -> [f64; 3] {
        [
            pos.x as f64 * scale_factor,
            pos.y as f64 * scale_factor,
            pos.z as f64 * scale_factor,
        ]
    }
}

impl ChunkGenerator for PerlinGenerator {
    fn generate(&self, coordinate: ChunkCoordinate) -> VoxelChunk {
        let chunk_seed = self.seed
            ^ (coordinate.x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (coordinate.y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
            ^ (coordinate.z as u64).wrapping_mul(0x1656_67B1_9E37_79F9);
        let mut rng = fastrand::Rng::with_seed(chunk_seed);

        fill_by_position(coordinate, |position| {
            let sample = self
                .perlin
                .get(Self::to_perlin_pos(position, PERLIN_SCALE_FACTOR));
            if (PERLIN_NEGATIVE_THRESHOLD..=PERLIN_POSITIVE_THRESHOLD).contains(&sample) {
                BlockType::AIR
            } else {
                BlockType::random_solid(&mut rng)
            }
        })
    }
}

fn fill_by_position(
    coordinate: ChunkCoordinate,
    mut block_at: impl FnMut(GlobalVoxelCoordinate) -> BlockType,
) -> VoxelChunk {
    let mut cci = ChunkCreationIterator::new(coordinate);
    while let Some(local) = cci.next_position() {
        let position = GlobalVoxelCoordinate::from_parts(coordinate, local);
        cci.push_block_type(block_at(position));
    }
    cci.return_chunk()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::chunk::CHUNK_SIZE_Y;
    use crate::engine_state::voxels::coordinates::LocalVoxelCoordinate;

    #[test]
    fn test_flat_generator_splits_at_ground_height() {
        let generator = FlatGenerator {
            ground_height: 3,
            block: BlockType::DIRT,
        };
        let chunk = generator.generate(ChunkCoordinate::new(0, 0, 0));
        assert!(chunk.voxel(LocalVoxelCoordinate::new(4, 2, 4)).is_solid());
        assert!(chunk.voxel(LocalVoxelCoordinate::new(4, 3, 4)).is_empty());

        let above = generator.generate(ChunkCoordinate::new(0, 1, 0));
        assert!(above
            .voxel(LocalVoxelCoordinate::new(0, 0, 0))
            .is_empty());
    }

    #[test]
    fn test_solid_generator_fills_every_slice() {
        let chunk = SolidGenerator(BlockType::STONE).generate(ChunkCoordinate::new(-1, 0, 0));
        assert!(chunk
            .voxel(LocalVoxelCoordinate::new(0, CHUNK_SIZE_Y - 1, 0))
            .is_solid());
    }

    #[test]
    fn test_perlin_generator_is_deterministic() {
        let generator = PerlinGenerator::new(11);
        let a = generator.generate(ChunkCoordinate::new(1, 0, 2));
        let b = generator.generate(ChunkCoordinate::new(1, 0, 2));
        assert_eq!(a.as_bytes(), b.as_bytes());
    }
}
