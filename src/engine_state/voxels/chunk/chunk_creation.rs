//! # Chunk Creation Module
//!
//! This module provides a builder that fills a chunk one voxel at a time in storage
//! order. World generators use it so they never have to know the storage layout: they
//! simply push cells while walking X, then Z, then Y.

use super::{
    ChunkCoordinate, LocalVoxelCoordinate, VoxelChunk, CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z,
    CHUNK_VOLUME,
};
use crate::engine_state::voxels::block::{block_type::BlockType, Voxel};

/// A builder for populating a chunk in storage order.
///
/// Pushing more than `CHUNK_VOLUME` cells is ignored; cells not pushed by the time
/// `return_chunk` is called stay empty.
pub struct ChunkCreationIterator {
    coordinate: ChunkCoordinate,
    voxels: Vec<Voxel>,
    /// Position of the next cell to be pushed.
    local_x: usize,
    local_y: usize,
    local_z: usize,
}

impl ChunkCreationIterator {
    pub fn new(coordinate: ChunkCoordinate) -> Self {
        ChunkCreationIterator {
            coordinate,
            voxels: Vec::with_capacity(CHUNK_VOLUME),
            local_x: 0,
            local_y: 0,
            local_z: 0,
        }
    }

    /// The chunk-relative position the next pushed cell will occupy, or `None` once the
    /// chunk is full.
    pub fn next_position(&self) -> Option<LocalVoxelCoordinate> {
        if self.voxels.len() >= CHUNK_VOLUME {
            return None;
        }
        Some(LocalVoxelCoordinate::new(self.local_x, self.local_y, self.local_z))
    }

    /// Finalizes the chunk creation and returns the constructed `VoxelChunk`.
    pub fn return_chunk(mut self) -> VoxelChunk {
        self.voxels.resize(CHUNK_VOLUME, Voxel::EMPTY);
        VoxelChunk::from_voxels(self.coordinate, self.voxels)
    }

    pub fn push_block_type(&mut self, block_type: BlockType) {
        self.push_voxel(Voxel::new(block_type));
    }

    /// Adds a cell at the current position and advances the position.
    pub fn push_voxel(&mut self, voxel: Voxel) {
        if self.voxels.len() >= CHUNK_VOLUME {
            return;
        }
        self.voxels.push(voxel);

        self.local_x += 1;
        if self.local_x == CHUNK_SIZE_X {
            self.local_x = 0;
            self.local_z += 1;
            if self.local_z == CHUNK_SIZE_Z {
                self.local_z = 0;
                self.local_y += 1;
                debug_assert!(self.local_y <= CHUNK_SIZE_Y);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::block_type::LiquidType;

    #[test]
    fn test_positions_follow_storage_order() {
        let mut cci = ChunkCreationIterator::new(ChunkCoordinate::new(0, 0, 0));
        assert_eq!(cci.next_position(), Some(LocalVoxelCoordinate::new(0, 0, 0)));
        for _ in 0..CHUNK_SIZE_X {
            cci.push_block_type(BlockType::AIR);
        }
        assert_eq!(cci.next_position(), Some(LocalVoxelCoordinate::new(0, 0, 1)));
        for _ in CHUNK_SIZE_X..CHUNK_SIZE_X * CHUNK_SIZE_Z {
            cci.push_block_type(BlockType::AIR);
        }
        assert_eq!(cci.next_position(), Some(LocalVoxelCoordinate::new(0, 1, 0)));
    }

    #[test]
    fn test_pushed_cells_land_where_reported() {
        let mut cci = ChunkCreationIterator::new(ChunkCoordinate::new(0, 0, 0));
        let mut target = None;
        while let Some(position) = cci.next_position() {
            if position == LocalVoxelCoordinate::new(5, 2, 7) {
                target = Some(position);
                cci.push_voxel(Voxel::with_liquid(LiquidType::WATER, 3));
            } else {
                cci.push_block_type(BlockType::AIR);
            }
        }
        let chunk = cci.return_chunk();
        let target = target.unwrap();
        assert_eq!(chunk.voxel(target).liquid_level(), 3);
        assert!(chunk.is_liquid_present(2));
        assert!(!chunk.is_liquid_present(1));
    }

    #[test]
    fn test_partial_chunk_is_padded() {
        let mut cci = ChunkCreationIterator::new(ChunkCoordinate::new(0, 0, 0));
        cci.push_block_type(BlockType::DIRT);
        let chunk = cci.return_chunk();
        assert_eq!(chunk.voxel(LocalVoxelCoordinate::new(0, 0, 0)).block(), BlockType::DIRT);
        assert!(chunk.voxel(LocalVoxelCoordinate::new(1, 0, 0)).is_empty());
    }
}
