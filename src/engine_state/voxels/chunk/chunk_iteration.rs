//! # Chunk Iteration Module
//!
//! This module provides an iterator over every liquid-holding voxel of a chunk. It uses
//! the chunk's per-slice liquid mask to skip dry slices without touching their cells.

use super::{LocalVoxelCoordinate, VoxelChunk, CHUNK_PLANE_SIZE, CHUNK_SIZE_X, CHUNK_SIZE_Y};
use crate::engine_state::voxels::block::Voxel;

/// An iterator over all voxels holding liquid in a chunk, in storage order.
pub struct LiquidVoxelIterator<'a> {
    chunk_ref: &'a VoxelChunk,
    /// Current Y slice.
    slice: usize,
    /// Offset of the next cell to inspect inside the current slice.
    offset: usize,
}

impl<'a> LiquidVoxelIterator<'a> {
    pub fn new(chunk_ref: &'a VoxelChunk) -> Self {
        LiquidVoxelIterator {
            chunk_ref,
            slice: 0,
            offset: 0,
        }
    }
}

impl Iterator for LiquidVoxelIterator<'_> {
    type Item = (LocalVoxelCoordinate, Voxel);

    fn next(&mut self) -> Option<Self::Item> {
        while self.slice < CHUNK_SIZE_Y {
            if !self.chunk_ref.is_liquid_present(self.slice) {
                self.slice += 1;
                self.offset = 0;
                continue;
            }

            let cells = self.chunk_ref.slice(self.slice);
            while self.offset < CHUNK_PLANE_SIZE {
                let offset = self.offset;
                self.offset += 1;
                let voxel = cells[offset];
                if voxel.has_liquid() {
                    let position = LocalVoxelCoordinate::new(
                        offset % CHUNK_SIZE_X,
                        self.slice,
                        offset / CHUNK_SIZE_X,
                    );
                    return Some((position, voxel));
                }
            }

            self.slice += 1;
            self.offset = 0;
        }
        None
    }
}
