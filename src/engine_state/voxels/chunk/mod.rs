//! # Chunk Module
//!
//! This module provides the `VoxelChunk` struct: a fixed-size dense 3D grid of voxel
//! cells plus the per-slice bookkeeping the liquid simulator and the rebuild worker need.
//!
//! ## Storage Layout
//!
//! Cells are stored slice by slice along Y. Inside a slice, X varies fastest, then Z:
//!
//! `index = x + CHUNK_SIZE_X * z + CHUNK_PLANE_SIZE * y`
//!
//! so one horizontal slice is a contiguous run of `CHUNK_PLANE_SIZE` cells. That is the
//! unit the liquid simulator works on and the unit the dirty tracking is kept at.
//!
//! ## Slice Tracking
//!
//! * `liquid_present` - one bit per Y slice, set while any cell in the slice holds
//!   liquid. Kept in sync by every mutation so the simulator can skip dry slices.
//! * `dirty_slices` - one bit per Y slice touched since the last rebuild.
//!
//! ### Performance Characteristics
//! - **Cell Lookup**: O(1)
//! - **Liquid presence check**: O(1) per slice
//! - **Memory Usage**: 5 bytes per cell plus a few bytes per slice

use bitvec::prelude::{BitSlice, BitVec};
use cgmath::Point3;

use super::block::block_type::{BlockType, LiquidType};
use super::block::Voxel;
use super::coordinates::{ChunkCoordinate, GlobalVoxelCoordinate, LocalVoxelCoordinate};
use crate::engine_state::spatial::bounds::BoundingBox;

pub mod chunk_creation;
pub mod chunk_iteration;

/// Width of a chunk in voxels.
pub const CHUNK_SIZE_X: usize = 16;
/// Height of a chunk in voxels (number of Y slices).
pub const CHUNK_SIZE_Y: usize = 16;
/// Depth of a chunk in voxels.
pub const CHUNK_SIZE_Z: usize = 16;
/// Number of voxels in one horizontal slice.
pub const CHUNK_PLANE_SIZE: usize = CHUNK_SIZE_X * CHUNK_SIZE_Z;
/// Number of voxels in a chunk.
pub const CHUNK_VOLUME: usize = CHUNK_PLANE_SIZE * CHUNK_SIZE_Y;

/// A fixed-size block of voxels forming the unit of storage and rebuilds.
///
/// A chunk exclusively owns its cell array. Its origin is its chunk coordinate times the
/// chunk dimensions, and its bounding box is derived from that once at construction.
#[derive(Clone, Debug)]
pub struct VoxelChunk {
    /// The position of this chunk in chunk coordinates (not voxel coordinates).
    coordinate: ChunkCoordinate,

    voxels: Vec<Voxel>,

    /// One bit per Y slice: set while the slice holds any liquid.
    liquid_present: BitVec,

    /// Number of liquid cells per Y slice, backing `liquid_present`.
    liquid_counts: [u16; CHUNK_SIZE_Y],

    /// One bit per Y slice: set when the slice changed since the last rebuild.
    dirty_slices: BitVec,

    /// Set by any mutation, cleared when the owner queues the chunk for a rebuild.
    needs_rebuild: bool,

    bounding_box: BoundingBox,
}

impl VoxelChunk {
    /// Creates a new, completely empty chunk.
    pub fn empty(coordinate: ChunkCoordinate) -> Self {
        Self::from_voxels(coordinate, vec![Voxel::EMPTY; CHUNK_VOLUME])
    }

    /// Creates a chunk from a full cell array in storage order.
    ///
    /// # Panics
    /// Panics in debug builds if `voxels.len() != CHUNK_VOLUME`.
    pub(crate) fn from_voxels(coordinate: ChunkCoordinate, voxels: Vec<Voxel>) -> Self {
        debug_assert_eq!(voxels.len(), CHUNK_VOLUME);

        let mut liquid_counts = [0u16; CHUNK_SIZE_Y];
        for (index, voxel) in voxels.iter().enumerate() {
            if voxel.has_liquid() {
                liquid_counts[index / CHUNK_PLANE_SIZE] += 1;
            }
        }
        let liquid_present = liquid_counts.iter().map(|&count| count > 0).collect();

        let origin = coordinate.origin();
        let min = origin.to_point();
        let bounding_box = BoundingBox::new(
            min,
            Point3::new(
                min.x + CHUNK_SIZE_X as f32,
                min.y + CHUNK_SIZE_Y as f32,
                min.z + CHUNK_SIZE_Z as f32,
            ),
        );

        Self {
            coordinate,
            voxels,
            liquid_present,
            liquid_counts,
            dirty_slices: BitVec::repeat(true, CHUNK_SIZE_Y),
            needs_rebuild: true,
            bounding_box,
        }
    }

    /// Rebuilds a chunk from the bytes produced by [`VoxelChunk::as_bytes`].
    ///
    /// Returns `None` if the buffer has the wrong length or contains a cell that breaks
    /// the liquid invariants.
    pub fn from_bytes(coordinate: ChunkCoordinate, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != CHUNK_VOLUME * std::mem::size_of::<Voxel>() {
            return None;
        }
        let voxels: Vec<Voxel> = bytemuck::try_cast_slice::<u8, Voxel>(bytes).ok()?.to_vec();
        if !voxels.iter().all(Voxel::is_consistent) {
            return None;
        }
        Some(Self::from_voxels(coordinate, voxels))
    }

    /// The raw cell array, in storage order, for persistence.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.voxels)
    }

    pub fn coordinate(&self) -> ChunkCoordinate {
        self.coordinate
    }

    pub fn origin(&self) -> GlobalVoxelCoordinate {
        self.coordinate.origin()
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    #[inline]
    fn index(local: LocalVoxelCoordinate) -> usize {
        local.x + CHUNK_SIZE_X * local.z + CHUNK_PLANE_SIZE * local.y
    }

    /// Gets the voxel at the specified chunk-relative coordinates.
    ///
    /// # Returns
    /// `None` if the coordinate lies outside the chunk.
    pub fn get(&self, local: LocalVoxelCoordinate) -> Option<Voxel> {
        if !local.is_in_bounds() {
            return None;
        }
        Some(self.voxels[Self::index(local)])
    }

    /// Gets the voxel at coordinates known to be inside the chunk.
    ///
    /// # Panics
    /// Panics if the coordinates are out of bounds.
    #[inline]
    pub fn voxel(&self, local: LocalVoxelCoordinate) -> Voxel {
        debug_assert!(local.is_in_bounds());
        self.voxels[Self::index(local)]
    }

    /// Replaces the voxel at `local`, keeping the slice bookkeeping in sync.
    ///
    /// The level is clamped on the way in. Returns `false` if the coordinate lies outside
    /// the chunk, in which case nothing changes.
    pub fn set(&mut self, local: LocalVoxelCoordinate, mut voxel: Voxel) -> bool {
        if !local.is_in_bounds() {
            return false;
        }
        if voxel.is_solid() {
            voxel.clear_liquid();
        } else {
            voxel.set_liquid(voxel.liquid_type(), voxel.liquid_level());
        }

        let index = Self::index(local);
        let previous = self.voxels[index];
        if previous == voxel {
            return true;
        }
        self.voxels[index] = voxel;

        if previous.has_liquid() != voxel.has_liquid() {
            let count = &mut self.liquid_counts[local.y];
            if voxel.has_liquid() {
                *count += 1;
            } else {
                *count -= 1;
            }
            self.liquid_present.set(local.y, *count > 0);
        }

        self.dirty_slices.set(local.y, true);
        self.needs_rebuild = true;
        true
    }

    /// Applies `change` to the voxel at `local` and stores the result.
    pub fn modify(&mut self, local: LocalVoxelCoordinate, change: impl FnOnce(&mut Voxel)) -> bool {
        match self.get(local) {
            Some(mut voxel) => {
                change(&mut voxel);
                self.set(local, voxel)
            }
            None => false,
        }
    }

    pub fn set_block(&mut self, local: LocalVoxelCoordinate, block_type: BlockType) -> bool {
        self.modify(local, |v| v.set_block(block_type))
    }

    /// Sets the liquid of an empty voxel. Writing liquid into a solid voxel is ignored.
    pub fn set_liquid(&mut self, local: LocalVoxelCoordinate, liquid: LiquidType, level: u8) -> bool {
        self.modify(local, |v| {
            if v.is_empty() {
                v.set_liquid(liquid, level)
            }
        })
    }

    pub fn set_grass(&mut self, local: LocalVoxelCoordinate, grass_type: u8) -> bool {
        self.modify(local, |v| v.grass_type = grass_type)
    }

    /// Explored and ramp flags do not change a chunk's geometry, so they skip the dirty
    /// bookkeeping.
    pub fn set_explored(&mut self, local: LocalVoxelCoordinate, explored: bool) -> bool {
        if !local.is_in_bounds() {
            return false;
        }
        self.voxels[Self::index(local)].set_explored(explored);
        true
    }

    pub fn set_ramp(&mut self, local: LocalVoxelCoordinate, ramp: bool) -> bool {
        if !local.is_in_bounds() {
            return false;
        }
        self.voxels[Self::index(local)].set_ramp(ramp);
        true
    }

    /// Whether Y slice `y` holds any liquid.
    pub fn is_liquid_present(&self, y: usize) -> bool {
        self.liquid_present.get(y).map(|bit| *bit).unwrap_or(false)
    }

    /// Whether any slice holds liquid.
    pub fn has_liquid(&self) -> bool {
        self.liquid_present.any()
    }

    /// The per-slice liquid presence mask.
    pub fn liquid_present_mask(&self) -> &BitSlice {
        &self.liquid_present
    }

    pub fn dirty_slices(&self) -> &BitSlice {
        &self.dirty_slices
    }

    /// Whether the chunk changed since it was last queued for a rebuild.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    /// Clears the rebuild request, returning whether one was pending.
    pub fn take_needs_rebuild(&mut self) -> bool {
        std::mem::replace(&mut self.needs_rebuild, false)
    }

    /// Called once the chunk's geometry has been rebuilt.
    pub fn clear_dirty_slices(&mut self) {
        self.dirty_slices.fill(false);
    }

    /// Sum of all liquid levels in the chunk.
    pub fn total_liquid(&self) -> u64 {
        chunk_iteration::LiquidVoxelIterator::new(self)
            .map(|(_, voxel)| voxel.liquid_level() as u64)
            .sum()
    }

    pub(crate) fn slice(&self, y: usize) -> &[Voxel] {
        let start = y * CHUNK_PLANE_SIZE;
        &self.voxels[start..start + CHUNK_PLANE_SIZE]
    }
}
