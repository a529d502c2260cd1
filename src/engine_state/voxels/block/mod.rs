//! # Block Module
//!
//! This module provides the voxel cell stored by every chunk, together with the block
//! and liquid type definitions and the six voxel faces.

use block_type::{BlockType, LiquidType};

pub mod block_side;
pub mod block_type;

/// The underlying integer type used to represent block types in memory.
pub type BlockTypeSize = u8;

/// Liquid level of a completely full voxel.
pub const MAX_LIQUID_LEVEL: u8 = 8;

const EXPLORED_FLAG: u8 = 1 << 0;
const RAMP_FLAG: u8 = 1 << 1;

/// Represents a single voxel cell in the world.
///
/// # Memory Layout
/// The `#[repr(C)]` attribute and the `Pod` derive make a chunk's cell array a plain
/// byte buffer, which is how it is handed to persistence verbatim.
///
/// # Invariants
/// * `liquid_level <= MAX_LIQUID_LEVEL`
/// * `liquid_level == 0` exactly when `liquid_type == LiquidType::NONE`
/// * a solid voxel holds no liquid
#[repr(C)]
#[derive(Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct Voxel {
    /// The block type, encoded as a `BlockTypeSize`. 0 is empty.
    pub block_type: BlockTypeSize,
    liquid_type: u8,
    liquid_level: u8,
    /// Grass decoration id. 0 means no grass.
    pub grass_type: u8,
    flags: u8,
}

impl Voxel {
    /// An empty voxel with no liquid.
    pub const EMPTY: Voxel = Voxel {
        block_type: 0,
        liquid_type: 0,
        liquid_level: 0,
        grass_type: 0,
        flags: 0,
    };

    /// Creates a voxel of the given block type holding no liquid.
    pub fn new(block_type: BlockType) -> Self {
        Voxel {
            block_type: block_type.id(),
            ..Voxel::EMPTY
        }
    }

    /// Creates an empty voxel holding the given liquid.
    pub fn with_liquid(liquid_type: LiquidType, level: u8) -> Self {
        let mut voxel = Voxel::EMPTY;
        voxel.set_liquid(liquid_type, level);
        voxel
    }

    pub fn block(&self) -> BlockType {
        BlockType::from_id(self.block_type)
    }

    pub fn is_empty(&self) -> bool {
        self.block_type == BlockType::AIR.id()
    }

    pub fn is_solid(&self) -> bool {
        !self.is_empty()
    }

    pub fn liquid_type(&self) -> LiquidType {
        LiquidType::from_id(self.liquid_type)
    }

    pub fn liquid_level(&self) -> u8 {
        self.liquid_level
    }

    pub fn has_liquid(&self) -> bool {
        self.liquid_level > 0
    }

    /// Room left for more liquid of the same type.
    pub fn spare_capacity(&self) -> u8 {
        MAX_LIQUID_LEVEL - self.liquid_level
    }

    /// Replaces the block type. Making a voxel solid removes its liquid.
    pub fn set_block(&mut self, block_type: BlockType) {
        self.block_type = block_type.id();
        if block_type.is_solid() {
            self.clear_liquid();
        }
    }

    /// Sets the liquid, clamping the level into `[0, MAX_LIQUID_LEVEL]`.
    ///
    /// A level of zero or a type of `NONE` clears the liquid entirely, which keeps
    /// type and level consistent.
    pub fn set_liquid(&mut self, liquid_type: LiquidType, level: u8) {
        let level = level.min(MAX_LIQUID_LEVEL);
        if level == 0 || liquid_type == LiquidType::NONE {
            self.clear_liquid();
        } else {
            self.liquid_type = liquid_type.id();
            self.liquid_level = level;
        }
    }

    pub fn clear_liquid(&mut self) {
        self.liquid_type = LiquidType::NONE.id();
        self.liquid_level = 0;
    }

    pub fn is_explored(&self) -> bool {
        self.flags & EXPLORED_FLAG != 0
    }

    pub fn set_explored(&mut self, explored: bool) {
        self.set_flag(EXPLORED_FLAG, explored);
    }

    pub fn is_ramp(&self) -> bool {
        self.flags & RAMP_FLAG != 0
    }

    pub fn set_ramp(&mut self, ramp: bool) {
        self.set_flag(RAMP_FLAG, ramp);
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Whether the cell obeys the liquid invariants. Cells read back from raw bytes
    /// are checked with this before they are accepted.
    pub fn is_consistent(&self) -> bool {
        let level_ok = self.liquid_level <= MAX_LIQUID_LEVEL;
        let pairing_ok = (self.liquid_level == 0) == (self.liquid_type == LiquidType::NONE.id());
        let solid_ok = self.is_empty() || self.liquid_level == 0;
        level_ok && pairing_ok && solid_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_liquid_clamps_and_pairs() {
        let mut voxel = Voxel::EMPTY;
        voxel.set_liquid(LiquidType::WATER, 200);
        assert_eq!(voxel.liquid_level(), MAX_LIQUID_LEVEL);
        assert_eq!(voxel.liquid_type(), LiquidType::WATER);

        voxel.set_liquid(LiquidType::WATER, 0);
        assert_eq!(voxel.liquid_type(), LiquidType::NONE);

        voxel.set_liquid(LiquidType::NONE, 5);
        assert_eq!(voxel.liquid_level(), 0);
        assert!(voxel.is_consistent());
    }

    #[test]
    fn test_solid_block_drops_liquid() {
        let mut voxel = Voxel::with_liquid(LiquidType::LAVA, 4);
        voxel.set_block(BlockType::STONE);
        assert!(voxel.is_solid());
        assert!(!voxel.has_liquid());
        assert!(voxel.is_consistent());
    }

    #[test]
    fn test_flags_are_independent() {
        let mut voxel = Voxel::new(BlockType::DIRT);
        voxel.set_explored(true);
        voxel.set_ramp(true);
        voxel.set_explored(false);
        assert!(!voxel.is_explored());
        assert!(voxel.is_ramp());
    }

    #[test]
    fn test_voxel_is_five_bytes() {
        assert_eq!(std::mem::size_of::<Voxel>(), 5);
    }
}
