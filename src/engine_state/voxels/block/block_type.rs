//! # Block Type Module
//!
//! This module defines the solid block types and the liquid types of the voxel world.
//! Both are stored in a voxel as compact integers and converted back with `FromPrimitive`.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use super::BlockTypeSize;

/// Enumerates all possible block types in the voxel world.
///
/// `AIR` is type id 0 and is the only non-solid block. Every other variant occupies
/// its voxel completely, so liquid can never coexist with it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
pub enum BlockType {
    /// Empty space. Liquid may live here.
    AIR,

    /// Basic soil.
    DIRT,

    /// Rock. Also the product of lava cooling or meeting water.
    STONE,

    SAND,

    WOOD,

    /// Soil with a grass cover.
    GRASS,
}

impl BlockType {
    /// Converts a `BlockTypeSize` to a `BlockType`.
    ///
    /// Unknown ids are treated as `STONE` so a corrupted cell is never mistaken for
    /// open space.
    pub fn from_id(btype: BlockTypeSize) -> Self {
        BlockType::from_u8(btype).unwrap_or(BlockType::STONE)
    }

    pub fn id(self) -> BlockTypeSize {
        self as BlockTypeSize
    }

    pub fn is_solid(self) -> bool {
        self != BlockType::AIR
    }

    /// Generates a random solid block type using the given generator.
    pub fn random_solid(rng: &mut fastrand::Rng) -> Self {
        BlockType::from_u8(rng.u8(1..=5)).unwrap_or(BlockType::DIRT)
    }
}

/// The liquid held by a voxel. `NONE` is id 0 and only ever pairs with level 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
pub enum LiquidType {
    NONE,
    WATER,
    LAVA,
}

impl LiquidType {
    pub fn from_id(id: u8) -> Self {
        LiquidType::from_u8(id).unwrap_or(LiquidType::NONE)
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// What two different liquids turn into when they meet, if anything.
    pub fn reaction_with(self, other: LiquidType) -> Option<BlockType> {
        match (self, other) {
            (LiquidType::WATER, LiquidType::LAVA) | (LiquidType::LAVA, LiquidType::WATER) => {
                Some(BlockType::STONE)
            }
            _ => None,
        }
    }

    /// What remains of a voxel of this liquid after it evaporates.
    pub fn evaporation_residue(self) -> BlockType {
        match self {
            LiquidType::LAVA => BlockType::STONE,
            _ => BlockType::AIR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_round_trip() {
        for block in [
            BlockType::AIR,
            BlockType::DIRT,
            BlockType::STONE,
            BlockType::SAND,
            BlockType::WOOD,
            BlockType::GRASS,
        ] {
            assert_eq!(BlockType::from_id(block.id()), block);
        }
        assert_eq!(BlockType::from_id(200), BlockType::STONE);
    }

    #[test]
    fn test_random_solid_is_never_air() {
        let mut rng = fastrand::Rng::with_seed(3);
        for _ in 0..1000 {
            assert!(BlockType::random_solid(&mut rng).is_solid());
        }
    }

    #[test]
    fn test_reactions() {
        assert_eq!(
            LiquidType::WATER.reaction_with(LiquidType::LAVA),
            Some(BlockType::STONE)
        );
        assert_eq!(
            LiquidType::LAVA.reaction_with(LiquidType::WATER),
            Some(BlockType::STONE)
        );
        assert_eq!(LiquidType::WATER.reaction_with(LiquidType::WATER), None);
        assert_eq!(LiquidType::LAVA.evaporation_residue(), BlockType::STONE);
        assert_eq!(LiquidType::WATER.evaporation_residue(), BlockType::AIR);
    }
}
