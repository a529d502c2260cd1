//! # Voxel Face Module
//!
//! This module defines the six faces of a voxel and the integer offsets to the
//! neighbour across each one.

use cgmath::Vector3;

/// Represents the six possible faces of a voxel.
///
/// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum VoxelFace {
    /// The front face (facing positive Z)
    FRONT = 0,

    /// The back face (facing negative Z)
    BACK = 1,

    /// The bottom face (facing negative Y)
    BOTTOM = 2,

    /// The top face (facing positive Y)
    TOP = 3,

    /// The left face (facing negative X)
    LEFT = 4,

    /// The right face (facing positive X)
    RIGHT = 5,
}

/// The four faces perpendicular to the ground plane.
pub const LATERAL_FACES: [VoxelFace; 4] = [
    VoxelFace::FRONT,
    VoxelFace::BACK,
    VoxelFace::LEFT,
    VoxelFace::RIGHT,
];

impl VoxelFace {
    /// Returns an array containing all six faces in a consistent order.
    pub fn all() -> [VoxelFace; 6] {
        [
            VoxelFace::FRONT,
            VoxelFace::BACK,
            VoxelFace::BOTTOM,
            VoxelFace::TOP,
            VoxelFace::LEFT,
            VoxelFace::RIGHT,
        ]
    }

    /// Integer step from a voxel to its neighbour across this face.
    pub fn offset(self) -> Vector3<i32> {
        match self {
            VoxelFace::FRONT => Vector3::new(0, 0, 1),
            VoxelFace::BACK => Vector3::new(0, 0, -1),
            VoxelFace::BOTTOM => Vector3::new(0, -1, 0),
            VoxelFace::TOP => Vector3::new(0, 1, 0),
            VoxelFace::LEFT => Vector3::new(-1, 0, 0),
            VoxelFace::RIGHT => Vector3::new(1, 0, 0),
        }
    }

    pub fn opposite(self) -> VoxelFace {
        match self {
            VoxelFace::FRONT => VoxelFace::BACK,
            VoxelFace::BACK => VoxelFace::FRONT,
            VoxelFace::BOTTOM => VoxelFace::TOP,
            VoxelFace::TOP => VoxelFace::BOTTOM,
            VoxelFace::LEFT => VoxelFace::RIGHT,
            VoxelFace::RIGHT => VoxelFace::LEFT,
        }
    }
}
