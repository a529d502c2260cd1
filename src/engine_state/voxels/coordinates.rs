//! # Coordinates
//!
//! Value types for the three coordinate spaces of the voxel world:
//!
//! * `GlobalVoxelCoordinate` - a voxel anywhere in the world, in world units
//! * `ChunkCoordinate` - the position of a chunk in the chunk grid
//! * `LocalVoxelCoordinate` - a voxel inside one chunk, `0..CHUNK_SIZE_*` on each axis
//!
//! A global coordinate decomposes into exactly one (chunk, local) pair using floored
//! division, so negative coordinates land in negative chunks.

use std::fmt;

use cgmath::{Point3, Vector3};

use super::chunk::{CHUNK_SIZE_X, CHUNK_SIZE_Y, CHUNK_SIZE_Z};
use super::block::block_side::VoxelFace;

/// A voxel position in world units.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GlobalVoxelCoordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A chunk position in the chunk grid (not in voxels).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkCoordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// A voxel position relative to the origin of its chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct LocalVoxelCoordinate {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl GlobalVoxelCoordinate {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The chunk this voxel belongs to.
    pub fn chunk(&self) -> ChunkCoordinate {
        ChunkCoordinate {
            x: self.x.div_euclid(CHUNK_SIZE_X as i32),
            y: self.y.div_euclid(CHUNK_SIZE_Y as i32),
            z: self.z.div_euclid(CHUNK_SIZE_Z as i32),
        }
    }

    /// The position of this voxel inside its chunk.
    pub fn local(&self) -> LocalVoxelCoordinate {
        LocalVoxelCoordinate {
            x: self.x.rem_euclid(CHUNK_SIZE_X as i32) as usize,
            y: self.y.rem_euclid(CHUNK_SIZE_Y as i32) as usize,
            z: self.z.rem_euclid(CHUNK_SIZE_Z as i32) as usize,
        }
    }

    /// Splits the coordinate into its chunk and local parts.
    pub fn decompose(&self) -> (ChunkCoordinate, LocalVoxelCoordinate) {
        (self.chunk(), self.local())
    }

    /// Rebuilds a global coordinate from a chunk and a local offset.
    pub fn from_parts(chunk: ChunkCoordinate, local: LocalVoxelCoordinate) -> Self {
        let origin = chunk.origin();
        Self {
            x: origin.x + local.x as i32,
            y: origin.y + local.y as i32,
            z: origin.z + local.z as i32,
        }
    }

    /// The neighbouring voxel across `face`.
    pub fn neighbor(&self, face: VoxelFace) -> Self {
        let offset = face.offset();
        Self::new(self.x + offset.x, self.y + offset.y, self.z + offset.z)
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The world-space corner of this voxel with the smallest components.
    pub fn to_point(&self) -> Point3<f32> {
        Point3::new(self.x as f32, self.y as f32, self.z as f32)
    }

    /// The voxel containing a world-space point.
    pub fn containing(point: Point3<f32>) -> Self {
        Self::new(
            point.x.floor() as i32,
            point.y.floor() as i32,
            point.z.floor() as i32,
        )
    }
}

impl fmt::Display for GlobalVoxelCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<Point3<i32>> for GlobalVoxelCoordinate {
    fn from(p: Point3<i32>) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

impl ChunkCoordinate {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The global coordinate of this chunk's local (0, 0, 0) voxel.
    pub fn origin(&self) -> GlobalVoxelCoordinate {
        GlobalVoxelCoordinate {
            x: self.x * CHUNK_SIZE_X as i32,
            y: self.y * CHUNK_SIZE_Y as i32,
            z: self.z * CHUNK_SIZE_Z as i32,
        }
    }

    /// The neighbouring chunk across `face`.
    pub fn neighbor(&self, face: VoxelFace) -> Self {
        let offset: Vector3<i32> = face.offset();
        Self::new(self.x + offset.x, self.y + offset.y, self.z + offset.z)
    }

    /// One of eight classes such that two chunks of the same class are never adjacent,
    /// not even diagonally.
    pub fn parity_class(&self) -> usize {
        (self.x.rem_euclid(2) | (self.y.rem_euclid(2) << 1) | (self.z.rem_euclid(2) << 2)) as usize
    }
}

impl fmt::Display for ChunkCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk({}, {}, {})", self.x, self.y, self.z)
    }
}

impl From<Point3<i32>> for ChunkCoordinate {
    fn from(p: Point3<i32>) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

impl LocalVoxelCoordinate {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Whether the coordinate addresses a voxel inside a chunk.
    pub fn is_in_bounds(&self) -> bool {
        self.x < CHUNK_SIZE_X && self.y < CHUNK_SIZE_Y && self.z < CHUNK_SIZE_Z
    }

    /// Whether the voxel touches the boundary of its chunk.
    pub fn is_on_border(&self) -> bool {
        self.x == 0
            || self.y == 0
            || self.z == 0
            || self.x == CHUNK_SIZE_X - 1
            || self.y == CHUNK_SIZE_Y - 1
            || self.z == CHUNK_SIZE_Z - 1
    }
}
