//! # Collaborator Interfaces
//!
//! The voxel world talks to the rest of a game through a few narrow traits. The
//! renderer, the AI task system and individual game objects implement them; the world
//! only ever calls through these seams.
//!
//! * `RenderBackend` - rebuilds and evicts chunk geometry, decides chunk visibility
//! * `TaskSystem` - hears about every committed voxel change
//! * `VoxelListener` - optional capability of a game object that wants to hear about
//!   changes to voxels it overlaps

use crate::engine_state::voxels::chunk::VoxelChunk;
use crate::engine_state::voxels::coordinates::{ChunkCoordinate, GlobalVoxelCoordinate};
use crate::engine_state::voxels::block::Voxel;

/// A voxel change committed through the chunk store.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VoxelChange {
    pub position: GlobalVoxelCoordinate,
    pub previous: Voxel,
    pub current: Voxel,
}

/// Geometry side of the world. Called from the rebuild worker thread.
pub trait RenderBackend: Send + Sync {
    /// Whether a chunk is currently visible. Invisible chunks are not rebuilt.
    fn is_chunk_visible(&self, _coordinate: ChunkCoordinate) -> bool {
        true
    }

    /// Regenerates the geometry of a chunk. The chunk is read-locked for the duration.
    fn rebuild_chunk(&self, coordinate: ChunkCoordinate, chunk: &VoxelChunk);

    /// Releases the geometry of a chunk that left the live set.
    fn evict_chunk(&self, _coordinate: ChunkCoordinate) {}
}

/// Receives every committed voxel change, once per change, on the tick thread.
pub trait TaskSystem: Send + Sync {
    fn on_voxel_changed(&self, change: &VoxelChange);
}

/// Implemented by game objects that react to voxel changes inside their bounds.
pub trait VoxelListener {
    fn on_voxel_changed(&self, change: &VoxelChange);
}

/// A backend that rebuilds nothing.
#[derive(Default)]
pub struct NullRenderBackend;

impl RenderBackend for NullRenderBackend {
    fn rebuild_chunk(&self, _coordinate: ChunkCoordinate, _chunk: &VoxelChunk) {}
}

/// A task system that ignores every change.
#[derive(Default)]
pub struct NullTaskSystem;

impl TaskSystem for NullTaskSystem {
    fn on_voxel_changed(&self, _change: &VoxelChange) {}
}
