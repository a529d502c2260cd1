//! # Voxel World Core
//!
//! Representation and storage of the block world.
//!
//! ## Architecture
//!
//! * **Coordinates**: global, chunk and chunk-local voxel positions
//! * **Block**: the per-voxel record, block and liquid types, voxel faces
//! * **Chunk**: a fixed-size 3D array of voxels with per-slice bookkeeping
//! * **World**: the fixed grid of chunks, populated once by a chunk generator
//! * **Chunk store**: keeps the world's dependants current from background threads
//!
//! ## Data Flow
//!
//! 1. The chunk store receives a voxel write
//! 2. The owning chunk applies it under its write lock and marks the slice dirty
//! 3. The chunk (and a neighbour, for border voxels) is queued for a rebuild
//! 4. The change is buffered and delivered to listeners on the next tick
//!
//! ## Thread Safety
//!
//! * The chunk map never changes shape after creation and is read without locking
//! * Every chunk sits behind its own reader/writer lock
//! * The invalidation queue and the change buffer are mutex-protected

pub mod block;
pub mod chunk;
pub mod chunk_store;
pub mod coordinates;
pub mod generation;
pub mod world;
