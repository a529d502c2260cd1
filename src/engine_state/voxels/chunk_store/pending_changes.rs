//! Buffer of committed voxel changes waiting for the next tick's notification pass.

use std::sync::{Mutex, PoisonError};

use crate::engine_state::interfaces::VoxelChange;

#[derive(Default)]
pub struct PendingChanges {
    buffer: Mutex<Vec<VoxelChange>>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, change: VoxelChange) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(change);
    }

    /// Takes every buffered change, oldest first.
    pub fn drain(&self) -> Vec<VoxelChange> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
