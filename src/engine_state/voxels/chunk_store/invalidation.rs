//! The chunk invalidation queue: a FIFO of chunks waiting for a rebuild in which a chunk
//! appears at most once. The rebuild worker sleeps on the queue's condition variable
//! while it is empty.

use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::engine_state::voxels::coordinates::ChunkCoordinate;

#[derive(Default)]
struct QueueState {
    order: VecDeque<ChunkCoordinate>,
    queued: HashSet<ChunkCoordinate>,
    /// Set on shutdown; wakes and releases every waiter.
    closed: bool,
}

#[derive(Default)]
pub struct InvalidationQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
}

impl InvalidationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a chunk unless it is already waiting, and wakes the rebuild worker.
    ///
    /// # Returns
    /// `true` if the chunk was newly enqueued.
    pub fn invalidate(&self, coordinate: ChunkCoordinate) -> bool {
        let mut state = self.lock();
        if !state.queued.insert(coordinate) {
            return false;
        }
        state.order.push_back(coordinate);
        drop(state);
        self.wake.notify_one();
        true
    }

    /// Dequeues the oldest chunk, if any. Never blocks.
    pub fn pop(&self) -> Option<ChunkCoordinate> {
        let mut state = self.lock();
        let coordinate = state.order.pop_front()?;
        state.queued.remove(&coordinate);
        Some(coordinate)
    }

    /// Dequeues the oldest chunk, sleeping while the queue is empty.
    ///
    /// # Returns
    /// `None` once the queue has been closed.
    pub fn wait_pop(&self) -> Option<ChunkCoordinate> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(coordinate) = state.order.pop_front() {
                state.queued.remove(&coordinate);
                return Some(coordinate);
            }
            state = self
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Releases every waiter; `wait_pop` returns `None` until the queue is reopened.
    pub fn close(&self) {
        self.lock().closed = true;
        self.wake.notify_all();
    }

    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, coordinate: ChunkCoordinate) -> bool {
        self.lock().queued.contains(&coordinate)
    }
}
