//! Splash events: large liquid transfers that the game may want to answer with a
//! particle effect or a sound. They are collected into a bounded queue; when the queue is
//! full new events are dropped and counted.

use std::collections::VecDeque;

use log::trace;

use crate::engine_state::voxels::block::block_type::LiquidType;
use crate::engine_state::voxels::coordinates::GlobalVoxelCoordinate;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SplashEvent {
    /// The voxel the liquid moved into.
    pub position: GlobalVoxelCoordinate,
    pub liquid: LiquidType,
    /// Liquid levels moved in the transfer.
    pub amount: u8,
}

pub struct SplashQueue {
    events: VecDeque<SplashEvent>,
    capacity: usize,
    dropped: u64,
}

impl SplashQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    /// Appends an event, or drops it if the queue is full.
    ///
    /// # Returns
    /// `false` if the event was dropped.
    pub fn push(&mut self, event: SplashEvent) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            trace!("Splash queue full, dropping {:?}", event);
            return false;
        }
        self.events.push_back(event);
        true
    }

    /// Removes and returns every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<SplashEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total number of events dropped since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(x: i32) -> SplashEvent {
        SplashEvent {
            position: GlobalVoxelCoordinate::new(x, 0, 0),
            liquid: LiquidType::WATER,
            amount: 4,
        }
    }

    #[test]
    fn test_full_queue_drops_new_events() {
        let mut queue = SplashQueue::new(2);
        assert!(queue.push(event(0)));
        assert!(queue.push(event(1)));
        assert!(!queue.push(event(2)));
        assert_eq!(queue.dropped(), 1);

        let drained = queue.drain();
        assert_eq!(drained, vec![event(0), event(1)]);
        assert!(queue.is_empty());
        assert!(queue.push(event(3)));
    }
}
