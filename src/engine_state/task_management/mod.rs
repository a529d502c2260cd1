//! # Task Management System
//!
//! This module provides the worker pool that runs the liquid simulation in parallel.
//!
//! ## Architecture Overview
//!
//! - `TaskManager`: Central coordinator for task distribution and worker management
//! - `Task`: A unit of work that runs on a worker thread
//! - `TaskResult`: The result of a completed task, folded into a context on the owning thread
//! - `TaskChannel`: Communication channel between the owning thread and one worker
//!
//! Each worker is an OS thread with a dedicated pair of channels. Tasks are handed out
//! round-robin to workers that have room; when all of them are busy the task waits in a
//! FIFO queue.
//!
//! ## Autoscaling
//!
//! The pool starts with a single worker. `scale_to()` sets how many workers take part in
//! the next batch; threads are spawned lazily the first time a larger count is requested
//! and are kept for the life of the manager. Workers beyond the active count simply sit
//! idle on their channel.
//!
//! ## Failure Handling
//!
//! A task that panics takes its worker thread down with it. The manager notices the
//! disconnected channel, logs it, drops the lost task and stops using that worker. The
//! remaining workers keep running.
//!
//! ## Example Usage
//! ```rust
//! use voxel_world::engine_state::task_management::{task::{Task, TaskResult}, TaskManager};
//!
//! struct Square(u64);
//! struct Squared(u64);
//!
//! impl Task<u64> for Square {
//!     fn process(&self) -> Box<dyn TaskResult<u64> + Send> {
//!         Box::new(Squared(self.0 * self.0))
//!     }
//! }
//!
//! impl TaskResult<u64> for Squared {
//!     fn handle_result(self: Box<Self>, sum: &mut u64) -> Vec<Box<dyn Task<u64> + Send>> {
//!         *sum += self.0;
//!         Vec::new()
//!     }
//! }
//!
//! let mut manager = TaskManager::new("squares", 2);
//! manager.scale_to(2);
//! for i in 1..=3 {
//!     manager.publish_task(Box::new(Square(i)));
//! }
//! let mut sum = 0;
//! manager.run_to_completion(&mut sum);
//! assert_eq!(sum, 14);
//! ```

pub mod task;

use log::{error, info};
use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use task::{Task, TaskResult};

/// A communication channel between the owning thread and a worker thread.
struct TaskChannel<C> {
    task_sender: Sender<Box<dyn Task<C> + Send>>,
    result_receiver: Receiver<Box<dyn TaskResult<C> + Send>>,
    num_tasks_in_flight: usize,
    /// Cleared once the worker thread is found dead.
    alive: bool,
    worker: JoinHandle<()>,
}

/// Manages a pool of worker threads and coordinates task execution.
pub struct TaskManager<C> {
    name: String,
    channels: Vec<TaskChannel<C>>,
    queued_tasks: VecDeque<Box<dyn Task<C> + Send>>,
    current_channel: usize,
    /// Number of leading channels that receive work.
    active_workers: usize,
    max_workers: usize,
}

/// Maximum number of tasks that can be in flight per worker channel.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

impl<C: 'static> TaskManager<C> {
    /// Creates a new `TaskManager` that may grow to `max_workers` threads.
    ///
    /// One worker is spawned immediately; more are spawned by `scale_to()`.
    pub fn new(name: &str, max_workers: usize) -> Self {
        let mut manager = TaskManager {
            name: name.to_string(),
            channels: Vec::new(),
            queued_tasks: VecDeque::new(),
            current_channel: 0,
            active_workers: 0,
            max_workers: max_workers.max(1),
        };
        manager.scale_to(1);
        manager
    }

    fn spawn_worker(&mut self) -> bool {
        let (task_tx, task_rx) = channel::<Box<dyn Task<C> + Send>>();
        let (result_tx, result_rx) = channel::<Box<dyn TaskResult<C> + Send>>();

        let task_closure = move || {
            while let Ok(task) = task_rx.recv() {
                let result = task.process();
                if result_tx.send(result).is_err() {
                    break;
                }
            }
        };

        let index = self.channels.len();
        match thread::Builder::new()
            .name(format!("{}-worker-{}", self.name, index))
            .spawn(task_closure)
        {
            Ok(worker) => {
                self.channels.push(TaskChannel {
                    task_sender: task_tx,
                    result_receiver: result_rx,
                    num_tasks_in_flight: 0,
                    alive: true,
                    worker,
                });
                true
            }
            Err(err) => {
                error!("{}: failed to spawn worker {}: {}", self.name, index, err);
                false
            }
        }
    }

    /// Sets the number of workers that receive tasks, spawning threads as needed.
    ///
    /// The count is clamped to `[1, max_workers]`. Returns the resulting active count.
    pub fn scale_to(&mut self, workers: usize) -> usize {
        let target = workers.clamp(1, self.max_workers);
        while self.channels.len() < target {
            if !self.spawn_worker() {
                break;
            }
        }
        let active = target.min(self.channels.len());
        if active != self.active_workers {
            info!(
                "{}: scaling to {} active worker(s) ({} spawned)",
                self.name,
                active,
                self.channels.len()
            );
        }
        self.active_workers = active;
        if self.current_channel >= self.active_workers {
            self.current_channel = 0;
        }
        active
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers
    }

    pub fn spawned_workers(&self) -> usize {
        self.channels.len()
    }

    /// Number of workers still alive.
    pub fn live_workers(&self) -> usize {
        self.channels.iter().filter(|c| c.alive).count()
    }

    fn try_send_task(
        &mut self,
        task: Box<dyn Task<C> + Send>,
        channel_idx: usize,
    ) -> Result<(), Box<dyn Task<C> + Send>> {
        match self.channels[channel_idx].task_sender.send(task) {
            Ok(_) => {
                self.channels[channel_idx].num_tasks_in_flight += 1;
                Ok(())
            }
            Err(task) => {
                error!("{}: worker {} is gone", self.name, channel_idx);
                self.channels[channel_idx].alive = false;
                Err(task.0)
            }
        }
    }

    /// Finds an active, live worker with room for another task, round-robin from the
    /// last used one.
    fn find_available_channel(&self) -> Option<usize> {
        let active = self.active_workers.min(self.channels.len());
        if active == 0 {
            return None;
        }

        let start_channel = self.current_channel % active;
        let mut current = start_channel;
        loop {
            let channel = &self.channels[current];
            if channel.alive && channel.num_tasks_in_flight < MAX_TASKS_IN_FLIGHT {
                return Some(current);
            }
            current = (current + 1) % active;
            if current == start_channel {
                return None;
            }
        }
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was immediately handed to a worker
    /// - `false` if the task was queued because all workers are busy
    pub fn publish_task(&mut self, task: Box<dyn Task<C> + Send>) -> bool {
        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.active_workers.max(1);
                    true
                }
                Err(task) => {
                    self.queued_tasks.push_back(task);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Hands queued tasks to workers until the queue is empty or every worker is busy.
    pub fn process_queued_tasks(&mut self) {
        while let Some(channel_idx) = self.find_available_channel() {
            let Some(task) = self.queued_tasks.pop_front() else {
                break;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => self.current_channel = (channel_idx + 1) % self.active_workers.max(1),
                Err(task) => self.queued_tasks.push_front(task),
            }
        }
    }

    fn handle(&mut self, result: Box<dyn TaskResult<C> + Send>, context: &mut C) {
        for task in result.handle_result(context) {
            self.publish_task(task);
        }
    }

    fn mark_dead(&mut self, channel_idx: usize) {
        let channel = &mut self.channels[channel_idx];
        if channel.alive {
            error!(
                "{}: worker {} died with {} task(s) in flight; continuing without it",
                self.name, channel_idx, channel.num_tasks_in_flight
            );
        }
        channel.alive = false;
        channel.num_tasks_in_flight = 0;
    }

    /// Folds every result that is already available into `context` without blocking.
    pub fn process_completed_tasks(&mut self, context: &mut C) {
        for channel_idx in 0..self.channels.len() {
            loop {
                match self.channels[channel_idx].result_receiver.try_recv() {
                    Ok(result) => {
                        self.channels[channel_idx].num_tasks_in_flight -= 1;
                        self.handle(result, context);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.mark_dead(channel_idx);
                        break;
                    }
                }
            }
        }
    }

    /// Blocks until every published and queued task (and any follow-ups) has finished,
    /// folding each result into `context`.
    ///
    /// Tasks that cannot be scheduled because every worker has died are dropped with an
    /// error log.
    pub fn run_to_completion(&mut self, context: &mut C) {
        loop {
            self.process_queued_tasks();

            let busy = (0..self.channels.len())
                .find(|&i| self.channels[i].alive && self.channels[i].num_tasks_in_flight > 0);

            match busy {
                Some(channel_idx) => match self.channels[channel_idx].result_receiver.recv() {
                    Ok(result) => {
                        self.channels[channel_idx].num_tasks_in_flight -= 1;
                        self.handle(result, context);
                    }
                    Err(_) => self.mark_dead(channel_idx),
                },
                None if self.queued_tasks.is_empty() => return,
                None => {
                    if self.live_workers() == 0 || self.find_available_channel().is_none() {
                        // Only reachable when no active worker is left alive.
                        if !self.revive_active_set() {
                            error!(
                                "{}: no live workers, dropping {} task(s)",
                                self.name,
                                self.queued_tasks.len()
                            );
                            self.queued_tasks.clear();
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Widens the active set to include any live spawned worker. Returns `false` if
    /// there is none.
    fn revive_active_set(&mut self) -> bool {
        if let Some(last_alive) = self.channels.iter().rposition(|c| c.alive) {
            self.active_workers = self.active_workers.max(last_alive + 1);
            true
        } else {
            false
        }
    }
}

impl<C> Drop for TaskManager<C> {
    fn drop(&mut self) {
        for channel in self.channels.drain(..) {
            let TaskChannel {
                task_sender,
                result_receiver,
                worker,
                ..
            } = channel;
            drop(task_sender);
            drop(result_receiver);
            if worker.join().is_err() {
                error!("{}: worker thread panicked", self.name);
            }
        }
    }
}
