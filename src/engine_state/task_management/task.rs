//! # Worker Pool Traits
//!
//! A `Task` runs on a pool thread and produces a `TaskResult`; the result is folded into
//! the pool's context `C` on the thread that owns the `TaskManager`. The liquid
//! simulation uses `LiquidTickOutcome` as its context, so per-chunk counters are merged
//! without any shared mutable state.
//!
//! A result may hand back follow-up tasks, which are published before the pool is
//! considered idle.

/// A unit of work executed on a worker thread.
///
/// Tasks should own (or hold shared handles to) everything they need; they must not
/// borrow from the publishing thread.
pub trait Task<C>: Send {
    /// Performs the work and returns a result for the owning thread.
    fn process(&self) -> Box<dyn TaskResult<C> + Send>;
}

/// The result of processing a `Task`, folded into the manager's context.
pub trait TaskResult<C>: Send {
    /// Applies the result to `context`.
    ///
    /// # Returns
    /// Follow-up tasks to schedule (usually empty).
    fn handle_result(self: Box<Self>, context: &mut C) -> Vec<Box<dyn Task<C> + Send>>;
}
