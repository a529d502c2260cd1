//! Background threads of the chunk store: the fixed-interval tick loop and the rebuild
//! worker. Both run until the store's exit flag is raised.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use web_time::{Duration, Instant};

use crate::engine_state::error::{WorldError, WorldResult};

use super::StoreShared;

/// Upper bound on one sleep of the tick loop, so shutdown is noticed quickly even with
/// long tick intervals.
const MAX_SLEEP: Duration = Duration::from_millis(20);

/// Ticks run back to back before the loop gives up catching up.
const MAX_CATCH_UP_TICKS: u32 = 5;

type PanicPayload = Box<dyn Any + Send + 'static>;

/// A named background thread. The thread hands back the payload of a panic it caught.
pub(crate) struct Worker {
    name: String,
    handle: JoinHandle<Option<PanicPayload>>,
}

fn panic_message(payload: &PanicPayload) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Spawns `body` on a named thread. A panic inside `body` is logged and ends only
/// this thread.
pub(crate) fn spawn_worker(
    name: &str,
    body: impl FnOnce() + Send + 'static,
) -> WorldResult<Worker> {
    let thread_name = name.to_string();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            info!("Thread {thread_name} started");
            match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(()) => {
                    info!("Thread {thread_name} exiting");
                    None
                }
                Err(payload) => {
                    error!("Thread {thread_name} panicked: {}", panic_message(&payload));
                    Some(payload)
                }
            }
        })
        .map_err(|source| WorldError::ThreadSpawn {
            name: name.to_string(),
            source,
        })?;
    Ok(Worker {
        name: name.to_string(),
        handle,
    })
}

impl Worker {
    /// Waits for the thread to finish. A caught panic is re-raised in debug builds.
    pub(crate) fn join(self) {
        let payload = match self.handle.join() {
            Ok(None) => return,
            Ok(Some(payload)) | Err(payload) => payload,
        };
        if cfg!(debug_assertions) {
            panic::resume_unwind(payload);
        }
        warn!(
            "Thread {} had terminated early: {}",
            self.name,
            panic_message(&payload)
        );
    }
}

/// Drives `StoreShared::tick` at a fixed simulated interval.
///
/// Simulated time advances by elapsed wall time times the store's time scale, and not
/// at all while the store is paused.
pub(crate) fn run_tick_loop(shared: Arc<StoreShared>) {
    let interval = shared.tick_interval;
    let mut last = Instant::now();
    let mut accumulated = Duration::ZERO;

    while !shared.exit.load(Ordering::Acquire) {
        thread::sleep(interval.min(MAX_SLEEP));
        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        if shared.is_paused() {
            continue;
        }
        let scaled = Duration::try_from_secs_f32(elapsed.as_secs_f32() * shared.time_scale())
            .unwrap_or(interval * MAX_CATCH_UP_TICKS);
        accumulated = accumulated.saturating_add(scaled);

        let mut ticks = 0;
        while accumulated >= interval && !shared.exit.load(Ordering::Acquire) {
            accumulated -= interval;
            shared.tick();
            ticks += 1;
            if ticks == MAX_CATCH_UP_TICKS {
                warn!("Tick loop is falling behind, dropping {accumulated:?} of simulated time");
                accumulated = Duration::ZERO;
            }
        }
    }
}

/// Rebuilds invalidated chunks until the invalidation queue is closed.
pub(crate) fn run_rebuild_loop(shared: Arc<StoreShared>) {
    while let Some(coordinate) = shared.invalidation.wait_pop() {
        shared.rebuild(coordinate);
    }
}
