//! Cancellable timers and fixed-rate tasks owned by one session.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::ScheduleError;
use crate::tick::{TickClock, TickConfig};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Handle to a scheduled task.
///
/// Cancelling and firing race through a single atomic status word, so
/// exactly one of them wins. [`TaskHandle::cancel`] reports which.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    status: Arc<AtomicU8>,
    abort: tokio::task::AbortHandle,
}

impl TaskHandle {
    /// Cancel the task.
    ///
    /// Returns `true` if the task was stopped before it started running.
    /// Returns `false` if it already started, finished, or was cancelled
    /// earlier. For a repeating task `true` means no further ticks run.
    pub fn cancel(&self) -> bool {
        let won = self
            .status
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.abort.abort();
        }
        won
    }

    /// `true` once the task was cancelled before running.
    pub fn is_cancelled(&self) -> bool {
        self.status.load(Ordering::Acquire) == CANCELLED
    }

    /// `true` once a one-shot task has run to completion.
    pub fn is_done(&self) -> bool {
        self.status.load(Ordering::Acquire) == DONE
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Tracked {
    status: Arc<AtomicU8>,
    join: JoinHandle<()>,
}

/// A named group of scheduled tasks that can be shut down together.
///
/// Each task is its own Tokio task on the ambient runtime, so one
/// scheduler's timers never wait behind another's. Task bodies run on a
/// runtime worker and must not block: a callback stuck in blocking I/O
/// holds that worker and, on a single-threaded runtime, every other
/// timer with it. Hand blocking work to `spawn_blocking`.
///
/// Shutting the scheduler down cancels whatever has not started yet,
/// aborts repeating tasks and waits for all of them to stop.
pub struct Scheduler {
    name: String,
    tasks: Mutex<Vec<Tracked>>,
    shut_down: AtomicBool,
}

impl Scheduler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Run `task` once after `delay`.
    ///
    /// # Errors
    /// [`ScheduleError::Shutdown`] after [`Scheduler::shutdown`], or
    /// [`ScheduleError::NoRuntime`] when called outside a Tokio runtime.
    pub fn schedule_once<F>(&self, delay: Duration, task: F) -> Result<TaskHandle, ScheduleError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn_tracked(move |status| async move {
            tokio::time::sleep(delay).await;
            if status
                .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            task();
            status.store(DONE, Ordering::Release);
        })
    }

    /// Run `task` every `period`, first after `initial_delay`.
    ///
    /// Late ticks are skipped rather than bunched up.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        mut task: F,
    ) -> Result<TaskHandle, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        let config = TickConfig::every(period, initial_delay);
        self.spawn_tracked(move |status| async move {
            let mut clock = TickClock::new(config);
            loop {
                clock.wait_for_tick().await;
                if status.load(Ordering::Acquire) != PENDING {
                    break;
                }
                task();
                clock.record_tick_end();
            }
        })
    }

    fn spawn_tracked<F, Fut>(&self, make: F) -> Result<TaskHandle, ScheduleError>
    where
        F: FnOnce(Arc<AtomicU8>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| ScheduleError::NoRuntime)?;

        // The flag is checked under the lock so a task can never slip in
        // after `shutdown` has drained the list.
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_shutdown() {
            return Err(ScheduleError::Shutdown(self.name.clone()));
        }
        tasks.retain(|t| !t.join.is_finished());

        let status = Arc::new(AtomicU8::new(PENDING));
        let join = runtime.spawn(make(Arc::clone(&status)));
        let handle = TaskHandle {
            status: Arc::clone(&status),
            abort: join.abort_handle(),
        };
        tasks.push(Tracked { status, join });
        Ok(handle)
    }

    /// Number of tasks that have not finished yet.
    pub fn active_tasks(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.iter().filter(|t| !t.join.is_finished()).count()
    }

    /// Stop accepting tasks, cancel everything outstanding and wait for the
    /// spawned tasks to stop.
    ///
    /// Calling this from inside one of this scheduler's own tasks would
    /// wait on itself; hand the shutdown to a separate task instead.
    pub async fn shutdown(&self) {
        let drained = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            self.shut_down.store(true, Ordering::Release);
            std::mem::take(&mut *tasks)
        };

        debug!(scheduler = %self.name, tasks = drained.len(), "shutting down scheduler");

        for tracked in &drained {
            let _ = tracked.status.compare_exchange(
                PENDING,
                CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            tracked.join.abort();
        }
        for tracked in drained {
            // An aborted task reports a cancellation error; nothing to do.
            let _ = tracked.join.await;
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for tracked in tasks.drain(..) {
            tracked.join.abort();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("shut_down", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}
