//! Task scheduling for Resona sessions.
//!
//! Each session context owns a couple of [`Scheduler`]s: one for its own
//! periodic work (stats, the resume deadline) and one for per-player
//! updates. Everything a scheduler spawned goes away with
//! [`Scheduler::shutdown`].
//!
//! Two kinds of task are supported:
//!
//! - **One-shot** ([`Scheduler::schedule_once`]): runs once after a delay.
//!   Its [`TaskHandle::cancel`] tells you whether you beat it.
//! - **Fixed-rate** ([`Scheduler::schedule_at_fixed_rate`]): driven by a
//!   fixed-period clock; a late tick skips ahead instead of bunching up.
//!
//! ```ignore
//! let scheduler = Scheduler::new("session-abc");
//! let stats = scheduler.schedule_at_fixed_rate(
//!     Duration::ZERO,
//!     Duration::from_secs(60),
//!     move || send_stats(),
//! )?;
//! let deadline = scheduler.schedule_once(Duration::from_secs(60), move || expire())?;
//! if !deadline.cancel() {
//!     // expiry already started; too late to resume
//! }
//! scheduler.shutdown().await;
//! ```

mod error;
mod scheduler;
mod tick;

pub use error::ScheduleError;
pub use scheduler::{Scheduler, TaskHandle};
