/// Errors returned when a task cannot be scheduled.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The scheduler was shut down; it accepts no new tasks.
    #[error("scheduler {0} is shut down")]
    Shutdown(String),

    /// Scheduling was attempted outside a Tokio runtime.
    #[error("no Tokio runtime available to run scheduled tasks")]
    NoRuntime,
}
