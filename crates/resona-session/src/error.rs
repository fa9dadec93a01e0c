//! Error types for the session layer.

use resona_protocol::{GuildId, ProtocolError, SessionId};
use resona_schedule::ScheduleError;

use crate::SessionState;

/// Errors surfaced by [`SessionContext`](crate::SessionContext) and
/// [`Player`](crate::Player) operations.
///
/// Sends never fail from the caller's point of view; delivery problems are
/// logged where they happen. What comes back here are lifecycle mistakes
/// the caller can act on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation is not allowed in the context's current state.
    /// For example `resume` on a context that was never paused.
    #[error("cannot {operation} a session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The resume deadline fired before the resume could cancel it.
    /// The context is being evicted; the client needs a new session.
    #[error("session {0} expired before it could be resumed")]
    ResumeExpired(SessionId),

    /// Seeking or pausing a player that has no track loaded.
    #[error("nothing is playing in guild {0}")]
    NothingPlaying(GuildId),

    /// The context was destroyed while the player still referenced it.
    #[error("session context for guild {0} is gone")]
    ContextGone(GuildId),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A background task could not be scheduled, usually because the
    /// context is shutting down.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}
