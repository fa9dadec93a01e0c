//! The session registry seen from inside a session.

use std::sync::Arc;

use resona_protocol::Outbound;

use crate::{Player, SessionContext, SessionState};

/// The node-wide owner of all sessions.
///
/// A context calls back into its registry when its resume deadline
/// passes, when a player snapshot should go out and on every stats tick.
/// Implementations must not block; these run on the context's scheduler.
pub trait SessionRegistry: Send + Sync + 'static {
    /// The resume deadline of `context` passed without a resume.
    ///
    /// The registry decides what eviction means. It must not await
    /// [`SessionContext::destroy`] inline, since this is called from the
    /// context's own scheduler; spawn it instead.
    fn on_session_resume_timeout(&self, context: Arc<SessionContext>);

    /// Sends a `playerUpdate` snapshot of `player`. Skipped while the
    /// session is paused, since a stale snapshot is useless after resume
    /// (resume sends fresh ones).
    fn send_player_update(&self, context: &SessionContext, player: &Player) {
        if context.state() == SessionState::Resumable {
            return;
        }
        context.send(&Outbound::PlayerUpdate {
            guild_id: player.guild_id(),
            state: player.state(),
        });
    }

    /// Periodic stats tick of `context`.
    fn send_stats(&self, context: &SessionContext);
}
