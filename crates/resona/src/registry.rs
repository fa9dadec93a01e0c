//! The node's session registry.
//!
//! [`SessionServer`] maps session ids to live [`SessionContext`]s. It hands
//! out ids, resolves `Session-Id` headers on reconnect, evicts sessions
//! whose resume deadline passed and computes the node-wide stats each
//! session reports once a minute.
//!
//! # Concurrency note
//!
//! The map is a `DashMap`: handler tasks, scheduler callbacks and the
//! accept loop all touch it concurrently, and none of them may block the
//! others for long. Destroying a context is async (it joins the context's
//! schedulers), so every destroy happens outside the map's shard locks.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use rand::Rng;
use resona_protocol::{NodeInfo, Outbound, SessionId, Stats, UserId};
use resona_session::{
    EventEmitter, SessionConfig, SessionContext, SessionDeps, SessionError, SessionRegistry,
    VoiceClient,
};
use resona_transport::Connection;
use tracing::{debug, info};

/// Builds the voice client for a new session.
pub type VoiceClientFactory =
    Arc<dyn Fn(&SessionId, &UserId) -> Arc<dyn VoiceClient> + Send + Sync>;

/// Length of generated session ids.
pub const SESSION_ID_LEN: usize = 16;

const SESSION_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Registry of every session on this node.
pub struct SessionServer {
    contexts: DashMap<SessionId, Arc<SessionContext>>,
    started_at: Instant,
    config: SessionConfig,
    info: NodeInfo,
    events: EventEmitter,
    voice: VoiceClientFactory,
}

impl SessionServer {
    pub fn new(
        config: SessionConfig,
        info: NodeInfo,
        events: EventEmitter,
        voice: VoiceClientFactory,
    ) -> Arc<Self> {
        Arc::new(Self {
            contexts: DashMap::new(),
            started_at: Instant::now(),
            config,
            info,
            events,
            voice,
        })
    }

    /// Creates and registers a session for `user_id` on `transport`.
    ///
    /// The new context sends `hello` before this returns.
    pub fn create_context(
        self: &Arc<Self>,
        user_id: UserId,
        transport: Arc<dyn Connection>,
    ) -> Result<Arc<SessionContext>, SessionError> {
        let session_id = loop {
            let candidate = generate_session_id();
            if !self.contexts.contains_key(&candidate) {
                break candidate;
            }
        };

        let registry: Arc<dyn SessionRegistry> = Arc::clone(self) as Arc<dyn SessionRegistry>;
        let context = SessionContext::new(
            session_id.clone(),
            user_id.clone(),
            transport,
            self.config.clone(),
            SessionDeps {
                voice: (self.voice)(&session_id, &user_id),
                registry,
                events: self.events.clone(),
                info: self.info.clone(),
            },
        )?;

        self.contexts.insert(session_id, Arc::clone(&context));
        Ok(context)
    }

    pub fn get_existing_context(&self, session_id: &SessionId) -> Option<Arc<SessionContext>> {
        self.contexts
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Unregisters and destroys a session. Unknown ids are ignored.
    pub async fn remove_context(&self, session_id: &SessionId) {
        let removed = self.contexts.remove(session_id);
        if let Some((_, context)) = removed {
            context.destroy().await;
        }
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Node-wide statistics.
    pub fn stats(&self) -> Stats {
        let (players, playing_players) =
            self.contexts.iter().fold((0, 0), |(players, playing), entry| {
                let context = entry.value();
                (
                    players + context.players().len(),
                    playing + context.playing_players().len(),
                )
            });

        Stats {
            players,
            playing_players,
            uptime: self.started_at.elapsed().as_millis() as u64,
        }
    }

    /// Destroys every session.
    pub async fn shutdown(&self) {
        let contexts: Vec<Arc<SessionContext>> = self
            .contexts
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.contexts.clear();

        info!(sessions = contexts.len(), "shutting down all sessions");
        for context in contexts {
            context.destroy().await;
        }
    }
}

impl SessionRegistry for SessionServer {
    fn on_session_resume_timeout(&self, context: Arc<SessionContext>) {
        let session_id = context.session_id().clone();
        // Only evict the exact context that timed out.
        let removed = self
            .contexts
            .remove_if(&session_id, |_, registered| Arc::ptr_eq(registered, &context));
        if removed.is_none() {
            debug!(%session_id, "timed-out session was already gone");
            return;
        }

        info!(%session_id, "session expired without resuming");
        // Runs on the context's own scheduler; destroy joins it, so it
        // has to happen elsewhere.
        tokio::spawn(async move { context.destroy().await });
    }

    fn send_stats(&self, context: &SessionContext) {
        context.send(&Outbound::Stats(self.stats()));
    }
}

impl std::fmt::Debug for SessionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServer")
            .field("sessions", &self.contexts.len())
            .finish_non_exhaustive()
    }
}

/// A random 16-character lowercase alphanumeric id.
fn generate_session_id() -> SessionId {
    let mut rng = rand::rng();
    let id: String = (0..SESSION_ID_LEN)
        .map(|_| {
            let index = rng.random_range(0..SESSION_ID_ALPHABET.len());
            SESSION_ID_ALPHABET[index] as char
        })
        .collect();
    SessionId::from(id)
}
