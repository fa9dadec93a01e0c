//! The session context: everything one client connection owns.
//!
//! A context is created when a client connects and lives until it is
//! destroyed, either because the client left for good or because it did
//! not come back within its resume timeout. In between, the transport
//! underneath it may be swapped: [`SessionContext::pause`] detaches a dead
//! transport and starts queueing, [`SessionContext::resume`] attaches a new
//! one and replays the backlog.
//!
//! # Ownership
//!
//! ```text
//! SessionRegistry ──Arc──→ SessionContext ──Arc──→ Player
//!        ↑                     │    ↑                 │
//!        └────────Arc──────────┘    └──────Weak───────┘
//!                               (also Weak from scheduled tasks
//!                                and voice event translators)
//! ```
//!
//! The registry drops its entry when the context is destroyed, which
//! breaks the only strong cycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use dashmap::DashMap;
use resona_protocol::{
    Codec, GuildId, Inbound, JsonCodec, NodeInfo, Outbound, SessionId, UserId,
};
use resona_schedule::{Scheduler, TaskHandle};
use resona_transport::{Connection, ConnectionId};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::{
    EventEmitter, Player, SessionConfig, SessionError, SessionRegistry, SessionState,
    VoiceClient, VoiceConnection, VoiceEventTranslator,
};

/// Cadence of the stats tick.
pub const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// The collaborators a context is wired to.
#[derive(Clone)]
pub struct SessionDeps {
    /// Voice client scoped to this session.
    pub voice: Arc<dyn VoiceClient>,
    pub registry: Arc<dyn SessionRegistry>,
    pub events: EventEmitter,
    /// Sent in `hello`.
    pub info: NodeInfo,
}

/// One client's session.
pub struct SessionContext {
    session_id: SessionId,
    user_id: UserId,
    config: SessionConfig,
    resuming: AtomicBool,
    resume_timeout_secs: AtomicU64,

    players: DashMap<GuildId, Arc<Player>>,
    voice: Arc<dyn VoiceClient>,
    /// Serializes voice connection creation so each connection gets a
    /// single translator.
    voice_binding: Mutex<()>,

    registry: Arc<dyn SessionRegistry>,
    events: EventEmitter,
    dispatcher: Dispatcher,
    codec: JsonCodec,

    /// Stats tick and resume deadline.
    executor: Scheduler,
    /// Per-player snapshots.
    player_updates: Scheduler,
    resume_timer: Mutex<Option<TaskHandle>>,
    destroyed: AtomicBool,

    self_ref: Weak<SessionContext>,
}

impl SessionContext {
    /// Creates a context on `transport`, sends `hello` and starts the
    /// stats tick.
    ///
    /// # Errors
    /// Fails if the stats tick cannot be scheduled (no Tokio runtime).
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        transport: Arc<dyn Connection>,
        config: SessionConfig,
        deps: SessionDeps,
    ) -> Result<Arc<Self>, SessionError> {
        let SessionDeps {
            voice,
            registry,
            events,
            info,
        } = deps;

        let context = Arc::new_cyclic(|self_ref| Self {
            dispatcher: Dispatcher::new(session_id.clone(), transport),
            executor: Scheduler::new(format!("session-{session_id}")),
            player_updates: Scheduler::new(format!("player-updates-{session_id}")),
            resuming: AtomicBool::new(config.resuming),
            resume_timeout_secs: AtomicU64::new(config.resume_timeout_secs),
            session_id,
            user_id,
            config,
            players: DashMap::new(),
            voice,
            voice_binding: Mutex::new(()),
            registry,
            events,
            codec: JsonCodec,
            resume_timer: Mutex::new(None),
            destroyed: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        });

        context.send(&Outbound::Hello {
            session_id: context.session_id.clone(),
            info,
        });

        let weak = Arc::downgrade(&context);
        context
            .executor
            .schedule_at_fixed_rate(Duration::ZERO, STATS_INTERVAL, move || {
                if let Some(context) = weak.upgrade() {
                    context.registry.send_stats(&context);
                }
            })?;

        info!(
            session_id = %context.session_id,
            user_id = %context.user_id,
            "session context created"
        );
        Ok(context)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    pub fn voice_client(&self) -> &Arc<dyn VoiceClient> {
        &self.voice
    }

    pub(crate) fn player_updates(&self) -> &Scheduler {
        &self.player_updates
    }

    pub fn state(&self) -> SessionState {
        if self.destroyed.load(Ordering::Acquire) {
            return SessionState::Destroyed;
        }
        self.dispatcher.state()
    }

    pub fn is_paused(&self) -> bool {
        self.state() == SessionState::Resumable
    }

    /// Frames waiting for a resume.
    pub fn queued_frames(&self) -> usize {
        self.dispatcher.queue_len()
    }

    pub fn is_resuming(&self) -> bool {
        self.resuming.load(Ordering::Acquire)
    }

    pub fn set_resuming(&self, resuming: bool) {
        self.resuming.store(resuming, Ordering::Release);
    }

    pub fn resume_timeout(&self) -> Duration {
        Duration::from_secs(self.resume_timeout_secs.load(Ordering::Acquire))
    }

    pub fn set_resume_timeout(&self, timeout: Duration) {
        self.resume_timeout_secs
            .store(timeout.as_secs(), Ordering::Release);
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Applies a client op to this session.
    pub fn handle_inbound(&self, message: Inbound) {
        match message {
            Inbound::ConfigureResuming { resuming, timeout } => {
                self.set_resuming(resuming);
                if let Some(secs) = timeout {
                    self.set_resume_timeout(Duration::from_secs(secs));
                }
                debug!(
                    session_id = %self.session_id,
                    resuming,
                    timeout_secs = self.resume_timeout().as_secs(),
                    "resuming configured"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Encodes and dispatches a message.
    ///
    /// Never fails for the caller. Depending on the state the frame is
    /// sent, queued for resume or dropped; encoding errors are logged.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) {
        match self.codec.encode(message) {
            Ok(frame) => self.send_frame(frame),
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "failed to encode message");
            }
        }
    }

    /// Dispatches a raw JSON payload.
    pub fn send_json(&self, payload: &serde_json::Value) {
        self.send(payload);
    }

    fn send_frame(&self, frame: String) {
        self.events.message_out(self, &frame);
        self.dispatcher.dispatch(frame);
    }

    /// Id of the attached transport. `None` while paused or destroyed.
    pub fn transport_id(&self) -> Option<ConnectionId> {
        self.dispatcher.transport().map(|transport| transport.id())
    }

    /// Closes the attached transport, if there is one.
    pub fn close_transport(&self, code: Option<u16>, reason: Option<String>) {
        if let Some(transport) = self.dispatcher.transport() {
            transport.close(code, reason);
        }
    }

    // -----------------------------------------------------------------------
    // Players
    // -----------------------------------------------------------------------

    /// The player for `guild_id`, created on first use.
    ///
    /// Concurrent callers for the same guild all get the same player and
    /// the "new player" hook fires once.
    pub fn get_or_create_player(&self, guild_id: GuildId) -> Arc<Player> {
        let mut created = false;
        let player = {
            let entry = self.players.entry(guild_id).or_insert_with(|| {
                created = true;
                Arc::new(Player::new(guild_id, self.self_ref.clone()))
            });
            Arc::clone(entry.value())
        };

        if created {
            debug!(session_id = %self.session_id, %guild_id, "player created");
            self.events.new_player(self, &player);
        }
        player
    }

    pub fn get_existing_player(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of all players.
    pub fn players(&self) -> HashMap<GuildId, Arc<Player>> {
        self.players
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn playing_players(&self) -> Vec<Arc<Player>> {
        self.players
            .iter()
            .filter(|entry| entry.value().is_playing())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Removes and destroys the player for `guild_id`.
    ///
    /// The voice connection for the guild is torn down even when there was
    /// no player, so a connection opened without one cannot leak.
    pub fn destroy_player(&self, guild_id: GuildId) {
        if let Some((_, player)) = self.players.remove(&guild_id) {
            self.events.destroy_player(self, &player);
            player.destroy();
        }
        self.voice.destroy_connection(guild_id);
    }

    // -----------------------------------------------------------------------
    // Voice
    // -----------------------------------------------------------------------

    /// The voice connection for `player`'s guild, opened on first use with
    /// a translator attached.
    pub fn get_or_create_voice_connection(&self, player: &Player) -> Arc<dyn VoiceConnection> {
        let guild_id = player.guild_id();
        let _binding = self.voice_binding.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(connection) = self.voice.get_connection(guild_id) {
            return connection;
        }

        let connection = self.voice.create_connection(guild_id);
        connection.register_listener(Arc::new(VoiceEventTranslator::new(
            self.self_ref.clone(),
            guild_id,
        )));
        debug!(session_id = %self.session_id, %guild_id, "voice connection created");
        connection
    }

    pub fn get_existing_voice_connection(&self, player: &Player) -> Option<Arc<dyn VoiceConnection>> {
        self.voice.get_connection(player.guild_id())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Lock order: this slot first, then the dispatcher.
    fn resume_timer(&self) -> MutexGuard<'_, Option<TaskHandle>> {
        self.resume_timer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Detaches the transport and starts the resume deadline.
    ///
    /// From now on every send is queued. If [`resume`](Self::resume) does
    /// not happen within the resume timeout, the registry is told through
    /// [`SessionRegistry::on_session_resume_timeout`].
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] unless the session is open.
    pub fn pause(&self) -> Result<(), SessionError> {
        // Held until the deadline is armed, so a concurrent resume either
        // sees the session still open or finds the timer to cancel.
        let mut resume_timer = self.resume_timer();
        self.dispatcher.pause()?;

        let timeout = self.resume_timeout();
        let weak = self.self_ref.clone();
        let registry = Arc::clone(&self.registry);
        let timer = self.executor.schedule_once(timeout, move || {
            if let Some(context) = weak.upgrade() {
                info!(session_id = %context.session_id, "resume timeout reached");
                registry.on_session_resume_timeout(context);
            }
        })?;
        if let Some(previous) = resume_timer.replace(timer) {
            previous.cancel();
        }
        drop(resume_timer);

        info!(
            session_id = %self.session_id,
            timeout_secs = timeout.as_secs(),
            "session paused"
        );
        self.events.paused(self);
        Ok(())
    }

    /// Attaches `transport` to a paused session.
    ///
    /// Replays the backlog in order, then sends one `playerUpdate` per
    /// player and finally `resume`.
    ///
    /// # Errors
    /// - [`SessionError::InvalidState`] unless the session is paused.
    /// - [`SessionError::ResumeExpired`] if the resume deadline already
    ///   fired; the session is on its way out and the caller should start
    ///   a new one.
    pub fn resume(&self, transport: Arc<dyn Connection>) -> Result<(), SessionError> {
        let replayed = {
            let mut resume_timer = self.resume_timer();
            self.dispatcher.ensure_resumable()?;

            if resume_timer.as_ref().is_some_and(|timer| !timer.cancel()) {
                warn!(session_id = %self.session_id, "resume lost the race with its timeout");
                return Err(SessionError::ResumeExpired(self.session_id.clone()));
            }
            resume_timer.take();
            self.dispatcher.resume(transport)?
        };
        info!(session_id = %self.session_id, replayed, "session resumed");

        for player in self.players().into_values() {
            self.registry.send_player_update(self, &player);
        }
        self.send(&Outbound::Resume {
            session_id: self.session_id.clone(),
        });
        Ok(())
    }

    /// Tears the session down. Later calls do nothing.
    ///
    /// Stops both schedulers and waits for their tasks, destroys every
    /// player, closes the voice client and fires the "destroyed" hook.
    /// Must not be awaited from one of this context's own scheduled tasks.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let playing = self.playing_players().len();
        info!(
            session_id = %self.session_id,
            playing,
            "shutting down session context"
        );

        self.dispatcher.destroy();
        let timer = self.resume_timer().take();
        if let Some(timer) = timer {
            timer.cancel();
        }
        self.executor.shutdown().await;
        self.player_updates.shutdown().await;

        let guilds: Vec<GuildId> = self.players.iter().map(|entry| *entry.key()).collect();
        for guild_id in guilds {
            self.destroy_player(guild_id);
        }
        self.voice.close();

        self.events.destroyed(self);
        debug!(session_id = %self.session_id, "session context destroyed");
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .field("players", &self.players.len())
            .finish_non_exhaustive()
    }
}
