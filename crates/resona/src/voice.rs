//! A voice client that never connects anywhere.
//!
//! Used when no real voice backend is plugged in: connections are tracked
//! so sessions can bind and tear them down, but they never report being
//! connected and never emit events.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use resona_protocol::{GuildId, SessionId, UserId};
use resona_session::{VoiceClient, VoiceConnection, VoiceEventListener};

use crate::registry::VoiceClientFactory;

/// A factory handing every session its own [`DetachedVoiceClient`].
pub fn detached_voice_factory() -> VoiceClientFactory {
    Arc::new(|_: &SessionId, _: &UserId| -> Arc<dyn VoiceClient> {
        Arc::new(DetachedVoiceClient::new())
    })
}

#[derive(Debug, Default)]
pub struct DetachedVoiceClient {
    connections: DashMap<GuildId, Arc<DetachedConnection>>,
}

impl DetachedVoiceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl VoiceClient for DetachedVoiceClient {
    fn get_connection(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceConnection>> {
        self.connections
            .get(&guild_id)
            .map(|entry| Arc::clone(entry.value()) as Arc<dyn VoiceConnection>)
    }

    fn create_connection(&self, guild_id: GuildId) -> Arc<dyn VoiceConnection> {
        let connection = Arc::clone(
            self.connections
                .entry(guild_id)
                .or_insert_with(|| Arc::new(DetachedConnection::new(guild_id)))
                .value(),
        );
        connection
    }

    fn destroy_connection(&self, guild_id: GuildId) {
        self.connections.remove(&guild_id);
    }

    fn close(&self) {
        self.connections.clear();
    }
}

pub struct DetachedConnection {
    guild_id: GuildId,
    listener: Mutex<Option<Arc<dyn VoiceEventListener>>>,
}

impl DetachedConnection {
    fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            listener: Mutex::new(None),
        }
    }
}

impl VoiceConnection for DetachedConnection {
    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn register_listener(&self, listener: Arc<dyn VoiceEventListener>) {
        *self.listener.lock().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn gateway_ping(&self) -> Option<i64> {
        None
    }
}

impl std::fmt::Debug for DetachedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachedConnection")
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}
