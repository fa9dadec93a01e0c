//! Voice collaborators and the event translator.
//!
//! The real-time voice transport (UDP, RTP, encryption) lives outside this
//! crate. A session only needs to look connections up, create and destroy
//! them per guild, and hear about their lifecycle. Those needs are the
//! three traits below; the server plugs in a concrete voice client.
//!
//! Each connection gets exactly one [`VoiceEventTranslator`], which turns
//! the callbacks of [`VoiceEventListener`] into `event` frames on the
//! owning session.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use resona_protocol::{GuildId, Outbound, VoiceEvent};
use tracing::debug;

use crate::SessionContext;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// The voice client of one session: one connection per guild.
pub trait VoiceClient: Send + Sync + 'static {
    /// The live connection for `guild_id`, if there is one.
    fn get_connection(&self, guild_id: GuildId) -> Option<Arc<dyn VoiceConnection>>;

    /// Opens a connection for `guild_id`.
    fn create_connection(&self, guild_id: GuildId) -> Arc<dyn VoiceConnection>;

    /// Tears down the connection for `guild_id`. Must tolerate guilds
    /// without a connection.
    fn destroy_connection(&self, guild_id: GuildId);

    /// Tears down every connection this client owns.
    fn close(&self);
}

/// One voice connection.
pub trait VoiceConnection: Send + Sync {
    fn guild_id(&self) -> GuildId;

    /// Registers the listener that receives this connection's callbacks.
    fn register_listener(&self, listener: Arc<dyn VoiceEventListener>);

    fn is_connected(&self) -> bool;

    /// Round-trip time to the voice gateway in milliseconds, if measured.
    fn gateway_ping(&self) -> Option<i64>;
}

/// Callbacks a voice connection delivers, one per lifecycle event.
pub trait VoiceEventListener: Send + Sync {
    fn gateway_closed(&self, code: i32, reason: Option<String>, by_remote: bool);
    fn gateway_ready(&self, address: SocketAddr, ssrc: u32);
    fn gateway_resumed(&self);
    fn user_connected(&self, user_id: String, audio_ssrc: u32, video_ssrc: u32, rtx_ssrc: u32);
    fn user_disconnected(&self, user_id: String);
    fn external_ip_discovered(&self, address: SocketAddr);
    fn session_description(&self, session: serde_json::Value);
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

/// Forwards one guild's voice callbacks to its session as `event` frames.
///
/// Holds the session weakly: the voice client may keep its listener alive
/// longer than the session, and a late callback then does nothing.
pub struct VoiceEventTranslator {
    context: Weak<SessionContext>,
    guild_id: GuildId,
}

impl VoiceEventTranslator {
    pub fn new(context: Weak<SessionContext>, guild_id: GuildId) -> Self {
        Self { context, guild_id }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn forward(&self, event: VoiceEvent, refresh_player: bool) {
        let Some(context) = self.context.upgrade() else {
            debug!(guild_id = %self.guild_id, "voice event after session is gone");
            return;
        };

        context.send(&Outbound::Event(event.into()));

        // Connection state changed; clients want the player's view of it.
        if refresh_player {
            if let Some(player) = context.get_existing_player(self.guild_id) {
                context.registry().send_player_update(&context, &player);
            }
        }
    }
}

impl VoiceEventListener for VoiceEventTranslator {
    fn gateway_closed(&self, code: i32, reason: Option<String>, by_remote: bool) {
        self.forward(
            VoiceEvent::VoiceConnectionClosed {
                guild_id: self.guild_id,
                code,
                reason,
                by_remote,
            },
            true,
        );
    }

    fn gateway_ready(&self, address: SocketAddr, ssrc: u32) {
        self.forward(
            VoiceEvent::VoiceConnectionReady {
                guild_id: self.guild_id,
                ssrc,
                address: address.ip().to_string(),
            },
            true,
        );
    }

    fn gateway_resumed(&self) {
        self.forward(
            VoiceEvent::VoiceConnectionResumed {
                guild_id: self.guild_id,
            },
            true,
        );
    }

    fn user_connected(&self, user_id: String, audio_ssrc: u32, video_ssrc: u32, rtx_ssrc: u32) {
        self.forward(
            VoiceEvent::VoiceUserConnected {
                guild_id: self.guild_id,
                user_id,
                audio_ssrc,
                video_ssrc,
                rtx_ssrc,
            },
            false,
        );
    }

    fn user_disconnected(&self, user_id: String) {
        self.forward(
            VoiceEvent::VoiceUserDisconnected {
                guild_id: self.guild_id,
                user_id,
            },
            false,
        );
    }

    fn external_ip_discovered(&self, address: SocketAddr) {
        self.forward(
            VoiceEvent::VoiceExternalIpDiscovered {
                guild_id: self.guild_id,
                address: address.ip().to_string(),
            },
            false,
        );
    }

    fn session_description(&self, session: serde_json::Value) {
        self.forward(
            VoiceEvent::VoiceSessionDescription {
                guild_id: self.guild_id,
                session,
            },
            false,
        );
    }
}
