//! Core protocol types for Resona's wire format.
//!
//! Every outbound frame is a JSON object with an `op` field naming the
//! operation. Events additionally carry an `event` name and the `guildId`
//! they are scoped to:
//!
//! ```text
//! { "op": string, "event"?: string, "guildId"?: string, ...fields }
//! ```
//!
//! Field names are part of the protocol and must stay stable, which is why
//! most of the renames below are spelled out rather than derived.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one client connection's session. Opaque to the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The client (bot) identity that owns a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// The resource a player and its voice connection are scoped to.
///
/// Numeric in memory, but always a *string* on the wire so clients in
/// languages without 64-bit integers don't lose precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct GuildId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GuildId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<GuildId> for String {
    fn from(value: GuildId) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for GuildId {
    type Error = ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Payload blocks
// ---------------------------------------------------------------------------

/// Static information about the running node, sent once in `hello`.
///
/// The source-control fields are only present when the build embedded
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub version: String,
    pub build: String,
    pub host_runtime_version: String,
    pub audio_library_version: String,
    pub dsp_library_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// A point-in-time snapshot of one player, sent in `playerUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    /// Unix time in milliseconds when the snapshot was taken.
    pub time: i64,
    /// Track position in milliseconds; absent when nothing is loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    /// Whether the voice gateway for this guild is connected.
    pub connected: bool,
    /// Voice gateway round-trip in milliseconds, `-1` when unknown.
    pub ping: i64,
    pub playing: bool,
    pub paused: bool,
    pub volume: u16,
}

/// Node-wide counters sent to every session on its stats tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub players: usize,
    pub playing_players: usize,
    /// Node uptime in milliseconds.
    pub uptime: u64,
}

// ---------------------------------------------------------------------------
// Voice events
// ---------------------------------------------------------------------------

/// Voice connection lifecycle events, one per voice-client callback.
///
/// Serialized with the variant name as the `event` field, so the variant
/// names ARE the wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum VoiceEvent {
    /// The voice gateway closed.
    VoiceConnectionClosed {
        guild_id: GuildId,
        code: i32,
        /// Serialized as `null` when the gateway gave no reason.
        reason: Option<String>,
        by_remote: bool,
    },
    /// The voice gateway finished its handshake.
    VoiceConnectionReady {
        guild_id: GuildId,
        ssrc: u32,
        address: String,
    },
    /// The voice gateway resumed after a drop.
    VoiceConnectionResumed { guild_id: GuildId },
    /// Another user's media streams appeared on the connection.
    VoiceUserConnected {
        guild_id: GuildId,
        user_id: String,
        #[serde(rename = "audioSSRC")]
        audio_ssrc: u32,
        #[serde(rename = "videoSSRC")]
        video_ssrc: u32,
        #[serde(rename = "rtxSSRC")]
        rtx_ssrc: u32,
    },
    /// Another user left the connection.
    VoiceUserDisconnected { guild_id: GuildId, user_id: String },
    /// IP discovery found our external address.
    VoiceExternalIpDiscovered { guild_id: GuildId, address: String },
    /// The gateway sent the session description (codec, keys, ...).
    VoiceSessionDescription {
        guild_id: GuildId,
        session: serde_json::Value,
    },
}

impl VoiceEvent {
    /// The guild this event is scoped to.
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::VoiceConnectionClosed { guild_id, .. }
            | Self::VoiceConnectionReady { guild_id, .. }
            | Self::VoiceConnectionResumed { guild_id }
            | Self::VoiceUserConnected { guild_id, .. }
            | Self::VoiceUserDisconnected { guild_id, .. }
            | Self::VoiceExternalIpDiscovered { guild_id, .. }
            | Self::VoiceSessionDescription { guild_id, .. } => *guild_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Player events
// ---------------------------------------------------------------------------

/// Why a track stopped playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    /// Played to the end.
    Finished,
    /// Failed to load or broke while playing.
    LoadFailed,
    /// Stopped on request.
    Stopped,
    /// Another track was started in its place.
    Replaced,
    /// The player was destroyed.
    Cleanup,
}

impl TrackEndReason {
    /// Whether a client queue should move on to its next track.
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Common,
    Suspicious,
    Fault,
}

/// The error attached to a `TrackExceptionEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackException {
    pub message: String,
    pub severity: Severity,
    pub cause: String,
}

/// Playback events of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum PlayerEvent {
    PlayerPauseEvent { guild_id: GuildId },
    PlayerResumeEvent { guild_id: GuildId },
    TrackStartEvent { guild_id: GuildId, track: String },
    TrackEndEvent {
        guild_id: GuildId,
        track: String,
        reason: TrackEndReason,
    },
    TrackExceptionEvent {
        guild_id: GuildId,
        track: String,
        exception: TrackException,
    },
    /// No audio was produced for `threshold_ms`.
    TrackStuckEvent {
        guild_id: GuildId,
        track: String,
        threshold_ms: u64,
    },
}

impl PlayerEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::PlayerPauseEvent { guild_id }
            | Self::PlayerResumeEvent { guild_id }
            | Self::TrackStartEvent { guild_id, .. }
            | Self::TrackEndEvent { guild_id, .. }
            | Self::TrackExceptionEvent { guild_id, .. }
            | Self::TrackStuckEvent { guild_id, .. } => *guild_id,
        }
    }
}

/// Payload of an `event` envelope. Both kinds share the `event` field,
/// whose value names the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Voice(VoiceEvent),
    Player(PlayerEvent),
}

impl Event {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::Voice(event) => event.guild_id(),
            Self::Player(event) => event.guild_id(),
        }
    }
}

impl From<VoiceEvent> for Event {
    fn from(event: VoiceEvent) -> Self {
        Self::Voice(event)
    }
}

impl From<PlayerEvent> for Event {
    fn from(event: PlayerEvent) -> Self {
        Self::Player(event)
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Every message the server sends over the control connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Outbound {
    /// First frame of every session.
    Hello { session_id: SessionId, info: NodeInfo },
    /// Sent after a resumed session has replayed its backlog.
    Resume { session_id: SessionId },
    /// A voice or player event; its fields are flattened next to `op`.
    Event(Event),
    /// A player snapshot.
    PlayerUpdate { guild_id: GuildId, state: PlayerState },
    /// Node-wide statistics.
    Stats(Stats),
}

/// Messages a client may send over the control connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Inbound {
    /// Enables or disables resuming for this session and optionally
    /// changes the grace period (seconds).
    ConfigureResuming {
        resuming: bool,
        #[serde(default)]
        timeout: Option<u64>,
    },
}
