//! Wire protocol for Resona.
//!
//! This crate defines the "language" spoken over the control connection:
//!
//! - **Types** ([`Outbound`], [`VoiceEvent`], [`PlayerEvent`], [`Inbound`], ids, payload
//!   blocks): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those structures
//!   become text frames and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! ```text
//! Transport (text frames) → Protocol (Outbound/Inbound) → Session (context)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Event, GuildId, Inbound, NodeInfo, Outbound, PlayerEvent, PlayerState, SessionId,
    Severity, Stats, TrackEndReason, TrackException, UserId, VoiceEvent,
};
