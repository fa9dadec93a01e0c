//! Unified error type for Resona.

use resona_protocol::ProtocolError;
use resona_schedule::ScheduleError;
use resona_session::SessionError;
use resona_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impls, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ResonaError {
    /// A transport-level error (bind, accept, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (invalid state, expired resume).
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for [`ServerConfig`](crate::ServerConfig).
    #[error("invalid config: {0}")]
    Config(#[source] serde_json::Error),
}
