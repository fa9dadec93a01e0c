//! Transport abstraction layer for Resona.
//!
//! Provides the [`Connection`] trait that the session layer writes envelopes
//! to, plus a WebSocket implementation.
//!
//! Sending is a *hand-off*: [`Connection::send_text`] queues the frame for a
//! writer and returns immediately. Write failures are observed by the writer
//! and logged there, so callers never block on network I/O.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    HandshakeGuard, WebSocketConnection, WebSocketTransport,
};

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the client presented when it opened the connection.
///
/// Header names are stored lower-cased so lookups are case-insensitive,
/// matching HTTP semantics.
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    /// Peer address, when the transport knows it.
    pub remote_addr: Option<SocketAddr>,
    headers: HashMap<String, String>,
}

impl ConnectRequest {
    /// Creates a request record for the given peer.
    pub fn new(remote_addr: Option<SocketAddr>) -> Self {
        Self {
            remote_addr,
            headers: HashMap::new(),
        }
    }

    /// Records a header. Later values for the same name replace earlier ones.
    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Builder-style variant of [`insert_header`](Self::insert_header).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Looks up a header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A live bidirectional connection the session layer can write to.
///
/// The trait is object-safe so a session can hold an
/// `Arc<dyn Connection>` and swap it for a new one when a client resumes.
pub trait Connection: Send + Sync + 'static {
    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Hands a text frame to the connection's writer.
    ///
    /// Returns once the frame is queued; it does not wait for the bytes to
    /// reach the socket. Frames handed off from one thread are written in
    /// the order they were handed off.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] if the connection is no
    /// longer accepting frames.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Whether the connection is still open for writing.
    fn is_open(&self) -> bool;

    /// Starts a close handshake with an optional close code and reason.
    fn close(&self, code: Option<u16>, reason: Option<String>);
}
