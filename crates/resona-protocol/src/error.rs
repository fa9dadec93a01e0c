//! Error types for the protocol layer.
//!
//! Each crate in Resona defines its own error enum. When you see a
//! `ProtocolError`, the problem is in serialization or deserialization,
//! not in networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into a text frame).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning a text frame into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `op`, missing required
    /// fields, or wrong data types.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
