//! Upgrade-time authorization.
//!
//! Clients authenticate with headers on the WebSocket upgrade request,
//! before any session exists:
//!
//! - `Authorization`: must equal the configured password, if one is set.
//! - `User-Id`: the client's user id; required.
//! - `Session-Id`: optional; names a paused session to resume.
//!
//! A failed check refuses the upgrade with an HTTP status, so the client
//! never sees a `hello`.

use std::sync::Arc;

use resona_transport::{ConnectRequest, HandshakeGuard, TransportError};

/// Checks the upgrade headers of `request`.
///
/// # Errors
/// [`TransportError::Rejected`] with status 401 when `Authorization` is
/// missing, 403 when it is wrong and 400 when `User-Id` is missing.
pub fn authorize(request: &ConnectRequest, password: Option<&str>) -> Result<(), TransportError> {
    if let Some(expected) = password {
        match request.header("authorization") {
            None => return Err(rejected(401, "missing Authorization header")),
            Some(given) if given != expected => {
                return Err(rejected(403, "invalid Authorization header"));
            }
            Some(_) => {}
        }
    }

    if request.header("user-id").is_none_or(str::is_empty) {
        return Err(rejected(400, "missing User-Id header"));
    }
    Ok(())
}

/// The guard installed on the transport.
pub(crate) fn handshake_guard(password: Option<String>) -> HandshakeGuard {
    Arc::new(move |request: &ConnectRequest| authorize(request, password.as_deref()))
}

fn rejected(status: u16, reason: &str) -> TransportError {
    TransportError::Rejected {
        status,
        reason: reason.into(),
    }
}
