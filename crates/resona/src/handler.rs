//! Per-connection handler: attach a session, read client ops, and decide
//! what happens to the session when the connection drops.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. `Session-Id` names a paused session → resume it; otherwise (or if
//!      the resume fails) create a new session, which sends `hello`
//!   2. Loop: receive text frames → decode [`Inbound`] → apply to the session
//!   3. On close: pause the session if resuming is enabled, else destroy it

use std::sync::Arc;

use resona_protocol::{Codec, Inbound, JsonCodec, SessionId, UserId};
use resona_session::SessionContext;
use resona_transport::{ConnectRequest, Connection, WebSocketConnection};

use crate::ResonaError;
use crate::registry::SessionServer;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    request: ConnectRequest,
    sessions: Arc<SessionServer>,
) -> Result<(), ResonaError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // The handshake guard already refused requests without a user id.
    let user_id = UserId::from(request.header("user-id").unwrap_or_default());
    let transport: Arc<dyn Connection> = conn.clone();
    let context = attach(&sessions, &request, user_id, transport)?;
    let session_id = context.session_id().clone();

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, %session_id, "connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, %session_id, error = %e, "recv error");
                break;
            }
        };

        match JsonCodec.decode::<Inbound>(&data) {
            Ok(message) => context.handle_inbound(message),
            Err(e) => {
                tracing::debug!(%session_id, error = %e, "ignoring unknown client frame");
            }
        }
    }

    on_disconnect(&sessions, &context, conn.as_ref()).await;
    Ok(())
}

/// Resumes the session named by `Session-Id`, or starts a new one.
fn attach(
    sessions: &Arc<SessionServer>,
    request: &ConnectRequest,
    user_id: UserId,
    transport: Arc<dyn Connection>,
) -> Result<Arc<SessionContext>, ResonaError> {
    if let Some(id) = request.header("session-id") {
        let session_id = SessionId::from(id);
        match sessions.get_existing_context(&session_id) {
            Some(context) => match context.resume(Arc::clone(&transport)) {
                Ok(()) => {
                    tracing::info!(%session_id, %user_id, "session resumed by client");
                    return Ok(context);
                }
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, "resume failed, starting a new session");
                }
            },
            None => {
                tracing::debug!(%session_id, "unknown session id, starting a new session");
            }
        }
    }

    let context = sessions.create_context(user_id, transport)?;
    Ok(context)
}

async fn on_disconnect(sessions: &SessionServer, context: &SessionContext, conn: &dyn Connection) {
    let session_id = context.session_id();

    // A newer connection may have resumed this session already.
    if context.transport_id().is_some_and(|id| id != conn.id()) {
        tracing::debug!(%session_id, "session moved to another connection");
        return;
    }

    if context.is_resuming() {
        if let Err(e) = context.pause() {
            tracing::debug!(%session_id, error = %e, "could not pause session");
        }
        return;
    }

    tracing::info!(%session_id, "client left, destroying session");
    sessions.remove_context(session_id).await;
}
