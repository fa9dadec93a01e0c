//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each accepted socket is split in two: the read half stays with the
//! [`WebSocketConnection`] for [`recv`](WebSocketConnection::recv), the write
//! half moves into a dedicated writer task fed by an unbounded channel. That
//! channel is what makes [`Connection::send_text`] a non-blocking hand-off
//! with per-connection ordering.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use crate::{ConnectRequest, Connection, ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Inspects an upgrade request before it is accepted.
///
/// Returning `Err(TransportError::Rejected { .. })` answers the upgrade with
/// that HTTP status and reason instead of switching protocols. Any other
/// error variant is answered with 400.
pub type HandshakeGuard =
    Arc<dyn Fn(&ConnectRequest) -> Result<(), TransportError> + Send + Sync>;

/// A WebSocket listener that produces [`WebSocketConnection`]s.
pub struct WebSocketTransport {
    listener: TcpListener,
    guard: Option<HandshakeGuard>,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            guard: None,
        })
    }

    /// Installs a guard that every upgrade request must pass.
    pub fn with_guard(mut self, guard: HandshakeGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next connection and completes the WebSocket upgrade.
    ///
    /// Returns the connection together with the request headers the client
    /// sent. A request refused by the guard yields
    /// [`TransportError::Rejected`]; the listener stays usable.
    pub async fn accept(
        &self,
    ) -> Result<(WebSocketConnection, ConnectRequest), TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let mut request = ConnectRequest::new(Some(addr));
        let mut rejection: Option<(u16, String)> = None;
        let guard = self.guard.clone();

        let callback = |req: &Request, resp: Response| {
            for (name, value) in req.headers() {
                if let Ok(value) = value.to_str() {
                    request.insert_header(name.as_str(), value);
                }
            }
            let Some(guard) = guard else {
                return Ok(resp);
            };
            match guard(&request) {
                Ok(()) => Ok(resp),
                Err(e) => {
                    let (status, reason) = match e {
                        TransportError::Rejected { status, reason } => {
                            (status, reason)
                        }
                        other => (400, other.to_string()),
                    };
                    let mut error = ErrorResponse::new(Some(reason.clone()));
                    *error.status_mut() = StatusCode::from_u16(status)
                        .unwrap_or(StatusCode::BAD_REQUEST);
                    rejection = Some((status, reason));
                    Err(error)
                }
            }
        };

        let upgraded =
            tokio_tungstenite::accept_hdr_async(stream, callback).await;
        let ws = match upgraded {
            Ok(ws) => ws,
            Err(e) => {
                if let Some((status, reason)) = rejection {
                    tracing::warn!(%addr, status, %reason, "upgrade rejected");
                    return Err(TransportError::Rejected { status, reason });
                }
                return Err(TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                )));
            }
        };

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        Ok((WebSocketConnection::spawn(id, ws), request))
    }
}

/// A single WebSocket connection.
///
/// Cheap to share behind an `Arc`: the read half is behind an async mutex
/// and writes go through the writer task's channel.
pub struct WebSocketConnection {
    id: ConnectionId,
    source: Mutex<WsSource>,
    outgoing: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
}

impl WebSocketConnection {
    fn spawn(id: ConnectionId, ws: WsStream) -> Self {
        let (sink, source) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(write_loop(id, sink, rx, Arc::clone(&open)));

        Self {
            id,
            source: Mutex::new(source),
            outgoing: tx,
            open,
        }
    }

    /// Receives the next text payload from the peer.
    ///
    /// Binary frames are decoded as (lossy) UTF-8. Ping/pong frames are
    /// skipped. Returns `Ok(None)` when the connection is cleanly closed.
    pub async fn recv(&self) -> Result<Option<String>, TransportError> {
        loop {
            let msg = self.source.lock().await.next().await;
            match msg {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(
                        String::from_utf8_lossy(&data).into_owned(),
                    ));
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.open.store(false, Ordering::Release);
                    return Ok(None);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.open.store(false, Ordering::Release);
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }
}

impl Connection for WebSocketConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        self.outgoing
            .send(Message::Text(text.into()))
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outgoing.is_closed()
    }

    fn close(&self, code: Option<u16>, reason: Option<String>) {
        let frame = code.map(|code| CloseFrame {
            code: CloseCode::from(code),
            reason: reason.unwrap_or_default().into(),
        });
        // Ignored when the writer is already gone: the socket is closed anyway.
        let _ = self.outgoing.send(Message::Close(frame));
        self.open.store(false, Ordering::Release);
    }
}

/// Drains queued frames into the socket until the channel closes, a close
/// frame goes out, or a write fails.
async fn write_loop(
    id: ConnectionId,
    mut sink: WsSink,
    mut rx: mpsc::UnboundedReceiver<Message>,
    open: Arc<AtomicBool>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        let len = msg.len();
        if let Err(e) = sink.send(msg).await {
            tracing::error!(%id, error = %e, "WebSocket write failed");
            break;
        }
        tracing::trace!(%id, bytes = len, "frame sent");
        if closing {
            break;
        }
    }
    open.store(false, Ordering::Release);
    tracing::debug!(%id, "writer stopped");
}
