//! `ResonaServer` builder and server loop.
//!
//! This is the entry point for running a Resona node. It ties together
//! all the layers: transport → protocol → session.

use std::future::Future;
use std::sync::Arc;

use resona_session::{
    EventEmitter, LibraryVersions, SessionConfig, SessionEventHandler, node_info,
};
use resona_transport::{TransportError, WebSocketTransport};

use crate::ResonaError;
use crate::auth::handshake_guard;
use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::registry::{SessionServer, VoiceClientFactory};
use crate::voice::detached_voice_factory;

/// Builder for configuring and starting a Resona node.
///
/// # Example
///
/// ```rust,ignore
/// use resona::prelude::*;
///
/// let server = ResonaServer::builder()
///     .bind("0.0.0.0:2333")
///     .password("youshallnotpass")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ResonaServerBuilder {
    config: ServerConfig,
    events: EventEmitter,
    voice: Option<VoiceClientFactory>,
}

impl ResonaServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            events: EventEmitter::new(),
            voice: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Requires clients to send this value in `Authorization`.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Sets the library versions reported in `hello`.
    pub fn libraries(mut self, libraries: LibraryVersions) -> Self {
        self.config.libraries = libraries;
        self
    }

    /// Registers an observer for every session on this node.
    pub fn event_handler(mut self, handler: Arc<dyn SessionEventHandler>) -> Self {
        self.events.register(handler);
        self
    }

    /// Supplies the voice client for each new session. Without one,
    /// sessions get a [`DetachedVoiceClient`](crate::DetachedVoiceClient).
    pub fn voice_client_factory(mut self, factory: VoiceClientFactory) -> Self {
        self.voice = Some(factory);
        self
    }

    /// Binds the listener and builds the server.
    pub async fn build(self) -> Result<ResonaServer, ResonaError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr)
            .await?
            .with_guard(handshake_guard(self.config.password.clone()));

        let voice = self.voice.unwrap_or_else(detached_voice_factory);
        let sessions = SessionServer::new(
            self.config.session.clone(),
            node_info(&self.config.libraries),
            self.events,
            voice,
        );

        Ok(ResonaServer {
            transport,
            sessions,
        })
    }
}

impl Default for ResonaServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Resona node, ready to accept connections.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ResonaServer {
    transport: WebSocketTransport,
    sessions: Arc<SessionServer>,
}

impl ResonaServer {
    /// Creates a new builder.
    pub fn builder() -> ResonaServerBuilder {
        ResonaServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The session registry, for inspecting or driving sessions.
    pub fn sessions(&self) -> &Arc<SessionServer> {
        &self.sessions
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), ResonaError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then destroys
    /// every session.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ResonaError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Resona node running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok((conn, request)) => {
                        let sessions = Arc::clone(&self.sessions);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, request, sessions).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    // Already logged by the transport.
                    Err(TransportError::Rejected { .. }) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        self.sessions.shutdown().await;
        tracing::info!("Resona node stopped");
        Ok(())
    }
}
