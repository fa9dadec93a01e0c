//! # Resona
//!
//! Resumable session server for audio-playback nodes.
//!
//! Clients open a WebSocket, get a `hello` with their session id and then
//! drive per-guild players over it. When the connection drops, a session
//! with resuming enabled is kept alive for its resume timeout: everything
//! it would have sent is queued and replayed, in order, once the client
//! reconnects with a `Session-Id` header.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resona::prelude::*;
//!
//! # async fn start() -> Result<(), ResonaError> {
//! let server = ResonaServer::builder()
//!     .bind("0.0.0.0:2333")
//!     .password("youshallnotpass")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod auth;
mod config;
mod error;
mod handler;
mod registry;
mod server;
mod voice;

pub use auth::authorize;
pub use config::ServerConfig;
pub use error::ResonaError;
pub use registry::{SESSION_ID_LEN, SessionServer, VoiceClientFactory};
pub use server::{ResonaServer, ResonaServerBuilder};
pub use voice::{DetachedConnection, DetachedVoiceClient, detached_voice_factory};

/// Everything needed to run a node and hook into its sessions.
pub mod prelude {
    pub use crate::{ResonaError, ResonaServer, ResonaServerBuilder, ServerConfig, SessionServer};
    pub use resona_protocol::{GuildId, Inbound, Outbound, SessionId, UserId, VoiceEvent};
    pub use resona_session::{
        LibraryVersions, Player, SessionConfig, SessionContext, SessionError,
        SessionEventHandler, SessionRegistry, SessionState, VoiceClient, VoiceConnection,
        VoiceEventListener,
    };
}
