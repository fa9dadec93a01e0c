//! Resumable session contexts for Resona.
//!
//! A [`SessionContext`] is the server-side half of one client connection:
//!
//! 1. **Players**: one [`Player`] per guild, created on demand and owned
//!    by the context.
//! 2. **Voice bindings**: a [`VoiceClient`] per session, with one
//!    [`VoiceEventTranslator`] per connection turning voice callbacks into
//!    `event` frames.
//! 3. **Resuming**: when the transport drops, the context can be paused.
//!    Outbound frames are queued and replayed in order once the client
//!    reconnects with the same session id, or the session is evicted when
//!    the resume timeout passes.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← accepts connections, owns the SessionRegistry
//!     ↕
//! Session layer (this crate)  ← one SessionContext per client
//!     ↕
//! Protocol / Transport / Schedule (below)
//! ```

mod config;
mod context;
mod dispatcher;
mod error;
mod events;
mod info;
mod player;
mod queue;
mod registry;
mod state;
mod voice;

pub use config::{LibraryVersions, SessionConfig};
pub use context::{STATS_INTERVAL, SessionContext, SessionDeps};
pub use error::SessionError;
pub use events::{EventEmitter, SessionEventHandler};
pub use info::node_info;
pub use player::{MAX_VOLUME, Player};
pub use registry::SessionRegistry;
pub use state::SessionState;
pub use voice::{VoiceClient, VoiceConnection, VoiceEventListener, VoiceEventTranslator};
