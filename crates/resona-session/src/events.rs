//! Lifecycle hooks for extensions.
//!
//! Extensions observe a session by implementing [`SessionEventHandler`]
//! and registering it with the [`EventEmitter`] a context is built with.
//! Every hook has an empty default, so a handler only overrides what it
//! cares about:
//!
//! ```rust
//! use resona_session::{SessionContext, SessionEventHandler};
//!
//! struct FrameCounter(std::sync::atomic::AtomicUsize);
//!
//! impl SessionEventHandler for FrameCounter {
//!     fn on_web_socket_message_out(&self, _context: &SessionContext, _frame: &str) {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!     }
//! }
//! ```
//!
//! Hooks run synchronously on whatever task triggered the event, so they
//! must not block.

use std::sync::Arc;

use crate::{Player, SessionContext};

/// Observer of session lifecycle milestones.
pub trait SessionEventHandler: Send + Sync + 'static {
    /// A player was created for a guild. Fires once per player.
    fn on_new_player(&self, _context: &SessionContext, _player: &Arc<Player>) {}

    /// A player is about to be destroyed.
    fn on_destroy_player(&self, _context: &SessionContext, _player: &Arc<Player>) {}

    /// The transport went away and the session is waiting for a resume.
    fn on_socket_context_paused(&self, _context: &SessionContext) {}

    /// The session was torn down.
    fn on_socket_context_destroyed(&self, _context: &SessionContext) {}

    /// A frame is about to be dispatched. Called for every send,
    /// including frames that end up queued or dropped.
    fn on_web_socket_message_out(&self, _context: &SessionContext, _frame: &str) {}
}

/// Fans each event out to every registered handler, in registration order.
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Vec<Arc<dyn SessionEventHandler>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler (builder style).
    pub fn with(mut self, handler: Arc<dyn SessionEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn register(&mut self, handler: Arc<dyn SessionEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn new_player(&self, context: &SessionContext, player: &Arc<Player>) {
        for handler in &self.handlers {
            handler.on_new_player(context, player);
        }
    }

    pub(crate) fn destroy_player(&self, context: &SessionContext, player: &Arc<Player>) {
        for handler in &self.handlers {
            handler.on_destroy_player(context, player);
        }
    }

    pub(crate) fn paused(&self, context: &SessionContext) {
        for handler in &self.handlers {
            handler.on_socket_context_paused(context);
        }
    }

    pub(crate) fn destroyed(&self, context: &SessionContext) {
        for handler in &self.handlers {
            handler.on_socket_context_destroyed(context);
        }
    }

    pub(crate) fn message_out(&self, context: &SessionContext, frame: &str) {
        for handler in &self.handlers {
            handler.on_web_socket_message_out(context, frame);
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
