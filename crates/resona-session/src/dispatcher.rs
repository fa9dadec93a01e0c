//! Outbound dispatch: transmit now, queue for later, or drop.
//!
//! The stored phase, the attached transport and the resume queue sit
//! behind ONE mutex. Every send takes that lock, looks at the phase and
//! either hands the frame to the transport, appends it to the queue, or
//! drops it. Resume takes the same lock to flip the phase and replay the
//! queue, so a send racing with resume lands either in the queue before
//! the replay or on the wire after it, never in between.
//!
//! The critical section never waits on I/O: [`Connection::send_text`] is a
//! non-blocking hand-off to the connection's writer task.

use std::sync::{Arc, Mutex, MutexGuard};

use resona_protocol::SessionId;
use resona_transport::Connection;
use tracing::{error, trace};

use crate::SessionError;
use crate::SessionState;
use crate::queue::ResumeQueue;

/// What happened to a dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatched {
    Sent,
    Queued,
    Dropped,
}

struct Inner {
    phase: SessionState,
    transport: Option<Arc<dyn Connection>>,
    queue: ResumeQueue,
}

pub(crate) struct Dispatcher {
    session_id: SessionId,
    inner: Mutex<Inner>,
}

impl Dispatcher {
    pub(crate) fn new(session_id: SessionId, transport: Arc<dyn Connection>) -> Self {
        Self {
            session_id,
            inner: Mutex::new(Inner {
                phase: SessionState::Open,
                transport: Some(transport),
                queue: ResumeQueue::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing inside the lock can leave `Inner` half-updated, so a
        // poisoned lock is still safe to use.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn dispatch(&self, frame: String) -> Dispatched {
        let mut inner = self.lock();
        match inner.phase {
            SessionState::Destroyed => Dispatched::Dropped,
            SessionState::Resumable => {
                inner.queue.push(frame);
                Dispatched::Queued
            }
            SessionState::Open => match &inner.transport {
                Some(transport) if transport.is_open() => {
                    trace!(session_id = %self.session_id, len = frame.len(), "sending frame");
                    if let Err(e) = transport.send_text(frame) {
                        error!(session_id = %self.session_id, error = %e, "failed to send frame");
                    }
                    Dispatched::Sent
                }
                // Closed but not paused yet: dropped, not queued.
                _ => Dispatched::Dropped,
            },
        }
    }

    /// The observable state: the stored phase, with a dead transport
    /// reported as destroyed.
    pub(crate) fn state(&self) -> SessionState {
        let inner = self.lock();
        match inner.phase {
            SessionState::Open => match &inner.transport {
                Some(transport) if transport.is_open() => SessionState::Open,
                _ => SessionState::Destroyed,
            },
            phase => phase,
        }
    }

    /// Open → Resumable. Returns the detached transport, if any.
    ///
    /// Only the stored phase is checked, so a session whose transport
    /// just died can still be paused.
    pub(crate) fn pause(&self) -> Result<Option<Arc<dyn Connection>>, SessionError> {
        let mut inner = self.lock();
        if inner.phase != SessionState::Open {
            return Err(SessionError::InvalidState {
                operation: "pause",
                state: inner.phase,
            });
        }
        inner.phase = SessionState::Resumable;
        Ok(inner.transport.take())
    }

    pub(crate) fn ensure_resumable(&self) -> Result<(), SessionError> {
        let inner = self.lock();
        if inner.phase != SessionState::Resumable {
            return Err(SessionError::InvalidState {
                operation: "resume",
                state: inner.phase,
            });
        }
        Ok(())
    }

    /// Resumable → Open on `transport`, replaying the backlog in order.
    /// Returns how many frames were replayed.
    pub(crate) fn resume(&self, transport: Arc<dyn Connection>) -> Result<usize, SessionError> {
        let mut inner = self.lock();
        if inner.phase != SessionState::Resumable {
            return Err(SessionError::InvalidState {
                operation: "resume",
                state: inner.phase,
            });
        }
        inner.phase = SessionState::Open;

        let Inner { queue, .. } = &mut *inner;
        let mut replayed = 0;
        for frame in queue.drain() {
            if let Err(e) = transport.send_text(frame) {
                error!(session_id = %self.session_id, error = %e, "failed to replay frame");
            }
            replayed += 1;
        }
        inner.transport = Some(transport);
        Ok(replayed)
    }

    /// Any → Destroyed. Discards the backlog and returns the transport.
    pub(crate) fn destroy(&self) -> Option<Arc<dyn Connection>> {
        let mut inner = self.lock();
        inner.phase = SessionState::Destroyed;
        inner.queue.clear();
        inner.transport.take()
    }

    pub(crate) fn transport(&self) -> Option<Arc<dyn Connection>> {
        self.lock().transport.clone()
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }
}
