//! The lifecycle states of a session context.

use std::fmt;

/// Where a [`SessionContext`](crate::SessionContext) is in its lifecycle.
///
/// ```text
///   Open ──(pause)──→ Resumable ──(resume)──→ Open
///     │                   │
///     └─────(destroy)─────┴──(destroy / timeout)──→ Destroyed
/// ```
///
/// - **Open**: a live transport is attached; sends go straight out.
/// - **Resumable**: the transport is gone, sends pile up in the resume
///   queue until a new transport is attached or the deadline passes.
/// - **Destroyed**: terminal. Sends are dropped, players and voice
///   connections have been torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Open,
    Resumable,
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Resumable => "resumable",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}
