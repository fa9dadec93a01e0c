//! Backlog of frames produced while a session is paused.

use std::collections::VecDeque;

/// FIFO buffer of encoded frames.
///
/// Unbounded; a paused session is evicted after its resume timeout, which
/// is what limits growth in practice. Not synchronized on its own: it
/// lives inside the dispatcher's lock together with the state flag, so a
/// frame is either queued before the flip to open or sent after it.
#[derive(Debug, Default)]
pub(crate) struct ResumeQueue {
    frames: VecDeque<String>,
}

impl ResumeQueue {
    pub(crate) fn push(&mut self, frame: String) {
        self.frames.push_back(frame);
    }

    /// Removes and yields every frame, oldest first.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = String> + '_ {
        self.frames.drain(..)
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}
