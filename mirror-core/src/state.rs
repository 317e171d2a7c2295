//! Stream lifecycle state shared by senders and receivers.
//!
//! ```text
//!  Active ──► Closed
//! ```
//!
//! There is no idle state: a stream is active from creation until it
//! is destroyed or its transport fails.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::MirrorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Active,
    Closed,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl StreamState {
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    /// `Ok(())` while active, [`MirrorError::Closed`] afterwards.
    pub fn ensure_active(self) -> Result<(), MirrorError> {
        match self {
            Self::Active => Ok(()),
            Self::Closed => Err(MirrorError::Closed),
        }
    }
}

/// Atomic [`StreamState`] readable from the handle while the worker
/// runs.
#[derive(Debug, Default)]
pub(crate) struct StateCell {
    closed: AtomicBool,
}

impl StateCell {
    pub(crate) fn get(&self) -> StreamState {
        if self.closed.load(Ordering::SeqCst) {
            StreamState::Closed
        } else {
            StreamState::Active
        }
    }

    /// Transition to `Closed`. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
