//! Media control error types.

use thiserror::Error;

/// Errors that can occur while listing or controlling media sessions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Media session access was not granted.
    #[error("media session access denied")]
    AccessDenied,

    /// The targeted package has no active session.
    #[error("no active media session for '{0}'")]
    SessionNotFound(String),

    /// The platform rejected the command.
    #[error("media command failed: {0}")]
    CommandFailed(String),
}

impl MediaError {
    /// Returns true if the timer should carry on after this error.
    ///
    /// A failed media command never interrupts the timer.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }
}
