//! Timer engine error types.

use thiserror::Error;

/// Errors returned by the timer engine and the sleep fader.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The requested duration is zero or too large to represent.
    #[error("invalid timer duration: {0} minutes")]
    InvalidDuration(u64),

    /// The engine task is gone and cannot take commands.
    #[error("timer engine is not running")]
    EngineUnavailable,
}

impl TimerError {
    /// Returns true if the caller can fix the request and retry.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidDuration(_))
    }

    /// Returns a suggestion for resolving the error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::InvalidDuration(_) => "Choose a duration of at least one minute.",
            Self::EngineUnavailable => "Restart the timer service.",
        }
    }
}
