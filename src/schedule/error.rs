//! Scheduled timer error types.

use thiserror::Error;

use crate::daemon::TimerError;
use crate::settings::SettingsError;

/// Errors that can occur while managing scheduled timers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Hour or minute outside a valid time of day.
    #[error("invalid time of day {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    /// Scheduled runs last between one minute and one day.
    #[error("scheduled timer duration must be between 1 and 1440 minutes")]
    InvalidDuration,

    /// No definition with this id exists.
    #[error("scheduled timer '{0}' not found")]
    NotFound(String),

    /// The alarm backend refused the request.
    #[error("alarm scheduling failed: {0}")]
    Alarm(String),

    /// The clock reading cannot be placed in the configured time zone.
    #[error("clock value {0} is out of range")]
    ClockOutOfRange(i64),

    /// Loading or saving the definition list failed.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Starting the triggered run failed.
    #[error(transparent)]
    Timer(#[from] TimerError),
}

impl ScheduleError {
    /// Returns true if the request was invalid and can be corrected.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidTime { .. } | Self::InvalidDuration | Self::NotFound(_)
        )
    }
}
