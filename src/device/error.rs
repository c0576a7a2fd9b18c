//! Device capability error types.
//!
//! Device failures are always recovered locally: the affected fade step is
//! skipped and the timer keeps running.

use thiserror::Error;

/// Errors returned by volume, brightness and haptics capabilities.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The platform refused the call (e.g. no system-settings write access).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The device or setting is not available on this host.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// A value outside the accepted range was written.
    #[error("value {value} out of range 0..={max}")]
    OutOfRange { value: String, max: String },
}

impl DeviceError {
    /// Returns true if this error is a permission problem.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns true if the caller should skip and continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        true
    }
}
