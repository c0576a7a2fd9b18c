//! Settings store error types.

use thiserror::Error;

/// Errors that can occur while reading or writing settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The key name is not part of the fixed key set.
    #[error("unknown settings key '{0}'")]
    UnknownKey(String),

    /// The value kind does not match the key.
    #[error("settings key '{key}' expects {expected}, got {found}")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// The value has the right kind but is not acceptable.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },

    /// Reading or writing the backing file failed.
    #[error("settings I/O error: {0}")]
    Io(String),

    /// Encoding or decoding the settings failed.
    #[error("settings serialization error: {0}")]
    Serialization(String),

    /// The backend refused the operation.
    #[error("settings backend error: {0}")]
    Backend(String),
}

impl SettingsError {
    /// Returns true for failures of the storage itself, as opposed to
    /// caller mistakes.
    #[must_use]
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Serialization(_) | Self::Backend(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SettingsError::UnknownKey("darkMode".into());
        assert_eq!(err.to_string(), "unknown settings key 'darkMode'");

        let err = SettingsError::TypeMismatch {
            key: "vibrateOnCompletion",
            expected: "flag",
            found: "long",
        };
        assert!(err.to_string().contains("expects flag, got long"));
    }

    #[test]
    fn test_is_persistence_failure() {
        assert!(SettingsError::Io("disk full".into()).is_persistence_failure());
        assert!(SettingsError::Backend("x".into()).is_persistence_failure());
        assert!(!SettingsError::UnknownKey("x".into()).is_persistence_failure());
    }
}
