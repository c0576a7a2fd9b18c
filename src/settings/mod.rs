//! Persistent key-value settings.
//!
//! The timer reads and writes a small fixed key set. Keys are an enum, so an
//! unknown key can only appear when parsing a name from outside (a file or
//! the command line) and is rejected there. Values carry their kind and
//! `set` refuses a value of the wrong kind instead of coercing it.
//!
//! Two stores are provided:
//! - [`MemorySettingsStore`]: in-process, with failure injection for tests
//! - [`JsonFileSettingsStore`]: a JSON object on disk

mod error;
mod file;
mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::types::{ScheduledTimerDefinition, SleepModeSettings};

pub use error::SettingsError;
pub use file::JsonFileSettingsStore;
pub use memory::MemorySettingsStore;

/// Capacity of the change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Default values
// ============================================================================

pub const DEFAULT_MAX_TIMER_DURATION_MINUTES: i64 = 120;
pub const DEFAULT_TIMER_DURATION_MINUTES: i64 = 30;
pub const DEFAULT_VIBRATE_ON_COMPLETION: bool = true;

// ============================================================================
// SettingKey
// ============================================================================

/// The fixed set of settings keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    EndTimeMillis,
    MaxTimerDurationMinutes,
    DefaultTimerDurationMinutes,
    VibrateOnCompletion,
    SleepModeEnabled,
    GradualVolumeReductionEnabled,
    ScreenDimmingEnabled,
    ScheduledTimerDefinitions,
}

impl SettingKey {
    pub const ALL: [SettingKey; 8] = [
        SettingKey::EndTimeMillis,
        SettingKey::MaxTimerDurationMinutes,
        SettingKey::DefaultTimerDurationMinutes,
        SettingKey::VibrateOnCompletion,
        SettingKey::SleepModeEnabled,
        SettingKey::GradualVolumeReductionEnabled,
        SettingKey::ScreenDimmingEnabled,
        SettingKey::ScheduledTimerDefinitions,
    ];

    /// Name used in files and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::EndTimeMillis => "endTimeMillis",
            SettingKey::MaxTimerDurationMinutes => "maxTimerDurationMinutes",
            SettingKey::DefaultTimerDurationMinutes => "defaultTimerDurationMinutes",
            SettingKey::VibrateOnCompletion => "vibrateOnCompletion",
            SettingKey::SleepModeEnabled => "sleepModeEnabled",
            SettingKey::GradualVolumeReductionEnabled => "gradualVolumeReductionEnabled",
            SettingKey::ScreenDimmingEnabled => "screenDimmingEnabled",
            SettingKey::ScheduledTimerDefinitions => "scheduledTimerDefinitions",
        }
    }

    /// Kind of value stored under this key.
    pub fn kind(&self) -> ValueKind {
        match self {
            SettingKey::EndTimeMillis
            | SettingKey::MaxTimerDurationMinutes
            | SettingKey::DefaultTimerDurationMinutes => ValueKind::Long,
            SettingKey::VibrateOnCompletion
            | SettingKey::SleepModeEnabled
            | SettingKey::GradualVolumeReductionEnabled
            | SettingKey::ScreenDimmingEnabled => ValueKind::Flag,
            SettingKey::ScheduledTimerDefinitions => ValueKind::ScheduledTimers,
        }
    }

    /// Value returned when nothing has been stored.
    pub fn default_value(&self) -> SettingValue {
        match self {
            SettingKey::EndTimeMillis => SettingValue::Long(0),
            SettingKey::MaxTimerDurationMinutes => {
                SettingValue::Long(DEFAULT_MAX_TIMER_DURATION_MINUTES)
            }
            SettingKey::DefaultTimerDurationMinutes => {
                SettingValue::Long(DEFAULT_TIMER_DURATION_MINUTES)
            }
            SettingKey::VibrateOnCompletion => SettingValue::Flag(DEFAULT_VIBRATE_ON_COMPLETION),
            SettingKey::SleepModeEnabled
            | SettingKey::GradualVolumeReductionEnabled
            | SettingKey::ScreenDimmingEnabled => SettingValue::Flag(false),
            SettingKey::ScheduledTimerDefinitions => SettingValue::ScheduledTimers(Vec::new()),
        }
    }

    /// Parses a command-line style value for this key.
    pub fn parse_value(&self, raw: &str) -> Result<SettingValue, SettingsError> {
        let raw = raw.trim();
        let parsed = match self.kind() {
            ValueKind::Long => raw.parse::<i64>().map(SettingValue::Long).ok(),
            ValueKind::Flag => raw.parse::<bool>().map(SettingValue::Flag).ok(),
            ValueKind::ScheduledTimers => serde_json::from_str(raw)
                .map(SettingValue::ScheduledTimers)
                .ok(),
        };
        parsed.ok_or_else(|| SettingsError::InvalidValue {
            key: self.as_str(),
            reason: format!("cannot parse '{}' as {}", raw, self.kind()),
        })
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

// ============================================================================
// SettingValue
// ============================================================================

/// Kind of a settings value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Long,
    Flag,
    ScheduledTimers,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Long => "long",
            ValueKind::Flag => "flag",
            ValueKind::ScheduledTimers => "scheduled timer list",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A settings value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Long(i64),
    Flag(bool),
    ScheduledTimers(Vec<ScheduledTimerDefinition>),
}

impl SettingValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SettingValue::Long(_) => ValueKind::Long,
            SettingValue::Flag(_) => ValueKind::Flag,
            SettingValue::ScheduledTimers(_) => ValueKind::ScheduledTimers,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            SettingValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            SettingValue::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn into_scheduled_timers(self) -> Option<Vec<ScheduledTimerDefinition>> {
        match self {
            SettingValue::ScheduledTimers(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Long(v) => write!(f, "{}", v),
            SettingValue::Flag(v) => write!(f, "{}", v),
            SettingValue::ScheduledTimers(v) => write!(f, "[{} scheduled timers]", v.len()),
        }
    }
}

/// Notification that a key changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub key: SettingKey,
    pub value: SettingValue,
}

// ============================================================================
// SettingsStore
// ============================================================================

/// Capability for typed key-value settings.
pub trait SettingsStore: Send + Sync {
    /// Reads a value, falling back to the key's default when unset.
    fn get(&self, key: SettingKey) -> Result<SettingValue, SettingsError>;

    /// Writes a value.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::TypeMismatch`] if the value kind does not
    /// match the key, or a persistence error if the backend fails.
    fn set(&self, key: SettingKey, value: SettingValue) -> Result<(), SettingsError>;

    /// Subscribes to changes of any key.
    fn observe(&self) -> broadcast::Receiver<SettingChange>;
}

/// Typed accessors over any [`SettingsStore`].
///
/// Read failures are logged and answered with the key's default, so a
/// broken store never stops the timer.
pub trait SettingsStoreExt: SettingsStore {
    fn long_or_default(&self, key: SettingKey) -> i64 {
        match self.get(key) {
            Ok(SettingValue::Long(v)) => v,
            Ok(other) => {
                warn!(%key, found = %other.kind(), "unexpected settings value kind");
                key.default_value().as_long().unwrap_or_default()
            }
            Err(e) => {
                warn!(%key, error = %e, "failed to read setting");
                key.default_value().as_long().unwrap_or_default()
            }
        }
    }

    fn flag_or_default(&self, key: SettingKey) -> bool {
        match self.get(key) {
            Ok(SettingValue::Flag(v)) => v,
            Ok(other) => {
                warn!(%key, found = %other.kind(), "unexpected settings value kind");
                key.default_value().as_flag().unwrap_or_default()
            }
            Err(e) => {
                warn!(%key, error = %e, "failed to read setting");
                key.default_value().as_flag().unwrap_or_default()
            }
        }
    }

    fn end_time_millis(&self) -> i64 {
        self.long_or_default(SettingKey::EndTimeMillis)
    }

    fn max_timer_duration_minutes(&self) -> u64 {
        u64::try_from(self.long_or_default(SettingKey::MaxTimerDurationMinutes)).unwrap_or(0)
    }

    fn default_timer_duration_minutes(&self) -> u64 {
        u64::try_from(self.long_or_default(SettingKey::DefaultTimerDurationMinutes)).unwrap_or(0)
    }

    fn vibrate_on_completion(&self) -> bool {
        self.flag_or_default(SettingKey::VibrateOnCompletion)
    }

    fn sleep_mode_enabled(&self) -> bool {
        self.flag_or_default(SettingKey::SleepModeEnabled)
    }

    /// Snapshot of the sleep mode settings.
    fn sleep_mode_settings(&self) -> SleepModeSettings {
        SleepModeSettings {
            enable_gradual_volume_reduction: self
                .flag_or_default(SettingKey::GradualVolumeReductionEnabled),
            enable_screen_dimming: self.flag_or_default(SettingKey::ScreenDimmingEnabled),
            ..SleepModeSettings::default()
        }
    }

    fn scheduled_timers(&self) -> Result<Vec<ScheduledTimerDefinition>, SettingsError> {
        let value = self.get(SettingKey::ScheduledTimerDefinitions)?;
        let found = value.kind();
        value
            .into_scheduled_timers()
            .ok_or(SettingsError::TypeMismatch {
                key: SettingKey::ScheduledTimerDefinitions.as_str(),
                expected: ValueKind::ScheduledTimers.as_str(),
                found: found.as_str(),
            })
    }
}

impl<T: SettingsStore + ?Sized> SettingsStoreExt for T {}

// ============================================================================
// SettingsMap
// ============================================================================

/// Validated key-value map shared by the store implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SettingsMap {
    values: BTreeMap<SettingKey, SettingValue>,
}

impl SettingsMap {
    pub(crate) fn get(&self, key: SettingKey) -> SettingValue {
        self.values
            .get(&key)
            .cloned()
            .unwrap_or_else(|| key.default_value())
    }

    /// Validates and stores a value, returning every key that changed.
    ///
    /// Lowering the maximum duration below the default duration lowers the
    /// default as well.
    pub(crate) fn apply(
        &mut self,
        key: SettingKey,
        value: SettingValue,
    ) -> Result<Vec<SettingChange>, SettingsError> {
        validate(key, &value)?;

        let mut changes = Vec::new();
        if let (SettingKey::MaxTimerDurationMinutes, SettingValue::Long(max)) = (key, &value) {
            let current_default = self
                .get(SettingKey::DefaultTimerDurationMinutes)
                .as_long()
                .unwrap_or(DEFAULT_TIMER_DURATION_MINUTES);
            if *max < current_default {
                let lowered = SettingValue::Long(*max);
                self.values
                    .insert(SettingKey::DefaultTimerDurationMinutes, lowered.clone());
                changes.push(SettingChange {
                    key: SettingKey::DefaultTimerDurationMinutes,
                    value: lowered,
                });
            }
        }

        self.values.insert(key, value.clone());
        changes.push(SettingChange { key, value });
        Ok(changes)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&SettingKey, &SettingValue)> {
        self.values.iter()
    }
}

fn validate(key: SettingKey, value: &SettingValue) -> Result<(), SettingsError> {
    if value.kind() != key.kind() {
        return Err(SettingsError::TypeMismatch {
            key: key.as_str(),
            expected: key.kind().as_str(),
            found: value.kind().as_str(),
        });
    }
    match (key, value) {
        (SettingKey::MaxTimerDurationMinutes, SettingValue::Long(v))
        | (SettingKey::DefaultTimerDurationMinutes, SettingValue::Long(v))
            if *v < 0 =>
        {
            Err(SettingsError::InvalidValue {
                key: key.as_str(),
                reason: "minutes must not be negative".to_string(),
            })
        }
        (SettingKey::ScheduledTimerDefinitions, SettingValue::ScheduledTimers(list)) => {
            for def in list {
                def.validate().map_err(|reason| SettingsError::InvalidValue {
                    key: key.as_str(),
                    reason: format!("{}: {}", def.id, reason),
                })?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn change_channel() -> broadcast::Sender<SettingChange> {
    broadcast::channel(CHANGE_CHANNEL_CAPACITY).0
}
