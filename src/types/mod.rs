//! Core data types for the media timer.
//!
//! This module defines the data structures used for:
//! - Timer state (inactive, running, paused) with derived progress
//! - Sleep mode settings and state
//! - Scheduled timer definitions and weekdays

use std::collections::BTreeSet;
use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Milliseconds in one minute.
pub const MILLIS_PER_MINUTE: i64 = 60_000;

/// Longest run a scheduled timer may start.
pub const MAX_SCHEDULED_DURATION_MINUTES: u64 = 24 * 60;

// ============================================================================
// TimerState
// ============================================================================

/// Current state of the countdown timer.
///
/// Values are immutable snapshots published by the timer engine. The
/// constructors clamp `remaining_millis` into `[0, total_duration_millis]`
/// so an out-of-range state cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimerState {
    /// No timer is running
    #[default]
    Inactive,
    /// Counting down towards `end_time`
    Running {
        /// Wall-clock millis when the run started
        start_time: i64,
        /// Wall-clock millis when the run completes
        end_time: i64,
        /// Remaining millis at the last update
        remaining_millis: i64,
        /// Length of the whole run
        total_duration_millis: i64,
        /// Whether sleep mode accompanies the run
        use_sleep_mode: bool,
    },
    /// Countdown suspended by the user
    Paused {
        /// Wall-clock millis when the run started
        start_time: i64,
        /// Wall-clock millis when the pause happened
        paused_at_millis: i64,
        /// Remaining millis frozen at pause time
        remaining_millis: i64,
        /// Length of the whole run
        total_duration_millis: i64,
        /// Whether sleep mode accompanies the run
        use_sleep_mode: bool,
    },
}

impl TimerState {
    /// Creates a running state; `remaining_millis` is clamped into range.
    pub fn running(
        start_time: i64,
        end_time: i64,
        remaining_millis: i64,
        total_duration_millis: i64,
        use_sleep_mode: bool,
    ) -> Self {
        let total_duration_millis = total_duration_millis.max(1);
        TimerState::Running {
            start_time,
            end_time,
            remaining_millis: remaining_millis.clamp(0, total_duration_millis),
            total_duration_millis,
            use_sleep_mode,
        }
    }

    /// Creates a paused state; `remaining_millis` is clamped into range.
    pub fn paused(
        start_time: i64,
        paused_at_millis: i64,
        remaining_millis: i64,
        total_duration_millis: i64,
        use_sleep_mode: bool,
    ) -> Self {
        let total_duration_millis = total_duration_millis.max(1);
        TimerState::Paused {
            start_time,
            paused_at_millis,
            remaining_millis: remaining_millis.clamp(0, total_duration_millis),
            total_duration_millis,
            use_sleep_mode,
        }
    }

    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerState::Inactive => "inactive",
            TimerState::Running { .. } => "running",
            TimerState::Paused { .. } => "paused",
        }
    }

    /// Returns true for Running and Paused.
    pub fn is_active(&self) -> bool {
        !matches!(self, TimerState::Inactive)
    }

    /// Returns true if the timer is counting down.
    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running { .. })
    }

    /// Returns true if the timer is paused.
    pub fn is_paused(&self) -> bool {
        matches!(self, TimerState::Paused { .. })
    }

    /// Remaining millis, zero when inactive.
    pub fn remaining_millis(&self) -> i64 {
        match self {
            TimerState::Inactive => 0,
            TimerState::Running {
                remaining_millis, ..
            }
            | TimerState::Paused {
                remaining_millis, ..
            } => *remaining_millis,
        }
    }

    /// Total run length, zero when inactive.
    pub fn total_duration_millis(&self) -> i64 {
        match self {
            TimerState::Inactive => 0,
            TimerState::Running {
                total_duration_millis,
                ..
            }
            | TimerState::Paused {
                total_duration_millis,
                ..
            } => *total_duration_millis,
        }
    }

    /// Whether the active run uses sleep mode.
    pub fn uses_sleep_mode(&self) -> bool {
        match self {
            TimerState::Inactive => false,
            TimerState::Running { use_sleep_mode, .. }
            | TimerState::Paused { use_sleep_mode, .. } => *use_sleep_mode,
        }
    }

    /// Fraction of the run already elapsed, in `[0, 1]`.
    pub fn progress_percent(&self) -> f32 {
        let total = self.total_duration_millis();
        if total <= 0 {
            return 0.0;
        }
        let remaining = self.remaining_millis().clamp(0, total);
        (1.0 - remaining as f64 / total as f64) as f32
    }
}

// ============================================================================
// SleepModeSettings
// ============================================================================

fn default_screen_dimming() -> bool {
    true
}

fn default_stop_media_at_end() -> bool {
    true
}

fn default_fade_out_duration_seconds() -> u32 {
    30
}

/// Snapshot of the sleep mode configuration taken when a fade starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepModeSettings {
    /// Lower the media volume towards zero
    #[serde(default)]
    pub enable_gradual_volume_reduction: bool,
    /// Dim the screen towards 10% of its brightness
    #[serde(default = "default_screen_dimming")]
    pub enable_screen_dimming: bool,
    /// Stop all media when the fade is torn down
    #[serde(default = "default_stop_media_at_end")]
    pub stop_media_at_end: bool,
    /// Seconds between two fade steps
    #[serde(default = "default_fade_out_duration_seconds")]
    pub fade_out_duration_seconds: u32,
}

impl Default for SleepModeSettings {
    fn default() -> Self {
        Self {
            enable_gradual_volume_reduction: false,
            enable_screen_dimming: default_screen_dimming(),
            stop_media_at_end: default_stop_media_at_end(),
            fade_out_duration_seconds: default_fade_out_duration_seconds(),
        }
    }
}

impl SleepModeSettings {
    /// Enables or disables the volume fade.
    pub fn with_volume_reduction(mut self, enabled: bool) -> Self {
        self.enable_gradual_volume_reduction = enabled;
        self
    }

    /// Enables or disables the brightness fade.
    pub fn with_screen_dimming(mut self, enabled: bool) -> Self {
        self.enable_screen_dimming = enabled;
        self
    }

    /// Sets whether media is stopped on teardown.
    pub fn with_stop_media_at_end(mut self, enabled: bool) -> Self {
        self.stop_media_at_end = enabled;
        self
    }

    /// Step interval in milliseconds, never below one second.
    pub fn step_millis(&self) -> u64 {
        u64::from(self.fade_out_duration_seconds.max(1)) * 1000
    }
}

// ============================================================================
// SleepModeState
// ============================================================================

/// State of the sleep mode fader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SleepModeState {
    /// No fade in progress
    #[default]
    Inactive,
    /// A fade session is running
    Active {
        /// Wall-clock millis at activation
        start_time: i64,
        /// Wall-clock millis when the fade reaches its floor
        end_time: i64,
        /// Settings captured at activation
        settings: SleepModeSettings,
    },
}

impl SleepModeState {
    /// Returns true while a fade session is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SleepModeState::Active { .. })
    }
}

// ============================================================================
// DayOfWeek
// ============================================================================

/// Day of the week, ordered Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// All days, Monday first.
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    /// Three-letter English name.
    pub fn short_name(&self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Mon",
            DayOfWeek::Tuesday => "Tue",
            DayOfWeek::Wednesday => "Wed",
            DayOfWeek::Thursday => "Thu",
            DayOfWeek::Friday => "Fri",
            DayOfWeek::Saturday => "Sat",
            DayOfWeek::Sunday => "Sun",
        }
    }

    /// Parses a day name such as `mon`, `Monday` or `MONDAY`.
    pub fn parse(input: &str) -> Option<Self> {
        let lower = input.trim().to_ascii_lowercase();
        DayOfWeek::ALL.into_iter().find(|day| {
            let short = day.short_name().to_ascii_lowercase();
            lower == short || lower == format!("{:?}", day).to_ascii_lowercase()
        })
    }

    /// Returns true for Saturday and Sunday.
    pub fn is_weekend(&self) -> bool {
        matches!(self, DayOfWeek::Saturday | DayOfWeek::Sunday)
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

impl From<DayOfWeek> for Weekday {
    fn from(day: DayOfWeek) -> Self {
        match day {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ============================================================================
// ScheduledTimerDefinition
// ============================================================================

/// A recurring rule that starts a timer at a time of day on selected weekdays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTimerDefinition {
    /// Unique identifier (uuid v4)
    pub id: String,
    /// User-visible label
    pub name: String,
    /// Hour of day (0-23)
    pub hour: u32,
    /// Minute of hour (0-59)
    pub minute: u32,
    /// Timer length once triggered
    pub duration_minutes: u64,
    /// Days on which the rule fires
    pub enabled_days: BTreeSet<DayOfWeek>,
    /// Start the run in sleep mode
    pub use_sleep_mode: bool,
    /// Whether the rule is armed
    pub is_enabled: bool,
}

impl ScheduledTimerDefinition {
    /// Creates an enabled definition with a fresh id.
    pub fn new(
        name: impl Into<String>,
        hour: u32,
        minute: u32,
        duration_minutes: u64,
        enabled_days: BTreeSet<DayOfWeek>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            hour,
            minute,
            duration_minutes,
            enabled_days,
            use_sleep_mode: false,
            is_enabled: true,
        }
    }

    /// Sets the sleep mode flag.
    pub fn with_sleep_mode(mut self, use_sleep_mode: bool) -> Self {
        self.use_sleep_mode = use_sleep_mode;
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, is_enabled: bool) -> Self {
        self.is_enabled = is_enabled;
        self
    }

    /// Validates the definition.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.hour > 23 {
            return Err(format!("hour must be 0-23, got {}", self.hour));
        }
        if self.minute > 59 {
            return Err(format!("minute must be 0-59, got {}", self.minute));
        }
        if !(1..=MAX_SCHEDULED_DURATION_MINUTES).contains(&self.duration_minutes) {
            return Err(format!(
                "duration must be 1-{} minutes, got {}",
                MAX_SCHEDULED_DURATION_MINUTES, self.duration_minutes
            ));
        }
        Ok(())
    }

    /// Time of day as `HH:MM`.
    pub fn formatted_time(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    /// Human-readable day selection.
    pub fn formatted_days(&self) -> String {
        let days = &self.enabled_days;
        if days.len() == 7 {
            return "Daily".to_string();
        }
        if days.len() == 5 && days.iter().all(|d| !d.is_weekend()) {
            return "Weekdays".to_string();
        }
        if days.len() == 2 && days.iter().all(|d| d.is_weekend()) {
            return "Weekend".to_string();
        }
        days.iter()
            .map(|d| d.short_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // TimerState Tests
    // ------------------------------------------------------------------------

    mod timer_state_tests {
        use super::*;

        #[test]
        fn test_default_is_inactive() {
            assert_eq!(TimerState::default(), TimerState::Inactive);
            assert!(!TimerState::Inactive.is_active());
        }

        #[test]
        fn test_as_str() {
            assert_eq!(TimerState::Inactive.as_str(), "inactive");
            assert_eq!(TimerState::running(0, 10, 5, 10, false).as_str(), "running");
            assert_eq!(TimerState::paused(0, 3, 5, 10, false).as_str(), "paused");
        }

        #[test]
        fn test_constructor_clamps_remaining() {
            let over = TimerState::running(0, 100, 500, 100, false);
            assert_eq!(over.remaining_millis(), 100);

            let under = TimerState::paused(0, 50, -20, 100, true);
            assert_eq!(under.remaining_millis(), 0);
        }

        #[test]
        fn test_constructor_forces_positive_total() {
            let state = TimerState::running(0, 0, 0, 0, false);
            assert!(state.total_duration_millis() > 0);
        }

        #[test]
        fn test_progress_percent() {
            assert_eq!(TimerState::Inactive.progress_percent(), 0.0);

            let half = TimerState::running(0, 1000, 500, 1000, false);
            assert!((half.progress_percent() - 0.5).abs() < f32::EPSILON);

            let done = TimerState::running(0, 1000, 0, 1000, false);
            assert!((done.progress_percent() - 1.0).abs() < f32::EPSILON);

            let fresh = TimerState::paused(0, 0, 1000, 1000, false);
            assert_eq!(fresh.progress_percent(), 0.0);
        }

        #[test]
        fn test_accessors() {
            let state = TimerState::paused(10, 20, 300, 600, true);
            assert!(state.is_active());
            assert!(state.is_paused());
            assert!(!state.is_running());
            assert!(state.uses_sleep_mode());
            assert_eq!(state.total_duration_millis(), 600);
        }

        #[test]
        fn test_serialize_tagged() {
            let json = serde_json::to_string(&TimerState::Inactive).unwrap();
            assert_eq!(json, r#"{"status":"inactive"}"#);

            let running = TimerState::running(1, 2, 1, 1, false);
            let json = serde_json::to_string(&running).unwrap();
            assert!(json.contains(r#""status":"running""#));
            let back: TimerState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, running);
        }
    }

    // ------------------------------------------------------------------------
    // SleepModeSettings Tests
    // ------------------------------------------------------------------------

    mod sleep_mode_settings_tests {
        use super::*;

        #[test]
        fn test_default_values() {
            let settings = SleepModeSettings::default();
            assert!(!settings.enable_gradual_volume_reduction);
            assert!(settings.enable_screen_dimming);
            assert!(settings.stop_media_at_end);
            assert_eq!(settings.fade_out_duration_seconds, 30);
            assert_eq!(settings.step_millis(), 30_000);
        }

        #[test]
        fn test_step_never_zero() {
            let settings = SleepModeSettings {
                fade_out_duration_seconds: 0,
                ..SleepModeSettings::default()
            };
            assert_eq!(settings.step_millis(), 1000);
        }

        #[test]
        fn test_deserialize_partial_uses_defaults() {
            let settings: SleepModeSettings =
                serde_json::from_str(r#"{"enable_gradual_volume_reduction":true}"#).unwrap();
            assert!(settings.enable_gradual_volume_reduction);
            assert!(settings.enable_screen_dimming);
            assert_eq!(settings.fade_out_duration_seconds, 30);
        }
    }

    // ------------------------------------------------------------------------
    // DayOfWeek Tests
    // ------------------------------------------------------------------------

    mod day_of_week_tests {
        use super::*;

        #[test]
        fn test_weekday_conversion() {
            for day in DayOfWeek::ALL {
                let weekday: Weekday = day.into();
                assert_eq!(DayOfWeek::from(weekday), day);
            }
        }

        #[test]
        fn test_parse() {
            assert_eq!(DayOfWeek::parse("mon"), Some(DayOfWeek::Monday));
            assert_eq!(DayOfWeek::parse("Sunday"), Some(DayOfWeek::Sunday));
            assert_eq!(DayOfWeek::parse("FRIDAY"), Some(DayOfWeek::Friday));
            assert_eq!(DayOfWeek::parse("someday"), None);
        }

        #[test]
        fn test_serialize_uppercase() {
            let json = serde_json::to_string(&DayOfWeek::Wednesday).unwrap();
            assert_eq!(json, "\"WEDNESDAY\"");
        }
    }

    // ------------------------------------------------------------------------
    // ScheduledTimerDefinition Tests
    // ------------------------------------------------------------------------

    mod scheduled_timer_tests {
        use super::*;

        fn days(list: &[DayOfWeek]) -> BTreeSet<DayOfWeek> {
            list.iter().copied().collect()
        }

        #[test]
        fn test_new_generates_unique_ids() {
            let a = ScheduledTimerDefinition::new("a", 8, 0, 30, BTreeSet::new());
            let b = ScheduledTimerDefinition::new("b", 8, 0, 30, BTreeSet::new());
            assert_ne!(a.id, b.id);
            assert!(a.is_enabled);
            assert!(!a.use_sleep_mode);
        }

        #[test]
        fn test_validate() {
            let ok = ScheduledTimerDefinition::new("ok", 23, 59, 1, BTreeSet::new());
            assert!(ok.validate().is_ok());

            let bad_hour = ScheduledTimerDefinition::new("h", 24, 0, 1, BTreeSet::new());
            assert!(bad_hour.validate().unwrap_err().contains("hour"));

            let bad_minute = ScheduledTimerDefinition::new("m", 0, 60, 1, BTreeSet::new());
            assert!(bad_minute.validate().unwrap_err().contains("minute"));

            let bad_duration = ScheduledTimerDefinition::new("d", 0, 0, 0, BTreeSet::new());
            assert!(bad_duration.validate().is_err());

            let too_long = ScheduledTimerDefinition::new("d", 0, 0, 1441, BTreeSet::new());
            assert!(too_long.validate().unwrap_err().contains("1441"));
        }

        #[test]
        fn test_formatted_time() {
            let def = ScheduledTimerDefinition::new("t", 7, 5, 30, BTreeSet::new());
            assert_eq!(def.formatted_time(), "07:05");
        }

        #[test]
        fn test_formatted_days() {
            let all = ScheduledTimerDefinition::new("t", 0, 0, 1, DayOfWeek::ALL.into());
            assert_eq!(all.formatted_days(), "Daily");

            let weekdays = ScheduledTimerDefinition::new(
                "t",
                0,
                0,
                1,
                days(&[
                    DayOfWeek::Monday,
                    DayOfWeek::Tuesday,
                    DayOfWeek::Wednesday,
                    DayOfWeek::Thursday,
                    DayOfWeek::Friday,
                ]),
            );
            assert_eq!(weekdays.formatted_days(), "Weekdays");

            let weekend = ScheduledTimerDefinition::new(
                "t",
                0,
                0,
                1,
                days(&[DayOfWeek::Sunday, DayOfWeek::Saturday]),
            );
            assert_eq!(weekend.formatted_days(), "Weekend");

            let some = ScheduledTimerDefinition::new(
                "t",
                0,
                0,
                1,
                days(&[DayOfWeek::Friday, DayOfWeek::Monday]),
            );
            assert_eq!(some.formatted_days(), "Mon, Fri");
        }

        #[test]
        fn test_serde_camel_case() {
            let def = ScheduledTimerDefinition::new("night", 22, 30, 45, days(&[DayOfWeek::Monday]))
                .with_sleep_mode(true);
            let json = serde_json::to_string(&def).unwrap();
            assert!(json.contains("\"durationMinutes\":45"));
            assert!(json.contains("\"enabledDays\":[\"MONDAY\"]"));
            let back: ScheduledTimerDefinition = serde_json::from_str(&json).unwrap();
            assert_eq!(back, def);
        }
    }
}
