//! Display utilities for the media timer CLI.
//!
//! This module provides formatted output for:
//! - Countdown progress
//! - Completion and cancellation messages
//! - Scheduled trigger times
//! - Stored settings

use chrono::{DateTime, TimeZone};

use crate::settings::{SettingKey, SettingValue};
use crate::types::{TimerState, MILLIS_PER_MINUTE};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows a message for timer start.
    pub fn show_started(minutes: u64, use_sleep_mode: bool) {
        println!("* Timer started: {} min", minutes);
        if use_sleep_mode {
            println!("  Sleep mode: on");
        }
    }

    /// Shows the countdown line for a running or paused state.
    pub fn show_progress(state: &TimerState) {
        println!("{}", Self::format_progress(state));
    }

    /// Shows a message for timer completion.
    pub fn show_completed() {
        println!("[] Time is up, media stopped");
    }

    /// Shows a message for timer cancellation.
    pub fn show_cancelled() {
        println!("[] Timer cancelled");
    }

    /// Shows the next trigger of a scheduled rule.
    pub fn show_next_trigger<Tz: TimeZone>(next: Option<&DateTime<Tz>>)
    where
        Tz::Offset: std::fmt::Display,
    {
        println!("{}", Self::format_next_trigger(next));
    }

    /// Shows every setting.
    pub fn show_settings(entries: &[(SettingKey, SettingValue)]) {
        for (key, value) in entries {
            println!("{}", Self::format_setting(*key, value));
            if let SettingValue::ScheduledTimers(list) = value {
                for def in list {
                    let state = if def.is_enabled { "" } else { " (disabled)" };
                    let sleep = if def.use_sleep_mode { ", sleep mode" } else { "" };
                    println!(
                        "  - {} {} {}: {} min{}{}",
                        def.name,
                        def.formatted_time(),
                        def.formatted_days(),
                        def.duration_minutes,
                        sleep,
                        state
                    );
                }
            }
        }
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {}", message);
    }

    // ------------------------------------------------------------------------
    // Formatting
    // ------------------------------------------------------------------------

    /// Formats millis as `M:SS`, or `H:MM:SS` from one hour up.
    ///
    /// Partial seconds round up so the display never shows 0:00 early.
    pub fn format_remaining(millis: i64) -> String {
        let total_seconds = (millis.max(0) + 999) / 1000;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }

    /// Returns true when the displayed remaining time is a whole minute.
    pub fn is_minute_boundary(remaining_millis: i64) -> bool {
        let displayed_millis = (remaining_millis.max(0) + 999) / 1000 * 1000;
        displayed_millis > 0 && displayed_millis % MILLIS_PER_MINUTE == 0
    }

    fn format_progress(state: &TimerState) -> String {
        let remaining = Self::format_remaining(state.remaining_millis());
        let percent = (state.progress_percent() * 100.0).round() as u32;
        match state {
            TimerState::Paused { .. } => format!("|| Paused: {} remaining ({}%)", remaining, percent),
            _ => format!("> {} remaining ({}%)", remaining, percent),
        }
    }

    fn format_next_trigger<Tz: TimeZone>(next: Option<&DateTime<Tz>>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        match next {
            Some(at) => format!("Next trigger: {}", at.format("%a %Y-%m-%d %H:%M %:z")),
            None => "No upcoming trigger".to_string(),
        }
    }

    fn format_setting(key: SettingKey, value: &SettingValue) -> String {
        format!("{} = {}", key, value)
    }
}

// ============================================================================
// Tests
// ============================================================================
