//! Command definitions for the media timer CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use clap::{Args, Parser, Subcommand};

use crate::types::DayOfWeek;

// ============================================================================
// CLI Structure
// ============================================================================

/// Media timer CLI - stop media playback after a countdown
#[derive(Parser, Debug)]
#[command(
    name = "media-timer",
    version,
    about = "Sleep timer that stops media playback",
    long_about = "Counts down and stops all media playback when the time is up.\n\
                  Sleep mode fades the volume and dims the screen on the way.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a timer in the foreground until it completes or Ctrl-C
    Run(RunArgs),

    /// Show the next trigger of a scheduled timer rule
    NextTrigger(NextTriggerArgs),

    /// Inspect or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SettingsAction {
    /// Print every setting
    Show,

    /// Change one setting
    Set {
        /// Settings key, e.g. maxTimerDurationMinutes
        key: String,
        /// New value (number, true/false, or a JSON list for scheduled timers)
        value: String,
    },

    /// Print the settings file location
    Path,
}

// ============================================================================
// Run Command Arguments
// ============================================================================

/// Arguments for the run command
#[derive(Args, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Timer length in minutes (1-1440), defaults to the stored default
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=1440))]
    pub minutes: Option<u64>,

    /// Fade volume and brightness while counting down
    #[arg(short, long)]
    pub sleep_mode: bool,

    /// Starting media volume of the software mixer (0-15)
    #[arg(long, default_value = "15", value_parser = clap::value_parser!(u32).range(0..=15))]
    pub volume: u32,

    /// Starting screen brightness of the software backlight (0.0-1.0)
    #[arg(long, default_value = "1.0", value_parser = parse_brightness)]
    pub brightness: f32,
}

// ============================================================================
// Next Trigger Arguments
// ============================================================================

/// Arguments for the next-trigger command
#[derive(Args, Debug, Clone, PartialEq)]
pub struct NextTriggerArgs {
    /// Hour of day (0-23)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=23))]
    pub hour: u32,

    /// Minute of hour (0-59)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=59))]
    pub minute: u32,

    /// Comma-separated weekdays, e.g. mon,wed,fri
    #[arg(long, required = true, value_delimiter = ',', value_parser = parse_day)]
    pub days: Vec<DayOfWeek>,

    /// Reference time as RFC 3339 (defaults to now, local time)
    #[arg(long, value_parser = parse_now)]
    pub now: Option<DateTime<FixedOffset>>,
}

// ============================================================================
// Validation Functions
// ============================================================================

fn parse_day(s: &str) -> Result<DayOfWeek, String> {
    DayOfWeek::parse(s).ok_or_else(|| format!("unknown weekday '{}'", s))
}

fn parse_now(s: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|e| format!("invalid RFC 3339 time: {}", e))
}

fn parse_brightness(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if !(0.0..=1.0).contains(&value) {
        return Err("brightness must be between 0.0 and 1.0".to_string());
    }
    Ok(value)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // Cli Tests
    // ------------------------------------------------------------------------

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_no_args() {
            let cli = Cli::parse_from(["media-timer"]);
            assert!(cli.command.is_none());
            assert!(!cli.verbose);
            assert!(cli.settings.is_none());
        }

        #[test]
        fn test_parse_global_flags_after_subcommand() {
            let cli = Cli::parse_from([
                "media-timer",
                "settings",
                "show",
                "-v",
                "--settings",
                "/tmp/s.json",
            ]);
            assert!(cli.verbose);
            assert_eq!(cli.settings, Some(PathBuf::from("/tmp/s.json")));
            assert!(matches!(
                cli.command,
                Some(Commands::Settings {
                    action: SettingsAction::Show
                })
            ));
        }

        #[test]
        fn test_parse_completions() {
            let cli = Cli::parse_from(["media-timer", "completions", "zsh"]);
            assert!(matches!(cli.command, Some(Commands::Completions { .. })));
        }
    }

    // ------------------------------------------------------------------------
    // Run Tests
    // ------------------------------------------------------------------------

    mod run_tests {
        use super::*;

        #[test]
        fn test_parse_run_defaults() {
            let cli = Cli::parse_from(["media-timer", "run"]);
            match cli.command {
                Some(Commands::Run(args)) => {
                    assert_eq!(args.minutes, None);
                    assert!(!args.sleep_mode);
                    assert_eq!(args.volume, 15);
                    assert_eq!(args.brightness, 1.0);
                }
                _ => panic!("Expected Run command"),
            }
        }

        #[test]
        fn test_parse_run_with_options() {
            let cli = Cli::parse_from([
                "media-timer",
                "run",
                "--minutes",
                "45",
                "--sleep-mode",
                "--volume",
                "8",
                "--brightness",
                "0.5",
            ]);
            match cli.command {
                Some(Commands::Run(args)) => {
                    assert_eq!(args.minutes, Some(45));
                    assert!(args.sleep_mode);
                    assert_eq!(args.volume, 8);
                    assert_eq!(args.brightness, 0.5);
                }
                _ => panic!("Expected Run command"),
            }
        }

        #[test]
        fn test_run_rejects_zero_minutes() {
            assert!(Cli::try_parse_from(["media-timer", "run", "--minutes", "0"]).is_err());
        }

        #[test]
        fn test_run_rejects_too_many_minutes() {
            assert!(Cli::try_parse_from(["media-timer", "run", "-m", "1441"]).is_err());
        }

        #[test]
        fn test_run_rejects_bad_brightness() {
            assert!(Cli::try_parse_from(["media-timer", "run", "--brightness", "1.5"]).is_err());
        }
    }

    // ------------------------------------------------------------------------
    // Next Trigger Tests
    // ------------------------------------------------------------------------

    mod next_trigger_tests {
        use super::*;

        #[test]
        fn test_parse_days_list() {
            let cli = Cli::parse_from([
                "media-timer",
                "next-trigger",
                "--hour",
                "8",
                "--minute",
                "30",
                "--days",
                "mon,Wednesday,FRI",
            ]);
            match cli.command {
                Some(Commands::NextTrigger(args)) => {
                    assert_eq!(args.hour, 8);
                    assert_eq!(args.minute, 30);
                    assert_eq!(
                        args.days,
                        vec![DayOfWeek::Monday, DayOfWeek::Wednesday, DayOfWeek::Friday]
                    );
                    assert!(args.now.is_none());
                }
                _ => panic!("Expected NextTrigger command"),
            }
        }

        #[test]
        fn test_parse_now() {
            let cli = Cli::parse_from([
                "media-timer",
                "next-trigger",
                "--hour",
                "8",
                "--minute",
                "0",
                "--days",
                "mon",
                "--now",
                "2024-01-09T09:00:00+09:00",
            ]);
            match cli.command {
                Some(Commands::NextTrigger(args)) => {
                    let now = args.now.unwrap();
                    assert_eq!(now.offset().local_minus_utc(), 9 * 3600);
                }
                _ => panic!("Expected NextTrigger command"),
            }
        }

        #[test]
        fn test_rejects_unknown_day() {
            let result = Cli::try_parse_from([
                "media-timer",
                "next-trigger",
                "--hour",
                "8",
                "--minute",
                "0",
                "--days",
                "someday",
            ]);
            assert!(result.is_err());
        }

        #[test]
        fn test_rejects_hour_out_of_range() {
            let result = Cli::try_parse_from([
                "media-timer",
                "next-trigger",
                "--hour",
                "24",
                "--minute",
                "0",
                "--days",
                "mon",
            ]);
            assert!(result.is_err());
        }
    }

    // ------------------------------------------------------------------------
    // Validation Tests
    // ------------------------------------------------------------------------

    mod validation_tests {
        use super::*;

        #[test]
        fn test_parse_brightness() {
            assert_eq!(parse_brightness("0.25"), Ok(0.25));
            assert!(parse_brightness("-0.1").is_err());
            assert!(parse_brightness("bright").is_err());
        }

        #[test]
        fn test_parse_day() {
            assert_eq!(parse_day("sun"), Ok(DayOfWeek::Sunday));
            assert!(parse_day("").is_err());
        }
    }
}
