//! Command-line tests for the media-timer binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn media_timer() -> Command {
    Command::cargo_bin("media-timer").unwrap()
}

/// Settings file inside a fresh temporary directory.
fn settings_file() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json").to_string_lossy().into_owned();
    (dir, path)
}

// ============================================================================
// General
// ============================================================================

mod general {
    use super::*;

    #[test]
    fn help_lists_subcommands() {
        media_timer()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("next-trigger"))
            .stdout(predicate::str::contains("settings"));
    }

    #[test]
    fn completions_for_bash() {
        media_timer()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("media-timer"));
    }

    #[test]
    fn run_rejects_zero_minutes() {
        media_timer()
            .args(["run", "--minutes", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--minutes"));
    }
}

// ============================================================================
// Next Trigger
// ============================================================================

mod next_trigger {
    use super::*;

    #[test]
    fn monday_rule_from_tuesday() {
        media_timer()
            .args([
                "next-trigger",
                "--hour",
                "8",
                "--minute",
                "0",
                "--days",
                "mon",
                "--now",
                "2024-01-09T09:00:00+00:00",
            ])
            .assert()
            .success()
            .stdout("Next trigger: Mon 2024-01-15 08:00 +00:00\n");
    }

    #[test]
    fn keeps_the_given_offset() {
        media_timer()
            .args([
                "next-trigger",
                "--hour",
                "22",
                "--minute",
                "15",
                "--days",
                "tue,thu",
                "--now",
                "2024-01-09T23:00:00+09:00",
            ])
            .assert()
            .success()
            .stdout("Next trigger: Thu 2024-01-11 22:15 +09:00\n");
    }

    #[test]
    fn unknown_day_is_rejected() {
        media_timer()
            .args(["next-trigger", "--hour", "8", "--minute", "0", "--days", "funday"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown weekday"));
    }
}

// ============================================================================
// Settings
// ============================================================================

mod settings {
    use super::*;

    #[test]
    fn show_prints_defaults() {
        let (_dir, path) = settings_file();
        media_timer()
            .args(["settings", "show", "--settings", &path])
            .assert()
            .success()
            .stdout(predicate::str::contains("maxTimerDurationMinutes = 120"))
            .stdout(predicate::str::contains("defaultTimerDurationMinutes = 30"))
            .stdout(predicate::str::contains("sleepModeEnabled = false"));
    }

    #[test]
    fn set_is_persisted() {
        let (_dir, path) = settings_file();
        media_timer()
            .args(["settings", "set", "sleepModeEnabled", "true", "--settings", &path])
            .assert()
            .success()
            .stdout("sleepModeEnabled = true\n");

        media_timer()
            .args(["settings", "show", "--settings", &path])
            .assert()
            .success()
            .stdout(predicate::str::contains("sleepModeEnabled = true"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"sleepModeEnabled\": true"));
    }

    #[test]
    fn lowering_max_lowers_default() {
        let (_dir, path) = settings_file();
        media_timer()
            .args(["settings", "set", "maxTimerDurationMinutes", "20", "--settings", &path])
            .assert()
            .success();

        media_timer()
            .args(["settings", "show", "--settings", &path])
            .assert()
            .success()
            .stdout(predicate::str::contains("defaultTimerDurationMinutes = 20"));
    }

    #[test]
    fn unknown_key_fails() {
        let (_dir, path) = settings_file();
        media_timer()
            .args(["settings", "set", "darkMode", "true", "--settings", &path])
            .assert()
            .failure()
            .stderr(predicate::str::starts_with("Error:"));
    }

    #[test]
    fn wrong_value_type_fails() {
        let (_dir, path) = settings_file();
        media_timer()
            .args(["settings", "set", "vibrateOnCompletion", "often", "--settings", &path])
            .assert()
            .failure();
    }

    #[test]
    fn path_prints_the_file() {
        let (_dir, path) = settings_file();
        media_timer()
            .args(["settings", "path", "--settings", &path])
            .assert()
            .success()
            .stdout(predicate::str::contains("settings.json"));
    }
}
