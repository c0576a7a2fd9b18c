//! Media Timer CLI - stop media playback after a countdown
//!
//! Runs a sleep timer in the foreground:
//! - counts down the selected minutes
//! - optionally fades volume and dims the screen (sleep mode)
//! - stops every media session when the time is up

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use tokio::sync::broadcast::error::RecvError;

use media_timer::cli::{Cli, Commands, Display, NextTriggerArgs, RunArgs, SettingsAction};
use media_timer::clock::{Clock, SystemClock};
use media_timer::daemon::{Capabilities, EngineConfig, TimerEvent, TimerHandle};
use media_timer::device::{NoHaptics, SoftwareBrightness, SoftwareVolume};
use media_timer::media::LoggingMediaController;
use media_timer::mirror::TimerStateMirror;
use media_timer::schedule::next_trigger;
use media_timer::settings::{
    JsonFileSettingsStore, SettingKey, SettingValue, SettingsStore, SettingsStoreExt,
};
use media_timer::types::DayOfWeek;

/// Highest level of the software media volume.
const MAX_VOLUME: u32 = 15;

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Run(args)) => {
            let settings = open_settings(cli.settings)?;
            run_timer(args, settings).await?;
        }
        Some(Commands::NextTrigger(args)) => {
            show_next_trigger(&args);
        }
        Some(Commands::Settings { action }) => {
            let settings = open_settings(cli.settings)?;
            execute_settings(action, &settings)?;
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
        }
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

fn open_settings(path: Option<PathBuf>) -> Result<JsonFileSettingsStore> {
    let store = match path {
        Some(path) => JsonFileSettingsStore::open(path),
        None => JsonFileSettingsStore::open_default(),
    };
    store.context("failed to open settings")
}

// ============================================================================
// Run
// ============================================================================

/// Runs one timer until it completes, or cancels it on Ctrl-C.
async fn run_timer(args: RunArgs, settings: JsonFileSettingsStore) -> Result<()> {
    let settings: Arc<dyn SettingsStore> = Arc::new(settings);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let caps = Capabilities {
        clock: Arc::clone(&clock),
        media: Arc::new(LoggingMediaController),
        settings: Arc::clone(&settings),
        volume: Arc::new(SoftwareVolume::new(args.volume, MAX_VOLUME)),
        brightness: Arc::new(SoftwareBrightness::new(args.brightness)),
        haptics: Arc::new(NoHaptics),
    };
    let handle = TimerHandle::spawn(caps, EngineConfig::default());
    let mirror = TimerStateMirror::attach(handle.clone(), Arc::clone(&settings), clock);

    if let Some(minutes) = args.minutes {
        mirror.update_selected_minutes(minutes);
        if mirror.selected_minutes() < minutes {
            tracing::warn!(
                requested = minutes,
                max = settings.max_timer_duration_minutes(),
                "duration capped at the configured maximum"
            );
        }
    }
    let minutes = mirror.selected_minutes();
    let use_sleep_mode = args.sleep_mode || settings.sleep_mode_enabled();

    let mut events = handle.subscribe_events();
    handle
        .start(minutes, use_sleep_mode)
        .await
        .context("failed to start timer")?;
    Display::show_started(minutes, use_sleep_mode);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(TimerEvent::Tick { remaining_millis }) => {
                    if Display::is_minute_boundary(remaining_millis) {
                        Display::show_progress(&mirror.state());
                    }
                }
                Ok(TimerEvent::Completed) => {
                    Display::show_completed();
                    break;
                }
                Ok(TimerEvent::Cancelled) => {
                    Display::show_cancelled();
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
            result = &mut ctrl_c => {
                result.context("failed to listen for Ctrl-C")?;
                handle.cancel().await?;
                Display::show_cancelled();
                break;
            }
        }
    }

    handle.shutdown().await?;
    mirror.detach();

    // The engine writes behind; make sure no end time outlives the process.
    settings
        .set(SettingKey::EndTimeMillis, SettingValue::Long(0))
        .context("failed to clear persisted end time")?;
    Ok(())
}

// ============================================================================
// Next Trigger
// ============================================================================

fn show_next_trigger(args: &NextTriggerArgs) {
    let days: BTreeSet<DayOfWeek> = args.days.iter().copied().collect();
    match args.now {
        Some(now) => {
            let next = next_trigger(args.hour, args.minute, &days, &now);
            Display::show_next_trigger(next.as_ref());
        }
        None => {
            let next = next_trigger(args.hour, args.minute, &days, &Local::now());
            Display::show_next_trigger(next.as_ref());
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

fn execute_settings(action: SettingsAction, settings: &JsonFileSettingsStore) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let entries = SettingKey::ALL
                .iter()
                .map(|key| Ok((*key, settings.get(*key)?)))
                .collect::<Result<Vec<_>>>()?;
            Display::show_settings(&entries);
        }
        SettingsAction::Set { key, value } => {
            let key: SettingKey = key.parse()?;
            let value = key.parse_value(&value)?;
            settings.set(key, value)?;
            println!("{} = {}", key, settings.get(key)?);
        }
        SettingsAction::Path => {
            println!("{}", settings.path().display());
        }
    }
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
