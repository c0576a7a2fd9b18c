//! UI-side view of the timer.
//!
//! A [`TimerStateMirror`] lives as long as one UI attachment. On attach it
//! reconciles the persisted end time with the engine's live state, then
//! follows the engine through its `watch` channel. The mirror never writes
//! timer state; every command is forwarded to the engine.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::daemon::{TimerError, TimerHandle};
use crate::settings::{SettingKey, SettingsStore, SettingsStoreExt};
use crate::types::{TimerState, MILLIS_PER_MINUTE};

/// Decides which state a freshly attached UI should show.
///
/// A running state whose end time has already passed, or a persisted end
/// time without a live run, is stale and shown as inactive.
pub fn reconcile(live: TimerState, persisted_end_time: i64, now: i64) -> TimerState {
    match live {
        TimerState::Running { end_time, .. } if end_time > now => live,
        TimerState::Paused { .. } => live,
        TimerState::Running { end_time, .. } => {
            debug!(end_time, now, "running state already past its end, showing inactive");
            TimerState::Inactive
        }
        TimerState::Inactive => {
            if persisted_end_time > now {
                info!(persisted_end_time, "persisted end time has no live run, showing inactive");
            }
            TimerState::Inactive
        }
    }
}

/// Minutes to preselect for `state`.
///
/// Active runs show their remaining time rounded up; otherwise the default
/// duration capped at the maximum.
pub fn selected_minutes_for(state: &TimerState, default_minutes: u64, max_minutes: u64) -> u64 {
    if state.is_active() {
        let remaining = state.remaining_millis().max(0);
        let minutes = (remaining + MILLIS_PER_MINUTE - 1) / MILLIS_PER_MINUTE;
        u64::try_from(minutes).unwrap_or(0)
    } else {
        default_minutes.min(max_minutes)
    }
}

/// Read-only mirror of the engine state for one UI attachment.
pub struct TimerStateMirror {
    handle: TimerHandle,
    settings: Arc<dyn SettingsStore>,
    state_tx: watch::Sender<TimerState>,
    selected_tx: watch::Sender<u64>,
    tasks: Vec<JoinHandle<()>>,
}

impl TimerStateMirror {
    /// Attaches to the engine. Must be called inside a tokio runtime.
    pub fn attach(
        handle: TimerHandle,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut engine_rx = handle.subscribe();
        let live = *engine_rx.borrow_and_update();
        let state = reconcile(live, settings.end_time_millis(), clock.now_millis());
        let selected = selected_minutes_for(
            &state,
            settings.default_timer_duration_minutes(),
            settings.max_timer_duration_minutes(),
        );
        debug!(state = state.as_str(), selected, "mirror attached");

        let (state_tx, _) = watch::channel(state);
        let (selected_tx, _) = watch::channel(selected);

        let forward = {
            let state_tx = state_tx.clone();
            tokio::spawn(async move {
                while engine_rx.changed().await.is_ok() {
                    let state = *engine_rx.borrow_and_update();
                    state_tx.send_replace(state);
                }
                debug!("engine state channel closed");
            })
        };

        let follow_max = {
            let selected_tx = selected_tx.clone();
            let mut changes = settings.observe();
            tokio::spawn(async move {
                loop {
                    match changes.recv().await {
                        Ok(change) if change.key == SettingKey::MaxTimerDurationMinutes => {
                            let max = change
                                .value
                                .as_long()
                                .and_then(|m| u64::try_from(m).ok())
                                .unwrap_or(0);
                            selected_tx.send_if_modified(|selected| {
                                if *selected > max {
                                    *selected = max;
                                    true
                                } else {
                                    false
                                }
                            });
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "settings observer lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        Self {
            handle,
            settings,
            state_tx,
            selected_tx,
            tasks: vec![forward, follow_max],
        }
    }

    /// Stops following the engine.
    pub fn detach(self) {
        // Drop aborts the tasks.
    }

    // ------------------------------------------------------------------------
    // Observables
    // ------------------------------------------------------------------------

    pub fn state(&self) -> TimerState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state_tx.subscribe()
    }

    pub fn remaining_millis(&self) -> i64 {
        self.state().remaining_millis()
    }

    pub fn selected_minutes(&self) -> u64 {
        *self.selected_tx.borrow()
    }

    pub fn subscribe_selected_minutes(&self) -> watch::Receiver<u64> {
        self.selected_tx.subscribe()
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Starts a run of the selected length, in sleep mode if enabled.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidDuration`] when zero minutes are selected.
    pub async fn start(&self) -> Result<(), TimerError> {
        let minutes = self.selected_minutes();
        let use_sleep_mode = self.settings.sleep_mode_enabled();
        self.handle.start(minutes, use_sleep_mode).await
    }

    /// Sets the preselected minutes, capped at the maximum duration.
    pub fn update_selected_minutes(&self, minutes: u64) {
        let max = self.settings.max_timer_duration_minutes();
        self.selected_tx.send_replace(minutes.min(max));
    }

    pub async fn pause_or_resume(&self) -> Result<(), TimerError> {
        self.handle.pause_or_resume().await
    }

    pub async fn cancel(&self) -> Result<(), TimerError> {
        self.handle.cancel().await
    }
}

impl Drop for TimerStateMirror {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
