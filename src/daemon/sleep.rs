//! Sleep mode fader.
//!
//! While a sleep-mode run is active the fader lowers the media volume and
//! dims the screen in steps, then restores both when the session ends. Each
//! fade runs in its own task so a failing device never stalls the other.
//!
//! All session state sits behind one mutex shared with the fade tasks. A
//! task re-checks its session under the lock before every write, so once
//! [`SleepFadeController::deactivate`] has returned no fade write can land.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::TimerError;
use crate::clock::Clock;
use crate::device::{DeviceBrightness, DeviceVolume};
use crate::media::{MediaCommand, MediaController, MediaTarget};
use crate::types::{SleepModeSettings, SleepModeState, MILLIS_PER_MINUTE};

/// Fraction of the original brightness removed by the end of the fade.
const BRIGHTNESS_REDUCTION: f32 = 0.9;

// ============================================================================
// Fade curves
// ============================================================================

/// Volume on a linear ramp from `baseline` at `origin` to zero at `end`.
///
/// Integer floor arithmetic, so the value never rounds up past the ramp.
pub fn volume_target(baseline: u32, origin: i64, end: i64, now: i64) -> u32 {
    let window = end - origin;
    if window <= 0 || now >= end {
        return 0;
    }
    let left = (end - now).clamp(0, window);
    let target = i64::from(baseline) * left / window;
    u32::try_from(target).unwrap_or(baseline)
}

/// Brightness dimmed linearly to 10% of `original` over `start..end`.
pub fn brightness_target(original: f32, start: i64, end: i64, now: i64) -> f32 {
    let span = end - start;
    let progress = if span <= 0 {
        1.0
    } else {
        ((now - start) as f64 / span as f64).clamp(0.0, 1.0) as f32
    };
    original - BRIGHTNESS_REDUCTION * original * progress
}

// ============================================================================
// FadeSession
// ============================================================================

/// Volume ramp currently being followed.
#[derive(Debug, Clone, Copy)]
struct VolumeRamp {
    baseline: u32,
    origin: i64,
    last_written: u32,
}

#[derive(Debug)]
struct FadeSession {
    generation: u64,
    start_time: i64,
    end_time: i64,
    settings: SleepModeSettings,
    original_volume: Option<u32>,
    original_brightness: Option<f32>,
    ramp: Option<VolumeRamp>,
    tasks: Vec<JoinHandle<()>>,
}

struct FadeInner {
    clock: Arc<dyn Clock>,
    media: Arc<dyn MediaController>,
    volume: Arc<dyn DeviceVolume>,
    brightness: Arc<dyn DeviceBrightness>,
    session: Mutex<Option<FadeSession>>,
    generation: AtomicU64,
    state_tx: watch::Sender<SleepModeState>,
}

impl FadeInner {
    fn lock_session(&self) -> MutexGuard<'_, Option<FadeSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One volume step. Returns false when the task should stop.
    fn step_volume(&self, generation: u64) -> bool {
        let mut guard = self.lock_session();
        let Some(session) = guard.as_mut().filter(|s| s.generation == generation) else {
            return false;
        };
        let Some(ramp) = session.ramp.as_mut() else {
            return false;
        };

        let now = self.clock.now_millis();
        let current = match self.volume.get() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "skipping volume step, read failed");
                return true;
            }
        };

        if current > ramp.last_written {
            debug!(current, last = ramp.last_written, "volume raised externally, restarting ramp");
            *ramp = VolumeRamp {
                baseline: current,
                origin: now,
                last_written: current,
            };
        }

        let target = volume_target(ramp.baseline, ramp.origin, session.end_time, now).min(current);
        if target != current {
            match self.volume.set(target) {
                Ok(()) => {
                    debug!(volume = target, "volume step");
                    ramp.last_written = target;
                }
                Err(e) => warn!(error = %e, "skipping volume step, write failed"),
            }
        } else {
            ramp.last_written = current;
        }

        now < session.end_time
    }

    /// One brightness step. Returns false when the task should stop.
    fn step_brightness(&self, generation: u64) -> bool {
        let guard = self.lock_session();
        let Some(session) = guard.as_ref().filter(|s| s.generation == generation) else {
            return false;
        };
        let Some(original) = session.original_brightness else {
            return false;
        };

        let now = self.clock.now_millis();
        if !self.brightness.can_write() {
            debug!("skipping brightness step, no write permission");
            return now < session.end_time;
        }

        let target = brightness_target(original, session.start_time, session.end_time, now);
        match self.brightness.set(target) {
            Ok(()) => debug!(brightness = target, "brightness step"),
            Err(e) => warn!(error = %e, "skipping brightness step, write failed"),
        }

        now < session.end_time
    }

    fn restore(&self, session: &FadeSession) {
        if let Some(volume) = session.original_volume {
            if let Err(e) = self.volume.set(volume) {
                warn!(volume, error = %e, "failed to restore volume");
            }
        }
        if let Some(brightness) = session.original_brightness {
            if let Err(e) = self.brightness.set(brightness) {
                warn!(brightness, error = %e, "failed to restore brightness");
            }
        }
    }
}

// ============================================================================
// SleepFadeController
// ============================================================================

/// Gradual volume and brightness fade for sleep mode.
///
/// Cloning yields another handle to the same fader.
#[derive(Clone)]
pub struct SleepFadeController {
    inner: Arc<FadeInner>,
}

impl SleepFadeController {
    pub fn new(
        clock: Arc<dyn Clock>,
        media: Arc<dyn MediaController>,
        volume: Arc<dyn DeviceVolume>,
        brightness: Arc<dyn DeviceBrightness>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SleepModeState::Inactive);
        Self {
            inner: Arc::new(FadeInner {
                clock,
                media,
                volume,
                brightness,
                session: Mutex::new(None),
                generation: AtomicU64::new(0),
                state_tx,
            }),
        }
    }

    /// Starts a fade session lasting `duration_minutes`.
    ///
    /// An active session is torn down first, restoring its values without
    /// stopping media. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidDuration`] for a zero duration or one
    /// that runs past the representable end of time.
    pub fn activate(
        &self,
        duration_minutes: u64,
        settings: SleepModeSettings,
    ) -> Result<(), TimerError> {
        let duration_millis = i64::try_from(duration_minutes)
            .ok()
            .and_then(|m| m.checked_mul(MILLIS_PER_MINUTE))
            .filter(|m| *m > 0)
            .ok_or(TimerError::InvalidDuration(duration_minutes))?;
        let inner = &self.inner;
        let start_time = inner.clock.now_millis();
        let end_time = start_time
            .checked_add(duration_millis)
            .ok_or(TimerError::InvalidDuration(duration_minutes))?;

        self.finish(false);

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let original_volume = if settings.enable_gradual_volume_reduction {
            match inner.volume.get() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "volume unreadable, volume fade disabled");
                    None
                }
            }
        } else {
            None
        };

        let original_brightness = if settings.enable_screen_dimming {
            if !inner.brightness.can_write() {
                warn!("no permission to write brightness, screen dimming disabled");
                None
            } else {
                match inner.brightness.get() {
                    Ok(b) => Some(b),
                    Err(e) => {
                        warn!(error = %e, "brightness unreadable, screen dimming disabled");
                        None
                    }
                }
            }
        } else {
            None
        };

        let step = Duration::from_millis(settings.step_millis());
        let mut tasks = Vec::new();
        if original_volume.is_some() {
            tasks.push(spawn_fade_task(step, {
                let inner = Arc::clone(inner);
                move || inner.step_volume(generation)
            }));
        }
        if original_brightness.is_some() {
            tasks.push(spawn_fade_task(step, {
                let inner = Arc::clone(inner);
                move || inner.step_brightness(generation)
            }));
        }

        *inner.lock_session() = Some(FadeSession {
            generation,
            start_time,
            end_time,
            settings,
            original_volume,
            original_brightness,
            ramp: original_volume.map(|v| VolumeRamp {
                baseline: v,
                origin: start_time,
                last_written: v,
            }),
            tasks,
        });

        inner.state_tx.send_replace(SleepModeState::Active {
            start_time,
            end_time,
            settings,
        });
        info!(
            duration_minutes,
            volume = original_volume.is_some(),
            dimming = original_brightness.is_some(),
            "sleep mode activated"
        );
        Ok(())
    }

    /// Ends the session: stops media if configured, then restores the
    /// captured volume and brightness. No-op when inactive.
    pub fn deactivate(&self) {
        self.finish(true);
    }

    /// Ends the session and restores device values without stopping media.
    pub fn deactivate_without_stop(&self) {
        self.finish(false);
    }

    /// Current fader state.
    pub fn state(&self) -> SleepModeState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribes to fader state changes.
    pub fn subscribe(&self) -> watch::Receiver<SleepModeState> {
        self.inner.state_tx.subscribe()
    }

    fn finish(&self, allow_stop: bool) {
        let inner = &self.inner;
        let Some(session) = inner.lock_session().take() else {
            return;
        };

        for task in &session.tasks {
            task.abort();
        }

        if allow_stop && session.settings.stop_media_at_end {
            if let Err(e) = inner.media.control(MediaTarget::All, MediaCommand::Stop) {
                warn!(error = %e, "failed to stop media at end of sleep mode");
            }
        }

        inner.restore(&session);
        inner.state_tx.send_replace(SleepModeState::Inactive);
        info!(stopped_media = allow_stop && session.settings.stop_media_at_end, "sleep mode deactivated");
    }
}

impl std::fmt::Debug for SleepFadeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SleepFadeController")
            .field("state", &self.state())
            .finish()
    }
}

fn spawn_fade_task<F>(step: Duration, mut on_step: F) -> JoinHandle<()>
where
    F: FnMut() -> bool + Send + 'static,
{
    let first = Instant::now() + step;
    tokio::spawn(async move {
        let mut ticker = interval_at(first, step);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !on_step() {
                break;
            }
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
