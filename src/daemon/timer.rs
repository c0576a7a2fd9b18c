//! Timer engine for the media timer.
//!
//! This module provides the core timer functionality:
//! - State transitions (Inactive → Running ⇄ Paused → Inactive)
//! - Countdown against a wall-clock deadline, one tick outstanding at a time
//! - Stopping media, vibrating and ending sleep mode on completion
//! - Event firing for UIs and external integrations
//!
//! The engine runs as a single tokio task. [`TimerHandle`] is the only way
//! to reach it: commands go over a queue and are acknowledged once applied,
//! state is read from a `watch` channel.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use super::error::TimerError;
use super::persist::EndTimePersister;
use super::sleep::SleepFadeController;
use super::Capabilities;
use crate::clock::Clock;
use crate::device::Haptics;
use crate::media::{MediaCommand, MediaController, MediaTarget};
use crate::settings::{SettingsStore, SettingsStoreExt};
use crate::types::{SleepModeState, TimerState, MILLIS_PER_MINUTE};

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Vibration length on completion.
const COMPLETION_VIBRATION: Duration = Duration::from_millis(500);

// ============================================================================
// EngineConfig
// ============================================================================

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Interval between state updates while running
    pub tick_period: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Sets the tick period; zero is raised to one millisecond.
    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period.max(Duration::from_millis(1));
        self
    }
}

// ============================================================================
// TimerEvent
// ============================================================================

/// Timer events for UIs and external integrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A run started
    Started {
        /// Requested run length
        duration_minutes: u64,
        /// Whether sleep mode accompanies the run
        use_sleep_mode: bool,
    },
    /// Countdown suspended
    Paused {
        /// Remaining millis frozen at pause time
        remaining_millis: i64,
    },
    /// Countdown continued
    Resumed {
        /// Remaining millis at resume time
        remaining_millis: i64,
    },
    /// Run cancelled by the user
    Cancelled,
    /// Periodic update while running
    Tick {
        /// Remaining millis
        remaining_millis: i64,
    },
    /// Run reached its end time
    Completed,
    /// Media was stopped on completion
    MediaStopped,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug)]
enum Command {
    Start {
        duration_minutes: u64,
        use_sleep_mode: bool,
        ack: oneshot::Sender<Result<(), TimerError>>,
    },
    Pause {
        ack: oneshot::Sender<()>,
    },
    Resume {
        ack: oneshot::Sender<()>,
    },
    PauseOrResume {
        ack: oneshot::Sender<()>,
    },
    Cancel {
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Timer engine that owns the timer state.
struct TimerEngine {
    clock: Arc<dyn Clock>,
    media: Arc<dyn MediaController>,
    settings: Arc<dyn SettingsStore>,
    haptics: Arc<dyn Haptics>,
    fade: SleepFadeController,
    persister: EndTimePersister,
    config: EngineConfig,
    state: TimerState,
    state_tx: watch::Sender<TimerState>,
    event_tx: broadcast::Sender<TimerEvent>,
    /// Deadline of the single outstanding tick
    next_tick: Option<Instant>,
}

impl TimerEngine {
    /// Runs the engine loop until shutdown or until every handle is dropped.
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.next_tick;
            let tick = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        self.cancel();
                        break;
                    }
                },
                () = tick => self.on_tick(),
            }
        }
        debug!("timer engine stopped");
    }

    /// Applies one command. Breaks on shutdown.
    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Start {
                duration_minutes,
                use_sleep_mode,
                ack,
            } => {
                let _ = ack.send(self.start(duration_minutes, use_sleep_mode));
            }
            Command::Pause { ack } => {
                self.pause();
                let _ = ack.send(());
            }
            Command::Resume { ack } => {
                self.resume();
                let _ = ack.send(());
            }
            Command::PauseOrResume { ack } => {
                match self.state {
                    TimerState::Running { .. } => self.pause(),
                    TimerState::Paused { .. } => self.resume(),
                    TimerState::Inactive => debug!("pause_or_resume ignored, timer inactive"),
                }
                let _ = ack.send(());
            }
            Command::Cancel { ack } => {
                self.cancel();
                let _ = ack.send(());
            }
            Command::Shutdown { ack } => {
                self.cancel();
                let _ = ack.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn start(&mut self, duration_minutes: u64, use_sleep_mode: bool) -> Result<(), TimerError> {
        let total = i64::try_from(duration_minutes)
            .ok()
            .and_then(|m| m.checked_mul(MILLIS_PER_MINUTE))
            .filter(|m| *m > 0)
            .ok_or(TimerError::InvalidDuration(duration_minutes))?;
        let now = self.clock.now_millis();
        let end_time = now
            .checked_add(total)
            .ok_or(TimerError::InvalidDuration(duration_minutes))?;

        if self.state.is_active() {
            info!("restarting active timer");
            self.next_tick = None;
            self.fade.deactivate_without_stop();
        }

        self.persister.persist(end_time);
        self.publish(TimerState::running(now, end_time, total, total, use_sleep_mode));
        self.schedule_tick(total);

        if use_sleep_mode {
            let settings = self.settings.sleep_mode_settings();
            if let Err(e) = self.fade.activate(duration_minutes, settings) {
                warn!(error = %e, "failed to activate sleep mode");
            }
        }

        info!(duration_minutes, use_sleep_mode, end_time, "timer started");
        self.emit(TimerEvent::Started {
            duration_minutes,
            use_sleep_mode,
        });
        Ok(())
    }

    fn pause(&mut self) {
        let TimerState::Running {
            start_time,
            end_time,
            total_duration_millis,
            use_sleep_mode,
            ..
        } = self.state
        else {
            debug!(state = self.state.as_str(), "pause ignored");
            return;
        };

        let now = self.clock.now_millis();
        let remaining = end_time - now;
        if remaining <= 0 {
            self.complete();
            return;
        }

        self.next_tick = None;
        self.publish(TimerState::paused(
            start_time,
            now,
            remaining,
            total_duration_millis,
            use_sleep_mode,
        ));
        info!(remaining_millis = remaining, "timer paused");
        self.emit(TimerEvent::Paused {
            remaining_millis: remaining,
        });
    }

    fn resume(&mut self) {
        let TimerState::Paused {
            start_time,
            remaining_millis,
            total_duration_millis,
            use_sleep_mode,
            ..
        } = self.state
        else {
            debug!(state = self.state.as_str(), "resume ignored");
            return;
        };

        let end_time = self.clock.now_millis().saturating_add(remaining_millis);
        self.persister.persist(end_time);
        self.publish(TimerState::running(
            start_time,
            end_time,
            remaining_millis,
            total_duration_millis,
            use_sleep_mode,
        ));
        self.schedule_tick(remaining_millis);
        info!(remaining_millis, "timer resumed");
        self.emit(TimerEvent::Resumed { remaining_millis });
    }

    fn cancel(&mut self) {
        self.next_tick = None;
        self.fade.deactivate();

        if !self.state.is_active() {
            debug!("cancel ignored, timer inactive");
            return;
        }

        self.persister.persist(0);
        self.publish(TimerState::Inactive);
        info!("timer cancelled");
        self.emit(TimerEvent::Cancelled);
    }

    fn on_tick(&mut self) {
        self.next_tick = None;
        let TimerState::Running {
            start_time,
            end_time,
            total_duration_millis,
            use_sleep_mode,
            ..
        } = self.state
        else {
            return;
        };

        let remaining = end_time - self.clock.now_millis();
        if remaining <= 0 {
            self.complete();
            return;
        }

        self.publish(TimerState::running(
            start_time,
            end_time,
            remaining,
            total_duration_millis,
            use_sleep_mode,
        ));
        debug!(remaining_millis = remaining, "tick");
        self.emit(TimerEvent::Tick {
            remaining_millis: remaining,
        });
        self.schedule_tick(remaining);
    }

    fn complete(&mut self) {
        self.next_tick = None;
        info!("timer completed, stopping media");

        match self.media.control(MediaTarget::All, MediaCommand::Stop) {
            Ok(()) => self.emit(TimerEvent::MediaStopped),
            Err(e) => warn!(error = %e, "failed to stop media"),
        }

        if self.settings.vibrate_on_completion() {
            if let Err(e) = self.haptics.vibrate(COMPLETION_VIBRATION) {
                debug!(error = %e, "vibration skipped");
            }
        }

        self.fade.deactivate_without_stop();
        self.persister.persist(0);
        self.publish(TimerState::Inactive);
        self.emit(TimerEvent::Completed);
    }

    /// Arms the next tick, never later than the end of the run.
    fn schedule_tick(&mut self, remaining_millis: i64) {
        let until_end = Duration::from_millis(u64::try_from(remaining_millis).unwrap_or(0));
        self.next_tick = Some(Instant::now() + self.config.tick_period.min(until_end));
    }

    fn publish(&mut self, state: TimerState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: TimerEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

// ============================================================================
// TimerHandle
// ============================================================================

/// Cloneable handle to a running timer engine.
///
/// Every command returns once the engine has applied it. When the last
/// handle is dropped the engine cancels any active run and exits.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<TimerState>,
    event_tx: broadcast::Sender<TimerEvent>,
    fade: SleepFadeController,
}

impl TimerHandle {
    /// Spawns the engine task. Must be called inside a tokio runtime.
    pub fn spawn(caps: Capabilities, config: EngineConfig) -> Self {
        let fade = SleepFadeController::new(
            Arc::clone(&caps.clock),
            Arc::clone(&caps.media),
            caps.volume,
            caps.brightness,
        );
        let (state_tx, state_rx) = watch::channel(TimerState::Inactive);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let engine = TimerEngine {
            clock: caps.clock,
            media: caps.media,
            persister: EndTimePersister::spawn(Arc::clone(&caps.settings)),
            settings: caps.settings,
            haptics: caps.haptics,
            fade: fade.clone(),
            config,
            state: TimerState::Inactive,
            state_tx,
            event_tx: event_tx.clone(),
            next_tick: None,
        };
        tokio::spawn(engine.run(command_rx));

        Self {
            commands: command_tx,
            state_rx,
            event_tx,
            fade,
        }
    }

    /// Starts a run of `duration_minutes`, replacing any active run.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::InvalidDuration`] for a zero duration or one
    /// whose end time does not fit in epoch millis, and
    /// [`TimerError::EngineUnavailable`] if the engine has stopped.
    pub async fn start(&self, duration_minutes: u64, use_sleep_mode: bool) -> Result<(), TimerError> {
        self.request(|ack| Command::Start {
            duration_minutes,
            use_sleep_mode,
            ack,
        })
        .await?
    }

    /// Pauses a running timer. No-op otherwise.
    pub async fn pause(&self) -> Result<(), TimerError> {
        self.request(|ack| Command::Pause { ack }).await
    }

    /// Resumes a paused timer. No-op otherwise.
    pub async fn resume(&self) -> Result<(), TimerError> {
        self.request(|ack| Command::Resume { ack }).await
    }

    /// Pauses when running, resumes when paused.
    pub async fn pause_or_resume(&self) -> Result<(), TimerError> {
        self.request(|ack| Command::PauseOrResume { ack }).await
    }

    /// Cancels the active run and ends sleep mode.
    ///
    /// Returns after ticking has stopped and device values were restored.
    pub async fn cancel(&self) -> Result<(), TimerError> {
        self.request(|ack| Command::Cancel { ack }).await
    }

    /// Cancels the active run and stops the engine task.
    pub async fn shutdown(&self) -> Result<(), TimerError> {
        self.request(|ack| Command::Shutdown { ack }).await
    }

    /// Latest published state.
    pub fn state(&self) -> TimerState {
        *self.state_rx.borrow()
    }

    /// Subscribes to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state_rx.clone()
    }

    /// Subscribes to timer events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<TimerEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribes to sleep mode state.
    pub fn sleep_mode_state(&self) -> watch::Receiver<SleepModeState> {
        self.fade.subscribe()
    }

    /// Returns true while the engine task accepts commands.
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TimerError> {
        let (ack, reply) = oneshot::channel();
        self.commands
            .send(make(ack))
            .map_err(|_| TimerError::EngineUnavailable)?;
        reply.await.map_err(|_| TimerError::EngineUnavailable)
    }
}

// ============================================================================
// Tests
// ============================================================================
