//! Alarm registration for scheduled timers.
//!
//! An [`AlarmScheduler`] holds at most one pending alarm per timer id.
//! Scheduling an id again replaces its alarm. When an alarm goes off the
//! backend delivers an [`AlarmFired`] message.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info};

use super::error::ScheduleError;
use crate::clock::Clock;

// ============================================================================
// Messages
// ============================================================================

/// Request to fire an alarm for a scheduled timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRequest {
    /// Instant the alarm goes off
    pub at: DateTime<Utc>,
    /// Definition the alarm belongs to
    pub timer_id: String,
    /// Length of the run to start
    pub duration_minutes: u64,
    /// Start the run in sleep mode
    pub use_sleep_mode: bool,
}

/// Delivered when an alarm goes off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmFired {
    /// Instant the alarm was registered for
    pub at: DateTime<Utc>,
    pub timer_id: String,
    pub duration_minutes: u64,
    pub use_sleep_mode: bool,
}

impl From<AlarmRequest> for AlarmFired {
    fn from(request: AlarmRequest) -> Self {
        Self {
            at: request.at,
            timer_id: request.timer_id,
            duration_minutes: request.duration_minutes,
            use_sleep_mode: request.use_sleep_mode,
        }
    }
}

// ============================================================================
// AlarmScheduler
// ============================================================================

/// Capability for registering wake-up alarms.
pub trait AlarmScheduler: Send + Sync {
    /// Registers an alarm, replacing any pending alarm for the same id.
    fn schedule(&self, request: AlarmRequest) -> Result<(), ScheduleError>;

    /// Removes the pending alarm for `timer_id`, if any.
    fn cancel(&self, timer_id: &str) -> Result<(), ScheduleError>;
}

// ============================================================================
// TokioAlarmScheduler
// ============================================================================

/// Alarm scheduler backed by one sleeping tokio task per timer id.
pub struct TokioAlarmScheduler {
    clock: Arc<dyn Clock>,
    fired_tx: mpsc::UnboundedSender<AlarmFired>,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TokioAlarmScheduler {
    /// Creates the scheduler and the receiver its alarms are delivered on.
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<AlarmFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            clock,
            fired_tx,
            pending: Mutex::new(HashMap::new()),
        };
        (scheduler, fired_rx)
    }

    /// Ids with an alarm that has not gone off yet.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut pending = self.lock_pending();
        pending.retain(|_, task| !task.is_finished());
        let mut ids: Vec<String> = pending.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn schedule(&self, request: AlarmRequest) -> Result<(), ScheduleError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ScheduleError::Alarm(e.to_string()))?;

        let delay_millis = request.at.timestamp_millis() - self.clock.now_millis();
        let delay = Duration::from_millis(u64::try_from(delay_millis).unwrap_or(0));
        let timer_id = request.timer_id.clone();
        let fired_tx = self.fired_tx.clone();

        info!(timer_id = %timer_id, at = %request.at, "alarm scheduled");
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(timer_id = %request.timer_id, "alarm fired");
            let _ = fired_tx.send(AlarmFired::from(request));
        });

        let mut pending = self.lock_pending();
        pending.retain(|_, task| !task.is_finished());
        if let Some(previous) = pending.insert(timer_id, task) {
            previous.abort();
        }
        Ok(())
    }

    fn cancel(&self, timer_id: &str) -> Result<(), ScheduleError> {
        if let Some(task) = self.lock_pending().remove(timer_id) {
            task.abort();
            info!(timer_id, "alarm cancelled");
        }
        Ok(())
    }
}

impl Drop for TokioAlarmScheduler {
    fn drop(&mut self) {
        for task in self.lock_pending().values() {
            task.abort();
        }
    }
}

// ============================================================================
// MockAlarmScheduler
// ============================================================================

/// Mock alarm scheduler for testing.
#[derive(Debug, Default)]
pub struct MockAlarmScheduler {
    registrations: Mutex<HashMap<String, AlarmRequest>>,
    schedule_calls: Mutex<Vec<AlarmRequest>>,
    cancelled: Mutex<Vec<String>>,
    should_fail: AtomicBool,
}

impl MockAlarmScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Pending registration for `timer_id`.
    #[must_use]
    pub fn registration(&self, timer_id: &str) -> Option<AlarmRequest> {
        self.registrations.lock().unwrap().get(timer_id).cloned()
    }

    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.registrations.lock().unwrap().len()
    }

    /// Every `schedule` call in order.
    #[must_use]
    pub fn schedule_calls(&self) -> Vec<AlarmRequest> {
        self.schedule_calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl AlarmScheduler for MockAlarmScheduler {
    fn schedule(&self, request: AlarmRequest) -> Result<(), ScheduleError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(ScheduleError::Alarm("simulated failure".to_string()));
        }
        self.schedule_calls.lock().unwrap().push(request.clone());
        self.registrations
            .lock()
            .unwrap()
            .insert(request.timer_id.clone(), request);
        Ok(())
    }

    fn cancel(&self, timer_id: &str) -> Result<(), ScheduleError> {
        self.registrations.lock().unwrap().remove(timer_id);
        self.cancelled.lock().unwrap().push(timer_id.to_string());
        Ok(())
    }
}
