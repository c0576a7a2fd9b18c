//! Scheduled timer definitions and their alarm registrations.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::alarm::{AlarmFired, AlarmRequest, AlarmScheduler};
use super::error::ScheduleError;
use super::next_trigger;
use crate::clock::Clock;
use crate::daemon::TimerHandle;
use crate::settings::{SettingKey, SettingValue, SettingsStore, SettingsStoreExt};
use crate::types::{ScheduledTimerDefinition, MAX_SCHEDULED_DURATION_MINUTES};

/// Checks a definition before it is stored.
fn check(definition: &ScheduledTimerDefinition) -> Result<(), ScheduleError> {
    if definition.hour > 23 || definition.minute > 59 {
        return Err(ScheduleError::InvalidTime {
            hour: definition.hour,
            minute: definition.minute,
        });
    }
    if !(1..=MAX_SCHEDULED_DURATION_MINUTES).contains(&definition.duration_minutes) {
        return Err(ScheduleError::InvalidDuration);
    }
    Ok(())
}

// ============================================================================
// ScheduledTimerPlanner
// ============================================================================

/// Manages scheduled timer definitions and keeps one alarm registered for
/// the next occurrence of every enabled definition.
///
/// Trigger times are computed in `Tz`, which is the local time zone in
/// production.
pub struct ScheduledTimerPlanner<Tz: TimeZone = Local> {
    settings: Arc<dyn SettingsStore>,
    alarms: Arc<dyn AlarmScheduler>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    edit_lock: Mutex<()>,
}

impl ScheduledTimerPlanner<Local> {
    /// Creates a planner working in the local time zone.
    pub fn local(
        settings: Arc<dyn SettingsStore>,
        alarms: Arc<dyn AlarmScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(settings, alarms, clock, Local)
    }
}

impl<Tz: TimeZone> ScheduledTimerPlanner<Tz> {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        alarms: Arc<dyn AlarmScheduler>,
        clock: Arc<dyn Clock>,
        tz: Tz,
    ) -> Self {
        Self {
            settings,
            alarms,
            clock,
            tz,
            edit_lock: Mutex::new(()),
        }
    }

    /// All stored definitions.
    pub fn definitions(&self) -> Result<Vec<ScheduledTimerDefinition>, ScheduleError> {
        Ok(self.settings.scheduled_timers()?)
    }

    /// Stores a new definition and registers its next occurrence.
    pub fn add(&self, definition: ScheduledTimerDefinition) -> Result<(), ScheduleError> {
        check(&definition)?;
        self.edit(|list| {
            list.push(definition.clone());
            Ok(())
        })?;
        info!(timer_id = %definition.id, name = %definition.name, "scheduled timer added");
        self.register(&definition)?;
        Ok(())
    }

    /// Replaces the definition with the same id and re-registers it.
    pub fn update(&self, definition: ScheduledTimerDefinition) -> Result<(), ScheduleError> {
        check(&definition)?;
        self.edit(|list| {
            let slot = list
                .iter_mut()
                .find(|d| d.id == definition.id)
                .ok_or_else(|| ScheduleError::NotFound(definition.id.clone()))?;
            *slot = definition.clone();
            Ok(())
        })?;
        info!(timer_id = %definition.id, "scheduled timer updated");
        self.alarms.cancel(&definition.id)?;
        self.register(&definition)?;
        Ok(())
    }

    /// Deletes a definition and its alarm.
    pub fn remove(&self, timer_id: &str) -> Result<(), ScheduleError> {
        self.edit(|list| {
            let before = list.len();
            list.retain(|d| d.id != timer_id);
            if list.len() == before {
                return Err(ScheduleError::NotFound(timer_id.to_string()));
            }
            Ok(())
        })?;
        info!(timer_id, "scheduled timer removed");
        self.alarms.cancel(timer_id)
    }

    /// Arms or disarms a definition.
    pub fn set_enabled(&self, timer_id: &str, enabled: bool) -> Result<(), ScheduleError> {
        let mut updated = None;
        self.edit(|list| {
            let definition = list
                .iter_mut()
                .find(|d| d.id == timer_id)
                .ok_or_else(|| ScheduleError::NotFound(timer_id.to_string()))?;
            definition.is_enabled = enabled;
            updated = Some(definition.clone());
            Ok(())
        })?;
        match updated {
            Some(definition) => {
                info!(timer_id, enabled, "scheduled timer toggled");
                self.register(&definition)?;
                Ok(())
            }
            None => Err(ScheduleError::NotFound(timer_id.to_string())),
        }
    }

    /// Registers the next occurrence of every enabled definition and
    /// cancels the rest. Returns the number of alarms registered.
    pub fn reschedule_all(&self) -> Result<usize, ScheduleError> {
        let mut registered = 0;
        for definition in self.definitions()? {
            if self.register(&definition)?.is_some() {
                registered += 1;
            }
        }
        debug!(registered, "scheduled timers registered");
        Ok(registered)
    }

    /// Registers the occurrence after the one that fired at `fired_at`.
    ///
    /// The search starts no earlier than `fired_at`, so a wall clock that
    /// still reads slightly before the trigger cannot re-arm the same
    /// instant. Unknown or disabled ids register nothing. Calling this twice
    /// for the same firing leaves a single registration.
    pub fn on_alarm_fired(
        &self,
        timer_id: &str,
        fired_at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let Some(definition) = self.definitions()?.into_iter().find(|d| d.id == timer_id) else {
            warn!(timer_id, "alarm fired for unknown scheduled timer");
            self.alarms.cancel(timer_id)?;
            return Ok(None);
        };
        let from = self.clock.now_millis().max(fired_at.timestamp_millis());
        self.register_after(&definition, from)
    }

    /// Next trigger instant of `definition`, if it is enabled.
    pub fn next_trigger_for(
        &self,
        definition: &ScheduledTimerDefinition,
    ) -> Result<Option<DateTime<Tz>>, ScheduleError> {
        self.next_trigger_after(definition, self.clock.now_millis())
    }

    fn next_trigger_after(
        &self,
        definition: &ScheduledTimerDefinition,
        millis: i64,
    ) -> Result<Option<DateTime<Tz>>, ScheduleError> {
        if !definition.is_enabled {
            return Ok(None);
        }
        let from = self
            .tz
            .timestamp_millis_opt(millis)
            .single()
            .ok_or(ScheduleError::ClockOutOfRange(millis))?;
        Ok(next_trigger(
            definition.hour,
            definition.minute,
            &definition.enabled_days,
            &from,
        ))
    }

    /// Keeps exactly one alarm for an enabled definition, none otherwise.
    fn register(
        &self,
        definition: &ScheduledTimerDefinition,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        self.register_after(definition, self.clock.now_millis())
    }

    fn register_after(
        &self,
        definition: &ScheduledTimerDefinition,
        millis: i64,
    ) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let Some(at) = self.next_trigger_after(definition, millis)? else {
            if definition.is_enabled {
                warn!(timer_id = %definition.id, "no upcoming trigger, alarm not registered");
            }
            self.alarms.cancel(&definition.id)?;
            return Ok(None);
        };

        let at = at.with_timezone(&Utc);
        self.alarms.schedule(AlarmRequest {
            at,
            timer_id: definition.id.clone(),
            duration_minutes: definition.duration_minutes,
            use_sleep_mode: definition.use_sleep_mode,
        })?;
        Ok(Some(at))
    }

    /// Read-modify-write of the stored list under the edit lock.
    fn edit<F>(&self, apply: F) -> Result<(), ScheduleError>
    where
        F: FnOnce(&mut Vec<ScheduledTimerDefinition>) -> Result<(), ScheduleError>,
    {
        let _guard = self.edit_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut list = self.definitions()?;
        apply(&mut list)?;
        self.settings.set(
            SettingKey::ScheduledTimerDefinitions,
            SettingValue::ScheduledTimers(list),
        )?;
        Ok(())
    }
}

// ============================================================================
// AlarmDispatcher
// ============================================================================

/// Turns fired alarms into timer runs.
pub struct AlarmDispatcher<Tz: TimeZone = Local> {
    timer: TimerHandle,
    planner: Arc<ScheduledTimerPlanner<Tz>>,
}

impl<Tz> AlarmDispatcher<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    pub fn new(timer: TimerHandle, planner: Arc<ScheduledTimerPlanner<Tz>>) -> Self {
        Self { timer, planner }
    }

    /// Starts the run for `fired`, then registers the next occurrence.
    ///
    /// The next occurrence is registered even if the run could not start.
    pub async fn dispatch(&self, fired: AlarmFired) -> Result<(), ScheduleError> {
        info!(
            timer_id = %fired.timer_id,
            duration_minutes = fired.duration_minutes,
            use_sleep_mode = fired.use_sleep_mode,
            "scheduled timer triggered"
        );
        let started = self
            .timer
            .start(fired.duration_minutes, fired.use_sleep_mode)
            .await;
        if let Err(e) = &started {
            warn!(timer_id = %fired.timer_id, error = %e, "scheduled run did not start");
        }

        self.planner.on_alarm_fired(&fired.timer_id, fired.at)?;
        started.map_err(ScheduleError::from)
    }

    /// Dispatches alarms until the channel closes.
    pub async fn run(self, mut fired_rx: mpsc::UnboundedReceiver<AlarmFired>) {
        while let Some(fired) = fired_rx.recv().await {
            if let Err(e) = self.dispatch(fired).await {
                warn!(error = %e, "failed to dispatch alarm");
            }
        }
        debug!("alarm channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::schedule::MockAlarmScheduler;
    use crate::settings::MemorySettingsStore;
    use crate::types::DayOfWeek;
    use std::collections::BTreeSet;

    // 2024-01-09T09:00:00Z, a Tuesday.
    const TUESDAY_9AM: i64 = 1_704_790_800_000;

    struct Fixture {
        planner: ScheduledTimerPlanner<Utc>,
        settings: Arc<MemorySettingsStore>,
        alarms: Arc<MockAlarmScheduler>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let settings = Arc::new(MemorySettingsStore::new());
        let alarms = Arc::new(MockAlarmScheduler::new());
        let clock = Arc::new(ManualClock::new(TUESDAY_9AM));
        let planner =
            ScheduledTimerPlanner::new(settings.clone(), alarms.clone(), clock.clone(), Utc);
        Fixture {
            planner,
            settings,
            alarms,
            clock,
        }
    }

    fn days(list: &[DayOfWeek]) -> BTreeSet<DayOfWeek> {
        list.iter().copied().collect()
    }

    fn monday_8am() -> ScheduledTimerDefinition {
        ScheduledTimerDefinition::new("morning", 8, 0, 30, days(&[DayOfWeek::Monday]))
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    mod planner_tests {
        use super::*;

        #[test]
        fn test_add_persists_and_registers() {
            let f = fixture();
            let def = monday_8am().with_sleep_mode(true);
            f.planner.add(def.clone()).unwrap();

            assert_eq!(f.settings.scheduled_timers().unwrap(), vec![def.clone()]);
            let request = f.alarms.registration(&def.id).unwrap();
            assert_eq!(request.at, utc(2024, 1, 15, 8, 0));
            assert_eq!(request.duration_minutes, 30);
            assert!(request.use_sleep_mode);
        }

        #[test]
        fn test_add_rejects_invalid_time() {
            let f = fixture();
            let def = ScheduledTimerDefinition::new("bad", 24, 0, 30, days(&[DayOfWeek::Monday]));
            assert_eq!(
                f.planner.add(def),
                Err(ScheduleError::InvalidTime {
                    hour: 24,
                    minute: 0
                })
            );
            assert!(f.planner.definitions().unwrap().is_empty());
            assert_eq!(f.alarms.registration_count(), 0);
        }

        #[test]
        fn test_add_rejects_zero_duration() {
            let f = fixture();
            let def = ScheduledTimerDefinition::new("zero", 8, 0, 0, days(&[DayOfWeek::Monday]));
            assert_eq!(f.planner.add(def), Err(ScheduleError::InvalidDuration));
        }

        #[test]
        fn test_add_rejects_duration_over_one_day() {
            let f = fixture();
            let def = ScheduledTimerDefinition::new(
                "huge",
                8,
                0,
                153_722_867_280_000,
                days(&[DayOfWeek::Monday]),
            );
            assert_eq!(f.planner.add(def), Err(ScheduleError::InvalidDuration));
            assert!(f.planner.definitions().unwrap().is_empty());

            let longest = ScheduledTimerDefinition::new(
                "day",
                8,
                0,
                MAX_SCHEDULED_DURATION_MINUTES,
                days(&[DayOfWeek::Monday]),
            );
            f.planner.add(longest).unwrap();
        }

        #[test]
        fn test_add_disabled_does_not_register() {
            let f = fixture();
            let def = monday_8am().with_enabled(false);
            f.planner.add(def.clone()).unwrap();
            assert!(f.alarms.registration(&def.id).is_none());
        }

        #[test]
        fn test_add_without_days_does_not_register() {
            let f = fixture();
            let def = ScheduledTimerDefinition::new("never", 8, 0, 30, BTreeSet::new());
            f.planner.add(def.clone()).unwrap();
            assert!(f.alarms.registration(&def.id).is_none());
            assert_eq!(f.planner.definitions().unwrap().len(), 1);
        }

        #[test]
        fn test_update_reregisters() {
            let f = fixture();
            let def = monday_8am();
            f.planner.add(def.clone()).unwrap();

            let mut edited = def.clone();
            edited.hour = 10;
            edited.enabled_days = days(&[DayOfWeek::Tuesday]);
            f.planner.update(edited.clone()).unwrap();

            assert_eq!(
                f.alarms.registration(&def.id).unwrap().at,
                utc(2024, 1, 9, 10, 0)
            );
            assert_eq!(f.alarms.registration_count(), 1);
            assert_eq!(f.planner.definitions().unwrap(), vec![edited]);
        }

        #[test]
        fn test_update_unknown_is_not_found() {
            let f = fixture();
            let err = f.planner.update(monday_8am()).unwrap_err();
            assert!(matches!(err, ScheduleError::NotFound(_)));
        }

        #[test]
        fn test_remove_cancels() {
            let f = fixture();
            let def = monday_8am();
            f.planner.add(def.clone()).unwrap();
            f.planner.remove(&def.id).unwrap();

            assert!(f.planner.definitions().unwrap().is_empty());
            assert!(f.alarms.registration(&def.id).is_none());
            assert!(matches!(
                f.planner.remove(&def.id),
                Err(ScheduleError::NotFound(_))
            ));
        }

        #[test]
        fn test_set_enabled_toggles_registration() {
            let f = fixture();
            let def = monday_8am();
            f.planner.add(def.clone()).unwrap();

            f.planner.set_enabled(&def.id, false).unwrap();
            assert!(f.alarms.registration(&def.id).is_none());
            assert!(!f.planner.definitions().unwrap()[0].is_enabled);

            f.planner.set_enabled(&def.id, true).unwrap();
            assert!(f.alarms.registration(&def.id).is_some());
        }

        #[test]
        fn test_reschedule_all_counts_enabled() {
            let f = fixture();
            f.planner.add(monday_8am()).unwrap();
            f.planner.add(monday_8am().with_enabled(false)).unwrap();
            f.planner
                .add(ScheduledTimerDefinition::new(
                    "daily",
                    22,
                    0,
                    45,
                    DayOfWeek::ALL.into(),
                ))
                .unwrap();

            assert_eq!(f.planner.reschedule_all().unwrap(), 2);
            assert_eq!(f.alarms.registration_count(), 2);
        }

        #[test]
        fn test_on_alarm_fired_registers_next_week() {
            let f = fixture();
            let def = monday_8am();
            f.planner.add(def.clone()).unwrap();

            let fired_at = utc(2024, 1, 15, 8, 0);
            f.clock.set(fired_at.timestamp_millis() + 5);
            let next = f.planner.on_alarm_fired(&def.id, fired_at).unwrap();
            assert_eq!(next, Some(utc(2024, 1, 22, 8, 0)));

            let again = f.planner.on_alarm_fired(&def.id, fired_at).unwrap();
            assert_eq!(again, next);
            assert_eq!(f.alarms.registration_count(), 1);
        }

        #[test]
        fn test_on_alarm_fired_with_lagging_clock_skips_fired_instant() {
            let f = fixture();
            let def = monday_8am();
            f.planner.add(def.clone()).unwrap();

            // Wall clock stepped back a few millis after the alarm went off.
            let fired_at = utc(2024, 1, 15, 8, 0);
            f.clock.set(fired_at.timestamp_millis() - 5);
            let next = f.planner.on_alarm_fired(&def.id, fired_at).unwrap();

            assert_eq!(next, Some(utc(2024, 1, 22, 8, 0)));
            assert_eq!(
                f.alarms.registration(&def.id).unwrap().at,
                utc(2024, 1, 22, 8, 0)
            );
        }

        #[test]
        fn test_on_alarm_fired_unknown_id() {
            let f = fixture();
            let fired_at = utc(2024, 1, 15, 8, 0);
            assert_eq!(f.planner.on_alarm_fired("gone", fired_at).unwrap(), None);
            assert_eq!(f.alarms.cancelled(), vec!["gone".to_string()]);
        }

        #[test]
        fn test_settings_failure_surfaces() {
            let f = fixture();
            f.settings.set_should_fail(true);
            let err = f.planner.add(monday_8am()).unwrap_err();
            assert!(matches!(err, ScheduleError::Settings(_)));
            assert_eq!(f.alarms.registration_count(), 0);
        }
    }

    mod dispatcher_tests {
        use super::*;
        use crate::clock::MonotonicClock;
        use crate::daemon::{Capabilities, EngineConfig};
        use crate::device::{MockBrightness, MockHaptics, MockVolume};
        use crate::media::MockMediaController;

        #[tokio::test(start_paused = true)]
        async fn test_dispatch_starts_run_and_reregisters() {
            let f = fixture();
            let def = monday_8am().with_sleep_mode(true);
            f.planner.add(def.clone()).unwrap();

            let monday = utc(2024, 1, 15, 8, 0).timestamp_millis();
            f.clock.set(monday + 10);
            let caps = Capabilities {
                clock: Arc::new(MonotonicClock::starting_at(monday + 10)),
                media: Arc::new(MockMediaController::new()),
                settings: f.settings.clone(),
                volume: Arc::new(MockVolume::new(10, 15)),
                brightness: Arc::new(MockBrightness::new(0.5)),
                haptics: Arc::new(MockHaptics::new()),
            };
            let handle = TimerHandle::spawn(caps, EngineConfig::default());
            let dispatcher = AlarmDispatcher::new(handle.clone(), Arc::new(f.planner));

            dispatcher
                .dispatch(AlarmFired {
                    at: utc(2024, 1, 15, 8, 0),
                    timer_id: def.id.clone(),
                    duration_minutes: 30,
                    use_sleep_mode: true,
                })
                .await
                .unwrap();

            let state = handle.state();
            assert!(state.is_running());
            assert!(state.uses_sleep_mode());
            assert_eq!(state.total_duration_millis(), 30 * 60_000);
            assert_eq!(
                f.alarms.registration(&def.id).unwrap().at,
                utc(2024, 1, 22, 8, 0)
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_dispatch_reregisters_even_if_start_fails() {
            let f = fixture();
            let def = monday_8am();
            f.planner.add(def.clone()).unwrap();

            let caps = Capabilities {
                clock: Arc::new(MonotonicClock::starting_at(TUESDAY_9AM)),
                media: Arc::new(MockMediaController::new()),
                settings: f.settings.clone(),
                volume: Arc::new(MockVolume::new(10, 15)),
                brightness: Arc::new(MockBrightness::new(0.5)),
                haptics: Arc::new(MockHaptics::new()),
            };
            let handle = TimerHandle::spawn(caps, EngineConfig::default());
            handle.shutdown().await.unwrap();
            let calls_before = f.alarms.schedule_calls().len();

            let dispatcher = AlarmDispatcher::new(handle, Arc::new(f.planner));
            let err = dispatcher
                .dispatch(AlarmFired {
                    at: utc(2024, 1, 15, 8, 0),
                    timer_id: def.id.clone(),
                    duration_minutes: 30,
                    use_sleep_mode: false,
                })
                .await
                .unwrap_err();

            assert_eq!(err, ScheduleError::Timer(crate::daemon::TimerError::EngineUnavailable));
            assert_eq!(f.alarms.schedule_calls().len(), calls_before + 1);
        }
    }
}
