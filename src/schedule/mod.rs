//! Recurring scheduled timers.
//!
//! A scheduled timer is a time of day plus a set of weekdays. The planner
//! keeps at most one alarm registered per definition, always for the next
//! occurrence; when it fires the run is started and the following
//! occurrence is registered.

mod alarm;
mod error;
mod planner;

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveTime, TimeZone};
use tracing::debug;

use crate::types::DayOfWeek;

pub use alarm::{AlarmFired, AlarmRequest, AlarmScheduler, MockAlarmScheduler, TokioAlarmScheduler};
pub use error::ScheduleError;
pub use planner::{AlarmDispatcher, ScheduledTimerPlanner};

/// Days scanned ahead of today, inclusive.
const LOOKAHEAD_DAYS: u64 = 7;

/// Computes the next instant at `hour:minute:00.000` on an enabled weekday
/// strictly after `now`.
///
/// Today only qualifies if the trigger time is still ahead. Days whose
/// trigger time does not exist in the time zone (a DST gap) are skipped;
/// an ambiguous time resolves to its earlier instant. Returns `None` for an
/// empty day set, an invalid time, or when no day in the next week matches.
pub fn next_trigger<Tz: TimeZone>(
    hour: u32,
    minute: u32,
    enabled_days: &BTreeSet<DayOfWeek>,
    now: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    if enabled_days.is_empty() {
        return None;
    }
    let trigger_time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = now.date_naive();
    let tz = now.timezone();

    for offset in 0..=LOOKAHEAD_DAYS {
        let date = today.checked_add_days(Days::new(offset))?;
        if !enabled_days.contains(&DayOfWeek::from(date.weekday())) {
            continue;
        }
        if offset == 0 && trigger_time <= now.time() {
            continue;
        }

        match tz.from_local_datetime(&date.and_time(trigger_time)) {
            LocalResult::Single(at) => return Some(at),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest),
            LocalResult::None => {
                debug!(%date, %trigger_time, "trigger time does not exist, skipping day");
            }
        }
    }
    None
}
