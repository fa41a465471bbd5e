//! When a job fires.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Fire every `every`, first after `initial_delay`.
    Interval { every: Duration, initial_delay: Duration },
    /// Fire at each local time of day in `timezone`.
    DailyTimes { times: Vec<NaiveTime>, timezone: Tz },
}

impl Trigger {
    /// Fixed interval whose first firing is one interval from now.
    pub fn every(every: Duration) -> Self {
        Self::Interval {
            every,
            initial_delay: every,
        }
    }

    pub fn daily(times: Vec<NaiveTime>, timezone: Tz) -> Self {
        Self::DailyTimes { times, timezone }
    }

    /// First firing for a job started at `now`.
    ///
    /// `None` means the trigger never fires (a daily trigger with no times).
    pub fn first_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval { initial_delay, .. } => now.checked_add_signed(to_delta(*initial_delay)),
            Self::DailyTimes { .. } => self.next_fire_after(now),
        }
    }

    /// The firing strictly after `after`.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval { every, .. } => {
                let step = to_delta(*every).max(TimeDelta::milliseconds(1));
                after.checked_add_signed(step)
            }
            Self::DailyTimes { times, timezone } => {
                let today = after.with_timezone(timezone).date_naive();
                // Two days ahead covers a time that was skipped by DST today.
                (0..=2)
                    .filter_map(|offset| today.checked_add_days(chrono::Days::new(offset)))
                    .flat_map(|date| times.iter().filter_map(move |t| local_instant(*timezone, date, *t)))
                    .filter(|at| *at > after)
                    .min()
            }
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Interval { every, .. } => format!("every {every:?}"),
            Self::DailyTimes { times, timezone } => {
                let times: Vec<String> = times.iter().map(|t| t.format("%H:%M").to_string()).collect();
                format!("daily at {} {timezone}", times.join(", "))
            }
        }
    }
}

/// Resolve a wall-clock time to an instant.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times that
/// do not exist (clocks going forward) shift forward one hour.
fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|at| at.with_timezone(&Utc))
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}
