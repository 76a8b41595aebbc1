//! Waking windows derived from a user's sleep schedule.
//!
//! A schedule is two local `HH:MM` values: when the user goes to sleep and
//! when they wake up. The waking window for a calendar day runs from the wake
//! time to the next sleep time, which is on the following day when the user
//! goes to bed after midnight (sleep 01:00, wake 09:00 gives
//! `[D 09:00, D+1 01:00)`). Both ends are converted to instants once, through
//! [`crate::dst::resolve_local`].

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::{resolve_local, DstPolicy};
use crate::error::{EngineError, Result};
use crate::interval::Interval;

/// A user's configured sleep hours, in their local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepSchedule {
    #[serde(with = "hhmm")]
    pub sleep_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub sleep_end: NaiveTime,
}

impl SleepSchedule {
    /// Parse `HH:MM` strings, e.g. `SleepSchedule::parse("23:00", "07:00")`.
    pub fn parse(sleep_start: &str, sleep_end: &str) -> Result<Self> {
        Ok(Self {
            sleep_start: parse_hhmm(sleep_start)?,
            sleep_end: parse_hhmm(sleep_end)?,
        })
    }

    /// Build a schedule from optional profile fields. A schedule needs both
    /// values; if either is missing the user has no sleep hours (full-day
    /// waking window).
    pub fn from_profile(sleep_start: Option<&str>, sleep_end: Option<&str>) -> Result<Option<Self>> {
        match (sleep_start, sleep_end) {
            (Some(start), Some(end)) => Self::parse(start, end).map(Some),
            _ => Ok(None),
        }
    }

    /// Sleeping no hours at all is the same as having no schedule.
    fn is_empty(&self) -> bool {
        self.sleep_start == self.sleep_end
    }
}

pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| EngineError::InvalidTime(format!("'{}' is not HH:MM: {}", value, e)))
}

/// The portion of one day during which a user is awake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WakingWindow(Interval);

impl WakingWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        Interval::new(start, end).map(Self)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.0.start()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.0.end()
    }

    pub fn interval(&self) -> Interval {
        self.0
    }

    /// Local midnight to local midnight.
    pub fn full_day(date: NaiveDate, tz: Tz, policy: DstPolicy) -> Result<Self> {
        let start = resolve_local(tz, date.and_time(NaiveTime::MIN), policy)?;
        let end = resolve_local(tz, next_day(date)?.and_time(NaiveTime::MIN), policy)?;
        Self::new(start, end)
    }

    /// The waking window that begins on local `date`.
    pub fn for_date(
        date: NaiveDate,
        schedule: Option<&SleepSchedule>,
        tz: Tz,
        policy: DstPolicy,
    ) -> Result<Self> {
        let schedule = match schedule {
            Some(schedule) if !schedule.is_empty() => schedule,
            _ => return Self::full_day(date, tz, policy),
        };

        let wake = resolve_local(tz, date.and_time(schedule.sleep_end), policy)?;
        // Bedtime earlier on the clock than wake-up means bedtime is after midnight.
        let bed_date = if schedule.sleep_start > schedule.sleep_end {
            date
        } else {
            next_day(date)?
        };
        let bed = resolve_local(tz, bed_date.and_time(schedule.sleep_start), policy)?;
        Self::new(wake, bed)
    }

    /// The waking window `now` belongs to.
    ///
    /// Normally that is today's window. When `now` falls after midnight but
    /// before yesterday's window has ended (a user still up at 00:30 with a
    /// 01:00 bedtime), yesterday's window is returned instead.
    pub fn containing(
        now: DateTime<Utc>,
        schedule: Option<&SleepSchedule>,
        tz: Tz,
        policy: DstPolicy,
    ) -> Result<Self> {
        let today = now.with_timezone(&tz).date_naive();
        let window = Self::for_date(today, schedule, tz, policy)?;
        if now >= window.start() {
            return Ok(window);
        }

        let yesterday = today
            .pred_opt()
            .ok_or_else(|| EngineError::InvalidTime(format!("no day before {}", today)))?;
        let previous = Self::for_date(yesterday, schedule, tz, policy)?;
        if now < previous.end() {
            Ok(previous)
        } else {
            Ok(window)
        }
    }
}

fn next_day(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| EngineError::InvalidTime(format!("no day after {}", date)))
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}
