//! Find the windows in which every participant is free.
//!
//! Each participant's free time is the complement of their busy time within
//! the query range, minus a daily excluded hour band (typically overnight).
//! The per-participant free sets are then intersected and short windows are
//! dropped.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::{self, DstPolicy};
use crate::error::{EngineError, Result};
use crate::event::{self, Event};
use crate::interval::{self, Interval};
use crate::UserId;

/// Slots shorter than this are not worth offering for a meeting.
pub const DEFAULT_MIN_SLOT_MINUTES: i64 = 30;

/// A mutual availability request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    /// Everyone who must be free. The engine adds nobody implicitly.
    pub user_ids: BTreeSet<UserId>,
    pub range_start: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    #[serde(default = "default_min_slot_minutes")]
    pub min_slot_minutes: i64,
    /// First hour (0-23) of the daily excluded band.
    #[serde(default)]
    pub excluded_hour_start: u32,
    /// Hour (0-23) at which the daily excluded band ends. Equal to
    /// `excluded_hour_start` means no band; smaller means the band wraps
    /// midnight.
    #[serde(default)]
    pub excluded_hour_end: u32,
    /// IANA zone whose calendar days and hours define the excluded band.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_min_slot_minutes() -> i64 {
    DEFAULT_MIN_SLOT_MINUTES
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl AvailabilityQuery {
    /// A query with the default minimum slot length and no excluded band.
    pub fn new<I, S>(user_ids: I, range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<UserId>,
    {
        Self {
            user_ids: user_ids.into_iter().map(Into::into).collect(),
            range_start,
            range_end,
            min_slot_minutes: DEFAULT_MIN_SLOT_MINUTES,
            excluded_hour_start: 0,
            excluded_hour_end: 0,
            timezone: default_timezone(),
        }
    }

    pub fn with_min_slot_minutes(mut self, minutes: i64) -> Self {
        self.min_slot_minutes = minutes;
        self
    }

    pub fn with_excluded_hours(mut self, start: u32, end: u32) -> Self {
        self.excluded_hour_start = start;
        self.excluded_hour_end = end;
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// The query range as an interval, or `InvalidRange`.
    pub fn range(&self) -> Result<Interval> {
        Interval::new(self.range_start, self.range_end).map_err(|_| EngineError::InvalidRange {
            start: self.range_start,
            end: self.range_end,
        })
    }

    /// Check every parameter, returning the range and the band timezone.
    pub fn validate(&self) -> Result<(Interval, Tz)> {
        let range = self.range()?;
        for hour in [self.excluded_hour_start, self.excluded_hour_end] {
            if hour > 23 {
                return Err(EngineError::InvalidQuery(format!(
                    "excluded hour {} is outside 0-23",
                    hour
                )));
            }
        }
        interval::minutes(self.min_slot_minutes, "min_slot_minutes")?;
        let tz = dst::parse_timezone(&self.timezone)?;
        Ok((range, tz))
    }
}

/// A window in which every participant is free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl FreeSlot {
    pub fn interval(&self) -> Result<Interval> {
        Interval::new(self.start, self.end)
    }
}

impl From<Interval> for FreeSlot {
    fn from(interval: Interval) -> Self {
        Self {
            start: interval.start(),
            end: interval.end(),
            duration_minutes: interval.duration_minutes(),
        }
    }
}

/// Find the windows, within the query range, in which every user in
/// `query.user_ids` is free.
///
/// `per_user_events` maps each user to their events; a user missing from the
/// map has no events and is free for the whole range (minus excluded hours).
/// Users in the map but not in the query are ignored.
///
/// Returns slots of at least `min_slot_minutes`, ascending by start, with no
/// cap on their number. An empty `user_ids` set yields no slots.
///
/// # Errors
///
/// `InvalidRange` if `range_start >= range_end`; `InvalidQuery` for hours
/// outside 0-23 or a negative minimum; `InvalidTime` for an unknown timezone;
/// `InvalidInterval` if any participant has a malformed event.
pub fn find_mutual_free_slots(
    query: &AvailabilityQuery,
    per_user_events: &BTreeMap<UserId, Vec<Event>>,
) -> Result<Vec<FreeSlot>> {
    let (range, tz) = query.validate()?;
    let min_slot = interval::minutes(query.min_slot_minutes, "min_slot_minutes")?;
    let band = excluded_band(range, query.excluded_hour_start, query.excluded_hour_end, tz)?;

    let mut per_user_free = Vec::with_capacity(query.user_ids.len());
    for user_id in &query.user_ids {
        let events = per_user_events
            .get(user_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        event::validate(events)?;

        let busy: Vec<Interval> = events
            .iter()
            .filter(|event| event.is_timed())
            .filter_map(|event| Interval::from_bounds(event.start, event.end))
            .collect();
        let free = interval::complement(&busy, range, Duration::zero());
        per_user_free.push(interval::subtract(&free, &band));
    }

    let slots: Vec<FreeSlot> = interval::intersect_all(&per_user_free)
        .into_iter()
        .filter(|slot| slot.duration() >= min_slot)
        .map(FreeSlot::from)
        .collect();

    tracing::debug!(
        users = query.user_ids.len(),
        excluded_bands = band.len(),
        slots = slots.len(),
        "computed mutual free slots"
    );
    Ok(slots)
}

/// The excluded hour band for every local calendar day touching `range`,
/// clipped to the range.
///
/// Starts one day early so a band wrapping midnight from the day before the
/// range is still applied. `start_hour == end_hour` means no band.
pub fn excluded_band(range: Interval, start_hour: u32, end_hour: u32, tz: Tz) -> Result<Vec<Interval>> {
    if start_hour == end_hour {
        return Ok(Vec::new());
    }
    let band_start = hour_of_day(start_hour)?;
    let band_end = hour_of_day(end_hour)?;
    let wraps_midnight = start_hour > end_hour;

    let last_day = range.end().with_timezone(&tz).date_naive();
    let mut day = range.start().with_timezone(&tz).date_naive();
    day = day.pred_opt().unwrap_or(day);

    let mut bands = Vec::new();
    while day <= last_day {
        let next = day
            .succ_opt()
            .ok_or_else(|| EngineError::InvalidTime(format!("no day after {}", day)))?;
        let end_day = if wraps_midnight { next } else { day };

        let start = dst::resolve_local(tz, day.and_time(band_start), DstPolicy::ShiftForward)?;
        let end = dst::resolve_local(tz, end_day.and_time(band_end), DstPolicy::ShiftForward)?;
        if let Some(band) = Interval::from_bounds(start, end).and_then(|b| b.intersection(&range)) {
            bands.push(band);
        }
        day = next;
    }
    Ok(bands)
}

fn hour_of_day(hour: u32) -> Result<NaiveTime> {
    NaiveTime::from_hms_opt(hour, 0, 0)
        .ok_or_else(|| EngineError::InvalidQuery(format!("hour {} is outside 0-23", hour)))
}
