//! The reduced calendar event the engine consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::interval::Interval;
use crate::EventId;

/// A single, already-materialized event occurrence.
///
/// Recurring series must be expanded by the caller; the engine only ever sees
/// concrete occurrences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// All-day events do not occupy timed slots and are ignored by the
    /// timeline and availability computations.
    #[serde(default)]
    pub is_all_day: bool,
}

impl Event {
    pub fn new(id: impl Into<EventId>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            is_all_day: false,
        }
    }

    pub fn all_day(id: impl Into<EventId>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            is_all_day: true,
            ..Self::new(id, start, end)
        }
    }

    /// The event's time span, or `InvalidInterval` if `start >= end`.
    pub fn interval(&self) -> Result<Interval> {
        Interval::new(self.start, self.end)
    }

    pub fn is_timed(&self) -> bool {
        !self.is_all_day
    }
}

/// Reject the whole batch if any event is malformed.
pub(crate) fn validate(events: &[Event]) -> Result<()> {
    events.iter().try_for_each(|event| event.interval().map(|_| ()))
}
