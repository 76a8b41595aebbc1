//! Collaborator interfaces the coordinator fetches from.
//!
//! Event storage, provider sync and recurrence expansion all live behind
//! [`EventSource`]; sleep settings live behind [`ProfileSource`]. The
//! in-memory implementations back the CLI and the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::Event;
use crate::waking::SleepSchedule;
use crate::UserId;

/// Failure reported by a collaborator for one user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// Supplies a user's materialized events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events overlapping `[range_start, range_end)` for one user.
    async fn get_events(
        &self,
        user_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Event>, SourceError>;
}

/// Supplies a user's sleep settings.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// `Ok(None)` when the user has not configured sleep hours.
    async fn sleep_schedule(&self, user_id: &str) -> Result<Option<SleepSchedule>, SourceError>;
}

/// Map-backed [`EventSource`]. Unknown users are `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSource {
    calendars: HashMap<UserId, Vec<Event>>,
}

impl InMemoryEventSource {
    pub fn new(calendars: HashMap<UserId, Vec<Event>>) -> Self {
        Self { calendars }
    }

    pub fn insert(&mut self, user_id: impl Into<UserId>, events: Vec<Event>) {
        self.calendars.insert(user_id.into(), events);
    }
}

impl FromIterator<(UserId, Vec<Event>)> for InMemoryEventSource {
    fn from_iter<I: IntoIterator<Item = (UserId, Vec<Event>)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn get_events(
        &self,
        user_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Event>, SourceError> {
        let events = self.calendars.get(user_id).ok_or(SourceError::NotFound)?;
        Ok(events
            .iter()
            .filter(|event| overlaps_range(event, range_start, range_end))
            .cloned()
            .collect())
    }
}

/// Timed events overlap the range; all-day events count when they start
/// inside it.
fn overlaps_range(event: &Event, range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> bool {
    if event.is_all_day {
        event.start >= range_start && event.start < range_end
    } else {
        event.start < range_end && event.end > range_start
    }
}

/// Map-backed [`ProfileSource`]. Unknown users have no schedule.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileSource {
    schedules: HashMap<UserId, SleepSchedule>,
}

impl InMemoryProfileSource {
    pub fn insert(&mut self, user_id: impl Into<UserId>, schedule: SleepSchedule) {
        self.schedules.insert(user_id.into(), schedule);
    }
}

#[async_trait]
impl ProfileSource for InMemoryProfileSource {
    async fn sleep_schedule(&self, user_id: &str) -> Result<Option<SleepSchedule>, SourceError> {
        Ok(self.schedules.get(user_id).copied())
    }
}
