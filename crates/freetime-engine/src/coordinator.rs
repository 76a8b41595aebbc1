//! Fetch participants' calendars and run the availability computations.
//!
//! The coordinator is the only part of the engine that performs I/O. It
//! fetches one calendar per participant, concurrently and each under its own
//! timeout, buffers every result by user id, and only then hands the data to
//! the pure computations in [`crate::mutual`] and [`crate::timeline`].
//!
//! Mutual availability is only meaningful when every participant's calendar
//! is known, so a single failed or timed-out fetch fails the whole query with
//! `PartialDataUnavailable`. Dropping the returned future, cancelling the
//! token, or hitting the optional query deadline abandons every in-flight
//! fetch.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::event::Event;
use crate::interval::Interval;
use crate::mutual::{self, AvailabilityQuery, FreeSlot};
use crate::source::{EventSource, ProfileSource, SourceError};
use crate::timeline::{self, DayTimeline};
use crate::waking::WakingWindow;
use crate::UserId;

pub struct AvailabilityCoordinator {
    events: Arc<dyn EventSource>,
    profiles: Option<Arc<dyn ProfileSource>>,
    config: EngineConfig,
}

impl AvailabilityCoordinator {
    pub fn new(events: Arc<dyn EventSource>, config: EngineConfig) -> Self {
        Self {
            events,
            profiles: None,
            config,
        }
    }

    /// Use `profiles` for sleep schedules. Without one, every user has a
    /// full-day waking window.
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileSource>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch every participant's events for the query range and find the
    /// windows in which all of them are free.
    ///
    /// # Errors
    ///
    /// Query validation errors are returned before any fetch starts.
    /// `PartialDataUnavailable` names the participant whose fetch failed or
    /// timed out first; `Cancelled` and `Timeout` report cancellation and the
    /// overall query deadline.
    #[tracing::instrument(skip_all, fields(users = query.user_ids.len()))]
    pub async fn find_mutual_free_slots(
        &self,
        query: &AvailabilityQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<FreeSlot>> {
        let (range, _) = query.validate()?;
        tracing::info!(
            range_start = %query.range_start,
            range_end = %query.range_end,
            "finding mutual free slots"
        );

        let calendars = self
            .guarded(cancel, self.fetch_all(&query.user_ids, range))
            .await?;
        let slots = mutual::find_mutual_free_slots(query, &calendars)?;

        tracing::info!(slots = slots.len(), "found mutual free slots");
        Ok(slots)
    }

    /// Fetch one user's sleep schedule and events, then build their timeline
    /// for the waking window `now` belongs to.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn day_timeline(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<DayTimeline> {
        let tz = self.config.tz()?;
        let work = async {
            let schedule = match &self.profiles {
                Some(profiles) => self
                    .with_fetch_timeout(profiles.sleep_schedule(user_id))
                    .await
                    .map_err(|cause| unavailable(user_id, &cause))?,
                None => None,
            };
            let waking =
                WakingWindow::containing(now, schedule.as_ref(), tz, self.config.dst_policy)?;

            // Wide enough to include events still running at `now`.
            let fetch_start = waking.start().min(now);
            let fetch_end = waking.end().max(now);
            let events = self
                .with_fetch_timeout(self.events.get_events(user_id, fetch_start, fetch_end))
                .await
                .map_err(|cause| unavailable(user_id, &cause))?;

            timeline::build_day_timeline(&events, now, &waking, self.config.min_gap_minutes)
        };
        self.guarded(cancel, work).await
    }

    /// Run `work` under the cancellation token and the optional query deadline.
    async fn guarded<T, F>(&self, cancel: &CancellationToken, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let bounded = async {
            match self.config.query_timeout() {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or(Err(EngineError::Timeout)),
                None => work.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("query cancelled");
                Err(EngineError::Cancelled)
            }
            result = bounded => result,
        }
    }

    /// Fetch all calendars, at most `max_concurrent_fetches` at a time.
    /// Returns at the first failure, dropping the fetches still in flight.
    async fn fetch_all(
        &self,
        user_ids: &BTreeSet<UserId>,
        range: Interval,
    ) -> Result<BTreeMap<UserId, Vec<Event>>> {
        let mut fetches = stream::iter(user_ids.iter().cloned())
            .map(|user_id| self.fetch_one(user_id, range))
            .buffer_unordered(self.config.max_concurrent_fetches);

        let mut calendars = BTreeMap::new();
        while let Some((user_id, outcome)) = fetches.next().await {
            match outcome {
                Ok(events) => {
                    tracing::debug!(user_id = %user_id, events = events.len(), "fetched calendar");
                    calendars.insert(user_id, events);
                }
                Err(cause) => return Err(unavailable(&user_id, &cause)),
            }
        }
        Ok(calendars)
    }

    async fn fetch_one(
        &self,
        user_id: UserId,
        range: Interval,
    ) -> (UserId, std::result::Result<Vec<Event>, SourceError>) {
        let outcome = self
            .with_fetch_timeout(self.events.get_events(&user_id, range.start(), range.end()))
            .await;
        (user_id, outcome)
    }

    async fn with_fetch_timeout<T, F>(&self, fetch: F) -> std::result::Result<T, SourceError>
    where
        F: Future<Output = std::result::Result<T, SourceError>>,
    {
        tokio::time::timeout(self.config.fetch_timeout(), fetch)
            .await
            .unwrap_or(Err(SourceError::Timeout))
    }
}

fn unavailable(user_id: &str, cause: &SourceError) -> EngineError {
    tracing::warn!(user_id = %user_id, error = %cause, "calendar data unavailable");
    EngineError::PartialDataUnavailable {
        failed_user_ids: vec![user_id.to_string()],
    }
}
