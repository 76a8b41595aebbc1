//! Tests for the fetch coordinator: concurrency, timeouts, cancellation and
//! all-or-nothing failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use freetime_engine::{
    AvailabilityCoordinator, AvailabilityQuery, BlockKind, EngineConfig, EngineError, Event,
    EventSource, InMemoryEventSource, InMemoryProfileSource, ProfileSource, SleepSchedule,
    SourceError,
};
use tokio_util::sync::CancellationToken;

// ── Helpers ─────────────────────────────────────────────────────────────────

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 16, hour, min, 0).unwrap()
}

fn office() -> InMemoryEventSource {
    let mut source = InMemoryEventSource::default();
    source.insert("alice", vec![Event::new("a1", at(10, 0), at(11, 0))]);
    source.insert("bob", vec![Event::new("b1", at(10, 30), at(11, 30))]);
    source.insert("carol", Vec::new());
    source
}

/// Wraps an in-memory source with per-user delays and records concurrency.
#[derive(Default)]
struct SlowSource {
    inner: InMemoryEventSource,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowSource {
    fn new(inner: InMemoryEventSource) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    fn delay(mut self, user_id: &str, millis: u64) -> Self {
        self.delays
            .insert(user_id.to_string(), Duration::from_millis(millis));
        self
    }
}

#[async_trait]
impl EventSource for SlowSource {
    async fn get_events(
        &self,
        user_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
    ) -> Result<Vec<Event>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(user_id) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.inner.get_events(user_id, range_start, range_end).await
    }
}

struct BrokenProfiles;

#[async_trait]
impl ProfileSource for BrokenProfiles {
    async fn sleep_schedule(&self, _user_id: &str) -> Result<Option<SleepSchedule>, SourceError> {
        Err(SourceError::Unauthorized)
    }
}

fn morning_query<'a>(users: impl IntoIterator<Item = &'a str>) -> AvailabilityQuery {
    AvailabilityQuery::new(users, at(9, 0), at(12, 0))
}

// ── Mutual availability ─────────────────────────────────────────────────────

#[tokio::test]
async fn finds_slots_across_fetched_calendars() {
    let coordinator = AvailabilityCoordinator::new(Arc::new(office()), EngineConfig::default());
    let slots = coordinator
        .find_mutual_free_slots(&morning_query(["alice", "bob", "carol"]), &CancellationToken::new())
        .await
        .unwrap();

    let spans: Vec<_> = slots.iter().map(|s| (s.start, s.end)).collect();
    assert_eq!(spans, vec![(at(9, 0), at(10, 0)), (at(11, 30), at(12, 0))]);
}

#[tokio::test(start_paused = true)]
async fn completion_order_does_not_change_result() {
    let fast_alice = SlowSource::new(office()).delay("bob", 500);
    let fast_bob = SlowSource::new(office()).delay("alice", 500);
    let query = morning_query(["alice", "bob"]);

    let first = AvailabilityCoordinator::new(Arc::new(fast_alice), EngineConfig::default())
        .find_mutual_free_slots(&query, &CancellationToken::new())
        .await
        .unwrap();
    let second = AvailabilityCoordinator::new(Arc::new(fast_bob), EngineConfig::default())
        .find_mutual_free_slots(&query, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn empty_participant_set_fetches_nothing() {
    let source = Arc::new(SlowSource::new(office()));
    let coordinator = AvailabilityCoordinator::new(source.clone(), EngineConfig::default());

    let slots = coordinator
        .find_mutual_free_slots(&morning_query(Vec::new()), &CancellationToken::new())
        .await
        .unwrap();
    assert!(slots.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_query_rejected_before_fetching() {
    let source = Arc::new(SlowSource::new(office()));
    let coordinator = AvailabilityCoordinator::new(source.clone(), EngineConfig::default());
    let query = AvailabilityQuery::new(["alice"], at(12, 0), at(9, 0));

    let err = coordinator
        .find_mutual_free_slots(&query, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRange { .. }));
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded() {
    let users: Vec<String> = (0..6).map(|i| format!("user{}", i)).collect();
    let mut calendars = InMemoryEventSource::default();
    for user in &users {
        calendars.insert(user.as_str(), Vec::new());
    }
    let source = users
        .iter()
        .fold(SlowSource::new(calendars), |source, user| source.delay(user, 100));
    let source = Arc::new(source);
    let config = EngineConfig {
        max_concurrent_fetches: 2,
        ..EngineConfig::default()
    };
    let coordinator = AvailabilityCoordinator::new(source.clone(), config);

    let query = morning_query(users.iter().map(String::as_str));
    coordinator
        .find_mutual_free_slots(&query, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 6);
    assert!(source.peak.load(Ordering::SeqCst) <= 2);
}

// ── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_calendar_fails_whole_query() {
    let coordinator = AvailabilityCoordinator::new(Arc::new(office()), EngineConfig::default());
    let err = coordinator
        .find_mutual_free_slots(&morning_query(["alice", "dave"]), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::PartialDataUnavailable {
            failed_user_ids: vec!["dave".to_string()],
        }
    );
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_as_unavailable() {
    let source = SlowSource::new(office()).delay("bob", 5_000);
    let config = EngineConfig {
        fetch_timeout_ms: 1_000,
        ..EngineConfig::default()
    };
    let coordinator = AvailabilityCoordinator::new(Arc::new(source), config);

    let err = coordinator
        .find_mutual_free_slots(&morning_query(["alice", "bob"]), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::PartialDataUnavailable {
            failed_user_ids: vec!["bob".to_string()],
        }
    );
}

#[tokio::test(start_paused = true)]
async fn query_deadline_reports_timeout() {
    let source = SlowSource::new(office()).delay("alice", 5_000);
    let config = EngineConfig {
        fetch_timeout_ms: 10_000,
        query_timeout_ms: Some(1_000),
        ..EngineConfig::default()
    };
    let coordinator = AvailabilityCoordinator::new(Arc::new(source), config);

    let err = coordinator
        .find_mutual_free_slots(&morning_query(["alice", "bob"]), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Timeout);
}

// ── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_token_short_circuits() {
    let coordinator = AvailabilityCoordinator::new(Arc::new(office()), EngineConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = coordinator
        .find_mutual_free_slots(&morning_query(["alice", "bob"]), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancellation_abandons_in_flight_fetches() {
    let source = SlowSource::new(office()).delay("alice", 2_000).delay("bob", 2_000);
    let coordinator = AvailabilityCoordinator::new(Arc::new(source), EngineConfig::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = coordinator
        .find_mutual_free_slots(&morning_query(["alice", "bob"]), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Cancelled);
}

// ── Day timeline ────────────────────────────────────────────────────────────

#[tokio::test]
async fn day_timeline_uses_profile_schedule() {
    let mut profiles = InMemoryProfileSource::default();
    profiles.insert("alice", SleepSchedule::parse("23:00", "07:00").unwrap());
    let coordinator = AvailabilityCoordinator::new(Arc::new(office()), EngineConfig::default())
        .with_profiles(Arc::new(profiles));

    let timeline = coordinator
        .day_timeline("alice", at(9, 0), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(timeline.window_start, at(9, 0));
    assert_eq!(timeline.window_end, at(23, 0));
    let kinds: Vec<BlockKind> = timeline.blocks.iter().map(|b| b.kind).collect();
    assert_eq!(kinds, vec![BlockKind::Free, BlockKind::Busy, BlockKind::Free]);
    assert_eq!(timeline.busy_count, 1);
    assert!(timeline.blocks[1].is_next);
}

#[tokio::test]
async fn day_timeline_without_profiles_runs_to_midnight() {
    let coordinator = AvailabilityCoordinator::new(Arc::new(office()), EngineConfig::default());

    let timeline = coordinator
        .day_timeline("bob", at(9, 0), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        timeline.window_end,
        Utc.with_ymd_and_hms(2026, 3, 17, 0, 0, 0).unwrap()
    );
    assert_eq!(
        timeline.next().and_then(|b| b.source_event_id.as_deref()),
        Some("b1")
    );
}

#[tokio::test]
async fn day_timeline_profile_failure_is_unavailable() {
    let coordinator = AvailabilityCoordinator::new(Arc::new(office()), EngineConfig::default())
        .with_profiles(Arc::new(BrokenProfiles));

    let err = coordinator
        .day_timeline("alice", at(9, 0), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::PartialDataUnavailable {
            failed_user_ids: vec!["alice".to_string()],
        }
    );
}
