//! Build one user's busy/free timeline for the rest of their day.
//!
//! The timeline starts at `now` and runs to the end of the user's waking
//! window, or later if an event that has already started (or starts before
//! bedtime) runs past it. Overlapping events collapse into one busy block;
//! the gaps between busy blocks become free blocks unless they are too short
//! to be useful.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::{self, Event};
use crate::interval::{self, Interval};
use crate::waking::WakingWindow;
use crate::EventId;

/// Gaps shorter than this are not shown as free time.
pub const DEFAULT_MIN_GAP_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Busy,
    Free,
}

/// One busy or free stretch of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBlock {
    pub kind: BlockKind,
    pub interval: Interval,
    /// For busy blocks, the earliest-starting event of the merged cluster.
    pub source_event_id: Option<EventId>,
    /// The busy block happening right now.
    pub is_current: bool,
    /// The first busy block that has not started yet.
    pub is_next: bool,
}

impl TimeBlock {
    fn free(interval: Interval) -> Self {
        Self {
            kind: BlockKind::Free,
            interval,
            source_event_id: None,
            is_current: false,
            is_next: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.kind == BlockKind::Busy
    }

    pub fn duration_minutes(&self) -> i64 {
        self.interval.duration_minutes()
    }
}

/// Result of [`build_day_timeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTimeline {
    /// Always `now`.
    pub window_start: DateTime<Utc>,
    /// End of the effective window. When it is not after `window_start` the
    /// day is over and `blocks` is empty.
    pub window_end: DateTime<Utc>,
    /// Busy and free blocks, ascending and non-overlapping.
    pub blocks: Vec<TimeBlock>,
    pub busy_count: usize,
    pub free_minutes: i64,
}

impl DayTimeline {
    pub fn current(&self) -> Option<&TimeBlock> {
        self.blocks.iter().find(|block| block.is_current)
    }

    pub fn next(&self) -> Option<&TimeBlock> {
        self.blocks.iter().find(|block| block.is_next)
    }
}

/// Build the busy/free timeline from `now` to the end of the waking window.
///
/// # Arguments
///
/// * `events` — The user's events. All-day events are ignored; events that
///   have already ended are dropped.
/// * `now` — The reference instant. Never read from a clock internally.
/// * `waking` — The waking window for the day `now` belongs to.
/// * `min_gap_minutes` — Gaps shorter than this are absorbed rather than
///   shown as free blocks (see [`DEFAULT_MIN_GAP_MINUTES`]).
///
/// # Errors
///
/// `InvalidInterval` if any event has `start >= end`; `InvalidQuery` if
/// `min_gap_minutes` is negative or out of range.
pub fn build_day_timeline(
    events: &[Event],
    now: DateTime<Utc>,
    waking: &WakingWindow,
    min_gap_minutes: i64,
) -> Result<DayTimeline> {
    event::validate(events)?;
    let min_gap = interval::minutes(min_gap_minutes, "min_gap_minutes")?;

    let pending: Vec<&Event> = events
        .iter()
        .filter(|event| event.is_timed() && event.end > now)
        .collect();

    // A meeting that starts before bedtime but runs late stretches the window.
    let window_end = pending
        .iter()
        .filter(|event| event.start < waking.end())
        .map(|event| event.end)
        .fold(waking.end(), |latest, end| latest.max(end));

    let Some(window) = Interval::from_bounds(now, window_end) else {
        return Ok(DayTimeline {
            window_start: now,
            window_end,
            blocks: Vec::new(),
            busy_count: 0,
            free_minutes: 0,
        });
    };

    let tagged: Vec<(Interval, &EventId)> = pending
        .iter()
        .filter_map(|event| Interval::from_bounds(event.start, event.end).map(|iv| (iv, &event.id)))
        .filter(|(interval, _)| interval.overlaps(&window))
        .collect();

    let mut blocks = Vec::new();
    let mut cursor = now;
    let mut next_marked = false;

    for (cluster, event_id) in interval::merge_tagged(tagged) {
        let Some(busy) = cluster.intersection(&window) else {
            continue;
        };
        push_free(&mut blocks, cursor, busy.start(), min_gap);

        let is_next = !next_marked && cluster.start() > now;
        next_marked |= is_next;
        blocks.push(TimeBlock {
            kind: BlockKind::Busy,
            interval: busy,
            source_event_id: Some(event_id.clone()),
            is_current: busy.contains(now),
            is_next,
        });
        cursor = busy.end();
    }
    push_free(&mut blocks, cursor, window.end(), min_gap);

    let busy_count = blocks.iter().filter(|block| block.is_busy()).count();
    let free_minutes = blocks
        .iter()
        .filter(|block| !block.is_busy())
        .map(|block| block.interval.duration())
        .fold(Duration::zero(), |total, d| total + d)
        .num_minutes();

    tracing::debug!(
        events = events.len(),
        blocks = blocks.len(),
        busy_count,
        free_minutes,
        "built day timeline"
    );

    Ok(DayTimeline {
        window_start: now,
        window_end,
        blocks,
        busy_count,
        free_minutes,
    })
}

fn push_free(blocks: &mut Vec<TimeBlock>, start: DateTime<Utc>, end: DateTime<Utc>, min_gap: Duration) {
    if let Some(gap) = Interval::from_bounds(start, end) {
        if gap.duration() >= min_gap {
            blocks.push(TimeBlock::free(gap));
        }
    }
}
