//! Half-open time intervals and the set operations the engine is built on.
//!
//! Every [`Interval`] is `[start, end)` with `start < end`; the constructor
//! rejects anything else. Interval sets are plain `Vec<Interval>`. Operations
//! that need sorted, non-overlapping input normalise it themselves through
//! [`merge_overlapping`], so callers may pass sets in any order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// A half-open time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawInterval> for Interval {
    type Error = EngineError;

    fn try_from(raw: RawInterval) -> Result<Self> {
        Interval::new(raw.start, raw.end)
    }
}

impl Interval {
    /// Build an interval, rejecting zero-length and backwards ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        Self::from_bounds(start, end).ok_or(EngineError::InvalidInterval { start, end })
    }

    /// Like [`Interval::new`], but an empty range is `None` rather than an error.
    /// Used internally wherever a computed gap may legitimately be empty.
    pub(crate) fn from_bounds(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whole minutes, truncated.
    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Touching intervals (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        Self::from_bounds(self.start.max(other.start), self.end.min(other.end))
    }
}

/// Convert a caller-supplied minute count into a duration, rejecting
/// negative and out-of-range values with `InvalidQuery`.
pub(crate) fn minutes(value: i64, name: &str) -> Result<Duration> {
    if value < 0 {
        return Err(EngineError::InvalidQuery(format!(
            "{} must not be negative, got {}",
            name, value
        )));
    }
    Duration::try_minutes(value)
        .ok_or_else(|| EngineError::InvalidQuery(format!("{} of {} minutes is out of range", name, value)))
}

/// Merge touching or overlapping intervals into a minimal ascending set.
pub fn merge_overlapping(intervals: &[Interval]) -> Vec<Interval> {
    let tagged = intervals.iter().map(|interval| (*interval, ())).collect();
    merge_tagged(tagged)
        .into_iter()
        .map(|(interval, ())| interval)
        .collect()
}

/// Merge touching or overlapping intervals, carrying a tag per cluster.
///
/// Each output cluster keeps the tag of its earliest-starting member; members
/// with equal starts keep their input order.
pub fn merge_tagged<T>(mut items: Vec<(Interval, T)>) -> Vec<(Interval, T)> {
    // Stable sort: equal starts stay in input order.
    items.sort_by_key(|(interval, _)| interval.start);

    let mut merged: Vec<(Interval, T)> = Vec::with_capacity(items.len());
    for (interval, tag) in items {
        if let Some((last, _)) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                continue;
            }
        }
        merged.push((interval, tag));
    }
    merged
}

/// Free gaps inside `bound` that no busy interval covers.
///
/// Busy intervals are clipped to the bound and merged first. Gaps shorter
/// than `min_gap` are treated as busy and left out of the result.
pub fn complement(busy: &[Interval], bound: Interval, min_gap: Duration) -> Vec<Interval> {
    let clipped: Vec<Interval> = busy
        .iter()
        .filter_map(|interval| interval.intersection(&bound))
        .collect();

    let mut free = Vec::new();
    let mut cursor = bound.start;
    for busy in merge_overlapping(&clipped) {
        push_gap(&mut free, cursor, busy.start, min_gap);
        cursor = cursor.max(busy.end);
    }
    push_gap(&mut free, cursor, bound.end, min_gap);
    free
}

fn push_gap(out: &mut Vec<Interval>, start: DateTime<Utc>, end: DateTime<Utc>, min_gap: Duration) {
    if let Some(gap) = Interval::from_bounds(start, end) {
        if gap.duration() >= min_gap {
            out.push(gap);
        }
    }
}

/// Remove every moment covered by `remove` from `from`.
pub fn subtract(from: &[Interval], remove: &[Interval]) -> Vec<Interval> {
    let remove = merge_overlapping(remove);
    let mut kept = Vec::new();

    for piece in merge_overlapping(from) {
        let mut cursor = piece.start;
        for cut in remove.iter().filter(|cut| cut.overlaps(&piece)) {
            kept.extend(Interval::from_bounds(cursor, cut.start));
            cursor = cursor.max(cut.end);
        }
        kept.extend(Interval::from_bounds(cursor, piece.end));
    }
    kept
}

/// Boundary kind for the intersection sweep. `End` orders before `Start` so
/// that at a shared instant an interval closes before the next one opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Edge {
    End,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Boundary {
    at: DateTime<Utc>,
    edge: Edge,
}

/// Moments contained in every one of the input sets.
///
/// Sweeps the sorted start/end boundaries of all sets with a running count of
/// sets currently "inside"; output is emitted while the count equals the
/// number of sets. Each input set is merged first so overlapping intervals
/// within one set never count twice. O(N log N) in the total interval count.
///
/// An empty list of sets yields an empty result.
pub fn intersect_all(sets: &[Vec<Interval>]) -> Vec<Interval> {
    if sets.is_empty() {
        return Vec::new();
    }
    let needed = sets.len();

    let mut boundaries: Vec<Boundary> = sets
        .iter()
        .flat_map(|set| merge_overlapping(set))
        .flat_map(|interval| {
            [
                Boundary {
                    at: interval.start,
                    edge: Edge::Start,
                },
                Boundary {
                    at: interval.end,
                    edge: Edge::End,
                },
            ]
        })
        .collect();
    boundaries.sort_unstable();

    let mut common: Vec<Interval> = Vec::new();
    let mut inside = 0usize;
    let mut open: Option<DateTime<Utc>> = None;

    for boundary in boundaries {
        match boundary.edge {
            Edge::Start => {
                inside += 1;
                if inside == needed {
                    open = Some(boundary.at);
                }
            }
            Edge::End => {
                if let Some(start) = open.take() {
                    push_coalesced(&mut common, start, boundary.at);
                }
                inside -= 1;
            }
        }
    }
    common
}

/// Push `[start, end)`, extending the previous interval when they touch.
fn push_coalesced(out: &mut Vec<Interval>, start: DateTime<Utc>, end: DateTime<Utc>) {
    let Some(interval) = Interval::from_bounds(start, end) else {
        return;
    };
    if let Some(last) = out.last_mut() {
        if last.end == interval.start {
            last.end = interval.end;
            return;
        }
    }
    out.push(interval);
}
