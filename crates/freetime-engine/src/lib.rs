//! # freetime-engine
//!
//! Busy/free day timelines and mutual availability across calendars.
//!
//! The engine works entirely on absolute instants (`DateTime<Utc>`). Local
//! wall-clock settings (sleep hours, excluded hour bands) are converted to
//! instants once, at the boundary, by [`dst`] and [`waking`]. `now` is always
//! passed in explicitly, so every computation is deterministic.
//!
//! ## Modules
//!
//! - [`interval`] — Half-open intervals: merge, complement, subtract, N-way intersection
//! - [`event`] — The reduced event record the engine consumes
//! - [`dst`] — Local time → instant conversion across DST transitions
//! - [`waking`] — Sleep schedules and the waking window for a day
//! - [`timeline`] — One user's busy/free blocks for the rest of the day
//! - [`mutual`] — Windows in which every participant is free
//! - [`source`] — Async event/profile collaborator traits
//! - [`coordinator`] — Concurrent fetch with timeouts, cancellation and all-or-nothing failure
//! - [`config`] — Engine defaults, JSON and environment loading
//! - [`error`] — Error types

pub mod config;
pub mod coordinator;
pub mod dst;
pub mod error;
pub mod event;
pub mod interval;
pub mod mutual;
pub mod source;
pub mod timeline;
pub mod waking;

pub type UserId = String;
pub type EventId = String;

pub use config::EngineConfig;
pub use coordinator::AvailabilityCoordinator;
pub use error::EngineError;
pub use event::Event;
pub use interval::{complement, intersect_all, merge_overlapping, subtract, Interval};
pub use mutual::{find_mutual_free_slots, AvailabilityQuery, FreeSlot};
pub use source::{EventSource, InMemoryEventSource, InMemoryProfileSource, ProfileSource, SourceError};
pub use timeline::{build_day_timeline, BlockKind, DayTimeline, TimeBlock};
pub use waking::{SleepSchedule, WakingWindow};
