//! WASM bindings for freetime-engine.
//!
//! Exposes the day timeline builder, waking window derivation and mutual free
//! slot search to JavaScript via `wasm-bindgen`. All complex types cross the
//! boundary as JSON strings.
//!
//! ## Build process
//!
//! ```sh
//! cargo build -p freetime-engine-wasm --target wasm32-unknown-unknown --release
//! wasm-bindgen --target nodejs --out-dir packages/freetime-js/wasm/ \
//!   target/wasm32-unknown-unknown/release/freetime_engine_wasm.wasm
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use freetime_engine::dst::{self, DstPolicy};
use freetime_engine::{AvailabilityQuery, Event, SleepSchedule, UserId, WakingWindow};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

// ---------------------------------------------------------------------------
// Serde-friendly DTOs for crossing the WASM boundary as JSON
// ---------------------------------------------------------------------------

/// Input format for events passed from JavaScript.
#[derive(Deserialize)]
struct EventInput {
    id: String,
    start: String,
    end: String,
    #[serde(default, alias = "isAllDay")]
    is_all_day: bool,
}

#[derive(Serialize)]
struct WindowDto {
    start: String,
    end: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an ISO 8601 datetime string into `DateTime<Utc>`.
///
/// Accepts RFC 3339 (e.g. "2026-03-16T14:00:00+01:00") and naive datetimes
/// (e.g. "2026-03-16T14:00:00"), which are taken as UTC.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| format!("Invalid datetime '{}': {}", s, e))
}

fn parse_events(inputs: Vec<EventInput>) -> Result<Vec<Event>, String> {
    inputs
        .into_iter()
        .map(|input| {
            Ok(Event {
                id: input.id,
                start: parse_datetime(&input.start)?,
                end: parse_datetime(&input.end)?,
                is_all_day: input.is_all_day,
            })
        })
        .collect()
}

fn parse_events_json(json: &str) -> Result<Vec<Event>, String> {
    let inputs: Vec<EventInput> =
        serde_json::from_str(json).map_err(|e| format!("Invalid events JSON: {}", e))?;
    parse_events(inputs)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("Serialization error: {}", e))
}

fn build_day_timeline_json(
    events_json: &str,
    now: &str,
    waking_start: &str,
    waking_end: &str,
    min_gap_minutes: Option<u32>,
) -> Result<String, String> {
    let events = parse_events_json(events_json)?;
    let now = parse_datetime(now)?;
    let waking = WakingWindow::new(parse_datetime(waking_start)?, parse_datetime(waking_end)?)
        .map_err(|e| e.to_string())?;
    let min_gap = min_gap_minutes
        .map(i64::from)
        .unwrap_or(freetime_engine::timeline::DEFAULT_MIN_GAP_MINUTES);

    let timeline = freetime_engine::build_day_timeline(&events, now, &waking, min_gap)
        .map_err(|e| e.to_string())?;
    to_json(&timeline)
}

fn waking_window_json(
    now: &str,
    sleep_start: Option<String>,
    sleep_end: Option<String>,
    timezone: &str,
) -> Result<String, String> {
    let now = parse_datetime(now)?;
    let tz = dst::parse_timezone(timezone).map_err(|e| e.to_string())?;
    let schedule = SleepSchedule::from_profile(sleep_start.as_deref(), sleep_end.as_deref())
        .map_err(|e| e.to_string())?;
    let window = WakingWindow::containing(now, schedule.as_ref(), tz, DstPolicy::ShiftForward)
        .map_err(|e| e.to_string())?;
    to_json(&WindowDto {
        start: window.start().to_rfc3339(),
        end: window.end().to_rfc3339(),
    })
}

fn find_mutual_free_slots_json(query_json: &str, calendars_json: &str) -> Result<String, String> {
    let query: AvailabilityQuery =
        serde_json::from_str(query_json).map_err(|e| format!("Invalid query JSON: {}", e))?;
    let raw: BTreeMap<UserId, Vec<EventInput>> = serde_json::from_str(calendars_json)
        .map_err(|e| format!("Invalid calendars JSON: {}", e))?;

    let calendars = raw
        .into_iter()
        .map(|(user_id, inputs)| Ok((user_id, parse_events(inputs)?)))
        .collect::<Result<BTreeMap<_, _>, String>>()?;

    let slots = freetime_engine::find_mutual_free_slots(&query, &calendars)
        .map_err(|e| e.to_string())?;
    to_json(&slots)
}

// ---------------------------------------------------------------------------
// WASM exports
// ---------------------------------------------------------------------------

/// Build the busy/free timeline from `now` to the end of the waking window.
///
/// `events_json` is a JSON array of `{id, start, end, is_all_day?}` objects.
/// Returns the timeline as JSON: `{window_start, window_end, blocks,
/// busy_count, free_minutes}`.
///
/// # Arguments
/// - `now` -- The reference instant (ISO 8601)
/// - `waking_start` / `waking_end` -- The user's waking window for the day
/// - `min_gap_minutes` -- Gaps shorter than this are not shown (default 5)
#[wasm_bindgen(js_name = "buildDayTimeline")]
pub fn build_day_timeline(
    events_json: &str,
    now: &str,
    waking_start: &str,
    waking_end: &str,
    min_gap_minutes: Option<u32>,
) -> Result<String, JsValue> {
    build_day_timeline_json(events_json, now, waking_start, waking_end, min_gap_minutes)
        .map_err(|e| JsValue::from_str(&e))
}

/// Derive the waking window containing `now` from `HH:MM` sleep settings.
///
/// Missing settings give the whole local day. Returns `{start, end}` as
/// RFC 3339 strings, ready to pass to `buildDayTimeline`.
#[wasm_bindgen(js_name = "wakingWindow")]
pub fn waking_window(
    now: &str,
    sleep_start: Option<String>,
    sleep_end: Option<String>,
    timezone: &str,
) -> Result<String, JsValue> {
    waking_window_json(now, sleep_start, sleep_end, timezone).map_err(|e| JsValue::from_str(&e))
}

/// Find the windows in which every queried user is free.
///
/// `query_json` is an `AvailabilityQuery` object; `calendars_json` maps each
/// user id to a JSON array of events. Returns a JSON array of
/// `{start, end, duration_minutes}` objects.
#[wasm_bindgen(js_name = "findMutualFreeSlots")]
pub fn find_mutual_free_slots(query_json: &str, calendars_json: &str) -> Result<String, JsValue> {
    find_mutual_free_slots_json(query_json, calendars_json).map_err(|e| JsValue::from_str(&e))
}
