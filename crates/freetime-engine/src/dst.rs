//! Local wall-clock → instant conversion with explicit DST policies.
//!
//! Sleep settings and excluded hour bands are configured as local times. They
//! are converted to UTC instants exactly once, here; everything downstream
//! works on instants.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Policy for local times that fall into a spring-forward gap.
///
/// Times repeated by a fall-back transition always resolve to their earliest
/// occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Keep the UTC offset in force before the gap, which moves the result
    /// forward by the gap length (02:30 in a 02:00-03:00 gap becomes 03:30).
    #[default]
    ShiftForward,
    /// Refuse to resolve, returning `InvalidTime`.
    Reject,
}

/// Longest lookback used to find the offset in force before a gap.
const GAP_LOOKBACK_HOURS: i64 = 3;

/// Parse an IANA timezone name (e.g. "Europe/London").
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| EngineError::InvalidTime(format!("unknown timezone '{}'", name)))
}

/// Resolve a local wall-clock time in `tz` to a UTC instant.
pub fn resolve_local(tz: Tz, local: NaiveDateTime, policy: DstPolicy) -> Result<DateTime<Utc>> {
    if let Some(resolved) = tz.from_local_datetime(&local).earliest() {
        return Ok(resolved.with_timezone(&Utc));
    }

    match policy {
        DstPolicy::Reject => Err(EngineError::InvalidTime(format!(
            "{} does not exist in {} (DST gap)",
            local, tz
        ))),
        DstPolicy::ShiftForward => {
            let lookback = Duration::hours(GAP_LOOKBACK_HOURS);
            tz.from_local_datetime(&(local - lookback))
                .earliest()
                .map(|before| before.with_timezone(&Utc) + lookback)
                .ok_or_else(|| {
                    EngineError::InvalidTime(format!("cannot resolve {} in {}", local, tz))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn ordinary_time_resolves_directly() {
        let tz = parse_timezone("America/New_York").unwrap();
        let utc = resolve_local(tz, local(2026, 1, 15, 9, 0), DstPolicy::ShiftForward).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn gap_time_shifts_forward_by_gap_length() {
        // 2026-03-08 02:30 does not exist in New York (clocks jump 02:00 -> 03:00).
        let tz = parse_timezone("America/New_York").unwrap();
        let utc = resolve_local(tz, local(2026, 3, 8, 2, 30), DstPolicy::ShiftForward).unwrap();
        // 03:30 EDT == 07:30 UTC
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 3, 8, 7, 30, 0).unwrap());
    }

    #[test]
    fn gap_time_rejected_under_reject_policy() {
        let tz = parse_timezone("America/New_York").unwrap();
        let err = resolve_local(tz, local(2026, 3, 8, 2, 30), DstPolicy::Reject).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTime(_)));
    }

    #[test]
    fn repeated_time_resolves_to_earliest() {
        // 2026-11-01 01:30 happens twice in New York; the EDT occurrence comes first.
        let tz = parse_timezone("America/New_York").unwrap();
        let utc = resolve_local(tz, local(2026, 11, 1, 1, 30), DstPolicy::ShiftForward).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2026, 11, 1, 5, 30, 0).unwrap());
    }

    #[test]
    fn unknown_timezone_rejected() {
        assert!(parse_timezone("Mars/Olympus_Mons").is_err());
    }
}
