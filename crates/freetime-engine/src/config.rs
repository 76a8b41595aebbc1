//! Engine configuration.
//!
//! Defaults match the product behaviour: 5-minute minimum gap on the day
//! timeline, 30-minute minimum meeting slot, midnight-06:00 excluded. Values
//! can come from a JSON document and be overridden by `FREETIME_*`
//! environment variables.

use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::{self, DstPolicy};
use crate::error::{EngineError, Result};
use crate::mutual::DEFAULT_MIN_SLOT_MINUTES;
use crate::timeline::DEFAULT_MIN_GAP_MINUTES;

pub const ENV_MIN_GAP_MINUTES: &str = "FREETIME_MIN_GAP_MINUTES";
pub const ENV_MIN_SLOT_MINUTES: &str = "FREETIME_MIN_SLOT_MINUTES";
pub const ENV_EXCLUDED_HOURS: &str = "FREETIME_EXCLUDED_HOURS";
pub const ENV_TIMEZONE: &str = "FREETIME_TIMEZONE";
pub const ENV_FETCH_TIMEOUT_MS: &str = "FREETIME_FETCH_TIMEOUT_MS";
pub const ENV_QUERY_TIMEOUT_MS: &str = "FREETIME_QUERY_TIMEOUT_MS";
pub const ENV_MAX_CONCURRENT_FETCHES: &str = "FREETIME_MAX_CONCURRENT_FETCHES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timeline gaps shorter than this are not shown as free.
    pub min_gap_minutes: i64,
    /// Default minimum length of a mutual free slot.
    pub min_slot_minutes: i64,
    /// Default daily excluded band `[start, end)` in whole hours.
    pub excluded_hours: (u32, u32),
    /// Zone used for waking windows and excluded bands.
    pub timezone: String,
    pub dst_policy: DstPolicy,
    /// Per-user fetch timeout.
    pub fetch_timeout_ms: u64,
    /// Overall deadline for a coordinated query; `None` means no deadline
    /// beyond the per-fetch timeouts.
    pub query_timeout_ms: Option<u64>,
    /// Upper bound on concurrent per-user fetches.
    pub max_concurrent_fetches: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_gap_minutes: DEFAULT_MIN_GAP_MINUTES,
            min_slot_minutes: DEFAULT_MIN_SLOT_MINUTES,
            excluded_hours: (0, 6),
            timezone: "UTC".to_string(),
            dst_policy: DstPolicy::default(),
            fetch_timeout_ms: 10_000,
            query_timeout_ms: None,
            max_concurrent_fetches: 16,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value lookup (the environment in
    /// production, a map in tests).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MIN_GAP_MINUTES) {
            self.min_gap_minutes = parse_var(ENV_MIN_GAP_MINUTES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MIN_SLOT_MINUTES) {
            self.min_slot_minutes = parse_var(ENV_MIN_SLOT_MINUTES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_EXCLUDED_HOURS) {
            self.excluded_hours = parse_hour_band(&raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMEZONE) {
            self.timezone = raw;
        }
        if let Some(raw) = lookup(ENV_FETCH_TIMEOUT_MS) {
            self.fetch_timeout_ms = parse_var(ENV_FETCH_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_QUERY_TIMEOUT_MS) {
            self.query_timeout_ms = Some(parse_var(ENV_QUERY_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_CONCURRENT_FETCHES) {
            self.max_concurrent_fetches = parse_var(ENV_MAX_CONCURRENT_FETCHES, &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_gap_minutes < 0 || self.min_slot_minutes < 0 {
            return Err(EngineError::Config(
                "minute thresholds must not be negative".to_string(),
            ));
        }
        let (start, end) = self.excluded_hours;
        if start > 23 || end > 23 {
            return Err(EngineError::Config(format!(
                "excluded hours {}-{} must be within 0-23",
                start, end
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(EngineError::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(EngineError::Config(
                "fetch_timeout_ms must be at least 1".to_string(),
            ));
        }
        self.tz().map_err(|e| EngineError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        dst::parse_timezone(&self.timezone)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

/// Parse a band written as `START-END`, e.g. `0-6` or `22-6`.
pub fn parse_hour_band(raw: &str) -> Result<(u32, u32)> {
    let invalid = || EngineError::Config(format!("'{}' is not an hour band like 0-6", raw));
    let (start, end) = raw.split_once('-').ok_or_else(invalid)?;
    let start: u32 = start.trim().parse().map_err(|_| invalid())?;
    let end: u32 = end.trim().parse().map_err(|_| invalid())?;
    if start > 23 || end > 23 {
        return Err(invalid());
    }
    Ok((start, end))
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{} has invalid value '{}'", key, raw)))
}
