//! Error types for freetime-engine operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::UserId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// An interval or event whose start is not strictly before its end.
    #[error("Invalid interval: start {start} is not before end {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A query range that is empty or runs backwards.
    #[error("Invalid range: start {start} is not before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Unparseable `HH:MM` value, unknown timezone, or a local time that
    /// cannot be mapped to an instant.
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// One or more participants' events could not be fetched. The query as a
    /// whole is meaningless without them, so it fails rather than degrading.
    #[error("Calendar data unavailable for: {}", failed_user_ids.join(", "))]
    PartialDataUnavailable { failed_user_ids: Vec<UserId> },

    #[error("Query timed out")]
    Timeout,

    #[error("Query cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
