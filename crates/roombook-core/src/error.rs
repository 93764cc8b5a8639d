//! Domain-level errors shared by the booking crates.

use thiserror::Error;

use crate::entities::TimeStamp;

/// Errors raised while constructing time values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("end time {end} is before start time {start}")]
    EndTimeBeforeStartTime { start: TimeStamp, end: TimeStamp },

    #[error("timestamp must be UTC, got offset of {offset_seconds} seconds")]
    NonUtcOffset { offset_seconds: i32 },
}

impl TimeError {
    pub fn user_message(&self) -> &'static str {
        match self {
            TimeError::EndTimeBeforeStartTime { .. } => "The end time must not precede the start time.",
            TimeError::NonUtcOffset { .. } => "Times must be given in UTC.",
        }
    }
}
