//! Instants and periods, always normalized to UTC.

use std::fmt;
use std::ops::Add;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::TimeError;

/// A single moment in time, stored in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn from_utc(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Accepts an offset-aware value only when the offset is zero.
    pub fn from_fixed_offset(datetime: DateTime<FixedOffset>) -> Result<Self, TimeError> {
        let offset_seconds = datetime.offset().local_minus_utc();
        if offset_seconds != 0 {
            return Err(TimeError::NonUtcOffset { offset_seconds });
        }
        Ok(Self(datetime.with_timezone(&Utc)))
    }

    /// Naive values carry no zone and are taken as UTC.
    pub fn from_naive(datetime: NaiveDateTime) -> Self {
        Self(datetime.and_utc())
    }

    /// Seconds since the Unix epoch; `None` when out of range.
    pub fn from_timestamp(seconds: i64) -> Option<Self> {
        DateTime::from_timestamp(seconds, 0).map(Self)
    }

    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Add<Duration> for TimeStamp {
    type Output = TimeStamp;

    fn add(self, rhs: Duration) -> Self::Output {
        TimeStamp(self.0 + rhs)
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_utc(value)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// A closed interval `[start, end]` with `end >= start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimePeriod {
    start: TimeStamp,
    end: TimeStamp,
}

impl TimePeriod {
    pub fn new(start: TimeStamp, end: TimeStamp) -> Result<Self, TimeError> {
        if end < start {
            return Err(TimeError::EndTimeBeforeStartTime { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> TimeStamp {
        self.start
    }

    pub fn end(&self) -> TimeStamp {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end.datetime_utc() - self.start.datetime_utc()
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "start={}; end={}", self.start, self.end)
    }
}
