use std::fmt;

use serde::Serialize;

use super::{Room, TimePeriod, User};

/// Opaque identifier assigned by the calendar backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookingId(String);

impl BookingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BookingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for BookingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A booking not yet known to the calendar backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    pub title: String,
    pub period: TimePeriod,
    pub room: Room,
    pub owner: User,
}

/// A booking together with its backend identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingWithId {
    pub id: BookingId,
    #[serde(flatten)]
    pub booking: Booking,
}

impl BookingWithId {
    pub fn from_booking_and_id(booking: Booking, id: BookingId) -> Self {
        Self { id, booking }
    }

    pub fn booking(&self) -> &Booking {
        &self.booking
    }

    pub fn owner(&self) -> &User {
        &self.booking.owner
    }

    pub fn room(&self) -> &Room {
        &self.booking.room
    }

    pub fn period(&self) -> &TimePeriod {
        &self.booking.period
    }
}
