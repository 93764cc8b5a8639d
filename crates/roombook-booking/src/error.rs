//! Booking error types.

use std::fmt;

use roombook_ews::EwsError;
use thiserror::Error;

/// Required parts of a calendar item that every heuristic failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarItemField {
    Id,
    Start,
    End,
    Owner,
    Room,
}

impl CalendarItemField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarItemField::Id => "id",
            CalendarItemField::Start => "start",
            CalendarItemField::End => "end",
            CalendarItemField::Owner => "owner",
            CalendarItemField::Room => "room",
        }
    }
}

impl fmt::Display for CalendarItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar item that cannot be read as a booking.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCalendarItem {
    #[error("Invalid calendar item: {0}")]
    Unrecognized(String),

    #[error("Calendar item is missing field '{0}'")]
    MissingField(CalendarItemField),
}

impl InvalidCalendarItem {
    pub fn missing(field: CalendarItemField) -> Self {
        Self::MissingField(field)
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    InvalidCalendarItem(#[from] InvalidCalendarItem),

    #[error("Calendar backend error: {0}")]
    Backend(#[from] EwsError),

    #[error("Room is not in the catalog: {0}")]
    UnknownRoom(String),

    #[error("Worker pool is shut down")]
    WorkerPoolClosed,

    #[error("Worker panicked while running a backend call")]
    WorkerPanicked,
}

impl BookingError {
    /// User-friendly error message for API responses.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCalendarItem(_) => "The booking could not be read from the calendar".to_string(),
            Self::Backend(e) => e.user_message(),
            Self::UnknownRoom(_) => "Unknown room".to_string(),
            Self::WorkerPoolClosed | Self::WorkerPanicked => {
                "The booking service is unavailable. Please retry.".to_string()
            }
        }
    }

    /// Whether the backend reported that the item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_not_found())
    }
}

/// Errors surfaced by the booking use cases.
#[derive(Debug, Error)]
pub enum UseCaseError {
    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("User {user} does not own booking {booking}")]
    PermissionDenied { user: String, booking: String },

    #[error("Booking is in the past")]
    BookingInPast,

    #[error(transparent)]
    Repo(#[from] BookingError),
}

impl UseCaseError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "Booking not found".to_string(),
            Self::PermissionDenied { .. } => "You can only cancel your own bookings".to_string(),
            Self::BookingInPast => "Bookings in the past cannot be changed".to_string(),
            Self::Repo(e) => e.user_message(),
        }
    }
}
