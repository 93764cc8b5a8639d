//! Room bookings stored in Exchange calendars.
//!
//! Provides the room registry, the calendar item codec, the
//! `OutlookBookings` adapter with its worker pool, and booking use cases.

pub mod codec;
pub mod error;
pub mod outlook;
pub mod pool;
pub mod registry;
pub mod repo;
pub mod use_cases;

pub use codec::{BookingCodec, CodecConfig};
pub use error::{BookingError, CalendarItemField, InvalidCalendarItem, UseCaseError};
pub use outlook::OutlookBookings;
pub use pool::WorkerPool;
pub use registry::RoomsRegistry;
pub use repo::BookingsRepo;
pub use use_cases::{book_room_for_user, delete_booking_by_user};
