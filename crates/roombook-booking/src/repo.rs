use async_trait::async_trait;
use roombook_core::{Booking, BookingId, BookingWithId, Room, TimePeriod, User};

use crate::error::BookingError;

/// Storage of room bookings, as seen by the request layer.
#[async_trait]
pub trait BookingsRepo: Send + Sync {
    /// Persist a new booking. Identical requests create identical bookings.
    async fn create_booking(&self, booking: Booking) -> Result<BookingId, BookingError>;

    /// Remove a booking. Fails when the id does not exist.
    async fn delete_booking(&self, booking_id: &BookingId) -> Result<(), BookingError>;

    /// Bookings intersecting `period`, optionally limited to some rooms
    /// and to one owner.
    async fn get_bookings_in_period(
        &self,
        period: TimePeriod,
        filter_rooms: Option<Vec<Room>>,
        filter_user_email: Option<String>,
    ) -> Result<Vec<BookingWithId>, BookingError>;

    async fn get_booking_owner(&self, booking_id: &BookingId) -> Result<User, BookingError>;

    async fn get_booking(&self, booking_id: &BookingId) -> Result<BookingWithId, BookingError>;
}
