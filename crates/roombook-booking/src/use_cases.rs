//! User-facing booking operations on top of a [`BookingsRepo`].

use roombook_core::{Booking, BookingId, BookingWithId, Room, TimePeriod, TimeStamp, User};

use crate::error::{BookingError, UseCaseError};
use crate::repo::BookingsRepo;

fn not_found_as_use_case(booking_id: &BookingId) -> impl FnOnce(BookingError) -> UseCaseError + '_ {
    move |e| {
        if e.is_not_found() {
            UseCaseError::NotFound(booking_id.to_string())
        } else {
            UseCaseError::Repo(e)
        }
    }
}

/// Book `room` for `user`. Periods starting before `now` are rejected.
pub async fn book_room_for_user<R>(
    repo: &R,
    title: impl Into<String>,
    period: TimePeriod,
    room: Room,
    user: User,
    now: TimeStamp,
) -> Result<BookingWithId, UseCaseError>
where
    R: BookingsRepo + ?Sized,
{
    if period.start() < now {
        return Err(UseCaseError::BookingInPast);
    }
    let booking = Booking {
        title: title.into(),
        period,
        room,
        owner: user,
    };
    let id = repo.create_booking(booking.clone()).await?;
    Ok(BookingWithId::from_booking_and_id(booking, id))
}

/// Cancel a booking on behalf of its owner, provided it has not started.
pub async fn delete_booking_by_user<R>(
    repo: &R,
    booking_id: &BookingId,
    user: &User,
    now: TimeStamp,
) -> Result<(), UseCaseError>
where
    R: BookingsRepo + ?Sized,
{
    let owner = repo
        .get_booking_owner(booking_id)
        .await
        .map_err(not_found_as_use_case(booking_id))?;
    if owner != *user {
        tracing::warn!("{} tried to delete booking {} owned by {}", user.email, booking_id, owner.email);
        return Err(UseCaseError::PermissionDenied {
            user: user.email.clone(),
            booking: booking_id.to_string(),
        });
    }

    let booking = repo
        .get_booking(booking_id)
        .await
        .map_err(not_found_as_use_case(booking_id))?;
    if booking.period().start() <= now {
        return Err(UseCaseError::BookingInPast);
    }

    repo.delete_booking(booking_id)
        .await
        .map_err(not_found_as_use_case(booking_id))
}
