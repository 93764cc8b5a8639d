//! Domain value objects shared by every layer.

mod booking;
mod room;
mod time;
mod user;

pub use booking::{Booking, BookingId, BookingWithId};
pub use room::{Language, Room, RoomType};
pub use time::{TimePeriod, TimeStamp};
pub use user::User;
