//! Exchange Web Services calendar access for Roombook.
//!
//! Provides a blocking SOAP client, an in-memory stand-in, and the
//! account traits both implement.

pub mod account;
pub mod client;
pub mod error;
pub mod memory;
pub mod retry;
pub mod soap;
pub mod types;

pub use account::{AccountFactory, CalendarAccount};
pub use client::{AccessType, Credentials, EwsAccount, EwsAccountFactory, EwsClient, EwsConfiguration};
pub use error::EwsError;
pub use memory::{MemoryAccount, MemoryCalendarServer};
pub use retry::RetryConfig;
pub use types::{Attendee, CalendarItem, ItemTime, Mailbox, ResponseType, SendMeetingInvitations};
