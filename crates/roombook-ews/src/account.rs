//! Backend-neutral view of a calendar mailbox.
//!
//! [`crate::EwsClient`] talks to a real Exchange server, while
//! [`crate::MemoryCalendarServer`] keeps everything in process. Callers only
//! see these traits.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::EwsError;
use crate::types::{CalendarItem, SendMeetingInvitations};

/// A single mailbox calendar. Every call blocks the calling thread.
pub trait CalendarAccount: Send + Sync {
    /// SMTP address of the mailbox this account reads and writes.
    fn primary_smtp_address(&self) -> &str;

    /// Items intersecting `[start, end)`, with attendees and resources
    /// populated.
    fn view(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CalendarItem>, EwsError>;

    /// Fetch one item by id.
    fn get(&self, id: &str) -> Result<CalendarItem, EwsError>;

    /// Store a new item and return it as the server saw it (id assigned).
    fn save(
        &self,
        item: &CalendarItem,
        send: SendMeetingInvitations,
    ) -> Result<CalendarItem, EwsError>;

    /// Delete an item, notifying its attendees.
    fn delete(&self, item: &CalendarItem) -> Result<(), EwsError>;
}

/// Opens accounts acting on behalf of other mailboxes.
pub trait AccountFactory: Send + Sync {
    fn impersonate(&self, email: &str) -> Result<Arc<dyn CalendarAccount>, EwsError>;
}
