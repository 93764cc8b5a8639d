//! Calendar item types as exposed by Exchange Web Services.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A mailbox reference (person, room or service account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub email_address: String,
    pub name: Option<String>,
}

impl Mailbox {
    pub fn new(email_address: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            name: None,
        }
    }
}

/// Attendee response as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseType {
    #[default]
    Unknown,
    Organizer,
    Tentative,
    Accept,
    Decline,
    NoResponseReceived,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Unknown => "Unknown",
            ResponseType::Organizer => "Organizer",
            ResponseType::Tentative => "Tentative",
            ResponseType::Accept => "Accept",
            ResponseType::Decline => "Decline",
            ResponseType::NoResponseReceived => "NoResponseReceived",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "Organizer" => ResponseType::Organizer,
            "Tentative" => ResponseType::Tentative,
            "Accept" => ResponseType::Accept,
            "Decline" => ResponseType::Decline,
            "NoResponseReceived" => ResponseType::NoResponseReceived,
            _ => ResponseType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub mailbox: Mailbox,
    pub response_type: ResponseType,
}

impl Attendee {
    pub fn new(email_address: impl Into<String>) -> Self {
        Self {
            mailbox: Mailbox::new(email_address),
            response_type: ResponseType::Unknown,
        }
    }

    pub fn organizer(email_address: impl Into<String>) -> Self {
        Self {
            mailbox: Mailbox::new(email_address),
            response_type: ResponseType::Organizer,
        }
    }

    pub fn email(&self) -> &str {
        &self.mailbox.email_address
    }
}

/// Item time - a date-time, an all-day date, or something the server sent
/// that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemTime {
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Unrecognized(String),
}

impl ItemTime {
    /// Parse an EWS time value. All-day items are reduced to their date.
    pub fn parse(value: &str, all_day: bool) -> Self {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            let dt = dt.with_timezone(&Utc);
            return if all_day {
                ItemTime::Date(dt.date_naive())
            } else {
                ItemTime::DateTime(dt)
            };
        }
        if let Ok(date) = NaiveDate::parse_from_str(value.trim_end_matches('Z'), "%Y-%m-%d") {
            return ItemTime::Date(date);
        }
        ItemTime::Unrecognized(value.to_string())
    }

    /// Midnight UTC for dates; `None` for unrecognized values.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            ItemTime::DateTime(dt) => Some(*dt),
            ItemTime::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            ItemTime::Unrecognized(_) => None,
        }
    }

    pub fn to_ews(&self) -> Option<String> {
        match self {
            ItemTime::DateTime(dt) => Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            ItemTime::Date(d) => Some(d.format("%Y-%m-%dT00:00:00Z").to_string()),
            ItemTime::Unrecognized(_) => None,
        }
    }
}

/// Calendar item as stored on the server. Every field may be missing on
/// items created by other clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarItem {
    pub id: Option<String>,
    pub change_key: Option<String>,
    pub subject: Option<String>,
    pub start: Option<ItemTime>,
    pub end: Option<ItemTime>,
    pub location: Option<String>,
    pub body: Option<String>,
    pub organizer: Option<Mailbox>,
    pub required_attendees: Option<Vec<Attendee>>,
    pub resources: Option<Vec<Attendee>>,
}

impl CalendarItem {
    /// Whether the item intersects the half-open window `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let item_start = self.start.as_ref().and_then(ItemTime::to_utc);
        let item_end = self.end.as_ref().and_then(ItemTime::to_utc);
        match (item_start, item_end) {
            (Some(s), Some(e)) => s < end && (e > start || (s == e && s >= start)),
            _ => false,
        }
    }

    /// Every mailbox invited to the item.
    pub fn invitees(&self) -> impl Iterator<Item = &Attendee> {
        self.required_attendees
            .iter()
            .flatten()
            .chain(self.resources.iter().flatten())
    }
}

/// Whether meeting requests go out when an item is saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMeetingInvitations {
    SendToNone,
    #[default]
    SendOnlyToAll,
    SendToAllAndSaveCopy,
}

impl SendMeetingInvitations {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendMeetingInvitations::SendToNone => "SendToNone",
            SendMeetingInvitations::SendOnlyToAll => "SendOnlyToAll",
            SendMeetingInvitations::SendToAllAndSaveCopy => "SendToAllAndSaveCopy",
        }
    }
}
