//! Conversion between bookings and calendar items.
//!
//! Encoding is straightforward. Decoding is not: the calendar holds items
//! written by several generations of booking systems, each with its own
//! attendee conventions, so owner and room are recovered through ordered
//! rule ladders. Each rule either does not apply (`None`) or settles the
//! answer (`Some(Ok)` / `Some(Err)`).

use std::sync::{Arc, OnceLock};

use regex::Regex;
use roombook_core::{
    Booking, BookingConfig, BookingId, BookingWithId, Language, MailboxConvention, Room,
    TimePeriod, TimeStamp, User,
};
use roombook_ews::{
    Attendee, CalendarAccount, CalendarItem, ItemTime, Mailbox, ResponseType,
    SendMeetingInvitations,
};

use crate::error::{BookingError, CalendarItemField, InvalidCalendarItem};
use crate::registry::RoomsRegistry;

/// Settings the codec needs beyond the room catalog.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Mailbox of the booking service; items it organizes list the real
    /// owner as the first required attendee.
    pub primary_smtp_address: String,
    /// Organizer mailbox of the decommissioned booking system.
    pub legacy_booking_system_email: Option<String>,
    pub default_title: String,
    pub mailbox_convention: MailboxConvention,
}

impl CodecConfig {
    pub fn new(primary_smtp_address: impl Into<String>) -> Self {
        Self::from_booking_config(primary_smtp_address, &BookingConfig::default())
    }

    pub fn from_booking_config(primary_smtp_address: impl Into<String>, config: &BookingConfig) -> Self {
        Self {
            primary_smtp_address: primary_smtp_address.into(),
            legacy_booking_system_email: config.legacy_booking_system_email.clone(),
            default_title: config.default_title.clone(),
            mailbox_convention: config.mailbox_convention.clone(),
        }
    }

    pub fn with_legacy_booking_system(mut self, email: impl Into<String>) -> Self {
        self.legacy_booking_system_email = Some(email.into());
        self
    }
}

type OwnerRule = fn(&BookingCodec, &CalendarItem, &str) -> Option<Result<User, InvalidCalendarItem>>;

/// Rules applied to the resolved organizer, in priority order. When none
/// applies the organizer is the owner.
const OWNER_RULES: &[OwnerRule] = &[BookingCodec::legacy_system_owner, BookingCodec::service_owner];

pub struct BookingCodec {
    config: CodecConfig,
    registry: Arc<RoomsRegistry>,
}

impl BookingCodec {
    pub fn new(config: CodecConfig, registry: Arc<RoomsRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn registry(&self) -> &RoomsRegistry {
        &self.registry
    }

    /// Calendar item for a new booking. The owner is listed first and
    /// flagged as organizer; the room mailbox follows.
    pub fn encode(&self, booking: &Booking) -> CalendarItem {
        CalendarItem {
            subject: Some(booking.title.clone()),
            start: Some(ItemTime::DateTime(booking.period.start().datetime_utc())),
            end: Some(ItemTime::DateTime(booking.period.end().datetime_utc())),
            location: Some(booking.room.get_name(Language::En).to_string()),
            body: Some(format!("Booking on request from {}", booking.owner.email)),
            organizer: Some(Mailbox::new(booking.owner.email.clone())),
            required_attendees: Some(vec![
                Attendee::organizer(booking.owner.email.clone()),
                Attendee::new(booking.room.email.clone()),
            ]),
            ..Default::default()
        }
    }

    /// Save `booking` through `account` and return the backend id.
    ///
    /// An item saved without an id is deleted again (best effort) and
    /// reported as missing its id.
    pub fn save(
        &self,
        account: &dyn CalendarAccount,
        booking: &Booking,
    ) -> Result<BookingWithId, BookingError> {
        let saved = account.save(&self.encode(booking), SendMeetingInvitations::SendOnlyToAll)?;
        match saved.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => Ok(BookingWithId::from_booking_and_id(
                booking.clone(),
                BookingId::new(id),
            )),
            None => {
                if let Err(e) = account.delete(&saved) {
                    tracing::warn!("Failed to roll back booking saved without id: {}", e);
                }
                Err(InvalidCalendarItem::missing(CalendarItemField::Id).into())
            }
        }
    }

    pub fn decode(&self, item: &CalendarItem) -> Result<BookingWithId, InvalidCalendarItem> {
        let id = item
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(InvalidCalendarItem::missing(CalendarItemField::Id))?;

        let booking = Booking {
            title: self.resolve_title(item),
            period: resolve_period(item)?,
            room: self.resolve_room(item)?.clone(),
            owner: self.resolve_owner(item)?,
        };
        Ok(BookingWithId::from_booking_and_id(booking, BookingId::new(id)))
    }

    fn resolve_title(&self, item: &CalendarItem) -> String {
        item.subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.config.default_title)
            .to_string()
    }

    pub fn resolve_owner(&self, item: &CalendarItem) -> Result<User, InvalidCalendarItem> {
        let organizer = explicit_organizer(item)
            .or_else(|| attendee_organizer(item))
            .ok_or(InvalidCalendarItem::missing(CalendarItemField::Owner))?;

        OWNER_RULES
            .iter()
            .find_map(|rule| rule(self, item, organizer))
            .unwrap_or_else(|| Ok(User::from_email(organizer)))
    }

    /// Items from the legacy system list `[system, owner, room]`.
    fn legacy_system_owner(&self, item: &CalendarItem, organizer: &str) -> Option<Result<User, InvalidCalendarItem>> {
        let legacy = self.config.legacy_booking_system_email.as_deref()?;
        if !organizer.eq_ignore_ascii_case(legacy) {
            return None;
        }
        let attendees = item.required_attendees.as_deref().unwrap_or_default();
        match attendees {
            [system, owner, _room] if system.email().eq_ignore_ascii_case(legacy) => {
                Some(Ok(User::from_email(owner.email())))
            }
            _ => Some(Err(InvalidCalendarItem::missing(CalendarItemField::Owner))),
        }
    }

    /// Items created by this service list the owner first.
    fn service_owner(&self, item: &CalendarItem, organizer: &str) -> Option<Result<User, InvalidCalendarItem>> {
        if !organizer.eq_ignore_ascii_case(&self.config.primary_smtp_address) {
            return None;
        }
        let first = item
            .required_attendees
            .as_deref()
            .and_then(<[Attendee]>::first)
            .map(Attendee::email)
            .filter(|email| !email.is_empty() && !email.eq_ignore_ascii_case(organizer));
        Some(
            first
                .map(User::from_email)
                .ok_or(InvalidCalendarItem::missing(CalendarItemField::Owner)),
        )
    }

    pub fn resolve_room(&self, item: &CalendarItem) -> Result<&Room, InvalidCalendarItem> {
        self.room_from_attendees(item.resources.as_deref())
            .or_else(|| self.room_from_attendees(item.required_attendees.as_deref()))
            .or_else(|| self.room_from_location(item.location.as_deref()))
            .ok_or(InvalidCalendarItem::missing(CalendarItemField::Room))
    }

    fn room_from_attendees(&self, attendees: Option<&[Attendee]>) -> Option<&Room> {
        attendees?
            .iter()
            .find_map(|a| self.registry.get_by_email(a.email()))
    }

    fn room_from_location(&self, location: Option<&str>) -> Option<&Room> {
        let email = self.room_email_from_location(location?)?;
        self.registry.get_by_email(&email)
    }

    /// Mailbox address implied by location text such as
    /// `"University Room #3.14 (Lecture Room)"`.
    pub fn room_email_from_location(&self, location: &str) -> Option<String> {
        let number = room_number_pattern().captures(location)?.get(1)?.as_str();
        let MailboxConvention { prefix, domain } = &self.config.mailbox_convention;
        if location.to_lowercase().contains("lecture") {
            Some(format!("{prefix}lectureroom{number}@{domain}"))
        } else {
            Some(format!("{prefix}meetingroom.{number}@{domain}"))
        }
    }
}

#[allow(clippy::expect_used)]
fn room_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#(\d+(?:\.\d+)?)").expect("valid room number pattern"))
}

fn explicit_organizer(item: &CalendarItem) -> Option<&str> {
    item.organizer
        .as_ref()
        .map(|m| m.email_address.as_str())
        .filter(|email| !email.is_empty())
}

/// The single required attendee flagged as organizer. Several flagged
/// attendees are ambiguous and resolve to none.
fn attendee_organizer(item: &CalendarItem) -> Option<&str> {
    let mut flagged = item
        .required_attendees
        .as_deref()?
        .iter()
        .filter(|a| a.response_type == ResponseType::Organizer);
    let organizer = flagged.next()?;
    if flagged.next().is_some() {
        return None;
    }
    Some(organizer.email()).filter(|email| !email.is_empty())
}

fn resolve_time(value: Option<&ItemTime>, field: CalendarItemField) -> Result<TimeStamp, InvalidCalendarItem> {
    match value {
        None => Err(InvalidCalendarItem::missing(field)),
        Some(ItemTime::Unrecognized(raw)) => Err(InvalidCalendarItem::Unrecognized(format!(
            "unrecognized {} value '{}'",
            field, raw
        ))),
        Some(time) => time
            .to_utc()
            .map(TimeStamp::from_utc)
            .ok_or_else(|| InvalidCalendarItem::Unrecognized(format!("{} out of range", field))),
    }
}

fn resolve_period(item: &CalendarItem) -> Result<TimePeriod, InvalidCalendarItem> {
    let start = resolve_time(item.start.as_ref(), CalendarItemField::Start)?;
    let end = resolve_time(item.end.as_ref(), CalendarItemField::End)?;
    TimePeriod::new(start, end).map_err(|e| InvalidCalendarItem::Unrecognized(e.to_string()))
}
