//! End-to-end tests for OutlookBookings over the in-memory calendar server.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use roombook_booking::{
    book_room_for_user, delete_booking_by_user, BookingError, BookingsRepo, CalendarItemField,
    InvalidCalendarItem, OutlookBookings, RoomsRegistry, UseCaseError, WorkerPool,
};
use roombook_core::{Booking, BookingConfig, BookingId, Room, RoomType, TimePeriod, TimeStamp, User};
use roombook_ews::{
    AccountFactory, Attendee, CalendarAccount, CalendarItem, ItemTime, Mailbox, MemoryCalendarServer,
};

const SERVICE: &str = "booking@example.com";
const LEGACY: &str = "legacy-booking@example.com";

fn meeting_room() -> Room {
    Room::new(
        "313",
        8,
        "iu.resource.meetingroom.313@0f4tw.onmicrosoft.com",
        "Meeting Room 313",
        "Переговорная 313",
        RoomType::MeetingRoom,
    )
}

fn lecture_room() -> Room {
    Room::new(
        "108",
        200,
        "iu.resource.lectureroom108@0f4tw.onmicrosoft.com",
        "Lecture Room 108",
        "Лекционная 108",
        RoomType::Auditorium,
    )
}

fn ts(day: u32, hour: u32) -> TimeStamp {
    TimeStamp::from_utc(Utc.with_ymd_and_hms(2030, 3, day, hour, 0, 0).unwrap())
}

fn period(day: u32, from: u32, to: u32) -> TimePeriod {
    TimePeriod::new(ts(day, from), ts(day, to)).unwrap()
}

fn whole_day() -> TimePeriod {
    TimePeriod::new(ts(1, 0), ts(2, 0)).unwrap()
}

fn booking(owner: &str, room: Room, from: u32, to: u32) -> Booking {
    Booking {
        title: format!("Meeting of {}", owner),
        period: period(1, from, to),
        room,
        owner: User::from_email(owner),
    }
}

struct Fixture {
    server: MemoryCalendarServer,
    bookings: OutlookBookings,
}

fn fixture_with_pool(size: usize) -> Fixture {
    let server = MemoryCalendarServer::new();
    server.add_mailbox(SERVICE);
    for room in [meeting_room(), lecture_room()] {
        server.add_mailbox(&room.email);
    }

    let primary: Arc<dyn CalendarAccount> = Arc::new(server.account(SERVICE));
    let factory: Arc<dyn AccountFactory> = Arc::new(server.clone());
    let registry = Arc::new(RoomsRegistry::new(vec![meeting_room(), lecture_room()]));
    let config = BookingConfig {
        legacy_booking_system_email: Some(LEGACY.to_string()),
        ..Default::default()
    };
    let pool = Arc::new(WorkerPool::new(size).unwrap());

    Fixture {
        bookings: OutlookBookings::with_pool(primary, factory, registry, &config, pool),
        server,
    }
}

fn fixture() -> Fixture {
    fixture_with_pool(WorkerPool::DEFAULT_SIZE)
}

fn raw_item(organizer: &str, attendees: &[&str], day: u32, from: u32, to: u32) -> CalendarItem {
    CalendarItem {
        subject: Some("Imported".into()),
        start: Some(ItemTime::DateTime(ts(day, from).datetime_utc())),
        end: Some(ItemTime::DateTime(ts(day, to).datetime_utc())),
        organizer: Some(Mailbox::new(organizer)),
        required_attendees: Some(attendees.iter().map(|a| Attendee::new(*a)).collect()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_owner_delete_lifecycle() {
    let f = fixture();
    let id = f
        .bookings
        .create_booking(booking("alice@example.com", meeting_room(), 10, 11))
        .await
        .unwrap();

    let owner = f.bookings.get_booking_owner(&id).await.unwrap();
    assert_eq!(owner.email, "alice@example.com");

    f.bookings.delete_booking(&id).await.unwrap();
    let second = f.bookings.delete_booking(&id).await.unwrap_err();
    assert!(second.is_not_found());

    let remaining = f
        .bookings
        .get_bookings_in_period(whole_day(), None, None)
        .await
        .unwrap();
    assert!(remaining.is_empty());
    assert!(f.server.items(&meeting_room().email).is_empty());
}

#[tokio::test]
async fn test_round_trip_through_calendar() {
    let f = fixture();
    let original = booking("alice@example.com", lecture_room(), 9, 12);
    let id = f.bookings.create_booking(original.clone()).await.unwrap();

    let fetched = f.bookings.get_booking(&id).await.unwrap();
    assert_eq!(fetched.id, id);
    assert_eq!(fetched.booking.title, original.title);
    assert_eq!(fetched.room().email, original.room.email);
    assert_eq!(fetched.owner().email, original.owner.email);
    assert_eq!(*fetched.period(), original.period);
}

#[tokio::test]
async fn test_room_copy_is_deduplicated_by_fingerprint() {
    let f = fixture();
    let id = f
        .bookings
        .create_booking(booking("alice@example.com", meeting_room(), 10, 11))
        .await
        .unwrap();

    // The room calendar holds its own copy under a different id.
    let copies = f.server.items(&meeting_room().email);
    assert_eq!(copies.len(), 1);
    assert_ne!(copies[0].id.as_deref(), Some(id.as_str()));

    let found = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(vec![meeting_room()]), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, id);

    let everywhere = f
        .bookings
        .get_bookings_in_period(whole_day(), None, None)
        .await
        .unwrap();
    assert_eq!(everywhere.len(), 1);
}

#[tokio::test]
async fn test_same_id_in_room_view_is_deduplicated() {
    let f = fixture();
    let id = f
        .bookings
        .create_booking(booking("alice@example.com", meeting_room(), 10, 11))
        .await
        .unwrap();

    let mut shifted = raw_item(SERVICE, &["alice@example.com", &meeting_room().email], 1, 14, 15);
    shifted.id = Some(id.as_str().to_string());
    f.server.insert_raw(&lecture_room().email, shifted);

    let found = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(vec![lecture_room()]), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].period().start(), ts(1, 10));
}

#[tokio::test]
async fn test_filter_by_owner_email() {
    let f = fixture();
    f.bookings
        .create_booking(booking("alice@example.com", meeting_room(), 10, 11))
        .await
        .unwrap();
    f.bookings
        .create_booking(booking("bob@example.com", lecture_room(), 10, 11))
        .await
        .unwrap();

    let alice = f
        .bookings
        .get_bookings_in_period(whole_day(), None, Some("alice@example.com".to_string()))
        .await
        .unwrap();
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].owner().email, "alice@example.com");
    assert_eq!(alice[0].room().email, meeting_room().email);
}

#[tokio::test]
async fn test_bookings_sharing_a_slot_are_all_listed() {
    let f = fixture();
    let alice = f
        .bookings
        .create_booking(booking("alice@example.com", meeting_room(), 10, 11))
        .await
        .unwrap();
    let bob = f
        .bookings
        .create_booking(booking("bob@example.com", meeting_room(), 10, 11))
        .await
        .unwrap();

    let primary_only = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(Vec::new()), None)
        .await
        .unwrap();
    let ids: Vec<_> = primary_only.iter().map(|b| b.id.clone()).collect();
    assert_eq!(ids, [alice, bob.clone()]);

    // The room copies of both meetings are dropped.
    let everywhere = f
        .bookings
        .get_bookings_in_period(whole_day(), None, None)
        .await
        .unwrap();
    assert_eq!(everywhere.len(), 2);

    let bobs = f
        .bookings
        .get_bookings_in_period(whole_day(), None, Some("bob@example.com".to_string()))
        .await
        .unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].id, bob);
}

#[tokio::test]
async fn test_owner_filter_runs_before_room_dedup() {
    let f = fixture();
    let room = meeting_room().email;
    f.server
        .insert_raw(&room, raw_item("dave@example.com", &[&room], 1, 8, 9));
    f.server
        .insert_raw(&room, raw_item("erin@example.com", &[&room], 1, 8, 9));

    let erin = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(vec![meeting_room()]), Some("erin@example.com".to_string()))
        .await
        .unwrap();
    assert_eq!(erin.len(), 1);
    assert_eq!(erin[0].owner().email, "erin@example.com");

    let unfiltered = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(vec![meeting_room()]), None)
        .await
        .unwrap();
    assert_eq!(unfiltered.len(), 1);
    assert_eq!(unfiltered[0].owner().email, "dave@example.com");
}

#[tokio::test]
async fn test_rooms_scanned_in_requested_order() {
    let f = fixture();
    let meeting = meeting_room().email;
    let lecture = lecture_room().email;
    f.server
        .insert_raw(&meeting, raw_item("carol@example.com", &[&meeting], 1, 8, 9));
    f.server
        .insert_raw(&lecture, raw_item("dave@example.com", &[&lecture], 1, 8, 9));

    let forward = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(vec![lecture_room(), meeting_room()]), None)
        .await
        .unwrap();
    let owners: Vec<_> = forward.iter().map(|b| b.owner().email.as_str()).collect();
    assert_eq!(owners, ["dave@example.com", "carol@example.com"]);

    let backward = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(vec![meeting_room(), lecture_room()]), None)
        .await
        .unwrap();
    let owners: Vec<_> = backward.iter().map(|b| b.owner().email.as_str()).collect();
    assert_eq!(owners, ["carol@example.com", "dave@example.com"]);
}

#[tokio::test]
async fn test_unreadable_items_are_skipped() {
    let f = fixture();
    let room = meeting_room().email;
    // No organizer anywhere.
    f.server.insert_raw(
        SERVICE,
        CalendarItem {
            organizer: None,
            ..raw_item("", &[&room], 1, 9, 10)
        },
    );
    // No room.
    f.server
        .insert_raw(SERVICE, raw_item("erin@example.com", &["erin@example.com"], 1, 11, 12));
    f.server
        .insert_raw(SERVICE, raw_item("frank@example.com", &[&room], 1, 13, 14));

    let found = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(Vec::new()), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].owner().email, "frank@example.com");
}

#[tokio::test]
async fn test_legacy_items_in_room_calendar() {
    let f = fixture();
    let room = meeting_room().email;
    f.server
        .insert_raw(&room, raw_item(LEGACY, &[LEGACY, "grace@example.com", &room], 1, 15, 16));
    f.server
        .insert_raw(&room, raw_item(LEGACY, &["grace@example.com", LEGACY, &room], 1, 17, 18));

    let found = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(vec![meeting_room()]), None)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].owner().email, "grace@example.com");
    assert_eq!(found[0].period().start(), ts(1, 15));
}

#[tokio::test]
async fn test_unknown_room_filter_is_rejected() {
    let f = fixture();
    let stranger = Room::new("0", 1, "nowhere@example.com", "Nowhere", "Нигде", RoomType::MeetingRoom);
    let err = f
        .bookings
        .get_bookings_in_period(whole_day(), Some(vec![stranger]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::UnknownRoom(email) if email == "nowhere@example.com"));
}

#[tokio::test]
async fn test_owner_of_missing_booking() {
    let f = fixture();
    let err = f
        .bookings
        .get_booking_owner(&BookingId::new("does-not-exist"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_without_id_reports_missing_id() {
    let f = fixture();
    f.server.set_withhold_ids(true);
    let err = f
        .bookings
        .create_booking(booking("alice@example.com", meeting_room(), 10, 11))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidCalendarItem(InvalidCalendarItem::MissingField(CalendarItemField::Id))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_worker_pool_handles_concurrent_requests() {
    let f = fixture_with_pool(1);
    assert_eq!(f.bookings.pool().size(), 1);

    let mut handles = Vec::new();
    for hour in 8..12 {
        let bookings = f.bookings.clone();
        handles.push(tokio::spawn(async move {
            bookings
                .create_booking(booking("alice@example.com", meeting_room(), hour, hour + 1))
                .await
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    let found = f
        .bookings
        .get_bookings_in_period(whole_day(), None, None)
        .await
        .unwrap();
    assert_eq!(found.len(), 4);
}

#[tokio::test]
async fn test_book_room_for_user_rejects_past() {
    let f = fixture();
    let user = User::from_email("alice@example.com");
    let err = book_room_for_user(&f.bookings, "Late", period(1, 8, 9), meeting_room(), user.clone(), ts(1, 12))
        .await
        .unwrap_err();
    assert!(matches!(err, UseCaseError::BookingInPast));

    let booked = book_room_for_user(&f.bookings, "On time", period(1, 13, 14), meeting_room(), user, ts(1, 12))
        .await
        .unwrap();
    assert_eq!(booked.booking.title, "On time");
}

#[tokio::test]
async fn test_delete_booking_by_user_rules() {
    let f = fixture();
    let alice = User::from_email("alice@example.com");
    let bob = User::from_email("bob@example.com");
    let id = f
        .bookings
        .create_booking(booking("alice@example.com", meeting_room(), 10, 11))
        .await
        .unwrap();

    let denied = delete_booking_by_user(&f.bookings, &id, &bob, ts(1, 8)).await.unwrap_err();
    assert!(matches!(denied, UseCaseError::PermissionDenied { .. }));

    let started = delete_booking_by_user(&f.bookings, &id, &alice, ts(1, 10)).await.unwrap_err();
    assert!(matches!(started, UseCaseError::BookingInPast));

    delete_booking_by_user(&f.bookings, &id, &alice, ts(1, 8)).await.unwrap();

    let gone = delete_booking_by_user(&f.bookings, &id, &alice, ts(1, 8)).await.unwrap_err();
    assert!(matches!(gone, UseCaseError::NotFound(_)));
}
