//! `BookingsRepo` backed by an Exchange calendar.
//!
//! The booking service's own mailbox is the primary calendar. Room
//! calendars are read through impersonated accounts, since a meeting can be
//! visible in either place (or both, under different ids).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roombook_core::{Booking, BookingConfig, BookingId, BookingWithId, Room, TimePeriod, TimeStamp, User};
use roombook_ews::{AccountFactory, CalendarAccount};
use tracing::instrument;

use crate::codec::{BookingCodec, CodecConfig};
use crate::error::BookingError;
use crate::pool::WorkerPool;
use crate::registry::RoomsRegistry;
use crate::repo::BookingsRepo;

/// Secondary dedup key for views that list one meeting under several ids.
type Fingerprint = (TimeStamp, TimeStamp, String);

/// Bookings collected during one range query, in scan order.
///
/// The primary calendar is taken as-is and only seeds the seen sets. Room
/// calendars are checked against them, after the owner filter, since they
/// list the same meetings under their own ids.
struct Scan<'a> {
    owner_email: Option<&'a str>,
    seen_ids: HashSet<BookingId>,
    seen_fingerprints: HashSet<Fingerprint>,
    bookings: Vec<BookingWithId>,
}

impl<'a> Scan<'a> {
    fn new(owner_email: Option<&'a str>) -> Self {
        Self {
            owner_email,
            seen_ids: HashSet::new(),
            seen_fingerprints: HashSet::new(),
            bookings: Vec::new(),
        }
    }

    fn fingerprint(booking: &BookingWithId) -> Fingerprint {
        (
            booking.period().start(),
            booking.period().end(),
            booking.room().email.clone(),
        )
    }

    fn is_wanted(&self, booking: &BookingWithId) -> bool {
        self.owner_email
            .map_or(true, |email| booking.owner().email == email)
    }

    fn record(&mut self, booking: &BookingWithId) {
        self.seen_ids.insert(booking.id.clone());
        self.seen_fingerprints.insert(Self::fingerprint(booking));
    }

    fn add_primary(&mut self, booking: BookingWithId) {
        self.record(&booking);
        if self.is_wanted(&booking) {
            self.bookings.push(booking);
        }
    }

    fn add_from_room(&mut self, booking: BookingWithId) {
        if !self.is_wanted(&booking) {
            return;
        }
        if self.seen_ids.contains(&booking.id)
            || self.seen_fingerprints.contains(&Self::fingerprint(&booking))
        {
            tracing::debug!("Dropping duplicate of booking {}", booking.id);
            return;
        }
        self.record(&booking);
        self.bookings.push(booking);
    }
}

struct Inner {
    primary: Arc<dyn CalendarAccount>,
    factory: Arc<dyn AccountFactory>,
    codec: BookingCodec,
}

impl Inner {
    #[instrument(skip(self, booking), fields(room = %booking.room.email, owner = %booking.owner.email))]
    fn create_booking(&self, booking: &Booking) -> Result<BookingId, BookingError> {
        let created = self.codec.save(self.primary.as_ref(), booking)?;
        tracing::info!("Created booking {}", created.id);
        Ok(created.id)
    }

    #[instrument(skip(self))]
    fn delete_booking(&self, booking_id: &BookingId) -> Result<(), BookingError> {
        let item = self.primary.get(booking_id.as_str())?;
        self.primary.delete(&item)?;
        tracing::info!("Deleted booking {}", booking_id);
        Ok(())
    }

    #[instrument(skip(self))]
    fn get_booking_owner(&self, booking_id: &BookingId) -> Result<User, BookingError> {
        let item = self.primary.get(booking_id.as_str())?;
        Ok(self.codec.resolve_owner(&item)?)
    }

    #[instrument(skip(self))]
    fn get_booking(&self, booking_id: &BookingId) -> Result<BookingWithId, BookingError> {
        let item = self.primary.get(booking_id.as_str())?;
        Ok(self.codec.decode(&item)?)
    }

    #[instrument(skip(self, filter_rooms))]
    fn get_bookings_in_period(
        &self,
        period: TimePeriod,
        filter_rooms: Option<&[Room]>,
        filter_user_email: Option<&str>,
    ) -> Result<Vec<BookingWithId>, BookingError> {
        let rooms = self.rooms_to_scan(filter_rooms)?;
        let start = period.start().datetime_utc();
        let end = period.end().datetime_utc();

        let mut scan = Scan::new(filter_user_email);
        for booking in self.decode_view(self.primary.as_ref(), start, end)? {
            scan.add_primary(booking);
        }
        for room in &rooms {
            tracing::info!("Scanning calendar of {}", room.name_en);
            let account = self.factory.impersonate(&room.email)?;
            for booking in self.decode_view(account.as_ref(), start, end)? {
                scan.add_from_room(booking);
            }
        }

        tracing::debug!("Found {} bookings", scan.bookings.len());
        Ok(scan.bookings)
    }

    /// Catalog entries for the requested rooms, in request order.
    fn rooms_to_scan(&self, filter_rooms: Option<&[Room]>) -> Result<Vec<Room>, BookingError> {
        let registry = self.codec.registry();
        match filter_rooms {
            None => Ok(registry.get_all().to_vec()),
            Some(rooms) => rooms
                .iter()
                .map(|room| {
                    registry
                        .get_by_email(&room.email)
                        .cloned()
                        .ok_or_else(|| BookingError::UnknownRoom(room.email.clone()))
                })
                .collect(),
        }
    }

    /// Decode one calendar view, skipping unreadable items.
    fn decode_view(
        &self,
        account: &dyn CalendarAccount,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BookingWithId>, BookingError> {
        let mut bookings = Vec::new();
        for item in account.view(start, end)? {
            match self.codec.decode(&item) {
                Ok(booking) => bookings.push(booking),
                Err(e) => tracing::warn!(
                    mailbox = account.primary_smtp_address(),
                    item_id = item.id.as_deref().unwrap_or("<none>"),
                    "Skipping calendar item: {}",
                    e
                ),
            }
        }
        Ok(bookings)
    }
}

/// Bookings stored as meetings in Exchange calendars.
///
/// Each operation has a `*_blocking` form doing the work on the calling
/// thread; the [`BookingsRepo`] impl runs that form on the worker pool.
#[derive(Clone)]
pub struct OutlookBookings {
    inner: Arc<Inner>,
    pool: Arc<WorkerPool>,
}

impl OutlookBookings {
    /// Adapter with its own pool of `config.worker_pool_size` threads.
    pub fn new(
        primary: Arc<dyn CalendarAccount>,
        factory: Arc<dyn AccountFactory>,
        registry: Arc<RoomsRegistry>,
        config: &BookingConfig,
    ) -> std::io::Result<Self> {
        let pool = Arc::new(WorkerPool::new(config.worker_pool_size)?);
        Ok(Self::with_pool(primary, factory, registry, config, pool))
    }

    pub fn with_pool(
        primary: Arc<dyn CalendarAccount>,
        factory: Arc<dyn AccountFactory>,
        registry: Arc<RoomsRegistry>,
        config: &BookingConfig,
        pool: Arc<WorkerPool>,
    ) -> Self {
        let codec_config = CodecConfig::from_booking_config(primary.primary_smtp_address(), config);
        Self {
            inner: Arc::new(Inner {
                primary,
                factory,
                codec: BookingCodec::new(codec_config, registry),
            }),
            pool,
        }
    }

    pub fn registry(&self) -> &RoomsRegistry {
        self.inner.codec.registry()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn create_booking_blocking(&self, booking: &Booking) -> Result<BookingId, BookingError> {
        self.inner.create_booking(booking)
    }

    pub fn delete_booking_blocking(&self, booking_id: &BookingId) -> Result<(), BookingError> {
        self.inner.delete_booking(booking_id)
    }

    pub fn get_booking_owner_blocking(&self, booking_id: &BookingId) -> Result<User, BookingError> {
        self.inner.get_booking_owner(booking_id)
    }

    pub fn get_booking_blocking(&self, booking_id: &BookingId) -> Result<BookingWithId, BookingError> {
        self.inner.get_booking(booking_id)
    }

    pub fn get_bookings_in_period_blocking(
        &self,
        period: TimePeriod,
        filter_rooms: Option<&[Room]>,
        filter_user_email: Option<&str>,
    ) -> Result<Vec<BookingWithId>, BookingError> {
        self.inner
            .get_bookings_in_period(period, filter_rooms, filter_user_email)
    }
}

#[async_trait]
impl BookingsRepo for OutlookBookings {
    async fn create_booking(&self, booking: Booking) -> Result<BookingId, BookingError> {
        let inner = Arc::clone(&self.inner);
        self.pool.run(move || inner.create_booking(&booking)).await?
    }

    async fn delete_booking(&self, booking_id: &BookingId) -> Result<(), BookingError> {
        let inner = Arc::clone(&self.inner);
        let booking_id = booking_id.clone();
        self.pool.run(move || inner.delete_booking(&booking_id)).await?
    }

    async fn get_bookings_in_period(
        &self,
        period: TimePeriod,
        filter_rooms: Option<Vec<Room>>,
        filter_user_email: Option<String>,
    ) -> Result<Vec<BookingWithId>, BookingError> {
        let inner = Arc::clone(&self.inner);
        self.pool
            .run(move || {
                inner.get_bookings_in_period(
                    period,
                    filter_rooms.as_deref(),
                    filter_user_email.as_deref(),
                )
            })
            .await?
    }

    async fn get_booking_owner(&self, booking_id: &BookingId) -> Result<User, BookingError> {
        let inner = Arc::clone(&self.inner);
        let booking_id = booking_id.clone();
        self.pool.run(move || inner.get_booking_owner(&booking_id)).await?
    }

    async fn get_booking(&self, booking_id: &BookingId) -> Result<BookingWithId, BookingError> {
        let inner = Arc::clone(&self.inner);
        let booking_id = booking_id.clone();
        self.pool.run(move || inner.get_booking(&booking_id)).await?
    }
}
