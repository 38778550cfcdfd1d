//! Reservation saga coordinator.
//!
//! A reservation walks CHECKING, RESERVING, then CONFIRMED. Any conflict or
//! failure after the first decrement enters COMPENSATING: every night taken
//! in this attempt is restored and the booking is marked FAILED. Inventory
//! lives in the hotel service, so partial failure between dates is the
//! normal case here, not an exception path.

use std::sync::Arc;

use chrono::NaiveDate;
use shared::dates::StayRange;
use shared::{ServiceError, ServiceResult};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::hotel_client::{DecrementOutcome, HotelApi};
use crate::ledger::{BookingLedger, InsertOutcome};
use crate::models::Booking;

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub hotel_id: i64,
    pub room_id: Uuid,
    pub user_id: i64,
    pub range: StayRange,
    pub guest_count: i32,
}

#[derive(Debug)]
pub enum ReservationOutcome {
    /// The saga ran to completion and the booking is CONFIRMED.
    Confirmed(Booking),
    /// The natural key (room, user, stay) already has a live booking;
    /// no second saga was started.
    AlreadyRequested(Booking),
}

pub struct ReservationSaga {
    hotel: Arc<dyn HotelApi>,
    ledger: Arc<dyn BookingLedger>,
}

impl ReservationSaga {
    pub fn new(hotel: Arc<dyn HotelApi>, ledger: Arc<dyn BookingLedger>) -> Self {
        Self { hotel, ledger }
    }

    pub async fn reserve(&self, request: ReservationRequest) -> ServiceResult<ReservationOutcome> {
        if request.guest_count < 1 {
            return Err(ServiceError::validation("guest count must be at least 1"));
        }

        let available = self
            .hotel
            .check_available(
                request.hotel_id,
                request.room_id,
                &request.range,
                request.guest_count,
            )
            .await?;
        if !available {
            return Err(ServiceError::conflict(
                "room is not available for the requested stay",
            ));
        }

        let booking = match self.ledger.insert_pending(&request).await? {
            InsertOutcome::Duplicate(existing) => {
                info!(
                    booking_id = existing.id,
                    "repeat reservation request, returning existing booking"
                );
                return Ok(ReservationOutcome::AlreadyRequested(existing));
            }
            InsertOutcome::Inserted(booking) => booking,
        };

        let mut decremented: Vec<NaiveDate> = Vec::new();
        for date in request.range.days() {
            match self.hotel.decrement(request.room_id, date).await {
                Ok(DecrementOutcome::Applied) => decremented.push(date),
                Ok(DecrementOutcome::Conflict) => {
                    warn!(
                        booking_id = booking.id,
                        %date,
                        "inventory sold out mid-reservation, compensating"
                    );
                    self.abort(&booking, &decremented).await;
                    return Err(ServiceError::conflict("room sold out during reservation"));
                }
                Err(err) => {
                    warn!(
                        booking_id = booking.id,
                        %date,
                        "inventory call failed, compensating: {}",
                        err
                    );
                    self.abort(&booking, &decremented).await;
                    return Err(err);
                }
            }
        }

        let event = booking.created_event();
        match self.ledger.confirm(booking.id, &event).await {
            Ok(confirmed) => {
                info!(booking_id = confirmed.id, "booking confirmed");
                Ok(ReservationOutcome::Confirmed(confirmed))
            }
            Err(err) => {
                error!(booking_id = booking.id, "confirmation failed, compensating: {}", err);
                self.abort(&booking, &decremented).await;
                Err(err)
            }
        }
    }

    /// Restores every night taken in this attempt and marks the booking
    /// FAILED. A restore failure is logged and skipped so the remaining
    /// nights still get returned.
    async fn abort(&self, booking: &Booking, decremented: &[NaiveDate]) {
        for date in decremented {
            if let Err(err) = self.hotel.restore(booking.room_id, *date).await {
                error!(
                    booking_id = booking.id,
                    %date,
                    "restore failed, inventory needs manual reconciliation: {}",
                    err
                );
            }
        }
        if let Err(err) = self.ledger.mark_failed(booking.id).await {
            error!(booking_id = booking.id, "could not mark booking failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use shared::events::BookingCreated;

    use super::*;
    use crate::models::{STATUS_CONFIRMED, STATUS_FAILED, STATUS_PENDING};

    struct FakeHotel {
        available: bool,
        counts: Mutex<HashMap<NaiveDate, i32>>,
        fail_decrement_on: Option<NaiveDate>,
        fail_restore_on: Option<NaiveDate>,
        decrements: Mutex<Vec<NaiveDate>>,
        restores: Mutex<Vec<NaiveDate>>,
        checks: AtomicUsize,
    }

    impl FakeHotel {
        fn with_counts(counts: &[(NaiveDate, i32)]) -> Self {
            Self {
                available: true,
                counts: Mutex::new(counts.iter().copied().collect()),
                fail_decrement_on: None,
                fail_restore_on: None,
                decrements: Mutex::new(Vec::new()),
                restores: Mutex::new(Vec::new()),
                checks: AtomicUsize::new(0),
            }
        }

        fn remaining(&self, date: NaiveDate) -> i32 {
            *self.counts.lock().unwrap().get(&date).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl HotelApi for FakeHotel {
        async fn check_available(
            &self,
            _hotel_id: i64,
            _room_id: Uuid,
            _range: &StayRange,
            _guest_count: i32,
        ) -> ServiceResult<bool> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(self.available)
        }

        async fn decrement(
            &self,
            _room_id: Uuid,
            date: NaiveDate,
        ) -> ServiceResult<DecrementOutcome> {
            if self.fail_decrement_on == Some(date) {
                return Err(ServiceError::upstream("inventory unreachable"));
            }
            let mut counts = self.counts.lock().unwrap();
            let remaining = counts.entry(date).or_insert(0);
            if *remaining >= 1 {
                *remaining -= 1;
                self.decrements.lock().unwrap().push(date);
                Ok(DecrementOutcome::Applied)
            } else {
                Ok(DecrementOutcome::Conflict)
            }
        }

        async fn restore(&self, _room_id: Uuid, date: NaiveDate) -> ServiceResult<()> {
            if self.fail_restore_on == Some(date) {
                return Err(ServiceError::upstream("restore unreachable"));
            }
            *self.counts.lock().unwrap().entry(date).or_insert(0) += 1;
            self.restores.lock().unwrap().push(date);
            Ok(())
        }

        async fn hotel_name(&self, _hotel_id: i64) -> Option<String> {
            Some("Test Hotel".to_string())
        }
    }

    #[derive(Default)]
    struct InMemoryLedger {
        bookings: Mutex<Vec<Booking>>,
        outbox: Mutex<Vec<BookingCreated>>,
        fail_confirm: bool,
    }

    impl InMemoryLedger {
        fn statuses(&self) -> Vec<String> {
            self.bookings
                .lock()
                .unwrap()
                .iter()
                .map(|b| b.status.clone())
                .collect()
        }
    }

    #[async_trait]
    impl BookingLedger for InMemoryLedger {
        async fn insert_pending(
            &self,
            request: &ReservationRequest,
        ) -> ServiceResult<InsertOutcome> {
            let mut bookings = self.bookings.lock().unwrap();
            if let Some(existing) = bookings.iter().find(|b| {
                b.room_id == request.room_id
                    && b.user_id == request.user_id
                    && b.check_in == request.range.check_in()
                    && b.check_out == request.range.check_out()
                    && (b.status == STATUS_PENDING || b.status == STATUS_CONFIRMED)
            }) {
                return Ok(InsertOutcome::Duplicate(existing.clone()));
            }
            let booking = Booking {
                id: (bookings.len() + 1) as i64,
                hotel_id: request.hotel_id,
                room_id: request.room_id,
                user_id: request.user_id,
                check_in: request.range.check_in(),
                check_out: request.range.check_out(),
                guest_count: request.guest_count,
                status: STATUS_PENDING.to_string(),
                created_at: None,
                updated_at: None,
            };
            bookings.push(booking.clone());
            Ok(InsertOutcome::Inserted(booking))
        }

        async fn confirm(
            &self,
            booking_id: i64,
            event: &BookingCreated,
        ) -> ServiceResult<Booking> {
            if self.fail_confirm {
                return Err(ServiceError::upstream("booking store unreachable"));
            }
            let mut bookings = self.bookings.lock().unwrap();
            let booking = bookings
                .iter_mut()
                .find(|b| b.id == booking_id)
                .ok_or(ServiceError::NotFound {
                    resource: "booking",
                })?;
            booking.status = STATUS_CONFIRMED.to_string();
            self.outbox.lock().unwrap().push(event.clone());
            Ok(booking.clone())
        }

        async fn mark_failed(&self, booking_id: i64) -> ServiceResult<()> {
            let mut bookings = self.bookings.lock().unwrap();
            if let Some(booking) = bookings.iter_mut().find(|b| b.id == booking_id) {
                booking.status = STATUS_FAILED.to_string();
            }
            Ok(())
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn request_for(user_id: i64) -> ReservationRequest {
        ReservationRequest {
            hotel_id: 7,
            room_id: Uuid::from_u128(42),
            user_id,
            range: StayRange::new(date(1), date(4)).unwrap(),
            guest_count: 2,
        }
    }

    fn full_counts() -> Vec<(NaiveDate, i32)> {
        vec![(date(1), 1), (date(2), 1), (date(3), 1)]
    }

    #[tokio::test]
    async fn confirms_when_every_night_is_decremented() {
        let hotel = Arc::new(FakeHotel::with_counts(&full_counts()));
        let ledger = Arc::new(InMemoryLedger::default());
        let saga = ReservationSaga::new(hotel.clone(), ledger.clone());

        let outcome = saga.reserve(request_for(3)).await.unwrap();
        let booking = match outcome {
            ReservationOutcome::Confirmed(booking) => booking,
            other => panic!("expected confirmation, got {other:?}"),
        };

        assert_eq!(booking.status, STATUS_CONFIRMED);
        assert_eq!(
            *hotel.decrements.lock().unwrap(),
            vec![date(1), date(2), date(3)]
        );
        for day in 1..=3 {
            assert_eq!(hotel.remaining(date(day)), 0);
        }

        let outbox = recorded_events(&ledger);
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].booking_id, booking.id);
        assert_eq!(outbox[0].check_in, date(1));
        assert_eq!(outbox[0].check_out, date(4));
    }

    #[tokio::test]
    async fn rejects_unavailable_room_before_any_side_effect() {
        let mut fake = FakeHotel::with_counts(&full_counts());
        fake.available = false;
        let hotel = Arc::new(fake);
        let ledger = Arc::new(InMemoryLedger::default());
        let saga = ReservationSaga::new(hotel.clone(), ledger.clone());

        let err = saga.reserve(request_for(3)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(ledger.bookings.lock().unwrap().is_empty());
        assert!(hotel.decrements.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_guest_count_below_one_without_remote_calls() {
        let hotel = Arc::new(FakeHotel::with_counts(&full_counts()));
        let ledger = Arc::new(InMemoryLedger::default());
        let saga = ReservationSaga::new(hotel.clone(), ledger.clone());

        let mut request = request_for(3);
        request.guest_count = 0;
        let err = saga.reserve(request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(hotel.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn compensates_exactly_the_nights_taken_on_conflict() {
        let hotel = Arc::new(FakeHotel::with_counts(&[
            (date(1), 1),
            (date(2), 1),
            (date(3), 0),
        ]));
        let ledger = Arc::new(InMemoryLedger::default());
        let saga = ReservationSaga::new(hotel.clone(), ledger.clone());

        let err = saga.reserve(request_for(3)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        assert_eq!(*hotel.restores.lock().unwrap(), vec![date(1), date(2)]);
        assert_eq!(hotel.remaining(date(1)), 1);
        assert_eq!(hotel.remaining(date(2)), 1);
        assert_eq!(hotel.remaining(date(3)), 0);
        assert_eq!(ledger.statuses(), vec![STATUS_FAILED.to_string()]);
        assert!(recorded_events(&ledger).is_empty());
    }

    #[tokio::test]
    async fn compensates_and_surfaces_upstream_on_transport_failure() {
        let mut fake = FakeHotel::with_counts(&full_counts());
        fake.fail_decrement_on = Some(date(2));
        let hotel = Arc::new(fake);
        let ledger = Arc::new(InMemoryLedger::default());
        let saga = ReservationSaga::new(hotel.clone(), ledger.clone());

        let err = saga.reserve(request_for(3)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
        assert_eq!(*hotel.restores.lock().unwrap(), vec![date(1)]);
        assert_eq!(ledger.statuses(), vec![STATUS_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn repeat_request_returns_the_existing_booking() {
        let hotel = Arc::new(FakeHotel::with_counts(&full_counts()));
        let ledger = Arc::new(InMemoryLedger::default());
        let saga = ReservationSaga::new(hotel.clone(), ledger.clone());

        let first = saga.reserve(request_for(3)).await.unwrap();
        let first_id = match first {
            ReservationOutcome::Confirmed(booking) => booking.id,
            other => panic!("expected confirmation, got {other:?}"),
        };

        let second = saga.reserve(request_for(3)).await.unwrap();
        match second {
            ReservationOutcome::AlreadyRequested(existing) => {
                assert_eq!(existing.id, first_id)
            }
            other => panic!("expected the existing booking, got {other:?}"),
        }

        // The repeat never reached inventory: still one decrement per night.
        assert_eq!(hotel.decrements.lock().unwrap().len(), 3);
        assert_eq!(recorded_events(&ledger).len(), 1);
    }

    #[tokio::test]
    async fn concurrent_last_unit_confirms_exactly_one() {
        let hotel = Arc::new(FakeHotel::with_counts(&full_counts()));
        let ledger = Arc::new(InMemoryLedger::default());
        let saga = Arc::new(ReservationSaga::new(hotel.clone(), ledger.clone()));

        let first = tokio::spawn({
            let saga = saga.clone();
            async move { saga.reserve(request_for(3)).await }
        });
        let second = tokio::spawn({
            let saga = saga.clone();
            async move { saga.reserve(request_for(4)).await }
        });

        let results = vec![first.await.unwrap(), second.await.unwrap()];
        let confirmed = results
            .iter()
            .filter(|r| matches!(r, Ok(ReservationOutcome::Confirmed(_))))
            .count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(ServiceError::Conflict(_))))
            .count();
        assert_eq!(confirmed, 1);
        assert_eq!(conflicts, 1);

        // The loser conflicted on the first night and had nothing to return.
        assert!(hotel.restores.lock().unwrap().is_empty());
        for day in 1..=3 {
            assert_eq!(hotel.remaining(date(day)), 0);
        }
    }

    #[tokio::test]
    async fn restore_failure_does_not_stop_compensation() {
        let mut fake = FakeHotel::with_counts(&[(date(1), 1), (date(2), 1), (date(3), 0)]);
        fake.fail_restore_on = Some(date(1));
        let hotel = Arc::new(fake);
        let ledger = Arc::new(InMemoryLedger::default());
        let saga = ReservationSaga::new(hotel.clone(), ledger.clone());

        let err = saga.reserve(request_for(3)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // date(1) stayed lost but date(2) still made it back.
        assert_eq!(*hotel.restores.lock().unwrap(), vec![date(2)]);
        assert_eq!(hotel.remaining(date(1)), 0);
        assert_eq!(hotel.remaining(date(2)), 1);
        assert_eq!(ledger.statuses(), vec![STATUS_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn confirmation_failure_compensates_every_night() {
        let hotel = Arc::new(FakeHotel::with_counts(&full_counts()));
        let ledger = Arc::new(InMemoryLedger {
            fail_confirm: true,
            ..Default::default()
        });
        let saga = ReservationSaga::new(hotel.clone(), ledger.clone());

        let err = saga.reserve(request_for(3)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
        assert_eq!(
            *hotel.restores.lock().unwrap(),
            vec![date(1), date(2), date(3)]
        );
        for day in 1..=3 {
            assert_eq!(hotel.remaining(date(day)), 1);
        }
        assert_eq!(ledger.statuses(), vec![STATUS_FAILED.to_string()]);
        assert!(recorded_events(&ledger).is_empty());
    }

    fn recorded_events(ledger: &InMemoryLedger) -> Vec<BookingCreated> {
        ledger.outbox.lock().unwrap().clone()
    }
}
