//! Persistence for bookings and their outbox events.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{AsyncConnection, RunQueryDsl};
use shared::db::DbPool;
use shared::events::{BookingCreated, BOOKING_EVENTS_TOPIC};
use shared::pagination::PageParams;
use shared::{ServiceError, ServiceResult};
use uuid::Uuid;

use crate::models::{
    Booking, NewBooking, NewOutboxEvent, STATUS_CONFIRMED, STATUS_FAILED, STATUS_PENDING,
};
use crate::saga::ReservationRequest;
use crate::schema::{bookings, outbox_events};

#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// A fresh PENDING row was created for this request.
    Inserted(Booking),
    /// A pending or confirmed booking already holds this natural key.
    Duplicate(Booking),
}

#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn insert_pending(&self, request: &ReservationRequest) -> ServiceResult<InsertOutcome>;

    /// Flips the booking to CONFIRMED and stores its event in the outbox,
    /// both inside one transaction.
    async fn confirm(&self, booking_id: i64, event: &BookingCreated) -> ServiceResult<Booking>;

    async fn mark_failed(&self, booking_id: i64) -> ServiceResult<()>;
}

pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingLedger for PgLedger {
    async fn insert_pending(&self, request: &ReservationRequest) -> ServiceResult<InsertOutcome> {
        let mut conn = self.pool.get().await?;
        let new_booking = NewBooking {
            hotel_id: request.hotel_id,
            room_id: request.room_id,
            user_id: request.user_id,
            check_in: request.range.check_in(),
            check_out: request.range.check_out(),
            guest_count: request.guest_count,
            status: STATUS_PENDING.to_string(),
        };

        let inserted = diesel::insert_into(bookings::table)
            .values(&new_booking)
            .get_result::<Booking>(&mut conn)
            .await;

        match inserted {
            Ok(booking) => Ok(InsertOutcome::Inserted(booking)),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                let existing = bookings::table
                    .filter(bookings::room_id.eq(request.room_id))
                    .filter(bookings::user_id.eq(request.user_id))
                    .filter(bookings::check_in.eq(request.range.check_in()))
                    .filter(bookings::check_out.eq(request.range.check_out()))
                    .filter(bookings::status.eq_any([STATUS_PENDING, STATUS_CONFIRMED]))
                    .first::<Booking>(&mut conn)
                    .await
                    .optional()?;
                match existing {
                    Some(booking) => Ok(InsertOutcome::Duplicate(booking)),
                    // The conflicting row failed between our insert and the
                    // lookup, so the key is free again.
                    None => {
                        let booking = diesel::insert_into(bookings::table)
                            .values(&new_booking)
                            .get_result::<Booking>(&mut conn)
                            .await?;
                        Ok(InsertOutcome::Inserted(booking))
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn confirm(&self, booking_id: i64, event: &BookingCreated) -> ServiceResult<Booking> {
        let mut conn = self.pool.get().await?;
        let payload = serde_json::to_value(event).map_err(ServiceError::internal)?;
        let partition_key = event.user_id.to_string();

        let booking = conn
            .transaction::<Booking, diesel::result::Error, _>(|conn| {
                Box::pin(async move {
                    let booking = diesel::update(bookings::table.find(booking_id))
                        .set((
                            bookings::status.eq(STATUS_CONFIRMED),
                            bookings::updated_at.eq(Some(Utc::now())),
                        ))
                        .get_result::<Booking>(conn)
                        .await?;

                    let outbox_event = NewOutboxEvent {
                        id: Uuid::new_v4(),
                        topic: BOOKING_EVENTS_TOPIC.to_string(),
                        partition_key,
                        payload,
                    };
                    diesel::insert_into(outbox_events::table)
                        .values(&outbox_event)
                        .execute(conn)
                        .await?;

                    Ok(booking)
                })
            })
            .await?;
        Ok(booking)
    }

    async fn mark_failed(&self, booking_id: i64) -> ServiceResult<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(bookings::table.find(booking_id))
            .set((
                bookings::status.eq(STATUS_FAILED),
                bookings::updated_at.eq(Some(Utc::now())),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

pub async fn bookings_for_user(
    pool: &DbPool,
    user_id: i64,
    page: PageParams,
) -> ServiceResult<(Vec<Booking>, i64)> {
    let mut conn = pool.get().await?;
    let total = bookings::table
        .filter(bookings::user_id.eq(user_id))
        .count()
        .get_result::<i64>(&mut conn)
        .await?;
    let content = bookings::table
        .filter(bookings::user_id.eq(user_id))
        .order(bookings::created_at.desc())
        .offset(page.offset())
        .limit(page.per_page)
        .load::<Booking>(&mut conn)
        .await?;
    Ok((content, total))
}

pub async fn booking_by_id(pool: &DbPool, booking_id: i64) -> ServiceResult<Option<Booking>> {
    let mut conn = pool.get().await?;
    Ok(bookings::table
        .find(booking_id)
        .first::<Booking>(&mut conn)
        .await
        .optional()?)
}
