//! Per-room, per-day availability counters. This module is the only
//! writer of `room_availability`; both mutations are single conditional
//! UPDATE statements so the non-negative invariant holds across
//! concurrent callers and across service instances.

use chrono::NaiveDate;
use diesel::dsl::sum;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use shared::dates::StayRange;
use shared::error::ServiceResult;
use uuid::Uuid;

use crate::models::{Hotel, Room, RoomAvailability};
use crate::schema::{room_availability, rooms};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub total_rooms: i64,
    pub available_rooms: i64,
}

/// True iff the room fits the party and every night in the range has at
/// least one unit left. Dates with no availability row count as sold out.
pub async fn is_room_available(
    conn: &mut AsyncPgConnection,
    room: &Room,
    range: &StayRange,
    guest_count: i32,
) -> ServiceResult<bool> {
    if room.guest_count < guest_count {
        return Ok(false);
    }

    let open_days: i64 = room_availability::table
        .filter(room_availability::room_id.eq(room.id))
        .filter(room_availability::date.ge(range.check_in()))
        .filter(room_availability::date.lt(range.check_out()))
        .filter(room_availability::available_count.ge(1))
        .count()
        .get_result(conn)
        .await?;

    Ok(open_days == range.nights())
}

pub async fn availability_rows(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
    range: Option<&StayRange>,
) -> ServiceResult<Vec<RoomAvailability>> {
    let mut query = room_availability::table
        .filter(room_availability::room_id.eq(room_id))
        .order(room_availability::date.asc())
        .into_boxed();

    if let Some(range) = range {
        query = query
            .filter(room_availability::date.ge(range.check_in()))
            .filter(room_availability::date.lt(range.check_out()));
    }

    Ok(query.load(conn).await?)
}

/// Takes one unit for one night. Returns false when nothing was left to
/// take, including when the (room, date) row does not exist.
pub async fn decrement(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
    date: NaiveDate,
) -> ServiceResult<bool> {
    let affected = diesel::update(
        room_availability::table
            .filter(room_availability::room_id.eq(room_id))
            .filter(room_availability::date.eq(date))
            .filter(room_availability::available_count.ge(1)),
    )
    .set(room_availability::available_count.eq(room_availability::available_count - 1))
    .execute(conn)
    .await?;

    Ok(affected == 1)
}

/// Gives one unit back for one night, used when a reservation is rolled
/// back. Returns false when the (room, date) row does not exist.
pub async fn restore(
    conn: &mut AsyncPgConnection,
    room_id: Uuid,
    date: NaiveDate,
) -> ServiceResult<bool> {
    let affected = diesel::update(
        room_availability::table
            .filter(room_availability::room_id.eq(room_id))
            .filter(room_availability::date.eq(date)),
    )
    .set(room_availability::available_count.eq(room_availability::available_count + 1))
    .execute(conn)
    .await?;

    Ok(affected == 1)
}

pub async fn capacity_for_date(
    conn: &mut AsyncPgConnection,
    hotel: &Hotel,
    date: NaiveDate,
) -> ServiceResult<CapacitySnapshot> {
    let available: Option<i64> = room_availability::table
        .inner_join(rooms::table)
        .filter(rooms::hotel_id.eq(hotel.id))
        .filter(room_availability::date.eq(date))
        .select(sum(room_availability::available_count))
        .first(conn)
        .await?;

    Ok(CapacitySnapshot {
        total_rooms: i64::from(hotel.room_count),
        available_rooms: available.unwrap_or(0),
    })
}
