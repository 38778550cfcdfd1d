//! Hotel and room read models: the queries behind the listing, search,
//! detail, and room endpoints, and the response shaping (member pricing,
//! rating join, per-day availability breakdown).

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use shared::dates::StayRange;
use shared::error::ServiceResult;
use shared::pagination::PageParams;
use uuid::Uuid;

use crate::inventory;
use crate::models::{Hotel, Room, RoomAvailability};
use crate::ratings::RatingSource;
use crate::schema::{hotels, rooms};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelView {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub price: BigDecimal,
    pub rating: f64,
    pub room_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub available_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub id: Uuid,
    pub hotel_id: i64,
    pub kind: String,
    pub guest_count: i32,
    pub available: bool,
    pub days: Vec<DayAvailability>,
}

/// Minimal hotel listing for the capacity scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelRef {
    pub id: i64,
    pub name: String,
    pub admin_id: i64,
}

/// Signed-in members see 15% off the base price.
pub fn list_price(base_price: &BigDecimal, discounted: bool) -> BigDecimal {
    if discounted {
        (base_price * &BigDecimal::from(85)) / BigDecimal::from(100)
    } else {
        base_price.clone()
    }
}

pub async fn hotel_view(hotel: &Hotel, ratings: &dyn RatingSource, discounted: bool) -> HotelView {
    let rating = ratings.average_rating(hotel.id).await.unwrap_or(0.0);
    HotelView {
        id: hotel.id,
        name: hotel.name.clone(),
        location: hotel.location.clone(),
        description: hotel.description.clone(),
        image: hotel.image.clone(),
        price: list_price(&hotel.base_price, discounted),
        rating,
        room_count: hotel.room_count,
    }
}

pub async fn hotel_views(
    hotels: &[Hotel],
    ratings: &dyn RatingSource,
    discounted: bool,
) -> Vec<HotelView> {
    let mut views = Vec::with_capacity(hotels.len());
    for hotel in hotels {
        views.push(hotel_view(hotel, ratings, discounted).await);
    }
    views
}

pub async fn hotel_page(
    conn: &mut AsyncPgConnection,
    page: PageParams,
) -> ServiceResult<(Vec<Hotel>, i64)> {
    let total: i64 = hotels::table.count().get_result(conn).await?;
    let content = hotels::table
        .order(hotels::id.asc())
        .offset(page.offset())
        .limit(page.per_page)
        .load(conn)
        .await?;
    Ok((content, total))
}

pub async fn hotel_by_id(conn: &mut AsyncPgConnection, id: i64) -> ServiceResult<Option<Hotel>> {
    Ok(hotels::table.find(id).first(conn).await.optional()?)
}

pub async fn hotels_by_location(
    conn: &mut AsyncPgConnection,
    location: &str,
) -> ServiceResult<Vec<Hotel>> {
    let pattern = format!("%{}%", location);
    Ok(hotels::table
        .filter(hotels::location.ilike(pattern))
        .order(hotels::id.asc())
        .load(conn)
        .await?)
}

/// Does the hotel have at least one room that fits the party and is open
/// for the whole range?
pub async fn hotel_has_room_for(
    conn: &mut AsyncPgConnection,
    hotel_id: i64,
    guest_count: i32,
    range: &StayRange,
) -> ServiceResult<bool> {
    let candidates: Vec<Room> = rooms::table
        .filter(rooms::hotel_id.eq(hotel_id))
        .filter(rooms::guest_count.ge(guest_count))
        .load(conn)
        .await?;

    for room in &candidates {
        if inventory::is_room_available(conn, room, range, guest_count).await? {
            return Ok(true);
        }
    }
    Ok(false)
}

pub async fn room_by_id(conn: &mut AsyncPgConnection, id: Uuid) -> ServiceResult<Option<Room>> {
    Ok(rooms::table.find(id).first(conn).await.optional()?)
}

pub async fn room_views(
    conn: &mut AsyncPgConnection,
    hotel_id: i64,
    range: Option<&StayRange>,
    guest_count: i32,
) -> ServiceResult<Vec<RoomView>> {
    let hotel_rooms: Vec<Room> = rooms::table
        .filter(rooms::hotel_id.eq(hotel_id))
        .order(rooms::id.asc())
        .load(conn)
        .await?;

    let mut views = Vec::with_capacity(hotel_rooms.len());
    for room in &hotel_rooms {
        let rows = inventory::availability_rows(conn, room.id, range).await?;
        let days = match range {
            Some(range) => daily_breakdown(range, &rows),
            None => rows
                .iter()
                .map(|row| DayAvailability {
                    date: row.date,
                    available_count: row.available_count,
                })
                .collect(),
        };
        views.push(build_room_view(room, days, range, guest_count));
    }
    Ok(views)
}

pub async fn hotel_refs(conn: &mut AsyncPgConnection) -> ServiceResult<Vec<HotelRef>> {
    let rows: Vec<(i64, String, i64)> = hotels::table
        .select((hotels::id, hotels::name, hotels::admin_id))
        .order(hotels::id.asc())
        .load(conn)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(id, name, admin_id)| HotelRef { id, name, admin_id })
        .collect())
}

/// One entry per night of the stay; nights without a stored row read as
/// zero units.
pub fn daily_breakdown(range: &StayRange, rows: &[RoomAvailability]) -> Vec<DayAvailability> {
    range
        .days()
        .map(|date| DayAvailability {
            date,
            available_count: rows
                .iter()
                .find(|row| row.date == date)
                .map(|row| row.available_count)
                .unwrap_or(0),
        })
        .collect()
}

fn build_room_view(
    room: &Room,
    days: Vec<DayAvailability>,
    range: Option<&StayRange>,
    guest_count: i32,
) -> RoomView {
    let fits = room.guest_count >= guest_count;
    let available = match range {
        Some(_) => fits && !days.is_empty() && days.iter().all(|day| day.available_count >= 1),
        None => fits,
    };
    RoomView {
        id: room.id,
        hotel_id: room.hotel_id,
        kind: room.kind.clone(),
        guest_count: room.guest_count,
        available,
        days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range() -> StayRange {
        StayRange::new(date("2024-06-01"), date("2024-06-04")).unwrap()
    }

    fn row(room_id: Uuid, date: NaiveDate, available_count: i32) -> RoomAvailability {
        RoomAvailability {
            id: Uuid::new_v4(),
            room_id,
            date,
            available_count,
        }
    }

    fn room(guest_count: i32) -> Room {
        Room {
            id: Uuid::new_v4(),
            hotel_id: 1,
            guest_count,
            kind: "standard".into(),
            created_at: None,
        }
    }

    #[test]
    fn member_price_is_85_percent_of_base() {
        let base = BigDecimal::from(200);
        assert_eq!(list_price(&base, false), BigDecimal::from(200));
        assert_eq!(
            list_price(&base, true),
            BigDecimal::from_str("170").unwrap()
        );
    }

    #[test]
    fn breakdown_fills_missing_nights_with_zero() {
        let room_id = Uuid::new_v4();
        let rows = vec![
            row(room_id, date("2024-06-01"), 3),
            row(room_id, date("2024-06-03"), 1),
        ];

        let days = daily_breakdown(&range(), &rows);
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].available_count, 3);
        assert_eq!(days[1].available_count, 0);
        assert_eq!(days[2].available_count, 1);
    }

    #[test]
    fn breakdown_excludes_check_out_day() {
        let room_id = Uuid::new_v4();
        let rows = vec![row(room_id, date("2024-06-04"), 5)];
        let days = daily_breakdown(&range(), &rows);
        assert!(days.iter().all(|d| d.date < date("2024-06-04")));
    }

    #[test]
    fn room_view_requires_fit_and_full_range() {
        let range = range();
        let the_room = room(2);
        let full = vec![
            DayAvailability {
                date: date("2024-06-01"),
                available_count: 1,
            },
            DayAvailability {
                date: date("2024-06-02"),
                available_count: 2,
            },
            DayAvailability {
                date: date("2024-06-03"),
                available_count: 1,
            },
        ];

        let view = build_room_view(&the_room, full.clone(), Some(&range), 2);
        assert!(view.available);

        let too_many_guests = build_room_view(&the_room, full.clone(), Some(&range), 3);
        assert!(!too_many_guests.available);

        let mut gap = full;
        gap[1].available_count = 0;
        let sold_out_night = build_room_view(&the_room, gap, Some(&range), 2);
        assert!(!sold_out_night.available);
    }

    #[test]
    fn room_view_without_dates_only_checks_fit() {
        let the_room = room(2);
        let view = build_room_view(&the_room, Vec::new(), None, 2);
        assert!(view.available);
        let view = build_room_view(&the_room, Vec::new(), None, 5);
        assert!(!view.available);
    }

    #[tokio::test]
    async fn unrated_hotels_read_as_zero() {
        let hotel = Hotel {
            id: 7,
            name: "Seaside".into(),
            location: "Izmir".into(),
            description: None,
            image: None,
            base_price: BigDecimal::from(100),
            room_count: 4,
            admin_id: 1,
            created_at: None,
            updated_at: None,
        };
        let view = hotel_view(&hotel, &crate::ratings::NoRatings, false).await;
        assert_eq!(view.rating, 0.0);
        assert_eq!(view.price, BigDecimal::from(100));
    }
}
