use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::hotels)]
pub struct Hotel {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub base_price: bigdecimal::BigDecimal,
    pub room_count: i32,
    pub admin_id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::rooms)]
pub struct Room {
    pub id: Uuid,
    pub hotel_id: i64,
    pub guest_count: i32,
    pub kind: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::room_availability)]
pub struct RoomAvailability {
    pub id: Uuid,
    pub room_id: Uuid,
    pub date: NaiveDate,
    pub available_count: i32,
}
