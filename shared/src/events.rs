//! Payloads carried on the shared event bus, plus the topics they travel on.
//!
//! `BookingCreated` is written to the booking outbox at confirmation time
//! and re-published verbatim on retry, so every field must be derivable
//! from the booking row alone.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Confirmed reservations, published by the booking outbox processor.
/// Messages are keyed by user id so per-user ordering is preserved.
pub const BOOKING_EVENTS_TOPIC: &str = "booking-events";

/// Low-capacity warnings raised by the daily scanner, keyed by admin user id.
pub const CAPACITY_EVENTS_TOPIC: &str = "capacity-events";

/// Fan-out of freshly persisted notifications. Every service instance
/// subscribes with its own consumer group so each one can deliver to the
/// live sessions it holds locally.
pub const NOTIFICATION_PUSH_TOPIC: &str = "notification-push";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCreated {
    pub booking_id: i64,
    pub hotel_id: i64,
    pub room_id: Uuid,
    pub user_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: i32,
}

impl BookingCreated {
    /// Consumer-side dedup key; duplicate deliveries of the same booking
    /// collapse into a single notification row.
    pub fn source_key(&self) -> String {
        format!("booking:{}", self.booking_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowCapacityWarning {
    pub hotel_id: i64,
    pub hotel_name: String,
    pub admin_user_id: i64,
    pub threshold_date: NaiveDate,
    pub threshold_pct: u32,
    pub remaining_capacity: i64,
    /// Day the scanner produced this warning. Part of the dedup key, so a
    /// repeated sweep on the same day cannot double-notify an admin.
    pub run_date: NaiveDate,
}

impl LowCapacityWarning {
    pub fn source_key(&self) -> String {
        format!(
            "capacity:{}:{}:{}:{}",
            self.hotel_id, self.threshold_date, self.threshold_pct, self.run_date
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPush {
    pub notification_id: i64,
    pub user_id: i64,
    pub message: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}
