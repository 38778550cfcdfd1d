use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use shared::events::NotificationPush;

pub const KIND_BOOKING: &str = "booking";
pub const KIND_CAPACITY: &str = "capacity";

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::notifications)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub kind: String,
    pub source_key: String,
    pub seen: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn push_event(&self) -> NotificationPush {
        NotificationPush {
            notification_id: self.id,
            user_id: self.user_id,
            message: self.message.clone(),
            kind: self.kind.clone(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::notifications)]
pub struct NewNotification {
    pub user_id: i64,
    pub message: String,
    pub kind: String,
    pub source_key: String,
}
