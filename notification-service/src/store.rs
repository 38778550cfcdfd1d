//! Notification persistence. `source_key` is unique, so re-delivered
//! events collapse into the row already written for them.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::db::DbPool;
use shared::pagination::PageParams;
use shared::ServiceResult;

use crate::models::{NewNotification, Notification};
use crate::schema::notifications;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts the notification unless its source key was already
    /// recorded. Returns `None` for a duplicate.
    async fn insert_unique(&self, new: NewNotification) -> ServiceResult<Option<Notification>>;
}

pub struct PgNotificationStore {
    pool: DbPool,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert_unique(&self, new: NewNotification) -> ServiceResult<Option<Notification>> {
        let mut conn = self.pool.get().await?;
        let inserted = diesel::insert_into(notifications::table)
            .values(&new)
            .on_conflict(notifications::source_key)
            .do_nothing()
            .get_result::<Notification>(&mut conn)
            .await
            .optional()?;
        Ok(inserted)
    }
}

pub async fn notifications_for_user(
    pool: &DbPool,
    user_id: i64,
    page: PageParams,
) -> ServiceResult<(Vec<Notification>, i64)> {
    let mut conn = pool.get().await?;
    let total = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .count()
        .get_result::<i64>(&mut conn)
        .await?;
    let content = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order(notifications::created_at.desc())
        .offset(page.offset())
        .limit(page.per_page)
        .load::<Notification>(&mut conn)
        .await?;
    Ok((content, total))
}

pub async fn unseen_count(pool: &DbPool, user_id: i64) -> ServiceResult<i64> {
    let mut conn = pool.get().await?;
    Ok(notifications::table
        .filter(notifications::user_id.eq(user_id))
        .filter(notifications::seen.eq(false))
        .count()
        .get_result::<i64>(&mut conn)
        .await?)
}

/// Marks one notification seen. Returns false when no row matches both
/// the id and the owner.
pub async fn mark_seen(pool: &DbPool, user_id: i64, notification_id: i64) -> ServiceResult<bool> {
    let mut conn = pool.get().await?;
    let affected = diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::user_id.eq(user_id)),
    )
    .set(notifications::seen.eq(true))
    .execute(&mut conn)
    .await?;
    Ok(affected == 1)
}

pub async fn mark_all_seen(pool: &DbPool, user_id: i64) -> ServiceResult<usize> {
    let mut conn = pool.get().await?;
    Ok(diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::seen.eq(false)),
    )
    .set(notifications::seen.eq(true))
    .execute(&mut conn)
    .await?)
}
