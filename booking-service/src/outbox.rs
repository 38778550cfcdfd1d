//! Background publisher for outbox events.
//!
//! Events are written in the same transaction as the booking they describe
//! and drained here on an interval. A publish failure leaves the row
//! unprocessed so the next sweep retries it; the payload is never rebuilt
//! at publish time.

use anyhow::Result;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::db::DbPool;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

use crate::models::OutboxEvent;
use crate::schema::outbox_events;

pub struct OutboxProcessor {
    pool: DbPool,
    producer: FutureProducer,
}

impl OutboxProcessor {
    pub fn new(pool: DbPool, producer: FutureProducer) -> Self {
        Self { pool, producer }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;

            if let Err(e) = self.drain_pending().await {
                error!("Error draining outbox events: {}", e);
            }
        }
    }

    async fn drain_pending(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let pending = outbox_events::table
            .filter(outbox_events::processed.eq(false))
            .order(outbox_events::created_at.asc())
            .limit(100)
            .load::<OutboxEvent>(&mut conn)
            .await?;

        for event in pending {
            if let Err(e) = self.publish(&event).await {
                error!("Failed to publish outbox event {}: {}", event.id, e);
                continue;
            }

            diesel::update(outbox_events::table.filter(outbox_events::id.eq(event.id)))
                .set(outbox_events::processed.eq(true))
                .execute(&mut conn)
                .await?;

            info!("Published outbox event: {}", event.id);
        }

        Ok(())
    }

    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        let json = serde_json::to_string(&event.payload)?;
        let record = FutureRecord::to(&event.topic)
            .payload(&json)
            .key(&event.partition_key);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish event: {}", e))?;

        Ok(())
    }
}
