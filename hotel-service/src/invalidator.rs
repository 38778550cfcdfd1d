//! Keeps this instance's query cache coherent with bookings confirmed by
//! the booking service. Every instance subscribes to the booking events
//! topic under its own consumer group, so all of them see every event.

use std::sync::Arc;

use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use shared::events::BookingCreated;
use tracing::{error, info, warn};

use crate::cache::QueryCache;

pub struct CacheInvalidator {
    cache: Arc<QueryCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    if let Some(Ok(payload)) = m.payload_view::<str>() {
                        self.handle_payload(payload).await;
                    }
                    if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                        error!("Error committing booking event: {}", e);
                    }
                }
                Err(e) => error!("Error receiving booking event: {}", e),
            }
        }
    }

    async fn handle_payload(&self, payload: &str) {
        match serde_json::from_str::<BookingCreated>(payload) {
            Ok(event) => {
                info!(
                    hotel_id = event.hotel_id,
                    booking_id = event.booking_id,
                    "evicting cached queries after remote booking"
                );
                self.cache.invalidate_hotel(event.hotel_id).await;
            }
            Err(e) => warn!("Skipping malformed booking event: {}", e),
        }
    }
}
