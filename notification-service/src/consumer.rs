//! Durable consumer that turns bus events into notification rows.
//!
//! Delivery is at-least-once: the offset is committed only after the row
//! is durable, and `source_key` uniqueness collapses re-deliveries into
//! the row already written. Malformed payloads are committed and skipped,
//! since re-delivery cannot repair them.

use std::sync::Arc;

use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use shared::events::{
    BookingCreated, LowCapacityWarning, BOOKING_EVENTS_TOPIC, CAPACITY_EVENTS_TOPIC,
    NOTIFICATION_PUSH_TOPIC,
};
use shared::{ServiceError, ServiceResult};
use tracing::{debug, error, info, warn};

use crate::models::{NewNotification, KIND_BOOKING, KIND_CAPACITY};
use crate::publisher::EventPublisher;
use crate::store::NotificationStore;

pub struct EventConsumer {
    store: Arc<dyn NotificationStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl EventConsumer {
    pub fn new(store: Arc<dyn NotificationStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    let handled = match m.payload_view::<str>() {
                        Some(Ok(payload)) => match self.handle_message(m.topic(), payload).await {
                            Ok(()) => true,
                            Err(e) => {
                                error!("Failed to handle {} event: {}", m.topic(), e);
                                false
                            }
                        },
                        _ => {
                            warn!("Skipping unreadable payload on {}", m.topic());
                            true
                        }
                    };
                    if handled {
                        if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                            error!("Error committing event: {}", e);
                        }
                    }
                }
                Err(e) => error!("Error receiving event: {}", e),
            }
        }
    }

    pub async fn handle_message(&self, topic: &str, payload: &str) -> ServiceResult<()> {
        let notification = match topic {
            t if t == BOOKING_EVENTS_TOPIC => {
                match serde_json::from_str::<BookingCreated>(payload) {
                    Ok(event) => booking_notification(&event),
                    Err(e) => {
                        warn!("Skipping malformed booking event: {}", e);
                        return Ok(());
                    }
                }
            }
            t if t == CAPACITY_EVENTS_TOPIC => {
                match serde_json::from_str::<LowCapacityWarning>(payload) {
                    Ok(event) => capacity_notification(&event),
                    Err(e) => {
                        warn!("Skipping malformed capacity event: {}", e);
                        return Ok(());
                    }
                }
            }
            other => {
                warn!("Message from unexpected topic: {}", other);
                return Ok(());
            }
        };
        self.record(notification).await
    }

    async fn record(&self, new: NewNotification) -> ServiceResult<()> {
        let notification = match self.store.insert_unique(new).await? {
            Some(notification) => notification,
            None => {
                debug!("Duplicate event ignored");
                return Ok(());
            }
        };
        info!(
            notification_id = notification.id,
            user_id = notification.user_id,
            "notification recorded"
        );

        let push = notification.push_event();
        let payload = serde_json::to_string(&push).map_err(ServiceError::internal)?;
        self.publisher
            .publish(NOTIFICATION_PUSH_TOPIC, &push.user_id.to_string(), &payload)
            .await
    }
}

fn booking_notification(event: &BookingCreated) -> NewNotification {
    let nights = (event.check_out - event.check_in).num_days();
    NewNotification {
        user_id: event.user_id,
        message: format!(
            "Your reservation #{} is confirmed: {} night(s) from {} to {}.",
            event.booking_id, nights, event.check_in, event.check_out
        ),
        kind: KIND_BOOKING.to_string(),
        source_key: event.source_key(),
    }
}

fn capacity_notification(event: &LowCapacityWarning) -> NewNotification {
    NewNotification {
        user_id: event.admin_user_id,
        message: format!(
            "Low availability at {}: {} room(s) left for {} (under {}%).",
            event.hotel_name, event.remaining_capacity, event.threshold_date, event.threshold_pct
        ),
        kind: KIND_CAPACITY.to_string(),
        source_key: event.source_key(),
    }
}
