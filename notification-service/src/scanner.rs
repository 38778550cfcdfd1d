//! Daily capacity sweep.
//!
//! Looks one window ahead (30 days by default), asks the hotel service
//! how much inventory each hotel still has for that date, and raises a
//! capacity event for every hotel running low. The event's dedup key
//! includes the run date, so one sweep per day means at most one warning
//! per hotel per day.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use shared::auth::{InternalSecret, INTERNAL_SECRET_HEADER};
use shared::events::{LowCapacityWarning, CAPACITY_EVENTS_TOPIC};
use shared::{ServiceError, ServiceResult};
use tokio::time;
use tracing::{error, info, warn};

use crate::publisher::EventPublisher;

#[derive(Debug, Clone, Deserialize)]
pub struct ManagedHotel {
    pub id: i64,
    pub name: String,
    pub admin_id: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CapacitySnapshot {
    pub total_rooms: i64,
    pub available_rooms: i64,
}

#[async_trait]
pub trait HotelDirectory: Send + Sync {
    async fn hotels(&self) -> ServiceResult<Vec<ManagedHotel>>;
    async fn capacity(&self, hotel_id: i64, date: NaiveDate) -> ServiceResult<CapacitySnapshot>;
}

pub struct HttpHotelDirectory {
    client: reqwest::Client,
    base_url: String,
    secret: InternalSecret,
}

impl HttpHotelDirectory {
    pub fn new(base_url: String, secret: InternalSecret) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url,
            secret,
        })
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: String) -> ServiceResult<T> {
        let response = self
            .client
            .get(&url)
            .header(INTERNAL_SECRET_HEADER, self.secret.expose())
            .send()
            .await
            .map_err(|e| ServiceError::upstream(format!("hotel directory call failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::upstream(format!(
                "hotel directory returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ServiceError::upstream(format!("malformed hotel directory reply: {e}")))
    }
}

#[async_trait]
impl HotelDirectory for HttpHotelDirectory {
    async fn hotels(&self) -> ServiceResult<Vec<ManagedHotel>> {
        self.fetch(format!("{}/internal/hotels", self.base_url))
            .await
    }

    async fn capacity(&self, hotel_id: i64, date: NaiveDate) -> ServiceResult<CapacitySnapshot> {
        self.fetch(format!(
            "{}/internal/hotels/{}/capacity?date={}",
            self.base_url, hotel_id, date
        ))
        .await
    }
}

pub struct LowCapacityScanner {
    directory: Arc<dyn HotelDirectory>,
    publisher: Arc<dyn EventPublisher>,
    look_ahead_days: i64,
    threshold_pct: u32,
}

impl LowCapacityScanner {
    pub fn new(
        directory: Arc<dyn HotelDirectory>,
        publisher: Arc<dyn EventPublisher>,
        look_ahead_days: i64,
        threshold_pct: u32,
    ) -> Self {
        Self {
            directory,
            publisher,
            look_ahead_days,
            threshold_pct,
        }
    }

    pub async fn run(&self, interval_secs: u64) {
        let mut interval = time::interval(Duration::from_secs(interval_secs));

        loop {
            interval.tick().await;
            let today = Utc::now().date_naive();
            if let Err(e) = self.sweep(today).await {
                error!("Capacity sweep failed: {}", e);
            }
        }
    }

    /// One pass over every hotel. A hotel that cannot be inspected is
    /// skipped so the rest of the sweep still runs.
    pub async fn sweep(&self, today: NaiveDate) -> ServiceResult<()> {
        let target = today + chrono::Duration::days(self.look_ahead_days);
        let hotels = self.directory.hotels().await?;
        info!(hotels = hotels.len(), %target, "scanning hotel capacity");

        for hotel in hotels {
            if let Err(e) = self.inspect(&hotel, target, today).await {
                warn!(hotel_id = hotel.id, "skipping hotel in capacity sweep: {}", e);
            }
        }
        Ok(())
    }

    async fn inspect(
        &self,
        hotel: &ManagedHotel,
        target: NaiveDate,
        today: NaiveDate,
    ) -> ServiceResult<()> {
        let capacity = self.directory.capacity(hotel.id, target).await?;
        if capacity.total_rooms == 0 {
            return Ok(());
        }
        // Sitting exactly at the threshold does not warn.
        if capacity.available_rooms * 100 >= i64::from(self.threshold_pct) * capacity.total_rooms {
            return Ok(());
        }

        let warning = LowCapacityWarning {
            hotel_id: hotel.id,
            hotel_name: hotel.name.clone(),
            admin_user_id: hotel.admin_id,
            threshold_date: target,
            threshold_pct: self.threshold_pct,
            remaining_capacity: capacity.available_rooms,
            run_date: today,
        };
        let payload = serde_json::to_string(&warning).map_err(ServiceError::internal)?;
        self.publisher
            .publish(
                CAPACITY_EVENTS_TOPIC,
                &warning.admin_user_id.to_string(),
                &payload,
            )
            .await?;
        info!(
            hotel_id = hotel.id,
            remaining = capacity.available_rooms,
            "low capacity warning published"
        );
        Ok(())
    }
}
