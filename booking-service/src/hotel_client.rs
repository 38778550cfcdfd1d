//! HTTP client for the hotel service inventory endpoints.
//!
//! Availability checks are read-only and retried on transport failures.
//! Decrement and restore mutate inventory and are sent exactly once per
//! attempt; the saga owns recovery for those.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use shared::auth::{InternalSecret, INTERNAL_SECRET_HEADER};
use shared::dates::StayRange;
use shared::{ServiceError, ServiceResult};
use tracing::{debug, warn};
use uuid::Uuid;

const CHECK_RETRIES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// One unit was taken for the date.
    Applied,
    /// The date was already sold out.
    Conflict,
}

#[async_trait]
pub trait HotelApi: Send + Sync {
    async fn check_available(
        &self,
        hotel_id: i64,
        room_id: Uuid,
        range: &StayRange,
        guest_count: i32,
    ) -> ServiceResult<bool>;

    async fn decrement(&self, room_id: Uuid, date: NaiveDate) -> ServiceResult<DecrementOutcome>;

    async fn restore(&self, room_id: Uuid, date: NaiveDate) -> ServiceResult<()>;

    /// Display name for a hotel, if the hotel service can provide one.
    async fn hotel_name(&self, hotel_id: i64) -> Option<String>;
}

#[derive(Serialize)]
struct AvailabilityChange {
    date: NaiveDate,
}

#[derive(Deserialize)]
struct AvailabilityResponse {
    available: bool,
}

#[derive(Deserialize)]
struct HotelSummary {
    name: String,
}

pub struct HttpHotelApi {
    client: reqwest::Client,
    base_url: String,
    secret: InternalSecret,
    names: Cache<i64, Arc<String>>,
}

impl HttpHotelApi {
    pub fn new(base_url: String, secret: InternalSecret) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url,
            secret,
            names: Cache::builder().max_capacity(1_000).build(),
        })
    }

    async fn parse_check_response(response: reqwest::Response) -> ServiceResult<bool> {
        let status = response.status();
        if status.is_success() {
            let body: AvailabilityResponse = response
                .json()
                .await
                .map_err(|e| ServiceError::upstream(format!("malformed availability reply: {e}")))?;
            return Ok(body.available);
        }
        match status {
            reqwest::StatusCode::NOT_FOUND => Err(ServiceError::NotFound {
                resource: "hotel or room",
            }),
            reqwest::StatusCode::BAD_REQUEST => Err(ServiceError::validation(
                "hotel service rejected the availability query",
            )),
            _ => Err(ServiceError::upstream(format!(
                "availability check returned {status}"
            ))),
        }
    }
}

#[async_trait]
impl HotelApi for HttpHotelApi {
    async fn check_available(
        &self,
        hotel_id: i64,
        room_id: Uuid,
        range: &StayRange,
        guest_count: i32,
    ) -> ServiceResult<bool> {
        let url = format!(
            "{}/api/v1/hotels/{}/rooms/{}/availability?check_in={}&check_out={}&guest_count={}",
            self.base_url,
            hotel_id,
            room_id,
            range.check_in(),
            range.check_out(),
            guest_count,
        );

        let mut last_error = String::new();
        for attempt in 0..=CHECK_RETRIES {
            match self.client.get(&url).send().await {
                Ok(response) => return Self::parse_check_response(response).await,
                Err(err) => {
                    warn!(attempt, "availability check transport failure: {}", err);
                    last_error = err.to_string();
                }
            }
        }
        Err(ServiceError::upstream(format!(
            "availability check failed after {} attempts: {}",
            CHECK_RETRIES + 1,
            last_error,
        )))
    }

    async fn decrement(&self, room_id: Uuid, date: NaiveDate) -> ServiceResult<DecrementOutcome> {
        let url = format!(
            "{}/internal/rooms/{}/availability/decrement",
            self.base_url, room_id
        );
        let response = self
            .client
            .post(&url)
            .header(INTERNAL_SECRET_HEADER, self.secret.expose())
            .json(&AvailabilityChange { date })
            .send()
            .await
            .map_err(|e| ServiceError::upstream(format!("decrement call failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(DecrementOutcome::Applied)
        } else if status == reqwest::StatusCode::CONFLICT {
            Ok(DecrementOutcome::Conflict)
        } else {
            Err(ServiceError::upstream(format!(
                "decrement returned {status}"
            )))
        }
    }

    async fn restore(&self, room_id: Uuid, date: NaiveDate) -> ServiceResult<()> {
        let url = format!(
            "{}/internal/rooms/{}/availability/restore",
            self.base_url, room_id
        );
        let response = self
            .client
            .post(&url)
            .header(INTERNAL_SECRET_HEADER, self.secret.expose())
            .json(&AvailabilityChange { date })
            .send()
            .await
            .map_err(|e| ServiceError::upstream(format!("restore call failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ServiceError::upstream(format!("restore returned {status}")))
        }
    }

    async fn hotel_name(&self, hotel_id: i64) -> Option<String> {
        if let Some(name) = self.names.get(&hotel_id).await {
            return Some(name.as_ref().clone());
        }

        let url = format!("{}/api/v1/hotels/{}", self.base_url, hotel_id);
        let response = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(hotel_id, status = %response.status(), "hotel lookup failed");
                return None;
            }
            Err(err) => {
                debug!(hotel_id, "hotel lookup failed: {}", err);
                return None;
            }
        };

        let summary: HotelSummary = response.json().await.ok()?;
        self.names
            .insert(hotel_id, Arc::new(summary.name.clone()))
            .await;
        Some(summary.name)
    }
}
