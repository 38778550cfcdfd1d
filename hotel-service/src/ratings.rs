//! Rating join against the comment collaborator. Ratings are decoration
//! on hotel responses; when the collaborator is down or not configured,
//! hotels read as unrated rather than failing the request.

use async_trait::async_trait;
use shared::auth::{InternalSecret, INTERNAL_SECRET_HEADER};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait RatingSource: Send + Sync {
    async fn average_rating(&self, hotel_id: i64) -> Option<f64>;
}

/// Stand-in when no comment service is configured.
pub struct NoRatings;

#[async_trait]
impl RatingSource for NoRatings {
    async fn average_rating(&self, _hotel_id: i64) -> Option<f64> {
        None
    }
}

pub struct CommentServiceRatings {
    client: reqwest::Client,
    base_url: String,
    secret: InternalSecret,
}

impl CommentServiceRatings {
    pub fn new(base_url: String, secret: InternalSecret) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            client,
            base_url,
            secret,
        })
    }
}

#[async_trait]
impl RatingSource for CommentServiceRatings {
    async fn average_rating(&self, hotel_id: i64) -> Option<f64> {
        let url = format!(
            "{}/api/v1/comments/get_rating?hotelId={}",
            self.base_url, hotel_id
        );
        let response = self
            .client
            .get(&url)
            .header(INTERNAL_SECRET_HEADER, self.secret.expose())
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => response.json::<f64>().await.ok(),
            Ok(response) => {
                debug!(hotel_id, status = %response.status(), "rating lookup rejected");
                None
            }
            Err(err) => {
                debug!(hotel_id, "rating lookup failed: {}", err);
                None
            }
        }
    }
}
