//! Gateway identity headers and the internal-call shared secret.
//!
//! Services sit behind a gateway that authenticates users and forwards
//! the resolved identity in headers. Service-to-service calls skip the
//! gateway and authenticate with a shared secret header instead.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::ServiceError;

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";
pub const USER_ID_HEADER: &str = "x-user-userid";
pub const USERNAME_HEADER: &str = "x-user";
pub const ROLE_HEADER: &str = "x-user-role";

/// The gateway-authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: Option<String>,
    pub role: Option<String>,
}

pub fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let user_id = headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .parse::<i64>()
        .ok()?;
    let username = headers
        .get(USERNAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let role = headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    Some(Identity {
        user_id,
        username,
        role,
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers).ok_or(ServiceError::Unauthenticated)
    }
}

/// Shared secret expected on internal endpoints.
#[derive(Clone)]
pub struct InternalSecret(Arc<String>);

impl InternalSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::new(secret.into()))
    }

    pub fn verify(&self, headers: &HeaderMap) -> bool {
        headers
            .get(INTERNAL_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == self.0.as_str())
            .unwrap_or(false)
    }

    /// The secret value, for attaching to outbound internal requests.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

/// Middleware guarding `/internal` routes.
pub async fn require_internal_secret(
    State(secret): State<InternalSecret>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    if !secret.verify(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "internal call with missing or bad secret");
        return Err(ServiceError::Forbidden);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn parses_a_full_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("17"));
        headers.insert(USERNAME_HEADER, HeaderValue::from_static("alice"));
        headers.insert(ROLE_HEADER, HeaderValue::from_static("ADMIN"));

        let identity = identity_from_headers(&headers).unwrap();
        assert_eq!(identity.user_id, 17);
        assert_eq!(identity.username.as_deref(), Some("alice"));
        assert_eq!(identity.role.as_deref(), Some("ADMIN"));
    }

    #[test]
    fn missing_user_id_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert(USERNAME_HEADER, HeaderValue::from_static("alice"));
        assert!(identity_from_headers(&headers).is_none());
    }

    #[test]
    fn non_numeric_user_id_yields_none() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("nope"));
        assert!(identity_from_headers(&headers).is_none());
    }

    #[test]
    fn secret_verification() {
        let secret = InternalSecret::new("s3cret");
        let mut headers = HeaderMap::new();
        assert!(!secret.verify(&headers));

        headers.insert(INTERNAL_SECRET_HEADER, HeaderValue::from_static("wrong"));
        assert!(!secret.verify(&headers));

        headers.insert(INTERNAL_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(secret.verify(&headers));
    }
}
