//! Types shared across the reservation platform: bus event payloads and
//! topic names, the cross-service error taxonomy, gateway identity
//! handling, stay date ranges, pagination, and database pool plumbing.

pub mod auth;
pub mod dates;
pub mod db;
pub mod error;
pub mod events;
pub mod pagination;

pub use dates::StayRange;
pub use error::{ServiceError, ServiceResult};
