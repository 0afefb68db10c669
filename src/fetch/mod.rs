//! Remote fetch boundary.
//!
//! The scheduler talks to the backend through the `AssetFetcher` trait so
//! the transport can be swapped out (and mocked in tests). `HttpFetcher`
//! is the production implementation.
//!
//! Every `FetchError` is treated uniformly as a transient failure by the
//! scheduler's retry policy; the variants exist for logging and for the
//! host application's error surfaces.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::PriceUpdate;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => FetchError::Unauthorized,
            429 => FetchError::RateLimited,
            500..=599 => FetchError::ServerError(truncated),
            _ => FetchError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

/// The remote data source for asset collections and price quotes.
///
/// Raw collection records are returned as loose JSON: the backend may send
/// partial or malformed entries, and normalization is the caller's job.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch_asset_collection(&self) -> Result<Vec<Value>, FetchError>;
    async fn fetch_prices_for(&self, symbols: &[String]) -> Result<Vec<PriceUpdate>, FetchError>;
}
