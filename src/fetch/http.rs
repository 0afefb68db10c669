//! HTTP implementation of the asset fetch boundary.
//!
//! Thin wrapper over the backend REST API: one endpoint for the full
//! holdings collection, one per-symbol quote endpoint fanned out with
//! bounded concurrency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::models::PriceUpdate;

use super::{AssetFetcher, FetchError};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum concurrent per-symbol quote requests.
/// Limits parallel requests to avoid overwhelming the server or hitting
/// rate limits.
const MAX_CONCURRENT_QUOTE_REQUESTS: usize = 5;

/// Per-symbol quote wire shape. Fields the backend omits are filled in
/// from the request context.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    symbol: Option<String>,
    price: f64,
    #[serde(rename = "dailyChange", default)]
    daily_change: f64,
    #[serde(rename = "dailyChangePercent", default)]
    daily_change_percent: f64,
    #[serde(rename = "asOf")]
    as_of: Option<DateTime<Utc>>,
}

/// HTTP client for the holdings backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    token: Option<Arc<String>>,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: impl Into<Arc<String>>) {
        self.token = Some(token.into());
    }

    /// Create a new fetcher with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<Arc<String>>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.get(&url).header(header::ACCEPT, "application/json");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch_asset_collection(&self) -> Result<Vec<Value>, FetchError> {
        let assets: Vec<Value> = self.get_json("/v1/assets").await?;
        debug!(count = assets.len(), "Asset collection fetched");
        Ok(assets)
    }

    async fn fetch_prices_for(&self, symbols: &[String]) -> Result<Vec<PriceUpdate>, FetchError> {
        let results: Vec<(String, Result<QuoteResponse, FetchError>)> = stream::iter(
            symbols.iter().cloned().collect::<Vec<String>>(),
        )
            .map(|symbol| {
                let fetcher = self.clone();
                async move {
                    let result = fetcher
                        .get_json::<QuoteResponse>(&format!("/v1/prices/{}", symbol))
                        .await;
                    (symbol, result)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_QUOTE_REQUESTS)
            .collect()
            .await;

        let mut updates = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (requested, result) in results {
            match result {
                Ok(quote) => updates.push(PriceUpdate {
                    symbol: quote.symbol.unwrap_or(requested),
                    price: quote.price,
                    daily_change: quote.daily_change,
                    daily_change_percent: quote.daily_change_percent,
                    as_of: quote.as_of.unwrap_or_else(Utc::now),
                }),
                Err(e) => {
                    debug!(symbol = %requested, error = %e, "Quote fetch failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        // Partial results are still useful; fail only when nothing came back.
        match (updates.is_empty(), first_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(updates),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_response_fills_defaults() {
        let json = r#"{"price": 101.5}"#;
        let quote: QuoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(quote.price, 101.5);
        assert_eq!(quote.daily_change, 0.0);
        assert_eq!(quote.daily_change_percent, 0.0);
        assert!(quote.symbol.is_none());
        assert!(quote.as_of.is_none());
    }

    #[test]
    fn test_fetcher_construction_and_token_sharing() {
        let base = HttpFetcher::new("https://api.example.com").unwrap();
        let with_token = base.with_token("secret".to_string());
        assert!(with_token.token.is_some());
        assert!(base.token.is_none());
    }
}
