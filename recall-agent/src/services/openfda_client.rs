//! openFDA enforcement API client
//!
//! One GET per poll: `?limit=<n>&sort=<field>:desc`. The body is a JSON
//! object whose `results` array holds the raw recall items; a body without
//! `results` is an empty batch.

use async_trait::async_trait;
use recall_common::RawRecord;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("recall-agent/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl FetchError {
    /// Worth retrying on the next scheduled poll
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NetworkError(_) | FetchError::Timeout(_) => true,
            FetchError::ApiError(status, _) => *status >= 500 || *status == 429,
            FetchError::ParseError(_) => false,
        }
    }
}

/// Upstream recall source
#[async_trait]
pub trait RecallSource: Send + Sync {
    /// Newest-first batch of raw items, at most `limit` long
    async fn fetch(&self, limit: u32, sort_field: &str) -> Result<Vec<RawRecord>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct EnforcementResponse {
    #[serde(default)]
    results: Vec<RawRecord>,
}

/// Parse an enforcement response body
pub fn parse_results(body: &str) -> Result<Vec<RawRecord>, FetchError> {
    let response: EnforcementResponse =
        serde_json::from_str(body).map_err(|e| FetchError::ParseError(e.to_string()))?;
    Ok(response.results)
}

pub struct OpenFdaClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OpenFdaClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RecallSource for OpenFdaClient {
    async fn fetch(&self, limit: u32, sort_field: &str) -> Result<Vec<RawRecord>, FetchError> {
        let sort = format!("{}:desc", sort_field);
        let params = [("limit", limit.to_string()), ("sort", sort)];

        tracing::debug!(url = %self.base_url, limit, sort_field, "Fetching recalls");

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(REQUEST_TIMEOUT_SECS)
                } else {
                    FetchError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FetchError::ApiError(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;
        let results = parse_results(&body)?;

        tracing::info!(count = results.len(), "Fetched recalls");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results() {
        let body = r#"{
            "meta": {"results": {"skip": 0, "limit": 2, "total": 2}},
            "results": [
                {"recall_number": "F-1", "status": "Ongoing"},
                {"recall_number": "F-2"}
            ]
        }"#;
        let results = parse_results(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["recall_number"], "F-1");
    }

    #[test]
    fn test_missing_results_key_is_empty_batch() {
        let results = parse_results(r#"{"meta": {}}"#).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_invalid_body_is_parse_error() {
        assert!(matches!(parse_results("<html>"), Err(FetchError::ParseError(_))));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(FetchError::Timeout(10).is_retryable());
        assert!(FetchError::ApiError(503, String::new()).is_retryable());
        assert!(!FetchError::ApiError(404, String::new()).is_retryable());
        assert!(!FetchError::ParseError(String::new()).is_retryable());
    }

    #[test]
    fn test_client_creation() {
        assert!(OpenFdaClient::new("https://api.fda.gov/food/enforcement.json").is_ok());
    }
}
