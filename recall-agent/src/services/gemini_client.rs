//! Gemini summarization client
//!
//! Sends one `generateContent` request per recall with a fixed system
//! instruction and expects a bare JSON object back. Markdown code fences
//! around the JSON are tolerated and stripped.

use async_trait::async_trait;
use recall_common::config::SummarizerConfig;
use recall_common::RecallSummary;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub const SYSTEM_PROMPT: &str = r#"You are a food-safety analyst.
Given raw text from a USDA or FDA recall notice,
extract the key information and return ONLY a JSON object with these exact fields:

{
  "summary": "<2-3 sentence plain-English summary of the recall>",
  "risk_level": "<Low | Medium | High>",
  "action_steps": ["<step 1>", "<step 2>", ...],
  "who_is_affected": "<description of the population at risk>",
  "key_identifiers": ["<brand name>", "<lot number>", "<UPC>", ...]
}

Rules:
- risk_level must be exactly one of: Low, Medium, High
- action_steps must be a JSON array of short imperative sentences
- key_identifiers must be a JSON array (may be empty if none found)
- Return ONLY the JSON object, with no markdown fences and no extra text
"#;

/// Summarization errors
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("GEMINI_API_KEY is not set. Get a key at https://aistudio.google.com/app/apikey")]
    MissingApiKey,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Model returned no text")]
    EmptyResponse,

    /// The raw model output is kept for diagnosis
    #[error("Could not parse model response as JSON: {message}\n\nRaw output:\n{raw}")]
    ParseError { message: String, raw: String },
}

impl SummarizeError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SummarizeError::NetworkError(_) | SummarizeError::Timeout(_) => true,
            SummarizeError::ApiError(status, _) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Turns recall notice text into a structured summary
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<RecallSummary, SummarizeError>;
}

/// Remove a leading ``` / ```json fence and a trailing ``` fence
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest).trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

/// Parse model output into a summary
pub fn parse_summary(raw: &str) -> Result<RecallSummary, SummarizeError> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned).map_err(|e| SummarizeError::ParseError {
        message: e.to_string(),
        raw: cleaned.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Fails fast when no API key is configured
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummarizeError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(SummarizeError::MissingApiKey)?
            .to_string();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SummarizeError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Summarizer for GeminiClient {
    async fn summarize(&self, text: &str) -> Result<RecallSummary, SummarizeError> {
        let url = format!("{}/models/{}:generateContent", GEMINI_BASE_URL, self.model);
        let request = json!({
            "system_instruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("Recall notice:\n\n{}", text.trim()) }]
            }]
        });

        tracing::info!(model = %self.model, "Calling Gemini");

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SummarizeError::Timeout(REQUEST_TIMEOUT_SECS)
                } else {
                    SummarizeError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SummarizeError::ApiError(status.as_u16(), error_text));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| SummarizeError::NetworkError(format!("Unreadable response: {}", e)))?;
        let raw = body.text().ok_or(SummarizeError::EmptyResponse)?;

        let summary = parse_summary(&raw).map_err(|e| {
            tracing::error!(raw = %raw, "Gemini returned non-JSON output");
            e
        })?;

        tracing::info!(
            risk_level = summary.risk_level.map(|r| r.as_str()).unwrap_or("unknown"),
            "Gemini summarized recall"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_common::RiskLevel;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_summary_normalizes_risk_casing() {
        let raw = r#"```json
{
  "summary": "Jif peanut butter may contain Salmonella.",
  "risk_level": "HIGH",
  "action_steps": ["Do not eat the product", "Return it for a refund"],
  "who_is_affected": "Anyone who bought affected lots",
  "key_identifiers": ["Jif", "Lot 2111"]
}
```"#;
        let summary = parse_summary(raw).unwrap();
        assert_eq!(summary.risk_level, Some(RiskLevel::High));
        assert_eq!(summary.action_steps.len(), 2);
        assert_eq!(summary.key_identifiers, vec!["Jif", "Lot 2111"]);
    }

    #[test]
    fn test_parse_error_keeps_raw_text() {
        let err = parse_summary("Sorry, I cannot help with that.").unwrap_err();
        match err {
            SummarizeError::ParseError { raw, .. } => {
                assert_eq!(raw, "Sorry, I cannot help with that.")
            }
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_api_key_fails_fast() {
        let config = SummarizerConfig {
            api_key: Some("   ".to_string()),
            model: "gemini-2.0-flash".to_string(),
        };
        assert!(matches!(
            GeminiClient::new(&config),
            Err(SummarizeError::MissingApiKey)
        ));
    }

    #[test]
    fn test_response_text_joins_parts() {
        let body: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"summary\":" }, { "text": " \"x\"}" }] }
            }]
        }))
        .unwrap();
        assert_eq!(body.text().as_deref(), Some("{\"summary\": \"x\"}"));

        let empty: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(empty.text().is_none());
    }
}
