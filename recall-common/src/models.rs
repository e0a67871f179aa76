//! Recall models
//!
//! `Recall` is the canonical entity produced by the normalizer. The storage
//! surrogate identity only exists on `StoredRecall`, never on the natural
//! key path.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw item exactly as returned by the upstream recall source
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Canonical recall entity, keyed by `recall_number`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recall {
    pub recall_number: String,
    #[serde(default)]
    pub reason_for_recall: Option<String>,
    #[serde(default)]
    pub product_description: Option<String>,
    /// Source-provided date string, not parsed
    #[serde(default)]
    pub recall_initiation_date: Option<String>,
}

impl Recall {
    pub fn new(recall_number: impl Into<String>) -> Self {
        Self {
            recall_number: recall_number.into(),
            reason_for_recall: None,
            product_description: None,
            recall_initiation_date: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason_for_recall = Some(reason.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product_description = Some(product.into());
        self
    }

    pub fn with_initiation_date(mut self, date: impl Into<String>) -> Self {
        self.recall_initiation_date = Some(date.into());
        self
    }

    /// Plain-text rendering fed to the summarizer
    pub fn notice_text(&self) -> String {
        let mut text = format!("Recall number: {}\n", self.recall_number);
        if let Some(product) = &self.product_description {
            text.push_str(&format!("Product: {}\n", product));
        }
        if let Some(reason) = &self.reason_for_recall {
            text.push_str(&format!("Reason: {}\n", reason));
        }
        if let Some(date) = &self.recall_initiation_date {
            text.push_str(&format!("Recall date: {}\n", date));
        }
        text
    }
}

/// Surrogate identity assigned by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordId {
    /// Auto-increment row id (relational backend)
    Row(i64),
    /// Document id (document backend)
    Document(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Row(id) => write!(f, "row:{}", id),
            RecordId::Document(id) => write!(f, "doc:{}", id),
        }
    }
}

/// A recall as persisted by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecall {
    pub id: RecordId,
    pub recall: Recall,
}

/// Risk classification returned by the summarizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = crate::Error;

    /// Case-insensitive, so "HIGH", "high" and "High" all parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown risk level: {}",
                other
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for RiskLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Unknown risk strings become `None` instead of failing the whole summary
fn lenient_risk_level<'de, D>(deserializer: D) -> Result<Option<RiskLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value.parse::<RiskLevel>() {
        Ok(level) => Some(level),
        Err(_) => {
            tracing::warn!(risk_level = %value, "Ignoring unrecognized risk level");
            None
        }
    }))
}

/// Structured summary produced by the language model
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecallSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_risk_level")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub action_steps: Vec<String>,
    #[serde(default)]
    pub who_is_affected: String,
    #[serde(default)]
    pub key_identifiers: Vec<String>,
}

/// Human-readable alert, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}
