//! Record normalizer
//!
//! Maps one raw upstream item onto the canonical [`Recall`]. Never fails on
//! missing optional fields; only a missing natural key is a rejection.

use recall_common::{RawRecord, Recall};
use serde_json::Value;
use thiserror::Error;

/// Why a raw item could not become a `Recall`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("record has no recall_number")]
    MissingRecallNumber,
}

/// Normalize a raw record
///
/// Strings are trimmed; numbers and booleans are rendered as text; null,
/// blank and nested values count as absent.
pub fn normalize(raw: &RawRecord) -> Result<Recall, Rejection> {
    let recall_number = field(raw, "recall_number").ok_or(Rejection::MissingRecallNumber)?;

    Ok(Recall {
        recall_number,
        reason_for_recall: field(raw, "reason_for_recall"),
        product_description: field(raw, "product_description"),
        recall_initiation_date: field(raw, "recall_initiation_date"),
    })
}

fn field(raw: &RawRecord, key: &str) -> Option<String> {
    let text = match raw.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
