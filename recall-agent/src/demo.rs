//! Helpers for the `demo-fetch` and `test-alert` commands

use recall_common::{RawRecord, Recall, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Default output file for `demo-fetch`
pub const DEFAULT_DEMO_OUT: &str = "demo/recalls_demo.json";
pub const DEFAULT_DEMO_LIMIT: u32 = 5;

const PRODUCT_COLUMN_CHARS: usize = 80;

/// Notice text of the built-in test recall
pub const SAMPLE_NOTICE: &str = "\
Product: Jif Peanut Butter (various sizes, creamy and crunchy)
Reason: Potential Salmonella contamination
Company: J.M. Smucker Co.
Recall date: May 20, 2022
Lot codes: 1274425 through 2140425 (any product with \"2111\" in the code)
Distribution: Nationwide (United States)

Consumers should not eat the recalled products and should throw them away or
return them to the store for a refund. Salmonella can cause serious illness,
especially in young children, the elderly, and people with weakened immune
systems. Symptoms include diarrhea, fever, and stomach cramps.
";

/// The built-in test recall; never stored
pub fn sample_recall() -> Recall {
    Recall::new("SAMPLE-JIF-2022")
        .with_product("Jif Peanut Butter (various sizes, creamy and crunchy)")
        .with_reason("Potential Salmonella contamination")
        .with_initiation_date("20220520")
}

/// Write a fetched batch as pretty JSON, creating parent directories
pub fn write_batch(path: &Path, batch: &[RawRecord]) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(batch)?;
    std::fs::write(path, json)?;
    Ok(path.to_path_buf())
}

fn text_field<'a>(raw: &'a RawRecord, key: &str) -> Option<&'a str> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// One line of the `demo-fetch` table, `index` is 1-based
pub fn format_row(index: usize, raw: &RawRecord) -> String {
    let recall_number = text_field(raw, "recall_number").unwrap_or("<no-recall-number>");
    let date = text_field(raw, "report_date")
        .or_else(|| text_field(raw, "recall_initiation_date"))
        .unwrap_or("");
    let product: String = text_field(raw, "product_description")
        .unwrap_or("")
        .chars()
        .take(PRODUCT_COLUMN_CHARS)
        .collect();

    format!("{:2}. {:12} | {:10} | {}", index, recall_number, date, product)
}
