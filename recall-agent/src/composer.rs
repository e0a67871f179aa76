//! Alert composer
//!
//! Pure formatting: a recall plus an optional model summary becomes a
//! subject/body pair. No I/O.

use recall_common::{Alert, Recall, RecallSummary};

const HEADER: &str = "RecallAlert — Food Recall Alert";
const FOOTER: &str = "---\nThis is an automated alert from RecallAlert AI.";

/// Subject line, with the risk level when it is known
pub fn subject(summary: Option<&RecallSummary>) -> String {
    match summary.and_then(|s| s.risk_level) {
        Some(level) => format!("[RecallAlert] {} Risk — Food Recall Notice", level),
        None => "[RecallAlert] Food Recall Notice".to_string(),
    }
}

/// Build the alert for one newly stored recall
pub fn compose(recall: &Recall, summary: Option<&RecallSummary>) -> Alert {
    let body = match summary {
        Some(summary) => summary_body(recall, summary),
        None => fallback_body(recall),
    };

    Alert {
        subject: subject(summary),
        body,
    }
}

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}

fn summary_body(recall: &Recall, summary: &RecallSummary) -> String {
    let identifiers = if summary.key_identifiers.is_empty() {
        "N/A".to_string()
    } else {
        summary.key_identifiers.join(", ")
    };
    let risk = summary.risk_level.map(|r| r.as_str()).unwrap_or("N/A");

    let steps = if summary.action_steps.is_empty() {
        "  • N/A\n".to_string()
    } else {
        summary
            .action_steps
            .iter()
            .map(|step| format!("  • {}\n", step))
            .collect()
    };

    let mut body = format!("{}\n\n", HEADER);
    body.push_str(&format!("Recall number:   {}\n", recall.recall_number));
    body.push_str(&format!("Summary:         {}\n", or_na(&summary.summary)));
    body.push_str(&format!("Risk level:      {}\n", risk));
    body.push_str(&format!("Who is affected: {}\n", or_na(&summary.who_is_affected)));
    body.push_str(&format!("Key identifiers: {}\n\n", identifiers));
    body.push_str("What you should do:\n");
    body.push_str(&steps);
    body.push('\n');
    body.push_str(FOOTER);
    body.push('\n');
    body
}

fn fallback_body(recall: &Recall) -> String {
    let product = recall.product_description.as_deref().unwrap_or("");
    let reason = recall.reason_for_recall.as_deref().unwrap_or("");

    let mut body = format!("{}\n\n", HEADER);
    body.push_str(&format!("Recall number: {}\n", recall.recall_number));
    body.push_str(&format!("Product:       {}\n", product));
    body.push_str(&format!("Reason:        {}\n", reason));
    if let Some(date) = &recall.recall_initiation_date {
        body.push_str(&format!("Initiated:     {}\n", date));
    }
    body.push('\n');
    body.push_str(FOOTER);
    body.push('\n');
    body
}
