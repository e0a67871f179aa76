//! End-to-end poll cycles with in-process collaborators

mod helpers;

use helpers::{
    raw, recording_dispatcher, recording_dispatcher_with, sms_config, smtp_config,
    BrokenSummarizer, FailingSource, FixedSummarizer, MemoryCollection, RecordingMailer,
    StubSource,
};
use recall_agent::notify::Channel;
use recall_agent::services::Summarizer;
use recall_agent::store::{DocumentBackend, RelationalBackend};
use recall_agent::{DedupStore, PollDriver, PollError, PollReport};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn batch_with_duplicate_and_reject() -> Vec<recall_common::RawRecord> {
    vec![
        raw(json!({
            "recall_number": "R-100",
            "product_description": "Creamy peanut butter, 16 oz",
            "reason_for_recall": "Salmonella",
            "recall_initiation_date": "20240105"
        })),
        raw(json!({
            "recall_number": "R-100",
            "product_description": "Creamy peanut butter, 16 oz",
            "reason_for_recall": "Salmonella"
        })),
        raw(json!({
            "product_description": "Item without a recall number",
            "reason_for_recall": "Undeclared milk"
        })),
    ]
}

fn email() -> Channel {
    Channel::Email {
        to: "ops@example.com".to_string(),
    }
}

fn document_store() -> (DedupStore, Arc<MemoryCollection>) {
    let collection = Arc::new(MemoryCollection::default());
    let store = DedupStore::new(Box::new(DocumentBackend::new(collection.clone())));
    (store, collection)
}

#[tokio::test]
async fn test_batch_stores_and_alerts_once() {
    let source = StubSource::new(batch_with_duplicate_and_reject());
    let (store, collection) = document_store();
    let (dispatcher, mailer, _) = recording_dispatcher(smtp_config(), sms_config());

    let report = PollDriver::new(&source, &store, &dispatcher, email())
        .with_dry_run(false)
        .run_once()
        .await
        .unwrap();

    assert_eq!(
        report,
        PollReport {
            fetched: 3,
            rejected: 1,
            newly_saved: 1,
            already_seen: 1,
            dispatched: 1,
            delivery_failures: 0,
        }
    );
    assert_eq!(collection.len(), 1);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("R-100"));
    assert!(sent[0].body.contains("Creamy peanut butter, 16 oz"));
}

#[tokio::test]
async fn test_second_cycle_alerts_nothing_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("recalls.db").display());
    let store = DedupStore::new(Box::new(RelationalBackend::connect(&url).await.unwrap()));
    let source = StubSource::new(batch_with_duplicate_and_reject());
    let (dispatcher, mailer, _) = recording_dispatcher(smtp_config(), sms_config());
    let driver = PollDriver::new(&source, &store, &dispatcher, email()).with_dry_run(false);

    let first = driver.run_once().await.unwrap();
    let second = driver.run_once().await.unwrap();

    assert_eq!(first.newly_saved, 1);
    assert_eq!(second.newly_saved, 0);
    assert_eq!(second.already_seen, 2);
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(store.recall_numbers().await.unwrap(), vec!["R-100"]);
}

#[tokio::test]
async fn test_dry_run_cycle_still_stores() {
    let source = StubSource::new(batch_with_duplicate_and_reject());
    let (store, collection) = document_store();
    let (dispatcher, mailer, _) = recording_dispatcher(smtp_config(), sms_config());

    let report = PollDriver::new(&source, &store, &dispatcher, email())
        .with_dry_run(true)
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.dispatched, 1);
    assert_eq!(collection.len(), 1);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_fetch_failure_aborts_cycle() {
    let (store, collection) = document_store();
    let (dispatcher, mailer, _) = recording_dispatcher(smtp_config(), sms_config());

    let err = PollDriver::new(&FailingSource, &store, &dispatcher, email())
        .run_once()
        .await
        .unwrap_err();

    assert!(matches!(err, PollError::Fetch(ref e) if e.is_retryable()));
    assert_eq!(collection.len(), 0);
    assert!(mailer.sent().is_empty());
}

#[tokio::test]
async fn test_summary_shapes_the_alert() {
    let source = StubSource::new(batch_with_duplicate_and_reject());
    let (store, _) = document_store();
    let (dispatcher, mailer, _) = recording_dispatcher(smtp_config(), sms_config());
    let summarizer = FixedSummarizer;

    PollDriver::new(&source, &store, &dispatcher, email())
        .with_summarizer(Some(&summarizer as &dyn Summarizer))
        .with_dry_run(false)
        .run_once()
        .await
        .unwrap();

    let sent = mailer.sent();
    assert_eq!(sent[0].subject, "[RecallAlert] High Risk — Food Recall Notice");
    assert!(sent[0].body.contains("  • Do not eat it"));
}

#[tokio::test]
async fn test_summarizer_failure_falls_back_to_plain_alert() {
    let source = StubSource::new(batch_with_duplicate_and_reject());
    let (store, _) = document_store();
    let (dispatcher, mailer, _) = recording_dispatcher(smtp_config(), sms_config());
    let summarizer = BrokenSummarizer;

    let report = PollDriver::new(&source, &store, &dispatcher, email())
        .with_summarizer(Some(&summarizer as &dyn Summarizer))
        .with_dry_run(false)
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.dispatched, 1);
    let sent = mailer.sent();
    assert_eq!(sent[0].subject, "[RecallAlert] Food Recall Notice");
    assert!(sent[0].body.contains("Salmonella"));
}

#[tokio::test]
async fn test_delivery_failure_keeps_record_stored() {
    let source = StubSource::new(batch_with_duplicate_and_reject());
    let (store, collection) = document_store();
    let (dispatcher, mailer, _) =
        recording_dispatcher_with(smtp_config(), sms_config(), RecordingMailer::failing());

    let report = PollDriver::new(&source, &store, &dispatcher, email())
        .with_dry_run(false)
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.newly_saved, 1);
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.delivery_failures, 1);
    assert_eq!(mailer.sent().len(), 1);
    assert_eq!(collection.len(), 1);

    // Already stored, so the next cycle does not retry the alert
    let again = PollDriver::new(&source, &store, &dispatcher, email())
        .with_dry_run(false)
        .run_once()
        .await
        .unwrap();
    assert_eq!(again.newly_saved, 0);
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_batch_limit_is_passed_to_source() {
    let source = StubSource::new(batch_with_duplicate_and_reject());
    let (store, _) = document_store();
    let (dispatcher, _, _) = recording_dispatcher(smtp_config(), sms_config());

    let report = PollDriver::new(&source, &store, &dispatcher, email())
        .with_batch(1, "report_date")
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.newly_saved, 1);
}

#[tokio::test]
async fn test_slash_in_recall_number_does_not_stop_the_batch() {
    let source = StubSource::new(vec![
        raw(json!({ "recall_number": "F-12/2024", "reason_for_recall": "Listeria" })),
        raw(json!({ "recall_number": "F-13-2024", "reason_for_recall": "Undeclared egg" })),
    ]);
    let (store, collection) = document_store();
    let (dispatcher, mailer, _) = recording_dispatcher(smtp_config(), sms_config());

    let report = PollDriver::new(&source, &store, &dispatcher, email())
        .with_dry_run(false)
        .run_once()
        .await
        .unwrap();

    assert_eq!(report.newly_saved, 2);
    assert_eq!(report.dispatched, 2);
    assert_eq!(collection.len(), 2);
    assert_eq!(mailer.sent().len(), 2);

    let mut keys = store.recall_numbers().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["F-12/2024", "F-13-2024"]);
}
