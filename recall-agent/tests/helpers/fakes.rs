//! In-process stand-ins for the network collaborators

use async_trait::async_trait;
use recall_agent::notify::{
    DeliveryError, Dispatcher, MailTransport, OutgoingEmail, SmsCredentials, SmsTransport,
    SmtpSettings,
};
use recall_agent::services::{FetchError, RecallSource, SummarizeError, Summarizer};
use recall_agent::store::{DocumentCollection, StoreError};
use recall_common::config::{SmsConfig, SmtpConfig};
use recall_common::{RawRecord, Recall, RecallSummary, RiskLevel};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Raw record from a JSON object literal
pub fn raw(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Document collection held in memory, keyed by document id
#[derive(Default)]
pub struct MemoryCollection {
    docs: Mutex<BTreeMap<String, Recall>>,
}

impl MemoryCollection {
    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    async fn get(&self, id: &str) -> Result<Option<Recall>, StoreError> {
        Ok(self.docs.lock().unwrap().get(id).cloned())
    }

    async fn create(&self, id: &str, recall: &Recall) -> Result<(), StoreError> {
        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(id) {
            return Err(StoreError::DuplicateKey(id.to_string()));
        }
        docs.insert(id.to_string(), recall.clone());
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.docs.lock().unwrap().keys().cloned().collect())
    }
}

/// Source that always returns the same batch
pub struct StubSource {
    batch: Vec<RawRecord>,
    pub calls: AtomicUsize,
}

impl StubSource {
    pub fn new(batch: Vec<RawRecord>) -> Self {
        Self {
            batch,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecallSource for StubSource {
    async fn fetch(&self, limit: u32, _sort_field: &str) -> Result<Vec<RawRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.batch.iter().take(limit as usize).cloned().collect())
    }
}

/// Source whose upstream is down
pub struct FailingSource;

#[async_trait]
impl RecallSource for FailingSource {
    async fn fetch(&self, _limit: u32, _sort_field: &str) -> Result<Vec<RawRecord>, FetchError> {
        Err(FetchError::ApiError(503, "Service Unavailable".to_string()))
    }
}

/// Summarizer returning a fixed High-risk summary
pub struct FixedSummarizer;

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _text: &str) -> Result<RecallSummary, SummarizeError> {
        Ok(RecallSummary {
            summary: "Product may be contaminated.".to_string(),
            risk_level: Some(RiskLevel::High),
            action_steps: vec!["Do not eat it".to_string()],
            who_is_affected: "Everyone".to_string(),
            key_identifiers: vec![],
        })
    }
}

/// Summarizer whose model answers with prose instead of JSON
pub struct BrokenSummarizer;

#[async_trait]
impl Summarizer for BrokenSummarizer {
    async fn summarize(&self, _text: &str) -> Result<RecallSummary, SummarizeError> {
        Err(SummarizeError::ParseError {
            message: "expected value at line 1 column 1".to_string(),
            raw: "Sorry, I cannot help with that.".to_string(),
        })
    }
}

/// Mail transport that records instead of sending
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, _smtp: &SmtpSettings, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(email.clone());
        if self.fail {
            return Err(DeliveryError::Smtp("535 authentication failed".to_string()));
        }
        Ok(())
    }
}

/// SMS transport that records instead of sending
#[derive(Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSms {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsTransport for RecordingSms {
    async fn send_sms(
        &self,
        _credentials: &SmsCredentials,
        to: &str,
        body: &str,
    ) -> Result<String, DeliveryError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), body.to_string()));
        Ok(format!("SM{:032}", sent.len()))
    }
}

pub fn smtp_config() -> SmtpConfig {
    SmtpConfig {
        host: "smtp.example.com".to_string(),
        port: 465,
        user: Some("alerts@example.com".to_string()),
        password: Some("app-password".to_string()),
        from: None,
    }
}

pub fn sms_config() -> SmsConfig {
    SmsConfig {
        account_sid: Some("AC0123456789".to_string()),
        auth_token: Some("token".to_string()),
        from_number: Some("+15550001111".to_string()),
    }
}

/// Dispatcher over recording transports, plus handles to inspect them
pub fn recording_dispatcher(
    smtp: SmtpConfig,
    sms: SmsConfig,
) -> (Dispatcher, Arc<RecordingMailer>, Arc<RecordingSms>) {
    recording_dispatcher_with(smtp, sms, RecordingMailer::default())
}

pub fn recording_dispatcher_with(
    smtp: SmtpConfig,
    sms: SmsConfig,
    mailer: RecordingMailer,
) -> (Dispatcher, Arc<RecordingMailer>, Arc<RecordingSms>) {
    let mailer = Arc::new(mailer);
    let sms_sender = Arc::new(RecordingSms::default());
    let dispatcher = Dispatcher::new(smtp, sms, mailer.clone(), sms_sender.clone());
    (dispatcher, mailer, sms_sender)
}
