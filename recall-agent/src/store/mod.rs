//! Dedup store
//!
//! Single source of truth for "have we seen this recall before". The store
//! is generic over a [`RecallBackend`] (lookup-by-key + insert) and adds the
//! insert-if-new contract on top:
//!
//! - existing `recall_number` → `Ok(None)`, no mutation
//! - new `recall_number` → persisted, `Ok(Some(stored))`
//!
//! Exactly-once per key is enforced by the backend itself (SQLite unique
//! constraint, Firestore create-if-absent). A backend insert that loses a
//! race reports [`StoreError::DuplicateKey`]; the store logs it and treats
//! the record as already seen.

pub mod document;
pub mod firestore;
pub mod relational;

pub use document::{DocumentBackend, DocumentCollection};
pub use firestore::{FirestoreCollection, ServiceAccountKey};
pub use relational::RelationalBackend;

use async_trait::async_trait;
use recall_common::config::{StoreBackendKind, StoreConfig};
use recall_common::{Recall, StoredRecall};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name of the relational table and the document collection
pub const RECALLS_COLLECTION: &str = "recalls";

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Another writer stored this key first
    #[error("recall_number already stored: {0}")]
    DuplicateKey(String),

    #[error("Invalid recall_number for this backend: {0}")]
    InvalidKey(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Document store error {0}: {1}")]
    Remote(u16, String),

    #[error("Malformed document {0}: {1}")]
    Malformed(String, String),

    #[error(transparent)]
    Common(#[from] recall_common::Error),
}

impl StoreError {
    /// Timeouts and transport failures may succeed on a later poll
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Network(_))
            || matches!(self, StoreError::Remote(status, _) if *status >= 500 || *status == 429)
    }

    pub(crate) fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout(format!("{}: {}", context, err))
        } else {
            StoreError::Network(format!("{}: {}", context, err))
        }
    }
}

/// Physical storage capability set
#[async_trait]
pub trait RecallBackend: Send + Sync {
    /// Short name for logs ("sqlite", "firestore")
    fn name(&self) -> &'static str;

    /// Find the stored entity with this natural key
    async fn lookup(&self, recall_number: &str) -> Result<Option<StoredRecall>, StoreError>;

    /// Persist a new record
    ///
    /// Must fail with [`StoreError::DuplicateKey`] rather than store a second
    /// copy when the key already exists.
    async fn insert(&self, recall: &Recall) -> Result<StoredRecall, StoreError>;

    /// All stored natural keys, in backend order
    async fn recall_numbers(&self) -> Result<Vec<String>, StoreError>;
}

/// Insert-if-new facade over one backend
pub struct DedupStore {
    backend: Box<dyn RecallBackend>,
}

impl DedupStore {
    pub fn new(backend: Box<dyn RecallBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Store `recall` unless its `recall_number` is already present
    ///
    /// Returns the stored entity (with surrogate id) for new records and
    /// `None` for records seen before. Calling twice never stores two copies.
    pub async fn insert_if_new(&self, recall: &Recall) -> Result<Option<StoredRecall>, StoreError> {
        if recall.recall_number.trim().is_empty() {
            return Err(StoreError::InvalidKey(String::new()));
        }

        if let Some(existing) = self.backend.lookup(&recall.recall_number).await? {
            debug!(
                recall_number = %recall.recall_number,
                id = %existing.id,
                backend = self.backend.name(),
                "Recall already stored"
            );
            return Ok(None);
        }

        match self.backend.insert(recall).await {
            Ok(stored) => {
                info!(
                    recall_number = %recall.recall_number,
                    id = %stored.id,
                    backend = self.backend.name(),
                    "Stored new recall"
                );
                Ok(Some(stored))
            }
            Err(StoreError::DuplicateKey(key)) => {
                warn!(
                    recall_number = %key,
                    backend = self.backend.name(),
                    "Lost insert race: recall stored by another writer between lookup and insert"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Stored natural keys
    pub async fn recall_numbers(&self) -> Result<Vec<String>, StoreError> {
        self.backend.recall_numbers().await
    }
}

/// Build the store selected by configuration
///
/// The only place that looks at `StoreBackendKind`.
pub async fn open_store(config: &StoreConfig) -> Result<DedupStore, StoreError> {
    let backend: Box<dyn RecallBackend> = match config.backend {
        StoreBackendKind::Sqlite => {
            Box::new(RelationalBackend::connect(&config.database_url).await?)
        }
        StoreBackendKind::Firestore => {
            let path = config.firebase_credentials.as_ref().ok_or_else(|| {
                StoreError::Config(
                    "FIREBASE_CREDENTIALS must point to a service-account JSON file \
                     when STORE_BACKEND=firestore"
                        .to_string(),
                )
            })?;
            let key = ServiceAccountKey::from_file(path)?;
            let collection = FirestoreCollection::new(key, RECALLS_COLLECTION)?;
            Box::new(DocumentBackend::new(Arc::new(collection)))
        }
    };

    info!(backend = backend.name(), "Recall store ready");
    Ok(DedupStore::new(backend))
}
