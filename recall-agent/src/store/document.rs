//! Document-store recall backend
//!
//! The document id is derived from the `recall_number` by [`document_id`],
//! so lookup is a direct get by id and insert is a create-if-absent write.
//! The wire protocol lives behind [`DocumentCollection`];
//! [`super::FirestoreCollection`] is the production implementation.

use super::{RecallBackend, StoreError};
use async_trait::async_trait;
use recall_common::{Recall, RecordId, StoredRecall};
use std::sync::Arc;

/// One collection of recall documents keyed by id
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Fetch a document by id; `None` if it does not exist
    async fn get(&self, id: &str) -> Result<Option<Recall>, StoreError>;

    /// Atomically create a document
    ///
    /// Fails with [`StoreError::DuplicateKey`] if the id already exists.
    async fn create(&self, id: &str, recall: &Recall) -> Result<(), StoreError>;

    /// Every document id in the collection
    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}

pub struct DocumentBackend {
    collection: Arc<dyn DocumentCollection>,
}

impl DocumentBackend {
    pub fn new(collection: Arc<dyn DocumentCollection>) -> Self {
        Self { collection }
    }
}

/// Map a recall number onto a valid document id
///
/// Reversible: `%` and `/` are percent-encoded, and the ids Firestore
/// reserves (`.`, `..`, anything matching `__.*__`) get one more escaped
/// character. Plain FDA numbers pass through unchanged.
pub fn document_id(recall_number: &str) -> Result<String, StoreError> {
    if recall_number.is_empty() {
        return Err(StoreError::InvalidKey(String::new()));
    }

    let mut id = String::with_capacity(recall_number.len());
    for c in recall_number.chars() {
        match c {
            '%' => id.push_str("%25"),
            '/' => id.push_str("%2F"),
            _ => id.push(c),
        }
    }

    if id == "." || id == ".." {
        return Ok(id.replace('.', "%2E"));
    }
    if id.len() >= 4 && id.starts_with("__") && id.ends_with("__") {
        id.replace_range(0..1, "%5F");
    }
    Ok(id)
}

/// Inverse of [`document_id`]
///
/// A `%` not followed by two hex digits is kept as is.
pub fn recall_number_from_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut rest = id;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let byte = rest
            .get(pos + 1..pos + 3)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .filter(u8::is_ascii);
        match byte {
            Some(byte) => {
                out.push(char::from(byte));
                rest = &rest[pos + 3..];
            }
            None => {
                out.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl RecallBackend for DocumentBackend {
    fn name(&self) -> &'static str {
        "firestore"
    }

    async fn lookup(&self, recall_number: &str) -> Result<Option<StoredRecall>, StoreError> {
        let id = document_id(recall_number)?;
        Ok(self.collection.get(&id).await?.map(|recall| StoredRecall {
            id: RecordId::Document(id),
            recall,
        }))
    }

    async fn insert(&self, recall: &Recall) -> Result<StoredRecall, StoreError> {
        let id = document_id(&recall.recall_number)?;
        self.collection.create(&id, recall).await?;
        Ok(StoredRecall {
            id: RecordId::Document(id),
            recall: recall.clone(),
        })
    }

    async fn recall_numbers(&self) -> Result<Vec<String>, StoreError> {
        let ids = self.collection.list_ids().await?;
        Ok(ids.iter().map(|id| recall_number_from_id(id)).collect())
    }
}
