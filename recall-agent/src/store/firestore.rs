//! Cloud Firestore collection over the REST API
//!
//! Authenticates with a service-account key: a signed RS256 assertion is
//! exchanged for an OAuth access token, which is cached until shortly
//! before it expires.
//!
//! Create-if-absent uses `createDocument` with an explicit `documentId`;
//! Firestore answers `409 ALREADY_EXISTS` when the id is taken, which maps
//! to [`StoreError::DuplicateKey`].

use super::document::{recall_number_from_id, DocumentCollection};
use super::StoreError;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use recall_common::Recall;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token actually expires
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;
const LIST_PAGE_SIZE: &str = "300";

/// Fields of a service-account JSON key file that are needed here
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

// Keep the private key out of logs
impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!(
                "Cannot read service-account file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
            .map_err(|e| StoreError::Config(format!("{} ({})", e, path.display())))
    }

    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        let key: ServiceAccountKey = serde_json::from_str(content)
            .map_err(|e| StoreError::Config(format!("Invalid service-account JSON: {}", e)))?;
        if key.project_id.trim().is_empty() || key.client_email.trim().is_empty() {
            return Err(StoreError::Config(
                "Service-account JSON is missing project_id or client_email".to_string(),
            ));
        }
        Ok(key)
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    TOKEN_LIFETIME_SECS
}

struct CachedToken {
    value: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

pub struct FirestoreCollection {
    http_client: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    collection_url: Url,
    token: Mutex<Option<CachedToken>>,
}

impl FirestoreCollection {
    pub fn new(key: ServiceAccountKey, collection: &str) -> Result<Self, StoreError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            StoreError::Config(format!("Invalid service-account private key: {}", e))
        })?;

        let collection_url = Url::parse(&format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            FIRESTORE_API, key.project_id, collection
        ))
        .map_err(|e| StoreError::Config(format!("Invalid Firestore URL: {}", e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            key,
            encoding_key,
            collection_url,
            token: Mutex::new(None),
        })
    }

    /// Cached access token, refreshed when close to expiry
    async fn access_token(&self) -> Result<String, StoreError> {
        let mut cached = self.token.lock().await;
        let now = chrono::Utc::now().timestamp();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_REFRESH_MARGIN_SECS > now {
                return Ok(token.value.clone());
            }
        }

        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: DATASTORE_SCOPE,
            aud: self.key.token_uri(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let header = Header::new(Algorithm::RS256);
        let assertion = jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| StoreError::Auth(format!("Signing token assertion failed: {}", e)))?;

        debug!(client_email = %self.key.client_email, "Requesting Firestore access token");

        let response = self
            .http_client
            .post(self.key.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StoreError::from_reqwest("token exchange", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!("token endpoint returned {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Auth(format!("Unreadable token response: {}", e)))?;

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: now + token.expires_in,
        });
        Ok(value)
    }

    fn document_url(&self, id: &str) -> Result<Url, StoreError> {
        let mut url = self.collection_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Config("Firestore URL cannot hold a path".to_string()))?
            .push(id);
        Ok(url)
    }

    async fn error_for(response: reqwest::Response) -> StoreError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                StoreError::Auth(format!("{}: {}", status, body))
            }
            _ => StoreError::Remote(status.as_u16(), body),
        }
    }
}

/// Encode a recall as Firestore typed fields
pub fn encode_fields(recall: &Recall) -> Value {
    fn text(value: Option<&str>) -> Value {
        match value {
            Some(s) => json!({ "stringValue": s }),
            None => json!({ "nullValue": null }),
        }
    }

    json!({
        "recall_number": text(Some(&recall.recall_number)),
        "reason_for_recall": text(recall.reason_for_recall.as_deref()),
        "product_description": text(recall.product_description.as_deref()),
        "recall_initiation_date": text(recall.recall_initiation_date.as_deref()),
    })
}

/// Decode Firestore typed fields; `fallback_id` fills a missing recall_number
///
/// Pass the recall number decoded from the document id, not the raw id.
pub fn decode_fields(fields: &Map<String, Value>, fallback_id: &str) -> Recall {
    let text = |key: &str| {
        fields
            .get(key)
            .and_then(|v| v.get("stringValue"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Recall {
        recall_number: text("recall_number").unwrap_or_else(|| fallback_id.to_string()),
        reason_for_recall: text("reason_for_recall"),
        product_description: text("product_description"),
        recall_initiation_date: text("recall_initiation_date"),
    }
}

fn id_from_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

#[async_trait]
impl DocumentCollection for FirestoreCollection {
    async fn get(&self, id: &str) -> Result<Option<Recall>, StoreError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(self.document_url(id)?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::from_reqwest("get document", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let document: FirestoreDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(id.to_string(), e.to_string()))?;
        Ok(Some(decode_fields(
            &document.fields,
            &recall_number_from_id(id),
        )))
    }

    async fn create(&self, id: &str, recall: &Recall) -> Result<(), StoreError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .post(self.collection_url.clone())
            .query(&[("documentId", id)])
            .bearer_auth(token)
            .json(&json!({ "fields": encode_fields(recall) }))
            .send()
            .await
            .map_err(|e| StoreError::from_reqwest("create document", e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(StoreError::DuplicateKey(id.to_string())),
            _ => Err(Self::error_for(response).await),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.access_token().await?;
            let mut request = self
                .http_client
                .get(self.collection_url.clone())
                .query(&[("pageSize", LIST_PAGE_SIZE), ("mask.fieldPaths", "recall_number")])
                .bearer_auth(token);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StoreError::from_reqwest("list documents", e))?;
            if !response.status().is_success() {
                return Err(Self::error_for(response).await);
            }

            let page: ListDocumentsResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Malformed("list".to_string(), e.to_string()))?;

            ids.extend(page.documents.iter().map(|d| id_from_name(&d.name).to_string()));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(ids)
    }
}
