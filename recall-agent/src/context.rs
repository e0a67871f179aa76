//! Process-scoped application context
//!
//! Built once at startup and passed by reference. The recall store is
//! opened lazily on first use and then shared for the rest of the process.

use crate::notify::{Channel, DeliveryError, Dispatcher};
use crate::services::{FetchError, GeminiClient, OpenFdaClient, SummarizeError};
use crate::store::{open_store, DedupStore, StoreError};
use recall_common::config::{AppConfig, ChannelKind};
use tokio::sync::OnceCell;
use tracing::warn;

pub struct AppContext {
    config: AppConfig,
    store: OnceCell<DedupStore>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The configured store, opened on first call
    ///
    /// Concurrent first calls open it once. A failed open is not cached, so
    /// a later call tries again.
    pub async fn store(&self) -> Result<&DedupStore, StoreError> {
        self.store
            .get_or_try_init(|| open_store(&self.config.store))
            .await
    }

    pub fn recall_source(&self) -> Result<OpenFdaClient, FetchError> {
        OpenFdaClient::new(self.config.source.url.clone())
    }

    /// Summarizer, or `None` when disabled or unconfigured
    ///
    /// A missing API key is only a warning: alerts go out without
    /// summaries.
    pub fn summarizer(&self, enabled: bool) -> Option<GeminiClient> {
        if !enabled {
            return None;
        }
        match GeminiClient::new(&self.config.summarizer) {
            Ok(client) => Some(client),
            Err(SummarizeError::MissingApiKey) => {
                warn!("GEMINI_API_KEY is not set; alerts will be sent without summaries");
                None
            }
            Err(e) => {
                warn!(error = %e, "Summarizer unavailable; alerts will be sent without summaries");
                None
            }
        }
    }

    pub fn dispatcher(&self) -> Result<Dispatcher, DeliveryError> {
        Dispatcher::from_config(&self.config)
    }

    /// Resolve the alert channel, letting command-line values win
    pub fn channel_for(
        &self,
        kind: Option<ChannelKind>,
        destination: Option<&str>,
    ) -> Result<Channel, DeliveryError> {
        let kind = kind.unwrap_or(self.config.notify.channel);
        let destination = match destination {
            Some(to) => to.to_string(),
            None => self.config.default_destination().ok_or_else(|| {
                DeliveryError::Config(
                    "No destination: set NOTIFY_TO, TEST_EMAIL or SMTP_USER".to_string(),
                )
            })?,
        };
        Channel::from_config(kind, &destination, self.config.notify.carrier_domain.as_deref())
    }
}
