//! SMTP email delivery
//!
//! Port 465 uses implicit TLS, any other port upgrades with STARTTLS. A
//! fresh connection is opened per message; volume is a handful of alerts
//! per poll.

use super::DeliveryError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use recall_common::config::SmtpConfig;
use std::time::Duration;

const SMTP_TIMEOUT_SECS: u64 = 30;
const IMPLICIT_TLS_PORT: u16 = 465;

/// Validated SMTP settings
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl SmtpSettings {
    /// Check that host, user and password are present
    pub fn from_config(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        fn required(value: Option<&String>, key: &str) -> Result<String, DeliveryError> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DeliveryError::Config(format!("{} is not set", key)))
        }

        let host = config.host.trim().to_string();
        if host.is_empty() {
            return Err(DeliveryError::Config("SMTP_HOST is not set".to_string()));
        }
        let user = required(config.user.as_ref(), "SMTP_USER")?;
        let password = required(config.password.as_ref(), "SMTP_PASS")?;
        let from = config
            .from
            .as_ref()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| user.clone());

        Ok(Self {
            host,
            port: config.port,
            user,
            password,
            from,
        })
    }
}

/// One message ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Reject addresses that cannot possibly be delivered
pub fn validate_address(address: &str) -> Result<(), DeliveryError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map(|_| ())
        .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {}", address, e)))
}

/// Delivers one email
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, smtp: &SmtpSettings, email: &OutgoingEmail) -> Result<(), DeliveryError>;
}

/// lettre-backed SMTP transport
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpMailer;

impl SmtpMailer {
    fn build_message(email: &OutgoingEmail) -> Result<Message, DeliveryError> {
        let from: Mailbox = email
            .from
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {}", email.from, e)))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {}", email.to, e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| DeliveryError::Smtp(format!("Cannot build message: {}", e)))
    }

    fn build_transport(
        smtp: &SmtpSettings,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        let relay = if smtp.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        };
        let builder = relay.map_err(|e| {
            DeliveryError::Smtp(format!("TLS setup for {} failed: {}", smtp.host, e))
        })?;

        Ok(builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.user.clone(), smtp.password.clone()))
            .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)))
            .build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, smtp: &SmtpSettings, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        let message = Self::build_message(email)?;
        let transport = Self::build_transport(smtp)?;

        tracing::debug!(host = %smtp.host, port = smtp.port, to = %email.to, "Sending via SMTP");

        transport.send(message).await.map(|_| ()).map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout(format!("SMTP {}:{}: {}", smtp.host, smtp.port, e))
            } else {
                DeliveryError::Smtp(e.to_string())
            }
        })
    }
}
