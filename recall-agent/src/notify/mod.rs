//! Notification dispatcher
//!
//! Delivers a composed alert over one of three channels. Each channel checks
//! its own settings before touching the network, and a dry run stops right
//! after that check.

pub mod email;
pub mod sms;

pub use email::{validate_address, MailTransport, OutgoingEmail, SmtpMailer, SmtpSettings};
pub use sms::{gateway_address, SmsCredentials, SmsTransport, TwilioClient};

use recall_common::config::{AppConfig, ChannelKind, SmsConfig, SmtpConfig};
use recall_common::Alert;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Delivery errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid destination: {0}")]
    InvalidAddress(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("SMS API error {0}: {1}")]
    SmsApi(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Network(_) | DeliveryError::Timeout(_) => true,
            DeliveryError::SmsApi(status, _) => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Where an alert goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Email { to: String },
    SmsApi { to: String },
    SmsGateway { number: String, carrier_domain: String },
}

impl Channel {
    /// Pair a configured channel kind with a destination
    pub fn from_config(
        kind: ChannelKind,
        destination: &str,
        carrier_domain: Option<&str>,
    ) -> Result<Self, DeliveryError> {
        let destination = destination.trim();
        if destination.is_empty() {
            return Err(DeliveryError::Config(
                "No destination: set NOTIFY_TO, TEST_EMAIL or SMTP_USER".to_string(),
            ));
        }

        match kind {
            ChannelKind::Email => Ok(Channel::Email {
                to: destination.to_string(),
            }),
            ChannelKind::SmsApi => Ok(Channel::SmsApi {
                to: destination.to_string(),
            }),
            ChannelKind::SmsGateway => {
                let carrier_domain = carrier_domain
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .ok_or_else(|| {
                        DeliveryError::Config("SMS_CARRIER_DOMAIN is not set".to_string())
                    })?;
                Ok(Channel::SmsGateway {
                    number: destination.to_string(),
                    carrier_domain: carrier_domain.to_string(),
                })
            }
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Email { .. } => ChannelKind::Email,
            Channel::SmsApi { .. } => ChannelKind::SmsApi,
            Channel::SmsGateway { .. } => ChannelKind::SmsGateway,
        }
    }

    /// Human-readable destination, for logs
    pub fn destination(&self) -> String {
        match self {
            Channel::Email { to } | Channel::SmsApi { to } => to.clone(),
            Channel::SmsGateway {
                number,
                carrier_domain,
            } => format!("{} via {}", number, carrier_domain),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.kind(), self.destination())
    }
}

/// Result of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing left the process
    DryRun { channel: ChannelKind, destination: String },
    /// Handed to the transport; SMS API sends carry the provider message id
    Sent {
        channel: ChannelKind,
        destination: String,
        message_id: Option<String>,
    },
}

impl DispatchOutcome {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, DispatchOutcome::DryRun { .. })
    }
}

/// A channel after its settings have been checked
enum Prepared {
    Email {
        smtp: SmtpSettings,
        email: OutgoingEmail,
    },
    Sms {
        credentials: SmsCredentials,
        to: String,
        body: String,
    },
}

pub struct Dispatcher {
    smtp: SmtpConfig,
    sms: SmsConfig,
    mail: Arc<dyn MailTransport>,
    sms_sender: Arc<dyn SmsTransport>,
}

impl Dispatcher {
    pub fn new(
        smtp: SmtpConfig,
        sms: SmsConfig,
        mail: Arc<dyn MailTransport>,
        sms_sender: Arc<dyn SmsTransport>,
    ) -> Self {
        Self {
            smtp,
            sms,
            mail,
            sms_sender,
        }
    }

    /// Dispatcher with the real SMTP and Twilio transports
    pub fn from_config(config: &AppConfig) -> Result<Self, DeliveryError> {
        Ok(Self::new(
            config.smtp.clone(),
            config.sms.clone(),
            Arc::new(SmtpMailer),
            Arc::new(TwilioClient::new()?),
        ))
    }

    fn prepare(&self, alert: &Alert, channel: &Channel) -> Result<Prepared, DeliveryError> {
        match channel {
            Channel::Email { to } => {
                let smtp = SmtpSettings::from_config(&self.smtp)?;
                validate_address(to)?;
                let email = OutgoingEmail {
                    from: smtp.from.clone(),
                    to: to.trim().to_string(),
                    subject: alert.subject.clone(),
                    body: alert.body.clone(),
                };
                Ok(Prepared::Email { smtp, email })
            }
            Channel::SmsGateway {
                number,
                carrier_domain,
            } => {
                let smtp = SmtpSettings::from_config(&self.smtp)?;
                let to = gateway_address(number, carrier_domain)?;
                validate_address(&to)?;
                let email = OutgoingEmail {
                    from: smtp.from.clone(),
                    to,
                    subject: alert.subject.clone(),
                    body: alert.body.clone(),
                };
                Ok(Prepared::Email { smtp, email })
            }
            Channel::SmsApi { to } => {
                let credentials = SmsCredentials::from_config(&self.sms)?;
                let to = sms::normalize_phone(to)?;
                Ok(Prepared::Sms {
                    credentials,
                    to,
                    body: sms::sms_text(&alert.subject, &alert.body),
                })
            }
        }
    }

    /// Deliver `alert` over `channel`
    ///
    /// Configuration is checked first, so a dry run with missing credentials
    /// still fails.
    pub async fn dispatch(
        &self,
        alert: &Alert,
        channel: &Channel,
        dry_run: bool,
    ) -> Result<DispatchOutcome, DeliveryError> {
        let prepared = self.prepare(alert, channel)?;
        let kind = channel.kind();

        if dry_run {
            info!(
                channel = %kind,
                to = %channel.destination(),
                subject = %alert.subject,
                "[DRY RUN] Would send alert (set ALLOW_SEND=1 to deliver)"
            );
            return Ok(DispatchOutcome::DryRun {
                channel: kind,
                destination: channel.destination(),
            });
        }

        let result = match prepared {
            Prepared::Email { smtp, email } => {
                self.mail.send(&smtp, &email).await?;
                info!(channel = %kind, to = %email.to, "Alert sent");
                DispatchOutcome::Sent {
                    channel: kind,
                    destination: email.to,
                    message_id: None,
                }
            }
            Prepared::Sms {
                credentials,
                to,
                body,
            } => {
                let sid = self
                    .sms_sender
                    .send_sms(&credentials, &to, &body)
                    .await
                    .map_err(|e| {
                        warn!(to = %to, error = %e, "SMS API rejected message");
                        e
                    })?;
                info!(channel = %kind, to = %to, sid = %sid, "Alert sent");
                DispatchOutcome::Sent {
                    channel: kind,
                    destination: to,
                    message_id: Some(sid),
                }
            }
        };

        Ok(result)
    }
}
