//! SMS delivery
//!
//! Two routes:
//! - carrier API (Twilio Messages resource), needs account credentials
//! - email-to-SMS gateway (`<digits>@<carrier-domain>`), needs SMTP only

use super::DeliveryError;
use async_trait::async_trait;
use recall_common::config::SmsConfig;
use serde::Deserialize;
use std::time::Duration;

const TWILIO_BASE_URL: &str = "https://api.twilio.com/2010-04-01";
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Twilio rejects bodies longer than this
pub const SMS_MAX_CHARS: usize = 1600;
const MIN_PHONE_DIGITS: usize = 7;

/// Validated SMS provider credentials
#[derive(Clone)]
pub struct SmsCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl std::fmt::Debug for SmsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsCredentials")
            .field("account_sid", &self.account_sid)
            .field("from_number", &self.from_number)
            .finish_non_exhaustive()
    }
}

impl SmsCredentials {
    pub fn from_config(config: &SmsConfig) -> Result<Self, DeliveryError> {
        fn required(value: Option<&String>, key: &str) -> Result<String, DeliveryError> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DeliveryError::Config(format!("{} is not set", key)))
        }

        Ok(Self {
            account_sid: required(config.account_sid.as_ref(), "TWILIO_ACCOUNT_SID")?,
            auth_token: required(config.auth_token.as_ref(), "TWILIO_AUTH_TOKEN")?,
            from_number: normalize_phone(
                &required(config.from_number.as_ref(), "TWILIO_FROM_NUMBER")?,
            )?,
        })
    }
}

/// Keep a leading `+` and the digits; reject anything too short to dial
pub fn normalize_phone(number: &str) -> Result<String, DeliveryError> {
    let trimmed = number.trim();
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(DeliveryError::InvalidAddress(format!(
            "not a phone number: {}",
            number
        )));
    }
    if trimmed.starts_with('+') {
        Ok(format!("+{}", digits))
    } else {
        Ok(digits)
    }
}

/// Email address of a carrier's SMS gateway for `number`
pub fn gateway_address(number: &str, carrier_domain: &str) -> Result<String, DeliveryError> {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(DeliveryError::InvalidAddress(format!(
            "not a phone number: {}",
            number
        )));
    }

    let domain = carrier_domain.trim().trim_start_matches('@');
    if domain.is_empty() || !domain.contains('.') {
        return Err(DeliveryError::Config(format!(
            "SMS_CARRIER_DOMAIN is not a domain: '{}'",
            carrier_domain
        )));
    }

    Ok(format!("{}@{}", digits, domain))
}

/// Render an alert as one SMS body, cut to the provider limit
pub fn sms_text(subject: &str, body: &str) -> String {
    let text = format!("{}\n\n{}", subject, body.trim());
    if text.chars().count() <= SMS_MAX_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(SMS_MAX_CHARS - 1).collect();
    cut.push('…');
    cut
}

/// Sends one SMS, returning the provider's message id
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send_sms(
        &self,
        credentials: &SmsCredentials,
        to: &str,
        body: &str,
    ) -> Result<String, DeliveryError>;
}

#[derive(Debug, Deserialize)]
struct TwilioMessage {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    message: Option<String>,
}

pub struct TwilioClient {
    http_client: reqwest::Client,
}

impl TwilioClient {
    pub fn new() -> Result<Self, DeliveryError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl SmsTransport for TwilioClient {
    async fn send_sms(
        &self,
        credentials: &SmsCredentials,
        to: &str,
        body: &str,
    ) -> Result<String, DeliveryError> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            TWILIO_BASE_URL, credentials.account_sid
        );
        let form = [
            ("To", to),
            ("From", credentials.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(format!("SMS API: {}", e))
                } else {
                    DeliveryError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TwilioError>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(DeliveryError::SmsApi(status.as_u16(), message));
        }

        let message: TwilioMessage = response.json().await.map_err(|e| {
            DeliveryError::SmsApi(status.as_u16(), format!("Unreadable response: {}", e))
        })?;
        Ok(message.sid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_address() {
        assert_eq!(
            gateway_address("(555) 123-4567", "vtext.com").unwrap(),
            "5551234567@vtext.com"
        );
        assert_eq!(
            gateway_address("555.123.4567", "@txt.att.net").unwrap(),
            "5551234567@txt.att.net"
        );
    }

    #[test]
    fn test_gateway_address_rejects_bad_input() {
        assert!(matches!(
            gateway_address("call me", "vtext.com"),
            Err(DeliveryError::InvalidAddress(_))
        ));
        assert!(matches!(
            gateway_address("5551234567", ""),
            Err(DeliveryError::Config(_))
        ));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (555) 123-4567").unwrap(), "+15551234567");
        assert_eq!(normalize_phone("555-123-4567").unwrap(), "5551234567");
        assert!(normalize_phone("12").is_err());
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        let config = SmsConfig {
            account_sid: Some("AC123".to_string()),
            auth_token: None,
            from_number: Some("+15550001111".to_string()),
        };
        let err = SmsCredentials::from_config(&config).unwrap_err();
        assert!(matches!(err, DeliveryError::Config(ref msg) if msg.contains("TWILIO_AUTH_TOKEN")));
    }

    #[test]
    fn test_sms_text_truncates_on_char_boundary() {
        let body = "é".repeat(SMS_MAX_CHARS * 2);
        let text = sms_text("Subject", &body);
        assert_eq!(text.chars().count(), SMS_MAX_CHARS);
        assert!(text.ends_with('…'));

        assert_eq!(sms_text("S", "short"), "S\n\nshort");
    }
}
