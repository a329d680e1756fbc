//! Twilio REST client for outbound SMS.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::TwilioConfig;

/// Error codes Twilio uses for account limitations rather than real failures:
/// daily message cap, unverified destination on a trial account, and
/// identical to/from numbers.
const LIMITATION_CODES: [i64; 3] = [63038, 21608, 21266];
const LIMITATION_PHRASES: [&str; 3] = ["daily messages limit", "unverified", "same number"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// SMS provider errors.
#[derive(Error, Debug)]
pub enum SmsError {
    /// The account cannot send this message; not a delivery failure.
    #[error("Provider limitation: {0}")]
    Limited(String),

    #[error("Provider error {code:?}: {message}")]
    Provider { code: Option<i64>, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Sends a text message, returning the provider's message ID.
pub trait SmsProvider: Send + Sync {
    fn send(&self, to: &str, body: &str) -> Result<String, SmsError>;
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: Option<i64>,
    message: Option<String>,
}

/// Blocking Twilio Messages API client.
pub struct TwilioSmsProvider {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

impl TwilioSmsProvider {
    pub fn new(config: &TwilioConfig) -> Result<Self, SmsError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

impl SmsProvider for TwilioSmsProvider {
    fn send(&self, to: &str, body: &str) -> Result<String, SmsError> {
        let to = to_e164(to);
        let url = self.messages_url();
        debug!("Sending SMS to {} via {}", to, url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", self.from_number.as_str()), ("Body", body)])
            .send()?;

        let status = response.status();
        let text = response.text()?;

        if status.is_success() {
            let message: MessageResponse =
                serde_json::from_str(&text).map_err(|e| SmsError::Provider {
                    code: None,
                    message: format!("Failed to parse message response: {}", e),
                })?;
            return Ok(message.sid);
        }

        let parsed: Option<ErrorResponse> = serde_json::from_str(&text).ok();
        let code = parsed.as_ref().and_then(|p| p.code);
        let message = parsed
            .and_then(|p| p.message)
            .unwrap_or_else(|| format!("HTTP {}: {}", status, text));

        if is_limitation(code, &message) {
            return Err(SmsError::Limited(message));
        }

        error!("Twilio send failed: {} - {}", status, message);
        Err(SmsError::Provider {
            code,
            message,
        })
    }
}

fn is_limitation(code: Option<i64>, message: &str) -> bool {
    if code.is_some_and(|c| LIMITATION_CODES.contains(&c)) {
        return true;
    }
    let lower = message.to_lowercase();
    LIMITATION_PHRASES.iter().any(|p| lower.contains(p))
}

/// Normalise a phone number to E.164, assuming North America when no
/// country code is present.
pub fn to_e164(phone: &str) -> String {
    let trimmed = phone.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if trimmed.starts_with('+') {
        format!("+{}", digits)
    } else if digits.len() == 11 && digits.starts_with('1') {
        format!("+{}", digits)
    } else {
        format!("+1{}", digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_e164() {
        assert_eq!(to_e164("4155550100"), "+14155550100");
        assert_eq!(to_e164("14155550100"), "+14155550100");
        assert_eq!(to_e164("(415) 555-0100"), "+14155550100");
        assert_eq!(to_e164("+1 415-555-0100"), "+14155550100");
        assert_eq!(to_e164("+91 98765 43210"), "+919876543210");
    }

    #[test]
    fn test_limitation_classification() {
        assert!(is_limitation(Some(63038), "anything"));
        assert!(is_limitation(None, "The 'To' number is Unverified."));
        assert!(is_limitation(None, "Account exceeded the daily messages limit"));
        assert!(!is_limitation(Some(21211), "Invalid 'To' Phone Number"));
    }
}
