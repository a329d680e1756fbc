//! Patient intake extraction from extractor output.

use std::sync::OnceLock;

use chrono::NaiveDate;
use clinic_core::models::{ContactQuery, NewPatient};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum digits in a usable phone number.
pub const MIN_PHONE_DIGITS: usize = 10;

/// Intake errors.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type IntakeResult<T> = Result<T, IntakeError>;

/// Intake fields as the extractor emits them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawIntake {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_id: Option<String>,
    pub preferred_provider: Option<String>,
    /// `YYYY-MM-DD`
    pub preferred_date: Option<String>,
    pub reason: Option<String>,
}

/// A validated intake record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    /// Phone as given; empty when only an email was provided
    pub phone: String,
    /// Lower-cased email; empty when only a phone was provided
    pub email: String,
    pub address: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_id: Option<String>,
    pub preferred_provider: Option<String>,
    pub preferred_date: Option<NaiveDate>,
    pub reason: Option<String>,
}

/// Parse extractor output into raw intake fields.
pub fn parse_intake_output(text: &str) -> IntakeResult<RawIntake> {
    // The extractor may wrap the object in prose
    let json_start = text.find('{').ok_or_else(|| {
        IntakeError::InvalidFormat("No JSON object found in response".into())
    })?;
    let json_end = text.rfind('}').ok_or_else(|| {
        IntakeError::InvalidFormat("No closing brace found in response".into())
    })?;
    if json_end < json_start {
        return Err(IntakeError::InvalidFormat(
            "Closing brace precedes opening brace".into(),
        ));
    }

    let raw: RawIntake = serde_json::from_str(&text[json_start..=json_end])?;
    Ok(raw)
}

impl RawIntake {
    /// Validate and normalize into an [`IntakeRecord`].
    pub fn validate(self) -> IntakeResult<IntakeRecord> {
        let first_name = clean(self.first_name).ok_or(IntakeError::MissingField("first_name"))?;
        let last_name = clean(self.last_name).ok_or(IntakeError::MissingField("last_name"))?;

        let phone = clean(self.phone);
        let email = clean(self.email).map(|e| e.to_lowercase());
        if phone.is_none() && email.is_none() {
            return Err(IntakeError::MissingField("phone or email"));
        }

        if let Some(phone) = &phone {
            let digits = digit_count(phone);
            if digits < MIN_PHONE_DIGITS {
                return Err(IntakeError::Invalid {
                    field: "phone",
                    reason: format!(
                        "expected at least {} digits, got {}",
                        MIN_PHONE_DIGITS, digits
                    ),
                });
            }
        }

        if let Some(email) = &email {
            if !email_pattern().is_some_and(|re| re.is_match(email)) {
                return Err(IntakeError::Invalid {
                    field: "email",
                    reason: format!("'{}' is not an email address", email),
                });
            }
        }

        Ok(IntakeRecord {
            first_name,
            last_name,
            date_of_birth: parse_date("date_of_birth", self.date_of_birth)?,
            phone: phone.unwrap_or_default(),
            email: email.unwrap_or_default(),
            address: clean(self.address),
            insurance_provider: clean(self.insurance_provider),
            insurance_id: clean(self.insurance_id),
            preferred_provider: clean(self.preferred_provider),
            preferred_date: parse_date("preferred_date", self.preferred_date)?,
            reason: clean(self.reason),
        })
    }
}

impl IntakeRecord {
    /// Lookup keys for the patient directory.
    pub fn contact_query(&self) -> ContactQuery {
        ContactQuery {
            phone: non_empty(&self.phone),
            email: non_empty(&self.email),
            first_name: Some(self.first_name.clone()),
            last_name: Some(self.last_name.clone()),
        }
    }

    /// Registration fields for a first-time patient.
    pub fn to_new_patient(&self) -> NewPatient {
        NewPatient {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            date_of_birth: self.date_of_birth,
            phone: self.phone.clone(),
            email: self.email.clone(),
            address: self.address.clone(),
            insurance_provider: self.insurance_provider.clone(),
            insurance_id: self.insurance_id.clone(),
            ..Default::default()
        }
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn digit_count(phone: &str) -> usize {
    phone.chars().filter(|c| c.is_ascii_digit()).count()
}

fn parse_date(field: &'static str, value: Option<String>) -> IntakeResult<Option<NaiveDate>> {
    clean(value)
        .map(|v| {
            NaiveDate::parse_from_str(&v, "%Y-%m-%d").map_err(|e| IntakeError::Invalid {
                field,
                reason: format!("'{}': {}", v, e),
            })
        })
        .transpose()
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").ok())
        .as_ref()
}
