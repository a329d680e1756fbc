//! Patient models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// New vs. returning classification, derived from visit history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatientType {
    New,
    Returning,
}

impl PatientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientType::New => "new",
            PatientType::Returning => "returning",
        }
    }

    /// Classification for a visit count.
    pub fn from_visits(total_visits: u32) -> Self {
        if total_visits > 0 {
            PatientType::Returning
        } else {
            PatientType::New
        }
    }
}

/// A patient record with identity, contact and clinical summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    /// Directory ID
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    /// Phone as stored (matched exactly during resolution)
    pub phone: String,
    /// Email as stored (matched exactly during resolution)
    pub email: String,
    pub address: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_id: Option<String>,
    /// Past conditions
    pub medical_history: Vec<String>,
    pub allergies: Vec<String>,
    pub current_medications: Vec<String>,
    /// Completed visits; drives new/returning classification
    pub total_visits: u32,
    pub last_visit: Option<NaiveDate>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl PatientRecord {
    /// Classification derived from `total_visits`.
    pub fn patient_type(&self) -> PatientType {
        PatientType::from_visits(self.total_visits)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields needed to register a patient on first contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub phone: String,
    pub email: String,
    pub address: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_id: Option<String>,
    pub medical_history: Vec<String>,
    pub allergies: Vec<String>,
    pub current_medications: Vec<String>,
}

impl NewPatient {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Default::default()
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_date_of_birth(mut self, date_of_birth: NaiveDate) -> Self {
        self.date_of_birth = Some(date_of_birth);
        self
    }

    /// Build a fresh record with no visit history.
    pub fn into_record(self) -> PatientRecord {
        let now = chrono::Utc::now().to_rfc3339();
        PatientRecord {
            patient_id: uuid::Uuid::new_v4().to_string(),
            first_name: self.first_name,
            last_name: self.last_name,
            date_of_birth: self.date_of_birth,
            phone: self.phone,
            email: self.email,
            address: self.address,
            insurance_provider: self.insurance_provider,
            insurance_id: self.insurance_id,
            medical_history: self.medical_history,
            allergies: self.allergies,
            current_medications: self.current_medications,
            total_visits: 0,
            last_visit: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Contact fields used to look up an existing patient.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactQuery {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ContactQuery {
    pub fn by_phone(phone: impl Into<String>) -> Self {
        Self {
            phone: Some(phone.into()),
            ..Default::default()
        }
    }

    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn by_name(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            ..Default::default()
        }
    }
}

impl From<&NewPatient> for ContactQuery {
    fn from(patient: &NewPatient) -> Self {
        Self {
            phone: Some(patient.phone.clone()),
            email: Some(patient.email.clone()),
            first_name: Some(patient.first_name.clone()),
            last_name: Some(patient.last_name.clone()),
        }
    }
}

/// Outcome of resolving a contact against the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: Option<PatientRecord>,
    pub patient_type: PatientType,
}

impl Resolution {
    pub fn is_match(&self) -> bool {
        self.record.is_some()
    }
}
