//! Patient directory: identity resolution against historical records.
//!
//! Resolution order is exact phone, then exact email, then the exact
//! (first name, last name) pair. A miss classifies the caller as a new
//! patient; a storage failure is reported as an error and never as a miss.

mod duration;

pub use duration::*;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{ContactQuery, NewPatient, PatientRecord, PatientType, Resolution};

/// Looks up, registers and updates patient records.
pub struct PatientDirectory<'a> {
    db: &'a Database,
}

impl<'a> PatientDirectory<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Resolve contact fields to an existing record. No side effects.
    pub fn resolve(&self, query: &ContactQuery) -> SchedulerResult<Resolution> {
        if let Some(phone) = present(&query.phone) {
            if let Some(record) = self.db.find_patient_by_phone(phone)? {
                debug!("Resolved patient {} by phone", record.patient_id);
                return Ok(matched(record));
            }
        }

        if let Some(email) = present(&query.email) {
            if let Some(record) = self.db.find_patient_by_email(email)? {
                debug!("Resolved patient {} by email", record.patient_id);
                return Ok(matched(record));
            }
        }

        if let (Some(first), Some(last)) = (present(&query.first_name), present(&query.last_name)) {
            if let Some(record) = self.db.find_patient_by_name(first, last)? {
                debug!("Resolved patient {} by name", record.patient_id);
                return Ok(matched(record));
            }
        }

        Ok(Resolution {
            record: None,
            patient_type: PatientType::New,
        })
    }

    /// Create a record with no visit history.
    pub fn register(&self, patient: NewPatient) -> SchedulerResult<PatientRecord> {
        if patient.first_name.trim().is_empty() || patient.last_name.trim().is_empty() {
            return Err(SchedulerError::InvalidInput(
                "first and last name are required".to_string(),
            ));
        }

        let record = patient.into_record();
        if !self.db.add_patient(&record)? {
            return Err(SchedulerError::Duplicate(format!(
                "patient {} already registered",
                record.full_name()
            )));
        }

        info!("Registered patient {} ({})", record.patient_id, record.full_name());
        Ok(record)
    }

    /// Resolve by the patient's contact fields, registering on a miss.
    pub fn resolve_or_register(&self, patient: NewPatient) -> SchedulerResult<Resolution> {
        let resolution = self.resolve(&ContactQuery::from(&patient))?;
        if resolution.is_match() {
            return Ok(resolution);
        }

        let record = self.register(patient)?;
        Ok(Resolution {
            record: Some(record),
            patient_type: PatientType::New,
        })
    }

    /// Count a completed visit against the patient.
    pub fn record_visit(&self, patient_id: &str, visit_date: NaiveDate) -> SchedulerResult<()> {
        if !self.db.record_patient_visit(patient_id, visit_date)? {
            return Err(SchedulerError::NotFound(format!("patient {}", patient_id)));
        }
        debug!("Recorded visit for patient {} on {}", patient_id, visit_date);
        Ok(())
    }

    pub fn get(&self, patient_id: &str) -> SchedulerResult<Option<PatientRecord>> {
        Ok(self.db.get_patient(patient_id)?)
    }

    /// Find the sender of an inbound SMS.
    ///
    /// Tries the number as given, then compares the last ten digits so an
    /// E.164 sender matches a locally formatted stored phone.
    pub fn find_by_reply_phone(&self, phone: &str) -> SchedulerResult<Option<PatientRecord>> {
        if let Some(record) = self.db.find_patient_by_phone(phone)? {
            return Ok(Some(record));
        }

        let wanted = last_ten_digits(phone);
        if wanted.len() < 10 {
            return Ok(None);
        }

        Ok(self
            .db
            .list_patients()?
            .into_iter()
            .find(|p| last_ten_digits(&p.phone) == wanted))
    }

    /// Substring search for admin tooling.
    pub fn search(&self, query: &str, limit: usize) -> SchedulerResult<Vec<PatientRecord>> {
        Ok(self.db.search_patients(query, limit)?)
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

fn matched(record: PatientRecord) -> Resolution {
    Resolution {
        patient_type: record.patient_type(),
        record: Some(record),
    }
}

fn last_ten_digits(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    digits[digits.len().saturating_sub(10)..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed(
        db: &Database,
        first: &str,
        last: &str,
        phone: &str,
        email: &str,
        visits: u32,
    ) -> PatientRecord {
        let mut record = NewPatient::new(first, last)
            .with_phone(phone)
            .with_email(email)
            .into_record();
        record.total_visits = visits;
        db.add_patient(&record).unwrap();
        record
    }

    #[test]
    fn test_miss_is_new_patient() {
        let db = setup_db();
        let directory = PatientDirectory::new(&db);

        let resolution = directory.resolve(&ContactQuery::by_phone("4155550100")).unwrap();
        assert!(!resolution.is_match());
        assert_eq!(resolution.patient_type, PatientType::New);
    }

    #[test]
    fn test_phone_wins_over_email() {
        let db = setup_db();
        let by_phone = seed(&db, "Ada", "Lovelace", "4155550100", "ada@example.org", 2);
        seed(&db, "Grace", "Hopper", "2125550147", "grace@example.org", 0);
        let directory = PatientDirectory::new(&db);

        let query = ContactQuery {
            phone: Some("4155550100".into()),
            email: Some("grace@example.org".into()),
            ..Default::default()
        };
        let resolution = directory.resolve(&query).unwrap();
        assert_eq!(resolution.record.unwrap().patient_id, by_phone.patient_id);
        assert_eq!(resolution.patient_type, PatientType::Returning);
    }

    #[test]
    fn test_name_requires_both_parts() {
        let db = setup_db();
        seed(&db, "Ada", "Lovelace", "4155550100", "ada@example.org", 1);
        let directory = PatientDirectory::new(&db);

        let first_only = ContactQuery {
            first_name: Some("Ada".into()),
            last_name: Some(String::new()),
            ..Default::default()
        };
        assert!(!directory.resolve(&first_only).unwrap().is_match());
        assert!(directory
            .resolve(&ContactQuery::by_name("Ada", "Lovelace"))
            .unwrap()
            .is_match());
    }

    #[test]
    fn test_empty_phone_falls_through_to_email() {
        let db = setup_db();
        seed(&db, "Ada", "Lovelace", "", "ada@example.org", 0);
        let directory = PatientDirectory::new(&db);

        let query = ContactQuery {
            phone: Some(String::new()),
            email: Some("ada@example.org".into()),
            ..Default::default()
        };
        let resolution = directory.resolve(&query).unwrap();
        assert!(resolution.is_match());
        assert_eq!(resolution.patient_type, PatientType::New);
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let db = setup_db();
        let directory = PatientDirectory::new(&db);
        let patient = NewPatient::new("Ada", "Lovelace").with_phone("4155550100");

        directory.register(patient.clone()).unwrap();
        let result = directory.register(patient);
        assert!(matches!(result, Err(SchedulerError::Duplicate(_))));
    }

    #[test]
    fn test_resolve_or_register() {
        let db = setup_db();
        let directory = PatientDirectory::new(&db);
        let patient = NewPatient::new("Ada", "Lovelace").with_phone("4155550100");

        let first = directory.resolve_or_register(patient.clone()).unwrap();
        let second = directory.resolve_or_register(patient).unwrap();
        assert_eq!(
            first.record.unwrap().patient_id,
            second.record.unwrap().patient_id
        );
        assert_eq!(db.list_patients().unwrap().len(), 1);
    }

    #[test]
    fn test_record_visit_flips_classification() {
        let db = setup_db();
        let record = seed(&db, "Ada", "Lovelace", "4155550100", "", 0);
        let directory = PatientDirectory::new(&db);

        directory
            .record_visit(&record.patient_id, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap())
            .unwrap();
        let resolution = directory.resolve(&ContactQuery::by_phone("4155550100")).unwrap();
        assert_eq!(resolution.patient_type, PatientType::Returning);

        let missing = directory.record_visit("nope", NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert!(matches!(missing, Err(SchedulerError::NotFound(_))));
    }

    #[test]
    fn test_reply_phone_matches_e164() {
        let db = setup_db();
        let record = seed(&db, "Ada", "Lovelace", "(415) 555-0100", "", 0);
        let directory = PatientDirectory::new(&db);

        let found = directory.find_by_reply_phone("+14155550100").unwrap().unwrap();
        assert_eq!(found.patient_id, record.patient_id);
        assert!(directory.find_by_reply_phone("+1999").unwrap().is_none());
    }
}
