//! Appointment length from visit history.

use crate::config::DurationPolicy;
use crate::models::{PatientRecord, PatientType};

impl DurationPolicy {
    /// Minutes to book. New patients, unknown callers and records with no
    /// completed visits get the long slot.
    pub fn duration_for(&self, record: Option<&PatientRecord>, patient_type: PatientType) -> u32 {
        match (patient_type, record) {
            (PatientType::Returning, Some(r)) if r.total_visits > 0 => {
                self.returning_patient_minutes
            }
            _ => self.new_patient_minutes,
        }
    }
}
