//! Patient database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_date, Database, DbError, DbResult, DATE_FORMAT};
use crate::models::PatientRecord;

const PATIENT_COLUMNS: &str = r#"
    patient_id, first_name, last_name, date_of_birth, phone, email, address,
    insurance_provider, insurance_id, medical_history, allergies, current_medications,
    total_visits, last_visit, created_at, updated_at
"#;

impl Database {
    /// Insert a patient. Returns `false` when the ID or the
    /// (first name, last name, date of birth) identity already exists.
    pub fn add_patient(&self, patient: &PatientRecord) -> DbResult<bool> {
        let dob = patient.date_of_birth.map(|d| d.format(DATE_FORMAT).to_string());

        let duplicate: bool = self.conn.query_row(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM patients
                WHERE patient_id = ?1
                   OR (first_name = ?2 AND last_name = ?3 AND date_of_birth IS ?4)
            )
            "#,
            params![patient.patient_id, patient.first_name, patient.last_name, dob],
            |row| row.get(0),
        )?;
        if duplicate {
            return Ok(false);
        }

        self.conn.execute(
            r#"
            INSERT INTO patients (
                patient_id, first_name, last_name, date_of_birth, phone, email, address,
                insurance_provider, insurance_id, medical_history, allergies, current_medications,
                total_visits, last_visit, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                patient.patient_id,
                patient.first_name,
                patient.last_name,
                dob,
                patient.phone,
                patient.email,
                patient.address,
                patient.insurance_provider,
                patient.insurance_id,
                serde_json::to_string(&patient.medical_history)?,
                serde_json::to_string(&patient.allergies)?,
                serde_json::to_string(&patient.current_medications)?,
                patient.total_visits,
                patient.last_visit.map(|d| d.format(DATE_FORMAT).to_string()),
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(true)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, patient_id: &str) -> DbResult<Option<PatientRecord>> {
        self.query_one_patient("patient_id = ?1", &[&patient_id])
    }

    /// Exact phone match.
    pub fn find_patient_by_phone(&self, phone: &str) -> DbResult<Option<PatientRecord>> {
        self.query_one_patient("phone = ?1", &[&phone])
    }

    /// Exact email match.
    pub fn find_patient_by_email(&self, email: &str) -> DbResult<Option<PatientRecord>> {
        self.query_one_patient("email = ?1", &[&email])
    }

    /// Exact (first name, last name) match, case-sensitive as stored.
    pub fn find_patient_by_name(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> DbResult<Option<PatientRecord>> {
        self.query_one_patient("first_name = ?1 AND last_name = ?2", &[&first_name, &last_name])
    }

    /// List all patients, oldest first.
    pub fn list_patients(&self) -> DbResult<Vec<PatientRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM patients ORDER BY created_at, rowid",
            PATIENT_COLUMNS
        ))?;
        let rows = stmt.query_map([], PatientRow::from_row)?;
        rows.map(|row| row?.try_into()).collect()
    }

    /// Substring search over names, phone and email.
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<PatientRecord>> {
        let pattern = format!("%{}%", query);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM patients
            WHERE first_name LIKE ?1 OR last_name LIKE ?1 OR phone LIKE ?1 OR email LIKE ?1
            ORDER BY last_name, first_name
            LIMIT ?2
            "#,
            PATIENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![pattern, limit as i64], PatientRow::from_row)?;
        rows.map(|row| row?.try_into()).collect()
    }

    /// Record a completed visit: bump the counter and set the last visit date.
    pub fn record_patient_visit(&self, patient_id: &str, visit_date: NaiveDate) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                total_visits = total_visits + 1,
                last_visit = ?2,
                updated_at = ?3
            WHERE patient_id = ?1
            "#,
            params![
                patient_id,
                visit_date.format(DATE_FORMAT).to_string(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    fn query_one_patient(
        &self,
        predicate: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> DbResult<Option<PatientRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM patients WHERE {} ORDER BY created_at, rowid LIMIT 1",
                    PATIENT_COLUMNS, predicate
                ),
                args,
                PatientRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    patient_id: String,
    first_name: String,
    last_name: String,
    date_of_birth: Option<String>,
    phone: String,
    email: String,
    address: Option<String>,
    insurance_provider: Option<String>,
    insurance_id: Option<String>,
    medical_history: String,
    allergies: String,
    current_medications: String,
    total_visits: u32,
    last_visit: Option<String>,
    created_at: String,
    updated_at: String,
}

impl PatientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            patient_id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            date_of_birth: row.get(3)?,
            phone: row.get(4)?,
            email: row.get(5)?,
            address: row.get(6)?,
            insurance_provider: row.get(7)?,
            insurance_id: row.get(8)?,
            medical_history: row.get(9)?,
            allergies: row.get(10)?,
            current_medications: row.get(11)?,
            total_visits: row.get(12)?,
            last_visit: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl TryFrom<PatientRow> for PatientRecord {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        Ok(PatientRecord {
            patient_id: row.patient_id,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth.as_deref().map(parse_date).transpose()?,
            phone: row.phone,
            email: row.email,
            address: row.address,
            insurance_provider: row.insurance_provider,
            insurance_id: row.insurance_id,
            medical_history: serde_json::from_str(&row.medical_history)?,
            allergies: serde_json::from_str(&row.allergies)?,
            current_medications: serde_json::from_str(&row.current_medications)?,
            total_visits: row.total_visits,
            last_visit: row.last_visit.as_deref().map(parse_date).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
