//! Appointment database operations.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_date, parse_time, Database, DbError, DbResult, DATE_FORMAT, TIME_FORMAT};
use crate::models::{Appointment, AppointmentStatus, Insurance};

const APPOINTMENT_COLUMNS: &str = r#"
    appointment_id, patient_id, provider_id, appointment_date, start_time,
    duration_minutes, status, insurance, notes, created_at, updated_at
"#;

impl Database {
    /// Insert an appointment. Returns `false` if the ID already exists.
    pub fn insert_appointment(&self, appointment: &Appointment) -> DbResult<bool> {
        let insurance = appointment
            .insurance
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let rows_affected = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO appointments (
                appointment_id, patient_id, provider_id, appointment_date, start_time,
                duration_minutes, status, insurance, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                appointment.appointment_id,
                appointment.patient_id,
                appointment.provider_id,
                appointment.date.format(DATE_FORMAT).to_string(),
                appointment.start_time.format(TIME_FORMAT).to_string(),
                appointment.duration_minutes,
                appointment.status.as_str(),
                insurance,
                appointment.notes,
                appointment.created_at,
                appointment.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, appointment_id: &str) -> DbResult<Option<Appointment>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM appointments WHERE appointment_id = ?1",
                    APPOINTMENT_COLUMNS
                ),
                params![appointment_id],
                AppointmentRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all appointments by date and start time.
    pub fn list_appointments(&self) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM appointments ORDER BY appointment_date, start_time, created_at",
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map([], AppointmentRow::from_row)?;
        rows.map(|row| row?.try_into()).collect()
    }

    /// All appointments of a provider on a date, any status.
    pub fn appointments_for_provider_on(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM appointments
            WHERE provider_id = ?1 AND appointment_date = ?2
            ORDER BY start_time
            "#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![provider_id, date.format(DATE_FORMAT).to_string()],
            AppointmentRow::from_row,
        )?;
        rows.map(|row| row?.try_into()).collect()
    }

    /// All appointments of a patient, soonest first.
    pub fn appointments_for_patient(&self, patient_id: &str) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM appointments
            WHERE patient_id = ?1
            ORDER BY appointment_date, start_time
            "#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![patient_id], AppointmentRow::from_row)?;
        rows.map(|row| row?.try_into()).collect()
    }

    /// Move an appointment to a new date and start time. Returns `false` if it
    /// does not exist.
    pub fn update_appointment_slot(
        &self,
        appointment_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments
            SET appointment_date = ?2, start_time = ?3, updated_at = ?4
            WHERE appointment_id = ?1
            "#,
            params![
                appointment_id,
                date.format(DATE_FORMAT).to_string(),
                start_time.format(TIME_FORMAT).to_string(),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Overwrite an appointment's status. Returns `false` if it does not exist.
    pub fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE appointments SET status = ?2, updated_at = ?3 WHERE appointment_id = ?1",
            params![
                appointment_id,
                status.as_str(),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct AppointmentRow {
    appointment_id: String,
    patient_id: String,
    provider_id: String,
    appointment_date: String,
    start_time: String,
    duration_minutes: u32,
    status: String,
    insurance: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl AppointmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            appointment_id: row.get(0)?,
            patient_id: row.get(1)?,
            provider_id: row.get(2)?,
            appointment_date: row.get(3)?,
            start_time: row.get(4)?,
            duration_minutes: row.get(5)?,
            status: row.get(6)?,
            insurance: row.get(7)?,
            notes: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let status = AppointmentStatus::parse(&row.status)
            .ok_or_else(|| DbError::Parse(format!("appointment status '{}'", row.status)))?;
        let insurance: Option<Insurance> = row
            .insurance
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Appointment {
            appointment_id: row.appointment_id,
            patient_id: row.patient_id,
            provider_id: row.provider_id,
            date: parse_date(&row.appointment_date)?,
            start_time: parse_time(&row.start_time)?,
            duration_minutes: row.duration_minutes,
            status,
            insurance,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
