//! Reminder database operations.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database, DbError, DbResult, DATETIME_FORMAT};
use crate::models::{Reminder, ReminderType};

const REMINDER_COLUMNS: &str = r#"
    reminder_id, appointment_id, patient_id, reminder_type, scheduled_time,
    sent, sms_delivered, email_delivered, response, created_at
"#;

/// Delivery channel flag on a reminder row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFlag {
    Sms,
    Email,
}

impl DeliveryFlag {
    fn column(&self) -> &'static str {
        match self {
            DeliveryFlag::Sms => "sms_delivered",
            DeliveryFlag::Email => "email_delivered",
        }
    }
}

impl Database {
    /// Insert a reminder. Returns `false` if the ID or the
    /// (appointment, type) pair already exists.
    pub fn insert_reminder(&self, reminder: &Reminder) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO reminders (
                reminder_id, appointment_id, patient_id, reminder_type, scheduled_time,
                sent, sms_delivered, email_delivered, response, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                reminder.reminder_id,
                reminder.appointment_id,
                reminder.patient_id,
                reminder.reminder_type.as_str(),
                reminder.scheduled_time.format(DATETIME_FORMAT).to_string(),
                reminder.sent,
                reminder.sms_delivered,
                reminder.email_delivered,
                reminder.response,
                reminder.created_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a reminder by ID.
    pub fn get_reminder(&self, reminder_id: &str) -> DbResult<Option<Reminder>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM reminders WHERE reminder_id = ?1", REMINDER_COLUMNS),
                params![reminder_id],
                ReminderRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all reminders by fire time.
    pub fn list_reminders(&self) -> DbResult<Vec<Reminder>> {
        self.query_reminders("1 = 1", &[])
    }

    /// Reminders not yet sent, by fire time.
    pub fn list_pending_reminders(&self) -> DbResult<Vec<Reminder>> {
        self.query_reminders("sent = 0", &[])
    }

    /// Reminders already sent with at least one channel undelivered.
    pub fn list_partially_delivered_reminders(&self) -> DbResult<Vec<Reminder>> {
        self.query_reminders(
            r#"
            sent = 1
            AND (sms_delivered = 0 OR (reminder_type = 'initial' AND email_delivered = 0))
            "#,
            &[],
        )
    }

    /// All reminders for an appointment, in firing order.
    pub fn reminders_for_appointment(&self, appointment_id: &str) -> DbResult<Vec<Reminder>> {
        self.query_reminders("appointment_id = ?1", &[&appointment_id])
    }

    /// All reminders for a patient, by fire time.
    pub fn reminders_for_patient(&self, patient_id: &str) -> DbResult<Vec<Reminder>> {
        self.query_reminders("patient_id = ?1", &[&patient_id])
    }

    /// Flip `sent` to true. Returns `false` if the reminder is missing or already sent.
    pub fn mark_reminder_sent(&self, reminder_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE reminders SET sent = 1 WHERE reminder_id = ?1 AND sent = 0",
            params![reminder_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Take the dispatch lease on a reminder until `until`.
    ///
    /// Succeeds only while the row still has the expected `sent` value and no
    /// other dispatcher holds a lease that is live at `now`.
    pub fn claim_reminder(
        &self,
        reminder_id: &str,
        sent: bool,
        now: NaiveDateTime,
        until: NaiveDateTime,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE reminders SET claimed_until = ?3
            WHERE reminder_id = ?1 AND sent = ?2
              AND (claimed_until IS NULL OR claimed_until <= ?4)
            "#,
            params![
                reminder_id,
                sent,
                until.format(DATETIME_FORMAT).to_string(),
                now.format(DATETIME_FORMAT).to_string(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Drop the dispatch lease on a reminder.
    pub fn release_reminder(&self, reminder_id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE reminders SET claimed_until = NULL WHERE reminder_id = ?1",
            params![reminder_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Remove every reminder of an appointment. Returns how many were removed.
    pub fn delete_reminders_for_appointment(&self, appointment_id: &str) -> DbResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM reminders WHERE appointment_id = ?1",
            params![appointment_id],
        )?)
    }

    /// Record that a channel delivered this reminder.
    pub fn set_channel_delivered(&self, reminder_id: &str, flag: DeliveryFlag) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            &format!(
                "UPDATE reminders SET {} = 1 WHERE reminder_id = ?1",
                flag.column()
            ),
            params![reminder_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Write the patient's reply. Returns `false` if a response is already recorded.
    pub fn set_reminder_response(&self, reminder_id: &str, response: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE reminders SET response = ?2 WHERE reminder_id = ?1 AND response IS NULL",
            params![reminder_id, response],
        )?;
        Ok(rows_affected > 0)
    }

    fn query_reminders(
        &self,
        predicate: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> DbResult<Vec<Reminder>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM reminders
            WHERE {}
            ORDER BY scheduled_time, created_at, rowid
            "#,
            REMINDER_COLUMNS, predicate
        ))?;
        let rows = stmt.query_map(args, ReminderRow::from_row)?;
        rows.map(|row| row?.try_into()).collect()
    }
}

/// Intermediate row struct for database mapping.
struct ReminderRow {
    reminder_id: String,
    appointment_id: String,
    patient_id: String,
    reminder_type: String,
    scheduled_time: String,
    sent: bool,
    sms_delivered: bool,
    email_delivered: bool,
    response: Option<String>,
    created_at: String,
}

impl ReminderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            reminder_id: row.get(0)?,
            appointment_id: row.get(1)?,
            patient_id: row.get(2)?,
            reminder_type: row.get(3)?,
            scheduled_time: row.get(4)?,
            sent: row.get(5)?,
            sms_delivered: row.get(6)?,
            email_delivered: row.get(7)?,
            response: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = DbError;

    fn try_from(row: ReminderRow) -> Result<Self, Self::Error> {
        let reminder_type = ReminderType::parse(&row.reminder_type)
            .ok_or_else(|| DbError::Parse(format!("reminder type '{}'", row.reminder_type)))?;

        Ok(Reminder {
            reminder_id: row.reminder_id,
            appointment_id: row.appointment_id,
            patient_id: row.patient_id,
            reminder_type,
            scheduled_time: parse_datetime(&row.scheduled_time)?,
            sent: row.sent,
            sms_delivered: row.sms_delivered,
            email_delivered: row.email_delivered,
            response: row.response,
            created_at: row.created_at,
        })
    }
}
