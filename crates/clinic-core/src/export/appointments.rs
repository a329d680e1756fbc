//! Appointment export for front-desk reporting.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{Database, DbResult};
use crate::models::{Appointment, PatientRecord, ProviderSchedule};

const CSV_HEADER: &str = "Appointment ID,Patient Name,Patient Phone,Patient Email,Patient Type,\
Doctor Name,Doctor Specialty,Location,Appointment Date,Appointment Time,Duration (minutes),\
Status,Created At,Updated At\n";

/// Duration column in the spreadsheet, written as a number.
const DURATION_COLUMN: u16 = 10;

/// One appointment joined with its patient and provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentExportRow {
    pub appointment_id: String,
    pub patient_name: String,
    pub patient_phone: String,
    pub patient_email: String,
    pub patient_type: String,
    pub doctor_name: String,
    pub doctor_specialty: String,
    pub location: String,
    pub appointment_date: String,
    pub appointment_time: String,
    pub duration_minutes: u32,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl AppointmentExportRow {
    fn new(
        appointment: &Appointment,
        patient: &PatientRecord,
        provider: &ProviderSchedule,
    ) -> Self {
        Self {
            appointment_id: appointment.appointment_id.clone(),
            patient_name: patient.full_name(),
            patient_phone: patient.phone.clone(),
            patient_email: patient.email.clone(),
            patient_type: patient.patient_type().as_str().to_string(),
            doctor_name: provider.name.clone(),
            doctor_specialty: provider.specialty.clone(),
            location: provider.location.clone(),
            appointment_date: appointment.date.format("%Y-%m-%d").to_string(),
            appointment_time: appointment.formatted_time(),
            duration_minutes: appointment.duration_minutes,
            status: appointment.status.as_str().to_string(),
            created_at: appointment.created_at.clone(),
            updated_at: appointment.updated_at.clone(),
        }
    }

    /// Text cells in column order, duration excluded.
    fn text_cells(&self) -> [&str; 13] {
        [
            &self.appointment_id,
            &self.patient_name,
            &self.patient_phone,
            &self.patient_email,
            &self.patient_type,
            &self.doctor_name,
            &self.doctor_specialty,
            &self.location,
            &self.appointment_date,
            &self.appointment_time,
            &self.status,
            &self.created_at,
            &self.updated_at,
        ]
    }
}

/// Batch appointment export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentExport {
    /// Export timestamp
    pub exported_at: String,
    pub rows: Vec<AppointmentExportRow>,
    /// Appointments left out for a missing patient or provider
    pub skipped: usize,
}

impl AppointmentExport {
    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from(CSV_HEADER);

        for row in &self.rows {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&row.appointment_id),
                escape_csv(&row.patient_name),
                escape_csv(&row.patient_phone),
                escape_csv(&row.patient_email),
                row.patient_type,
                escape_csv(&row.doctor_name),
                escape_csv(&row.doctor_specialty),
                escape_csv(&row.location),
                row.appointment_date,
                row.appointment_time,
                row.duration_minutes,
                row.status,
                escape_csv(&row.created_at),
                escape_csv(&row.updated_at),
            ));
        }

        csv
    }

    /// Write the CSV rendering to `path`, creating parent directories.
    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_csv())?;
        info!("Exported {} appointments to {}", self.rows.len(), path.display());
        Ok(())
    }
}

impl AppointmentExport {
    /// Write a single-sheet workbook with a bold header row.
    pub fn write_xlsx(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Appointments")?;

        for (col, title) in CSV_HEADER.trim_end().split(',').enumerate() {
            sheet.write_string_with_format(0, col as u16, title, &bold)?;
        }

        for (index, row) in self.rows.iter().enumerate() {
            let line = index as u32 + 1;
            for (i, text) in row.text_cells().into_iter().enumerate() {
                let col = i as u16;
                // Skip over the numeric duration column
                let col = if col >= DURATION_COLUMN { col + 1 } else { col };
                sheet.write_string(line, col, text)?;
            }
            sheet.write_number(line, DURATION_COLUMN, row.duration_minutes)?;
        }
        sheet.autofit();

        workbook
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Exported {} appointments to {}", self.rows.len(), path.display());
        Ok(())
    }
}

/// Appointment exporter.
pub struct AppointmentExporter<'a> {
    db: &'a Database,
}

impl<'a> AppointmentExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Export every appointment, by date and time.
    pub fn export_all(&self) -> DbResult<AppointmentExport> {
        let patients: HashMap<String, PatientRecord> = self
            .db
            .list_patients()?
            .into_iter()
            .map(|p| (p.patient_id.clone(), p))
            .collect();
        let providers: HashMap<String, ProviderSchedule> = self
            .db
            .list_providers()?
            .into_iter()
            .map(|p| (p.provider_id.clone(), p))
            .collect();

        let mut rows = Vec::new();
        let mut skipped = 0;
        for appointment in self.db.list_appointments()? {
            match (
                patients.get(&appointment.patient_id),
                providers.get(&appointment.provider_id),
            ) {
                (Some(patient), Some(provider)) => {
                    rows.push(AppointmentExportRow::new(&appointment, patient, provider));
                }
                _ => {
                    debug!(
                        "Skipping appointment {} with missing patient or provider",
                        appointment.appointment_id
                    );
                    skipped += 1;
                }
            }
        }

        Ok(AppointmentExport {
            exported_at: chrono::Utc::now().to_rfc3339(),
            rows,
            skipped,
        })
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
