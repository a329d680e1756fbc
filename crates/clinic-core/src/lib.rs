//! Clinic Scheduling Core Library
//!
//! Local-first appointment booking with patient matching and a three-stage
//! reminder sequence.
//!
//! # Architecture
//!
//! ```text
//! Intake record ──► Patient Directory ──► Duration Policy (new 60 / returning 30)
//!                                                 │
//!                                     Availability Calculator
//!                                                 │
//!                            ┌────────────────────▼─────────────────┐
//!                            │  Booking Ledger (BEGIN IMMEDIATE)    │
//!                            │  re-check sub-slots, insert or move, │
//!                            │  schedule reminders -24h/-2h/-1h     │
//!                            └────────────────────┬─────────────────┘
//!                                                 │
//!                     ┌───────────────────────────┼──────────────────────┐
//!                     │                           │                      │
//!                     ▼                           ▼                      ▼
//!              Confirmation              Reminder Worker           Appointment
//!          (SMS, email, forms)        (due queue, replies)       Export (CSV/XLSX)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite persistence
//! - [`models`]: Domain types (PatientRecord, ProviderSchedule, Appointment,
//!   Reminder)
//! - [`directory`]: Patient resolution and duration policy
//! - [`schedule`]: Slot availability and the booking ledger
//! - [`reminders`]: Reminder scheduling, dispatch and replies
//! - [`notify`]: SMS/email gateway with simulated fallback
//! - [`export`]: Appointment export
//! - [`config`]: Runtime configuration

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod export;
pub mod models;
pub mod notify;
pub mod reminders;
pub mod schedule;

// Re-export commonly used types
pub use config::SchedulerConfig;
pub use db::Database;
pub use directory::PatientDirectory;
pub use error::{SchedulerError, SchedulerResult};
pub use export::{AppointmentExport, AppointmentExporter};
pub use models::{
    Appointment, AppointmentStatus, BookingRequest, ContactQuery, NewPatient, PatientRecord,
    PatientType, ProviderSchedule, Reminder, ReminderResponse, ReminderType, Resolution,
};
pub use notify::{DeliveryOutcome, NotificationGateway, Receipt};
pub use reminders::{DispatchReport, ReminderScheduler, ReminderWorker, ReplyOutcome};
pub use schedule::{AvailabilityCalculator, BookingLedger};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{info, warn};

// =========================================================================
// Clinic Facade
// =========================================================================

/// A completed booking or reschedule.
#[derive(Debug, Clone)]
pub struct Booking {
    pub appointment: Appointment,
    pub reminders: Vec<Reminder>,
    /// Per-channel result of the confirmation or reschedule notice
    pub confirmation: Receipt,
    /// Intake-forms email result, when forms are configured
    pub intake_forms: Option<DeliveryOutcome>,
}

/// Shared handle over the database, gateway and configuration.
///
/// Cheap to clone; every clone uses the same connection and gateway.
#[derive(Clone)]
pub struct Clinic {
    db: Arc<Mutex<Database>>,
    gateway: Arc<NotificationGateway>,
    config: Arc<SchedulerConfig>,
}

impl Clinic {
    pub fn new(db: Database, gateway: NotificationGateway, config: SchedulerConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            gateway: Arc::new(gateway),
            config: Arc::new(config),
        }
    }

    /// Open a database file, with channels built from `config`.
    pub fn open<P: AsRef<Path>>(path: P, config: SchedulerConfig) -> anyhow::Result<Self> {
        let db = Database::open(path)?;
        let gateway = NotificationGateway::from_config(&config.notifications)?;
        info!(
            "Clinic opened (live sms: {}, live email: {}, intake forms: {})",
            gateway.sms_enabled(),
            gateway.email_enabled(),
            config.notifications.intake_forms.len()
        );
        Ok(Self::new(db, gateway, config))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn gateway(&self) -> &NotificationGateway {
        &self.gateway
    }

    /// Shared database handle.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    // =====================================================================
    // Patients and providers
    // =====================================================================

    pub fn resolve_patient(&self, query: &ContactQuery) -> SchedulerResult<Resolution> {
        let db = self.db.lock()?;
        PatientDirectory::new(&db).resolve(query)
    }

    pub fn register_patient(&self, patient: NewPatient) -> SchedulerResult<PatientRecord> {
        let db = self.db.lock()?;
        PatientDirectory::new(&db).register(patient)
    }

    pub fn get_patient(&self, patient_id: &str) -> SchedulerResult<Option<PatientRecord>> {
        let db = self.db.lock()?;
        PatientDirectory::new(&db).get(patient_id)
    }

    /// Patients whose name, phone or email contains `query`.
    pub fn search_patients(
        &self,
        query: &str,
        limit: usize,
    ) -> SchedulerResult<Vec<PatientRecord>> {
        let db = self.db.lock()?;
        PatientDirectory::new(&db).search(query, limit)
    }

    /// Minutes to book for a resolution.
    pub fn appointment_duration(&self, resolution: &Resolution) -> u32 {
        self.config
            .durations
            .duration_for(resolution.record.as_ref(), resolution.patient_type)
    }

    pub fn upsert_provider(&self, provider: &ProviderSchedule) -> SchedulerResult<()> {
        let db = self.db.lock()?;
        db.immediate_transaction(|db| db.upsert_provider(provider))?;
        info!("Saved schedule for provider {}", provider.provider_id);
        Ok(())
    }

    /// Providers filtered by specialty and location fragments.
    pub fn list_providers(
        &self,
        specialty: Option<&str>,
        location: Option<&str>,
    ) -> SchedulerResult<Vec<ProviderSchedule>> {
        let db = self.db.lock()?;
        Ok(db.list_providers_by(specialty, location)?)
    }

    /// A provider with the configured default working day.
    pub fn provider_with_default_hours(&self, provider_id: &str, name: &str) -> ProviderSchedule {
        ProviderSchedule::new(
            provider_id,
            name,
            self.config.clinic_hours.working_hours,
            self.config.clinic_hours.lunch_break,
        )
    }

    pub fn available_slots(
        &self,
        provider_id: &str,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> SchedulerResult<Vec<NaiveTime>> {
        let db = self.db.lock()?;
        AvailabilityCalculator::new(&db).available_slots(provider_id, date, duration_minutes)
    }

    // =====================================================================
    // Booking
    // =====================================================================

    /// Book a slot and schedule its reminders atomically, then send the
    /// confirmation notice and any configured intake forms.
    pub fn book(&self, request: &BookingRequest) -> SchedulerResult<Booking> {
        let (appointment, reminders, patient) = {
            let db = self.db.lock()?;
            db.immediate_transaction(|db| {
                let appointment = BookingLedger::new(db).book(request)?;
                let reminders =
                    ReminderScheduler::new(db, &self.config.reminders).schedule(&appointment)?;
                let patient = db.get_patient(&appointment.patient_id)?;
                Ok::<_, SchedulerError>((appointment, reminders, patient))
            })?
        };

        let confirmation = match &patient {
            Some(patient) => self.gateway.send_booking_confirmation(patient, &appointment),
            None => Receipt::default(),
        };
        if !(confirmation.sms || confirmation.email) {
            warn!(
                "Confirmation for appointment {} was not delivered on any channel",
                appointment.appointment_id
            );
        }

        let forms = &self.config.notifications.intake_forms;
        let intake_forms = match &patient {
            Some(patient) if !forms.is_empty() => {
                let outcome = self.gateway.send_intake_forms(patient, &appointment, forms);
                if !outcome.is_success() {
                    warn!(
                        "Intake forms for appointment {} were not delivered",
                        appointment.appointment_id
                    );
                }
                Some(outcome)
            }
            _ => None,
        };

        Ok(Booking {
            appointment,
            reminders,
            confirmation,
            intake_forms,
        })
    }

    /// Move an appointment, replace its reminders for the new time and send
    /// the reschedule notice.
    ///
    /// Reminders of the old slot are discarded, sent or not, along with any
    /// replies recorded against them.
    pub fn reschedule(
        &self,
        appointment_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> SchedulerResult<Booking> {
        let (previous, appointment, reminders, patient) = {
            let db = self.db.lock()?;
            db.immediate_transaction(|db| {
                let ledger = BookingLedger::new(db);
                let previous = ledger.get(appointment_id)?.ok_or_else(|| {
                    SchedulerError::NotFound(format!("appointment {}", appointment_id))
                })?;
                let appointment = ledger.reschedule(appointment_id, date, start_time)?;
                db.delete_reminders_for_appointment(appointment_id)?;
                let reminders =
                    ReminderScheduler::new(db, &self.config.reminders).schedule(&appointment)?;
                let patient = db.get_patient(&appointment.patient_id)?;
                Ok::<_, SchedulerError>((previous, appointment, reminders, patient))
            })?
        };

        let confirmation = match &patient {
            Some(patient) => self
                .gateway
                .send_reschedule_notice(patient, &previous, &appointment),
            None => Receipt::default(),
        };

        Ok(Booking {
            appointment,
            reminders,
            confirmation,
            intake_forms: None,
        })
    }

    /// Resolve or register the caller, size the visit from their history and
    /// book the requested start.
    pub fn book_for_patient(
        &self,
        patient: NewPatient,
        provider_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> SchedulerResult<Booking> {
        let resolution = {
            let db = self.db.lock()?;
            PatientDirectory::new(&db).resolve_or_register(patient)?
        };
        let record = resolution
            .record
            .as_ref()
            .ok_or_else(|| SchedulerError::NotFound("patient".to_string()))?;

        let duration = self.appointment_duration(&resolution);
        self.book(&BookingRequest::new(
            &record.patient_id,
            provider_id,
            date,
            start_time,
            duration,
        ))
    }

    /// Apply a status transition; a cancellation notifies the patient.
    pub fn update_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> SchedulerResult<Appointment> {
        let (appointment, patient) = {
            let db = self.db.lock()?;
            let appointment =
                BookingLedger::new(&db).update_status_atomic(appointment_id, status)?;
            let patient = db.get_patient(&appointment.patient_id)?;
            (appointment, patient)
        };

        if status == AppointmentStatus::Cancelled {
            if let Some(patient) = &patient {
                self.gateway.send_cancellation_notice(patient, &appointment);
            }
        }

        Ok(appointment)
    }

    pub fn get_appointment(&self, appointment_id: &str) -> SchedulerResult<Option<Appointment>> {
        let db = self.db.lock()?;
        BookingLedger::new(&db).get(appointment_id)
    }

    pub fn reminders_for_appointment(
        &self,
        appointment_id: &str,
    ) -> SchedulerResult<Vec<Reminder>> {
        let db = self.db.lock()?;
        Ok(db.reminders_for_appointment(appointment_id)?)
    }

    // =====================================================================
    // Reminders
    // =====================================================================

    pub fn dispatch_due_reminders(&self, now: NaiveDateTime) -> SchedulerResult<DispatchReport> {
        reminders::dispatch_due(&self.db, &self.gateway, &self.config.reminders, now)
    }

    pub fn retry_undelivered(&self, now: NaiveDateTime) -> SchedulerResult<DispatchReport> {
        reminders::retry_undelivered(&self.db, &self.gateway, &self.config.reminders, now)
    }

    pub fn record_reply(
        &self,
        phone: &str,
        text: &str,
        now: NaiveDateTime,
    ) -> SchedulerResult<ReplyOutcome> {
        let db = self.db.lock()?;
        ReminderScheduler::new(&db, &self.config.reminders).record_response(phone, text, now)
    }

    /// Record an inbound SMS and text the acknowledgement back.
    pub fn handle_inbound_sms(
        &self,
        from: &str,
        body: &str,
        now: NaiveDateTime,
    ) -> SchedulerResult<String> {
        info!("Received SMS from {}: {}", from, body);
        let outcome = self.record_reply(from, body, now)?;
        let ack = outcome.acknowledgement().to_string();
        self.gateway.send_sms(from, &ack);
        Ok(ack)
    }

    /// Start the background reminder worker on this clinic's database.
    pub fn start_reminder_worker(&self) -> std::io::Result<ReminderWorker> {
        ReminderWorker::spawn(
            Arc::clone(&self.db),
            Arc::clone(&self.gateway),
            self.config.reminders.clone(),
        )
    }

    // =====================================================================
    // Export
    // =====================================================================

    pub fn export_appointments(&self) -> SchedulerResult<AppointmentExport> {
        let db = self.db.lock()?;
        Ok(AppointmentExporter::new(&db).export_all()?)
    }

    /// Export every appointment to a CSV file.
    pub fn export_appointments_csv<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<usize> {
        let export = self.export_appointments()?;
        export.write_csv(path.as_ref())?;
        Ok(export.rows.len())
    }

    /// Export every appointment to an Excel workbook.
    pub fn export_appointments_xlsx<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<usize> {
        let export = self.export_appointments()?;
        export.write_xlsx(path.as_ref())?;
        Ok(export.rows.len())
    }
}

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Slot conflict: {0}")]
    SlotConflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Setup error: {0}")]
    SetupError(String),
}

impl From<SchedulerError> for ClinicError {
    fn from(e: SchedulerError) -> Self {
        let message = e.to_string();
        match e {
            SchedulerError::StorageUnavailable(_) => ClinicError::StorageError(message),
            SchedulerError::NotFound(_) => ClinicError::NotFound(message),
            SchedulerError::SlotConflict { .. } => ClinicError::SlotConflict(message),
            SchedulerError::InvalidTransition { .. } => ClinicError::InvalidTransition(message),
            SchedulerError::InvalidInput(_) => ClinicError::InvalidInput(message),
            SchedulerError::Duplicate(_) => ClinicError::Duplicate(message),
        }
    }
}

impl From<db::DbError> for ClinicError {
    fn from(e: db::DbError) -> Self {
        ClinicError::StorageError(e.to_string())
    }
}

impl From<anyhow::Error> for ClinicError {
    fn from(e: anyhow::Error) -> Self {
        ClinicError::SetupError(format!("{:#}", e))
    }
}

impl From<std::io::Error> for ClinicError {
    fn from(e: std::io::Error) -> Self {
        ClinicError::SetupError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::StorageError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a clinic database at the given path, configured from the
/// environment.
#[uniffi::export]
pub fn open_clinic(path: String) -> Result<Arc<ClinicCore>, ClinicError> {
    let clinic = Clinic::open(&path, SchedulerConfig::from_env())?;
    Ok(Arc::new(ClinicCore::wrap(clinic)))
}

/// Create an in-memory clinic with simulated channels (for testing).
#[uniffi::export]
pub fn open_clinic_in_memory() -> Result<Arc<ClinicCore>, ClinicError> {
    let config = SchedulerConfig::default();
    let db = Database::open_in_memory()?;
    let log = Arc::new(notify::MemoryCommunicationLog::new());
    let clinic = Clinic::new(db, NotificationGateway::new(log), config);
    Ok(Arc::new(ClinicCore::wrap(clinic)))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe clinic wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    clinic: Clinic,
    worker: Mutex<Option<ReminderWorker>>,
}

impl ClinicCore {
    fn wrap(clinic: Clinic) -> Self {
        Self {
            clinic,
            worker: Mutex::new(None),
        }
    }
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Resolve a caller and the appointment length they should get.
    pub fn resolve_patient(
        &self,
        phone: Option<String>,
        email: Option<String>,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<FfiResolution, ClinicError> {
        let resolution = self.clinic.resolve_patient(&ContactQuery {
            phone,
            email,
            first_name,
            last_name,
        })?;
        let duration_minutes = self.clinic.appointment_duration(&resolution);
        Ok(FfiResolution {
            patient: resolution.record.map(|r| r.into()),
            patient_type: resolution.patient_type.as_str().to_string(),
            duration_minutes,
        })
    }

    /// Register a first-time patient.
    pub fn register_patient(&self, patient: FfiNewPatient) -> Result<FfiPatient, ClinicError> {
        let new_patient = patient.try_into()?;
        let record = self.clinic.register_patient(new_patient)?;
        Ok(record.into())
    }

    /// Search patients by name, phone or email fragment.
    pub fn search_patients(
        &self,
        query: String,
        limit: u32,
    ) -> Result<Vec<FfiPatient>, ClinicError> {
        let records = self.clinic.search_patients(&query, limit as usize)?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    // =========================================================================
    // Provider Operations
    // =========================================================================

    /// Providers, optionally filtered by specialty and location.
    pub fn list_providers(
        &self,
        specialty: Option<String>,
        location: Option<String>,
    ) -> Result<Vec<FfiProvider>, ClinicError> {
        let providers = self
            .clinic
            .list_providers(specialty.as_deref(), location.as_deref())?;
        Ok(providers.into_iter().map(|p| p.into()).collect())
    }

    // =========================================================================
    // Scheduling Operations
    // =========================================================================

    /// Free start times (`HH:MM`) for a provider on a `YYYY-MM-DD` date.
    pub fn available_slots(
        &self,
        provider_id: String,
        date: String,
        duration_minutes: u32,
    ) -> Result<Vec<String>, ClinicError> {
        let date = parse_ffi_date(&date)?;
        let slots = self.clinic.available_slots(&provider_id, date, duration_minutes)?;
        Ok(slots.into_iter().map(schedule::format_slot).collect())
    }

    /// Book an appointment and schedule its reminders.
    pub fn book_appointment(
        &self,
        request: FfiBookingRequest,
    ) -> Result<FfiAppointment, ClinicError> {
        let request = request.try_into()?;
        let booking = self.clinic.book(&request)?;
        Ok(booking.appointment.into())
    }

    /// Move an appointment to a new `YYYY-MM-DD` date and `HH:MM` start.
    pub fn reschedule_appointment(
        &self,
        appointment_id: String,
        date: String,
        start_time: String,
    ) -> Result<FfiAppointment, ClinicError> {
        let date = parse_ffi_date(&date)?;
        let start_time = parse_ffi_time(&start_time)?;
        let booking = self.clinic.reschedule(&appointment_id, date, start_time)?;
        Ok(booking.appointment.into())
    }

    /// Move an appointment to a new status.
    pub fn update_appointment_status(
        &self,
        appointment_id: String,
        status: String,
    ) -> Result<FfiAppointment, ClinicError> {
        let status = AppointmentStatus::parse(&status)
            .ok_or_else(|| ClinicError::InvalidInput(format!("unknown status '{}'", status)))?;
        let appointment = self.clinic.update_status(&appointment_id, status)?;
        Ok(appointment.into())
    }

    /// Get an appointment by ID.
    pub fn get_appointment(
        &self,
        appointment_id: String,
    ) -> Result<Option<FfiAppointment>, ClinicError> {
        Ok(self.clinic.get_appointment(&appointment_id)?.map(|a| a.into()))
    }

    // =========================================================================
    // Reminder Operations
    // =========================================================================

    /// Send every reminder due now.
    pub fn dispatch_due_reminders(&self) -> Result<FfiDispatchReport, ClinicError> {
        let now = chrono::Local::now().naive_local();
        Ok(self.clinic.dispatch_due_reminders(now)?.into())
    }

    /// Handle an inbound SMS webhook; returns the acknowledgement sent back.
    pub fn handle_inbound_sms(&self, from: String, body: String) -> Result<String, ClinicError> {
        let now = chrono::Local::now().naive_local();
        Ok(self.clinic.handle_inbound_sms(&from, &body, now)?)
    }

    /// Start the background reminder worker if it is not running.
    pub fn start_reminders(&self) -> Result<(), ClinicError> {
        let mut worker = self.worker.lock()?;
        if worker.as_ref().is_some_and(|w| w.is_running()) {
            return Ok(());
        }
        *worker = Some(self.clinic.start_reminder_worker()?);
        Ok(())
    }

    /// Stop the background reminder worker.
    pub fn stop_reminders(&self) -> Result<(), ClinicError> {
        if let Some(worker) = self.worker.lock()?.take() {
            worker.stop();
        }
        Ok(())
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    /// Export all appointments as CSV.
    pub fn export_appointments_csv(&self) -> Result<String, ClinicError> {
        Ok(self.clinic.export_appointments()?.to_csv())
    }

    /// Export all appointments as JSON.
    pub fn export_appointments_json(&self) -> Result<String, ClinicError> {
        self.clinic
            .export_appointments()?
            .to_json()
            .map_err(|e| ClinicError::StorageError(e.to_string()))
    }
}

fn parse_ffi_date(s: &str) -> Result<NaiveDate, ClinicError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| ClinicError::InvalidInput(format!("date '{}': {}", s, e)))
}

fn parse_ffi_time(s: &str) -> Result<NaiveTime, ClinicError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|e| ClinicError::InvalidInput(format!("time '{}': {}", s, e)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub phone: String,
    pub email: String,
    pub patient_type: String,
    pub total_visits: u32,
    pub last_visit: Option<String>,
}

impl From<PatientRecord> for FfiPatient {
    fn from(record: PatientRecord) -> Self {
        Self {
            patient_type: record.patient_type().as_str().to_string(),
            patient_id: record.patient_id,
            first_name: record.first_name,
            last_name: record.last_name,
            date_of_birth: record.date_of_birth.map(|d| d.to_string()),
            phone: record.phone,
            email: record.email,
            total_visits: record.total_visits,
            last_visit: record.last_visit.map(|d| d.to_string()),
        }
    }
}

/// FFI-safe registration request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPatient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub phone: String,
    pub email: String,
    pub insurance_provider: Option<String>,
    pub insurance_id: Option<String>,
}

impl TryFrom<FfiNewPatient> for NewPatient {
    type Error = ClinicError;

    fn try_from(patient: FfiNewPatient) -> Result<Self, Self::Error> {
        Ok(NewPatient {
            first_name: patient.first_name,
            last_name: patient.last_name,
            date_of_birth: patient.date_of_birth.as_deref().map(parse_ffi_date).transpose()?,
            phone: patient.phone,
            email: patient.email,
            insurance_provider: patient.insurance_provider,
            insurance_id: patient.insurance_id,
            ..Default::default()
        })
    }
}

/// FFI-safe resolution result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResolution {
    pub patient: Option<FfiPatient>,
    pub patient_type: String,
    pub duration_minutes: u32,
}

/// FFI-safe booking request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBookingRequest {
    pub patient_id: String,
    pub provider_id: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    pub duration_minutes: u32,
    pub insurance_carrier: Option<String>,
    pub insurance_member_id: Option<String>,
    pub insurance_group_number: Option<String>,
    pub notes: Option<String>,
}

impl TryFrom<FfiBookingRequest> for BookingRequest {
    type Error = ClinicError;

    fn try_from(request: FfiBookingRequest) -> Result<Self, Self::Error> {
        let mut booking = BookingRequest::new(
            &request.patient_id,
            &request.provider_id,
            parse_ffi_date(&request.date)?,
            parse_ffi_time(&request.start_time)?,
            request.duration_minutes,
        );
        if let (Some(carrier), Some(member_id)) =
            (request.insurance_carrier, request.insurance_member_id)
        {
            booking = booking.with_insurance(models::Insurance {
                carrier,
                member_id,
                group_number: request.insurance_group_number,
            });
        }
        booking.notes = request.notes;
        Ok(booking)
    }
}

/// FFI-safe provider summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiProvider {
    pub provider_id: String,
    pub name: String,
    pub specialty: String,
    pub location: String,
}

impl From<ProviderSchedule> for FfiProvider {
    fn from(provider: ProviderSchedule) -> Self {
        Self {
            provider_id: provider.provider_id,
            name: provider.name,
            specialty: provider.specialty,
            location: provider.location,
        }
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub appointment_id: String,
    pub patient_id: String,
    pub provider_id: String,
    pub date: String,
    pub start_time: String,
    pub duration_minutes: u32,
    pub status: String,
}

impl From<Appointment> for FfiAppointment {
    fn from(appointment: Appointment) -> Self {
        Self {
            date: appointment.date.to_string(),
            start_time: appointment.formatted_time(),
            status: appointment.status.as_str().to_string(),
            appointment_id: appointment.appointment_id,
            patient_id: appointment.patient_id,
            provider_id: appointment.provider_id,
            duration_minutes: appointment.duration_minutes,
        }
    }
}

/// FFI-safe dispatch counts.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDispatchReport {
    pub attempted: u32,
    pub sent: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl From<DispatchReport> for FfiDispatchReport {
    fn from(report: DispatchReport) -> Self {
        Self {
            attempted: report.attempted as u32,
            sent: report.sent as u32,
            failed: report.failed as u32,
            skipped: report.skipped as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffi_round_trip_booking() {
        let core = open_clinic_in_memory().unwrap();
        let provider = core
            .clinic
            .provider_with_default_hours("D001", "Dr. Rao")
            .with_day(chrono::Weekday::Mon, 9..17);
        core.clinic.upsert_provider(&provider).unwrap();

        let resolution = core
            .resolve_patient(Some("4155550100".into()), None, None, None)
            .unwrap();
        assert!(resolution.patient.is_none());
        assert_eq!(resolution.duration_minutes, 60);

        let patient = core
            .register_patient(FfiNewPatient {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                date_of_birth: Some("1985-12-10".into()),
                phone: "4155550100".into(),
                email: "ada@example.org".into(),
                insurance_provider: None,
                insurance_id: None,
            })
            .unwrap();

        let slots = core
            .available_slots("D001".into(), "2030-01-07".into(), 60)
            .unwrap();
        assert_eq!(slots.first().map(String::as_str), Some("09:00"));

        let appointment = core
            .book_appointment(FfiBookingRequest {
                patient_id: patient.patient_id,
                provider_id: "D001".into(),
                date: "2030-01-07".into(),
                start_time: "09:00".into(),
                duration_minutes: 60,
                insurance_carrier: None,
                insurance_member_id: None,
                insurance_group_number: None,
                notes: None,
            })
            .unwrap();
        assert_eq!(appointment.status, "scheduled");

        let err = core
            .update_appointment_status(appointment.appointment_id, "completed".into())
            .unwrap_err();
        assert!(matches!(err, ClinicError::InvalidTransition(_)));
    }

    #[test]
    fn test_ffi_reschedule_and_search() {
        let core = open_clinic_in_memory().unwrap();
        let mut provider = core
            .clinic
            .provider_with_default_hours("D001", "Dr. Rao")
            .with_day(chrono::Weekday::Mon, 9..17);
        provider.specialty = "Family Medicine".into();
        core.clinic.upsert_provider(&provider).unwrap();

        let providers = core
            .list_providers(Some("family".into()), None)
            .unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].specialty, "Family Medicine");

        let patient = core
            .clinic
            .register_patient(models::NewPatient::new("Ada", "Lovelace").with_phone("4155550100"))
            .unwrap();
        assert_eq!(core.search_patients("Lovelace".into(), 5).unwrap().len(), 1);

        let appointment = core
            .book_appointment(FfiBookingRequest {
                patient_id: patient.patient_id,
                provider_id: "D001".into(),
                date: "2030-01-07".into(),
                start_time: "09:00".into(),
                duration_minutes: 60,
                insurance_carrier: Some("Aetna".into()),
                insurance_member_id: Some("AE-42".into()),
                insurance_group_number: None,
                notes: Some("follow-up".into()),
            })
            .unwrap();

        let moved = core
            .reschedule_appointment(
                appointment.appointment_id.clone(),
                "2030-01-07".into(),
                "14:00".into(),
            )
            .unwrap();
        assert_eq!(moved.appointment_id, appointment.appointment_id);
        assert_eq!(moved.start_time, "14:00");

        let stored = core
            .clinic
            .get_appointment(&moved.appointment_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.insurance.map(|i| i.member_id).as_deref(), Some("AE-42"));
        assert_eq!(stored.notes.as_deref(), Some("follow-up"));
    }

    #[test]
    fn test_open_clinic_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SchedulerConfig::default();
        config.notifications.log_dir = dir.path().join("logs");

        let clinic = Clinic::open(dir.path().join("clinic.db"), config).unwrap();
        assert!(!clinic.gateway().sms_enabled());
        assert!(!clinic.gateway().email_enabled());
        assert!(clinic.list_providers(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_ffi_rejects_bad_date() {
        let core = open_clinic_in_memory().unwrap();
        let err = core
            .available_slots("D001".into(), "07/01/2030".into(), 60)
            .unwrap_err();
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }
}
