//! Booking ledger: conflict-checked appointment writes and status changes.

use chrono::{NaiveDate, NaiveTime};
use tracing::{info, warn};

use super::availability::{
    check_span, occupied_sub_slots, sub_slot_index, sub_slots_for, template_offers, SlotCheck,
};
use crate::db::Database;
use crate::directory::PatientDirectory;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{Appointment, AppointmentStatus, BookingRequest};

/// Owns appointment creation and status.
///
/// `book` and `update_status` expect the caller to hold a write transaction.
/// The `*_atomic` variants open their own `BEGIN IMMEDIATE` transaction.
pub struct BookingLedger<'a> {
    db: &'a Database,
}

impl<'a> BookingLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Book in its own immediate transaction.
    pub fn book_atomic(&self, request: &BookingRequest) -> SchedulerResult<Appointment> {
        self.db.immediate_transaction(|db| BookingLedger::new(db).book(request))
    }

    /// Re-check the slot and insert the appointment as `scheduled`.
    ///
    /// Must run inside a write transaction for the check and the insert to be
    /// atomic.
    pub fn book(&self, request: &BookingRequest) -> SchedulerResult<Appointment> {
        let count = sub_slots_for(request.duration_minutes)?;
        let start = grid_index(request.start_time)?;

        if self.db.get_patient(&request.patient_id)?.is_none() {
            return Err(SchedulerError::NotFound(format!("patient {}", request.patient_id)));
        }
        self.check_slot(
            &request.provider_id,
            request.date,
            request.start_time,
            start,
            count,
            None,
        )?;

        let now = chrono::Utc::now().to_rfc3339();
        let appointment = Appointment {
            appointment_id: uuid::Uuid::new_v4().to_string(),
            patient_id: request.patient_id.clone(),
            provider_id: request.provider_id.clone(),
            date: request.date,
            start_time: request.start_time,
            // Truncated to whole sub-slots
            duration_minutes: count * 30,
            status: AppointmentStatus::Scheduled,
            insurance: request.insurance.clone(),
            notes: request.notes.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        if !self.db.insert_appointment(&appointment)? {
            return Err(SchedulerError::Duplicate(format!(
                "appointment {}",
                appointment.appointment_id
            )));
        }

        info!(
            "Booked appointment {} for patient {} with {} on {} at {} ({} min)",
            appointment.appointment_id,
            appointment.patient_id,
            appointment.provider_id,
            appointment.date,
            appointment.formatted_time(),
            appointment.duration_minutes
        );
        Ok(appointment)
    }

    /// Reschedule in its own immediate transaction.
    pub fn reschedule_atomic(
        &self,
        appointment_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> SchedulerResult<Appointment> {
        self.db.immediate_transaction(|db| {
            BookingLedger::new(db).reschedule(appointment_id, date, start_time)
        })
    }

    /// Move an active appointment to a new date and start, keeping its
    /// provider, duration and status. The appointment's own sub-slots do not
    /// count against the new span.
    pub fn reschedule(
        &self,
        appointment_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> SchedulerResult<Appointment> {
        let current = self.require(appointment_id)?;
        if !current.status.is_active() {
            return Err(SchedulerError::InvalidInput(format!(
                "appointment {} is {} and cannot be rescheduled",
                appointment_id,
                current.status.as_str()
            )));
        }

        let count = sub_slots_for(current.duration_minutes)?;
        let start = grid_index(start_time)?;
        self.check_slot(
            &current.provider_id,
            date,
            start_time,
            start,
            count,
            Some(appointment_id),
        )?;

        self.db
            .update_appointment_slot(appointment_id, date, start_time)?;
        info!(
            "Rescheduled appointment {} from {} {} to {} {}",
            appointment_id,
            current.date,
            current.formatted_time(),
            date,
            start_time.format("%H:%M")
        );
        self.require(appointment_id)
    }

    /// Status change in its own immediate transaction.
    pub fn update_status_atomic(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> SchedulerResult<Appointment> {
        self.db.immediate_transaction(|db| {
            BookingLedger::new(db).update_status(appointment_id, status)
        })
    }

    /// Apply a status transition. `completed` also records the patient's visit.
    pub fn update_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> SchedulerResult<Appointment> {
        let mut appointment = self.require(appointment_id)?;

        if !appointment.status.can_transition_to(status) {
            return Err(SchedulerError::InvalidTransition {
                from: appointment.status,
                to: status,
            });
        }

        self.db.update_appointment_status(appointment_id, status)?;

        if status == AppointmentStatus::Completed {
            PatientDirectory::new(self.db)
                .record_visit(&appointment.patient_id, appointment.date)?;
        }

        info!(
            "Appointment {} {} -> {}",
            appointment_id,
            appointment.status.as_str(),
            status.as_str()
        );

        // Re-read for the refreshed timestamp
        appointment = self.require(appointment_id)?;
        Ok(appointment)
    }

    pub fn get(&self, appointment_id: &str) -> SchedulerResult<Option<Appointment>> {
        Ok(self.db.get_appointment(appointment_id)?)
    }

    pub fn appointments_for_patient(&self, patient_id: &str) -> SchedulerResult<Vec<Appointment>> {
        Ok(self.db.appointments_for_patient(patient_id)?)
    }

    pub fn appointments_for_provider_on(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> SchedulerResult<Vec<Appointment>> {
        Ok(self.db.appointments_for_provider_on(provider_id, date)?)
    }

    /// Validate a span against the provider's template and the day's bookings.
    fn check_slot(
        &self,
        provider_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        start: u32,
        count: u32,
        exclude: Option<&str>,
    ) -> SchedulerResult<()> {
        let provider = self
            .db
            .get_provider_schedule(provider_id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("provider {}", provider_id)))?;

        if !template_offers(&provider, date, start) {
            return Err(SchedulerError::InvalidInput(format!(
                "{} does not see patients on {} at {}",
                provider.name,
                date.format("%A %Y-%m-%d"),
                start_time.format("%H:%M")
            )));
        }

        let booked = self.db.appointments_for_provider_on(provider_id, date)?;
        let occupied = occupied_sub_slots(
            booked
                .iter()
                .filter(|appt| Some(appt.appointment_id.as_str()) != exclude),
        );

        match check_span(&provider, &occupied, start, count) {
            SlotCheck::Free => Ok(()),
            SlotCheck::OutsideHours => Err(SchedulerError::InvalidInput(format!(
                "{} minutes at {} falls outside working hours {:02}:00-{:02}:00",
                count * 30,
                start_time.format("%H:%M"),
                provider.working_hours.start,
                provider.working_hours.end
            ))),
            SlotCheck::Occupied(_) => {
                warn!(
                    "Slot conflict: provider {} on {} at {}",
                    provider_id,
                    date,
                    start_time.format("%H:%M")
                );
                Err(SchedulerError::SlotConflict {
                    provider_id: provider_id.to_string(),
                    date,
                    time: start_time,
                })
            }
        }
    }

    fn require(&self, appointment_id: &str) -> SchedulerResult<Appointment> {
        self.db
            .get_appointment(appointment_id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("appointment {}", appointment_id)))
    }
}

fn grid_index(time: NaiveTime) -> SchedulerResult<u32> {
    sub_slot_index(time).ok_or_else(|| {
        SchedulerError::InvalidInput(format!("start time {} is not on a 30-minute boundary", time))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HourWindow, NewPatient, ProviderSchedule};
    use chrono::{NaiveTime, Weekday};

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn setup_db() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let provider = ProviderSchedule::new(
            "D001",
            "Dr. Rao",
            HourWindow::new(9, 17),
            HourWindow::new(12, 13),
        )
        .with_day(Weekday::Mon, 9..17);
        db.upsert_provider(&provider).unwrap();
        let patient = NewPatient::new("Ada", "Lovelace").into_record();
        db.add_patient(&patient).unwrap();
        (db, patient.patient_id)
    }

    #[test]
    fn test_book_then_conflict() {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);

        let first = ledger
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(9, 0), 60))
            .unwrap();
        assert_eq!(first.status, AppointmentStatus::Scheduled);

        let result =
            ledger.book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(9, 30), 30));
        assert!(matches!(result, Err(SchedulerError::SlotConflict { .. })));

        // Adjacent slot is fine
        ledger
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(10, 0), 30))
            .unwrap();
        assert_eq!(db.list_appointments().unwrap().len(), 2);
    }

    #[test]
    fn test_book_rejects_off_grid_and_out_of_hours() {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);

        let off_grid =
            ledger.book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(9, 15), 30));
        assert!(matches!(off_grid, Err(SchedulerError::InvalidInput(_))));

        let late =
            ledger.book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(16, 30), 60));
        assert!(matches!(late, Err(SchedulerError::InvalidInput(_))));
    }

    #[test]
    fn test_book_rejects_starts_outside_template() {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);
        let sunday = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();

        let closed_day =
            ledger.book_atomic(&BookingRequest::new(&patient_id, "D001", sunday, hm(10, 0), 60));
        assert!(matches!(closed_day, Err(SchedulerError::InvalidInput(_))));

        let lunch =
            ledger.book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(12, 0), 30));
        assert!(matches!(lunch, Err(SchedulerError::InvalidInput(_))));

        let half_past =
            ledger.book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(12, 30), 30));
        assert!(matches!(half_past, Err(SchedulerError::InvalidInput(_))));

        assert!(db.list_appointments().unwrap().is_empty());
    }

    #[test]
    fn test_reschedule_moves_and_frees_old_slot() {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);
        let appt = ledger
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(9, 0), 60))
            .unwrap();
        let other = ledger
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(14, 0), 60))
            .unwrap();

        // Overlapping its own span is fine
        let moved = ledger
            .reschedule_atomic(&appt.appointment_id, monday(), hm(9, 30))
            .unwrap();
        assert_eq!(moved.start_time, hm(9, 30));
        assert_eq!(moved.duration_minutes, 60);
        assert_eq!(moved.status, AppointmentStatus::Scheduled);

        let clash = ledger.reschedule_atomic(&appt.appointment_id, monday(), hm(14, 0));
        assert!(matches!(clash, Err(SchedulerError::SlotConflict { .. })));

        let lunch = ledger.reschedule_atomic(&appt.appointment_id, monday(), hm(12, 0));
        assert!(matches!(lunch, Err(SchedulerError::InvalidInput(_))));

        ledger
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(9, 0), 30))
            .unwrap();

        ledger
            .update_status_atomic(&other.appointment_id, AppointmentStatus::Cancelled)
            .unwrap();
        let cancelled = ledger.reschedule_atomic(&other.appointment_id, monday(), hm(15, 0));
        assert!(matches!(cancelled, Err(SchedulerError::InvalidInput(_))));
    }

    #[test]
    fn test_book_unknown_parties() {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);

        let no_provider =
            ledger.book_atomic(&BookingRequest::new(&patient_id, "D999", monday(), hm(9, 0), 60));
        assert!(matches!(no_provider, Err(SchedulerError::NotFound(_))));

        let no_patient =
            ledger.book_atomic(&BookingRequest::new("P-missing", "D001", monday(), hm(9, 0), 60));
        assert!(matches!(no_patient, Err(SchedulerError::NotFound(_))));
    }

    #[test]
    fn test_status_transitions() {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);
        let appt = ledger
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(9, 0), 60))
            .unwrap();

        let illegal =
            ledger.update_status_atomic(&appt.appointment_id, AppointmentStatus::Completed);
        assert!(matches!(
            illegal,
            Err(SchedulerError::InvalidTransition {
                from: AppointmentStatus::Scheduled,
                to: AppointmentStatus::Completed
            })
        ));

        ledger
            .update_status_atomic(&appt.appointment_id, AppointmentStatus::Confirmed)
            .unwrap();
        let done = ledger
            .update_status_atomic(&appt.appointment_id, AppointmentStatus::Completed)
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);

        let patient = db.get_patient(&patient_id).unwrap().unwrap();
        assert_eq!(patient.total_visits, 1);
        assert_eq!(patient.last_visit, Some(monday()));

        let missing = ledger.update_status_atomic("nope", AppointmentStatus::Cancelled);
        assert!(matches!(missing, Err(SchedulerError::NotFound(_))));
    }

    #[test]
    fn test_cancel_frees_slot_for_rebooking() {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);
        let appt = ledger
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(9, 0), 60))
            .unwrap();
        ledger
            .update_status_atomic(&appt.appointment_id, AppointmentStatus::Cancelled)
            .unwrap();

        ledger
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), hm(9, 0), 60))
            .unwrap();
    }
}
