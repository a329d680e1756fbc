//! Free-slot computation over a provider's weekly template.
//!
//! A day is divided into 30-minute sub-slots, indexed from midnight
//! (`09:00` is sub-slot 18). An appointment occupies every sub-slot from its
//! start for `duration / 30` slots. Cancelled appointments occupy nothing.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::db::Database;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{Appointment, AppointmentStatus, ProviderSchedule};

/// Length of one sub-slot in minutes.
pub const SUB_SLOT_MINUTES: u32 = 30;

/// Result of checking one candidate start against a day's bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCheck {
    Free,
    /// The sub-slot at this index is already taken
    Occupied(u32),
    /// The span leaves the provider's working window
    OutsideHours,
}

/// Number of sub-slots a duration needs, truncating partial slots.
pub fn sub_slots_for(duration_minutes: u32) -> SchedulerResult<u32> {
    let count = duration_minutes / SUB_SLOT_MINUTES;
    if count == 0 {
        return Err(SchedulerError::InvalidInput(format!(
            "duration of {} minutes is shorter than one {}-minute slot",
            duration_minutes, SUB_SLOT_MINUTES
        )));
    }
    Ok(count)
}

/// Sub-slot index of a start time, if it lies on the 30-minute grid.
pub fn sub_slot_index(time: NaiveTime) -> Option<u32> {
    if time.second() != 0 || time.nanosecond() != 0 || time.minute() % SUB_SLOT_MINUTES != 0 {
        return None;
    }
    Some(time.hour() * 2 + time.minute() / SUB_SLOT_MINUTES)
}

/// Start time of a sub-slot index.
pub fn sub_slot_time(index: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(index / 2, (index % 2) * SUB_SLOT_MINUTES, 0)
}

/// `HH:MM` rendering used in offered slot lists.
pub fn format_slot(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Sub-slots held by the given appointments.
pub fn occupied_sub_slots<'a, I>(appointments: I) -> BTreeSet<u32>
where
    I: IntoIterator<Item = &'a Appointment>,
{
    let mut occupied = BTreeSet::new();
    for appt in appointments {
        if appt.status == AppointmentStatus::Cancelled {
            continue;
        }
        // Stored start times are always on the grid; round down otherwise.
        let start = appt.start_time.hour() * 2 + appt.start_time.minute() / SUB_SLOT_MINUTES;
        let count = (appt.duration_minutes / SUB_SLOT_MINUTES).max(1);
        occupied.extend(start..start + count);
    }
    occupied
}

/// Check whether `count` sub-slots starting at `start` are bookable.
pub fn check_span(
    provider: &ProviderSchedule,
    occupied: &BTreeSet<u32>,
    start: u32,
    count: u32,
) -> SlotCheck {
    let working = provider.working_hours;
    if start < working.first_sub_slot() || start + count > working.end_sub_slot() {
        return SlotCheck::OutsideHours;
    }
    match (start..start + count).find(|slot| occupied.contains(slot)) {
        Some(slot) => SlotCheck::Occupied(slot),
        None => SlotCheck::Free,
    }
}

/// Whether the provider's template offers a start in this sub-slot's hour on
/// `date`: the weekday has template hours, the hour is one of them and it is
/// not a lunch hour.
pub fn template_offers(provider: &ProviderSchedule, date: NaiveDate, start: u32) -> bool {
    let Ok(hour) = u8::try_from(start / 2) else {
        return false;
    };
    provider
        .hours_on(date.weekday())
        .is_some_and(|hours| hours.contains(&hour))
        && !provider.lunch_break.contains_hour(hour)
}

/// Computes bookable start times for a provider and date.
pub struct AvailabilityCalculator<'a> {
    db: &'a Database,
}

impl<'a> AvailabilityCalculator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Start times, ascending, at which `duration_minutes` fits.
    pub fn available_slots(
        &self,
        provider_id: &str,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> SchedulerResult<Vec<NaiveTime>> {
        let count = sub_slots_for(duration_minutes)?;
        let provider = self.provider(provider_id)?;

        let Some(template) = provider.hours_on(date.weekday()) else {
            return Ok(Vec::new());
        };

        let occupied = self.occupied(provider_id, date)?;

        let slots = template
            .iter()
            .map(|hour| u32::from(*hour) * 2)
            .filter(|start| template_offers(&provider, date, *start))
            .filter(|start| check_span(&provider, &occupied, *start, count) == SlotCheck::Free)
            .filter_map(sub_slot_time)
            .collect();

        Ok(slots)
    }

    /// Available start times rendered as `HH:MM`.
    pub fn available_slot_labels(
        &self,
        provider_id: &str,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> SchedulerResult<Vec<String>> {
        Ok(self
            .available_slots(provider_id, date, duration_minutes)?
            .into_iter()
            .map(format_slot)
            .collect())
    }

    /// Occupied sub-slots for a provider's day.
    pub fn occupied(&self, provider_id: &str, date: NaiveDate) -> SchedulerResult<BTreeSet<u32>> {
        let booked = self.db.appointments_for_provider_on(provider_id, date)?;
        Ok(occupied_sub_slots(&booked))
    }

    fn provider(&self, provider_id: &str) -> SchedulerResult<ProviderSchedule> {
        self.db
            .get_provider_schedule(provider_id)?
            .ok_or_else(|| SchedulerError::NotFound(format!("provider {}", provider_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HourWindow, NewPatient};
    use chrono::Weekday;

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

    fn book(
        db: &Database,
        patient_id: &str,
        start: NaiveTime,
        minutes: u32,
        status: AppointmentStatus,
    ) {
        let now = chrono::Utc::now().to_rfc3339();
        db.insert_appointment(&Appointment {
            appointment_id: uuid::Uuid::new_v4().to_string(),
            patient_id: patient_id.to_string(),
            provider_id: "D001".into(),
            date: monday(),
            start_time: start,
            duration_minutes: minutes,
            status,
            insurance: None,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
        })
        .unwrap();
    }

    #[test]
    fn test_sub_slot_arithmetic() {
        assert_eq!(sub_slot_index(hm(9, 0)), Some(18));
        assert_eq!(sub_slot_index(hm(9, 30)), Some(19));
        assert_eq!(sub_slot_index(hm(9, 15)), None);
        assert_eq!(sub_slot_time(19), Some(hm(9, 30)));
        assert_eq!(sub_slots_for(90).unwrap(), 3);
        assert_eq!(sub_slots_for(45).unwrap(), 1);
        assert!(sub_slots_for(20).is_err());
    }

    #[test]
    fn test_open_day_excludes_lunch() {
        let (db, _) = setup_db();
        let calc = AvailabilityCalculator::new(&db);

        let slots = calc.available_slot_labels("D001", monday(), 60).unwrap();
        assert_eq!(
            slots,
            vec!["09:00", "10:00", "11:00", "13:00", "14:00", "15:00", "16:00"]
        );
    }

    #[test]
    fn test_closed_weekday_is_empty() {
        let (db, _) = setup_db();
        let calc = AvailabilityCalculator::new(&db);
        let sunday = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert!(calc.available_slots("D001", sunday, 60).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_provider() {
        let (db, _) = setup_db();
        let calc = AvailabilityCalculator::new(&db);
        let result = calc.available_slots("D999", monday(), 60);
        assert!(matches!(result, Err(SchedulerError::NotFound(_))));
    }

    #[test]
    fn test_half_hour_booking_blocks_hour() {
        let (db, patient_id) = setup_db();
        book(&db, &patient_id, hm(10, 30), 30, AppointmentStatus::Scheduled);
        let calc = AvailabilityCalculator::new(&db);

        let long = calc.available_slot_labels("D001", monday(), 60).unwrap();
        assert!(!long.contains(&"10:00".to_string()));

        let short = calc.available_slot_labels("D001", monday(), 30).unwrap();
        assert!(short.contains(&"10:00".to_string()));
    }

    #[test]
    fn test_template_offers_hour_not_lunch() {
        let (db, patient_id) = setup_db();
        let provider = db.get_provider_schedule("D001").unwrap().unwrap();
        let sunday = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();

        assert!(template_offers(&provider, monday(), 18));
        assert!(template_offers(&provider, monday(), 19));
        assert!(!template_offers(&provider, monday(), 24));
        assert!(!template_offers(&provider, monday(), 16));
        assert!(!template_offers(&provider, sunday, 18));

        book(&db, &patient_id, hm(9, 0), 60, AppointmentStatus::Scheduled);
        let occupied = AvailabilityCalculator::new(&db).occupied("D001", monday()).unwrap();
        assert_eq!(occupied.into_iter().collect::<Vec<_>>(), vec![18, 19]);
    }

    #[test]
    fn test_cancelled_frees_slot() {
        let (db, patient_id) = setup_db();
        book(&db, &patient_id, hm(9, 0), 60, AppointmentStatus::Cancelled);
        let calc = AvailabilityCalculator::new(&db);

        let slots = calc.available_slot_labels("D001", monday(), 60).unwrap();
        assert_eq!(slots[0], "09:00");
    }

    #[test]
    fn test_last_hour_too_short_for_long_visit() {
        let (db, _) = setup_db();
        let calc = AvailabilityCalculator::new(&db);

        let slots = calc.available_slot_labels("D001", monday(), 90).unwrap();
        assert!(!slots.contains(&"16:00".to_string()));
        assert!(slots.contains(&"15:00".to_string()));
    }
}
