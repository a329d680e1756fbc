//! Property tests for slot availability and booking.

use chrono::{NaiveDate, NaiveTime, Weekday};
use clinic_core::models::{BookingRequest, HourWindow, NewPatient, ProviderSchedule};
use clinic_core::schedule::{
    occupied_sub_slots, sub_slot_index, AvailabilityCalculator, BookingLedger,
};
use clinic_core::Database;
use proptest::prelude::*;

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

fn setup_db() -> (Database, String) {
    let db = Database::open_in_memory().unwrap();
    let provider =
        ProviderSchedule::new("D001", "Dr. Rao", HourWindow::new(9, 17), HourWindow::new(12, 13))
            .with_day(Weekday::Mon, 9..17);
    db.upsert_provider(&provider).unwrap();

    let patient = NewPatient::new("Ada", "Lovelace")
        .with_phone("4155550100")
        .into_record();
    db.add_patient(&patient).unwrap();
    (db, patient.patient_id)
}

/// Start offsets (in sub-slots from 09:00) and lengths to attempt.
fn attempts() -> impl Strategy<Value = Vec<(u32, u32)>> {
    prop::collection::vec((0u32..16, prop_oneof![Just(30u32), Just(60u32), Just(90u32)]), 0..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_offered_slots_are_free_and_in_hours(
        bookings in attempts(),
        duration in prop_oneof![Just(30u32), Just(60u32)],
    ) {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);
        for (offset, minutes) in bookings {
            let start = NaiveTime::from_hms_opt(9 + offset / 2, (offset % 2) * 30, 0).unwrap();
            // Conflicts, lunch and out-of-hours requests are expected rejections
            let request = BookingRequest::new(&patient_id, "D001", monday(), start, minutes);
            let _ = ledger.book_atomic(&request);
        }

        let booked = db.appointments_for_provider_on("D001", monday()).unwrap();
        let occupied = occupied_sub_slots(&booked);
        let slots = AvailabilityCalculator::new(&db)
            .available_slots("D001", monday(), duration)
            .unwrap();

        let span = duration / 30;
        for slot in slots {
            let start = sub_slot_index(slot).unwrap();
            prop_assert!(start >= 18);
            prop_assert!(start + span <= 34);
            prop_assert!((start..start + span).all(|s| !occupied.contains(&s)));
        }
    }

    #[test]
    fn prop_booked_slot_is_no_longer_offered(
        pick in any::<prop::sample::Index>(),
        duration in prop_oneof![Just(30u32), Just(60u32)],
    ) {
        let (db, patient_id) = setup_db();
        let calculator = AvailabilityCalculator::new(&db);
        let before = calculator.available_slots("D001", monday(), duration).unwrap();
        prop_assume!(!before.is_empty());

        let chosen = before[pick.index(before.len())];
        BookingLedger::new(&db)
            .book_atomic(&BookingRequest::new(&patient_id, "D001", monday(), chosen, duration))
            .unwrap();

        let after = calculator.available_slots("D001", monday(), duration).unwrap();
        prop_assert!(!after.contains(&chosen));
        prop_assert!(after.len() < before.len());
    }

    #[test]
    fn prop_no_two_active_bookings_overlap(bookings in attempts()) {
        let (db, patient_id) = setup_db();
        let ledger = BookingLedger::new(&db);
        for (offset, minutes) in bookings {
            let start = NaiveTime::from_hms_opt(9 + offset / 2, (offset % 2) * 30, 0).unwrap();
            let request = BookingRequest::new(&patient_id, "D001", monday(), start, minutes);
            let _ = ledger.book_atomic(&request);
        }

        let booked = db.appointments_for_provider_on("D001", monday()).unwrap();
        let total: u32 = booked.iter().map(|a| a.duration_minutes / 30).sum();
        prop_assert_eq!(occupied_sub_slots(&booked).len() as u32, total);
    }
}
