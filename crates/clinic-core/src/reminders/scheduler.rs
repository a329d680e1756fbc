//! Reminder creation, due selection, delivery bookkeeping and replies.

use std::sync::Mutex;

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use super::queue::DueQueue;
use crate::config::{DuePolicy, ReminderPolicy};
use crate::db::{Database, DeliveryFlag};
use crate::directory::PatientDirectory;
use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{Appointment, PatientRecord, Reminder, ReminderResponse, ReminderType};
use crate::notify::{NotificationGateway, ReminderDelivery};

/// A reminder ready to send, with what the message needs.
#[derive(Debug, Clone)]
pub struct DueReminder {
    pub reminder: Reminder,
    pub appointment: Appointment,
    pub patient: PatientRecord,
}

/// Result of matching an inbound reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    Recorded {
        reminder_id: String,
        appointment_id: String,
        response: ReminderResponse,
    },
    PatientNotFound,
    NoPendingReminder,
}

impl ReplyOutcome {
    /// Text returned to the sender.
    pub fn acknowledgement(&self) -> &'static str {
        match self {
            ReplyOutcome::Recorded { response, .. } => response.acknowledgement(),
            ReplyOutcome::PatientNotFound => "Patient not found",
            ReplyOutcome::NoPendingReminder => "No pending reminders found",
        }
    }
}

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Reminders handed to the gateway
    pub attempted: usize,
    /// Reminders whose `sent` flag flipped
    pub sent: usize,
    /// Reminders where every attempted channel failed
    pub failed: usize,
    /// Due reminders dropped for a missing patient or appointment
    pub skipped: usize,
}

/// Owns reminder rows for booked appointments.
pub struct ReminderScheduler<'a> {
    db: &'a Database,
    policy: &'a ReminderPolicy,
}

impl<'a> ReminderScheduler<'a> {
    pub fn new(db: &'a Database, policy: &'a ReminderPolicy) -> Self {
        Self { db, policy }
    }

    /// Create the three reminders for an appointment.
    pub fn schedule(&self, appointment: &Appointment) -> SchedulerResult<Vec<Reminder>> {
        let starts_at = appointment.starts_at();
        let mut reminders = Vec::with_capacity(ReminderType::ALL.len());

        for (reminder_type, hours) in ReminderType::ALL.iter().zip(self.policy.offsets_hours) {
            let reminder = Reminder::new(
                &appointment.appointment_id,
                &appointment.patient_id,
                *reminder_type,
                starts_at - Duration::hours(hours),
            );
            if !self.db.insert_reminder(&reminder)? {
                return Err(SchedulerError::Duplicate(format!(
                    "{} reminder for appointment {}",
                    reminder_type.as_str(),
                    appointment.appointment_id
                )));
            }
            reminders.push(reminder);
        }

        debug!(
            "Scheduled {} reminders for appointment {}",
            reminders.len(),
            appointment.appointment_id
        );
        Ok(reminders)
    }

    /// Pending reminders due at `now`, earliest first.
    pub fn collect_due(&self, now: NaiveDateTime) -> SchedulerResult<(Vec<DueReminder>, usize)> {
        let mut queue: DueQueue = self.db.list_pending_reminders()?.into_iter().collect();
        let limit = match self.policy.due {
            DuePolicy::CatchUp => now,
            DuePolicy::Window(window) => now + window,
        };

        let mut due = Vec::new();
        let mut skipped = 0;
        for reminder in queue.pop_until(limit) {
            let Some(item) = self.load_context(reminder)? else {
                skipped += 1;
                continue;
            };
            if self.is_due(&item, now) {
                due.push(item);
            }
        }

        Ok((due, skipped))
    }

    /// Due reminders this caller now holds the dispatch lease on.
    ///
    /// A reminder another dispatcher is already sending is left out.
    pub fn claim_due(&self, now: NaiveDateTime) -> SchedulerResult<(Vec<DueReminder>, usize)> {
        let (due, skipped) = self.collect_due(now)?;
        let until = now + self.policy.claim_lease;

        let mut claimed = Vec::with_capacity(due.len());
        for item in due {
            if self
                .db
                .claim_reminder(&item.reminder.reminder_id, false, now, until)?
            {
                claimed.push(item);
            } else {
                debug!("Reminder {} already claimed", item.reminder.reminder_id);
            }
        }
        Ok((claimed, skipped))
    }

    /// Earliest future fire time among pending reminders.
    pub fn next_fire_time(&self, now: NaiveDateTime) -> SchedulerResult<Option<NaiveDateTime>> {
        let queue: DueQueue = self.db.list_pending_reminders()?.into_iter().collect();
        Ok(queue.next_after(now))
    }

    fn is_due(&self, item: &DueReminder, now: NaiveDateTime) -> bool {
        if !item.appointment.status.is_active() {
            return false;
        }
        let fire_at = item.reminder.scheduled_time;
        match self.policy.due {
            DuePolicy::CatchUp => fire_at <= now && item.appointment.starts_at() > now,
            DuePolicy::Window(window) => (now - fire_at).abs() <= window,
        }
    }

    fn load_context(&self, reminder: Reminder) -> SchedulerResult<Option<DueReminder>> {
        let appointment = self.db.get_appointment(&reminder.appointment_id)?;
        let patient = self.db.get_patient(&reminder.patient_id)?;
        match (appointment, patient) {
            (Some(appointment), Some(patient)) => Ok(Some(DueReminder {
                reminder,
                appointment,
                patient,
            })),
            _ => {
                warn!(
                    "Could not find patient or appointment for reminder {}",
                    reminder.reminder_id
                );
                Ok(None)
            }
        }
    }

    /// Record channel results and drop the lease; flips `sent` when any
    /// channel succeeded.
    pub fn finish(&self, reminder: &Reminder, delivery: ReminderDelivery) -> SchedulerResult<bool> {
        self.db.release_reminder(&reminder.reminder_id)?;
        if delivery.sms == Some(true) {
            self.db.set_channel_delivered(&reminder.reminder_id, DeliveryFlag::Sms)?;
        }
        if delivery.email == Some(true) {
            self.db.set_channel_delivered(&reminder.reminder_id, DeliveryFlag::Email)?;
        }

        if !delivery.any_delivered() {
            warn!(
                "Reminder {} ({}) failed on every channel, will retry",
                reminder.reminder_id,
                reminder.reminder_type.as_str()
            );
            return Ok(false);
        }

        Ok(self.db.mark_reminder_sent(&reminder.reminder_id)?)
    }

    /// Sent reminders with a failed channel whose appointment is still upcoming.
    pub fn collect_undelivered(&self, now: NaiveDateTime) -> SchedulerResult<Vec<DueReminder>> {
        let mut items = Vec::new();
        for reminder in self.db.list_partially_delivered_reminders()? {
            if let Some(item) = self.load_context(reminder)? {
                if item.appointment.status.is_active() && item.appointment.starts_at() > now {
                    items.push(item);
                }
            }
        }
        Ok(items)
    }

    /// Undelivered reminders this caller now holds the lease on, re-read
    /// after claiming so already-repaired channels are not sent twice.
    pub fn claim_undelivered(&self, now: NaiveDateTime) -> SchedulerResult<Vec<DueReminder>> {
        let until = now + self.policy.claim_lease;
        let mut claimed = Vec::new();
        for mut item in self.collect_undelivered(now)? {
            let id = item.reminder.reminder_id.clone();
            if !self.db.claim_reminder(&id, true, now, until)? {
                debug!("Reminder {} already claimed", id);
                continue;
            }
            match self.db.get_reminder(&id)? {
                Some(fresh) if fresh.undelivered_channels() != (false, false) => {
                    item.reminder = fresh;
                    claimed.push(item);
                }
                _ => {
                    self.db.release_reminder(&id)?;
                }
            }
        }
        Ok(claimed)
    }

    /// Match a reply to the sender's pending reminder and store it.
    pub fn record_response(
        &self,
        phone: &str,
        text: &str,
        now: NaiveDateTime,
    ) -> SchedulerResult<ReplyOutcome> {
        let Some(patient) = PatientDirectory::new(self.db).find_by_reply_phone(phone)? else {
            info!("Reply from unknown number {}", phone);
            return Ok(ReplyOutcome::PatientNotFound);
        };

        let open: Vec<Reminder> = self
            .db
            .reminders_for_patient(&patient.patient_id)?
            .into_iter()
            .filter(|r| r.is_pending() && r.response.is_none())
            .collect();

        let Some(target) = self.pick_reply_target(open, now)? else {
            return Ok(ReplyOutcome::NoPendingReminder);
        };

        let response = ReminderResponse::interpret(text);
        if !self
            .db
            .set_reminder_response(&target.reminder_id, response.stored_value())?
        {
            return Ok(ReplyOutcome::NoPendingReminder);
        }

        info!(
            "Recorded reply '{}' for reminder {} (appointment {})",
            response.stored_value(),
            target.reminder_id,
            target.appointment_id
        );
        Ok(ReplyOutcome::Recorded {
            reminder_id: target.reminder_id,
            appointment_id: target.appointment_id,
            response,
        })
    }

    /// Nearest upcoming appointment's earliest reminder, else the oldest one.
    fn pick_reply_target(
        &self,
        open: Vec<Reminder>,
        now: NaiveDateTime,
    ) -> SchedulerResult<Option<Reminder>> {
        let mut upcoming: Vec<(NaiveDateTime, Reminder)> = Vec::new();
        for reminder in &open {
            if let Some(appt) = self.db.get_appointment(&reminder.appointment_id)? {
                if appt.status.is_active() && appt.starts_at() > now {
                    upcoming.push((appt.starts_at(), reminder.clone()));
                }
            }
        }

        if let Some((_, reminder)) = upcoming
            .into_iter()
            .min_by(|(a_at, a), (b_at, b)| (a_at, a.reminder_type).cmp(&(b_at, b.reminder_type)))
        {
            return Ok(Some(reminder));
        }

        Ok(open.into_iter().min_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.reminder_type.cmp(&b.reminder_type))
        }))
    }
}

/// Send every due reminder.
///
/// The database lock is held only to claim due reminders and to record each
/// result; channel calls run without it. Claimed rows stay invisible to other
/// dispatchers until `finish` releases them or the lease runs out.
pub fn dispatch_due(
    db: &Mutex<Database>,
    gateway: &NotificationGateway,
    policy: &ReminderPolicy,
    now: NaiveDateTime,
) -> SchedulerResult<DispatchReport> {
    let (due, skipped) = {
        let db = db.lock()?;
        ReminderScheduler::new(&db, policy).claim_due(now)?
    };

    let mut report = DispatchReport {
        skipped,
        ..Default::default()
    };

    for item in due {
        let reminder_type = item.reminder.reminder_type;
        let delivery = gateway.send_reminder(
            &item.patient,
            &item.appointment,
            reminder_type,
            true,
            reminder_type.includes_email(),
        );
        report.attempted += 1;

        let db = db.lock()?;
        if ReminderScheduler::new(&db, policy).finish(&item.reminder, delivery)? {
            report.sent += 1;
            info!(
                "Sent {} reminder {} for appointment {}",
                reminder_type.as_str(),
                item.reminder.reminder_id,
                item.appointment.appointment_id
            );
        } else if !delivery.any_delivered() {
            report.failed += 1;
        }
    }

    Ok(report)
}

/// Re-send only the failed channel of reminders already marked sent.
pub fn retry_undelivered(
    db: &Mutex<Database>,
    gateway: &NotificationGateway,
    policy: &ReminderPolicy,
    now: NaiveDateTime,
) -> SchedulerResult<DispatchReport> {
    let items = {
        let db = db.lock()?;
        ReminderScheduler::new(&db, policy).claim_undelivered(now)?
    };

    let mut report = DispatchReport::default();
    for item in items {
        let (sms, email) = item.reminder.undelivered_channels();
        let delivery = gateway.send_reminder(
            &item.patient,
            &item.appointment,
            item.reminder.reminder_type,
            sms,
            email,
        );
        report.attempted += 1;

        let db = db.lock()?;
        ReminderScheduler::new(&db, policy).finish(&item.reminder, delivery)?;
        if delivery.any_delivered() {
            report.sent += 1;
        } else {
            report.failed += 1;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppointmentStatus, BookingRequest, HourWindow, NewPatient, ProviderSchedule,
    };
    use crate::notify::MemoryCommunicationLog;
    use crate::schedule::BookingLedger;
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use std::sync::Arc;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 6).unwrap()
    }

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_hms_opt(h, m, 0).unwrap()
    }

    fn setup_db() -> (Database, Appointment) {
        let db = Database::open_in_memory().unwrap();
        let provider = ProviderSchedule::new(
            "D001",
            "Dr. Rao",
            HourWindow::new(9, 17),
            HourWindow::new(12, 13),
        )
        .with_day(Weekday::Mon, 9..17);
        db.upsert_provider(&provider).unwrap();
        let patient = NewPatient::new("Ada", "Lovelace")
            .with_phone("5551234567")
            .into_record();
        db.add_patient(&patient).unwrap();
        let appt = BookingLedger::new(&db)
            .book_atomic(&BookingRequest::new(
                &patient.patient_id,
                "D001",
                monday(),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                60,
            ))
            .unwrap();
        (db, appt)
    }

    #[test]
    fn test_schedule_three_in_order() {
        let (db, appt) = setup_db();
        let policy = ReminderPolicy::default();
        let reminders = ReminderScheduler::new(&db, &policy).schedule(&appt).unwrap();

        let kinds: Vec<_> = reminders.iter().map(|r| r.reminder_type).collect();
        assert_eq!(kinds, ReminderType::ALL.to_vec());
        assert_eq!(reminders[0].scheduled_time, at(monday().pred_opt().unwrap(), 10, 0));
        assert_eq!(reminders[1].scheduled_time, at(monday(), 8, 0));
        assert_eq!(reminders[2].scheduled_time, at(monday(), 9, 0));
        assert!(reminders.iter().all(|r| !r.sent));

        // Second scheduling is rejected
        assert!(ReminderScheduler::new(&db, &policy).schedule(&appt).is_err());
    }

    #[test]
    fn test_catch_up_after_downtime() {
        let (db, appt) = setup_db();
        let policy = ReminderPolicy::default();
        let scheduler = ReminderScheduler::new(&db, &policy);
        scheduler.schedule(&appt).unwrap();

        // Down from the day before until 08:30 on the day
        let (due, _) = scheduler.collect_due(at(monday(), 8, 30)).unwrap();
        let kinds: Vec<_> = due.iter().map(|d| d.reminder.reminder_type).collect();
        assert_eq!(kinds, vec![ReminderType::Initial, ReminderType::FormCheck]);

        // Nothing after the appointment has started
        let (due, _) = scheduler.collect_due(at(monday(), 10, 5)).unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn test_window_policy_misses_late_reminders() {
        let (db, appt) = setup_db();
        let policy = ReminderPolicy {
            due: DuePolicy::Window(Duration::minutes(5)),
            ..Default::default()
        };
        let scheduler = ReminderScheduler::new(&db, &policy);
        scheduler.schedule(&appt).unwrap();

        let (due, _) = scheduler.collect_due(at(monday(), 8, 30)).unwrap();
        assert!(due.is_empty());

        let (due, _) = scheduler.collect_due(at(monday(), 8, 57)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].reminder.reminder_type, ReminderType::Confirmation);
    }

    #[test]
    fn test_cancelled_appointment_not_due() {
        let (db, appt) = setup_db();
        let policy = ReminderPolicy::default();
        ReminderScheduler::new(&db, &policy).schedule(&appt).unwrap();
        BookingLedger::new(&db)
            .update_status_atomic(&appt.appointment_id, AppointmentStatus::Cancelled)
            .unwrap();

        let (due, _) = ReminderScheduler::new(&db, &policy)
            .collect_due(at(monday(), 9, 30))
            .unwrap();
        assert!(due.is_empty());
    }

    #[test]
    fn test_dispatch_marks_sent_once() {
        let (db, appt) = setup_db();
        let policy = ReminderPolicy::default();
        ReminderScheduler::new(&db, &policy).schedule(&appt).unwrap();
        let db = Mutex::new(db);
        let log = Arc::new(MemoryCommunicationLog::new());
        let gateway = NotificationGateway::new(log.clone());

        let now = at(monday(), 8, 30);
        let report = dispatch_due(&db, &gateway, &policy, now).unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.sent, 2);

        // Initial sends SMS and email, form check only SMS
        assert_eq!(log.entries().len(), 3);

        let again = dispatch_due(&db, &gateway, &policy, now).unwrap();
        assert_eq!(again.attempted, 0);
    }

    #[test]
    fn test_claimed_reminder_is_not_claimed_twice() {
        let (db, appt) = setup_db();
        let policy = ReminderPolicy::default();
        let scheduler = ReminderScheduler::new(&db, &policy);
        scheduler.schedule(&appt).unwrap();

        let now = at(monday(), 8, 30);
        let (first, _) = scheduler.claim_due(now).unwrap();
        assert_eq!(first.len(), 2);
        let (second, _) = scheduler.claim_due(now).unwrap();
        assert!(second.is_empty());

        // A failed send releases the lease so the next pass picks it up
        let failed = ReminderDelivery {
            sms: Some(false),
            email: None,
        };
        assert!(!scheduler.finish(&first[1].reminder, failed).unwrap());
        let (retry, _) = scheduler.claim_due(now).unwrap();
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].reminder.reminder_id, first[1].reminder.reminder_id);
    }

    #[test]
    fn test_reply_confirms_pending_reminder() {
        let (db, appt) = setup_db();
        let policy = ReminderPolicy::default();
        let scheduler = ReminderScheduler::new(&db, &policy);
        scheduler.schedule(&appt).unwrap();

        let outcome = scheduler
            .record_response("5551234567", "yes", at(monday(), 7, 0))
            .unwrap();
        match outcome {
            ReplyOutcome::Recorded { response, appointment_id, .. } => {
                assert_eq!(response, ReminderResponse::Confirmed);
                assert_eq!(appointment_id, appt.appointment_id);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let reminders = db.reminders_for_appointment(&appt.appointment_id).unwrap();
        assert_eq!(reminders[0].response.as_deref(), Some("confirmed"));
        assert!(!reminders[0].sent);
    }

    #[test]
    fn test_reply_from_unknown_number() {
        let (db, _) = setup_db();
        let policy = ReminderPolicy::default();
        let outcome = ReminderScheduler::new(&db, &policy)
            .record_response("+14155550199", "YES", at(monday(), 7, 0))
            .unwrap();
        assert_eq!(outcome, ReplyOutcome::PatientNotFound);
        assert_eq!(outcome.acknowledgement(), "Patient not found");
    }
}
