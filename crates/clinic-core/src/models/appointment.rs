//! Appointment models.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Appointment lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked, not yet confirmed by the patient
    Scheduled,
    /// Patient confirmed attendance
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "completed" => Some(AppointmentStatus::Completed),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed | AppointmentStatus::NoShow
        )
    }

    /// Whether the appointment still holds its slot and expects the patient.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }

    /// Transition table.
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Scheduled, Confirmed)
                | (Scheduled, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
        )
    }
}

/// Insurance details captured at booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insurance {
    pub carrier: String,
    pub member_id: String,
    pub group_number: Option<String>,
}

/// A booked appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub appointment_id: String,
    pub patient_id: String,
    pub provider_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Length in minutes, a multiple of the 30-minute sub-slot
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub insurance: Option<Insurance>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Appointment {
    /// Start as a local date-time.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn formatted_time(&self) -> String {
        self.start_time.format("%H:%M").to_string()
    }
}

/// Request to book a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub patient_id: String,
    pub provider_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub insurance: Option<Insurance>,
    pub notes: Option<String>,
}

impl BookingRequest {
    pub fn new(
        patient_id: impl Into<String>,
        provider_id: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            provider_id: provider_id.into(),
            date,
            start_time,
            duration_minutes,
            insurance: None,
            notes: None,
        }
    }

    pub fn with_insurance(mut self, insurance: Insurance) -> Self {
        self.insurance = Some(insurance);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AppointmentStatus::*;

    #[test]
    fn test_transition_table() {
        assert!(Scheduled.can_transition_to(Confirmed));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(!Scheduled.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(NoShow));
        assert!(!Confirmed.can_transition_to(Scheduled));

        for terminal in [Cancelled, Completed, NoShow] {
            assert!(terminal.is_terminal());
            for next in [Scheduled, Confirmed, Cancelled, Completed, NoShow] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [Scheduled, Confirmed, Cancelled, Completed, NoShow] {
            assert_eq!(AppointmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("pending"), None);
    }
}
