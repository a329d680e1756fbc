//! Reminder models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The three reminder stages, in firing order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    /// First notice, sent over SMS and email
    Initial,
    /// Asks whether intake forms are complete
    FormCheck,
    /// Final confirm-or-cancel prompt
    Confirmation,
}

impl ReminderType {
    pub const ALL: [ReminderType; 3] = [
        ReminderType::Initial,
        ReminderType::FormCheck,
        ReminderType::Confirmation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderType::Initial => "initial",
            ReminderType::FormCheck => "form_check",
            ReminderType::Confirmation => "confirmation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(ReminderType::Initial),
            "form_check" => Some(ReminderType::FormCheck),
            "confirmation" => Some(ReminderType::Confirmation),
            _ => None,
        }
    }

    /// Email goes out only with the first reminder.
    pub fn includes_email(&self) -> bool {
        matches!(self, ReminderType::Initial)
    }
}

/// A scheduled reminder for one appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reminder {
    pub reminder_id: String,
    pub appointment_id: String,
    pub patient_id: String,
    pub reminder_type: ReminderType,
    /// Local fire time
    pub scheduled_time: NaiveDateTime,
    /// True once any channel reported success; never reverts
    pub sent: bool,
    pub sms_delivered: bool,
    pub email_delivered: bool,
    /// Patient reply, written at most once
    pub response: Option<String>,
    pub created_at: String,
}

impl Reminder {
    pub fn new(
        appointment_id: impl Into<String>,
        patient_id: impl Into<String>,
        reminder_type: ReminderType,
        scheduled_time: NaiveDateTime,
    ) -> Self {
        Self {
            reminder_id: uuid::Uuid::new_v4().to_string(),
            appointment_id: appointment_id.into(),
            patient_id: patient_id.into(),
            reminder_type,
            scheduled_time,
            sent: false,
            sms_delivered: false,
            email_delivered: false,
            response: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.sent
    }

    /// Channels that were attempted for this reminder type but have not delivered.
    pub fn undelivered_channels(&self) -> (bool, bool) {
        (
            !self.sms_delivered,
            self.reminder_type.includes_email() && !self.email_delivered,
        )
    }
}

/// Interpretation of an inbound reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderResponse {
    Confirmed,
    Cancelled,
    /// Free text stored verbatim
    Other(String),
}

impl ReminderResponse {
    /// Classify reply text by its words, case-insensitively.
    pub fn interpret(text: &str) -> Self {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_uppercase())
            .collect();

        if words.iter().any(|w| w == "YES" || w == "CONFIRM") {
            ReminderResponse::Confirmed
        } else if words.iter().any(|w| w == "NO" || w == "CANCEL") {
            ReminderResponse::Cancelled
        } else {
            ReminderResponse::Other(text.to_string())
        }
    }

    /// Value written to the reminder's `response`.
    pub fn stored_value(&self) -> &str {
        match self {
            ReminderResponse::Confirmed => "confirmed",
            ReminderResponse::Cancelled => "cancelled",
            ReminderResponse::Other(text) => text,
        }
    }

    /// Text sent back to the patient.
    pub fn acknowledgement(&self) -> &'static str {
        match self {
            ReminderResponse::Confirmed => {
                "Thank you for confirming your appointment. We look forward to seeing you!"
            }
            ReminderResponse::Cancelled => {
                "We're sorry you need to cancel. Please call us to reschedule."
            }
            ReminderResponse::Other(_) => {
                "Thank you for your response. We'll review it and get back to you."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_reply_words() {
        assert_eq!(ReminderResponse::interpret("yes"), ReminderResponse::Confirmed);
        assert_eq!(ReminderResponse::interpret(" Confirm! "), ReminderResponse::Confirmed);
        assert_eq!(
            ReminderResponse::interpret("CANCEL - car broke down"),
            ReminderResponse::Cancelled
        );
        assert_eq!(ReminderResponse::interpret("no"), ReminderResponse::Cancelled);
        // "know" must not read as "no"
        assert_eq!(
            ReminderResponse::interpret("I don't know yet"),
            ReminderResponse::Other("I don't know yet".into())
        );
    }

    #[test]
    fn test_reminder_type_order() {
        assert!(ReminderType::Initial < ReminderType::FormCheck);
        assert!(ReminderType::FormCheck < ReminderType::Confirmation);
        assert!(ReminderType::Initial.includes_email());
        assert!(!ReminderType::Confirmation.includes_email());
    }
}
