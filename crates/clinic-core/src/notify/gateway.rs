//! Notification gateway: SMS and email dispatch with graceful degradation.
//!
//! A message that cannot reach a real provider for an expected reason
//! (placeholder number, missing credentials, account limits) is written to
//! the communication log and reported as delivered. Only genuine provider or
//! transport errors count as failures.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::log::{CommunicationLog, DispatchKind, FileCommunicationLog, LogEntry};
use super::smtp::SmtpEmailTransport;
use super::templates;
use super::twilio::{SmsError, SmsProvider, TwilioSmsProvider};
use crate::config::{EmailConfig, NotificationConfig};
use crate::models::{Appointment, PatientRecord, ReminderType};

/// Outbound channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Email,
}

/// Result of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Not transmitted, but counts as delivered
    Degraded(String),
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, DeliveryOutcome::Failed(_))
    }
}

/// Email handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<PathBuf>,
}

/// Delivers email over SMTP or another mail API.
pub trait EmailTransport: Send + Sync {
    fn send(&self, email: &OutgoingEmail, config: &EmailConfig) -> Result<()>;
}

/// Per-channel success of a multi-channel notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Receipt {
    pub sms: bool,
    pub email: bool,
}

/// Channels attempted for a reminder and whether each succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReminderDelivery {
    pub sms: Option<bool>,
    pub email: Option<bool>,
}

impl ReminderDelivery {
    /// True when any attempted channel succeeded.
    pub fn any_delivered(&self) -> bool {
        self.sms == Some(true) || self.email == Some(true)
    }
}

/// Sends patient notifications and records every attempt.
pub struct NotificationGateway {
    sms: Option<Box<dyn SmsProvider>>,
    email_config: EmailConfig,
    email: Option<Box<dyn EmailTransport>>,
    log: Arc<dyn CommunicationLog>,
}

impl NotificationGateway {
    /// Gateway with no providers; everything is simulated into `log`.
    pub fn new(log: Arc<dyn CommunicationLog>) -> Self {
        Self {
            sms: None,
            email_config: EmailConfig::default(),
            email: None,
            log,
        }
    }

    /// Build from configuration, using Twilio and SMTP when credentials are
    /// present.
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        let log = Arc::new(FileCommunicationLog::new(&config.log_dir));
        let mut gateway = Self::new(log).with_email_config(config.email.clone());

        if config.email.is_configured() {
            gateway =
                gateway.with_email_transport(Box::new(SmtpEmailTransport::new(&config.email)?));
            info!(
                "SMTP email enabled via {}:{}",
                config.email.smtp_server, config.email.smtp_port
            );
        }

        match &config.twilio {
            Some(twilio) => {
                gateway = gateway.with_sms_provider(Box::new(TwilioSmsProvider::new(twilio)?));
                info!("Twilio SMS enabled from {}", twilio.from_number);
            }
            None => info!("No SMS provider configured, SMS will be simulated"),
        }

        Ok(gateway)
    }

    pub fn with_sms_provider(mut self, provider: Box<dyn SmsProvider>) -> Self {
        self.sms = Some(provider);
        self
    }

    pub fn with_email_transport(mut self, transport: Box<dyn EmailTransport>) -> Self {
        self.email = Some(transport);
        self
    }

    pub fn with_email_config(mut self, config: EmailConfig) -> Self {
        self.email_config = config;
        self
    }

    pub fn sms_enabled(&self) -> bool {
        self.sms.is_some()
    }

    pub fn email_enabled(&self) -> bool {
        self.email_config.is_configured() && self.email.is_some()
    }

    /// Single-channel send reduced to success or failure.
    pub fn send(&self, channel: Channel, destination: &str, message: &str) -> bool {
        match channel {
            Channel::Sms => self.send_sms(destination, message).is_success(),
            Channel::Email => self
                .send_email(destination, "Clinic notification", message, Vec::new())
                .is_success(),
        }
    }

    pub fn send_sms(&self, destination: &str, body: &str) -> DeliveryOutcome {
        if is_placeholder_phone(destination) {
            debug!("Skipping SMS to placeholder number {}", destination);
            self.record(LogEntry::new(Channel::Sms, DispatchKind::Simulated, destination, body));
            return DeliveryOutcome::Degraded("placeholder number".to_string());
        }

        let Some(provider) = &self.sms else {
            self.record(LogEntry::new(Channel::Sms, DispatchKind::Simulated, destination, body));
            return DeliveryOutcome::Degraded("no SMS provider configured".to_string());
        };

        match provider.send(destination, body) {
            Ok(sid) => {
                info!("SMS sent to {} (SID: {})", destination, sid);
                self.record(
                    LogEntry::new(Channel::Sms, DispatchKind::Real, destination, body)
                        .with_reference(sid),
                );
                DeliveryOutcome::Delivered
            }
            Err(SmsError::Limited(reason)) => {
                warn!("SMS provider limitation for {}: {}", destination, reason);
                self.record(LogEntry::new(
                    Channel::Sms,
                    DispatchKind::SimulatedLimit,
                    destination,
                    body,
                ));
                DeliveryOutcome::Degraded(reason)
            }
            Err(e) => {
                warn!("SMS to {} failed: {}", destination, e);
                self.record(
                    LogEntry::new(Channel::Sms, DispatchKind::Failed, destination, body)
                        .with_error(e.to_string()),
                );
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn send_email(
        &self,
        destination: &str,
        subject: &str,
        html: &str,
        attachments: Vec<PathBuf>,
    ) -> DeliveryOutcome {
        let attachment_names: Vec<String> =
            attachments.iter().map(|p| p.display().to_string()).collect();
        let entry = |kind| {
            LogEntry::new(Channel::Email, kind, destination, html)
                .with_subject(subject)
                .with_attachments(attachment_names.clone())
        };

        if !self.email_config.is_configured() {
            debug!("Email credentials not configured, simulating email to {}", destination);
            self.record(entry(DispatchKind::Simulated));
            return DeliveryOutcome::Degraded("email credentials not configured".to_string());
        }

        let result = match (&self.email, destination.trim().is_empty()) {
            (_, true) => Err(anyhow::anyhow!("no email address")),
            (None, false) => Err(anyhow::anyhow!("no email transport installed")),
            (Some(transport), false) => transport.send(
                &OutgoingEmail {
                    from: self.email_config.username.clone(),
                    to: destination.to_string(),
                    subject: subject.to_string(),
                    html: html.to_string(),
                    attachments,
                },
                &self.email_config,
            ),
        };

        match result {
            Ok(()) => {
                info!("Email sent to {}: {}", destination, subject);
                self.record(entry(DispatchKind::Real));
                DeliveryOutcome::Delivered
            }
            Err(e) => {
                warn!("Email to {} failed: {:#}", destination, e);
                self.record(entry(DispatchKind::Failed).with_error(format!("{:#}", e)));
                DeliveryOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    /// Email and SMS sent right after a booking.
    pub fn send_booking_confirmation(
        &self,
        patient: &PatientRecord,
        appointment: &Appointment,
    ) -> Receipt {
        let email = templates::booking_confirmation_email(patient, appointment);
        Receipt {
            email: self
                .send_email(&patient.email, &email.subject, &email.html, Vec::new())
                .is_success(),
            sms: self
                .send_sms(&patient.phone, &templates::booking_confirmation_sms(appointment))
                .is_success(),
        }
    }

    /// Email with the intake forms attached.
    pub fn send_intake_forms(
        &self,
        patient: &PatientRecord,
        appointment: &Appointment,
        forms: &[PathBuf],
    ) -> DeliveryOutcome {
        let email = templates::intake_forms_email(patient, appointment);
        self.send_email(&patient.email, &email.subject, &email.html, forms.to_vec())
    }

    /// Email and SMS telling the patient where the appointment moved.
    pub fn send_reschedule_notice(
        &self,
        patient: &PatientRecord,
        previous: &Appointment,
        appointment: &Appointment,
    ) -> Receipt {
        let email = templates::reschedule_email(patient, previous, appointment);
        Receipt {
            email: self
                .send_email(&patient.email, &email.subject, &email.html, Vec::new())
                .is_success(),
            sms: self
                .send_sms(&patient.phone, &templates::reschedule_sms(appointment))
                .is_success(),
        }
    }

    pub fn send_cancellation_notice(
        &self,
        patient: &PatientRecord,
        appointment: &Appointment,
    ) -> Receipt {
        let email = templates::cancellation_email(patient, appointment);
        Receipt {
            email: self
                .send_email(&patient.email, &email.subject, &email.html, Vec::new())
                .is_success(),
            sms: self
                .send_sms(&patient.phone, &templates::cancellation_sms(appointment))
                .is_success(),
        }
    }

    /// Send a reminder on the requested channels.
    pub fn send_reminder(
        &self,
        patient: &PatientRecord,
        appointment: &Appointment,
        reminder_type: ReminderType,
        sms: bool,
        email: bool,
    ) -> ReminderDelivery {
        let mut delivery = ReminderDelivery::default();
        if sms {
            let body = templates::reminder_sms(patient, appointment, reminder_type);
            delivery.sms = Some(self.send_sms(&patient.phone, &body).is_success());
        }
        if email {
            let message = templates::reminder_email(patient, appointment);
            delivery.email = Some(
                self.send_email(&patient.email, &message.subject, &message.html, Vec::new())
                    .is_success(),
            );
        }
        delivery
    }

    fn record(&self, entry: LogEntry) {
        if let Err(e) = self.log.append(&entry) {
            warn!("Failed to write communication log: {:#}", e);
        }
    }
}

/// Numbers that are never transmitted: fewer than ten digits, or a national
/// number beginning with 555, 123, 000 or 999.
pub fn is_placeholder_phone(phone: &str) -> bool {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let national = if digits.len() == 11 && digits.starts_with('1') {
        &digits[1..]
    } else {
        digits.as_str()
    };

    national.len() < 10
        || ["555", "123", "000", "999"]
            .iter()
            .any(|prefix| national.starts_with(prefix))
}
