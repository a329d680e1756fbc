//! Runtime configuration.
//!
//! Every value has a default matching the clinic's standard day. `from_env`
//! overrides individual values from the environment and falls back to the
//! default, with a warning, whenever a variable is malformed.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::models::HourWindow;

/// Working day used for providers registered without explicit windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClinicHours {
    pub working_hours: HourWindow,
    pub lunch_break: HourWindow,
}

impl Default for ClinicHours {
    fn default() -> Self {
        Self {
            working_hours: HourWindow::new(9, 17),
            lunch_break: HourWindow::new(12, 13),
        }
    }
}

/// Appointment lengths by patient classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationPolicy {
    pub new_patient_minutes: u32,
    pub returning_patient_minutes: u32,
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self {
            new_patient_minutes: 60,
            returning_patient_minutes: 30,
        }
    }
}

/// When a pending reminder counts as due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuePolicy {
    /// Due once its fire time has passed, for as long as the appointment is upcoming.
    CatchUp,
    /// Due only within `±window` of its fire time.
    Window(chrono::Duration),
}

/// Reminder timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPolicy {
    /// Hours before the appointment, one per reminder type in firing order
    pub offsets_hours: [i64; 3],
    pub due: DuePolicy,
    /// Longest the background worker sleeps between scans
    pub poll_interval: Duration,
    /// How long a dispatcher's claim on a reminder holds before another may take it
    pub claim_lease: chrono::Duration,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            offsets_hours: [24, 2, 1],
            due: DuePolicy::CatchUp,
            poll_interval: Duration::from_secs(60),
            claim_lease: chrono::Duration::minutes(10),
        }
    }
}

/// Twilio account used for SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base: String,
}

pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Placeholder username shipped in sample environment files.
pub const PLACEHOLDER_EMAIL_USERNAME: &str = "your_email@gmail.com";

/// Outgoing email account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl EmailConfig {
    /// Whether real credentials were supplied.
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty()
            && !self.password.is_empty()
            && self.username != PLACEHOLDER_EMAIL_USERNAME
    }
}

/// Outbound channels and the communication log location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub twilio: Option<TwilioConfig>,
    pub email: EmailConfig,
    pub log_dir: PathBuf,
    /// Files attached to the intake-forms email sent after booking
    pub intake_forms: Vec<PathBuf>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            twilio: None,
            email: EmailConfig::default(),
            log_dir: PathBuf::from("communication_logs"),
            intake_forms: Vec::new(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub clinic_hours: ClinicHours,
    pub durations: DurationPolicy,
    pub reminders: ReminderPolicy,
    pub notifications: NotificationConfig,
}

impl SchedulerConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let working_hours = HourWindow::new(
            parse_or(&lookup, "WORKING_HOURS_START", defaults.clinic_hours.working_hours.start),
            parse_or(&lookup, "WORKING_HOURS_END", defaults.clinic_hours.working_hours.end),
        );
        let working_hours = if working_hours.start < working_hours.end && working_hours.end <= 24 {
            working_hours
        } else {
            warn!(
                "Working hours {}-{} are not a valid window, using default",
                working_hours.start, working_hours.end
            );
            defaults.clinic_hours.working_hours
        };

        let lunch_break = HourWindow::new(
            parse_or(&lookup, "LUNCH_BREAK_START", defaults.clinic_hours.lunch_break.start),
            parse_or(&lookup, "LUNCH_BREAK_END", defaults.clinic_hours.lunch_break.end),
        );
        let lunch_break = if lunch_break.start <= lunch_break.end && lunch_break.end <= 24 {
            lunch_break
        } else {
            warn!(
                "Lunch break {}-{} is not a valid window, using default",
                lunch_break.start, lunch_break.end
            );
            defaults.clinic_hours.lunch_break
        };

        let durations = DurationPolicy {
            new_patient_minutes: parse_duration(
                &lookup,
                "NEW_PATIENT_DURATION",
                defaults.durations.new_patient_minutes,
            ),
            returning_patient_minutes: parse_duration(
                &lookup,
                "RETURNING_PATIENT_DURATION",
                defaults.durations.returning_patient_minutes,
            ),
        };

        let poll_seconds: u64 = parse_or(
            &lookup,
            "REMINDER_POLL_SECONDS",
            defaults.reminders.poll_interval.as_secs(),
        );
        let due = match lookup("REMINDER_DUE_WINDOW_MINUTES") {
            None => DuePolicy::CatchUp,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(minutes) if minutes > 0 => {
                    DuePolicy::Window(chrono::Duration::minutes(minutes))
                }
                _ => {
                    warn!("REMINDER_DUE_WINDOW_MINUTES='{}' is invalid, using catch-up", raw);
                    DuePolicy::CatchUp
                }
            },
        };

        let claim_minutes: i64 = parse_or(
            &lookup,
            "REMINDER_CLAIM_MINUTES",
            defaults.reminders.claim_lease.num_minutes(),
        );

        let twilio = match (
            non_empty(&lookup, "TWILIO_ACCOUNT_SID"),
            non_empty(&lookup, "TWILIO_AUTH_TOKEN"),
            non_empty(&lookup, "TWILIO_PHONE_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
                api_base: non_empty(&lookup, "TWILIO_API_BASE")
                    .unwrap_or_else(|| TWILIO_API_BASE.to_string()),
            }),
            (None, None, None) => None,
            _ => {
                warn!("Twilio only partially configured, SMS will be simulated");
                None
            }
        };

        let email = EmailConfig {
            smtp_server: non_empty(&lookup, "SMTP_SERVER")
                .unwrap_or(defaults.notifications.email.smtp_server),
            smtp_port: parse_or(&lookup, "SMTP_PORT", defaults.notifications.email.smtp_port),
            username: lookup("EMAIL_USERNAME").unwrap_or_default(),
            password: lookup("EMAIL_PASSWORD").unwrap_or_default(),
        };
        if !email.is_configured() {
            warn!("Email credentials not configured, email will be simulated");
        }

        Self {
            clinic_hours: ClinicHours {
                working_hours,
                lunch_break,
            },
            durations,
            reminders: ReminderPolicy {
                offsets_hours: defaults.reminders.offsets_hours,
                due,
                poll_interval: Duration::from_secs(poll_seconds.max(1)),
                claim_lease: chrono::Duration::minutes(claim_minutes.max(1)),
            },
            notifications: NotificationConfig {
                twilio,
                email,
                log_dir: non_empty(&lookup, "COMMUNICATION_LOG_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.notifications.log_dir),
                intake_forms: lookup("INTAKE_FORM_PATHS")
                    .map(|raw| {
                        raw.split(',')
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(PathBuf::from)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        }
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    match non_empty(lookup, key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{}='{}' is invalid, using default {}", key, raw, default);
            default
        }),
    }
}

fn parse_duration<F>(lookup: &F, key: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    let minutes = parse_or(lookup, key, default);
    if minutes >= 30 && minutes % 30 == 0 {
        minutes
    } else {
        warn!(
            "{}={} is not a whole number of 30-minute slots, using default {}",
            key, minutes, default
        );
        default
    }
}
