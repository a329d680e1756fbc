//! Patient-facing message text.

use crate::models::{Appointment, PatientRecord, ReminderType};

/// Rendered email ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
}

fn display_date(appointment: &Appointment) -> String {
    appointment.date.format("%Y-%m-%d").to_string()
}

fn detail_list(appointment: &Appointment, with_duration: bool) -> String {
    let mut items = format!(
        "<li><strong>Appointment ID:</strong> {}</li>\n\
         <li><strong>Date:</strong> {}</li>\n\
         <li><strong>Time:</strong> {}</li>\n",
        appointment.appointment_id,
        display_date(appointment),
        appointment.formatted_time()
    );
    if with_duration {
        items.push_str(&format!(
            "<li><strong>Duration:</strong> {} minutes</li>\n",
            appointment.duration_minutes
        ));
    }
    format!("<ul style=\"list-style: none; padding: 0;\">\n{}</ul>", items)
}

fn wrap(title: &str, patient: &PatientRecord, body: &str) -> String {
    format!(
        "<html>\n\
         <body style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\n\
         <h2 style=\"text-align: center;\">{title}</h2>\n\
         <p>Dear {name},</p>\n\
         {body}\n\
         <p style=\"margin-top: 30px;\">Best regards,<br>\n\
         <strong>Medical Scheduling Team</strong></p>\n\
         </body>\n</html>\n",
        title = title,
        name = patient.full_name(),
        body = body
    )
}

/// Email sent right after booking.
pub fn booking_confirmation_email(
    patient: &PatientRecord,
    appointment: &Appointment,
) -> EmailMessage {
    let body = format!(
        "<p>Your appointment has been successfully scheduled:</p>\n{}\n\
         <p><strong>Important Reminders:</strong></p>\n\
         <ul>\n\
         <li>Please arrive 15 minutes early for your appointment</li>\n\
         <li>Bring a valid ID and insurance card</li>\n\
         <li>Complete any intake forms before your visit</li>\n\
         </ul>\n\
         <p>If you need to reschedule or cancel, please contact us at least \
         24 hours in advance.</p>",
        detail_list(appointment, true)
    );
    EmailMessage {
        subject: format!("Appointment Confirmation - {}", appointment.appointment_id),
        html: wrap("Appointment Confirmation", patient, &body),
    }
}

pub fn booking_confirmation_sms(appointment: &Appointment) -> String {
    format!(
        "Appointment confirmed for {} at {}. Check your email for details.",
        display_date(appointment),
        appointment.formatted_time()
    )
}

/// Email that carries the intake forms as attachments.
pub fn intake_forms_email(patient: &PatientRecord, appointment: &Appointment) -> EmailMessage {
    let body = format!(
        "<p>Please find attached the intake forms for your upcoming appointment on \
         <strong>{}</strong> at <strong>{}</strong>.</p>\n\
         <p><strong>Required Actions:</strong></p>\n\
         <ol>\n\
         <li>Complete the new patient intake form</li>\n\
         <li>Review and complete any additional forms</li>\n\
         <li>Email completed forms back to us at least 24 hours before your appointment</li>\n\
         </ol>\n\
         <p>If you have any questions about the forms, please don't hesitate to contact us.</p>",
        display_date(appointment),
        appointment.formatted_time()
    );
    EmailMessage {
        subject: format!("Intake Forms - Appointment {}", appointment.appointment_id),
        html: wrap("Patient Intake Forms", patient, &body),
    }
}

/// Email that accompanies the first reminder.
pub fn reminder_email(patient: &PatientRecord, appointment: &Appointment) -> EmailMessage {
    let body = format!(
        "<p>This is a friendly reminder about your upcoming appointment:</p>\n{}\n\
         <p><strong>Please confirm your attendance by replying to our text message \
         or calling us.</strong></p>\n\
         <p>If you need to reschedule or cancel, please contact us as soon as possible.</p>",
        detail_list(appointment, true)
    );
    EmailMessage {
        subject: format!("Appointment Reminder - {}", appointment.appointment_id),
        html: wrap("Appointment Reminder", patient, &body),
    }
}

pub fn reminder_sms(
    patient: &PatientRecord,
    appointment: &Appointment,
    reminder_type: ReminderType,
) -> String {
    match reminder_type {
        ReminderType::Initial => format!(
            "APPOINTMENT CONFIRMATION\n\nDear {},\n\n\
             Your appointment is scheduled for:\nDate: {}\nTime: {}\n\n\
             Please confirm your attendance by replying to this message.\n\nThank you!",
            patient.first_name,
            display_date(appointment),
            appointment.formatted_time()
        ),
        ReminderType::FormCheck => format!(
            "FORM COMPLETION CHECK\n\nDear {},\n\nYour appointment is today at {}.\n\n\
             Have you completed your intake forms?\n\nPlease reply:\n\
             YES - if forms are completed\n\
             NO - if forms are not completed\n\nThank you!",
            patient.first_name,
            appointment.formatted_time()
        ),
        ReminderType::Confirmation => format!(
            "FINAL CONFIRMATION\n\nDear {},\n\nYour appointment is in 1 hour at {}.\n\n\
             Please reply:\nCONFIRM - if you're coming\n\
             CANCEL - if you need to cancel (please mention reason)\n\n\
             Thank you!",
            patient.first_name,
            appointment.formatted_time()
        ),
    }
}

pub fn cancellation_email(patient: &PatientRecord, appointment: &Appointment) -> EmailMessage {
    let body = format!(
        "<p>We have received your request to cancel the following appointment:</p>\n{}\n\
         <p>Your appointment has been cancelled. If you need to reschedule, please contact \
         us at your earliest convenience.</p>",
        detail_list(appointment, false)
    );
    EmailMessage {
        subject: format!("Appointment Cancelled - {}", appointment.appointment_id),
        html: wrap("Appointment Cancellation", patient, &body),
    }
}

pub fn cancellation_sms(appointment: &Appointment) -> String {
    format!(
        "Your appointment on {} at {} has been cancelled. Contact us to reschedule.",
        display_date(appointment),
        appointment.formatted_time()
    )
}

/// Email listing the previous and the new slot.
pub fn reschedule_email(
    patient: &PatientRecord,
    previous: &Appointment,
    appointment: &Appointment,
) -> EmailMessage {
    let body = format!(
        "<p>Your appointment has been successfully rescheduled:</p>\n\
         <p><strong>Previous Appointment:</strong></p>\n\
         <ul style=\"list-style: none; padding: 0;\">\n\
         <li><strong>Date:</strong> {}</li>\n\
         <li><strong>Time:</strong> {}</li>\n\
         </ul>\n\
         <p><strong>New Appointment:</strong></p>\n{}\n\
         <p>Please update your calendar with the new appointment time.</p>",
        display_date(previous),
        previous.formatted_time(),
        detail_list(appointment, true)
    );
    EmailMessage {
        subject: format!("Appointment Rescheduled - {}", appointment.appointment_id),
        html: wrap("Appointment Rescheduled", patient, &body),
    }
}

pub fn reschedule_sms(appointment: &Appointment) -> String {
    format!(
        "Your appointment has been rescheduled to {} at {}. Check your email for details.",
        display_date(appointment),
        appointment.formatted_time()
    )
}
