//! SMTP email transport.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::debug;

use super::gateway::{EmailTransport, OutgoingEmail};
use crate::config::EmailConfig;

/// Sends mail through an SMTP relay with STARTTLS and login credentials.
pub struct SmtpEmailTransport {
    mailer: SmtpTransport,
}

impl SmtpEmailTransport {
    /// Build a relay client. No connection is made until the first send.
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let mailer = SmtpTransport::starttls_relay(&config.smtp_server)
            .with_context(|| format!("invalid SMTP server '{}'", config.smtp_server))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self { mailer })
    }
}

impl EmailTransport for SmtpEmailTransport {
    fn send(&self, email: &OutgoingEmail, _config: &EmailConfig) -> Result<()> {
        let message = build_message(email)?;
        self.mailer
            .send(&message)
            .with_context(|| format!("SMTP delivery to {} failed", email.to))?;
        debug!("SMTP relay accepted message to {}", email.to);
        Ok(())
    }
}

/// Multipart message with the HTML body followed by one part per attachment.
pub fn build_message(email: &OutgoingEmail) -> Result<Message> {
    let from: Mailbox = email
        .from
        .parse()
        .with_context(|| format!("invalid sender address '{}'", email.from))?;
    let to: Mailbox = email
        .to
        .parse()
        .with_context(|| format!("invalid recipient address '{}'", email.to))?;

    let mut body = MultiPart::mixed().singlepart(SinglePart::html(email.html.clone()));
    for path in &email.attachments {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read attachment {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        body = body.singlepart(Attachment::new(filename).body(bytes, content_type_for(path)?));
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .multipart(body)
        .context("failed to build email message")
}

fn content_type_for(path: &Path) -> Result<ContentType> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    let mime = match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("html") | Some("htm") => "text/html",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime).map_err(|e| anyhow!("content type {}: {}", mime, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn email(attachments: Vec<PathBuf>) -> OutgoingEmail {
        OutgoingEmail {
            from: "clinic@example.org".into(),
            to: "ada@example.org".into(),
            subject: "Intake Forms - Appointment A1".into(),
            html: "<p>Forms attached</p>".into(),
            attachments,
        }
    }

    #[test]
    fn test_message_carries_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let form = dir.path().join("New Patient Intake Form.pdf");
        fs::write(&form, b"%PDF-1.4 intake").unwrap();

        let message = build_message(&email(vec![form])).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        assert!(raw.contains("Subject: Intake Forms - Appointment A1"));
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("New Patient Intake Form.pdf"));
    }

    #[test]
    fn test_missing_attachment_is_an_error() {
        let result = build_message(&email(vec![PathBuf::from("/nonexistent/form.pdf")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_bad_recipient_is_an_error() {
        let mut bad = email(Vec::new());
        bad.to = "not an address".into();
        assert!(build_message(&bad).is_err());
    }

    #[test]
    fn test_transport_builds_without_connecting() {
        let config = EmailConfig {
            username: "clinic@example.org".into(),
            password: "app-password".into(),
            ..Default::default()
        };
        assert!(SmtpEmailTransport::new(&config).is_ok());
    }
}
