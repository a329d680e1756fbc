//! Append-only record of every outbound message.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use super::Channel;

/// Characters of an email body kept in the log.
pub const EMAIL_PREVIEW_CHARS: usize = 200;

/// How a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Accepted by the provider
    Real,
    /// Not transmitted; counts as delivered
    Simulated,
    /// Provider refused for an account limitation; counts as delivered
    SimulatedLimit,
    Failed,
}

impl DispatchKind {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchKind::Real => "REAL",
            DispatchKind::Simulated => "SIMULATED",
            DispatchKind::SimulatedLimit => "SIMULATED (provider limit)",
            DispatchKind::Failed => "FAILED",
        }
    }
}

/// One log line (SMS) or block (email).
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub channel: Channel,
    pub kind: DispatchKind,
    pub destination: String,
    pub subject: Option<String>,
    pub payload: String,
    pub attachments: Vec<String>,
    /// Provider message ID
    pub reference: Option<String>,
    pub error: Option<String>,
}

impl LogEntry {
    pub fn new(channel: Channel, kind: DispatchKind, destination: &str, payload: &str) -> Self {
        Self {
            timestamp: chrono::Local::now().naive_local(),
            channel,
            kind,
            destination: destination.to_string(),
            subject: None,
            payload: payload.to_string(),
            attachments: Vec::new(),
            reference: None,
            error: None,
        }
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn with_reference(mut self, reference: String) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Text appended to the channel's log file.
    pub fn render(&self) -> String {
        let ts = self.timestamp.format("%Y-%m-%d %H:%M:%S");
        match self.channel {
            Channel::Sms => {
                let mut line = format!(
                    "[{}] {} SMS to {}: {}",
                    ts,
                    self.kind.label(),
                    self.destination,
                    self.payload
                );
                if let Some(sid) = &self.reference {
                    line.push_str(&format!(" (SID: {})", sid));
                }
                if let Some(err) = &self.error {
                    line.push_str(&format!(" (Error: {})", err));
                }
                line.push('\n');
                line
            }
            Channel::Email => {
                let preview: String = self.payload.chars().take(EMAIL_PREVIEW_CHARS).collect();
                let attachments = if self.attachments.is_empty() {
                    "None".to_string()
                } else {
                    self.attachments.join(", ")
                };
                let mut block = format!(
                    "\n[{}] EMAIL ({})\nTo: {}\nSubject: {}\nBody: {}...\nAttachments: {}\n",
                    ts,
                    self.kind.label(),
                    self.destination,
                    self.subject.as_deref().unwrap_or(""),
                    preview,
                    attachments
                );
                if let Some(err) = &self.error {
                    block.push_str(&format!("Error: {}\n", err));
                }
                block.push_str(&"=".repeat(50));
                block.push('\n');
                block
            }
        }
    }
}

/// Destination for communication log entries.
pub trait CommunicationLog: Send + Sync {
    fn append(&self, entry: &LogEntry) -> Result<()>;
}

/// Writes `sms_log.txt` and `email_log.txt` under a directory.
pub struct FileCommunicationLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCommunicationLog {
    pub const SMS_LOG: &'static str = "sms_log.txt";
    pub const EMAIL_LOG: &'static str = "email_log.txt";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, channel: Channel) -> PathBuf {
        match channel {
            Channel::Sms => self.dir.join(Self::SMS_LOG),
            Channel::Email => self.dir.join(Self::EMAIL_LOG),
        }
    }
}

impl CommunicationLog for FileCommunicationLog {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("communication log lock poisoned: {}", e))?;

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating log directory {}", self.dir.display()))?;

        let path = self.path_for(entry.channel);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(entry.render().as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

/// In-memory log for tests and embedding.
#[derive(Default)]
pub struct MemoryCommunicationLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryCommunicationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl CommunicationLog for MemoryCommunicationLog {
    fn append(&self, entry: &LogEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("communication log lock poisoned: {}", e))?
            .push(entry.clone());
        Ok(())
    }
}
