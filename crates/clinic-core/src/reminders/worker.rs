//! Background thread that dispatches due reminders.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use super::scheduler::{dispatch_due, ReminderScheduler};
use crate::config::ReminderPolicy;
use crate::db::Database;
use crate::notify::NotificationGateway;

const MIN_SLEEP: Duration = Duration::from_secs(1);

/// Handle to a running reminder worker. Dropping it stops the thread.
pub struct ReminderWorker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ReminderWorker {
    /// Start the worker thread.
    pub fn spawn(
        db: Arc<Mutex<Database>>,
        gateway: Arc<NotificationGateway>,
        policy: ReminderPolicy,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("reminder-worker".to_string())
            .spawn(move || {
                info!("Reminder worker started (poll every {:?})", policy.poll_interval);
                loop {
                    let now = chrono::Local::now().naive_local();
                    match dispatch_due(&db, &gateway, &policy, now) {
                        Ok(report) if report.attempted > 0 || report.skipped > 0 => {
                            info!(
                                "Reminder pass: {} attempted, {} sent, {} failed, {} skipped",
                                report.attempted, report.sent, report.failed, report.skipped
                            );
                        }
                        Ok(_) => debug!("Reminder pass: nothing due"),
                        Err(e) => error!("Reminder pass failed: {}", e),
                    }

                    let wait = next_wait(&db, &policy);
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Reminder worker stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Reminder worker panicked");
            }
        }
    }
}

impl Drop for ReminderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Sleep until the next fire time, capped at the poll interval.
fn next_wait(db: &Mutex<Database>, policy: &ReminderPolicy) -> Duration {
    let now = chrono::Local::now().naive_local();
    let next = match db.lock() {
        Ok(db) => ReminderScheduler::new(&db, policy).next_fire_time(now).ok().flatten(),
        Err(_) => None,
    };

    next.and_then(|t| (t - now).to_std().ok())
        .map(|d| d.clamp(MIN_SLEEP, policy.poll_interval))
        .unwrap_or(policy.poll_interval)
}
