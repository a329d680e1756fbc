//! Min-heap of pending reminders keyed by fire time.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use chrono::NaiveDateTime;

use crate::models::Reminder;

#[derive(Debug, Clone)]
struct Queued(Reminder);

impl Queued {
    fn key(&self) -> (NaiveDateTime, crate::models::ReminderType, &str) {
        (
            self.0.scheduled_time,
            self.0.reminder_type,
            self.0.reminder_id.as_str(),
        )
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Pending reminders, earliest first; ties broken by reminder type.
#[derive(Debug, Default)]
pub struct DueQueue {
    heap: BinaryHeap<Reverse<Queued>>,
}

impl DueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reminder: Reminder) {
        self.heap.push(Reverse(Queued(reminder)));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Fire time of the earliest reminder.
    pub fn peek_time(&self) -> Option<NaiveDateTime> {
        self.heap.peek().map(|Reverse(q)| q.0.scheduled_time)
    }

    /// Remove and return every reminder firing at or before `limit`, in order.
    pub fn pop_until(&mut self, limit: NaiveDateTime) -> Vec<Reminder> {
        let mut ready = Vec::new();
        while self.peek_time().is_some_and(|t| t <= limit) {
            if let Some(Reverse(q)) = self.heap.pop() {
                ready.push(q.0);
            }
        }
        ready
    }

    /// Earliest fire time strictly after `now`, ignoring anything already due.
    pub fn next_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        self.heap
            .iter()
            .map(|Reverse(q)| q.0.scheduled_time)
            .filter(|t| *t > now)
            .min()
    }
}

impl FromIterator<Reminder> for DueQueue {
    fn from_iter<I: IntoIterator<Item = Reminder>>(iter: I) -> Self {
        Self {
            heap: iter.into_iter().map(|r| Reverse(Queued(r))).collect(),
        }
    }
}
