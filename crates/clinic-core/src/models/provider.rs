//! Provider schedule models.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Half-open hour window `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HourWindow {
    pub start: u8,
    pub end: u8,
}

impl HourWindow {
    pub const fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    pub fn contains_hour(&self, hour: u8) -> bool {
        self.start <= hour && hour < self.end
    }

    /// First sub-slot index covered by the window.
    pub fn first_sub_slot(&self) -> u32 {
        u32::from(self.start) * 2
    }

    /// Sub-slot index one past the end of the window.
    pub fn end_sub_slot(&self) -> u32 {
        u32::from(self.end) * 2
    }
}

/// A provider's weekly availability template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSchedule {
    pub provider_id: String,
    pub name: String,
    pub specialty: String,
    pub location: String,
    /// Bookable start hours per weekday; absent weekday means closed
    pub weekly_hours: BTreeMap<u8, BTreeSet<u8>>,
    pub working_hours: HourWindow,
    pub lunch_break: HourWindow,
}

impl ProviderSchedule {
    pub fn new(
        provider_id: impl Into<String>,
        name: impl Into<String>,
        working_hours: HourWindow,
        lunch_break: HourWindow,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            name: name.into(),
            specialty: String::new(),
            location: String::new(),
            weekly_hours: BTreeMap::new(),
            working_hours,
            lunch_break,
        }
    }

    /// Set the template hours for a weekday.
    pub fn with_day(mut self, weekday: Weekday, hours: impl IntoIterator<Item = u8>) -> Self {
        self.weekly_hours
            .insert(weekday_index(weekday), hours.into_iter().collect());
        self
    }

    /// Template hours for a weekday, if the provider works that day.
    pub fn hours_on(&self, weekday: Weekday) -> Option<&BTreeSet<u8>> {
        self.weekly_hours.get(&weekday_index(weekday))
    }
}

/// Monday-based weekday index used in storage.
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_monday() as u8
}
