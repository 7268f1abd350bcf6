use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar::{weekday_name, TimeRange, TEACHING_DAYS};
use crate::error::{PortalError, PortalResult};

/// One entry in a lecturer's day.
///
/// A slot starts out as a placeholder until the lecturer saves real times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Placeholder,
    Range(TimeRange),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Placeholder => f.write_str("00:00-00:00"),
            Slot::Range(range) => fmt::Display::fmt(range, f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityDay {
    pub day: Weekday,
    pub slots: Vec<Slot>,
}

/// A lecturer's weekly availability, one entry per teaching day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    days: Vec<AvailabilityDay>,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            days: TEACHING_DAYS
                .iter()
                .map(|&day| AvailabilityDay {
                    day,
                    slots: Vec::new(),
                })
                .collect(),
        }
    }
}

impl Availability {
    pub fn days(&self) -> &[AvailabilityDay] {
        &self.days
    }

    pub fn slots(&self, day: Weekday) -> &[Slot] {
        self.days
            .iter()
            .find(|d| d.day == day)
            .map(|d| d.slots.as_slice())
            .unwrap_or(&[])
    }

    fn day_mut(&mut self, day: Weekday) -> &mut AvailabilityDay {
        if let Some(pos) = self.days.iter().position(|d| d.day == day) {
            return &mut self.days[pos];
        }
        self.days.push(AvailabilityDay {
            day,
            slots: Vec::new(),
        });
        self.days
            .sort_by_key(|d| d.day.num_days_from_monday());
        let pos = self
            .days
            .iter()
            .position(|d| d.day == day)
            .unwrap_or_default();
        &mut self.days[pos]
    }

    /// The slots of an existing day that has a slot at `index`. Never inserts.
    fn slots_with(&mut self, day: Weekday, index: usize) -> PortalResult<&mut Vec<Slot>> {
        self.days
            .iter_mut()
            .find(|d| d.day == day)
            .map(|d| &mut d.slots)
            .filter(|slots| index < slots.len())
            .ok_or_else(|| PortalError::NoSuchSlot {
                day: weekday_name(day).to_string(),
                index,
            })
    }

    /// Append a placeholder slot and return its index.
    pub fn add_slot(&mut self, day: Weekday) -> usize {
        let entry = self.day_mut(day);
        entry.slots.push(Slot::Placeholder);
        debug!("Added placeholder slot to {}", weekday_name(day));
        entry.slots.len() - 1
    }

    /// Overwrite one slot with `start-end`. Nothing else on the day changes.
    pub fn edit_slot(&mut self, day: Weekday, index: usize, start: &str, end: &str) -> PortalResult {
        let range = TimeRange::from_strs(start, end)?;
        self.slots_with(day, index)?[index] = Slot::Range(range);
        debug!("Set {} slot {} to {}", weekday_name(day), index, range);
        Ok(())
    }

    pub fn remove_slot(&mut self, day: Weekday, index: usize) -> PortalResult<Slot> {
        Ok(self.slots_with(day, index)?.remove(index))
    }

    /// Saved (non-placeholder) ranges for a day.
    pub fn ranges(&self, day: Weekday) -> impl Iterator<Item = TimeRange> + '_ {
        self.slots(day).iter().filter_map(|slot| match slot {
            Slot::Range(range) => Some(*range),
            Slot::Placeholder => None,
        })
    }
}
