use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::calendar::TimeRange;
use crate::error::{PortalError, PortalResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VivaStep {
    AdminAvailability,
    LecturerAvailability,
    Processing,
    Complete,
}

impl VivaStep {
    pub fn label(&self) -> &'static str {
        match self {
            VivaStep::AdminAvailability => "admin-availability",
            VivaStep::LecturerAvailability => "lecturer-availability",
            VivaStep::Processing => "processing",
            VivaStep::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DatedSlot {
    pub date: NaiveDate,
    pub time: TimeRange,
}

/// Everything the wizard collected, handed to the (future) assignment step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VivaRequest {
    pub groups: BTreeSet<String>,
    pub admin_slots: Vec<DatedSlot>,
    pub lecturer_slots: BTreeMap<String, Vec<DatedSlot>>,
}

/// Administrator wizard for scheduling vivas across tutorial groups.
#[derive(Debug, Clone)]
pub struct VivaWizard {
    step: VivaStep,
    groups: BTreeSet<String>,
    admin_slots: Vec<DatedSlot>,
    lecturer_slots: BTreeMap<String, Vec<DatedSlot>>,
    request: Option<VivaRequest>,
}

impl Default for VivaWizard {
    fn default() -> Self {
        Self {
            step: VivaStep::AdminAvailability,
            groups: BTreeSet::new(),
            admin_slots: Vec::new(),
            lecturer_slots: BTreeMap::new(),
            request: None,
        }
    }
}

impl VivaWizard {
    pub fn step(&self) -> VivaStep {
        self.step
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn admin_slots(&self) -> &[DatedSlot] {
        &self.admin_slots
    }

    pub fn lecturer_slots(&self) -> &BTreeMap<String, Vec<DatedSlot>> {
        &self.lecturer_slots
    }

    /// The snapshot taken when processing finished.
    pub fn request(&self) -> Option<&VivaRequest> {
        self.request.as_ref()
    }

    fn expect_step(&self, step: VivaStep, message: &'static str) -> PortalResult {
        if self.step != step {
            return Err(PortalError::StepUnavailable(message));
        }
        Ok(())
    }

    /// Select or deselect a group. Returns whether it is now selected.
    pub fn toggle_group(&mut self, group: &str) -> PortalResult<bool> {
        self.expect_step(VivaStep::AdminAvailability, "groups can only be changed on the first step")?;
        if self.groups.remove(group) {
            return Ok(false);
        }
        self.groups.insert(group.to_string());
        Ok(true)
    }

    pub fn add_admin_slot(&mut self, slot: DatedSlot) -> PortalResult {
        self.expect_step(VivaStep::AdminAvailability, "availability can only be changed on the first step")?;
        self.admin_slots.push(slot);
        Ok(())
    }

    pub fn remove_admin_slot(&mut self, index: usize) -> PortalResult<DatedSlot> {
        self.expect_step(VivaStep::AdminAvailability, "availability can only be changed on the first step")?;
        if index >= self.admin_slots.len() {
            return Err(PortalError::StepUnavailable("no such availability slot"));
        }
        Ok(self.admin_slots.remove(index))
    }

    pub fn add_lecturer_slot(&mut self, lecturer: &str, slot: DatedSlot) -> PortalResult {
        self.expect_step(
            VivaStep::LecturerAvailability,
            "lecturer availability is collected on the second step",
        )?;
        self.lecturer_slots
            .entry(lecturer.to_string())
            .or_default()
            .push(slot);
        Ok(())
    }

    /// Move forward from one of the two input steps.
    pub fn next(&mut self) -> PortalResult<VivaStep> {
        self.step = match self.step {
            VivaStep::AdminAvailability => {
                if self.groups.is_empty() {
                    return Err(PortalError::NoGroupsSelected);
                }
                if self.admin_slots.is_empty() {
                    return Err(PortalError::NoAvailability);
                }
                VivaStep::LecturerAvailability
            }
            VivaStep::LecturerAvailability => VivaStep::Processing,
            VivaStep::Processing | VivaStep::Complete => {
                return Err(PortalError::StepUnavailable("the wizard is already running"))
            }
        };
        info!("Viva wizard moved to {}", self.step.label());
        Ok(self.step)
    }

    pub fn back(&mut self) -> PortalResult<VivaStep> {
        self.expect_step(
            VivaStep::LecturerAvailability,
            "there is no previous step to return to",
        )?;
        self.step = VivaStep::AdminAvailability;
        Ok(self.step)
    }

    /// Leave `processing` for `complete`, recording the collected request.
    ///
    /// TODO: assign each selected group a viva slot drawn from the admin and
    /// lecturer availability once the allocation rules are agreed; until then
    /// the request is recorded and no assignment is produced.
    pub fn finish_processing(&mut self) -> PortalResult<&VivaRequest> {
        self.expect_step(VivaStep::Processing, "nothing is being processed")?;
        self.step = VivaStep::Complete;
        let request = VivaRequest {
            groups: self.groups.clone(),
            admin_slots: self.admin_slots.clone(),
            lecturer_slots: self.lecturer_slots.clone(),
        };
        info!(
            "Viva request recorded for {} groups, {} admin slots",
            request.groups.len(),
            request.admin_slots.len()
        );
        Ok(&*self.request.insert(request))
    }

    /// Wait out the processing delay, then complete.
    ///
    /// Returns `Ok(false)` if `cancel` fired first; the wizard then stays in
    /// `processing`.
    pub async fn process(&mut self, delay: Duration, cancel: &CancellationToken) -> PortalResult<bool> {
        self.expect_step(VivaStep::Processing, "nothing is being processed")?;
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Viva processing cancelled");
                Ok(false)
            }
            _ = tokio::time::sleep(delay) => {
                self.finish_processing()?;
                Ok(true)
            }
        }
    }

    /// Start over. Only available once the wizard is complete.
    pub fn reset(&mut self) -> PortalResult {
        self.expect_step(VivaStep::Complete, "the wizard can only be reset once complete")?;
        *self = Self::default();
        Ok(())
    }
}
