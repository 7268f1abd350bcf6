use chrono::NaiveDate;
use tracing::info;

use crate::calendar::TimeRange;
use crate::error::{PortalError, PortalResult};
use crate::models::Mentor;

/// Hour-long feedback slots offered once a mentor is picked.
pub const TIME_SLOTS: [&str; 7] = [
    "09:00-10:00",
    "10:00-11:00",
    "11:00-12:00",
    "13:00-14:00",
    "14:00-15:00",
    "15:00-16:00",
    "16:00-17:00",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStep {
    SelectDate,
    SelectMentor,
    SelectDetails,
    Confirm,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingDetails {
    pub time_slot: Option<TimeRange>,
    pub group_number: String,
    pub session_focus: String,
    pub notes: String,
}

/// The message shown once a booking is confirmed. Nothing is sent anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfirmation {
    pub date: NaiveDate,
    pub mentor: String,
    pub time_slot: TimeRange,
    pub message: String,
}

/// Feedback-session booking: date, then mentor, then details, then confirm.
#[derive(Debug, Clone)]
pub struct BookingWizard {
    step: BookingStep,
    date: Option<NaiveDate>,
    mentor: Option<Mentor>,
    details: BookingDetails,
}

impl Default for BookingWizard {
    fn default() -> Self {
        Self {
            step: BookingStep::SelectDate,
            date: None,
            mentor: None,
            details: BookingDetails::default(),
        }
    }
}

/// Mentors whose available dates include `date` exactly.
pub fn mentors_on<'a>(pool: &'a [Mentor], date: NaiveDate) -> Vec<&'a Mentor> {
    pool.iter()
        .filter(|m| m.available_dates.contains(&date))
        .collect()
}

impl BookingWizard {
    pub fn step(&self) -> BookingStep {
        self.step
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn mentor(&self) -> Option<&Mentor> {
        self.mentor.as_ref()
    }

    pub fn details(&self) -> &BookingDetails {
        &self.details
    }

    /// Pick a date. Always allowed, even when nobody is free that day.
    pub fn select_date(&mut self, date: NaiveDate) {
        self.date = Some(date);
        self.mentor = None;
        self.step = BookingStep::SelectMentor;
    }

    pub fn available_mentors<'a>(&self, pool: &'a [Mentor]) -> Vec<&'a Mentor> {
        match self.date {
            Some(date) => mentors_on(pool, date),
            None => Vec::new(),
        }
    }

    /// Empty-state text for the mentor step, or `None` when mentors exist.
    pub fn no_mentor_message(&self, pool: &[Mentor]) -> Option<String> {
        let date = self.date?;
        if !mentors_on(pool, date).is_empty() {
            return None;
        }
        Some(format!(
            "No mentors are available on {}. Please choose another date.",
            date.format("%A, %-d %B %Y")
        ))
    }

    pub fn select_mentor(&mut self, mentor_id: &str, pool: &[Mentor]) -> PortalResult {
        if self.step != BookingStep::SelectMentor {
            return Err(PortalError::StepUnavailable("choose a date first"));
        }
        let mentor = self
            .available_mentors(pool)
            .into_iter()
            .find(|m| m.id == mentor_id)
            .ok_or_else(|| PortalError::MentorUnavailable(mentor_id.to_string()))?;
        self.mentor = Some(mentor.clone());
        self.step = BookingStep::SelectDetails;
        Ok(())
    }

    pub fn set_time_slot(&mut self, slot: &str) -> PortalResult {
        self.details.time_slot = Some(slot.parse()?);
        Ok(())
    }

    pub fn set_details(&mut self, group_number: &str, session_focus: &str, notes: &str) {
        self.details.group_number = group_number.trim().to_string();
        self.details.session_focus = session_focus.trim().to_string();
        self.details.notes = notes.trim().to_string();
    }

    /// Open the confirmation modal. A time slot is the only required detail.
    pub fn review(&mut self) -> PortalResult {
        if self.step != BookingStep::SelectDetails {
            return Err(PortalError::StepUnavailable("choose a mentor first"));
        }
        if self.details.time_slot.is_none() {
            return Err(PortalError::MissingField("time slot"));
        }
        self.step = BookingStep::Confirm;
        Ok(())
    }

    /// Close the modal without booking.
    pub fn cancel_review(&mut self) {
        if self.step == BookingStep::Confirm {
            self.step = BookingStep::SelectDetails;
        }
    }

    pub fn back(&mut self) {
        self.step = match self.step {
            BookingStep::SelectDate | BookingStep::SelectMentor => BookingStep::SelectDate,
            BookingStep::SelectDetails => BookingStep::SelectMentor,
            BookingStep::Confirm => BookingStep::SelectDetails,
        };
    }

    /// Confirm from the modal and start a fresh booking.
    pub fn confirm(&mut self) -> PortalResult<BookingConfirmation> {
        if self.step != BookingStep::Confirm {
            return Err(PortalError::StepUnavailable("review the booking first"));
        }
        let (Some(date), Some(mentor), Some(time_slot)) =
            (self.date, self.mentor.as_ref(), self.details.time_slot)
        else {
            return Err(PortalError::StepUnavailable("the booking is incomplete"));
        };

        let confirmation = BookingConfirmation {
            date,
            mentor: mentor.name.clone(),
            time_slot,
            message: format!(
                "Feedback session booked with {} on {} at {}.",
                mentor.name,
                date.format("%Y-%m-%d"),
                time_slot
            ),
        };
        info!("{}", confirmation.message);
        *self = Self::default();
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn mentor(id: &str, dates: &[&str]) -> Mentor {
        Mentor {
            id: id.into(),
            name: format!("Mentor {id}"),
            specialty: "UX".into(),
            available_dates: dates.iter().map(|d| date(d)).collect(),
        }
    }

    fn pool() -> Vec<Mentor> {
        vec![
            mentor("m1", &["2025-03-21", "2025-03-24"]),
            mentor("m2", &["2025-03-20"]),
            mentor("m3", &["2025-03-21"]),
        ]
    }

    #[test]
    fn test_mentors_filtered_by_exact_date() {
        let pool = pool();
        let mut wizard = BookingWizard::default();
        wizard.select_date(date("2025-03-21"));

        let ids: Vec<&str> = wizard
            .available_mentors(&pool)
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, ["m1", "m3"]);
        assert!(wizard.no_mentor_message(&pool).is_none());
    }

    #[test]
    fn test_date_without_mentors_is_empty_state() {
        let pool = pool();
        let mut wizard = BookingWizard::default();
        wizard.select_date(date("2025-03-22"));

        assert_eq!(wizard.step(), BookingStep::SelectMentor);
        assert!(wizard.available_mentors(&pool).is_empty());
        let message = wizard.no_mentor_message(&pool).unwrap();
        assert!(message.starts_with("No mentors are available on Saturday, 22 March 2025"));
    }

    #[test]
    fn test_unavailable_mentor_rejected() {
        let pool = pool();
        let mut wizard = BookingWizard::default();
        wizard.select_date(date("2025-03-21"));
        assert_eq!(
            wizard.select_mentor("m2", &pool),
            Err(PortalError::MentorUnavailable("m2".into()))
        );
        assert_eq!(wizard.step(), BookingStep::SelectMentor);
    }

    #[test]
    fn test_full_flow_resets_after_confirm() {
        let pool = pool();
        let mut wizard = BookingWizard::default();
        wizard.select_date(date("2025-03-24"));
        wizard.select_mentor("m1", &pool).unwrap();

        assert_eq!(wizard.review(), Err(PortalError::MissingField("time slot")));
        wizard.set_time_slot(TIME_SLOTS[1]).unwrap();
        wizard.set_details("", "", "");
        wizard.review().unwrap();
        assert_eq!(wizard.step(), BookingStep::Confirm);

        let confirmation = wizard.confirm().unwrap();
        assert_eq!(confirmation.mentor, "Mentor m1");
        assert_eq!(confirmation.time_slot.to_string(), "10:00-11:00");
        assert_eq!(wizard.step(), BookingStep::SelectDate);
        assert!(wizard.date().is_none());
        assert_eq!(wizard.details(), &BookingDetails::default());
    }

    #[test]
    fn test_cancel_review_and_back() {
        let pool = pool();
        let mut wizard = BookingWizard::default();
        wizard.select_date(date("2025-03-20"));
        wizard.select_mentor("m2", &pool).unwrap();
        wizard.set_time_slot("14:00-15:00").unwrap();
        wizard.review().unwrap();

        wizard.cancel_review();
        assert_eq!(wizard.step(), BookingStep::SelectDetails);
        assert!(wizard.confirm().is_err());

        wizard.back();
        assert_eq!(wizard.step(), BookingStep::SelectMentor);
        wizard.back();
        assert_eq!(wizard.step(), BookingStep::SelectDate);
    }

    #[test]
    fn test_time_slot_must_be_valid() {
        let mut wizard = BookingWizard::default();
        assert!(wizard.set_time_slot("").is_err());
        assert!(wizard.set_time_slot("15:00-14:00").is_err());
        assert!(wizard.details().time_slot.is_none());
    }
}
