use thiserror::Error;

use crate::timetable::import::ImportError;

/// Validation failures raised by the portal models.
///
/// The display string is what the dashboard shows in a notice, so every
/// variant reads as a complete sentence fragment for the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("invalid time range '{0}', expected HH:MM-HH:MM")]
    MalformedRange(String),

    #[error("end time {end} must be after start time {start}")]
    InvertedRange { start: String, end: String },

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),

    #[error("no {day} slot at position {index}")]
    NoSuchSlot { day: String, index: usize },

    #[error("team is full ({0} members maximum)")]
    RosterFull(usize),

    #[error("{0} is already on the team")]
    AlreadyOnRoster(String),

    #[error("a team needs exactly {expected} members to be confirmed (currently {actual})")]
    RosterSize { expected: usize, actual: usize },

    #[error("team is already confirmed")]
    RosterConfirmed,

    #[error("select at least one group")]
    NoGroupsSelected,

    #[error("add at least one availability slot")]
    NoAvailability,

    #[error("{0}")]
    StepUnavailable(&'static str),

    #[error("mentor {0} is not available on the selected date")]
    MentorUnavailable(String),

    #[error("select a leader before approving the team")]
    LeaderRequired,

    #[error(transparent)]
    Import(#[from] ImportError),
}

pub type PortalResult<T = ()> = Result<T, PortalError>;
