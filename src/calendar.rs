use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{PortalError, PortalResult};

/// Teaching days shown in the timetable grid and the availability editor.
pub const TEACHING_DAYS: [Weekday; 5] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
];

/// Parse a day name (e.g. "monday" or "Mon") into a chrono Weekday.
pub fn parse_weekday(day: &str) -> Option<Weekday> {
    match day.trim().to_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Like [`parse_weekday`], for form input that must name a day.
pub fn weekday_field(day: &str) -> PortalResult<Weekday> {
    parse_weekday(day).ok_or_else(|| PortalError::UnknownWeekday(day.trim().to_string()))
}

/// Parse an ISO date ("2025-03-21").
pub fn parse_date(value: &str) -> PortalResult<NaiveDate> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| PortalError::InvalidDate(trimmed.to_string()))
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Parse "HH:MM" (or "HH:MM:SS") into a time of day.
pub fn parse_time_of_day(value: &str) -> PortalResult<NaiveTime> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| PortalError::InvalidTime(trimmed.to_string()))
}

/// Today's date in the portal's configured timezone.
pub fn today(tz: Tz) -> NaiveDate {
    now(tz).date_naive()
}

pub fn now(tz: Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(&tz)
}

/// A time-of-day interval with `start < end`.
///
/// The only way to build one is through [`TimeRange::new`] or parsing, so an
/// inverted or empty range never reaches the models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeRange {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> PortalResult<Self> {
        if end <= start {
            return Err(PortalError::InvertedRange {
                start: start.format("%H:%M").to_string(),
                end: end.format("%H:%M").to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Build a range from two "HH:MM" strings.
    pub fn from_strs(start: &str, end: &str) -> PortalResult<Self> {
        Self::new(parse_time_of_day(start)?, parse_time_of_day(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Whether the half-open interval `[at, at + minutes)` intersects this range.
    pub fn overlaps_cell(&self, at: NaiveTime, minutes: u32) -> bool {
        let cell_start = at.num_seconds_from_midnight();
        let cell_end = cell_start + minutes * 60;
        let start = self.start.num_seconds_from_midnight();
        let end = self.end.num_seconds_from_midnight();
        start < cell_end && cell_start < end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

impl FromStr for TimeRange {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| PortalError::MalformedRange(s.to_string()))?;
        Self::from_strs(start, end)
    }
}

impl TryFrom<String> for TimeRange {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeRange> for String {
    fn from(range: TimeRange) -> Self {
        range.to_string()
    }
}
