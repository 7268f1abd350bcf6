use chrono::{NaiveTime, Timelike, Weekday};

use super::Session;
use crate::calendar::TEACHING_DAYS;

pub const CELL_MINUTES: u32 = 30;
pub const FIRST_HOUR: u32 = 8;
pub const LAST_HOUR: u32 = 18;

/// What a single day/time cell of the grid shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell<'a> {
    Free,
    /// Sessions beginning in this cell; their cards are drawn here.
    Start(Vec<&'a Session>),
    /// A session that started in an earlier cell and still occupies this one.
    Continued(&'a Session),
}

#[derive(Debug)]
pub struct GridRow<'a> {
    pub at: NaiveTime,
    pub cells: Vec<Cell<'a>>,
}

/// Row start times from 08:00 to 17:30 in half-hour steps.
pub fn row_times() -> Vec<NaiveTime> {
    (FIRST_HOUR * 60..LAST_HOUR * 60)
        .step_by(CELL_MINUTES as usize)
        .filter_map(|m| NaiveTime::from_hms_opt(m / 60, m % 60, 0))
        .collect()
}

/// Row in which a session's card goes. Starts outside the grid hours are
/// pinned to the first or last row.
fn start_row(session: &Session) -> usize {
    let minutes = session.time.start().num_seconds_from_midnight() / 60;
    let rows = (LAST_HOUR - FIRST_HOUR) * 60 / CELL_MINUTES;
    let row = minutes.saturating_sub(FIRST_HOUR * 60) / CELL_MINUTES;
    row.min(rows - 1) as usize
}

/// Lay sessions out as weekday columns by half-hour rows.
///
/// Every session gets a card in its starting cell. A cell no session starts
/// in shows the first session, in timetable order, still running through it.
pub fn build<'a>(sessions: impl IntoIterator<Item = &'a Session>) -> Vec<GridRow<'a>> {
    let sessions: Vec<&Session> = sessions.into_iter().collect();
    row_times()
        .into_iter()
        .enumerate()
        .map(|(row, at)| GridRow {
            at,
            cells: TEACHING_DAYS
                .iter()
                .map(|&day| cell_for(&sessions, day, row, at))
                .collect(),
        })
        .collect()
}

fn cell_for<'a>(sessions: &[&'a Session], day: Weekday, row: usize, at: NaiveTime) -> Cell<'a> {
    let on_day = || sessions.iter().copied().filter(move |s| s.day == day);
    let starting: Vec<&Session> = on_day().filter(|s| start_row(s) == row).collect();
    if !starting.is_empty() {
        return Cell::Start(starting);
    }
    match on_day().find(|s| s.time.overlaps_cell(at, CELL_MINUTES)) {
        Some(s) => Cell::Continued(s),
        None => Cell::Free,
    }
}
