pub mod grid;
pub mod import;

use std::collections::BTreeSet;
use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::calendar::{weekday_name, TimeRange};
use crate::error::{PortalError, PortalResult};
use crate::models::GroupSessionPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    Lecture,
    Tutorial,
}

impl SessionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "lecture" => Some(SessionKind::Lecture),
            "tutorial" => Some(SessionKind::Tutorial),
            _ => None,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Lecture => f.write_str("Lecture"),
            SessionKind::Tutorial => f.write_str("Tutorial"),
        }
    }
}

/// A single timetable entry for a tutorial group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub group: String,
    pub lecturer: String,
    pub module: String,
    pub day: Weekday,
    pub time: TimeRange,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub building: String,
    pub classroom: String,
}

/// Form input for a manually added session.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub lecturer: String,
    pub module: String,
    pub day: Weekday,
    pub time: TimeRange,
    pub kind: SessionKind,
    pub building: String,
    pub classroom: String,
}

/// Backend ids resolved for a session during import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub session: Session,
    pub lecturer_id: String,
    pub hall_id: String,
}

impl ResolvedSession {
    /// Shape this session for `POST /sessions/add-to-group/{group}`.
    pub fn to_payload(&self, level: &str, time_table_id: &str) -> GroupSessionPayload {
        let session = &self.session;
        GroupSessionPayload {
            lecturer_ids: BTreeSet::from([self.lecturer_id.clone()]),
            hall_id: self.hall_id.clone(),
            level: level.to_string(),
            course: course_of(&session.group).to_string(),
            day_of_week: weekday_name(session.day).to_uppercase(),
            start_time: session.time.start().format("%H:%M").to_string(),
            end_time: session.time.end().format("%H:%M").to_string(),
            lecture_or_tutorial: session.kind.to_string().to_uppercase(),
            time_table_id: time_table_id.to_string(),
        }
    }
}

/// Course prefix of a tutorial group label, e.g. "CS" for "CS-G5".
pub fn course_of(group: &str) -> &str {
    group.split('-').next().unwrap_or(group)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timetable {
    sessions: Vec<Session>,
}

impl Timetable {
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn for_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Session> + 'a {
        self.sessions.iter().filter(move |s| s.group == group)
    }

    pub fn groups(&self) -> BTreeSet<&str> {
        self.sessions.iter().map(|s| s.group.as_str()).collect()
    }

    /// Validate and append a session. Overlaps with existing sessions are allowed.
    pub fn add(&mut self, group: &str, draft: SessionDraft) -> PortalResult<&Session> {
        if draft.lecturer.trim().is_empty() {
            return Err(PortalError::MissingField("lecturer"));
        }
        if draft.building.trim().is_empty() {
            return Err(PortalError::MissingField("building"));
        }
        if draft.classroom.trim().is_empty() {
            return Err(PortalError::MissingField("classroom"));
        }

        let session = Session {
            id: Uuid::new_v4().to_string(),
            group: group.to_string(),
            lecturer: draft.lecturer.trim().to_string(),
            module: draft.module.trim().to_string(),
            day: draft.day,
            time: draft.time,
            kind: draft.kind,
            building: draft.building.trim().to_string(),
            classroom: draft.classroom.trim().to_string(),
        };
        info!(
            "Added {} {} for {} on {} {}",
            session.kind,
            session.module,
            group,
            weekday_name(session.day),
            session.time
        );
        self.sessions.push(session);
        Ok(&self.sessions[self.sessions.len() - 1])
    }

    /// Remove a session by id. Unknown ids are ignored.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let pos = self.sessions.iter().position(|s| s.id == id)?;
        debug!("Removed session {}", id);
        Some(self.sessions.remove(pos))
    }

    /// Swap out every session of `group`, leaving other groups untouched.
    pub fn replace_group(&mut self, group: &str, sessions: Vec<Session>) {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.group != group);
        info!(
            "Replacing {} sessions of {} with {}",
            before - self.sessions.len(),
            group,
            sessions.len()
        );
        self.sessions.extend(sessions);
    }
}
