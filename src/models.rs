use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cohort: CohortConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub mentors: Vec<Mentor>,
    #[serde(default)]
    pub students: Vec<Student>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            api: ApiConfig::default(),
            server: ServerConfig::default(),
            cohort: CohortConfig::default(),
            timing: TimingConfig::default(),
            mentors: Vec::new(),
            students: Vec::new(),
        }
    }
}

fn default_timezone() -> Tz {
    chrono_tz::Europe::London
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Prefix every dashboard route is mounted under, e.g. "/portal".
    pub base_path: String,
    /// Directory holding the built front-end assets.
    pub output_dir: String,
    /// Directory for the local timetable/availability store.
    pub state_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:5173".into(),
            base_path: "/".into(),
            output_dir: "dist".into(),
            state_dir: ".".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CohortConfig {
    pub team_size: usize,
    pub level: String,
    pub groups: Vec<String>,
}

impl Default for CohortConfig {
    fn default() -> Self {
        let mut groups: Vec<String> = (1..=10).map(|n| format!("CS-G{n}")).collect();
        groups.extend((1..=5).map(|n| format!("SE-G{n}")));
        Self {
            team_size: 6,
            level: "L5".into(),
            groups,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub notice_ms: u64,
    pub viva_processing_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            notice_ms: 3000,
            viva_processing_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Student,
    Lecturer,
    SdgpAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
            Role::Lecturer => "lecturer",
            Role::SdgpAdmin => "sdgp_admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "student" => Some(Role::Student),
            "lecturer" => Some(Role::Lecturer),
            "sdgp_admin" => Some(Role::SdgpAdmin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentor {
    pub id: String,
    pub name: String,
    pub specialty: String,
    #[serde(default, alias = "available_dates")]
    pub available_dates: BTreeSet<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecturer {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub name_short: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLecturer {
    pub name: String,
    pub name_short: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hall {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub building: String,
    #[serde(alias = "classroom", alias = "name")]
    pub room: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamStatus {
    Pending,
    Approved,
    Rejected,
}

impl TeamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamStatus::Pending => "pending",
            TeamStatus::Approved => "approved",
            TeamStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    pub status: TeamStatus,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub leader_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveTeam<'a> {
    pub leader_id: &'a str,
}

/// One element of the `add-to-group` batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSessionPayload {
    pub lecturer_ids: BTreeSet<String>,
    pub hall_id: String,
    pub level: String,
    pub course: String,
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
    pub lecture_or_tutorial: String,
    pub time_table_id: String,
}

/// Backend ids arrive as numbers from some services and strings from others.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
