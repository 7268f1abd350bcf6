use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::availability::Availability;
use crate::timetable::Timetable;

const TIMETABLE_FILE: &str = "timetable.json";
const AVAILABILITY_FILE: &str = "availability.json";

/// JSON files standing in for the browser's local storage.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            T::default()
        }),
        Err(_) => T::default(),
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn load_timetable(&self) -> Timetable {
        let path = self.dir.join(TIMETABLE_FILE);
        let timetable: Timetable = load_json(&path);
        info!(
            "Loaded {} sessions from {}",
            timetable.sessions().len(),
            path.display()
        );
        timetable
    }

    pub fn save_timetable(&self, timetable: &Timetable) -> Result<()> {
        save_json(&self.dir.join(TIMETABLE_FILE), timetable)
    }

    /// Availability keyed by lecturer id.
    pub fn load_availability(&self) -> BTreeMap<String, Availability> {
        load_json(&self.dir.join(AVAILABILITY_FILE))
    }

    pub fn save_availability(&self, availability: &BTreeMap<String, Availability>) -> Result<()> {
        save_json(&self.dir.join(AVAILABILITY_FILE), availability)
    }
}
