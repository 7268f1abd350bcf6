use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::models::Config;

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!("{} not found, using built-in defaults", path.display());
        return Ok(Config::default());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    validate(&config).with_context(|| format!("Invalid configuration in {}", path.display()))?;
    debug!(
        "Loaded config: {} mentors, {} students, team size {}",
        config.mentors.len(),
        config.students.len(),
        config.cohort.team_size
    );
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.cohort.team_size == 0 {
        bail!("cohort.team_size must be at least 1");
    }
    if !config.server.base_path.starts_with('/') {
        bail!("server.base_path must start with '/'");
    }
    Ok(())
}
