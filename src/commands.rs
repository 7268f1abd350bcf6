use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::calendar::{weekday_name, TEACHING_DAYS};
use crate::gateway::PortalClient;
use crate::models::{Config, NewLecturer, Team};
use crate::store::LocalStore;
use crate::timetable::grid::{self, Cell};
use crate::timetable::import::Lookups;

fn client(cfg: &Config, token: &Option<String>) -> Result<PortalClient> {
    Ok(PortalClient::new(&cfg.api.base_url)?.with_token(token.clone()))
}

pub async fn run_lecturers(cfg: &Config, token: &Option<String>, verbose: bool) -> Result<()> {
    let lecturers = client(cfg, token)?.list_lecturers().await?;
    if verbose {
        println!("{}", serde_json::to_string_pretty(&lecturers)?);
        return Ok(());
    }
    if lecturers.is_empty() {
        println!("No lecturers registered.");
        return Ok(());
    }
    println!("Lecturers:\n");
    for l in &lecturers {
        println!(
            "  [{}] {} ({}) {}",
            l.id,
            l.name,
            l.name_short.as_deref().unwrap_or("-"),
            l.email.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn run_add_lecturer(
    cfg: &Config,
    token: &Option<String>,
    name: &str,
    short: &str,
    email: &str,
) -> Result<()> {
    let created = client(cfg, token)?
        .create_lecturer(&NewLecturer {
            name: name.trim().to_string(),
            name_short: short.trim().to_string(),
            email: email.trim().to_string(),
        })
        .await?;
    println!("Created lecturer {} (id {})", created.name, created.id);
    Ok(())
}

fn print_team(team: &Team) {
    print!("  [{}] {} ({})", team.id, team.name, team.status.as_str());
    if let Some(ref leader) = team.leader_id {
        print!(" leader {}", leader);
    }
    println!();
    for m in &team.members {
        println!("      {} {}", m.id, m.name);
    }
}

pub async fn run_teams(cfg: &Config, token: &Option<String>, verbose: bool) -> Result<()> {
    let teams = client(cfg, token)?.list_teams().await?;
    if verbose {
        println!("{}", serde_json::to_string_pretty(&teams)?);
        return Ok(());
    }
    if teams.is_empty() {
        println!("No teams registered.");
        return Ok(());
    }
    println!("Teams:\n");
    teams.iter().for_each(print_team);
    Ok(())
}

pub async fn run_approve(
    cfg: &Config,
    token: &Option<String>,
    team_id: &str,
    leader: &Option<String>,
) -> Result<()> {
    let api = client(cfg, token)?;
    api.approve_team(team_id, leader.as_deref()).await?;
    println!("Approved team {}", team_id);

    if let Some(team) = api
        .list_teams()
        .await?
        .iter()
        .find(|t| t.id == team_id)
    {
        print_team(team);
    }
    Ok(())
}

pub async fn run_reject(cfg: &Config, token: &Option<String>, team_id: &str) -> Result<()> {
    client(cfg, token)?.reject_team(team_id).await?;
    println!("Rejected team {}", team_id);
    Ok(())
}

pub async fn run_halls(cfg: &Config, token: &Option<String>) -> Result<()> {
    let halls = client(cfg, token)?.list_halls().await?;
    if halls.is_empty() {
        println!("No halls known to the session service.");
        return Ok(());
    }
    println!("Halls:\n");
    for h in &halls {
        println!("  [{}] {} {}", h.id, h.building, h.room);
    }
    Ok(())
}

pub struct ImportArgs<'a> {
    pub group: &'a str,
    pub file: &'a Path,
    pub push: bool,
    pub timetable_id: Option<&'a str>,
}

/// Import a CSV file into a group's timetable, optionally pushing it upstream.
pub async fn run_import(cfg: &Config, token: &Option<String>, args: ImportArgs<'_>) -> Result<()> {
    let push_to = match (args.push, args.timetable_id) {
        (false, _) => None,
        (true, Some(id)) if !id.trim().is_empty() => Some(id),
        (true, _) => bail!("--push needs --timetable-id"),
    };
    if !cfg.cohort.groups.iter().any(|g| g == args.group) {
        warn!("{} is not one of the configured tutorial groups", args.group);
    }
    let text = std::fs::read_to_string(args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let api = client(cfg, token)?;
    let lecturers = api.list_session_lecturers().await?;
    let halls = api.list_halls().await?;
    info!(
        "Resolving against {} lecturers and {} halls",
        lecturers.len(),
        halls.len()
    );

    let store = LocalStore::new(&cfg.server.state_dir);
    let mut timetable = store.load_timetable();
    let rows = timetable.import_csv(
        args.group,
        &text,
        Lookups {
            lecturers: &lecturers,
            halls: &halls,
        },
    )?;
    store.save_timetable(&timetable)?;
    println!("Imported {} sessions into {}", rows.len(), args.group);

    if let Some(timetable_id) = push_to {
        let payload: Vec<_> = rows
            .iter()
            .map(|r| r.to_payload(&cfg.cohort.level, timetable_id))
            .collect();
        api.add_sessions_to_group(args.group, &payload).await?;
        println!("Pushed {} sessions for {} to the backend", payload.len(), args.group);
    }
    Ok(())
}

/// Print a group's week as a half-hour grid.
pub fn run_timetable(cfg: &Config, group: &str) -> Result<()> {
    let timetable = LocalStore::new(&cfg.server.state_dir).load_timetable();
    let sessions: Vec<_> = timetable.for_group(group).collect();
    if sessions.is_empty() {
        println!("No sessions for {}.", group);
        return Ok(());
    }

    print!("{:<7}", "");
    for day in TEACHING_DAYS {
        print!("{:<22}", weekday_name(day));
    }
    println!();
    for row in grid::build(sessions.iter().copied()) {
        print!("{:<7}", row.at.format("%H:%M").to_string());
        for cell in &row.cells {
            let text = match cell {
                Cell::Free => String::new(),
                Cell::Start(starting) => starting
                    .iter()
                    .map(|s| format!("{} {}{}", s.module, s.building, s.classroom))
                    .collect::<Vec<_>>()
                    .join(" / "),
                Cell::Continued(_) => "  |".to_string(),
            };
            print!("{:<22}", truncate(&text, 21));
        }
        println!();
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max - 1).chain(std::iter::once('~')).collect()
}
