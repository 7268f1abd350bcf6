mod availability;
mod booking;
mod calendar;
mod commands;
mod config;
mod error;
mod gateway;
mod models;
mod notice;
mod session;
mod store;
mod team;
mod timetable;
mod viva;
mod web;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// SDGP portal: timetables, availability, team registration and feedback bookings.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Print detailed API responses
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Path to config file
    #[arg(short = 'c', long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Bearer token sent to the backend
    #[arg(long, global = true)]
    token: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the portal dashboard
    Serve {
        /// Listen address (overrides server.addr, e.g. "0.0.0.0:5173")
        #[arg(short = 'a', long)]
        addr: Option<String>,
    },

    /// List lecturers
    Lecturers,

    /// Register a lecturer
    AddLecturer {
        #[arg(long)]
        name: String,

        /// Short name used on timetables, e.g. "JS"
        #[arg(long)]
        short: String,

        #[arg(long)]
        email: String,
    },

    /// List registered teams and their status
    Teams,

    /// Approve a team
    ///
    /// A leader has to be chosen; without --leader nothing is sent.
    Approve {
        #[arg(short = 't', long)]
        team: String,

        /// Member id of the team leader
        #[arg(short = 'l', long)]
        leader: Option<String>,
    },

    /// Reject a team
    Reject {
        #[arg(short = 't', long)]
        team: String,
    },

    /// List lecture halls known to the session service
    Halls,

    /// Import a timetable CSV into a tutorial group
    ///
    /// Columns: Lecturer,Module,Day,StartTime,EndTime,Type,Building,Classroom
    Import {
        /// Tutorial group, e.g. "CS-G1"
        #[arg(short = 'g', long)]
        group: String,

        /// CSV file with a header row
        #[arg(short = 'f', long)]
        file: PathBuf,

        /// Also send the imported sessions to the backend
        #[arg(long)]
        push: bool,

        /// Timetable id the pushed sessions belong to
        #[arg(long)]
        timetable_id: Option<String>,
    },

    /// Print a group's timetable
    Timetable {
        #[arg(short = 'g', long)]
        group: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;
    let token = &cli.token;

    match &cli.command {
        Command::Serve { addr } => {
            let addr = addr.clone().unwrap_or_else(|| cfg.server.addr.clone());
            web::serve(cfg, &addr).await?;
        }
        Command::Lecturers => commands::run_lecturers(&cfg, token, cli.verbose).await?,
        Command::AddLecturer { name, short, email } => {
            commands::run_add_lecturer(&cfg, token, name, short, email).await?
        }
        Command::Teams => commands::run_teams(&cfg, token, cli.verbose).await?,
        Command::Approve { team, leader } => {
            commands::run_approve(&cfg, token, team, leader).await?
        }
        Command::Reject { team } => commands::run_reject(&cfg, token, team).await?,
        Command::Halls => commands::run_halls(&cfg, token).await?,
        Command::Import {
            group,
            file,
            push,
            timetable_id,
        } => {
            commands::run_import(
                &cfg,
                token,
                commands::ImportArgs {
                    group,
                    file,
                    push: *push,
                    timetable_id: timetable_id.as_deref(),
                },
            )
            .await?
        }
        Command::Timetable { group } => commands::run_timetable(&cfg, group)?,
    }

    Ok(())
}
