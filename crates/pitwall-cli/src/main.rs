//! pitwall - Formula 1 standings and race info in the terminal.
//!
//! Every command serves the freshest data it is allowed to fetch and falls back
//! to the local cache when the API is slow, down, or rate limited.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pitwall_core::models::position_display;
use pitwall_core::utils::{format_race_date, truncate_string};
use pitwall_core::{Config, ErgastClient, F1Service, RefreshEvent, CURRENT_SEASON};

/// Set to a directory to also write a daily rolling log file there
const LOG_DIR_ENV: &str = "PITWALL_LOG_DIR";

const LOG_FILE_PREFIX: &str = "pitwall.log";

/// Column width for driver and team names
const NAME_WIDTH: usize = 24;

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Formula 1 standings and race info, cached for offline use
#[derive(Parser, Debug)]
#[command(name = "pitwall")]
#[command(about = "Formula 1 standings and race info in the terminal")]
#[command(version)]
struct Cli {
    /// Ignore refresh intervals and quotas for this call
    #[arg(short, long, global = true)]
    force: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Next race on the calendar
    Next,
    /// Podium of the last race
    Last,
    /// Driver championship standings
    Drivers,
    /// Constructor championship standings
    Constructors {
        /// Season year
        #[arg(default_value = CURRENT_SEASON)]
        season: String,
    },
    /// Cache state for every known key
    Status,
    /// Refetch everything now
    Refresh,
    /// Drop one cached payload, or all of them
    Clear {
        /// Cache key, e.g. driver_standings
        key: Option<String>,
    },
    /// Import cache files from an older install
    Migrate {
        /// Directory holding the old cache files
        dir: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn unavailable(what: &str) -> Result<()> {
    bail!("{} unavailable: no cached data and the API could not be reached", what)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let cli = Cli::parse();

    let config = Config::load()?;
    info!(command = ?cli.command, base_url = %config.api.base_url, "pitwall starting");
    let service = Arc::new(F1Service::from_config(&config)?);

    match &cli.command {
        Command::Next => next_race(&service, &cli).await,
        Command::Last => last_race(&service, &cli).await,
        Command::Drivers => driver_standings(&service, &cli).await,
        Command::Constructors { season } => constructor_standings(&service, season, &cli).await,
        Command::Status => status(&service, &cli),
        Command::Refresh => refresh(service).await,
        Command::Clear { key } => {
            let removed = service.clear(key.as_deref())?;
            println!("Removed {} cached payload(s)", removed);
            Ok(())
        }
        Command::Migrate { dir } => {
            let migrated = service.store().migrate_legacy(dir)?;
            println!("Migrated {} cache file(s) from {}", migrated, dir.display());
            Ok(())
        }
    }
}

async fn next_race(service: &F1Service<ErgastClient>, cli: &Cli) -> Result<()> {
    let Some(race) = service.next_race(cli.force).await else {
        return unavailable("Next race");
    };
    if cli.json {
        return print_json(&race);
    }

    match (&race.season, &race.round) {
        (Some(season), Some(round)) => println!("{} (Round {}, {})", race.name, round, season),
        _ => println!("{}", race.name),
    }
    println!("  Circuit:  {}", race.circuit);
    println!("  Location: {}", race.location);
    match &race.time {
        Some(time) => println!("  Date:     {} {}", format_race_date(&race.date), time),
        None => println!("  Date:     {}", format_race_date(&race.date)),
    }
    Ok(())
}

async fn last_race(service: &F1Service<ErgastClient>, cli: &Cli) -> Result<()> {
    let Some(race) = service.last_race(cli.force).await else {
        return unavailable("Last race");
    };
    if cli.json {
        return print_json(&race);
    }

    println!("{} - {}", race.name, format_race_date(&race.date));
    println!("  {} ({})", race.circuit, race.location);
    for entry in &race.podium {
        println!(
            "  P{}  {:<width$} {}",
            entry.position,
            truncate_string(&entry.name, NAME_WIDTH),
            entry.team,
            width = NAME_WIDTH
        );
    }
    Ok(())
}

async fn driver_standings(service: &F1Service<ErgastClient>, cli: &Cli) -> Result<()> {
    let Some(standings) = service.driver_standings(cli.force).await else {
        return unavailable("Driver standings");
    };
    if cli.json {
        return print_json(&standings);
    }

    for entry in &standings {
        println!(
            "{:>3}  {:<width$} {:<width$} {:>6}",
            position_display(entry.position),
            truncate_string(&entry.name, NAME_WIDTH),
            truncate_string(entry.team_name(), NAME_WIDTH),
            entry.points,
            width = NAME_WIDTH
        );
    }
    Ok(())
}

async fn constructor_standings(service: &F1Service<ErgastClient>, season: &str, cli: &Cli) -> Result<()> {
    let Some(standings) = service.constructor_standings(season, cli.force).await else {
        return unavailable("Constructor standings");
    };
    if cli.json {
        return print_json(&standings);
    }

    for entry in &standings {
        println!(
            "{:>3}  {:<width$} {:>3} wins {:>6}",
            position_display(entry.position),
            truncate_string(&entry.constructor, NAME_WIDTH),
            entry.wins,
            entry.points,
            width = NAME_WIDTH
        );
    }
    Ok(())
}

fn status(service: &F1Service<ErgastClient>, cli: &Cli) -> Result<()> {
    let status = service.status();
    if cli.json {
        return print_json(&status);
    }

    let now = Utc::now();
    println!("Cache: {}", service.store().cache_dir().display());
    for entry in &status {
        let quota = entry
            .max_fetches_per_day
            .map(|q| format!("{}/{}", entry.calls_in_window, q))
            .unwrap_or_else(|| format!("{}/-", entry.calls_in_window));
        let state = match (entry.has_cache, entry.beyond_max_age) {
            (false, _) => "empty",
            (true, true) => "old",
            (true, false) => "ok",
        };
        println!(
            "  {:<32} {:<6} updated {:<10} fetches today {:<6} total {}",
            entry.key,
            state,
            entry.age_display(now),
            quota,
            entry.fetch_count
        );
    }
    Ok(())
}

async fn refresh(service: Arc<F1Service<ErgastClient>>) -> Result<()> {
    let mut rx = pitwall_core::spawn_refresh_all(service);
    let mut failed = 0;

    while let Some(event) = rx.recv().await {
        match event {
            RefreshEvent::Started { total } => println!("Refreshing {} resources...", total),
            RefreshEvent::Updated { key } => println!("  ok      {}", key),
            RefreshEvent::Failed { key, reason } => println!("  failed  {}: {}", key, reason),
            RefreshEvent::Completed { succeeded, failed: count } => {
                failed = count;
                println!("Done: {} updated, {} failed", succeeded, count);
            }
        }
    }

    if failed > 0 {
        bail!("{} resource(s) could not be refreshed; cached copies were kept", failed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["pitwall", "--json", "constructors", "2021", "--force"]).expect("should parse");
        assert_eq!(cli.command, Command::Constructors { season: "2021".into() });
        assert!(cli.force);
        assert!(cli.json);
    }

    #[test]
    fn test_constructors_default_to_current_season() {
        let cli = Cli::try_parse_from(["pitwall", "constructors"]).expect("should parse");
        assert_eq!(cli.command, Command::Constructors { season: CURRENT_SEASON.into() });
        assert!(!cli.force);
    }

    #[test]
    fn test_clear_key_is_optional() {
        let cli = Cli::try_parse_from(["pitwall", "clear"]).expect("should parse");
        assert_eq!(cli.command, Command::Clear { key: None });
        let cli = Cli::try_parse_from(["pitwall", "clear", "next_race"]).expect("should parse");
        assert_eq!(cli.command, Command::Clear { key: Some("next_race".into()) });
    }

    #[test]
    fn test_rejects_bad_invocations() {
        assert!(Cli::try_parse_from(["pitwall"]).is_err());
        assert!(Cli::try_parse_from(["pitwall", "--verbose", "next"]).is_err());
        assert!(Cli::try_parse_from(["pitwall", "migrate"]).is_err());
        assert!(Cli::try_parse_from(["pitwall", "clear", "next_race", "last_race"]).is_err());
    }
}
