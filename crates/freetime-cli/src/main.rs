//! `freetime` CLI — day timelines and mutual free slots from JSON calendars.
//!
//! ## Usage
//!
//! ```sh
//! # Rest-of-day timeline for one calendar (stdin → stdout)
//! cat events.json | freetime timeline --now 2026-03-16T09:00:00Z
//!
//! # With sleep hours in a local timezone
//! freetime timeline -i events.json --now 2026-03-16T13:00:00Z \
//!   --sleep-start 23:00 --sleep-end 07:00 --timezone America/New_York
//!
//! # Mutual free slots for everyone in calendars.json ({"alice": [...], "bob": [...]})
//! freetime mutual -i calendars.json --start 2026-03-16T00:00:00Z --end 2026-03-18T00:00:00Z
//!
//! # Restrict participants, require an hour, exclude 22:00-07:00
//! freetime mutual -i calendars.json --start ... --end ... --users alice,bob \
//!   --min-slot 60 --exclude 22-7
//!
//! # Engine defaults from a file; FREETIME_* variables override the file
//! freetime --config freetime.json mutual -i calendars.json --start ... --end ...
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` for detail.

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use freetime_engine::config::parse_hour_band;
use freetime_engine::{
    AvailabilityCoordinator, AvailabilityQuery, EngineConfig, Event, InMemoryEventSource,
    InMemoryProfileSource, SleepSchedule, UserId,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// User id under which a single `timeline` calendar is registered.
const TIMELINE_USER: &str = "me";

#[derive(Parser)]
#[command(
    name = "freetime",
    version,
    about = "Busy/free day timelines and mutual availability"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config JSON file (defaults apply if omitted)
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Busy/free timeline from now until the end of the waking day
    Timeline {
        /// Events JSON array (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Reference instant, RFC 3339 (defaults to the current time)
        #[arg(long)]
        now: Option<String>,
        /// Local bedtime, HH:MM
        #[arg(long, requires = "sleep_end")]
        sleep_start: Option<String>,
        /// Local wake-up time, HH:MM
        #[arg(long, requires = "sleep_start")]
        sleep_end: Option<String>,
        /// IANA timezone for sleep hours
        #[arg(long)]
        timezone: Option<String>,
        /// Hide free gaps shorter than this many minutes
        #[arg(long)]
        min_gap: Option<i64>,
    },
    /// Windows in which every participant is free
    Mutual {
        /// Calendars JSON object mapping user id to events (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Output file (writes to stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
        /// Range start, RFC 3339
        #[arg(long)]
        start: String,
        /// Range end, RFC 3339
        #[arg(long)]
        end: String,
        /// Minimum slot length in minutes
        #[arg(long)]
        min_slot: Option<i64>,
        /// Daily excluded hour band, START-END (e.g. 0-6 or 22-7)
        #[arg(long)]
        exclude: Option<String>,
        /// IANA timezone for the excluded band
        #[arg(long)]
        timezone: Option<String>,
        /// Comma-separated participants (defaults to every calendar in the input)
        #[arg(long)]
        users: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Timeline {
            input,
            output,
            now,
            sleep_start,
            sleep_end,
            timezone,
            min_gap,
        } => {
            let mut config = config;
            if let Some(timezone) = timezone {
                config.timezone = timezone;
            }
            if let Some(min_gap) = min_gap {
                config.min_gap_minutes = min_gap;
            }
            config.validate().context("Invalid timeline options")?;

            let now = match now.as_deref() {
                Some(raw) => parse_instant(raw, "--now")?,
                None => Utc::now(),
            };
            let events: Vec<Event> = serde_json::from_str(&read_input(input.as_deref())?)
                .context("Failed to parse events JSON")?;
            let schedule = SleepSchedule::from_profile(sleep_start.as_deref(), sleep_end.as_deref())
                .context("Invalid sleep hours")?;

            let mut source = InMemoryEventSource::default();
            source.insert(TIMELINE_USER, events);
            let mut profiles = InMemoryProfileSource::default();
            if let Some(schedule) = schedule {
                profiles.insert(TIMELINE_USER, schedule);
            }

            let coordinator = AvailabilityCoordinator::new(Arc::new(source), config)
                .with_profiles(Arc::new(profiles));
            let timeline = coordinator
                .day_timeline(TIMELINE_USER, now, &CancellationToken::new())
                .await
                .context("Failed to build day timeline")?;

            write_json(output.as_deref(), &timeline)?;
        }
        Commands::Mutual {
            input,
            output,
            start,
            end,
            min_slot,
            exclude,
            timezone,
            users,
        } => {
            let calendars: BTreeMap<UserId, Vec<Event>> =
                serde_json::from_str(&read_input(input.as_deref())?)
                    .context("Failed to parse calendars JSON")?;

            let user_ids: Vec<UserId> = match users.as_deref() {
                Some(raw) => split_users(raw),
                None => calendars.keys().cloned().collect(),
            };
            let (band_start, band_end) = match exclude.as_deref() {
                Some(raw) => parse_hour_band(raw).context("Invalid --exclude")?,
                None => config.excluded_hours,
            };
            let query = AvailabilityQuery::new(
                user_ids,
                parse_instant(&start, "--start")?,
                parse_instant(&end, "--end")?,
            )
            .with_min_slot_minutes(min_slot.unwrap_or(config.min_slot_minutes))
            .with_excluded_hours(band_start, band_end)
            .with_timezone(timezone.unwrap_or_else(|| config.timezone.clone()));

            let source: InMemoryEventSource = calendars.into_iter().collect();
            let coordinator = AvailabilityCoordinator::new(Arc::new(source), config);
            let slots = coordinator
                .find_mutual_free_slots(&query, &CancellationToken::new())
                .await
                .context("Failed to find mutual free slots")?;

            write_json(output.as_deref(), &slots)?;
        }
    }

    Ok(())
}

/// Config file (if any), then `FREETIME_*` environment overrides.
fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path))?,
        None => EngineConfig::default(),
    };
    let config = config
        .with_env_overrides()
        .context("Invalid FREETIME_* environment override")?;
    tracing::debug!(?config, "loaded engine config");
    Ok(config)
}

fn parse_instant(raw: &str, flag: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{} must be an RFC 3339 datetime, got '{}'", flag, raw))
}

/// `"alice, bob,,carol"` → `["alice", "bob", "carol"]`
fn split_users(raw: &str) -> Vec<UserId> {
    raw.split(',')
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_json<T: serde::Serialize>(path: Option<&str>, value: &T) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    content.push('\n');
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
