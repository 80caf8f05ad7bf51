//! Operator command line for call-guard
//!
//! Maintains the blocklist and call history in the configured database and
//! can replay a scripted call through the lifecycle tracker. Results are
//! printed as JSON on stdout; logs go to stderr.

mod simulated;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use call_guard::logging::{setup_logging, LoggingConfig};
use call_guard::{
    CallGuard, CallGuardConfig, CallStateEvent, ControlCapabilities, TrackerEvent,
};
use simulated::SimulatedCallControl;

#[derive(Parser, Debug)]
#[command(
    name = "call-guard",
    author,
    version,
    about = "Incoming call blocklist and call history",
    long_about = None
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL, overrides the configuration file
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a number to the blocklist
    Block {
        number: String,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Remove a number from the blocklist
    Unblock { number: String },
    /// Check whether a number would be blocked
    Check { number: String },
    /// List blocked numbers, newest first
    List,
    /// Show recent calls
    Calls {
        #[arg(short, long, default_value_t = call_guard::bridge::DEFAULT_RECENT_LIMIT)]
        limit: u32,
    },
    /// Delete one call record
    DeleteCall { id: i64 },
    /// Call statistics
    Stats,
    /// Trim call history
    Trim {
        /// Keep only the newest N records
        #[arg(long, conflicts_with = "older_than_days")]
        keep_latest: Option<u32>,
        /// Delete records older than this many days
        #[arg(long)]
        older_than_days: Option<i64>,
    },
    /// Check that call history can be read
    Availability,
    /// Replay an incoming call through the tracker
    Simulate {
        number: String,
        /// Answer the call after this many seconds
        #[arg(long)]
        answer_after: Option<u64>,
        /// End the call this many seconds after it started ringing
        #[arg(long, default_value_t = 3)]
        hangup_after: u64,
        /// Pretend the platform has no reject/disconnect capability
        #[arg(long)]
        no_call_control: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<CallGuardConfig> {
    let mut config = match &cli.config {
        Some(path) => CallGuardConfig::from_file(path)?,
        None => CallGuardConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(url) = &cli.database {
        config.database.url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;

    let mut logging = LoggingConfig::from_settings(&config.logging, "call-guard")?;
    if cli.json_logs {
        logging = logging.with_json();
    }
    setup_logging(logging)?;

    let capabilities = match &cli.command {
        Command::Simulate { no_call_control: true, .. } => ControlCapabilities {
            call_control: false,
            privileged_hangup: true,
        },
        _ => ControlCapabilities {
            call_control: true,
            privileged_hangup: true,
        },
    };
    let surface = Arc::new(SimulatedCallControl::new(capabilities));
    let guard = CallGuard::new(config, surface.clone())
        .await
        .context("failed to open call guard database")?;

    let result = execute(&guard, &surface, cli.command).await;
    guard.shutdown().await;
    result
}

async fn execute(
    guard: &CallGuard,
    surface: &SimulatedCallControl,
    command: Command,
) -> anyhow::Result<()> {
    let bridge = guard.bridge();
    debug!(?command, "Executing command");

    match command {
        Command::Block { number, reason } => {
            let blocked = bridge.add_blocked_number(&number, reason.as_deref()).await?;
            print_json(&serde_json::json!({ "number": number, "blocked": blocked }))
        }
        Command::Unblock { number } => {
            let removed = bridge.remove_blocked_number(&number).await?;
            print_json(&serde_json::json!({ "number": number, "removed": removed }))
        }
        Command::Check { number } => {
            let entry = guard.engine().lookup(&number).await?;
            print_json(&serde_json::json!({
                "number": number,
                "blocked": entry.is_some(),
                "entry": entry,
            }))
        }
        Command::List => print_json(&bridge.list_blocked_numbers().await?),
        Command::Calls { limit } => print_json(&bridge.get_recent_calls(limit).await?),
        Command::DeleteCall { id } => {
            let deleted = bridge.delete_call_record(id).await?;
            print_json(&serde_json::json!({ "id": id, "deleted": deleted }))
        }
        Command::Stats => print_json(&bridge.get_statistics().await?),
        Command::Trim { keep_latest, older_than_days } => {
            let older_than = older_than_days.map(|days| Utc::now() - chrono::Duration::days(days));
            let removed = bridge.trim_call_history(keep_latest, older_than).await?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
        Command::Availability => print_json(&bridge.check_call_log_availability().await),
        Command::Simulate { number, answer_after, hangup_after, .. } => {
            simulate(guard, surface, number, answer_after, hangup_after).await
        }
    }
}

#[derive(Serialize)]
struct SimulationReport {
    events: Vec<TrackerEvent>,
    terminations: Vec<call_guard::TerminationStrategy>,
    record: Option<call_guard::CallRecord>,
}

async fn simulate(
    guard: &CallGuard,
    surface: &SimulatedCallControl,
    number: String,
    answer_after: Option<u64>,
    hangup_after: u64,
) -> anyhow::Result<()> {
    if answer_after.is_some_and(|answer| answer > hangup_after) {
        anyhow::bail!("--answer-after must not exceed --hangup-after");
    }

    let tracker = guard.tracker();
    let mut events = tracker.subscribe();

    tracker.on_call_state_changed(CallStateEvent::Ringing(number));
    // let the blocking decision land before scripting the rest of the call
    tracker.flush().await;
    let mut waited = 0;
    if let Some(answer) = answer_after {
        tokio::time::sleep(Duration::from_secs(answer)).await;
        tracker.on_call_state_changed(CallStateEvent::Answered);
        waited = answer;
    }
    tokio::time::sleep(Duration::from_secs(hangup_after - waited)).await;
    tracker.on_call_state_changed(CallStateEvent::Idle);
    tracker.flush().await;

    let mut report = SimulationReport {
        events: Vec::new(),
        terminations: surface.attempts(),
        record: None,
    };
    while let Ok(event) = events.try_recv() {
        if let TrackerEvent::SessionEnded { record_id: Some(id), .. } = &event {
            report.record = guard.history().get(*id).await?;
        }
        report.events.push(event);
    }
    print_json(&report)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "call-guard",
            "block",
            "5550100",
            "--reason",
            "spam",
            "--database",
            "sqlite::memory:",
        ])
        .unwrap();
        assert_eq!(cli.database.as_deref(), Some("sqlite::memory:"));
        assert!(matches!(cli.command, Command::Block { reason: Some(ref r), .. } if r == "spam"));
    }

    #[test]
    fn test_trim_policies_conflict() {
        let args = ["call-guard", "trim", "--keep-latest", "5", "--older-than-days", "3"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[tokio::test]
    async fn test_simulated_call_is_blocked() -> anyhow::Result<()> {
        let surface = Arc::new(SimulatedCallControl::new(ControlCapabilities {
            call_control: true,
            privileged_hangup: false,
        }));
        let guard = CallGuard::new(CallGuardConfig::in_memory(), surface.clone()).await?;
        guard.bridge().add_blocked_number("5550100", Some("spam")).await?;

        simulate(&guard, &surface, "+1 555 0100".into(), None, 0).await?;

        assert_eq!(surface.attempts(), vec![call_guard::TerminationStrategy::Reject]);
        guard.shutdown().await;
        Ok(())
    }
}
