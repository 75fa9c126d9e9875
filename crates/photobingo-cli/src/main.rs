//! Photo Bingo CLI - a headless terminal client for the progress engine.
//!
//! Loads an event board, prints the leaderboard (or one participant's card)
//! and optionally keeps watching for new completions.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use photobingo_core::models::BOARD_SIZE;
use photobingo_core::{
    ApiClient, BoardEvent, BoardState, EngineConfig, EventKind, Phase, StateController, View,
};

// ============================================================================
// Constants
// ============================================================================

/// Overrides the configured service base URL
const BASE_URL_ENV: &str = "PHOTOBINGO_BASE_URL";

/// Event to load when none is given on the command line
const EVENT_ENV: &str = "PHOTOBINGO_EVENT";

/// Directory for daily rolling log files
const LOG_DIR_ENV: &str = "PHOTOBINGO_LOG_DIR";

/// Refresh interval for --watch when the config has none
const DEFAULT_WATCH_SECS: u64 = 30;

const USAGE: &str = "\
Usage: photobingo [EVENT] [PARTICIPANT] [--watch] [--json]

  EVENT        Event to load (default: $PHOTOBINGO_EVENT)
  PARTICIPANT  Show this participant's card instead of the leaderboard
  --watch      Keep refreshing and report new completions until Ctrl-C
  --json       Print the board snapshot as JSON";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct Args {
    event: Option<String>,
    participant: Option<String>,
    watch: bool,
    json: bool,
    help: bool,
}

impl Args {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut parsed = Args::default();
        for arg in args {
            match arg.as_str() {
                "--watch" | "-w" => parsed.watch = true,
                "--json" => parsed.json = true,
                "--help" | "-h" => parsed.help = true,
                flag if flag.starts_with('-') => bail!("Unknown option: {flag}"),
                _ if parsed.event.is_none() => parsed.event = Some(arg),
                _ if parsed.participant.is_none() => parsed.participant = Some(arg),
                _ => bail!("Unexpected argument: {arg}"),
            }
        }
        Ok(parsed)
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` controls the level (default `warn`). Logs go to stderr, and
/// additionally to a daily file when `PHOTOBINGO_LOG_DIR` is set; the
/// returned guard must live until exit so buffered lines are flushed.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "photobingo.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}

fn load_config() -> Result<EngineConfig> {
    let mut config = EngineConfig::load()?;
    if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
        if !base_url.trim().is_empty() {
            config.base_url = base_url;
        }
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let _log_guard = init_tracing();
    info!("Photo Bingo CLI starting");

    let config = load_config()?;
    let event_id = args
        .event
        .clone()
        .or_else(|| std::env::var(EVENT_ENV).ok())
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| anyhow!("No event given. Pass one or set {EVENT_ENV}.\n\n{USAGE}"))?;

    let client = ApiClient::new(&config).context("Failed to create API client")?;
    let controller = Arc::new(StateController::new(Arc::new(client), config.clone()));

    let mut state = controller
        .initialize(&event_id, args.participant.as_deref())
        .await;
    if state.last_error.as_ref().is_some_and(|e| e.can_retry) {
        info!("Initialization failed with a transient error, retrying once");
        state = controller.retry().await;
    }
    if let Some(error) = &state.last_error {
        controller.destroy();
        bail!("Could not load event {event_id}: {}", error.message);
    }

    print_board(&state, args.json)?;

    if args.watch {
        watch(&controller, &config).await?;
    }

    controller.destroy();
    info!("Photo Bingo CLI shutting down");
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_board(state: &BoardState, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(state)?);
        return Ok(());
    }

    let event = state.event_id.as_deref().unwrap_or("?");
    println!(
        "Event: {event} ({} participants, {} squares)",
        state.participants.len(),
        state.squares.len()
    );

    match (state.view, state.selected_participant.as_deref()) {
        (View::Player, Some(name)) => print_card(state, name),
        _ => print_leaderboard(state),
    }
    Ok(())
}

fn print_leaderboard(state: &BoardState) {
    let Some(stats) = &state.stats else {
        return;
    };
    println!(
        "Overall completion: {:.1}% ({} completions, average {:.1}%)",
        stats.overall_completion, stats.total_completions, stats.average_participant_progress
    );

    println!("\nLeaderboard");
    let width = state
        .participants
        .iter()
        .map(|p| p.name.len())
        .max()
        .unwrap_or(0);
    for stat in &stats.participant_stats {
        println!(
            "  {:>2}. {:<width$}  {:>2}/{}  {:>5.1}%",
            stat.rank,
            stat.participant_name,
            stat.completion_count,
            state.squares.len(),
            stat.completion_rate,
        );
    }
}

fn print_card(state: &BoardState, name: &str) {
    let Some(progress) = &state.participant_progress else {
        return;
    };
    println!(
        "{name}: {}/{} squares ({:.1}%)\n",
        progress.completion_count, progress.total_squares, progress.completion_rate
    );

    for row in state.squares.chunks(BOARD_SIZE) {
        let cells: Vec<String> = row
            .iter()
            .map(|square| {
                let mark = if progress.is_completed(square.index) { 'x' } else { ' ' };
                format!("[{mark}] {:<20}", square.text)
            })
            .collect();
        println!("  {}", cells.join(" ").trim_end());
    }
}

// ============================================================================
// Watch mode
// ============================================================================

async fn watch(controller: &Arc<StateController>, config: &EngineConfig) -> Result<()> {
    let progress = controller
        .event_bus()
        .subscribe(EventKind::ProgressUpdate, |event| {
            if let BoardEvent::ProgressUpdate(delta) = event {
                println!(
                    "{:+} completion(s), {} total ({:.1}% of the board)",
                    delta.delta(),
                    delta.current_total,
                    delta.overall_completion
                );
            }
            Ok(())
        });
    let errors = controller
        .event_bus()
        .subscribe(EventKind::StateChange, |event| {
            if let BoardEvent::StateChange(state) = event {
                if let (Phase::Error, Some(error)) = (state.phase, &state.last_error) {
                    eprintln!("Refresh failed: {}", error.message);
                }
            }
            Ok(())
        });

    let interval = config
        .auto_refresh_interval()
        .unwrap_or(Duration::from_secs(DEFAULT_WATCH_SECS));
    controller.start_auto_refresh(interval);
    eprintln!("Watching for new photos every {}s, Ctrl-C to stop", interval.as_secs());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    controller.stop_auto_refresh();
    progress.unsubscribe();
    errors.unsubscribe();
    Ok(())
}
