// leadhound: scheduled extraction of portal lead tables.
use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadhound::config::Config;
use leadhound::errors::ScrapeError;
use leadhound::ledger::Ledger;
use leadhound::notify::{NotificationSink, UnconfiguredSink, WebhookSink};
use leadhound::run;
use leadhound::scheduler;
use leadhound::status::StatusBoard;

/// Distinct exit codes so operators can tell a credentials problem from a
/// portal problem.
const EXIT_FAILED: u8 = 1;
const EXIT_AUTH: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Portal lead extraction pipeline")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a single extraction pass (the default).
    Run,
    /// Keep extracting on a randomized schedule.
    Watch,
    /// Show recent run history from the ledger.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let config = Config::from_env();

    if let Err(e) = init_logging(&config) {
        eprintln!("logging setup failed: {e}");
        return ExitCode::from(EXIT_FAILED);
    }

    match dispatch(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let auth_failure = e
                .downcast_ref::<ScrapeError>()
                .map(ScrapeError::is_auth)
                .unwrap_or(false);
            ExitCode::from(if auth_failure { EXIT_AUTH } else { EXIT_FAILED })
        }
    }
}

async fn dispatch(args: Args, config: Config) -> Result<()> {
    if !config.has_credentials() {
        warn!("portal credentials incomplete; relying on stored cookies or an open session");
    }
    let ledger = Ledger::open(&config.db_file)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            let board = StatusBoard::new();
            let sink = build_sink(&config)?;
            let _guard = board
                .begin_run()
                .context("another run is already active")?;
            run::execute(&config, &ledger, board.as_ref(), sink.as_ref()).await?;
            Ok(())
        }
        Command::Watch => {
            let board = StatusBoard::new();
            let sink = build_sink(&config)?;
            scheduler::watch(&config, &ledger, &board, sink.as_ref()).await;
            Ok(())
        }
        Command::Status => {
            let runs = ledger.recent_runs(20)?;
            if runs.is_empty() {
                println!("no runs recorded yet");
                return Ok(());
            }
            for record in runs {
                println!(
                    "#{:<4} {}  {:<8} connect: {:<24} extract: {:<28} {}",
                    record.id,
                    record.timestamp,
                    record.status,
                    record.connect_phase,
                    record.extract_phase,
                    record.details.unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

fn build_sink(config: &Config) -> Result<Box<dyn NotificationSink>> {
    match &config.webhook_url {
        Some(url) => Ok(Box::new(WebhookSink::new(url.clone())?)),
        None => {
            warn!("WEBHOOK_URL is not set; leads will be logged but not delivered");
            Ok(Box::new(UnconfiguredSink))
        }
    }
}

/// Console plus an append-mode file at the configured log path.
fn init_logging(config: &Config) -> Result<()> {
    if let Some(dir) = config.log_file.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("leadhound=info,info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}
