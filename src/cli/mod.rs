//! Operator CLI (spec §6 "CLI (operator surface)"): `scan`, `health`,
//! `optimize`, `sweep`, plus a `serve` command that boots the HTTP API.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::config::{Config, Quality};
use crate::error::{Result, ScanError};
use crate::model::ScanState;
use crate::orchestrator::{Orchestrator, SubmitOutcome};
use crate::store::Db;

#[derive(Parser, Debug)]
#[command(
    name = "motif",
    version,
    about = "Design token extraction and storage service",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to a TOML config file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Tracing filter directive (overridden by RUST_LOG)"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a URL for scanning and wait for it to finish.
    Scan {
        url: String,

        #[arg(long, value_enum, default_value_t = QualityArg::Standard, help = "Scan quality tier")]
        quality: QualityArg,
    },
    /// Check that the store is reachable and report its basic shape.
    Health,
    /// Install indexes (idempotent) and recompute the stats cache from base tables.
    Optimize,
    /// Force a CssContent garbage-collection sweep (releases rows past their TTL with refcount 0).
    Sweep,
    /// Boot the HTTP API and block until shutdown.
    Serve,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum QualityArg {
    Fast,
    Standard,
    Premium,
}

impl From<QualityArg> for Quality {
    fn from(q: QualityArg) -> Self {
        match q {
            QualityArg::Fast => Quality::Fast,
            QualityArg::Standard => Quality::Standard,
            QualityArg::Premium => Quality::Premium,
        }
    }
}

/// Prints `report` as pretty JSON or delegates to `text` for human output.
fn emit<T: Serialize>(format: OutputFormat, report: &T, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => text(report),
    }
    Ok(())
}

/// Parses arguments and runs the selected subcommand, returning the process
/// exit code (spec §6: `0` success, `2` bad argument, `3` operational
/// failure, `4` scan failure classified in §7).
pub async fn run() -> i32 {
    let cli = Cli::parse();
    if let Err(err) = crate::logging::init_logging(&cli.log_level) {
        eprintln!("error: {err}");
        return 3;
    }

    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let db = Db::open(&config.database_url)?;

    match cli.command {
        Command::Scan { url, quality } => scan(&db, config, &url, quality.into(), cli.format).await,
        Command::Health => health(&db, cli.format),
        Command::Optimize => optimize(&db, cli.format),
        Command::Sweep => sweep(&db, cli.format),
        Command::Serve => crate::http::serve(db, config).await,
    }
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    database_url: String,
}

fn health(db: &Db, format: OutputFormat) -> Result<()> {
    db.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())).map_err(Into::into))?;
    let report = HealthReport { status: "ok", database_url: "connected".into() };
    emit(format, &report, |r| println!("status: {}  database: {}", r.status, r.database_url))
}

fn optimize(db: &Db, format: OutputFormat) -> Result<()> {
    // Db::open already applies the `CREATE TABLE/INDEX IF NOT EXISTS` schema,
    // so the only remaining work here is the expensive stats recompute.
    let stats = crate::store::stats::recompute(db)?;
    emit(format, &stats, |s| {
        println!(
            "sites={} scans={} token_sets={} tokens={} avg_confidence={:.3}",
            s.total_sites, s.total_scans, s.total_token_sets, s.total_tokens, s.average_confidence
        );
    })
}

fn sweep(db: &Db, format: OutputFormat) -> Result<()> {
    let report = crate::store::css::sweep(db)?;
    emit(format, &report, |r| println!("{r:?}"))
}

#[derive(Serialize)]
struct ScanReport {
    scan_id: i64,
    state: ScanState,
    message: String,
}

async fn scan(db: &Db, config: Config, url: &str, quality: Quality, format: OutputFormat) -> Result<()> {
    let orchestrator = Orchestrator::new(db.clone(), config);
    let outcome = orchestrator.submit(url, quality).await?;

    let scan_id = match outcome {
        SubmitOutcome::Started { scan_id } => scan_id,
        SubmitOutcome::AlreadyScanning { scan_id } => scan_id,
        SubmitOutcome::Cached { scan_id, .. } => {
            let report = ScanReport { scan_id, state: ScanState::Completed, message: "served from cache".into() };
            return emit(format, &report, |r| println!("scan {} completed: {}", r.scan_id, r.message));
        }
    };

    let progress = orchestrator.progress().get(scan_id).ok_or_else(|| {
        ScanError::Internal(format!("no progress channel for scan {scan_id}"))
    })?;

    let bar = indicatif::ProgressBar::new_spinner();
    bar.set_message("waiting for scan to start");

    let mut last_step = 0u64;
    let final_event = loop {
        let events = progress.events_since(last_step);
        let mut terminal = None;
        for event in events {
            last_step = event.step;
            bar.set_message(event.message.clone());
            bar.tick();
            if event.state.is_terminal() {
                terminal = Some(event);
            }
        }
        if let Some(event) = terminal {
            break event;
        }
        progress.notified().await;
    };
    bar.finish_and_clear();

    let report = ScanReport { scan_id, state: final_event.state, message: final_event.message.clone() };
    emit(format, &report, |r| println!("scan {} {:?}: {}", r.scan_id, r.state, r.message))?;

    match final_event.state {
        ScanState::Completed => Ok(()),
        ScanState::Failed => Err(ScanError::Internal(final_event.message)),
        ScanState::Canceled => Err(ScanError::Canceled),
        _ => Ok(()),
    }
}
