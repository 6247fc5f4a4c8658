use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use feedlab_core::{
    Beacon, FileStore, FlushOutcome, HttpBeacon, HttpTransport, PipelineConfig, RecordingBeacon,
    RecordingTransport, SessionStore, SimulatedPage, Transport,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    logging::init_logging,
    replay::{ReplayOutcome, run_replay},
    script::ReplayScript,
};

mod logging;
mod replay;
mod script;

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.0}m {:.0}s", (secs / 60.0).floor(), secs % 60.0)
    }
}

#[derive(Parser)]
#[command(name = "feedlab")]
#[command(about = "Replay scripted feed visits through the feedlab telemetry pipeline")]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mount a tracker on a simulated page and play a visit script against it
    Replay(ReplayArgs),
    /// Inspect or reset the persisted session id
    Session {
        #[command(subcommand)]
        action: SessionAction,

        /// Session store file. Defaults to the user cache directory.
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct ReplayArgs {
    /// Visit script (JSON)
    script: PathBuf,

    /// Batch collector URL (overrides FEEDLAB_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,

    /// Unload beacon URL (overrides FEEDLAB_BEACON_ENDPOINT)
    #[arg(long)]
    beacon_endpoint: Option<String>,

    #[arg(long)]
    heartbeat_ms: Option<u64>,

    #[arg(long)]
    flush_ms: Option<u64>,

    /// Override the script's participant id
    #[arg(short, long)]
    participant: Option<String>,

    /// Override the script's experimental condition
    #[arg(short, long)]
    condition: Option<String>,

    /// Session store file. Defaults to the user cache directory.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Record batches in memory instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// With --dry-run, print every delivered batch as JSON
    #[arg(long, requires = "dry_run")]
    print: bool,
}

#[derive(Subcommand)]
enum SessionAction {
    Show,
    Reset,
}

fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn open_store(path: Option<PathBuf>) -> FileStore {
    path.map(FileStore::new)
        .unwrap_or_else(FileStore::default_location)
}

fn pipeline_config(args: &ReplayArgs) -> Result<PipelineConfig> {
    let mut pipeline = PipelineConfig::from_env()?;
    if let Some(endpoint) = &args.endpoint {
        pipeline.endpoint = endpoint.clone();
    }
    if let Some(endpoint) = &args.beacon_endpoint {
        pipeline.beacon_endpoint = endpoint.clone();
    }
    if let Some(ms) = args.heartbeat_ms {
        pipeline.heartbeat_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = args.flush_ms {
        pipeline.flush_interval = Duration::from_millis(ms);
    }
    pipeline.validate()?;
    Ok(pipeline)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Command::Replay(args) => replay(args).await,
        Command::Session { action, store } => session(action, open_store(store)),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn session(action: SessionAction, store: FileStore) -> Result<()> {
    let key = PipelineConfig::from_env()?.storage_key;
    match action {
        SessionAction::Show => match store.get(&key) {
            Some(id) => println!("{} {}", style("Session:").dim(), style(id).cyan()),
            None => println!("{}", style("No session stored").dim()),
        },
        SessionAction::Reset => {
            store.remove(&key)?;
            println!(
                "{} Session cleared {}",
                style("✓").green().bold(),
                style(store.path().display()).dim()
            );
        }
    }
    Ok(())
}

async fn replay(args: ReplayArgs) -> Result<()> {
    let mut script = ReplayScript::load(&args.script)
        .await
        .with_context(|| format!("loading {}", args.script.display()))?;
    if let Some(participant) = &args.participant {
        script.tracker.participant_id = participant.clone();
    }
    if let Some(condition) = &args.condition {
        script.tracker.condition = condition.clone();
    }
    script.tracker.validate()?;
    let pipeline = pipeline_config(&args)?;

    println!(
        "\n{}  {}\n",
        style("feedlab").cyan().bold(),
        style("Visit Replay").dim()
    );
    println!(
        "{} {} / {} / {}",
        style("✓").green().bold(),
        style(&script.tracker.page_id).yellow(),
        script.tracker.condition,
        script.tracker.participant_id
    );
    println!(
        "{} {}",
        style("→").dim(),
        if args.dry_run {
            style("dry run, nothing leaves this process".to_string()).dim()
        } else {
            style(pipeline.endpoint.clone()).cyan()
        }
    );
    println!("{}", style("─".repeat(60)).dim());

    let recording = Arc::new(RecordingTransport::new());
    let recording_beacon = Arc::new(RecordingBeacon::new());
    let (transport, beacon): (Arc<dyn Transport>, Arc<dyn Beacon>) = if args.dry_run {
        (recording.clone(), recording_beacon.clone())
    } else {
        let client = reqwest::Client::new();
        (
            Arc::new(HttpTransport::new(client.clone(), pipeline.endpoint.clone())),
            Arc::new(HttpBeacon::new(client, pipeline.beacon_endpoint.clone())?),
        )
    };

    let page = Arc::new(SimulatedPage::with_system_clock(script.url.clone()));
    let store: Arc<dyn SessionStore> = Arc::new(open_store(args.store.clone()));

    let total_start = Instant::now();
    let steps = script.steps.len();
    let spinner = create_spinner(&format!(
        "Replaying {} steps (~{})...",
        steps,
        format_duration(Duration::from_millis(script.total_wait_ms()))
    ));
    let outcome = run_replay(
        &script,
        &pipeline,
        page,
        store,
        transport,
        beacon,
        |i, step| spinner.set_message(format!("Step {}/{}: {:?}", i + 1, steps, step.action)),
    )
    .await?;
    spinner.finish_with_message(format!(
        "{} Replayed {}/{} steps {}",
        style("✓").green().bold(),
        outcome.steps_applied,
        steps,
        style(format!("[{}]", format_duration(total_start.elapsed()))).dim()
    ));

    print_summary(&outcome);

    if args.print {
        println!("{}", style("─".repeat(60)).dim());
        for batch in recording.batches() {
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
        for batch in recording_beacon.sent() {
            println!("{}", serde_json::to_string_pretty(&batch)?);
        }
    }

    Ok(())
}

fn print_summary(outcome: &ReplayOutcome) {
    let stats = &outcome.stats;
    println!(
        "{} Session {}  page session {}",
        style("✓").green().bold(),
        style(&outcome.keys.session_id).cyan(),
        style(&outcome.keys.page_session_id).dim()
    );
    println!(
        "{} {} records stamped, {} delivered in {} batches",
        style("✓").green().bold(),
        outcome.last_seq,
        stats.delivered_records,
        stats.delivered_batches
    );
    if stats.failures > 0 {
        println!(
            "{} {} failed deliveries were requeued",
            style("!").yellow().bold(),
            stats.failures
        );
    }
    match outcome.final_flush {
        FlushOutcome::Requeued(n) => println!(
            "{} Final flush failed, {} records left undelivered",
            style("✗").red().bold(),
            n
        ),
        other => println!("{} Final flush: {:?}", style("✓").green().bold(), other),
    }
    println!("{}", style("─".repeat(60)).dim());
}
