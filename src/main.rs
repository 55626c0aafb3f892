//! touchloop - glove-and-object touch instrument
//!
//! Receives glove pressure datagrams over UDP, fuses them with object and
//! hand snapshots from an external vision process, plays the mapped sounds
//! and runs the tempo-locked loop station.
//!
//! # Usage
//!
//! ```bash
//! # Engine with null audio output, commands on stdin
//! cargo run --release
//!
//! # Real audio device
//! cargo run --release --features audio-device -- --device
//!
//! # Synthetic gloves in another terminal
//! cargo run --release --bin glove-sim
//!
//! # Replay a command script
//! ./touchloop --script session.jsonl
//! ```
//!
//! # Environment Variables
//!
//! - `TOUCHLOOP_CONFIG`: path to the TOML configuration
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use touchloop::acquisition::spawn_glove_worker;
use touchloop::audio::{AudioOutput, WavLoader};
use touchloop::bridge;
use touchloop::config::defaults::GLOVE_ADC_MAX;
use touchloop::config::{EngineConfig, CONFIG_ENV_VAR};
use touchloop::control::{run_command_loop, Controller, LineSource, StdinSource};
use touchloop::pipeline::{run_supervisor, spawn_core_tasks, EngineContext, TaskResult};
use touchloop::types::Hand;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "touchloop")]
#[command(about = "Glove-and-object touch instrument with a tempo-locked loop station")]
#[command(version)]
struct CliArgs {
    /// Configuration file (otherwise $TOUCHLOOP_CONFIG, ./touchloop.toml, defaults)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the left glove UDP port
    #[arg(long, env = "TOUCHLOOP_LEFT_PORT")]
    left_port: Option<u16>,

    /// Override the right glove UDP port
    #[arg(long, env = "TOUCHLOOP_RIGHT_PORT")]
    right_port: Option<u16>,

    /// Play through the default audio device instead of the null output
    #[arg(long)]
    device: bool,

    /// Start with glove reception disabled
    #[arg(long)]
    no_glove: bool,

    /// Read commands from a JSON-lines file instead of stdin
    #[arg(long, value_name = "PATH")]
    script: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Replies go to stdout; logs go to stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &CliArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load(),
    };

    if let Some(port) = args.left_port {
        config.network.left_port = port;
    }
    if let Some(port) = args.right_port {
        config.network.right_port = port;
    }
    if args.device {
        config.audio.use_device = true;
    }
    if args.no_glove {
        config.network.glove_enabled = false;
    }

    config
        .validate()
        .context("Invalid configuration after command-line overrides")?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = load_config(&args)?;
    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  touchloop {}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if args.config.is_none() && std::env::var(CONFIG_ENV_VAR).is_err() {
        info!("Config: set {} to use a specific file", CONFIG_ENV_VAR);
    }

    let loader = Arc::new(WavLoader::new(config.audio.sample_rate));
    let (ctx, detections) = EngineContext::new(config, loader);

    // Audio output
    let output = AudioOutput::start(&ctx.config.audio, &ctx.mixer).context("Failed to start audio output")?;
    info!(
        "Audio: {} output @ {} Hz, {} frames/block, {} voices",
        output.name(),
        ctx.config.audio.sample_rate,
        ctx.config.audio.block_size,
        ctx.config.audio.max_voices
    );

    // Glove workers (OS threads) and their bridges
    let mut workers = Vec::with_capacity(Hand::ALL.len());
    let mut gloves = Vec::with_capacity(Hand::ALL.len());
    for hand in Hand::ALL {
        let (tx, rx) = bridge::channel(ctx.config.bridge.glove_capacity);
        let worker = spawn_glove_worker(hand, &ctx.config.network, GLOVE_ADC_MAX, Arc::clone(&ctx.status), tx)
            .with_context(|| format!("Failed to start {} glove worker", hand))?;
        workers.push(worker);
        gloves.push((hand, rx));
    }

    // Graceful shutdown via Ctrl+C
    let cancel = CancellationToken::new();
    let shutdown_token = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<TaskResult> = JoinSet::new();
    spawn_core_tasks(&mut task_set, &ctx, gloves, detections, &cancel);

    let controller = Controller::new(Arc::clone(&ctx));
    match &args.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open command script {}", path.display()))?;
            info!("Commands: {}", path.display());
            task_set.spawn(run_command_loop(
                controller,
                LineSource::new(BufReader::new(file), "script"),
                tokio::io::stdout(),
                cancel.clone(),
            ));
        }
        None => {
            info!("Commands: stdin (one JSON object per line)");
            task_set.spawn(run_command_loop(
                controller,
                StdinSource::stdin(),
                tokio::io::stdout(),
                cancel.clone(),
            ));
        }
    }

    let result = run_supervisor(&mut task_set, cancel.clone()).await;

    // Shutdown: wake the workers, stop playback, then release the device.
    ctx.shutdown();
    for worker in workers {
        let hand = worker.hand;
        let received = worker.stats.received();
        let malformed = worker.stats.malformed();
        worker.join();
        info!("[UdpWorker:{}] {} datagrams ({} malformed)", hand, received, malformed);
    }
    output.stop();
    ctx.mixer.stop_all();
    let released = ctx.mixer.release_retired();
    if released > 0 {
        warn!("Released {} voices still playing at shutdown", released);
    }

    let stats = ctx.stats.snapshot();
    info!(
        "Session: {} touch events, {} triggers, {} recorded, {} detection snapshots",
        stats.touch_events, stats.triggers, stats.recorded, stats.detections
    );

    result?;
    info!("✓ touchloop shutdown complete");
    Ok(())
}
