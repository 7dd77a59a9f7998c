//! OpenFlow controller daemon
//!
//! Main entry point for sdnctld. Loads the static policy tables and drives
//! the policy engine from a JSON-lines event stream (stdin by default),
//! writing every emitted flow-mod and packet-out to stdout.

use anyhow::{Context, Result};
use clap::Parser;
use sdn_controller::{run_replay, ControllerConfig, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Reactive OpenFlow controller: learning switch, firewall and virtual-IP
/// load balancer
#[derive(Parser, Debug)]
#[command(name = "sdnctld")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Read events from this file instead of stdin
    #[arg(short = 'r', long)]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("sdnctld: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => {
            info!("sdnctld: Exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "sdnctld: Exiting with error");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout carries switch messages.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {:?}", level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set logger: {}", e))
}

async fn run(args: Args) -> Result<()> {
    let config = ControllerConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.log_summary();

    let engine = Arc::new(config.build_engine()?);
    if args.check {
        info!(path = %args.config.display(), "sdnctld: Configuration is valid");
        return Ok(());
    }

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.replay {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    info!("sdnctld: Processing events");
    let replay = run_replay(
        Arc::clone(&engine),
        config.controller.event_queue_depth,
        input,
        tokio::io::stdout(),
    );

    tokio::select! {
        result = replay => {
            let report = result?;
            info!(
                events = report.events,
                skipped = report.skipped_lines,
                messages = report.messages,
                handled = report.engine.packets_handled,
                floods = report.engine.floods,
                unicast_rules = report.engine.unicast_rules,
                drops = report.engine.drops,
                arp_replies = report.engine.arp_replies,
                vip_flows = report.engine.vip_flows,
                malformed = report.engine.malformed,
                install_failures = report.engine.install_failures,
                "sdnctld: Event stream finished"
            );
        }
        _ = signal::ctrl_c() => {
            warn!("sdnctld: Received SIGINT, shutting down");
        }
    }

    let snapshot = engine.monitor().snapshot();
    for (switch, source, count) in &snapshot {
        info!(%switch, %source, count, "sdnctld: Monitored packets");
    }
    let mut sources: Vec<_> = snapshot.iter().map(|(_, source, _)| *source).collect();
    sources.sort();
    sources.dedup();
    for source in sources {
        info!(%source, total = engine.monitor().total(source), "sdnctld: Monitored packets, all switches");
    }

    for service in engine.services().services() {
        info!(
            virtual_ip = %service.virtual_ip(),
            selections = service.selections(),
            "sdnctld: Backend selections"
        );
    }
    Ok(())
}
