//! Audio session coordinator (avs-coordinator) - Main entry point
//!
//! Runs a scenario script against a coordinator bound to the in-process
//! `SharedHostPort` and prints every emitted event as one JSON line on
//! stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use avs_common::SessionEvent;
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avs_coordinator::script::{Scenario, ScenarioRunner};
use avs_coordinator::{Config, ConfigOverrides, Coordinator, SharedHostPort, Signal};

/// Command-line arguments for avs-coordinator
#[derive(Parser, Debug)]
#[command(name = "avs-coordinator")]
#[command(about = "Audio session coordinator scenario driver")]
#[command(version)]
struct Args {
    /// Scenario script (TOML)
    script: PathBuf,

    /// Configuration file (overrides AVS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Experience id to run as instead of the whole process
    #[arg(short, long, env = "AVS_TENANT")]
    tenant: Option<String>,

    /// Keep audio focus while the app is in the background
    #[arg(long)]
    stays_active_in_background: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let overrides = ConfigOverrides {
        tenant: args.tenant.clone(),
        stays_active_in_background: args.stays_active_in_background.then_some(true),
    };
    let config = Config::load(args.config.as_deref(), overrides)
        .context("Failed to load configuration")?;

    // Initialize tracing (stdout is reserved for events)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("avs_coordinator={0},avs_common={0}", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting audio session coordinator as {}", config.tenant);

    let scenario = Scenario::load(&args.script).context("Failed to load scenario")?;

    let host = Arc::new(SharedHostPort::new());
    let coordinator = Arc::new(
        Coordinator::new(host.clone(), config).context("Failed to initialize coordinator")?,
    );

    let printer = tokio::spawn(print_events(coordinator.subscribe()));
    let (signals, pump) = coordinator.spawn_pump();

    // Ctrl+C tears the coordinator down through the signal pump
    let interrupt = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, tearing down");
            let _ = signals.send(Signal::WillDeallocate);
        }
    });

    let runner_coordinator = Arc::clone(&coordinator);
    let outcomes = tokio::task::spawn_blocking(move || {
        let mut runner = ScenarioRunner::new(&runner_coordinator, &scenario);
        runner.run(&scenario.steps)
    })
    .await
    .context("Scenario runner failed")?;

    let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
    info!(
        "Scenario finished: {} steps, {} failed; active tenants: {:?}",
        outcomes.len(),
        failed,
        host.active_tenants()
    );

    coordinator.will_deallocate();
    interrupt.abort();
    pump.await.context("Signal pump failed")?;
    drop(coordinator);
    printer.await.context("Event printer failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Print events as JSON lines until the bus closes
async fn print_events(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event printer lagged; skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
