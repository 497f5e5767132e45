//! Watchkeeper Simulator
//!
//! Runs a cluster of in-process nodes through master churn and operator
//! commands, checking that the watch service runs on at most one node.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchkeeper_coordinator::LifecycleConfig;

mod cluster;
mod controller;
mod metrics;
mod scenario;
mod service;

use controller::SimulationController;
use scenario::Scenario;

/// Watchkeeper Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Watch service lifecycle simulation environment")]
struct Args {
    /// Number of simulated nodes to create
    #[arg(short, long, default_value = "3")]
    nodes: usize,

    /// Scenario to run
    #[arg(short, long)]
    scenario: Option<String>,

    /// List available scenarios and exit
    #[arg(long)]
    list: bool,

    /// Simulation speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Run duration in seconds (0 = infinite)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Keep the watch service stopped on boot until an operator starts it
    #[arg(long)]
    manual_start: bool,

    /// Emit JSON logs and a JSON summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = LifecycleConfig::from_env()?;
    if args.manual_start {
        config.start_immediately = false;
    }
    config.validate()?;

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
    );
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if args.list {
        for name in Scenario::names() {
            let scenario = Scenario::load(name)?;
            println!("{:<16} {}", scenario.name, scenario.description);
        }
        return Ok(());
    }

    info!("Starting Watchkeeper Simulator");
    info!("Nodes: {}", args.nodes);
    info!("Speed: {}x", args.speed);
    info!("Start immediately: {}", config.start_immediately);

    let mut controller = SimulationController::new(args.nodes, args.speed, args.seed, config);
    controller.initialize().await?;

    let outcome = if let Some(scenario_name) = &args.scenario {
        let scenario = Scenario::load(scenario_name)?;
        controller.run_scenario(scenario).await
    } else {
        info!("Running with random cluster churn");
        info!("Press Ctrl+C to stop");

        let duration = if args.duration > 0 {
            Some(std::time::Duration::from_secs(args.duration))
        } else {
            None
        };

        controller.run(duration).await
    };

    controller.shutdown().await;

    let metrics = controller.get_metrics();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        info!("Simulation complete");
        info!("Elections: {}", metrics.elections);
        info!("Commands: {} ({} rejected)", metrics.commands, metrics.commands_rejected);
        info!(
            "Assertions: {} passed, {} failed",
            metrics.assertions_passed, metrics.assertions_failed
        );
        info!("Split runs: {}", metrics.split_runs);
    }

    outcome?;
    if !metrics.is_clean() {
        error!("Simulation found lifecycle violations");
        anyhow::bail!("simulation was not clean");
    }

    Ok(())
}
