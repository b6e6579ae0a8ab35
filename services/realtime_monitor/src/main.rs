//! Realtime monitor service - runs the strategy engine against a health
//! endpoint and logs every decision it makes.
//!
//! Usage:
//!   realtime-monitor --config config/realtime.toml
//!   realtime-monitor --config config/realtime.toml --json-logs

use adaptive_realtime::{EngineConfig, EngineOptions, PerformanceMetrics, StrategyTransition};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "realtime-monitor")]
#[command(about = "Adaptive realtime strategy engine")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/realtime.toml")]
    config: PathBuf,

    /// Log level when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Seconds between strategy summaries
    #[arg(long, default_value_t = 30)]
    report_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting realtime monitor");
    info!("Configuration: {}", args.config.display());

    let config = EngineConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    info!(
        features = config.features.len(),
        probe_url = %config.network.probe_url,
        "Loaded engine configuration"
    );

    let options = EngineOptions::new(config)
        .on_transition(log_transition)
        .on_metrics_update(log_metrics);
    let engine =
        adaptive_realtime::initialize(options).context("Failed to start strategy engine")?;

    let reporter = {
        let engine = engine.clone();
        let period = Duration::from_secs(args.report_interval.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if engine.is_closed() {
                    break;
                }
                let strategies = engine.current_strategies();
                info!(
                    quality = %engine.network_quality(),
                    strategies = %serde_json::to_string(&strategies).unwrap_or_default(),
                    "Strategy summary"
                );
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal");

    reporter.abort();
    adaptive_realtime::dispose();
    info!("Realtime monitor stopped");

    Ok(())
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn log_transition(transition: &StrategyTransition) {
    if transition.success {
        info!(
            feature = %transition.feature,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            duration_ms = transition.duration_ms(),
            "Strategy transition"
        );
    } else {
        warn!(
            feature = %transition.feature,
            from = %transition.from,
            to = %transition.to,
            reason = %transition.reason,
            error = transition.error.as_deref().unwrap_or("unknown"),
            "Strategy transition failed"
        );
    }
}

fn log_metrics(metrics: &PerformanceMetrics) {
    debug!(
        connections = metrics.active_connections,
        message_rate = metrics.message_rate,
        memory_mb = metrics.memory_usage_mb,
        latency_ms = metrics.average_latency_ms,
        error_rate = metrics.error_rate,
        cpu = metrics.cpu_usage,
        "Performance tick"
    );
}
