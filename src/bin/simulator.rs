//! `dig-simulator`: load-generation and fixture-recording harness, decoupled
//! from the production service binary.
//!
//! Grounded on `examples/original_source/simulator/run.py`'s argument parser
//! and dispatch. The `auth-groups` scenario and symbolic `--token-source`
//! resolution from that file depend on a live MCP auth-token minting
//! endpoint this crate does not expose (see DESIGN.md); `run` here covers
//! the `load` scenario plus `record` mode, which is everything reachable
//! without that endpoint.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dig_scraper::simulator::{
    build_simulation_report, load_mix_file, parse_duration_to_seconds, FixtureStore, Mode, Recorder, SimulationConfig,
    Simulator,
};

#[derive(Parser)]
#[command(name = "dig-simulator", about = "Load generator and fixture recorder for dig-scraper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a load simulation against live sites or recorded fixtures.
    Run {
        /// live or fixture (record is its own subcommand).
        #[arg(long, default_value = "live")]
        mode: String,
        #[arg(long)]
        consumers: Option<usize>,
        #[arg(long, default_value_t = 1.0)]
        rate: f64,
        #[arg(long)]
        total_requests: Option<u64>,
        /// Duration string like `30s`, `5m`, `1h`.
        #[arg(long)]
        duration: Option<String>,
        #[arg(long)]
        mcp_url: Option<String>,
        #[arg(long)]
        mix_file: Option<String>,
        #[arg(long, default_value = "sites.json")]
        sites_file: String,
        #[arg(long)]
        target_url: Option<String>,
        #[arg(long, default_value_t = 30.0)]
        timeout_seconds: f64,
        /// Write the summary report JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fetch the sites in `--sites-file`, obfuscate, and write fixtures.
    Record {
        #[arg(long, default_value = "sites.json")]
        sites_file: String,
        #[arg(long, default_value = "simulator-fixtures")]
        output_dir: String,
        #[arg(long, default_value_t = 30.0)]
        timeout_seconds: f64,
    },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { mode, consumers, rate, total_requests, duration, mcp_url, mix_file, sites_file, target_url, timeout_seconds, output } => {
            run_load(mode, consumers, rate, total_requests, duration, mcp_url, mix_file, sites_file, target_url, timeout_seconds, output).await
        }
        Command::Record { sites_file, output_dir, timeout_seconds } => run_record(sites_file, output_dir, timeout_seconds).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_load(
    mode: String,
    consumers: Option<usize>,
    rate: f64,
    total_requests: Option<u64>,
    duration: Option<String>,
    mcp_url: Option<String>,
    mix_file: Option<String>,
    sites_file: String,
    target_url: Option<String>,
    timeout_seconds: f64,
    output: Option<PathBuf>,
) -> std::process::ExitCode {
    let Some(mode) = Mode::parse(&mode) else {
        tracing::error!(event = "sim.invalid_mode", provided = %mode, "mode must be live or fixture for run");
        return std::process::ExitCode::from(2);
    };

    if rate <= 0.0 {
        tracing::error!(event = "sim.invalid_rate", provided = rate, recovery = "provide --rate > 0", "invalid rate");
        return std::process::ExitCode::from(2);
    }

    let duration_seconds = match duration.as_deref().map(parse_duration_to_seconds) {
        Some(Ok(seconds)) => Some(seconds),
        Some(Err(err)) => {
            tracing::error!(event = "sim.invalid_duration", error = %err, "invalid duration");
            return std::process::ExitCode::from(2);
        }
        None => None,
    };

    if total_requests.is_none() && duration_seconds.is_none() {
        tracing::error!(
            event = "sim.missing_stop_condition",
            recovery = "provide --total-requests or --duration",
            "no stop condition given"
        );
        return std::process::ExitCode::from(2);
    }

    let mix = match &mix_file {
        Some(path) => match load_mix_file(path) {
            Ok(mix) => Some(mix),
            Err(err) => {
                tracing::error!(event = "sim.invalid_mix_file", path = %path, error = %err, "failed to load mix file");
                return std::process::ExitCode::from(2);
            }
        },
        None => None,
    };

    if mix.is_none() && consumers.is_none() {
        tracing::error!(event = "sim.missing_consumers", recovery = "provide --consumers or --mix-file", "no consumers given");
        return std::process::ExitCode::from(2);
    }

    let config = SimulationConfig {
        mode,
        consumers: consumers.unwrap_or(0),
        rate_per_consumer_per_sec: rate,
        total_requests,
        duration_seconds,
        mcp_url,
        sites_file,
        target_url,
        timeout_seconds,
    };

    let simulator = Simulator::new(config.clone(), mix);
    let result = match simulator.run().await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(event = "sim.run_failed", error = %err, "simulation run failed");
            return std::process::ExitCode::from(1);
        }
    };

    tracing::info!(
        event = "sim.run_summary",
        request_count = result.request_count,
        error_count = result.error_count,
        throughput_rps = result.throughput_rps(),
        "simulation run finished"
    );

    if let Some(output) = output {
        let report = build_simulation_report(&config, &result);
        if let Some(parent) = output.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::error!(event = "sim.output_write_failed", error = %err, "failed to create output directory");
                return std::process::ExitCode::from(1);
            }
        }
        let payload = serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string());
        if let Err(err) = std::fs::write(&output, payload) {
            tracing::error!(event = "sim.output_write_failed", path = %output.display(), error = %err, "failed to write report");
            return std::process::ExitCode::from(1);
        }
    }

    std::process::ExitCode::SUCCESS
}

async fn run_record(sites_file: String, output_dir: String, timeout_seconds: f64) -> std::process::ExitCode {
    let provider = match dig_scraper::simulator::provider::SiteProvider::load_from_file(&sites_file) {
        Ok(provider) => provider,
        Err(err) => {
            tracing::error!(event = "sim.record_no_urls", sites_file = %sites_file, error = %err, "failed to load sites file");
            return std::process::ExitCode::from(2);
        }
    };

    let urls = provider.urls();
    let store = FixtureStore::new(&output_dir);
    let recorder = match Recorder::new(store, std::time::Duration::from_secs_f64(timeout_seconds)) {
        Ok(recorder) => recorder,
        Err(err) => {
            tracing::error!(event = "sim.record_client_build_failed", error = %err, "failed to build recorder HTTP client");
            return std::process::ExitCode::from(1);
        }
    };

    let result = match recorder.record_urls(&urls).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(event = "sim.record_failed", error = %err, "recording run failed");
            return std::process::ExitCode::from(1);
        }
    };

    tracing::info!(
        event = "sim.record_summary",
        sites_attempted = result.sites_attempted,
        sites_recorded = result.sites_recorded,
        sites_failed = result.sites_failed,
        total_bytes = result.total_bytes,
        output_dir = %output_dir,
        "recording run finished"
    );

    if result.sites_recorded == 0 {
        tracing::error!(event = "sim.record_all_failed", recovery = "check network connectivity and sites.json URLs", "all sites failed to record");
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::SUCCESS
}
