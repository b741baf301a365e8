//! Standalone size-pruning loop.
//!
//! Grounded on `examples/original_source/app/housekeeper.py`'s `main()`:
//! read the interval/target from the environment, prune once per cycle,
//! log the outcome, sleep. Unlike the service binary, this process exits
//! non-zero on an unrecoverable first-cycle failure so an operator's
//! process supervisor notices; later cycles only log.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use dig_scraper::session::SessionStore;
use dig_scraper::{housekeeper, DigConfig};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = DigConfig::from_env();
    let store = match SessionStore::new(&config.storage_dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(event = "housekeeper.startup_failed", error = %e, "failed to open storage root");
            return std::process::ExitCode::from(1);
        }
    };

    let interval = Duration::from_secs(config.housekeeping_interval_mins * 60);
    let mut first_cycle = true;

    loop {
        let outcome = housekeeper::prune_size(
            &store,
            config.max_storage_mb as f64,
            None,
            config.housekeeper_lock_stale_seconds,
        );
        tracing::info!(event = "housekeeper.cycle", outcome = ?outcome, exit_code = outcome.exit_code(), "prune cycle complete");

        if first_cycle && outcome.exit_code() == 2 {
            tracing::error!(event = "housekeeper.initial_lock_busy", "another process holds the prune lock on startup");
            return std::process::ExitCode::from(2);
        }
        first_cycle = false;

        tokio::time::sleep(interval).await;
    }
}
