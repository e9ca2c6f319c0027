//! Orchestration: wires the feed and compute workers to the shared state,
//! holds the observation window open, then requests a cooperative stop and
//! reports the final counters.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::book::OrderBook;
use crate::compute::InversionWorker;
use crate::config::AppConfig;
use crate::error::{BenchError, Result};
use crate::feed::OkxFeed;
use crate::state::{RunReport, RunState};

/// Run the full pipeline for the configured observation window.
///
/// Feed errors and compute errors are contained inside their workers; the
/// only failures surfaced here are workers that cannot be started or that
/// fail to observe the stop flag within the grace period.
pub async fn run(config: AppConfig) -> Result<RunReport> {
    let state = Arc::new(RunState::new());
    let book = Arc::new(Mutex::new(OrderBook::new()));

    let feed = OkxFeed::new(
        config.okx.clone(),
        config.run.inst_id.clone(),
        Arc::clone(&book),
        Arc::clone(&state),
    );
    let feed_handle = tokio::spawn(async move { feed.run().await });

    let worker = InversionWorker::new(
        Arc::clone(&book),
        Arc::clone(&state),
        config.run.matrix_dim,
        config.run.tolerance,
    );
    let compute_handle = tokio::task::spawn_blocking(move || worker.run());

    info!(
        window_secs = config.run.window_secs,
        dim = config.run.matrix_dim,
        "observation window open"
    );
    tokio::time::sleep(Duration::from_secs(config.run.window_secs)).await;

    state.request_stop();
    info!("stop requested, waiting for workers");

    let grace = Duration::from_secs(config.run.grace_secs);

    match timeout(grace, compute_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(BenchError::Internal(format!(
                "compute worker panicked: {e}"
            )))
        }
        Err(_) => {
            return Err(BenchError::Internal(format!(
                "compute worker did not observe the stop flag within {grace:?}"
            )))
        }
    }

    match timeout(grace, feed_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!("feed ended with error: {e}"),
        Ok(Err(e)) => {
            return Err(BenchError::Internal(format!("feed worker panicked: {e}")))
        }
        Err(_) => {
            return Err(BenchError::Internal(format!(
                "feed worker did not observe the stop flag within {grace:?}"
            )))
        }
    }

    let report = state.report();
    info!(
        messages = report.messages_received,
        inversions = report.inversions_completed,
        "run complete"
    );
    Ok(report)
}
