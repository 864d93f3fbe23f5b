//! Noctua - sleep-schedule aggregation pass
//!
//! Runs exactly one aggregation pass over the shared presence store and
//! exits. Exit status: 0 full success, 2 partial (some users failed, see
//! log), 1 fatal (storage unreachable, nothing committed).

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use noctua_aggregator::{logging, AppContext};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init_from_env();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            error!(error = format!("{err:#}"), "aggregation pass aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    info!(version = env!("CARGO_PKG_VERSION"), "noctua aggregator starting");

    let config = noctua_infra::config::load().context("loading configuration")?;
    let context = AppContext::new(config).context("opening the shared store")?;

    // Captured once so every user sees the same "now".
    let reference = Utc::now();
    let started = Instant::now();
    let summary =
        context.aggregation.run_pass(reference).await.context("running aggregation pass")?;

    let outcome = summary.outcome();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        exit_code = outcome.exit_code(),
        "pass complete"
    );

    // The exit codes fit in u8 by contract (0, 1, 2).
    Ok(ExitCode::from(outcome.exit_code() as u8))
}
