//! Main entry point for the usage-relay CLI

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use usage_event_relay::cli::Cli;
use usage_event_relay::logging::init_logging;
use usage_event_relay::metrics::init_metrics;
use usage_event_relay::relay::{RunReport, RunStatus};
use usage_event_relay::shutdown::ShutdownCoordinator;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            // Logging may not be up yet
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the run completed without any failure
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let identifier = cli.run_identifier().context("invalid --identifier")?;

    // Held until the end of the run so buffered file lines are flushed
    let _log_guard = init_logging(cli.log_level, &cli.checkpoint_dir, &identifier)
        .context("failed to initialize logging")?;

    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr).context("failed to start metrics exporter")?;
    }

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - finishing current step...");
                shutdown.request_shutdown();
            }
        }
    });

    match cli.execute(shutdown).await {
        Ok(report) => {
            log_report(&report);
            Ok(report.is_success())
        }
        Err(e) => {
            error!("Relay run failed: {}", e);
            info!("Total records processed: 0");
            Ok(false)
        }
    }
}

fn log_report(report: &RunReport) {
    let checkpoint = report
        .checkpoint
        .map(|cp| cp.to_string())
        .unwrap_or_else(|| "none".to_string());

    match &report.status {
        RunStatus::Completed if report.poll_interruption.is_none() => info!(
            records = report.records_delivered,
            chunks = report.chunks_delivered,
            checkpoint = %checkpoint,
            "Relay run completed"
        ),
        RunStatus::Completed => warn!(
            records = report.records_delivered,
            checkpoint = %checkpoint,
            "Relay run delivered a partial job query"
        ),
        RunStatus::DeliveryFailed(e) => error!(
            records = report.records_delivered,
            checkpoint = %checkpoint,
            error = %e,
            "Relay run stopped on delivery failure"
        ),
        RunStatus::Cancelled => warn!(
            records = report.records_delivered,
            checkpoint = %checkpoint,
            "Relay run cancelled"
        ),
    }
}
