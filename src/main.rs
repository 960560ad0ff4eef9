//! EcoStream Monitor - Main Entry Point
//!
//! Headless companion runner: polls the fleet backend and logs snapshot
//! updates until interrupted. Also exposes a one-shot diagnose command.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use ecostream_lib::{
    logging,
    poller::LivePoller,
    storage::Storage,
    sync::FleetBackend,
    AppState,
};

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_POLL_MS: u64 = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    info!("EcoStream Monitor starting...");

    let api_base_url =
        std::env::var("ECOSTREAM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let state = AppState::new(Storage::on_disk(), &api_base_url);

    // One-shot diagnostic flow: `ecostream-monitor diagnose <unit_id> <question>`
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("diagnose") {
        anyhow::ensure!(args.len() >= 3, "usage: diagnose <unit_id> <question>");

        let diagnosis = state.api.diagnose(&args[1], &args[2..].join(" ")).await?;
        if let Some(mode) = diagnosis.mode {
            println!("mode: {mode}");
        }
        for step in diagnosis.steps {
            println!("- {step}");
        }
        return Ok(());
    }

    match state.sessions.current() {
        Some(session) => info!("Signed in as {} <{}>", session.name, session.email),
        None => info!("No stored session"),
    }

    let poll_ms = std::env::var("ECOSTREAM_POLL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_POLL_MS);

    let backend: Arc<dyn FleetBackend> = state.api.clone();
    let poller = LivePoller::spawn(backend, Duration::from_millis(poll_ms));
    let mut snapshots = poller.subscribe();

    info!("Polling {} every {}ms", api_base_url, poll_ms);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                match &snapshot.error {
                    Some(e) => warn!("Backend unavailable: {}", e),
                    None => {
                        let anomalies = snapshot.fleet.iter().filter(|u| u.anomaly).count();
                        info!(
                            "{} units ({} anomalous), {} alerts",
                            snapshot.fleet.len(),
                            anomalies,
                            snapshot.alerts.len()
                        );
                    }
                }
            }
        }
    }

    poller.shutdown().await;
    Ok(())
}
