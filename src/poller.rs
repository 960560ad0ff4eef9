//! Live Poller Module
//!
//! Bridges the fetch layer and the telemetry normalizer into a
//! continuously-updated snapshot, tolerating backend unavailability.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::sync::{ApiError, FleetBackend};
use crate::telemetry::{normalize_alerts, normalize_fleet_units, Alert, FleetUnit};

/// Lower bound on the tick interval, bounding request rate.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(350);

/// Latest derived state visible to consumers.
///
/// A failed cycle keeps the previous fleet and alerts in place and only
/// sets `error`, so the dashboard never flickers back to empty.
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    pub fleet: Vec<FleetUnit>,
    pub alerts: Vec<Alert>,
    /// True until the first cycle completes, success or failure.
    pub loading: bool,
    pub error: Option<ApiError>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl Default for LiveSnapshot {
    fn default() -> Self {
        Self {
            fleet: Vec::new(),
            alerts: Vec::new(),
            loading: true,
            error: None,
            last_updated_at: None,
        }
    }
}

/// Handle to a running poll loop.
pub struct LivePoller {
    snapshot_rx: watch::Receiver<LiveSnapshot>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LivePoller {
    /// Start polling. The first cycle runs immediately; later cycles run
    /// on a fixed interval clamped to [`MIN_POLL_INTERVAL`].
    pub fn spawn(backend: Arc<dyn FleetBackend>, every: Duration) -> Self {
        let every = every.max(MIN_POLL_INTERVAL);
        let (snapshot_tx, snapshot_rx) = watch::channel(LiveSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(poll_loop(backend, every, snapshot_tx, shutdown_rx));

        Self {
            snapshot_rx,
            shutdown_tx,
            task,
        }
    }

    /// Watch snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot> {
        self.snapshot_rx.clone()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> LiveSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Cancel the loop and wait for it to wind down. Nothing is published
    /// after this returns, even if a fetch was in flight.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if self.task.await.is_err() {
            warn!("Live poller task panicked");
        }
    }
}

async fn poll_loop(
    backend: Arc<dyn FleetBackend>,
    every: Duration,
    snapshot_tx: watch::Sender<LiveSnapshot>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut timer = tokio::time::interval(every);
    // A cycle that outlives the interval delays the next tick instead of
    // overlapping it.
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Live poller started, polling every {:?}", every);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("Live poller shutting down");
                return;
            }
            _ = timer.tick() => {}
        }

        // Cancellation races the in-flight fetch: once the consumer stops
        // observing, a late resolution must not publish.
        let cycle = tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("Live poller cancelled mid-cycle");
                return;
            }
            cycle = run_cycle(backend.as_ref()) => cycle,
        };

        if *shutdown_rx.borrow() {
            return;
        }

        publish(&snapshot_tx, cycle);
    }
}

/// One tick: fetch fleet and alerts concurrently, normalize both.
/// Partial success is cycle failure.
async fn run_cycle(backend: &dyn FleetBackend) -> Result<(Vec<FleetUnit>, Vec<Alert>), ApiError> {
    let (fleet, alerts) = tokio::try_join!(backend.fetch_fleet(), backend.fetch_alerts())?;
    Ok((
        normalize_fleet_units(fleet.get("units")),
        normalize_alerts(alerts.get("alerts")),
    ))
}

fn publish(
    snapshot_tx: &watch::Sender<LiveSnapshot>,
    cycle: Result<(Vec<FleetUnit>, Vec<Alert>), ApiError>,
) {
    snapshot_tx.send_modify(|snapshot| match cycle {
        Ok((fleet, alerts)) => {
            debug!(
                units = fleet.len(),
                alerts = alerts.len(),
                "Publishing fleet snapshot"
            );
            snapshot.fleet = fleet;
            snapshot.alerts = alerts;
            snapshot.error = None;
            snapshot.last_updated_at = Some(Utc::now());
            snapshot.loading = false;
        }
        Err(e) => {
            warn!("Poll cycle failed: {}", e);
            snapshot.error = Some(e);
            snapshot.loading = false;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that replays queued per-call results.
    struct ScriptedBackend {
        fleet: Mutex<VecDeque<Result<Value, ApiError>>>,
        alerts: Mutex<VecDeque<Result<Value, ApiError>>>,
    }

    impl ScriptedBackend {
        fn new(
            fleet: Vec<Result<Value, ApiError>>,
            alerts: Vec<Result<Value, ApiError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                fleet: Mutex::new(fleet.into()),
                alerts: Mutex::new(alerts.into()),
            })
        }
    }

    #[async_trait]
    impl FleetBackend for ScriptedBackend {
        async fn fetch_fleet(&self) -> Result<Value, ApiError> {
            self.fleet
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("script exhausted".into())))
        }

        async fn fetch_alerts(&self) -> Result<Value, ApiError> {
            self.alerts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Network("script exhausted".into())))
        }
    }

    /// Backend whose fetches never resolve; reports when one starts.
    struct HangingBackend {
        started: tokio::sync::mpsc::Sender<()>,
    }

    #[async_trait]
    impl FleetBackend for HangingBackend {
        async fn fetch_fleet(&self) -> Result<Value, ApiError> {
            let _ = self.started.send(()).await;
            std::future::pending().await
        }

        async fn fetch_alerts(&self) -> Result<Value, ApiError> {
            std::future::pending().await
        }
    }

    fn fleet_payload(unit_id: &str) -> Value {
        json!({"units": [{"unit_id": unit_id, "motor_temp_c": 70.0}]})
    }

    fn alerts_payload() -> Value {
        json!({"alerts": [{"unit_id": "X1", "ts": "2024-01-01T00:00:00Z"}]})
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_runs_immediately() {
        let backend = ScriptedBackend::new(
            vec![Ok(fleet_payload("X1"))],
            vec![Ok(alerts_payload())],
        );

        let started = tokio::time::Instant::now();
        let poller = LivePoller::spawn(backend, Duration::from_secs(60));
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert!(started.elapsed() < MIN_POLL_INTERVAL);

        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.fleet.len(), 1);
        assert_eq!(snapshot.alerts.len(), 1);
        assert!(!snapshot.loading);
        assert!(snapshot.error.is_none());
        assert!(snapshot.last_updated_at.is_some());

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_clamped_to_minimum() {
        let backend = ScriptedBackend::new(
            vec![Ok(fleet_payload("X1")), Ok(fleet_payload("X1"))],
            vec![Ok(alerts_payload()), Ok(alerts_payload())],
        );

        let poller = LivePoller::spawn(backend, Duration::ZERO);
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        let first = tokio::time::Instant::now();
        rx.changed().await.unwrap();
        assert!(first.elapsed() >= MIN_POLL_INTERVAL);

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_cycle_keeps_snapshot_and_sets_error() {
        let backend = ScriptedBackend::new(
            vec![
                Ok(fleet_payload("X1")),
                Err(ApiError::Http { status: 503, body: None }),
                Ok(fleet_payload("X2")),
            ],
            vec![Ok(alerts_payload()), Ok(alerts_payload()), Ok(alerts_payload())],
        );

        let poller = LivePoller::spawn(backend, MIN_POLL_INTERVAL);
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().fleet[0].id, "X1");

        // Failed cycle: previous data retained, error published.
        rx.changed().await.unwrap();
        {
            let snapshot = rx.borrow();
            assert_eq!(snapshot.fleet[0].id, "X1");
            assert!(matches!(
                snapshot.error,
                Some(ApiError::Http { status: 503, .. })
            ));
            assert!(!snapshot.loading);
        }

        // Next successful cycle clears the error and republishes.
        rx.changed().await.unwrap();
        {
            let snapshot = rx.borrow();
            assert_eq!(snapshot.fleet[0].id, "X2");
            assert!(snapshot.error.is_none());
        }

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn partial_success_is_cycle_failure() {
        let backend = ScriptedBackend::new(
            vec![Ok(fleet_payload("X1"))],
            vec![Err(ApiError::Network("connection refused".into()))],
        );

        let poller = LivePoller::spawn(backend, Duration::from_secs(60));
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert!(snapshot.fleet.is_empty());
        assert!(matches!(snapshot.error, Some(ApiError::Network(_))));

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_shape_publishes_empty_lists() {
        let backend = ScriptedBackend::new(
            vec![Ok(json!({"units": "not a list"}))],
            vec![Ok(json!(null))],
        );

        let poller = LivePoller::spawn(backend, Duration::from_secs(60));
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert!(snapshot.fleet.is_empty());
        assert!(snapshot.alerts.is_empty());
        assert!(snapshot.error.is_none());

        poller.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_suppresses_in_flight_publication() {
        let (started_tx, mut started_rx) = tokio::sync::mpsc::channel(1);
        let backend = Arc::new(HangingBackend { started: started_tx });

        let poller = LivePoller::spawn(backend, Duration::from_secs(60));
        let rx = poller.subscribe();

        // The first cycle is in flight.
        started_rx.recv().await.unwrap();

        poller.shutdown().await;

        // No publication happened: the snapshot is still the initial one.
        let snapshot = rx.borrow().clone();
        assert!(snapshot.loading);
        assert!(snapshot.fleet.is_empty());
        assert!(snapshot.error.is_none());
        assert!(snapshot.last_updated_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn no_cycles_run_after_shutdown() {
        let backend = ScriptedBackend::new(
            vec![Ok(fleet_payload("X1"))],
            vec![Ok(alerts_payload())],
        );
        let counting = Arc::clone(&backend);

        let poller = LivePoller::spawn(backend, MIN_POLL_INTERVAL);
        let mut rx = poller.subscribe();
        rx.changed().await.unwrap();

        poller.shutdown().await;

        // The scripts were consumed exactly once.
        assert!(counting.fleet.lock().unwrap().is_empty());
        assert!(counting.alerts.lock().unwrap().is_empty());
        tokio::time::sleep(MIN_POLL_INTERVAL * 3).await;
        assert!(!rx.has_changed().unwrap_or(false));
    }
}
