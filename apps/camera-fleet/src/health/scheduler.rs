use super::fanout::{BatchReport, FanOutEngine};
use crate::camera::CameraStore;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Cadence and limits of the periodic health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_concurrent_probes: usize,
    /// Subtract the pass duration from the idle wait
    pub compensate_pass_duration: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            max_concurrent_probes: 5,
            compensate_pass_duration: false,
        }
    }
}

/// Summary of the most recent completed pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total: usize,
    pub online: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_seconds: f64,
    pub timeout_seconds: f64,
    pub max_concurrent_probes: usize,
    pub passes_completed: u64,
    pub last_pass: Option<PassSummary>,
}

#[derive(Debug, Default)]
struct PassHistory {
    passes_completed: u64,
    last_pass: Option<PassSummary>,
}

impl PassHistory {
    fn record(&mut self, started_at: DateTime<Utc>, started: Instant, report: &BatchReport) {
        let summary = PassSummary {
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            total: report.total,
            online: report.online(),
        };
        debug!(
            "Health check pass finished: {}/{} online in {}ms",
            summary.online, summary.total, summary.duration_ms
        );
        self.passes_completed += 1;
        self.last_pass = Some(summary);
    }
}

struct RunningLoop {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Re-runs fan-out probing over every stored camera on a fixed cadence.
///
/// At most one loop task exists at a time. Once [`stop`](Self::stop) returns
/// no further pass will start.
pub struct HealthScheduler {
    engine: FanOutEngine,
    store: Arc<RwLock<CameraStore>>,
    settings: parking_lot::Mutex<SchedulerSettings>,
    history: Arc<parking_lot::Mutex<PassHistory>>,
    running: parking_lot::Mutex<Option<RunningLoop>>,
}

impl HealthScheduler {
    pub fn new(
        engine: FanOutEngine,
        store: Arc<RwLock<CameraStore>>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            engine,
            store,
            settings: parking_lot::Mutex::new(settings),
            history: Arc::new(parking_lot::Mutex::new(PassHistory::default())),
            running: parking_lot::Mutex::new(None),
        }
    }

    pub fn settings(&self) -> SchedulerSettings {
        *self.settings.lock()
    }

    /// Start the loop. Returns false without side effects if it is already
    /// running.
    pub fn start(&self, interval: Duration, timeout: Duration) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("Health check loop already running");
            return false;
        }

        let settings = {
            let mut settings = self.settings.lock();
            settings.interval = interval;
            settings.timeout = timeout;
            *settings
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.engine.clone(),
            self.store.clone(),
            settings,
            self.history.clone(),
            cancel.clone(),
        ));

        info!(
            "Health check started (interval {:?}, timeout {:?}, max {} concurrent probes)",
            settings.interval, settings.timeout, settings.max_concurrent_probes
        );
        *running = Some(RunningLoop { handle, cancel });
        true
    }

    /// Cancel the loop and wait for it to finish. Returns false if it was not
    /// running.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return false;
        };

        running.cancel.cancel();
        let was_running = !running.handle.is_finished();
        if let Err(e) = running.handle.await {
            error!("Health check loop ended abnormally: {}", e);
        }

        info!("Health check stopped");
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Run one pass now using the configured timeout unless overridden.
    /// Leaves the loop untouched.
    pub async fn run_once(&self, timeout: Option<Duration>) -> BatchReport {
        let settings = self.settings();
        let timeout = timeout.unwrap_or(settings.timeout);

        let started_at = Utc::now();
        let started = Instant::now();
        let report =
            run_pass(&self.engine, &self.store, timeout, settings.max_concurrent_probes).await;
        self.history.lock().record(started_at, started, &report);
        report
    }

    pub fn status(&self) -> SchedulerStatus {
        let settings = self.settings();
        let history = self.history.lock();
        SchedulerStatus {
            running: self.is_running(),
            interval_seconds: settings.interval.as_secs_f64(),
            timeout_seconds: settings.timeout.as_secs_f64(),
            max_concurrent_probes: settings.max_concurrent_probes,
            passes_completed: history.passes_completed,
            last_pass: history.last_pass.clone(),
        }
    }
}

impl Drop for HealthScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

async fn run_pass(
    engine: &FanOutEngine,
    store: &RwLock<CameraStore>,
    timeout: Duration,
    concurrency_limit: usize,
) -> BatchReport {
    let cameras = store.read().await.list();
    engine.probe_many(cameras, timeout, concurrency_limit).await
}

async fn run_loop(
    engine: FanOutEngine,
    store: Arc<RwLock<CameraStore>>,
    settings: SchedulerSettings,
    history: Arc<parking_lot::Mutex<PassHistory>>,
    cancel: CancellationToken,
) {
    loop {
        let started_at = Utc::now();
        let started = Instant::now();

        let pass = run_pass(
            &engine,
            &store,
            settings.timeout,
            settings.max_concurrent_probes,
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = AssertUnwindSafe(pass).catch_unwind() => match result {
                Ok(report) => history.lock().record(started_at, started, &report),
                Err(_) => error!("Health check pass panicked, continuing"),
            }
        }

        let wait = if settings.compensate_pass_duration {
            settings.interval.saturating_sub(started.elapsed())
        } else {
            settings.interval
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    debug!("Health check loop exited");
}
