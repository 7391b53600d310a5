use crate::camera::{SharedCamera, STATUS_UNKNOWN};
use crate::probe::{panic_message, ProbeDispatcher, ProbeOutcome};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Per-camera entry of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraProbeReport {
    pub camera_id: String,
    pub camera_name: String,
    pub online: bool,
    pub status_code: i32,
    pub outcome: Option<ProbeOutcome>,
    pub error: Option<String>,
}

impl CameraProbeReport {
    fn failure(camera_id: String, camera_name: String, error: String) -> Self {
        Self {
            camera_id,
            camera_name,
            online: false,
            status_code: STATUS_UNKNOWN,
            outcome: None,
            error: Some(error),
        }
    }
}

/// Aggregated result of probing a set of cameras.
///
/// `results` is in completion order; use [`BatchReport::by_camera_id`] for
/// lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub results: Vec<CameraProbeReport>,
}

impl BatchReport {
    pub fn by_camera_id(&self) -> HashMap<&str, &CameraProbeReport> {
        self.results
            .iter()
            .map(|report| (report.camera_id.as_str(), report))
            .collect()
    }

    pub fn online(&self) -> usize {
        self.results.iter().filter(|report| report.online).count()
    }
}

/// Runs the probe dispatcher over many cameras with a cap on in-flight probes
#[derive(Clone)]
pub struct FanOutEngine {
    dispatcher: ProbeDispatcher,
}

impl FanOutEngine {
    pub fn new(dispatcher: ProbeDispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &ProbeDispatcher {
        &self.dispatcher
    }

    /// Probe every camera, at most `concurrency_limit` at a time.
    ///
    /// A camera id appearing more than once is probed once. A probe that
    /// panics or whose task is lost still yields a failed entry for its
    /// camera, and never stops its siblings. A limit of zero is treated as one.
    pub async fn probe_many(
        &self,
        cameras: Vec<SharedCamera>,
        timeout: Duration,
        concurrency_limit: usize,
    ) -> BatchReport {
        if cameras.is_empty() {
            return BatchReport::default();
        }

        let gate = Arc::new(Semaphore::new(concurrency_limit.max(1)));
        let mut tasks = JoinSet::new();
        let mut identities = HashMap::new();
        let mut seen = HashSet::new();

        for camera in cameras {
            let (camera_id, camera_name) = {
                let camera = camera.read();
                (camera.id().to_string(), camera.name.clone())
            };
            if !seen.insert(camera_id.clone()) {
                debug!("Skipping duplicate camera {} in batch", camera_id);
                continue;
            }

            let gate = gate.clone();
            let dispatcher = self.dispatcher.clone();
            let task_identity = (camera_id.clone(), camera_name.clone());

            let handle = tasks.spawn(async move {
                let _permit = match gate.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return CameraProbeReport::failure(camera_id, camera_name, e.to_string())
                    }
                };

                match AssertUnwindSafe(dispatcher.probe_with_status(&camera, timeout))
                    .catch_unwind()
                    .await
                {
                    Ok((outcome, status_code)) => CameraProbeReport {
                        camera_id,
                        camera_name,
                        online: outcome.ok,
                        status_code,
                        error: None,
                        outcome: Some(outcome),
                    },
                    Err(panic) => {
                        let message = format!("Panic: {}", panic_message(panic.as_ref()));
                        warn!("Probe of camera {} panicked: {}", camera_id, message);
                        CameraProbeReport::failure(camera_id, camera_name, message)
                    }
                }
            });
            identities.insert(handle.id(), task_identity);
        }

        let total = identities.len();
        let mut results = Vec::with_capacity(total);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => results.push(report),
                Err(e) => {
                    let (camera_id, camera_name) = identities
                        .remove(&e.id())
                        .unwrap_or_else(|| (String::new(), String::new()));
                    warn!("Probe task for camera {} failed: {}", camera_id, e);
                    results.push(CameraProbeReport::failure(
                        camera_id,
                        camera_name,
                        format!("JoinError: {}", e),
                    ));
                }
            }
        }

        BatchReport { total, results }
    }
}
