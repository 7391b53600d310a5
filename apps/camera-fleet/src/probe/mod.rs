//! Health probing of a single camera.
//!
//! A probe picks a capability from the scheme of the camera's `source_uri`:
//! `http`/`https` go to [`HttpProbe`], everything else (including URIs with
//! an unknown or missing scheme) goes to [`StreamProbe`]. Capability errors and
//! panics are folded into a failed [`ProbeOutcome`] and never reach the caller.

use crate::camera::{SharedCamera, STATUS_UNKNOWN};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

pub mod http;
pub mod readiness;

pub use http::ReqwestHttpProbe;
pub use readiness::MediaMtxReadinessProbe;

/// Protocol family used for a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeScheme {
    Http,
    Stream,
}

impl ProbeScheme {
    pub fn for_uri(uri: &str) -> Self {
        match url::Url::parse(uri) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => ProbeScheme::Http,
            _ => ProbeScheme::Stream,
        }
    }
}

/// Result of one health check. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub scheme: ProbeScheme,
    pub target: String,
    pub checked_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub detail: String,
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Protocol(String),

    /// The capability panicked; holds the panic payload text
    #[error("{0}")]
    Panic(String),
}

impl ProbeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "TimeoutError",
            ProbeError::Transport(_) => "TransportError",
            ProbeError::Protocol(_) => "ProtocolError",
            ProbeError::Panic(_) => "Panic",
        }
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ProbeError::Protocol(err.to_string())
        } else {
            ProbeError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpProbeResponse {
    pub ok: bool,
    pub status_code: u16,
    pub elapsed: Duration,
}

/// HTTP reachability capability. Implementations apply `timeout` themselves.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn probe_http(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<HttpProbeResponse, ProbeError>;
}

/// Stream readiness capability. Implementations apply `timeout` themselves.
#[async_trait]
pub trait StreamProbe: Send + Sync {
    async fn probe_stream(
        &self,
        stream_key: &str,
        timeout: Duration,
    ) -> std::result::Result<bool, ProbeError>;
}

/// Derive the readiness key of a stream URI, e.g.
/// `rtsp://host:8554/live/cam1` becomes `live/cam1`.
pub fn stream_key(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(parsed) if parsed.has_host() => parsed.path().trim_start_matches('/').to_string(),
        _ => uri.trim_start_matches('/').to_string(),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown payload".to_string()
    }
}

/// ok, status code, detail, extra fields, elapsed
type CapabilityAnswer = (bool, i32, String, BTreeMap<String, serde_json::Value>, Duration);

#[derive(Clone)]
pub struct ProbeDispatcher {
    http: Arc<dyn HttpProbe>,
    stream: Arc<dyn StreamProbe>,
}

impl ProbeDispatcher {
    pub fn new(http: Arc<dyn HttpProbe>, stream: Arc<dyn StreamProbe>) -> Self {
        Self { http, stream }
    }

    /// Probe one camera and record the outcome on it.
    ///
    /// `reachable`, `last_status_code` and `last_probe` are written under a
    /// single write lock once the capability has answered.
    pub async fn probe(&self, camera: &SharedCamera, timeout: Duration) -> ProbeOutcome {
        self.probe_with_status(camera, timeout).await.0
    }

    /// Same as [`probe`](Self::probe), also returning the normalized status
    /// code that was recorded on the camera.
    pub async fn probe_with_status(
        &self,
        camera: &SharedCamera,
        timeout: Duration,
    ) -> (ProbeOutcome, i32) {
        let (camera_id, source_uri) = {
            let camera = camera.read();
            (camera.id().to_string(), camera.source_uri.clone())
        };

        let (outcome, status_code) = match source_uri.filter(|uri| !uri.trim().is_empty()) {
            Some(uri) => self.probe_uri(&uri, timeout).await,
            None => (
                ProbeOutcome {
                    ok: false,
                    scheme: ProbeScheme::Stream,
                    target: String::new(),
                    checked_at: Utc::now(),
                    elapsed_ms: 0,
                    detail: "InvalidInput: camera has no source_uri".to_string(),
                    extra: BTreeMap::new(),
                },
                STATUS_UNKNOWN,
            ),
        };

        debug!(
            "Probed camera {}: ok={} status={} ({})",
            camera_id, outcome.ok, status_code, outcome.detail
        );

        camera.write().record_probe(outcome.clone(), status_code);
        (outcome, status_code)
    }

    /// Probe an arbitrary URI without touching any camera.
    pub async fn probe_target(&self, uri: &str, timeout: Duration) -> ProbeOutcome {
        let (outcome, status_code) = self.probe_uri(uri, timeout).await;
        debug!(
            "Probed {}: ok={} status={} ({})",
            uri, outcome.ok, status_code, outcome.detail
        );
        outcome
    }

    async fn probe_uri(&self, uri: &str, timeout: Duration) -> (ProbeOutcome, i32) {
        let scheme = ProbeScheme::for_uri(uri);
        let checked_at = Utc::now();
        let started = Instant::now();

        let result = AssertUnwindSafe(self.call_capability(scheme, uri, timeout, started))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                warn!("Probe capability for {} panicked: {}", uri, message);
                Err(ProbeError::Panic(message))
            });

        match result {
            Ok((ok, status_code, detail, extra, elapsed)) => (
                ProbeOutcome {
                    ok,
                    scheme,
                    target: uri.to_string(),
                    checked_at,
                    elapsed_ms: elapsed.as_millis() as u64,
                    detail,
                    extra,
                },
                status_code,
            ),
            Err(err) => (
                ProbeOutcome {
                    ok: false,
                    scheme,
                    target: uri.to_string(),
                    checked_at,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    detail: format!("{}: {}", err.kind(), err),
                    extra: BTreeMap::new(),
                },
                STATUS_UNKNOWN,
            ),
        }
    }

    async fn call_capability(
        &self,
        scheme: ProbeScheme,
        uri: &str,
        timeout: Duration,
        started: Instant,
    ) -> std::result::Result<CapabilityAnswer, ProbeError> {
        match scheme {
            ProbeScheme::Http => self.http.probe_http(uri, timeout).await.map(|response| {
                let mut extra = BTreeMap::new();
                extra.insert("status_code".to_string(), response.status_code.into());
                (
                    response.ok,
                    i32::from(response.status_code),
                    format!("status_code={}", response.status_code),
                    extra,
                    response.elapsed,
                )
            }),
            ProbeScheme::Stream => {
                let key = stream_key(uri);
                self.stream.probe_stream(&key, timeout).await.map(|ready| {
                    let return_code: i32 = if ready { 0 } else { 1 };
                    let mut extra = BTreeMap::new();
                    extra.insert("stream_key".to_string(), key.into());
                    extra.insert("returncode".to_string(), return_code.into());
                    let detail = if ready {
                        "stream ready".to_string()
                    } else {
                        "stream not ready".to_string()
                    };
                    (ready, return_code, detail, extra, started.elapsed())
                })
            }
        }
    }
}
