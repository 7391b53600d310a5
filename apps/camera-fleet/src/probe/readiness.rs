use super::{ProbeError, StreamProbe};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PathStatus {
    #[serde(default)]
    ready: bool,
}

/// Stream readiness through a MediaMTX-style control API.
///
/// Queries `{base_url}/v3/paths/get/{stream_key}`; a 200 response whose body
/// reports `ready: true` means a publisher is live on that path. Any other
/// status counts as not ready.
#[derive(Debug, Clone)]
pub struct MediaMtxReadinessProbe {
    client: reqwest::Client,
    base_url: String,
}

impl MediaMtxReadinessProbe {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn path_url(&self, stream_key: &str) -> String {
        format!("{}/v3/paths/get/{}", self.base_url, stream_key)
    }
}

#[async_trait]
impl StreamProbe for MediaMtxReadinessProbe {
    async fn probe_stream(&self, stream_key: &str, timeout: Duration) -> Result<bool, ProbeError> {
        let url = self.path_url(stream_key);
        let response = self.client.get(&url).timeout(timeout).send().await?;

        if response.status() != reqwest::StatusCode::OK {
            debug!("Readiness query for {} returned {}", stream_key, response.status());
            return Ok(false);
        }

        let status: PathStatus = response.json().await?;
        Ok(status.ready)
    }
}
