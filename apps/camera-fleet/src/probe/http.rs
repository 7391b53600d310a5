use super::{HttpProbe, HttpProbeResponse, ProbeError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

/// HTTP reachability over reqwest.
///
/// Sends HEAD first and retries with GET when HEAD fails outright, since some
/// devices do not implement HEAD. Redirects are followed.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpProbe {
    client: reqwest::Client,
}

impl ReqwestHttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpProbe for ReqwestHttpProbe {
    async fn probe_http(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<HttpProbeResponse, ProbeError> {
        let started = Instant::now();

        let response = match self.client.head(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!("HEAD {} failed ({}), retrying with GET", url, err);
                let remaining = timeout.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(ProbeError::from(err));
                }
                self.client.get(url).timeout(remaining).send().await?
            }
        };

        let status = response.status();
        Ok(HttpProbeResponse {
            ok: status.is_success() || status.is_redirection(),
            status_code: status.as_u16(),
            elapsed: started.elapsed(),
        })
    }
}
