//! Supervision of external encoder processes that republish a media file as
//! a live stream.
//!
//! The table of running streams is persisted after every change. There is no
//! reaper task: [`StreamSupervisor::list`] prunes entries whose process has
//! already exited.

use crate::camera::store::write_atomically;
use crate::{FleetError, Result};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub mod process;

pub use process::{ProcessExit, ProcessHandle, ProcessSpawner, TokioProcessSpawner};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub encoder_binary: String,
    pub stop_grace_period: Duration,
    pub engine_check_timeout: Duration,
    /// Where the process table is written, if anywhere
    pub table_path: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            encoder_binary: "ffmpeg".to_string(),
            stop_grace_period: Duration::from_secs(5),
            engine_check_timeout: Duration::from_secs(1),
            table_path: None,
        }
    }
}

/// One supervised encoder process
pub struct StreamProcessEntry {
    pub name: String,
    pub source_path: PathBuf,
    pub publish_uri: String,
    pub host: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
    handle: Box<dyn ProcessHandle>,
}

impl StreamProcessEntry {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            name: self.name.clone(),
            source_path: self.source_path.clone(),
            publish_uri: self.publish_uri.clone(),
            host: self.host.clone(),
            port: self.port,
            started_at: self.started_at,
            pid: self.handle.pid(),
            status: "running".to_string(),
        }
    }
}

/// Public view of a running stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    pub source_path: PathBuf,
    pub publish_uri: String,
    pub host: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
    pub pid: Option<u32>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOutcome {
    pub name: String,
    /// The process ignored the graceful request and was killed
    pub forced: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableRecord {
    name: String,
    source_path: PathBuf,
    publish_uri: String,
    host: String,
    port: u16,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProcessTable {
    streams: Vec<TableRecord>,
}

/// `rtsp://{host}:{port}/live/{name}`
pub fn publish_uri(host: &str, port: u16, name: &str) -> String {
    format!("rtsp://{}:{}/live/{}", host, port, name)
}

/// Viewer-facing URLs of a published stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackUrls {
    pub publish_uri: String,
    pub flv_url: String,
    pub hls_url: String,
    pub webrtc_url: String,
}

/// Playback URLs of the stream published at `publish_uri`. The stream path
/// (`live/{name}`) is kept, only the host and ports change.
pub fn playback_urls(publish_uri: &str, host: &str, http_port: u16, webrtc_port: u16) -> PlaybackUrls {
    let path = crate::probe::stream_key(publish_uri);
    PlaybackUrls {
        publish_uri: publish_uri.to_string(),
        flv_url: format!("http://{}:{}/{}.flv", host, http_port, path),
        hls_url: format!("http://{}:{}/{}/hls.m3u8", host, http_port, path),
        webrtc_url: format!("http://{}:{}/{}/whep", host, webrtc_port, path),
    }
}

/// Encoder arguments that loop `source_path` forever and publish it to
/// `publish_uri` without re-encoding
pub fn encoder_args(source_path: &Path, publish_uri: &str) -> Vec<String> {
    vec![
        "-re".to_string(),
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        source_path.to_string_lossy().into_owned(),
        "-c".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "rtsp".to_string(),
        publish_uri.to_string(),
    ]
}

fn process_table(entries: &BTreeMap<String, StreamProcessEntry>) -> ProcessTable {
    ProcessTable {
        streams: entries
            .values()
            .map(|entry| TableRecord {
                name: entry.name.clone(),
                source_path: entry.source_path.clone(),
                publish_uri: entry.publish_uri.clone(),
                host: entry.host.clone(),
                port: entry.port,
                started_at: entry.started_at,
            })
            .collect(),
    }
}

pub struct StreamSupervisor {
    config: SupervisorConfig,
    spawner: Arc<dyn ProcessSpawner>,
    entries: Mutex<BTreeMap<String, StreamProcessEntry>>,
}

impl StreamSupervisor {
    pub fn new(config: SupervisorConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            config,
            spawner,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Start publishing `source_path` as stream `name` on `host:port`.
    ///
    /// An entry whose process already exited does not block a restart under
    /// the same name.
    pub async fn start(
        &self,
        name: &str,
        source_path: &Path,
        host: &str,
        port: u16,
    ) -> Result<String> {
        if name.trim().is_empty() {
            return Err(FleetError::InvalidInput("stream name cannot be empty".to_string()));
        }

        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(name) {
            match entry.handle.poll() {
                Ok(None) => return Err(FleetError::AlreadyRunning(name.to_string())),
                Ok(Some(exit)) => {
                    info!("Stream {} had exited ({:?}), restarting", name, exit.code);
                    entries.remove(name);
                }
                Err(e) => {
                    warn!("Could not poll stream {}: {}", name, e);
                    return Err(FleetError::AlreadyRunning(name.to_string()));
                }
            }
        }

        if !tokio::fs::try_exists(source_path).await.unwrap_or(false) {
            return Err(FleetError::SourceNotFound(
                source_path.display().to_string(),
            ));
        }

        self.check_engine(host, port).await?;

        let publish_uri = publish_uri(host, port, name);
        let args = encoder_args(source_path, &publish_uri);
        let handle = self
            .spawner
            .spawn(&self.config.encoder_binary, &args)
            .map_err(|e| {
                FleetError::ProcessFailure(format!(
                    "Failed to spawn {}: {}",
                    self.config.encoder_binary, e
                ))
            })?;

        info!(
            "Started stream {} from {:?} at {} (pid {:?})",
            name,
            source_path,
            publish_uri,
            handle.pid()
        );

        entries.insert(
            name.to_string(),
            StreamProcessEntry {
                name: name.to_string(),
                source_path: source_path.to_path_buf(),
                publish_uri: publish_uri.clone(),
                host: host.to_string(),
                port,
                started_at: Utc::now(),
                handle,
            },
        );
        let table = process_table(&entries);
        self.persist(table).await;

        Ok(publish_uri)
    }

    /// Stop stream `name`, killing it if it outlives the grace period.
    ///
    /// The entry leaves the table before the process is signalled, so other
    /// streams stay reachable while this one winds down.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome> {
        let mut entry = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .remove(name)
                .ok_or_else(|| FleetError::NotRunning(name.to_string()))?;
            let table = process_table(&entries);
            self.persist(table).await;
            entry
        };

        self.terminate(&mut entry).await
    }

    /// Stop every stream concurrently. Failures are logged and skipped.
    pub async fn stop_all(&self) -> Vec<StopOutcome> {
        let names: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        let stops = names.iter().map(|name| async move {
            let result = self.stop(name).await;
            if let Err(e) = &result {
                error!("Failed to stop stream {}: {}", name, e);
            }
            result.ok()
        });

        join_all(stops).await.into_iter().flatten().collect()
    }

    /// Running streams. Entries whose process exited are dropped.
    pub async fn list(&self) -> Vec<StreamInfo> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();

        entries.retain(|name, entry| match entry.handle.poll() {
            Ok(None) => true,
            Ok(Some(exit)) => {
                warn!("Stream {} exited with {:?}, pruning", name, exit.code);
                false
            }
            Err(e) => {
                warn!("Could not poll stream {}: {}, pruning", name, e);
                false
            }
        });

        if entries.len() != before {
            let table = process_table(&entries);
            self.persist(table).await;
        }

        entries.values().map(StreamProcessEntry::info).collect()
    }

    pub async fn get(&self, name: &str) -> Option<StreamInfo> {
        self.entries.lock().await.get(name).map(StreamProcessEntry::info)
    }

    async fn terminate(&self, entry: &mut StreamProcessEntry) -> Result<StopOutcome> {
        let name = entry.name.clone();

        if let Ok(Some(exit)) = entry.handle.poll() {
            info!("Stream {} had already exited ({:?})", name, exit.code);
            return Ok(StopOutcome {
                name: name.clone(),
                forced: false,
                message: format!("Stream {} had already exited", name),
            });
        }

        if let Err(e) = entry.handle.terminate() {
            warn!("Failed to signal stream {}: {}", name, e);
        }

        match entry.handle.wait_timeout(self.config.stop_grace_period).await {
            Ok(Some(_)) => {
                info!("Stopped stream {}", name);
                Ok(StopOutcome {
                    name: name.clone(),
                    forced: false,
                    message: format!("Stream {} stopped", name),
                })
            }
            Ok(None) | Err(_) => {
                warn!(
                    "Stream {} did not exit within {:?}, killing",
                    name, self.config.stop_grace_period
                );
                entry.handle.kill().await.map_err(|e| {
                    FleetError::ProcessFailure(format!("Failed to kill stream {}: {}", name, e))
                })?;
                Ok(StopOutcome {
                    name: name.clone(),
                    forced: true,
                    message: format!("Stream {} stopped (forced)", name),
                })
            }
        }
    }

    /// Check that something accepts connections on the publish endpoint.
    /// Without it the encoder starts fine and then streams into nothing.
    async fn check_engine(&self, host: &str, port: u16) -> Result<()> {
        let connect = TcpStream::connect((host, port));
        match tokio::time::timeout(self.config.engine_check_timeout, connect).await {
            Ok(Ok(_)) => {
                debug!("Streaming engine reachable at {}:{}", host, port);
                Ok(())
            }
            Ok(Err(e)) => Err(FleetError::EngineUnavailable(format!(
                "{}:{}: {}",
                host, port, e
            ))),
            Err(_) => Err(FleetError::EngineUnavailable(format!(
                "{}:{}: connection timed out",
                host, port
            ))),
        }
    }

    async fn persist(&self, table: ProcessTable) {
        let Some(path) = &self.config.table_path else {
            return;
        };

        let written = match serde_json::to_vec_pretty(&table) {
            Ok(content) => write_atomically(path, &content).await,
            Err(e) => Err(FleetError::PersistenceFailure(e.to_string())),
        };
        if let Err(e) = written {
            error!("Failed to persist stream table to {:?}: {}", path, e);
        }
    }
}
