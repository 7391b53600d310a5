//! The camera registry: one object wiring the camera store, probing, the
//! periodic health check and stream supervision together.
//!
//! Built once at startup and shared by handle. Every operation either returns
//! plain data or a [`FleetError`] for the caller to translate.

use crate::camera::{Camera, CameraStore, NewCamera};
use crate::config::Config;
use crate::health::{BatchReport, FanOutEngine, HealthScheduler, SchedulerSettings, SchedulerStatus};
use crate::probe::{
    HttpProbe, MediaMtxReadinessProbe, ProbeDispatcher, ProbeOutcome, ReqwestHttpProbe,
    StreamProbe,
};
use crate::supervisor::{
    playback_urls, PlaybackUrls, ProcessSpawner, StopOutcome, StreamInfo, StreamSupervisor,
    SupervisorConfig, TokioProcessSpawner,
};
use crate::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraLocation {
    pub camera_id: String,
    pub camera_name: String,
    pub geo_location: (f64, f64),
}

/// Identity of a camera to be simulated from a media file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedCamera {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub network_address: String,
    #[serde(default)]
    pub geo_location: (f64, f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateCamera {
    #[serde(flatten)]
    pub camera: SimulatedCamera,
    pub source_path: PathBuf,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub camera_id: String,
    pub success: bool,
    pub publish_uri: Option<String>,
    pub error: Option<String>,
}

pub struct CameraRegistry {
    store: Arc<RwLock<CameraStore>>,
    engine: FanOutEngine,
    scheduler: HealthScheduler,
    supervisor: StreamSupervisor,
    cameras_path: PathBuf,
    probe_timeout: Duration,
    max_concurrent_probes: usize,
    default_host: String,
    default_port: u16,
    playback_host: String,
    playback_http_port: u16,
    playback_webrtc_port: u16,
}

impl CameraRegistry {
    /// Registry backed by the real HTTP, readiness and process capabilities
    pub fn from_config(config: &Config) -> Self {
        Self::with_capabilities(
            config,
            Arc::new(ReqwestHttpProbe::new()),
            Arc::new(MediaMtxReadinessProbe::new(
                config.streaming.readiness_api_url.clone(),
            )),
            Arc::new(TokioProcessSpawner),
        )
    }

    pub fn with_capabilities(
        config: &Config,
        http: Arc<dyn HttpProbe>,
        stream: Arc<dyn StreamProbe>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Self {
        let store = Arc::new(RwLock::new(CameraStore::new()));
        let engine = FanOutEngine::new(ProbeDispatcher::new(http, stream));

        let scheduler = HealthScheduler::new(
            engine.clone(),
            store.clone(),
            SchedulerSettings {
                interval: config.health.interval(),
                timeout: config.health.timeout(),
                max_concurrent_probes: config.health.max_concurrent_probes,
                compensate_pass_duration: config.health.compensate_pass_duration,
            },
        );

        let supervisor = StreamSupervisor::new(
            SupervisorConfig {
                encoder_binary: config.streaming.encoder_binary.clone(),
                stop_grace_period: config.streaming.stop_grace_period(),
                engine_check_timeout: config.streaming.engine_check_timeout(),
                table_path: Some(config.storage.streams_path.clone()),
            },
            spawner,
        );

        Self {
            store,
            engine,
            scheduler,
            supervisor,
            cameras_path: config.storage.cameras_path.clone(),
            probe_timeout: config.health.timeout(),
            max_concurrent_probes: config.health.max_concurrent_probes,
            default_host: config.streaming.default_host.clone(),
            default_port: config.streaming.default_port,
            playback_host: config.streaming.playback_host.clone(),
            playback_http_port: config.streaming.playback_http_port,
            playback_webrtc_port: config.streaming.playback_webrtc_port,
        }
    }

    // Cameras

    pub async fn add_camera(&self, input: NewCamera) -> Result<Camera> {
        let camera = input.into_camera()?;
        let mut store = self.store.write().await;
        if store.has(camera.id()) {
            return Err(FleetError::AlreadyExists(camera.id().to_string()));
        }

        info!("Adding camera: {}", camera.id());
        let view = camera.clone();
        store.add(camera);
        Ok(view)
    }

    /// Returns false if no such camera existed
    pub async fn remove_camera(&self, id: &str) -> bool {
        let removed = self.store.write().await.remove(id);
        if removed {
            info!("Removed camera: {}", id);
        }
        removed
    }

    pub async fn get_camera(&self, id: &str) -> Result<Camera> {
        let camera = self
            .store
            .read()
            .await
            .get(id)
            .ok_or_else(|| FleetError::NotFound(format!("camera {}", id)))?;
        let view = camera.read().clone();
        Ok(view)
    }

    pub async fn list_cameras(&self) -> Vec<Camera> {
        self.store.read().await.snapshot()
    }

    pub async fn has_camera(&self, id: &str) -> bool {
        self.store.read().await.has(id)
    }

    pub async fn stats(&self) -> FleetStats {
        let cameras = self.list_cameras().await;
        let online = cameras.iter().filter(|c| c.reachable()).count();
        FleetStats {
            total: cameras.len(),
            online,
            offline: cameras.len() - online,
            db_path: self.cameras_path.clone(),
        }
    }

    pub async fn locations(&self) -> Vec<CameraLocation> {
        self.list_cameras()
            .await
            .into_iter()
            .map(|camera| CameraLocation {
                camera_id: camera.id().to_string(),
                camera_name: camera.name.clone(),
                geo_location: camera.geo_location,
            })
            .collect()
    }

    // Probing

    pub async fn probe_camera(&self, id: &str, timeout: Option<Duration>) -> Result<ProbeOutcome> {
        let camera = self
            .store
            .read()
            .await
            .get(id)
            .ok_or_else(|| FleetError::NotFound(format!("camera {}", id)))?;
        let timeout = timeout.unwrap_or(self.probe_timeout);
        Ok(self.engine.dispatcher().probe(&camera, timeout).await)
    }

    /// Check reachability of a URI that need not belong to any camera
    pub async fn probe_target(&self, uri: &str, timeout: Option<Duration>) -> Result<ProbeOutcome> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(FleetError::InvalidInput("url cannot be empty".to_string()));
        }
        let timeout = timeout.unwrap_or(self.probe_timeout);
        Ok(self.engine.dispatcher().probe_target(uri, timeout).await)
    }

    pub async fn probe_all(&self, timeout: Option<Duration>) -> BatchReport {
        let cameras = self.store.read().await.list();
        let timeout = timeout.unwrap_or(self.probe_timeout);
        self.engine
            .probe_many(cameras, timeout, self.max_concurrent_probes)
            .await
    }

    // Periodic health check

    /// Returns false if the health check was already running
    pub fn start_health_check(&self, interval: Option<Duration>, timeout: Option<Duration>) -> bool {
        let settings = self.scheduler.settings();
        self.scheduler.start(
            interval.unwrap_or(settings.interval),
            timeout.unwrap_or(settings.timeout),
        )
    }

    /// Returns false if the health check was not running
    pub async fn stop_health_check(&self) -> bool {
        self.scheduler.stop().await
    }

    pub fn health_check_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub async fn run_health_check_once(&self, timeout: Option<Duration>) -> BatchReport {
        self.scheduler.run_once(timeout).await
    }

    // Streams

    pub async fn start_stream(
        &self,
        name: &str,
        source_path: &Path,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<String> {
        self.supervisor
            .start(
                name,
                source_path,
                host.unwrap_or(&self.default_host),
                port.unwrap_or(self.default_port),
            )
            .await
    }

    pub async fn stop_stream(&self, name: &str) -> Result<StopOutcome> {
        self.supervisor.stop(name).await
    }

    pub async fn list_streams(&self) -> Vec<StreamInfo> {
        self.supervisor.list().await
    }

    /// Publish `source_path` under the camera's id and point the camera at it
    pub async fn start_camera_stream(
        &self,
        camera_id: &str,
        source_path: &Path,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<String> {
        let camera = self
            .store
            .read()
            .await
            .get(camera_id)
            .ok_or_else(|| FleetError::NotFound(format!("camera {}", camera_id)))?;

        let publish_uri = self.start_stream(camera_id, source_path, host, port).await?;

        let mut guard = camera.write();
        guard.source_uri = Some(publish_uri.clone());
        guard.publish_uri = Some(publish_uri.clone());
        guard.local_media_path = Some(source_path.to_path_buf());
        Ok(publish_uri)
    }

    /// Stop the camera's stream and detach its ingress locator
    pub async fn stop_camera_stream(&self, camera_id: &str) -> Result<StopOutcome> {
        let camera = self
            .store
            .read()
            .await
            .get(camera_id)
            .ok_or_else(|| FleetError::NotFound(format!("camera {}", camera_id)))?;

        let outcome = self.supervisor.stop(camera_id).await?;
        camera.write().source_uri = None;
        Ok(outcome)
    }

    /// FLV, HLS and WebRTC playback URLs of the camera's published stream
    pub async fn playback_urls(&self, camera_id: &str) -> Result<PlaybackUrls> {
        let camera = self
            .store
            .read()
            .await
            .get(camera_id)
            .ok_or_else(|| FleetError::NotFound(format!("camera {}", camera_id)))?;

        let publish_uri = camera
            .read()
            .publish_uri
            .clone()
            .ok_or_else(|| FleetError::NotRunning(format!("camera {} has no published stream", camera_id)))?;

        Ok(playback_urls(
            &publish_uri,
            &self.playback_host,
            self.playback_http_port,
            self.playback_webrtc_port,
        ))
    }

    /// Start a stream named `{name}_{id}` and register a camera reading it
    pub async fn simulate_camera(&self, request: SimulateCamera) -> Result<Camera> {
        let SimulateCamera {
            camera,
            source_path,
            host,
            port,
        } = request;

        if self.has_camera(&camera.id).await {
            return Err(FleetError::AlreadyExists(camera.id));
        }

        let stream_name = format!("{}_{}", camera.name, camera.id);
        let publish_uri = self
            .start_stream(&stream_name, &source_path, host.as_deref(), port)
            .await?;

        let input = NewCamera {
            id: camera.id,
            name: camera.name,
            network_address: camera.network_address,
            geo_location: camera.geo_location,
            source_uri: Some(publish_uri.clone()),
            publish_uri: Some(publish_uri),
            local_media_path: Some(source_path),
        };

        match self.add_camera(input).await {
            Ok(camera) => Ok(camera),
            Err(e) => {
                warn!("Rolling back stream {}: {}", stream_name, e);
                if let Err(stop_err) = self.supervisor.stop(&stream_name).await {
                    error!("Failed to roll back stream {}: {}", stream_name, stop_err);
                }
                Err(e)
            }
        }
    }

    /// Simulate `cameras[i]` from `sources[i]`. Each item succeeds or fails
    /// on its own.
    pub async fn simulate_batch(
        &self,
        cameras: Vec<SimulatedCamera>,
        sources: Vec<PathBuf>,
    ) -> Result<Vec<SimulationResult>> {
        if cameras.len() != sources.len() {
            return Err(FleetError::InvalidInput(format!(
                "{} cameras but {} sources",
                cameras.len(),
                sources.len()
            )));
        }

        let mut results = Vec::with_capacity(cameras.len());
        for (camera, source_path) in cameras.into_iter().zip(sources) {
            let camera_id = camera.id.clone();
            let request = SimulateCamera {
                camera,
                source_path,
                host: None,
                port: None,
            };
            results.push(match self.simulate_camera(request).await {
                Ok(camera) => SimulationResult {
                    camera_id,
                    success: true,
                    publish_uri: camera.publish_uri,
                    error: None,
                },
                Err(e) => SimulationResult {
                    camera_id,
                    success: false,
                    publish_uri: None,
                    error: Some(e.to_string()),
                },
            });
        }
        Ok(results)
    }

    // Persistence

    pub fn cameras_path(&self) -> &Path {
        &self.cameras_path
    }

    /// Replace the cameras with the configured database
    pub async fn load(&self) -> Result<usize> {
        self.load_from(&self.cameras_path).await
    }

    pub async fn load_from(&self, path: &Path) -> Result<usize> {
        self.store.write().await.load(path).await
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&self.cameras_path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        self.store.read().await.save(path).await?;
        info!("Saved cameras to {:?}", path);
        Ok(())
    }

    /// Stop the health check and every stream, then save the cameras
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down camera registry");
        self.stop_health_check().await;

        for outcome in self.supervisor.stop_all().await {
            info!("{}", outcome.message);
        }

        self.save().await
    }
}
