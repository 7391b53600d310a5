use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub health: HealthCheckConfig,
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Camera database file
    pub cameras_path: PathBuf,
    /// Supervised stream process table
    pub streams_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Start the periodic health check at boot
    pub autostart: bool,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    pub max_concurrent_probes: usize,
    /// Subtract the pass duration from the idle wait between passes
    pub compensate_pass_duration: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub encoder_binary: String,
    pub default_host: String,
    pub default_port: u16,
    pub stop_grace_period_seconds: u64,
    pub engine_check_timeout_ms: u64,
    /// Base URL of the streaming server's readiness API
    pub readiness_api_url: String,
    /// Host viewers use to reach the streaming server's playback endpoints
    pub playback_host: String,
    /// Port serving FLV and HLS playback
    pub playback_http_port: u16,
    pub playback_webrtc_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Camera Fleet".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = PathBuf::from("/var/lib/camera-fleet");
        Self {
            cameras_path: base.join("cameras.json"),
            streams_path: base.join("streams.json"),
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            autostart: true,
            interval_seconds: 30,
            timeout_seconds: 5,
            max_concurrent_probes: 5,
            compensate_pass_duration: false,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            encoder_binary: "ffmpeg".to_string(),
            default_host: "127.0.0.1".to_string(),
            default_port: 8554,
            stop_grace_period_seconds: 5,
            engine_check_timeout_ms: 1000,
            readiness_api_url: "http://127.0.0.1:9997".to_string(),
            playback_host: "127.0.0.1".to_string(),
            playback_http_port: 8080,
            playback_webrtc_port: 8889,
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl StreamingConfig {
    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.stop_grace_period_seconds)
    }

    pub fn engine_check_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_check_timeout_ms)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.api.enabled && self.api.port == 0 {
            return Err("API port must be greater than 0".to_string());
        }

        if self.health.interval_seconds == 0 {
            return Err("health interval_seconds must be greater than 0".to_string());
        }
        if self.health.timeout_seconds == 0 {
            return Err("health timeout_seconds must be greater than 0".to_string());
        }
        if self.health.max_concurrent_probes == 0 {
            return Err("max_concurrent_probes must be greater than 0".to_string());
        }

        if self.streaming.default_port == 0 {
            return Err("streaming default_port must be greater than 0".to_string());
        }
        if self.streaming.playback_http_port == 0 || self.streaming.playback_webrtc_port == 0 {
            return Err("streaming playback ports must be greater than 0".to_string());
        }
        if self.streaming.encoder_binary.trim().is_empty() {
            return Err("streaming encoder_binary cannot be empty".to_string());
        }
        if url::Url::parse(&self.streaming.readiness_api_url).is_err() {
            return Err(format!(
                "streaming readiness_api_url is not a valid URL: {}",
                self.streaming.readiness_api_url
            ));
        }

        Ok(())
    }

    pub async fn from_file(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(crate::FleetError::ConfigError(format!(
                "Configuration file not found: {:?}",
                path
            )));
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::FleetError::ConfigError(format!(
                "Failed to read configuration file {:?}: {}",
                path, e
            ))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            crate::FleetError::ConfigError(format!(
                "Failed to parse configuration file {:?}: {}",
                path, e
            ))
        })?;

        config.validate().map_err(crate::FleetError::ConfigError)?;
        Ok(config)
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    config_path: PathBuf,
}

impl ConfigManager {
    pub async fn new(config_path: PathBuf) -> crate::Result<Self> {
        let config = if config_path.exists() {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(&config_path).await.map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })?
        } else {
            warn!("Configuration file {:?} not found, using defaults", config_path);
            Config::default()
        };

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    pub async fn get(&self) -> Config {
        self.config.read().await.clone()
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Save current configuration to a file
    pub async fn save_snapshot(&self, path: &Path) -> crate::Result<()> {
        let config = self.config.read().await;
        let toml_string = toml::to_string_pretty(&*config).map_err(|e| {
            crate::FleetError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = format!(
            "# Configuration snapshot created at {}\n\n{}",
            chrono::Utc::now().to_rfc3339(),
            toml_string
        );

        tokio::fs::write(path, content).await?;
        info!("Configuration snapshot saved to {:?}", path);
        Ok(())
    }
}
