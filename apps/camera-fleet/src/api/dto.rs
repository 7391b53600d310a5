use crate::registry::SimulatedCamera;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProbeRequest {
    #[validate(range(min = 0.5, max = 60.0))]
    pub timeout_seconds: Option<f64>,
}

impl ProbeRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs_f64)
    }
}

/// Reachability check of an arbitrary URL
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PingCheckRequest {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,

    #[validate(range(min = 0.5, max = 60.0))]
    pub timeout_seconds: Option<f64>,
}

impl PingCheckRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs_f64)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct HealthCheckStartRequest {
    #[validate(range(min = 1.0, max = 86400.0))]
    pub interval_seconds: Option<f64>,

    #[validate(range(min = 0.5, max = 60.0))]
    pub timeout_seconds: Option<f64>,
}

impl HealthCheckStartRequest {
    pub fn interval(&self) -> Option<Duration> {
        self.interval_seconds.map(Duration::from_secs_f64)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs_f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartStreamRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub source_path: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopStreamRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStreamRequest {
    pub source_path: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulateBatchRequest {
    pub cameras: Vec<SimulatedCamera>,
    pub sources: Vec<PathBuf>,
}

/// Optional override of the camera database path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabasePathRequest {
    pub path: Option<PathBuf>,
}
