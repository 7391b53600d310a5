use crate::probe::ProbeOutcome;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use validator::{Validate, ValidationError};

pub mod store;

pub use store::CameraStore;

/// Status code of a camera that has never been probed
pub const STATUS_UNKNOWN: i32 = -1;

/// Camera handle shared between the store and in-flight probes
pub type SharedCamera = Arc<parking_lot::RwLock<Camera>>;

/// A tracked video source and its cached reachability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    id: String,
    pub name: String,
    pub network_address: String,
    pub geo_location: (f64, f64),
    /// Ingress locator read by probes and consumers
    pub source_uri: Option<String>,
    /// Egress locator exposed to consumers
    pub publish_uri: Option<String>,
    /// Media file backing a simulated camera
    pub local_media_path: Option<PathBuf>,
    #[serde(default)]
    reachable: bool,
    #[serde(default = "unknown_status")]
    last_status_code: i32,
    #[serde(default)]
    last_probe: Option<ProbeOutcome>,
}

fn unknown_status() -> i32 {
    STATUS_UNKNOWN
}

impl Camera {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            network_address: String::new(),
            geo_location: (0.0, 0.0),
            source_uri: None,
            publish_uri: None,
            local_media_path: None,
            reachable: false,
            last_status_code: STATUS_UNKNOWN,
            last_probe: None,
        }
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn reachable(&self) -> bool {
        self.reachable
    }

    pub fn last_status_code(&self) -> i32 {
        self.last_status_code
    }

    pub fn last_probe(&self) -> Option<&ProbeOutcome> {
        self.last_probe.as_ref()
    }

    /// Replace the cached probe state in one step.
    ///
    /// Only the probe dispatcher writes these fields, always while holding the
    /// camera's write lock.
    pub(crate) fn record_probe(&mut self, outcome: ProbeOutcome, status_code: i32) {
        self.reachable = outcome.ok;
        self.last_status_code = status_code;
        self.last_probe = Some(outcome);
    }
}

/// Validated input for registering a camera
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct NewCamera {
    #[validate(length(min = 1, max = 128, message = "camera id cannot be empty"))]
    pub id: String,

    #[validate(length(min = 1, max = 256, message = "camera name cannot be empty"))]
    pub name: String,

    pub network_address: String,

    #[validate(custom(function = "validate_geo_location"))]
    pub geo_location: (f64, f64),

    #[validate(custom(function = "validate_uri"))]
    pub source_uri: Option<String>,

    #[validate(custom(function = "validate_uri"))]
    pub publish_uri: Option<String>,

    #[serde(default)]
    pub local_media_path: Option<PathBuf>,
}

fn validate_geo_location(location: &(f64, f64)) -> Result<(), ValidationError> {
    let (lat, lon) = *location;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError::new("geo_location_out_of_range"));
    }
    Ok(())
}

fn validate_uri(uri: &str) -> Result<(), ValidationError> {
    if url::Url::parse(uri).is_err() {
        return Err(ValidationError::new("invalid_uri"));
    }
    Ok(())
}

impl NewCamera {
    pub fn into_camera(self) -> crate::Result<Camera> {
        self.validate()
            .map_err(|e| crate::FleetError::InvalidInput(e.to_string()))?;

        let mut camera = Camera::new(self.id, self.name);
        camera.network_address = self.network_address;
        camera.geo_location = self.geo_location;
        camera.source_uri = self.source_uri;
        camera.publish_uri = self.publish_uri;
        camera.local_media_path = self.local_media_path;
        Ok(camera)
    }
}
