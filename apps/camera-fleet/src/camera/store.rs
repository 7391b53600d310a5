use super::{Camera, SharedCamera};
use crate::{FleetError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// On-disk layout of the camera database
#[derive(Debug, Serialize, Deserialize)]
struct CameraDatabase {
    saved_at: DateTime<Utc>,
    cameras: Vec<Camera>,
}

/// In-memory camera collection keyed by id, listed in insertion order
#[derive(Debug, Default)]
pub struct CameraStore {
    cameras: HashMap<String, SharedCamera>,
    order: Vec<String>,
}

impl CameraStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a camera by id
    pub fn add(&mut self, camera: Camera) -> SharedCamera {
        let id = camera.id().to_string();
        let shared = Arc::new(parking_lot::RwLock::new(camera));
        if self.cameras.insert(id.clone(), shared.clone()).is_none() {
            self.order.push(id);
        }
        shared
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if self.cameras.remove(id).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != id);
        true
    }

    pub fn get(&self, id: &str) -> Option<SharedCamera> {
        self.cameras.get(id).cloned()
    }

    pub fn list(&self) -> Vec<SharedCamera> {
        self.order
            .iter()
            .filter_map(|id| self.cameras.get(id).cloned())
            .collect()
    }

    /// Point-in-time copies of every camera
    pub fn snapshot(&self) -> Vec<Camera> {
        self.list().iter().map(|camera| camera.read().clone()).collect()
    }

    pub fn has(&self, id: &str) -> bool {
        self.cameras.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.cameras.len()
    }

    pub fn clear(&mut self) {
        self.cameras.clear();
        self.order.clear();
    }

    /// Replace the whole store with the cameras saved at `path`.
    ///
    /// A missing file loads nothing and leaves the store untouched. The file is
    /// parsed completely before the store is replaced, so a corrupt database
    /// never empties it.
    pub async fn load(&mut self, path: &Path) -> Result<usize> {
        if !path.exists() {
            info!("Camera database {:?} not found, nothing loaded", path);
            return Ok(0);
        }

        let content = tokio::fs::read(path).await.map_err(|e| {
            FleetError::PersistenceFailure(format!("Failed to read {:?}: {}", path, e))
        })?;
        let database: CameraDatabase = serde_json::from_slice(&content).map_err(|e| {
            FleetError::PersistenceFailure(format!("Failed to parse {:?}: {}", path, e))
        })?;

        self.clear();
        for camera in database.cameras {
            self.add(camera);
        }

        info!("Loaded {} cameras from {:?}", self.count(), path);
        Ok(self.count())
    }

    /// Write every camera to `path`, creating parent directories as needed
    pub async fn save(&self, path: &Path) -> Result<()> {
        let database = CameraDatabase {
            saved_at: Utc::now(),
            cameras: self.snapshot(),
        };
        let content = serde_json::to_vec_pretty(&database).map_err(|e| {
            FleetError::PersistenceFailure(format!("Failed to serialize cameras: {}", e))
        })?;

        write_atomically(path, &content).await?;
        debug!("Saved {} cameras to {:?}", database.cameras.len(), path);
        Ok(())
    }
}

/// Write through a sibling temp file and rename over the target
pub(crate) async fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let persistence = |e: std::io::Error| {
        FleetError::PersistenceFailure(format!("Failed to write {:?}: {}", path, e))
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(persistence)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, content).await.map_err(persistence)?;
    tokio::fs::rename(&tmp, path).await.map_err(persistence)?;
    Ok(())
}
