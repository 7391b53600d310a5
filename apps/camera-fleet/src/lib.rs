pub mod api;
pub mod camera;
pub mod config;
pub mod health;
pub mod probe;
pub mod registry;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types
pub use camera::{Camera, CameraStore, NewCamera};
pub use config::{Config, ConfigManager};
pub use registry::CameraRegistry;

// Common error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Stream already running: {0}")]
    AlreadyRunning(String),

    #[error("Stream not running: {0}")]
    NotRunning(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Streaming engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Process failure: {0}")]
    ProcessFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;
