// REST API over the camera registry

use crate::registry::CameraRegistry;
use actix_web::{web, App, HttpServer};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

pub mod dto;
pub mod error;
pub mod routes;

pub use error::ApiError;

/// Shared handler state.
///
/// The HTTP server runs on its own actix system thread while the registry's
/// background tasks live on the main tokio runtime, so handlers hand registry
/// work to `runtime`.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CameraRegistry>,
    pub runtime: tokio::runtime::Handle,
}

impl AppState {
    pub fn new(registry: Arc<CameraRegistry>, runtime: tokio::runtime::Handle) -> Self {
        Self { registry, runtime }
    }

    /// Run `f` against the registry on the main runtime and wait for it
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(Arc<CameraRegistry>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let registry = self.registry.clone();
        Ok(self.runtime.spawn(f(registry)).await?)
    }
}

pub async fn start_server(
    bind: String,
    registry: Arc<CameraRegistry>,
    runtime: tokio::runtime::Handle,
) -> std::io::Result<()> {
    let state = web::Data::new(AppState::new(registry, runtime));

    info!("Starting API server on {}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(routes::json_config())
            .configure(routes::configure_routes)
    })
    .bind(bind)?
    .run()
    .await
}
