use crate::api::dto::{
    CameraStreamRequest, DatabasePathRequest, HealthCheckStartRequest, PingCheckRequest,
    ProbeRequest, SimulateBatchRequest, StartStreamRequest, StopStreamRequest,
};
use crate::api::{ApiError, AppState};
use crate::camera::NewCamera;
use crate::registry::SimulateCamera;
use actix_web::{web, HttpResponse};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;
use validator::Validate;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health_check))
            .route("/device/ping/check", web::post().to(ping_check))
            .service(
                web::scope("/device/cameras")
                    .route("", web::get().to(list_cameras))
                    .route("", web::post().to(add_camera))
                    .route("/stats", web::get().to(camera_stats))
                    .route("/locations", web::get().to(camera_locations))
                    .route("/probe", web::post().to(probe_all))
                    .route("/healthcheck/start", web::post().to(start_health_check))
                    .route("/healthcheck/stop", web::post().to(stop_health_check))
                    .route("/healthcheck/status", web::get().to(health_check_status))
                    .route("/healthcheck/run_once", web::post().to(run_health_check_once))
                    .route("/load_from_db", web::post().to(load_from_db))
                    .route("/save_to_db", web::post().to(save_to_db))
                    .route("/{camera_id}", web::get().to(get_camera))
                    .route("/{camera_id}", web::delete().to(remove_camera))
                    .route("/{camera_id}/probe", web::post().to(probe_camera))
                    .route("/{camera_id}/stream/start", web::post().to(start_camera_stream))
                    .route("/{camera_id}/stream/stop", web::post().to(stop_camera_stream))
                    .route("/{camera_id}/stream/urls", web::get().to(camera_stream_urls)),
            )
            .service(
                web::scope("/stream")
                    .route("/start", web::post().to(start_stream))
                    .route("/stop", web::post().to(stop_stream))
                    .route("/list", web::get().to(list_streams))
                    .route("/simulate", web::post().to(simulate_camera))
                    .route("/simulate/batch", web::post().to(simulate_batch)),
            ),
    );
}

/// Malformed or incomplete JSON bodies are reported as 400
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

/// Decode a body that may be omitted. An empty body yields the default,
/// anything else must be valid JSON for `T`.
fn optional_json<T: DeserializeOwned + Default>(body: &web::Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

async fn health_check() -> Result<HttpResponse, ApiError> {
    debug!("Health check requested");
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "camera-fleet"
    })))
}

async fn list_cameras(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let cameras = state
        .run(|registry| async move { registry.list_cameras().await })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": cameras.len(),
        "cameras": cameras,
    })))
}

async fn add_camera(
    state: web::Data<AppState>,
    req: web::Json<NewCamera>,
) -> Result<HttpResponse, ApiError> {
    let input = req.into_inner();
    let camera = state
        .run(move |registry| async move { registry.add_camera(input).await })
        .await??;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": format!("Camera {} added", camera.id()),
        "camera_id": camera.id(),
        "camera_name": camera.name,
    })))
}

async fn get_camera(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let camera_id = path.into_inner();
    let camera = state
        .run(move |registry| async move { registry.get_camera(&camera_id).await })
        .await??;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "camera": camera })))
}

async fn remove_camera(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let camera_id = path.into_inner();
    let id = camera_id.clone();
    let removed = state
        .run(move |registry| async move { registry.remove_camera(&id).await })
        .await?;

    let message = if removed {
        format!("Camera {} removed", camera_id)
    } else {
        format!("Camera {} does not exist", camera_id)
    };
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "removed": removed,
        "message": message,
    })))
}

async fn camera_stats(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stats = state
        .run(|registry| async move { registry.stats().await })
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "stats": stats })))
}

async fn camera_locations(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let locations = state
        .run(|registry| async move { registry.locations().await })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": locations.len(),
        "locations": locations,
    })))
}

async fn probe_camera(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let camera_id = path.into_inner();
    let request: ProbeRequest = optional_json(&body)?;
    request.validate()?;

    let timeout = request.timeout();
    let id = camera_id.clone();
    let outcome = state
        .run(move |registry| async move { registry.probe_camera(&id, timeout).await })
        .await??;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "camera_id": camera_id,
        "result": outcome,
    })))
}

async fn probe_all(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: ProbeRequest = optional_json(&body)?;
    request.validate()?;

    let timeout = request.timeout();
    let report = state
        .run(move |registry| async move { registry.probe_all(timeout).await })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": report.total,
        "results": report.results,
    })))
}

async fn start_health_check(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: HealthCheckStartRequest = optional_json(&body)?;
    request.validate()?;

    let (interval, timeout) = (request.interval(), request.timeout());
    let started = state
        .run(move |registry| async move {
            let started = registry.start_health_check(interval, timeout);
            (started, registry.health_check_status())
        })
        .await?;

    let (started, status) = started;
    let message = if started {
        "Health check started"
    } else {
        "Health check already running"
    };
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": message,
        "status": status,
    })))
}

async fn stop_health_check(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let stopped = state
        .run(|registry| async move { registry.stop_health_check().await })
        .await?;
    let message = if stopped {
        "Health check stopped"
    } else {
        "Health check was not running"
    };
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": message })))
}

async fn health_check_status(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let status = state.registry.health_check_status();
    Ok(HttpResponse::Ok().json(json!({ "success": true, "status": status })))
}

async fn run_health_check_once(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: ProbeRequest = optional_json(&body)?;
    request.validate()?;

    let timeout = request.timeout();
    let report = state
        .run(move |registry| async move { registry.run_health_check_once(timeout).await })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": report.total,
        "results": report.results,
    })))
}

async fn load_from_db(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: DatabasePathRequest = optional_json(&body)?;
    let loaded = state
        .run(move |registry| async move {
            match request.path {
                Some(path) => registry.load_from(&path).await,
                None => registry.load().await,
            }
        })
        .await??;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "loaded": loaded,
        "message": format!("Loaded {} cameras", loaded),
    })))
}

async fn save_to_db(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: DatabasePathRequest = optional_json(&body)?;
    let path = request
        .path
        .unwrap_or_else(|| state.registry.cameras_path().to_path_buf());

    let target = path.clone();
    state
        .run(move |registry| async move { registry.save_to(&target).await })
        .await??;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "path": path,
        "message": "Cameras saved",
    })))
}

async fn ping_check(
    state: web::Data<AppState>,
    req: web::Json<PingCheckRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = req.into_inner();
    request.validate()?;

    let timeout = request.timeout();
    let url = request.url;
    let outcome = state
        .run(move |registry| async move { registry.probe_target(&url, timeout).await })
        .await??;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "result": outcome })))
}

async fn camera_stream_urls(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let camera_id = path.into_inner();
    let id = camera_id.clone();
    let urls = state
        .run(move |registry| async move { registry.playback_urls(&id).await })
        .await??;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "camera_id": camera_id,
        "urls": urls,
    })))
}

async fn start_camera_stream(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<CameraStreamRequest>,
) -> Result<HttpResponse, ApiError> {
    let camera_id = path.into_inner();
    let request = req.into_inner();

    let id = camera_id.clone();
    let publish_uri = state
        .run(move |registry| async move {
            registry
                .start_camera_stream(&id, &request.source_path, request.host.as_deref(), request.port)
                .await
        })
        .await??;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "camera_id": camera_id,
        "publish_uri": publish_uri,
    })))
}

async fn stop_camera_stream(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let camera_id = path.into_inner();
    let outcome = state
        .run(move |registry| async move { registry.stop_camera_stream(&camera_id).await })
        .await??;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": outcome.message,
        "forced": outcome.forced,
    })))
}

async fn start_stream(
    state: web::Data<AppState>,
    req: web::Json<StartStreamRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = req.into_inner();
    request.validate()?;

    let name = request.name.clone();
    let publish_uri = state
        .run(move |registry| async move {
            registry
                .start_stream(
                    &request.name,
                    &request.source_path,
                    request.host.as_deref(),
                    request.port,
                )
                .await
        })
        .await??;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "name": name,
        "publish_uri": publish_uri,
    })))
}

async fn stop_stream(
    state: web::Data<AppState>,
    req: web::Json<StopStreamRequest>,
) -> Result<HttpResponse, ApiError> {
    let name = req.into_inner().name;
    let outcome = state
        .run(move |registry| async move { registry.stop_stream(&name).await })
        .await??;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "name": outcome.name,
        "forced": outcome.forced,
        "message": outcome.message,
    })))
}

async fn list_streams(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let streams = state
        .run(|registry| async move { registry.list_streams().await })
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": streams.len(),
        "streams": streams,
    })))
}

async fn simulate_camera(
    state: web::Data<AppState>,
    req: web::Json<SimulateCamera>,
) -> Result<HttpResponse, ApiError> {
    let request = req.into_inner();
    let camera = state
        .run(move |registry| async move { registry.simulate_camera(request).await })
        .await??;
    Ok(HttpResponse::Created().json(json!({ "success": true, "camera": camera })))
}

async fn simulate_batch(
    state: web::Data<AppState>,
    req: web::Json<SimulateBatchRequest>,
) -> Result<HttpResponse, ApiError> {
    let SimulateBatchRequest { cameras, sources } = req.into_inner();
    let results = state
        .run(move |registry| async move { registry.simulate_batch(cameras, sources).await })
        .await??;

    let succeeded = results.iter().filter(|r| r.success).count();
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "total": results.len(),
        "succeeded": succeeded,
        "results": results,
    })))
}
