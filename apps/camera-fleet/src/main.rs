use anyhow::Result;
use camera_fleet::{CameraRegistry, ConfigManager};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/camera-fleet/config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Bind address for REST API, overrides [api] host and port
    #[arg(long, env = "CAMERA_FLEET_BIND")]
    bind: Option<String>,

    /// Do not start the periodic health check at boot
    #[arg(long)]
    no_healthcheck: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_manager = ConfigManager::new(args.config.clone()).await?;
    let config = config_manager.get().await;

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.app.log_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting {} v{}", config.app.name, env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {:?}", config_manager.path());

    if let Some(path) = args.dump_config {
        config_manager.save_snapshot(&path).await?;
        return Ok(());
    }

    let registry = Arc::new(CameraRegistry::from_config(&config));
    info!("Camera registry initialized");

    match registry.load().await {
        Ok(count) => info!("Loaded {} cameras from {:?}", count, registry.cameras_path()),
        Err(e) => warn!("Starting with an empty camera registry: {}", e),
    }

    if config.health.autostart && !args.no_healthcheck {
        registry.start_health_check(None, None);
    } else {
        info!("Periodic health check disabled at boot");
    }

    if config.api.enabled {
        let bind = args
            .bind
            .unwrap_or_else(|| format!("{}:{}", config.api.host, config.api.port));
        let api_registry = registry.clone();
        let runtime = tokio::runtime::Handle::current();

        // actix-web runs its own single-threaded system
        std::thread::spawn(move || {
            let system = actix_rt::System::new();
            system.block_on(async move {
                if let Err(e) =
                    camera_fleet::api::start_server(bind, api_registry, runtime).await
                {
                    error!("API server error: {}", e);
                }
            });
        });
    } else {
        info!("REST API disabled");
    }

    wait_for_shutdown().await?;
    info!("Shutting down Camera Fleet");

    if let Err(e) = registry.shutdown().await {
        error!("Failed to save cameras on shutdown: {}", e);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C");
        }
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
