use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::batch_service::ConvertService;
use services::registry::{ConversionRegistry, InMemoryRegistry};
use services::sweeper::RetentionSweeper;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-converter with config: {:?}", cfg);

    // --- Ensure upload root exists ---
    let upload_root = PathBuf::from(&cfg.upload_dir);
    if !upload_root.exists() {
        fs::create_dir_all(&upload_root)?;
        tracing::info!("Created upload directory at {}", cfg.upload_dir);
    }

    // --- Initialize core service ---
    let registry: Arc<dyn ConversionRegistry> = Arc::new(InMemoryRegistry::new());
    let service = ConvertService::new(
        Arc::clone(&registry),
        upload_root.clone(),
        cfg.public_base_url(),
        cfg.max_concurrent_transforms,
        Duration::from_secs(cfg.transform_timeout_secs),
    );

    // --- Start retention sweeper (first sweep runs immediately) ---
    RetentionSweeper::new(
        upload_root,
        registry,
        Duration::from_secs(cfg.retention_secs),
        Duration::from_secs(cfg.sweep_interval_secs),
    )
    .start();

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
