mod auth;
mod config;
mod error;
mod routes;

use std::sync::Arc;

use clubsync_core::services::DatabaseService;
use clubsync_core::sync::SyncPipeline;
use clubsync_core::{GitGateway, Reconciler, SnapshotFile, SyncCoordinator};
use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clubsync_api=info".parse().expect("valid directive"))
                .add_directive("clubsync_core=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting clubsync-api with config: {:?}", config);

    let store = Arc::new(DatabaseService::open_path(&config.sync.db_path).await?);
    let reconciler = Arc::new(Reconciler::new(
        store,
        SnapshotFile::new(config.sync.snapshot_path()),
    ));
    let gateway = Arc::new(GitGateway::new(config.sync.git_config()));
    let coordinator = SyncCoordinator::spawn(SyncPipeline::new(
        Arc::clone(&reconciler),
        gateway,
        config.sync.pipeline_options(),
    ));

    let state = AppState::new(config, coordinator, reconciler);
    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("clubsync-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
