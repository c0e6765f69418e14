use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;

mod config;
mod error;
mod routes;
mod telemetry;

use config::Config;
use routes::AppState;
use tally_engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    telemetry::init(config.log_format);

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let db_path = config.database_path();
    let pool = tally_storage::create_db(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let engine = Engine::open(pool, config.engine_settings()?).await?;
    let loaded = engine.snapshot().await.len();
    tracing::info!(db = %db_path.display(), transactions = loaded, "dataset loaded");

    let app = routes::router(
        AppState {
            engine: Arc::new(engine),
        },
        config.max_upload_bytes,
    );

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
