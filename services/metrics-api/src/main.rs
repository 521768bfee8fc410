use anyhow::{Context, Result};
use metrics_api::config::Config;
use metrics_api::{create_app, AppState};
use shared::telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("metrics-api", "info")?;

    let config = Config::from_env()?;
    info!(
        "Starting metrics API with data root {}",
        config.beir.data_root.display()
    );

    let addr = config.bind_address();
    let app = create_app(AppState::new(config.beir));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Metrics API listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
