mod config;
mod http;
mod overpass;
mod runtime;

use std::sync::Arc;

use anyhow::Context;
use nolimit_shared::controller::TargetingController;
use tracing_subscriber::EnvFilter;

use config::Config;
use overpass::OverpassFetcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("Failed to read configuration")?;
    tracing::info!(
        overpass = %config.overpass_url,
        radius_m = config.controller.search_radius_m,
        directional_speed_kmh = config.controller.directional_speed_kmh,
        "Loaded configuration"
    );

    let fetcher = Arc::new(OverpassFetcher::new(
        config.overpass_url.clone(),
        config.overpass_filter.clone(),
        config.fetch_timeout,
    ));
    let controller = TargetingController::new(config.controller);
    let (handles, controller_task) = runtime::spawn(controller, fetcher, config.fetch_interval);

    let app = http::build_app(handles);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server running at http://localhost:{}", config.port);

    axum::serve(listener, app).await.context("Server error")?;

    // The router held the last sensor senders; the loop winds down once it is gone
    controller_task.await.context("Targeting loop panicked")?;
    Ok(())
}
