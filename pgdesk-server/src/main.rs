use anyhow::Context;
use pgdesk::PgDeskLayer;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .init();

    let viewer = PgDeskLayer::postgres_with_storage(
        config.to_viewer_options(),
        config.storage.data_dir.as_deref(),
        config.storage.history_limit,
    )
    .await
    .context("Failed to open the pgdesk data directory")?;

    let app = viewer.into_router().layer(TraceLayer::new_for_http());

    let address = config.listen_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {}", address))?;

    info!(address = %address, base_path = %config.server.base_path, "pgdesk listening");
    info!("Open http://{}{}/ in a browser", address, config.server.base_path.trim_end_matches('/'));

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
