use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use listen_metrics::config::DashboardConfig;
use listen_metrics::dashboard::{router, AppState};
use listen_metrics::store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    listen_metrics::init_tracing();

    let config = DashboardConfig::from_env()?;
    let store = SqliteStore::connect(&config.database_url).await?;

    let app = router()
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(Arc::new(store), config.refresh_secs));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);

    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}
