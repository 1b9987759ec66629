use std::sync::Arc;

use listen_metrics::config::ScraperConfig;
use listen_metrics::scraper::Scraper;
use listen_metrics::spotify::SpotifyClient;
use listen_metrics::store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    listen_metrics::init_tracing();

    let config = ScraperConfig::from_env()?;
    let store = SqliteStore::connect(&config.database_url).await?;

    let mut spotify = SpotifyClient::new(config.credentials, config.refresh_token);
    // Fail at startup, not mid-loop, when the refresh token is unusable.
    let token = spotify.refresh_access_token().await?;
    spotify.install_token(token);

    let mut scraper = Scraper::new(spotify, Arc::new(store));

    tokio::select! {
        _ = scraper.run_forever(config.poll_interval) => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("shutting down scrape worker");
        }
    }

    Ok(())
}
