//! Personal listening analytics: a scraper that replicates Spotify play
//! history into SQLite and a dashboard that aggregates it.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod models;
pub mod scraper;
pub mod spotify;
pub mod store;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global tracing subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
