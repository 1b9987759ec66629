use std::env;
use std::time::Duration;

use crate::spotify::Credentials;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;
const DEFAULT_PORT: u16 = 8081;
const DEFAULT_REFRESH_SECS: u64 = 120;

/// Ingestion process configuration from environment variables.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub database_url: String,
    pub credentials: Credentials,
    pub refresh_token: String,
    pub poll_interval: Duration,
}

impl ScraperConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;
        let credentials = credentials_from_env(false)?;
        let refresh_token = required("SPOTIFY_REFRESH_TOKEN")?;

        let poll_interval = Duration::from_secs(parsed_or(
            "POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        ));
        if poll_interval.is_zero() {
            anyhow::bail!("POLL_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            database_url,
            credentials,
            refresh_token,
            poll_interval,
        })
    }
}

/// Dashboard process configuration from environment variables.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub port: u16,
    pub database_url: String,
    pub refresh_secs: u64,
}

impl DashboardConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = parsed_or("PORT", DEFAULT_PORT);
        let database_url = required("DATABASE_URL")?;
        let refresh_secs = parsed_or("DASHBOARD_REFRESH_SECS", DEFAULT_REFRESH_SECS).max(1);

        Ok(Self {
            port,
            database_url,
            refresh_secs,
        })
    }
}

/// Reads the Spotify app credentials. The redirect URI is only mandatory for
/// the authorization helper.
pub fn credentials_from_env(require_redirect: bool) -> anyhow::Result<Credentials> {
    let client_id = required("SPOTIFY_CLIENT_ID")?;
    let client_secret = required("SPOTIFY_CLIENT_SECRET")?;
    let redirect_uri = if require_redirect {
        Some(required("SPOTIFY_REDIRECT_URI")?)
    } else {
        env::var("SPOTIFY_REDIRECT_URI").ok()
    };

    Ok(Credentials {
        client_id,
        client_secret,
        redirect_uri,
    })
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} is required", name))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
