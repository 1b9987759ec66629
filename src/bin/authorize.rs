//! One-time helper that turns an authorization code into the refresh token
//! the scraper runs with.

use clap::Parser;

use listen_metrics::config::credentials_from_env;
use listen_metrics::spotify::{authorize_url, exchange_code};

#[derive(Parser, Debug)]
#[command(about = "Obtain a Spotify refresh token for the scraper")]
struct Args {
    /// Code from the redirect after approving access. Without it, the
    /// authorization URL is printed instead.
    #[arg(long, env = "SPOTIFY_AUTH_CODE")]
    code: Option<String>,

    /// Opaque value echoed back on the redirect.
    #[arg(long, default_value = "listen-metrics")]
    state: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    listen_metrics::init_tracing();

    let args = Args::parse();
    let credentials = credentials_from_env(true)?;

    match args.code {
        None => {
            println!("Open this URL, approve access, then rerun with --code <CODE>:");
            println!("{}", authorize_url(&credentials, &args.state)?);
        }
        Some(code) => {
            let token = exchange_code(&credentials, &code).await?;
            let refresh = token
                .refresh_token
                .ok_or_else(|| anyhow::anyhow!("token response did not include a refresh token"))?;
            println!("Refresh token\n{}", refresh);
        }
    }

    Ok(())
}
