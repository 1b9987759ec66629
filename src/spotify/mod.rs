//! Spotify Web API client.
//!
//! Uses the Authorization Code flow: a long-lived refresh token is exchanged
//! for short-lived access tokens. The client owns its current token; nothing
//! is shared between clients.

mod models;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::error::SpotifyError;
use crate::models::Watermark;

pub use models::{
    Artist, AudioFeatures, Cursors, FullArtist, PlayHistoryItem, PlayHistoryPage, Track,
};
use models::{ArtistsResponse, AudioFeaturesResponse, TokenResponse};

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// The API never returns more than this many play events per call.
pub const RECENTLY_PLAYED_LIMIT: usize = 50;
const ARTISTS_BATCH: usize = 50;
const AUDIO_FEATURES_BATCH: usize = 100;

/// Scope needed to read play history.
pub const RECENTLY_PLAYED_SCOPE: &str = "user-read-recently-played";

/// Spotify application credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
}

/// Short-lived access token returned by a token grant.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: Instant,
    /// Present when Spotify rotates the refresh token.
    pub refresh_token: Option<String>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now()
    }
}

/// Source of play history and track/artist metadata.
#[async_trait]
pub trait MusicApi: Send {
    /// Play events strictly after `after`, newest first, at most 50.
    async fn get_recently_played(&mut self, after: Watermark) -> Result<PlayHistoryPage, SpotifyError>;

    /// Full artist objects; unknown ids are skipped.
    async fn get_artists(&mut self, ids: &[String]) -> Result<Vec<FullArtist>, SpotifyError>;

    /// Audio features; tracks without analysis are skipped.
    async fn get_audio_features(&mut self, ids: &[String]) -> Result<Vec<AudioFeatures>, SpotifyError>;
}

/// Spotify API client acting on behalf of one user.
pub struct SpotifyClient {
    client: Client,
    credentials: Credentials,
    refresh_token: String,
    token: Option<AccessToken>,
}

impl SpotifyClient {
    pub fn new(credentials: Credentials, refresh_token: String) -> Self {
        Self {
            client: Client::new(),
            credentials,
            refresh_token,
            token: None,
        }
    }

    /// Performs the refresh-token grant and returns the new token without
    /// installing it.
    pub async fn refresh_access_token(&self) -> Result<AccessToken, SpotifyError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.refresh_token.as_str()),
        ];
        request_token(&self.client, &self.credentials, &params).await
    }

    /// Ensures we have a valid access token, refreshing if needed.
    async fn ensure_token(&mut self) -> Result<String, SpotifyError> {
        if let Some(ref t) = self.token {
            if t.is_fresh() {
                return Ok(t.access_token.clone());
            }
        }

        tracing::info!("refreshing Spotify access token");
        let token = self.refresh_access_token().await?;
        let access = token.access_token.clone();
        self.install_token(token);
        Ok(access)
    }

    /// Makes `token` the one used for subsequent calls.
    pub fn install_token(&mut self, token: AccessToken) {
        if let Some(ref rotated) = token.refresh_token {
            self.refresh_token = rotated.clone();
        }
        self.token = Some(token);
    }

    /// A 401 means the token was revoked early; the next call refreshes.
    fn forget_token_if_rejected(&mut self, status: StatusCode) {
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("access token rejected, dropping it");
            self.token = None;
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &mut self,
        url: &str,
        what: &str,
    ) -> Result<T, SpotifyError> {
        let token = self.ensure_token().await?;
        let res = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        self.forget_token_if_rejected(res.status());
        let res = check_status(res).await?;
        res.json()
            .await
            .map_err(|e| SpotifyError::Decode(format!("{} parse failed: {}", what, e)))
    }
}

#[async_trait]
impl MusicApi for SpotifyClient {
    async fn get_recently_played(&mut self, after: Watermark) -> Result<PlayHistoryPage, SpotifyError> {
        let mut url = format!(
            "{}/me/player/recently-played?limit={}",
            API_BASE, RECENTLY_PLAYED_LIMIT
        );
        if let Watermark::At(_) = after {
            url.push_str(&format!("&after={}", after.as_millis()));
        }
        self.get_json(&url, "recently-played").await
    }

    async fn get_artists(&mut self, ids: &[String]) -> Result<Vec<FullArtist>, SpotifyError> {
        let mut artists = Vec::with_capacity(ids.len());
        for url in batch_urls("artists", ids, ARTISTS_BATCH) {
            let body: ArtistsResponse = self.get_json(&url, "artists").await?;
            artists.extend(body.artists.into_iter().flatten());
        }
        Ok(artists)
    }

    async fn get_audio_features(&mut self, ids: &[String]) -> Result<Vec<AudioFeatures>, SpotifyError> {
        let mut features = Vec::with_capacity(ids.len());
        for url in batch_urls("audio-features", ids, AUDIO_FEATURES_BATCH) {
            let body: AudioFeaturesResponse = self.get_json(&url, "audio-features").await?;
            features.extend(body.audio_features.into_iter().flatten());
        }
        Ok(features)
    }
}

/// One `?ids=` URL per batch of at most `batch` ids.
fn batch_urls(endpoint: &str, ids: &[String], batch: usize) -> Vec<String> {
    ids.chunks(batch)
        .map(|chunk| {
            format!(
                "{}/{}?ids={}",
                API_BASE,
                endpoint,
                urlencoding::encode(&chunk.join(","))
            )
        })
        .collect()
}

/// URL the user visits once to grant access to their play history.
pub fn authorize_url(credentials: &Credentials, state: &str) -> Result<String, SpotifyError> {
    let redirect_uri = credentials
        .redirect_uri
        .as_deref()
        .ok_or_else(|| SpotifyError::Auth("redirect URI is not configured".into()))?;

    Ok(format!(
        "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
        AUTHORIZE_URL,
        urlencoding::encode(&credentials.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(RECENTLY_PLAYED_SCOPE),
        urlencoding::encode(state),
    ))
}

/// Exchanges an authorization code for the first token pair.
pub async fn exchange_code(credentials: &Credentials, code: &str) -> Result<AccessToken, SpotifyError> {
    let redirect_uri = credentials
        .redirect_uri
        .as_deref()
        .ok_or_else(|| SpotifyError::Auth("redirect URI is not configured".into()))?;
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    request_token(&Client::new(), credentials, &params).await
}

async fn request_token(
    client: &Client,
    credentials: &Credentials,
    params: &[(&str, &str)],
) -> Result<AccessToken, SpotifyError> {
    let res = with_basic_auth(client.post(TOKEN_URL), credentials)
        .form(params)
        .send()
        .await?;

    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        return Err(SpotifyError::Auth(format!("token request failed: {} - {}", status, body)));
    }

    let body: TokenResponse = res
        .json()
        .await
        .map_err(|e| SpotifyError::Decode(format!("token parse failed: {}", e)))?;
    let expires_at = Instant::now() + Duration::from_secs(body.expires_in.saturating_sub(60));

    Ok(AccessToken {
        access_token: body.access_token,
        expires_at,
        refresh_token: body.refresh_token,
    })
}

fn with_basic_auth(req: RequestBuilder, credentials: &Credentials) -> RequestBuilder {
    let auth = base64::engine::general_purpose::STANDARD.encode(
        format!("{}:{}", credentials.client_id, credentials.client_secret).as_bytes(),
    );
    req.header("Authorization", format!("Basic {}", auth))
}

async fn check_status(res: Response) -> Result<Response, SpotifyError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = res
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        return Err(SpotifyError::RateLimited { retry_after });
    }
    let body = res.text().await.unwrap_or_default();
    Err(SpotifyError::Api {
        status: status.as_u16(),
        body,
    })
}
