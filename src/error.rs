use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures talking to the Spotify Web API.
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Spotify API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("response parse failed: {0}")]
    Decode(String),
}

/// Failures of the metrics datastore.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("stored data is invalid: {0}")]
    Corrupt(String),
}

/// Anything that aborts a single ingestion cycle.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Spotify(#[from] SpotifyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Dashboard HTTP error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Store(StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Store(err) => {
                tracing::error!("store read failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "metrics are temporarily unavailable".to_string(),
                )
            }
        };
        (
            status,
            Json(json!({ "error": message })),
        )
            .into_response()
    }
}
