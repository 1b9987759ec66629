//! HTTP surface of the listening dashboard.

pub mod views;

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::store::MetricsStore;

/// Bounds of the time-window selector, in days.
pub const MIN_DAYS: u32 = 1;
pub const MAX_DAYS: u32 = 7;
const DEFAULT_DAYS: u32 = 1;

const PAGE_TEMPLATE: &str = include_str!("dashboard.html");

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn MetricsStore>,
    page: Arc<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn MetricsStore>, refresh_secs: u64) -> Self {
        let page = PAGE_TEMPLATE
            .replace("{{REFRESH_SECS}}", &refresh_secs.to_string())
            .replace("{{MIN_DAYS}}", &MIN_DAYS.to_string())
            .replace("{{MAX_DAYS}}", &MAX_DAYS.to_string())
            .replace("{{DEFAULT_DAYS}}", &DEFAULT_DAYS.to_string());
        Self {
            store,
            page: Arc::new(page),
        }
    }
}

/// Query parameters shared by every view endpoint.
///
/// `days` stays a string so that malformed values get the same JSON error
/// as out-of-range ones.
#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    /// Days of history to show (1-7, default 1).
    #[serde(default)]
    pub days: Option<String>,
}

impl WindowQuery {
    fn days(&self) -> Result<u32, AppError> {
        let days = match self.days.as_deref() {
            None => DEFAULT_DAYS,
            Some(raw) => raw.trim().parse().unwrap_or(0),
        };
        if !(MIN_DAYS..=MAX_DAYS).contains(&days) {
            return Err(AppError::BadRequest(format!(
                "days must be between {} and {}",
                MIN_DAYS, MAX_DAYS
            )));
        }
        Ok(days)
    }
}

/// GET / - Dashboard page.
pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    Html(state.page.as_str().to_owned())
}

/// GET /health - Health check.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/v1/window
pub async fn window(Query(params): Query<WindowQuery>) -> Result<impl IntoResponse, AppError> {
    let days = params.days()?;
    Ok(Json(json!({ "days": days, "caption": views::view_window_caption(days) })))
}

/// GET /api/v1/recently-played
pub async fn recently_played(
    State(state): State<AppState>,
    Query(params): Query<WindowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = params.days()?;
    tracing::info!("refreshing recently played, history-length = {}", days);
    let table = views::recently_played_table(state.store.as_ref(), Utc::now(), days).await?;
    Ok(Json(table))
}

/// GET /api/v1/track-ids
pub async fn track_ids(
    State(state): State<AppState>,
    Query(params): Query<WindowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = params.days()?;
    let ids = views::track_ids(state.store.as_ref(), Utc::now(), days).await?;
    Ok(Json(json!({ "track_ids": ids })))
}

/// GET /api/v1/top-artists
pub async fn top_artists(
    State(state): State<AppState>,
    Query(params): Query<WindowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = params.days()?;
    let table = views::top_artists_table(state.store.as_ref(), Utc::now(), days).await?;
    Ok(Json(table))
}

/// GET /api/v1/top-genres
pub async fn top_genres(
    State(state): State<AppState>,
    Query(params): Query<WindowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = params.days()?;
    let table = views::top_genres_table(state.store.as_ref(), Utc::now(), days).await?;
    Ok(Json(table))
}

/// GET /api/v1/scores - Popularity, energy and danceability gauges.
pub async fn scores(
    State(state): State<AppState>,
    Query(params): Query<WindowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = params.days()?;
    let gauges = views::score_gauges(state.store.as_ref(), Utc::now(), days).await?;
    Ok(Json(gauges))
}

/// GET /api/v1/trends - Per-day bar charts.
pub async fn trends(
    State(state): State<AppState>,
    Query(params): Query<WindowQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = params.days()?;
    let charts = views::trend_charts(state.store.as_ref(), Utc::now(), days).await?;
    Ok(Json(charts))
}

/// Build the dashboard router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/v1/window", get(window))
        .route("/api/v1/recently-played", get(recently_played))
        .route("/api/v1/track-ids", get(track_ids))
        .route("/api/v1/top-artists", get(top_artists))
        .route("/api/v1/top-genres", get(top_genres))
        .route("/api/v1/scores", get(scores))
        .route("/api/v1/trends", get(trends))
}
