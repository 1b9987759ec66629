//! Storage adapter for listening metrics.
//!
//! [`MetricsStore`] is the only interface the scraper and the dashboard see.
//! Writes are keyed upserts; reads are windowed aggregates that return empty
//! results instead of errors when nothing matches.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::StoreError;
use crate::models::{Artist, DailyValue, PlayedTrack, RankedName, RecentPlay, Track, TrackFeatures, Watermark};

pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The `days` days leading up to `now`.
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: now - Duration::days(i64::from(days)),
            end: now,
        }
    }
}

/// Inclusive range of UTC calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DayRange {
    /// `days` calendar days ending with the day of `now`.
    pub fn ending_today(now: DateTime<Utc>, days: u32) -> Self {
        let last = now.date_naive();
        let first = last - Duration::days(i64::from(days.max(1)) - 1);
        Self { first, last }
    }

    /// Same range as a half-open instant window.
    pub fn window(&self) -> TimeWindow {
        let start = self.first.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = (self.last + Duration::days(1)).and_time(chrono::NaiveTime::MIN).and_utc();
        TimeWindow { start, end }
    }
}

/// Averages over the plays in a window, on a 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMetric {
    Popularity,
    Energy,
    Danceability,
}

/// Per-day series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyMetric {
    /// Sum of track durations, in whole minutes.
    ListenMinutes,
    Popularity,
    Energy,
    Danceability,
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Latest stored `played_at`, or [`Watermark::Empty`].
    async fn get_last_played_at(&self) -> StoreResult<Watermark>;

    async fn upsert_played_tracks(&self, records: &[PlayedTrack]) -> StoreResult<()>;
    async fn upsert_tracks(&self, records: &[Track]) -> StoreResult<()>;
    async fn upsert_track_features(&self, records: &[TrackFeatures]) -> StoreResult<()>;
    async fn upsert_artists(&self, records: &[Artist]) -> StoreResult<()>;

    /// Artist ids referenced by a play or a track that have no artist row yet.
    async fn artist_ids_missing(&self) -> StoreResult<Vec<String>>;

    /// Played track ids that have no audio features yet.
    async fn track_ids_missing_features(&self) -> StoreResult<Vec<String>>;

    /// Plays in the window, newest first.
    async fn recently_played(&self, window: TimeWindow) -> StoreResult<Vec<RecentPlay>>;

    /// Track id of every play in the window, newest first.
    async fn played_track_ids(&self, window: TimeWindow) -> StoreResult<Vec<String>>;

    /// Artists ranked by plays; ties by name.
    async fn top_artists(&self, window: TimeWindow, limit: u32) -> StoreResult<Vec<RankedName>>;

    /// Genres ranked by the number of distinct tracks carrying them; ties by name.
    async fn top_genres(&self, window: TimeWindow, limit: u32) -> StoreResult<Vec<RankedName>>;

    /// `0.0` when no play in the window has the data.
    async fn average(&self, metric: ScoreMetric, window: TimeWindow) -> StoreResult<f64>;

    /// One entry per day that has data, oldest first.
    async fn daily(&self, metric: DailyMetric, days: DayRange) -> StoreResult<Vec<DailyValue>>;
}
