//! Flat records persisted by the ingestion loop and read by the dashboard.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Most recent play timestamp already persisted.
///
/// `Empty` sorts before every instant, so a watermark never compares lower
/// after data has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Watermark {
    Empty,
    At(DateTime<Utc>),
}

impl Watermark {
    /// Millisecond epoch of the watermark, `0` when nothing is stored.
    pub fn as_millis(&self) -> i64 {
        match self {
            Watermark::Empty => 0,
            Watermark::At(t) => t.timestamp_millis(),
        }
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Watermark::Empty => None,
            Watermark::At(t) => Some(*t),
        }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Watermark::Empty => write!(f, "empty"),
            Watermark::At(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// One play event.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayedTrack {
    pub played_at: DateTime<Utc>,
    pub track_id: String,
    pub track_name: String,
    pub artist_ids: Vec<String>,
}

/// Public metadata snapshot of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub track_id: String,
    pub artist_ids: Vec<String>,
    pub popularity: u32,
}

/// Audio analysis snapshot of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFeatures {
    pub track_id: String,
    pub acousticness: f64,
    pub danceability: f64,
    pub duration_ms: i64,
    pub energy: f64,
    pub instrumentalness: f64,
    pub key: i32,
    pub liveness: f64,
    pub loudness: f64,
    pub mode: i32,
    pub speechiness: f64,
    pub tempo: f64,
    pub time_signature: i32,
    pub valence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artist {
    pub artist_id: String,
    pub artist_name: String,
    pub genres: Vec<String>,
    pub popularity: u32,
}

/// Row of the recently played listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentPlay {
    pub played_at: DateTime<Utc>,
    pub track_name: String,
    pub artist_names: String,
}

/// A name with the count it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedName {
    pub name: String,
    pub count: i64,
}

/// Aggregate for one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyValue {
    pub date: chrono::NaiveDate,
    pub value: f64,
}
