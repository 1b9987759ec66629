//! Wire types for the Spotify Web API responses the scraper consumes.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Page of `GET /me/player/recently-played`, newest first.
#[derive(Clone, Debug, Deserialize)]
pub struct PlayHistoryPage {
    #[serde(default)]
    pub items: Vec<PlayHistoryItem>,
    #[serde(default)]
    pub cursors: Option<Cursors>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Cursors {
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PlayHistoryItem {
    pub track: Track,
    pub played_at: DateTime<Utc>,
}

/// A Spotify track (full object, trimmed to what is stored). Local files
/// have no id.
#[derive(Clone, Debug, Deserialize)]
pub struct Track {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub popularity: u32,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

/// Simplified artist embedded in a track.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct Artist {
    pub id: Option<String>,
    pub name: String,
}

/// Full artist from `GET /artists`.
#[derive(Clone, Debug, Deserialize)]
pub struct FullArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: u32,
}

#[derive(Deserialize)]
pub(super) struct ArtistsResponse {
    pub artists: Vec<Option<FullArtist>>,
}

// ---------------------------------------------------------------------------
// Audio Features (GET /v1/audio-features)
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct AudioFeatures {
    pub id: String,
    #[serde(default)]
    pub acousticness: f64,
    #[serde(default)]
    pub danceability: f64,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub energy: f64,
    #[serde(default)]
    pub instrumentalness: f64,
    #[serde(default = "default_key")]
    pub key: i32,
    #[serde(default)]
    pub liveness: f64,
    #[serde(default)]
    pub loudness: f64,
    #[serde(default)]
    pub mode: i32,
    #[serde(default)]
    pub speechiness: f64,
    #[serde(default)]
    pub tempo: f64,
    #[serde(default = "default_time_signature")]
    pub time_signature: i32,
    #[serde(default)]
    pub valence: f64,
}

fn default_key() -> i32 { -1 }
fn default_time_signature() -> i32 { 4 }

#[derive(Deserialize)]
pub(super) struct AudioFeaturesResponse {
    pub audio_features: Vec<Option<AudioFeatures>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_recently_played_page() {
        let body = r#"{
            "items": [{
                "track": {
                    "id": "t1",
                    "name": "Heroes",
                    "popularity": 71,
                    "duration_ms": 371000,
                    "artists": [{"id": "a1", "name": "David Bowie"}],
                    "album": {"id": "al1", "name": "Heroes"}
                },
                "played_at": "2024-03-01T12:30:15.123Z",
                "context": null
            }],
            "next": null,
            "cursors": {"after": "1709296215123", "before": "1709296215123"},
            "limit": 50
        }"#;
        let page: PlayHistoryPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.items.len(), 1);
        let item = &page.items[0];
        assert_eq!(item.track.id.as_deref(), Some("t1"));
        assert_eq!(item.track.popularity, 71);
        assert_eq!(item.track.artists[0].id.as_deref(), Some("a1"));
        assert_eq!(item.played_at.timestamp_millis(), 1_709_296_215_123);
        assert_eq!(
            page.cursors.and_then(|c| c.after).as_deref(),
            Some("1709296215123")
        );
    }

    #[test]
    fn empty_history_has_no_cursors() {
        let page: PlayHistoryPage =
            serde_json::from_str(r#"{"items": [], "next": null, "cursors": null, "limit": 50}"#)
                .unwrap();
        assert!(page.items.is_empty());
        assert!(page.cursors.is_none());
    }

    #[test]
    fn batch_responses_keep_null_slots() {
        let artists: ArtistsResponse = serde_json::from_str(
            r#"{"artists": [null, {"id": "a1", "name": "Can", "genres": ["krautrock"], "popularity": 50}]}"#,
        )
        .unwrap();
        assert!(artists.artists[0].is_none());
        assert_eq!(artists.artists[1].as_ref().unwrap().genres, vec!["krautrock"]);

        let features: AudioFeaturesResponse = serde_json::from_str(
            r#"{"audio_features": [{"id": "t1", "energy": 0.8, "duration_ms": 1000}, null]}"#,
        )
        .unwrap();
        let first = features.audio_features[0].as_ref().unwrap();
        assert_eq!(first.key, -1);
        assert_eq!(first.time_signature, 4);
        assert!(features.audio_features[1].is_none());
    }
}
