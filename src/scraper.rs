//! Incremental ingestion of play history.
//!
//! Each cycle reads the watermark from storage, asks the API for plays after
//! it, and upserts plays, then tracks and audio features, then artists. The
//! watermark is never cached between cycles. Plays are committed first, so a
//! cycle that dies later does not refetch them; instead every cycle also
//! fetches the artists and audio features that stored rows reference but
//! that are still missing, which fills the gaps a failed cycle left.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::ScrapeError;
use crate::models::{Artist, PlayedTrack, Track, TrackFeatures, Watermark};
use crate::spotify::{AudioFeatures, FullArtist, MusicApi, PlayHistoryPage};
use crate::store::MetricsStore;

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub watermark_before: Watermark,
    pub watermark_after: Watermark,
    pub plays: usize,
    /// Play events without a track id (local files), not stored.
    pub skipped: usize,
    pub tracks: usize,
    pub features: usize,
    pub artists: usize,
}

/// Polls an API and replicates it into a store.
pub struct Scraper<A> {
    api: A,
    store: Arc<dyn MetricsStore>,
}

impl<A: MusicApi> Scraper<A> {
    pub fn new(api: A, store: Arc<dyn MetricsStore>) -> Self {
        Self { api, store }
    }

    /// Runs one fetch-and-upsert cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, ScrapeError> {
        let watermark_before = self.store.get_last_played_at().await?;
        let history = self.api.get_recently_played(watermark_before).await?;

        let mut report = CycleReport {
            watermark_before,
            watermark_after: watermark_before,
            plays: 0,
            skipped: 0,
            tracks: 0,
            features: 0,
            artists: 0,
        };

        if history.items.is_empty() {
            info!("processing history: len=0, after={}", watermark_before);
        } else {
            let cursors = history.cursors.as_ref();
            info!(
                "processing history: len={}, after={}, before={}",
                history.items.len(),
                cursors.and_then(|c| c.after.as_deref()).unwrap_or("-"),
                cursors.and_then(|c| c.before.as_deref()).unwrap_or("-"),
            );

            let plays = played_tracks(&history);
            report.skipped = history.items.len() - plays.len();
            if report.skipped > 0 {
                info!("skipping {} plays without a track id", report.skipped);
            }
            self.store.upsert_played_tracks(&plays).await?;
            report.plays = plays.len();

            let tracks = tracks(&history);
            self.store.upsert_tracks(&tracks).await?;
            report.tracks = tracks.len();
        }

        let track_ids = merge_ids(
            distinct_track_ids(&history),
            self.store.track_ids_missing_features().await?,
        );
        if !track_ids.is_empty() {
            let features = track_features(self.api.get_audio_features(&track_ids).await?);
            self.store.upsert_track_features(&features).await?;
            report.features = features.len();
        }

        let artist_ids = merge_ids(
            distinct_artist_ids(&history),
            self.store.artist_ids_missing().await?,
        );
        if !artist_ids.is_empty() {
            let artists = artists(self.api.get_artists(&artist_ids).await?);
            self.store.upsert_artists(&artists).await?;
            report.artists = artists.len();
        }

        report.watermark_after = self.store.get_last_played_at().await?;
        info!(
            "stored {} plays, {} tracks, {} features, {} artists; watermark {}",
            report.plays, report.tracks, report.features, report.artists, report.watermark_after
        );
        Ok(report)
    }

    /// Runs cycles forever, sleeping `poll_interval` between them. A failed
    /// cycle is logged and retried on the next tick.
    pub async fn run_forever(&mut self, poll_interval: Duration) {
        info!("beginning scrape worker, polling every {:?}", poll_interval);
        loop {
            if let Err(e) = self.run_cycle().await {
                error!("scrape cycle aborted: {}", e);
            }
            info!("sleeping for {:?}", poll_interval);
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// One record per play event that has a track id.
pub fn played_tracks(history: &PlayHistoryPage) -> Vec<PlayedTrack> {
    history
        .items
        .iter()
        .filter_map(|item| {
            let track_id = item.track.id.clone()?;
            Some(PlayedTrack {
                played_at: item.played_at,
                track_id,
                track_name: item.track.name.clone(),
                artist_ids: artist_ids_of(&item.track),
            })
        })
        .collect()
}

/// Track snapshots, one per distinct track, taken from the newest play.
pub fn tracks(history: &PlayHistoryPage) -> Vec<Track> {
    let mut seen = HashSet::new();
    history
        .items
        .iter()
        .filter_map(|item| {
            let track_id = item.track.id.clone()?;
            if !seen.insert(track_id.clone()) {
                return None;
            }
            Some(Track {
                track_id,
                artist_ids: artist_ids_of(&item.track),
                popularity: item.track.popularity.min(100),
            })
        })
        .collect()
}

pub fn distinct_track_ids(history: &PlayHistoryPage) -> Vec<String> {
    let mut seen = HashSet::new();
    history
        .items
        .iter()
        .filter_map(|item| item.track.id.clone())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

pub fn distinct_artist_ids(history: &PlayHistoryPage) -> Vec<String> {
    let mut seen = HashSet::new();
    history
        .items
        .iter()
        .flat_map(|item| artist_ids_of(&item.track))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

pub fn track_features(features: Vec<AudioFeatures>) -> Vec<TrackFeatures> {
    features
        .into_iter()
        .map(|f| TrackFeatures {
            track_id: f.id,
            acousticness: f.acousticness,
            danceability: f.danceability,
            duration_ms: f.duration_ms,
            energy: f.energy,
            instrumentalness: f.instrumentalness,
            key: f.key,
            liveness: f.liveness,
            loudness: f.loudness,
            mode: f.mode,
            speechiness: f.speechiness,
            tempo: f.tempo,
            time_signature: f.time_signature,
            valence: f.valence,
        })
        .collect()
}

pub fn artists(artists: Vec<FullArtist>) -> Vec<Artist> {
    artists
        .into_iter()
        .map(|a| Artist {
            artist_id: a.id,
            artist_name: a.name,
            genres: a.genres,
            popularity: a.popularity,
        })
        .collect()
}

/// Ids from this batch followed by stored gaps not already in it.
fn merge_ids(batch: Vec<String>, missing: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = batch.iter().cloned().collect();
    let backfill: Vec<String> = missing.into_iter().filter(|id| seen.insert(id.clone())).collect();
    if !backfill.is_empty() {
        debug!("backfilling {} ids left over from earlier cycles", backfill.len());
    }
    batch.into_iter().chain(backfill).collect()
}

fn artist_ids_of(track: &crate::spotify::Track) -> Vec<String> {
    track.artists.iter().filter_map(|a| a.id.clone()).collect()
}
