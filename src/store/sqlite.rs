//! SQLite-backed [`MetricsStore`] via sqlx.
//!
//! Ordered lists (a play's artists, a track's artists, an artist's genres)
//! live in child tables keyed by `(parent, position)`. Upserting a parent
//! replaces its children inside the same transaction, so re-ingesting a
//! record never appends duplicates.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use super::{DailyMetric, DayRange, MetricsStore, ScoreMetric, StoreResult, TimeWindow};
use crate::error::StoreError;
use crate::models::{Artist, DailyValue, PlayedTrack, RankedName, RecentPlay, Track, TrackFeatures, Watermark};

/// Metrics store over a SQLite connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct RecentPlayRow {
    played_at: i64,
    track_name: String,
}

#[derive(Debug, FromRow)]
struct RankedRow {
    name: String,
    total: i64,
}

#[derive(Debug, FromRow)]
struct DailyRow {
    day: String,
    value: f64,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("metrics store ready");
        Ok(store)
    }

    /// Private in-memory database, used by tests.
    pub async fn in_memory() -> StoreResult<Self> {
        // Every connection to `:memory:` is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for SqliteStore {
    async fn get_last_played_at(&self) -> StoreResult<Watermark> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(played_at) FROM played_track")
            .fetch_one(&self.pool)
            .await?;

        match max {
            None => Ok(Watermark::Empty),
            Some(ms) => Ok(Watermark::At(from_millis(ms)?)),
        }
    }

    async fn upsert_played_tracks(&self, records: &[PlayedTrack]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let played_at = record.played_at.timestamp_millis();
            sqlx::query(
                r#"
                INSERT INTO played_track (played_at, track_id, track_name)
                VALUES (?, ?, ?)
                ON CONFLICT(played_at) DO UPDATE SET
                    track_id = excluded.track_id,
                    track_name = excluded.track_name
                "#,
            )
            .bind(played_at)
            .bind(&record.track_id)
            .bind(&record.track_name)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM played_track_artist WHERE played_at = ?")
                .bind(played_at)
                .execute(&mut *tx)
                .await?;
            for (position, artist_id) in record.artist_ids.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO played_track_artist (played_at, position, artist_id) VALUES (?, ?, ?)",
                )
                .bind(played_at)
                .bind(position as i64)
                .bind(artist_id)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        debug!("upserted {} played tracks", records.len());
        Ok(())
    }

    async fn upsert_tracks(&self, records: &[Track]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO track (track_id, popularity)
                VALUES (?, ?)
                ON CONFLICT(track_id) DO UPDATE SET popularity = excluded.popularity
                "#,
            )
            .bind(&record.track_id)
            .bind(i64::from(record.popularity))
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM track_artist WHERE track_id = ?")
                .bind(&record.track_id)
                .execute(&mut *tx)
                .await?;
            for (position, artist_id) in record.artist_ids.iter().enumerate() {
                sqlx::query("INSERT INTO track_artist (track_id, position, artist_id) VALUES (?, ?, ?)")
                    .bind(&record.track_id)
                    .bind(position as i64)
                    .bind(artist_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        debug!("upserted {} tracks", records.len());
        Ok(())
    }

    async fn upsert_track_features(&self, records: &[TrackFeatures]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for f in records {
            sqlx::query(
                r#"
                INSERT INTO track_features (
                    track_id, acousticness, danceability, duration_ms, energy,
                    instrumentalness, track_key, liveness, loudness, mode,
                    speechiness, tempo, time_signature, valence
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(track_id) DO UPDATE SET
                    acousticness = excluded.acousticness,
                    danceability = excluded.danceability,
                    duration_ms = excluded.duration_ms,
                    energy = excluded.energy,
                    instrumentalness = excluded.instrumentalness,
                    track_key = excluded.track_key,
                    liveness = excluded.liveness,
                    loudness = excluded.loudness,
                    mode = excluded.mode,
                    speechiness = excluded.speechiness,
                    tempo = excluded.tempo,
                    time_signature = excluded.time_signature,
                    valence = excluded.valence
                "#,
            )
            .bind(&f.track_id)
            .bind(f.acousticness)
            .bind(f.danceability)
            .bind(f.duration_ms)
            .bind(f.energy)
            .bind(f.instrumentalness)
            .bind(f.key)
            .bind(f.liveness)
            .bind(f.loudness)
            .bind(f.mode)
            .bind(f.speechiness)
            .bind(f.tempo)
            .bind(f.time_signature)
            .bind(f.valence)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("upserted {} track features", records.len());
        Ok(())
    }

    async fn upsert_artists(&self, records: &[Artist]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO artist (artist_id, artist_name, popularity)
                VALUES (?, ?, ?)
                ON CONFLICT(artist_id) DO UPDATE SET
                    artist_name = excluded.artist_name,
                    popularity = excluded.popularity
                "#,
            )
            .bind(&record.artist_id)
            .bind(&record.artist_name)
            .bind(i64::from(record.popularity))
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM artist_genre WHERE artist_id = ?")
                .bind(&record.artist_id)
                .execute(&mut *tx)
                .await?;
            for (position, genre) in record.genres.iter().enumerate() {
                sqlx::query("INSERT INTO artist_genre (artist_id, position, genre) VALUES (?, ?, ?)")
                    .bind(&record.artist_id)
                    .bind(position as i64)
                    .bind(genre)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        debug!("upserted {} artists", records.len());
        Ok(())
    }

    async fn artist_ids_missing(&self) -> StoreResult<Vec<String>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT artist_id
            FROM (
                SELECT artist_id FROM played_track_artist
                UNION
                SELECT artist_id FROM track_artist
            )
            WHERE artist_id NOT IN (SELECT artist_id FROM artist)
            ORDER BY artist_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn track_ids_missing_features(&self) -> StoreResult<Vec<String>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT DISTINCT p.track_id
            FROM played_track p
            LEFT JOIN track_features f ON f.track_id = p.track_id
            WHERE f.track_id IS NULL
            ORDER BY p.track_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn recently_played(&self, window: TimeWindow) -> StoreResult<Vec<RecentPlay>> {
        let (start, end) = bounds(window);

        let rows: Vec<RecentPlayRow> = sqlx::query_as(
            r#"
            SELECT played_at, track_name
            FROM played_track
            WHERE played_at >= ? AND played_at < ?
            ORDER BY played_at DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        // Artists not stored yet are left out of the name list.
        let names: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT pa.played_at, a.artist_name
            FROM played_track_artist pa
            INNER JOIN artist a ON a.artist_id = pa.artist_id
            WHERE pa.played_at >= ? AND pa.played_at < ?
            ORDER BY pa.played_at, pa.position
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut by_play: HashMap<i64, Vec<String>> = HashMap::new();
        for (played_at, name) in names {
            by_play.entry(played_at).or_default().push(name);
        }

        rows.into_iter()
            .map(|row| {
                Ok(RecentPlay {
                    played_at: from_millis(row.played_at)?,
                    track_name: row.track_name,
                    artist_names: by_play
                        .remove(&row.played_at)
                        .map(|names| names.join(", "))
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn played_track_ids(&self, window: TimeWindow) -> StoreResult<Vec<String>> {
        let (start, end) = bounds(window);
        let ids = sqlx::query_scalar(
            r#"
            SELECT track_id
            FROM played_track
            WHERE played_at >= ? AND played_at < ?
            ORDER BY played_at DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn top_artists(&self, window: TimeWindow, limit: u32) -> StoreResult<Vec<RankedName>> {
        let (start, end) = bounds(window);
        let rows: Vec<RankedRow> = sqlx::query_as(
            r#"
            SELECT a.artist_name AS name, COUNT(DISTINCT p.played_at) AS total
            FROM played_track p
            INNER JOIN played_track_artist pa ON pa.played_at = p.played_at
            INNER JOIN artist a ON a.artist_id = pa.artist_id
            WHERE p.played_at >= ? AND p.played_at < ?
            GROUP BY a.artist_id, a.artist_name
            ORDER BY total DESC, a.artist_name ASC
            LIMIT ?
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ranked).collect())
    }

    async fn top_genres(&self, window: TimeWindow, limit: u32) -> StoreResult<Vec<RankedName>> {
        let (start, end) = bounds(window);
        let rows: Vec<RankedRow> = sqlx::query_as(
            r#"
            SELECT genre AS name, COUNT(*) AS total
            FROM (
                SELECT DISTINCT p.track_id, g.genre
                FROM played_track p
                INNER JOIN played_track_artist pa ON pa.played_at = p.played_at
                INNER JOIN artist_genre g ON g.artist_id = pa.artist_id
                WHERE p.played_at >= ? AND p.played_at < ?
            )
            GROUP BY genre
            ORDER BY total DESC, genre ASC
            LIMIT ?
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ranked).collect())
    }

    async fn average(&self, metric: ScoreMetric, window: TimeWindow) -> StoreResult<f64> {
        let (start, end) = bounds(window);
        let sql = match metric {
            ScoreMetric::Popularity => {
                r#"
                SELECT AVG(t.popularity)
                FROM played_track p
                INNER JOIN track t ON t.track_id = p.track_id
                WHERE p.played_at >= ? AND p.played_at < ?
                "#
            }
            ScoreMetric::Energy => {
                r#"
                SELECT AVG(f.energy) * 100
                FROM played_track p
                INNER JOIN track_features f ON f.track_id = p.track_id
                WHERE p.played_at >= ? AND p.played_at < ?
                "#
            }
            ScoreMetric::Danceability => {
                r#"
                SELECT AVG(f.danceability) * 100
                FROM played_track p
                INNER JOIN track_features f ON f.track_id = p.track_id
                WHERE p.played_at >= ? AND p.played_at < ?
                "#
            }
        };

        let avg: Option<f64> = sqlx::query_scalar(sql)
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;
        Ok(avg.unwrap_or(0.0))
    }

    async fn daily(&self, metric: DailyMetric, days: DayRange) -> StoreResult<Vec<DailyValue>> {
        let (start, end) = bounds(days.window());
        let sql = match metric {
            DailyMetric::ListenMinutes => {
                r#"
                SELECT date(p.played_at / 1000, 'unixepoch') AS day,
                       CAST(SUM(f.duration_ms) AS REAL) / 60000.0 AS value
                FROM played_track p
                INNER JOIN track_features f ON f.track_id = p.track_id
                WHERE p.played_at >= ? AND p.played_at < ?
                GROUP BY day
                ORDER BY day
                "#
            }
            DailyMetric::Popularity => {
                r#"
                SELECT date(p.played_at / 1000, 'unixepoch') AS day,
                       AVG(t.popularity) AS value
                FROM played_track p
                INNER JOIN track t ON t.track_id = p.track_id
                WHERE p.played_at >= ? AND p.played_at < ?
                GROUP BY day
                ORDER BY day
                "#
            }
            DailyMetric::Energy => {
                r#"
                SELECT date(p.played_at / 1000, 'unixepoch') AS day,
                       AVG(f.energy) * 100 AS value
                FROM played_track p
                INNER JOIN track_features f ON f.track_id = p.track_id
                WHERE p.played_at >= ? AND p.played_at < ?
                GROUP BY day
                ORDER BY day
                "#
            }
            DailyMetric::Danceability => {
                r#"
                SELECT date(p.played_at / 1000, 'unixepoch') AS day,
                       AVG(f.danceability) * 100 AS value
                FROM played_track p
                INNER JOIN track_features f ON f.track_id = p.track_id
                WHERE p.played_at >= ? AND p.played_at < ?
                GROUP BY day
                ORDER BY day
                "#
            }
        };

        let rows: Vec<DailyRow> = sqlx::query_as(sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let date = NaiveDate::parse_from_str(&row.day, "%Y-%m-%d")
                    .map_err(|e| StoreError::Corrupt(format!("bad day bucket {:?}: {}", row.day, e)))?;
                Ok(DailyValue {
                    date,
                    value: row.value.round(),
                })
            })
            .collect()
    }
}

fn bounds(window: TimeWindow) -> (i64, i64) {
    (window.start.timestamp_millis(), window.end.timestamp_millis())
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("played_at out of range: {}", ms)))
}

fn ranked(row: RankedRow) -> RankedName {
    RankedName {
        name: row.name,
        count: row.total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
    }

    fn play(played_at: DateTime<Utc>, track_id: &str, artist_ids: &[&str]) -> PlayedTrack {
        PlayedTrack {
            played_at,
            track_id: track_id.to_string(),
            track_name: format!("{} name", track_id),
            artist_ids: artist_ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn artist(id: &str, name: &str, genres: &[&str]) -> Artist {
        Artist {
            artist_id: id.to_string(),
            artist_name: name.to_string(),
            genres: genres.iter().map(|s| s.to_string()).collect(),
            popularity: 50,
        }
    }

    fn features(track_id: &str, energy: f64, danceability: f64, duration_ms: i64) -> TrackFeatures {
        TrackFeatures {
            track_id: track_id.to_string(),
            acousticness: 0.1,
            danceability,
            duration_ms,
            energy,
            instrumentalness: 0.0,
            key: 5,
            liveness: 0.2,
            loudness: -6.0,
            mode: 1,
            speechiness: 0.05,
            tempo: 120.0,
            time_signature: 4,
            valence: 0.5,
        }
    }

    fn track(track_id: &str, popularity: u32) -> Track {
        Track {
            track_id: track_id.to_string(),
            artist_ids: vec!["a1".to_string()],
            popularity,
        }
    }

    fn march() -> TimeWindow {
        TimeWindow {
            start: at(1, 0, 0),
            end: at(31, 0, 0),
        }
    }

    async fn count(store: &SqliteStore, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_store_has_empty_watermark() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.get_last_played_at().await.unwrap(), Watermark::Empty);
        assert_eq!(Watermark::Empty.as_millis(), 0);
    }

    #[tokio::test]
    async fn watermark_is_latest_played_at() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_played_tracks(&[play(at(2, 10, 0), "t1", &["a1"]), play(at(3, 9, 30), "t2", &["a1"])])
            .await
            .unwrap();
        assert_eq!(store.get_last_played_at().await.unwrap(), Watermark::At(at(3, 9, 30)));
    }

    #[tokio::test]
    async fn upserting_twice_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let plays = vec![play(at(2, 10, 0), "t1", &["a1", "a2"])];
        let artists = vec![artist("a1", "Can", &["krautrock", "art rock"])];
        let tracks = vec![track("t1", 40)];

        for _ in 0..2 {
            store.upsert_played_tracks(&plays).await.unwrap();
            store.upsert_artists(&artists).await.unwrap();
            store.upsert_tracks(&tracks).await.unwrap();
            store.upsert_track_features(&[features("t1", 0.5, 0.5, 1000)]).await.unwrap();
        }

        assert_eq!(count(&store, "played_track").await, 1);
        assert_eq!(count(&store, "played_track_artist").await, 2);
        assert_eq!(count(&store, "artist").await, 1);
        assert_eq!(count(&store, "artist_genre").await, 2);
        assert_eq!(count(&store, "track").await, 1);
        assert_eq!(count(&store, "track_artist").await, 1);
        assert_eq!(count(&store, "track_features").await, 1);
    }

    #[tokio::test]
    async fn same_played_at_keeps_last_payload() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_played_tracks(&[play(at(2, 10, 0), "t1", &["a1", "a2"])]).await.unwrap();
        store.upsert_played_tracks(&[play(at(2, 10, 0), "t2", &["a3"])]).await.unwrap();
        store.upsert_artists(&[artist("a3", "Neu!", &[])]).await.unwrap();

        assert_eq!(count(&store, "played_track").await, 1);
        assert_eq!(count(&store, "played_track_artist").await, 1);
        assert_eq!(store.played_track_ids(march()).await.unwrap(), vec!["t2"]);
        let recent = store.recently_played(march()).await.unwrap();
        assert_eq!(recent[0].track_name, "t2 name");
        assert_eq!(recent[0].artist_names, "Neu!");
    }

    #[tokio::test]
    async fn artist_refetch_replaces_genres() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_artists(&[artist("a1", "Can", &["krautrock", "art rock"])]).await.unwrap();
        store.upsert_artists(&[artist("a1", "CAN", &["experimental"])]).await.unwrap();
        store.upsert_played_tracks(&[play(at(2, 10, 0), "t1", &["a1"])]).await.unwrap();

        let genres = store.top_genres(march(), 5).await.unwrap();
        assert_eq!(
            genres,
            vec![RankedName { name: "experimental".into(), count: 1 }]
        );
        let artists = store.top_artists(march(), 5).await.unwrap();
        assert_eq!(artists[0].name, "CAN");
    }

    #[tokio::test]
    async fn lists_metadata_not_stored_yet() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.artist_ids_missing().await.unwrap().is_empty());
        assert!(store.track_ids_missing_features().await.unwrap().is_empty());

        store
            .upsert_played_tracks(&[
                play(at(2, 10, 0), "t1", &["a1", "a2"]),
                play(at(2, 11, 0), "t2", &["a2"]),
                play(at(2, 12, 0), "t2", &["a2"]),
            ])
            .await
            .unwrap();
        store
            .upsert_tracks(&[Track {
                track_id: "t3".into(),
                artist_ids: vec!["a3".into()],
                popularity: 10,
            }])
            .await
            .unwrap();
        store.upsert_artists(&[artist("a1", "Can", &[])]).await.unwrap();
        store.upsert_track_features(&[features("t1", 0.5, 0.5, 1000)]).await.unwrap();

        assert_eq!(store.artist_ids_missing().await.unwrap(), vec!["a2", "a3"]);
        assert_eq!(store.track_ids_missing_features().await.unwrap(), vec!["t2"]);

        store
            .upsert_artists(&[artist("a2", "Neu!", &[]), artist("a3", "Harmonia", &[])])
            .await
            .unwrap();
        store.upsert_track_features(&[features("t2", 0.5, 0.5, 1000)]).await.unwrap();
        assert!(store.artist_ids_missing().await.unwrap().is_empty());
        assert!(store.track_ids_missing_features().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recently_played_joins_known_artists_in_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_played_tracks(&[
                play(at(2, 10, 0), "t1", &["a2", "a1"]),
                play(at(2, 11, 0), "t2", &["missing"]),
                play(at(1, 9, 0), "t3", &["a1"]),
            ])
            .await
            .unwrap();
        store
            .upsert_artists(&[artist("a1", "Brian Eno", &[]), artist("a2", "David Byrne", &[])])
            .await
            .unwrap();

        let window = TimeWindow { start: at(2, 0, 0), end: at(3, 0, 0) };
        let recent = store.recently_played(window).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].played_at, at(2, 11, 0));
        assert_eq!(recent[0].artist_names, "");
        assert_eq!(recent[1].artist_names, "David Byrne, Brian Eno");
    }

    #[tokio::test]
    async fn top_artists_skips_missing_artists_and_breaks_ties_by_name() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_played_tracks(&[
                play(at(2, 10, 0), "t1", &["a1"]),
                play(at(2, 11, 0), "t2", &["a2"]),
                play(at(2, 12, 0), "t3", &["a3"]),
                play(at(2, 13, 0), "t3", &["a3"]),
                play(at(2, 14, 0), "t4", &["ghost"]),
                play(at(2, 15, 0), "t4", &["ghost"]),
                play(at(2, 16, 0), "t4", &["ghost"]),
            ])
            .await
            .unwrap();
        store
            .upsert_artists(&[
                artist("a1", "Portishead", &[]),
                artist("a2", "Massive Attack", &[]),
                artist("a3", "Tricky", &[]),
            ])
            .await
            .unwrap();

        let top = store.top_artists(march(), 5).await.unwrap();
        let names: Vec<_> = top.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Tricky", "Massive Attack", "Portishead"]);
        assert_eq!(top[0].count, 2);

        let limited = store.top_artists(march(), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn top_genres_counts_distinct_tracks() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_played_tracks(&[
                play(at(2, 10, 0), "t1", &["a1", "a2"]),
                play(at(2, 11, 0), "t1", &["a1", "a2"]),
                play(at(2, 12, 0), "t2", &["a2"]),
            ])
            .await
            .unwrap();
        store
            .upsert_artists(&[
                artist("a1", "Slowdive", &["shoegaze", "dream pop"]),
                artist("a2", "Cocteau Twins", &["dream pop", "ethereal wave"]),
            ])
            .await
            .unwrap();

        let genres = store.top_genres(march(), 5).await.unwrap();
        assert_eq!(
            genres,
            vec![
                RankedName { name: "dream pop".into(), count: 2 },
                RankedName { name: "ethereal wave".into(), count: 2 },
                RankedName { name: "shoegaze".into(), count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn empty_window_aggregates_are_neutral() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_played_tracks(&[play(at(2, 10, 0), "t1", &["a1"])]).await.unwrap();
        store.upsert_artists(&[artist("a1", "Can", &["krautrock"])]).await.unwrap();
        store.upsert_tracks(&[track("t1", 80)]).await.unwrap();
        store.upsert_track_features(&[features("t1", 0.9, 0.4, 300_000)]).await.unwrap();

        let window = TimeWindow { start: at(20, 0, 0), end: at(21, 0, 0) };
        assert!(store.recently_played(window).await.unwrap().is_empty());
        assert!(store.played_track_ids(window).await.unwrap().is_empty());
        assert!(store.top_artists(window, 5).await.unwrap().is_empty());
        assert!(store.top_genres(window, 5).await.unwrap().is_empty());
        assert_eq!(store.average(ScoreMetric::Energy, window).await.unwrap(), 0.0);
        assert_eq!(store.average(ScoreMetric::Popularity, window).await.unwrap(), 0.0);
        assert_eq!(store.average(ScoreMetric::Danceability, window).await.unwrap(), 0.0);

        let days = DayRange {
            first: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            last: NaiveDate::from_ymd_opt(2024, 3, 21).unwrap(),
        };
        assert!(store.daily(DailyMetric::ListenMinutes, days).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn averages_ignore_plays_without_metadata() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_played_tracks(&[
                play(at(2, 10, 0), "t1", &["a1"]),
                play(at(2, 11, 0), "t2", &["a1"]),
                play(at(2, 12, 0), "t3", &["a1"]),
            ])
            .await
            .unwrap();
        store.upsert_tracks(&[track("t1", 80), track("t2", 40)]).await.unwrap();
        store
            .upsert_track_features(&[features("t1", 0.9, 0.2, 1000), features("t2", 0.5, 0.6, 1000)])
            .await
            .unwrap();

        let energy = store.average(ScoreMetric::Energy, march()).await.unwrap();
        assert!((energy - 70.0).abs() < 1e-9);
        let dance = store.average(ScoreMetric::Danceability, march()).await.unwrap();
        assert!((dance - 40.0).abs() < 1e-9);
        let popularity = store.average(ScoreMetric::Popularity, march()).await.unwrap();
        assert!((popularity - 60.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn daily_series_bucket_by_utc_day() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert_played_tracks(&[
                play(at(1, 23, 59), "t1", &["a1"]),
                play(at(2, 0, 1), "t1", &["a1"]),
                play(at(2, 8, 0), "t2", &["a1"]),
                play(at(5, 8, 0), "t2", &["a1"]),
            ])
            .await
            .unwrap();
        store.upsert_tracks(&[track("t1", 30), track("t2", 61)]).await.unwrap();
        store
            .upsert_track_features(&[
                features("t1", 0.25, 0.5, 180_000),
                features("t2", 0.75, 0.5, 270_000),
            ])
            .await
            .unwrap();

        let days = DayRange {
            first: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            last: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        };

        let minutes = store.daily(DailyMetric::ListenMinutes, days).await.unwrap();
        assert_eq!(
            minutes,
            vec![DailyValue { date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), value: 8.0 }]
        );

        let energy = store.daily(DailyMetric::Energy, days).await.unwrap();
        assert_eq!(energy[0].value, 50.0);

        let popularity = store.daily(DailyMetric::Popularity, days).await.unwrap();
        assert_eq!(popularity[0].value, 46.0);

        let dance = store.daily(DailyMetric::Danceability, days).await.unwrap();
        assert_eq!(dance[0].value, 50.0);
    }
}
