//! Dashboard views.
//!
//! Every view is a function of the store, the current time and the
//! requested window in days; none of them write.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{DailyValue, RankedName};
use crate::store::{DailyMetric, DayRange, MetricsStore, ScoreMetric, StoreResult, TimeWindow};

const TOP_LIMIT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableView {
    fn new(columns: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }
}

/// A donut gauge out of 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeView {
    pub label: String,
    pub value: f64,
    pub remainder: f64,
    pub caption: String,
}

impl GaugeView {
    fn new(label: &str, score: f64) -> Self {
        let value = score.clamp(0.0, 100.0);
        Self {
            label: label.to_string(),
            value,
            remainder: 100.0 - value,
            caption: format!("{} {}", label, value.trunc() as i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChartView {
    pub title: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl BarChartView {
    fn new(title: &str, series: Vec<DailyValue>) -> Self {
        let (labels, values) = series
            .into_iter()
            .map(|d| (d.date.format("%m/%d").to_string(), d.value))
            .unzip();
        Self {
            title: title.to_string(),
            labels,
            values,
        }
    }
}

pub fn view_window_caption(days: u32) -> String {
    format!("Viewing the last {} day(s)!", days)
}

pub async fn recently_played_table(
    store: &dyn MetricsStore,
    now: DateTime<Utc>,
    days: u32,
) -> StoreResult<TableView> {
    let plays = store.recently_played(TimeWindow::last_days(now, days)).await?;
    tracing::debug!("loading {} recently played tracks", plays.len());
    let rows = plays
        .into_iter()
        .map(|p| {
            vec![
                p.played_at.format("%Y-%m-%d, %H:%M").to_string(),
                p.track_name,
                p.artist_names,
            ]
        })
        .collect();
    Ok(TableView::new(&["Time played", "Track", "Artist(s)"], rows))
}

pub async fn track_ids(store: &dyn MetricsStore, now: DateTime<Utc>, days: u32) -> StoreResult<Vec<String>> {
    store.played_track_ids(TimeWindow::last_days(now, days)).await
}

pub async fn top_artists_table(
    store: &dyn MetricsStore,
    now: DateTime<Utc>,
    days: u32,
) -> StoreResult<TableView> {
    let top = store.top_artists(TimeWindow::last_days(now, days), TOP_LIMIT).await?;
    Ok(TableView::new(&["Artist", "Plays"], ranked_rows(top)))
}

pub async fn top_genres_table(
    store: &dyn MetricsStore,
    now: DateTime<Utc>,
    days: u32,
) -> StoreResult<TableView> {
    let top = store.top_genres(TimeWindow::last_days(now, days), TOP_LIMIT).await?;
    Ok(TableView::new(&["Genre", "Tracks"], ranked_rows(top)))
}

pub async fn score_gauges(
    store: &dyn MetricsStore,
    now: DateTime<Utc>,
    days: u32,
) -> StoreResult<Vec<GaugeView>> {
    let window = TimeWindow::last_days(now, days);
    let popularity = store.average(ScoreMetric::Popularity, window).await?;
    let energy = store.average(ScoreMetric::Energy, window).await?;
    let danceability = store.average(ScoreMetric::Danceability, window).await?;
    Ok(vec![
        GaugeView::new("Popularity", popularity),
        GaugeView::new("Energy", energy),
        GaugeView::new("Danceability", danceability),
    ])
}

pub async fn trend_charts(
    store: &dyn MetricsStore,
    now: DateTime<Utc>,
    days: u32,
) -> StoreResult<Vec<BarChartView>> {
    let range = DayRange::ending_today(now, days);
    let mut charts = Vec::with_capacity(4);
    for (title, metric) in [
        ("Listen time (minutes)", DailyMetric::ListenMinutes),
        ("Popularity", DailyMetric::Popularity),
        ("Energy", DailyMetric::Energy),
        ("Danceability", DailyMetric::Danceability),
    ] {
        charts.push(BarChartView::new(title, store.daily(metric, range).await?));
    }
    Ok(charts)
}

fn ranked_rows(ranked: Vec<RankedName>) -> Vec<Vec<String>> {
    ranked
        .into_iter()
        .map(|r| vec![r.name, r.count.to_string()])
        .collect()
}
