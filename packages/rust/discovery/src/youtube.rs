//! YouTube Data API v3 search collaborator.
//!
//! One query costs two calls: `search.list` for ids, then `videos.list`
//! for statistics and durations.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use funnelport_shared::{FunnelError, Result};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{RawVideoRecord, SearchSource};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("funnelport/", env!("CARGO_PKG_VERSION"));

/// `search.list` caps `maxResults` at 50.
const MAX_RESULTS: usize = 50;

const COLLABORATOR: &str = "search";

// ---------------------------------------------------------------------------
// URL helpers
// ---------------------------------------------------------------------------

static WATCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?(?:[^#\s]*&)?v=|youtu\.be/|youtube\.com/(?:embed|shorts)/)([A-Za-z0-9_-]{6,})")
        .expect("watch url regex")
});

static ISO_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("duration regex")
});

/// Extract the video id from a watch, short-link, embed or shorts URL.
pub fn video_id_from_url(url: &str) -> Option<String> {
    WATCH_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Parse an ISO 8601 duration such as `PT1H2M3S` into seconds.
pub fn parse_iso8601_duration(s: &str) -> Option<u64> {
    let caps = ISO_DURATION_RE.captures(s)?;
    let part = |i: usize| -> u64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    Some(part(1) * 86_400 + part(2) * 3_600 + part(3) * 60 + part(4))
}

// ---------------------------------------------------------------------------
// API response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<VideoSnippet>,
    statistics: Option<VideoStatistics>,
    content_details: Option<VideoContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    channel_title: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    /// Returned as a decimal string.
    view_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    duration: Option<String>,
}

impl From<VideoItem> for RawVideoRecord {
    fn from(item: VideoItem) -> Self {
        let snippet = item.snippet;
        Self {
            url: watch_url(&item.id),
            title: snippet.as_ref().map(|s| s.title.clone()).unwrap_or_default(),
            channel: snippet.as_ref().and_then(|s| s.channel_title.clone()),
            published_at: snippet.as_ref().and_then(|s| s.published_at),
            view_count: item
                .statistics
                .and_then(|s| s.view_count)
                .and_then(|v| v.parse().ok()),
            duration_secs: item
                .content_details
                .and_then(|d| d.duration)
                .and_then(|d| parse_iso8601_duration(&d)),
            video_id: Some(item.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// YouTube Data API client.
pub struct YouTubeSearch {
    client: Client,
    api_key: String,
    base_url: String,
}

impl YouTubeSearch {
    pub fn new(api_key: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                FunnelError::collaborator(COLLABORATOR, format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FunnelError::collaborator(COLLABORATOR, format!("{endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FunnelError::collaborator(
                COLLABORATOR,
                format!("{endpoint}: HTTP {status}"),
            ));
        }

        response.json::<T>().await.map_err(|e| {
            FunnelError::collaborator(COLLABORATOR, format!("{endpoint}: invalid response: {e}"))
        })
    }
}

#[async_trait]
impl SearchSource for YouTubeSearch {
    #[instrument(skip(self), fields(query = %text))]
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RawVideoRecord>> {
        let limit = limit.clamp(1, MAX_RESULTS).to_string();
        let search: SearchResponse = self
            .get_json(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("q", text),
                    ("maxResults", &limit),
                ],
            )
            .await?;

        let ids: Vec<String> = search
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();
        if ids.is_empty() {
            debug!("no results");
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        let videos: VideosResponse = self
            .get_json(
                "videos",
                &[("part", "snippet,statistics,contentDetails"), ("id", &joined)],
            )
            .await?;

        // videos.list does not guarantee input order.
        let mut records: Vec<RawVideoRecord> =
            videos.items.into_iter().map(RawVideoRecord::from).collect();
        records.sort_by_key(|r| {
            ids.iter()
                .position(|id| r.video_id.as_deref() == Some(id.as_str()))
                .unwrap_or(usize::MAX)
        });
        debug!(count = records.len(), "search results");
        Ok(records)
    }
}
