//! Resource discovery: multi-query video search and quality ranking.
//!
//! A topic is expanded into several query variants, each issued to a
//! [`SearchSource`] through a bounded worker pool. Results are merged in
//! variant order (first occurrence wins), scored with [`scoring::score`],
//! ranked, and truncated.

mod queries;
pub mod scoring;
mod youtube;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use funnelport_shared::{
    CandidateResource, DiscoveryConfig, FunnelError, RankedCandidate, Result, ScoringConfig,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use queries::query_variants;
pub use youtube::{YouTubeSearch, parse_iso8601_duration, video_id_from_url, watch_url};

// ---------------------------------------------------------------------------
// Search collaborator
// ---------------------------------------------------------------------------

/// One search hit as the collaborator reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVideoRecord {
    pub url: String,
    pub video_id: Option<String>,
    pub title: String,
    pub channel: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: Option<u64>,
    pub duration_secs: Option<u64>,
}

/// Video search backend.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Run one query. Errors must be distinguishable from an empty result.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<RawVideoRecord>>;
}

// ---------------------------------------------------------------------------
// Discoverer
// ---------------------------------------------------------------------------

/// Ranks candidate videos for a topic.
pub struct Discoverer {
    source: Arc<dyn SearchSource>,
    config: DiscoveryConfig,
    scoring: ScoringConfig,
}

impl Discoverer {
    pub fn new(source: Arc<dyn SearchSource>, config: DiscoveryConfig, scoring: ScoringConfig) -> Self {
        Self {
            source,
            config,
            scoring,
        }
    }

    /// Best `desired_count` candidates for `topic`, scored against `now`.
    ///
    /// Returns fewer (possibly zero) when the search finds little.
    /// Fails with [`FunnelError::DiscoveryUnavailable`] only when every
    /// query variant failed.
    #[instrument(skip_all, fields(topic = %topic, desired_count))]
    pub async fn find(
        &self,
        topic: &str,
        desired_count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedCandidate>> {
        let variants = query_variants(topic, self.config.query_variants);
        if variants.is_empty() {
            return Err(FunnelError::validation("discovery topic is empty"));
        }

        let limit = self.config.results_per_query;
        let timeout = self.config.variant_timeout;
        let mut outcomes: Vec<(usize, Result<Vec<RawVideoRecord>>)> =
            stream::iter(variants.iter().enumerate())
                .map(|(idx, q)| {
                    let source = Arc::clone(&self.source);
                    async move {
                        let outcome = match tokio::time::timeout(timeout, source.query(q, limit)).await {
                            Ok(result) => result,
                            Err(_) => Err(FunnelError::collaborator(
                                "search",
                                format!("query timed out after {}s", timeout.as_secs()),
                            )),
                        };
                        (idx, outcome)
                    }
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;

        // Completion order must not leak into the result.
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut succeeded = 0usize;
        let mut merged: Vec<RawVideoRecord> = Vec::new();
        for (idx, outcome) in outcomes {
            match outcome {
                Ok(records) => {
                    succeeded += 1;
                    debug!(variant = %variants[idx], hits = records.len(), "query variant done");
                    for record in records {
                        if !merged.iter().any(|m| m.url == record.url) {
                            merged.push(record);
                        }
                    }
                }
                Err(e) => {
                    warn!(variant = %variants[idx], error = %e, "query variant failed, skipping");
                }
            }
        }

        if succeeded == 0 {
            return Err(FunnelError::DiscoveryUnavailable {
                attempted: variants.len(),
            });
        }

        let ranked = rank(merged, &self.scoring, now, desired_count);
        info!(
            variants = variants.len(),
            succeeded,
            returned = ranked.len(),
            "discovery complete"
        );
        Ok(ranked)
    }
}

/// Score, order and truncate deduplicated records.
pub fn rank(
    records: Vec<RawVideoRecord>,
    scoring: &ScoringConfig,
    now: DateTime<Utc>,
    desired_count: usize,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = records
        .into_iter()
        .map(|r| {
            let resource = candidate_from_record(r, &scoring.expert_lexicon);
            let score = scoring::score(&resource, scoring, now);
            RankedCandidate {
                resource,
                score,
                manual: false,
            }
        })
        .collect();
    ranked.sort_by(scoring::rank_order);
    ranked.truncate(desired_count);
    ranked
}

fn candidate_from_record(r: RawVideoRecord, lexicon: &[String]) -> CandidateResource {
    let is_expert_source = scoring::is_expert(&r.title, r.channel.as_deref(), lexicon);
    CandidateResource {
        url: r.url,
        video_id: r.video_id,
        title: r.title,
        view_count: r.view_count,
        published_at: r.published_at,
        duration_secs: r.duration_secs,
        channel: r.channel,
        is_expert_source,
    }
}

// ---------------------------------------------------------------------------
// Manual curation
// ---------------------------------------------------------------------------

/// Turn user-supplied URLs into top-ranked candidates, keeping input order.
///
/// Duplicate URLs are dropped (first wins). Each gets the maximal score.
pub fn manual_candidates(urls: &[String]) -> Result<Vec<RankedCandidate>> {
    let mut out: Vec<RankedCandidate> = Vec::with_capacity(urls.len());
    for raw in urls {
        let parsed = Url::parse(raw.trim())
            .map_err(|e| FunnelError::validation(format!("invalid video URL '{raw}': {e}")))?;
        let video_id = video_id_from_url(parsed.as_str());
        let url = video_id
            .as_deref()
            .map(watch_url)
            .unwrap_or_else(|| parsed.to_string());
        if out.iter().any(|c| c.resource.url == url) {
            continue;
        }
        out.push(RankedCandidate {
            resource: CandidateResource {
                url,
                video_id,
                title: String::new(),
                view_count: None,
                published_at: None,
                duration_secs: None,
                channel: None,
                is_expert_source: false,
            },
            score: 1.0,
            manual: true,
        });
    }
    Ok(out)
}
