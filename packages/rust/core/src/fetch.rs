//! FETCH stage: transcripts for the selected candidates.
//!
//! Per-item failures never abort the batch; they become absent entries.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use funnelport_discovery::video_id_from_url;
use funnelport_markdown::clean_transcript;
use funnelport_shared::{
    CorpusEntry, FetchConfig, FunnelError, RankedCandidate, ResearchCorpus, Result,
};

use crate::collaborators::TranscriptSource;

pub struct Fetcher {
    source: Arc<dyn TranscriptSource>,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(source: Arc<dyn TranscriptSource>, config: FetchConfig) -> Self {
        Self { source, config }
    }

    /// Cleaned transcript for one candidate, or `None` when unavailable.
    ///
    /// Collaborator errors and timeouts are logged and reported as `None`.
    pub async fn fetch(&self, candidate: &RankedCandidate) -> Option<String> {
        let url = &candidate.resource.url;
        let Some(video_id) = candidate
            .resource
            .video_id
            .clone()
            .or_else(|| video_id_from_url(url))
        else {
            debug!(%url, "no video id, skipping transcript");
            return None;
        };

        let raw = match tokio::time::timeout(self.config.item_timeout, self.source.get(&video_id)).await {
            Ok(Ok(raw)) => raw?,
            Ok(Err(e)) => {
                warn!(%video_id, error = %e, "transcript fetch failed");
                return None;
            }
            Err(_) => {
                warn!(%video_id, timeout_secs = self.config.item_timeout.as_secs(), "transcript fetch timed out");
                return None;
            }
        };

        let cleaned = clean_transcript(&raw);
        (!cleaned.is_empty()).then_some(cleaned)
    }

    /// Fetch all transcripts concurrently; the corpus keeps candidate order.
    ///
    /// Fails with [`FunnelError::InsufficientResearch`] when no transcript
    /// could be retrieved.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn build_corpus(&self, candidates: &[RankedCandidate]) -> Result<ResearchCorpus> {
        let mut fetched: Vec<(usize, Option<String>)> = stream::iter(candidates.iter().enumerate())
            .map(|(idx, candidate)| async move { (idx, self.fetch(candidate).await) })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        fetched.sort_by_key(|(idx, _)| *idx);

        let corpus = ResearchCorpus {
            entries: fetched
                .into_iter()
                .map(|(idx, transcript)| CorpusEntry {
                    candidate: candidates[idx].clone(),
                    transcript,
                })
                .collect(),
        };

        let usable = corpus.usable_count();
        info!(usable, absent = corpus.absent_count(), "transcripts fetched");
        if usable == 0 {
            return Err(FunnelError::InsufficientResearch {
                requested: candidates.len(),
            });
        }
        Ok(corpus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTranscripts, candidate};
    use std::time::Duration;

    fn fetcher(source: ScriptedTranscripts) -> Fetcher {
        Fetcher::new(
            Arc::new(source),
            FetchConfig {
                concurrency: 4,
                item_timeout: Duration::from_millis(200),
            },
        )
    }

    #[tokio::test]
    async fn one_failure_leaves_three_usable_in_order() {
        let source = ScriptedTranscripts::default()
            .with("vid00000001", "[Music] first transcript")
            .with("vid00000002", "second transcript")
            .failing("vid00000003")
            .with("vid00000004", "fourth transcript")
            .delayed("vid00000001", Duration::from_millis(50));
        let candidates: Vec<_> = (1..=4).map(candidate).collect();

        let corpus = fetcher(source).build_corpus(&candidates).await.unwrap();
        assert_eq!(corpus.entries.len(), 4);
        assert_eq!(corpus.usable_count(), 3);
        assert_eq!(corpus.entries[0].transcript.as_deref(), Some("first transcript"));
        assert_eq!(corpus.entries[2].transcript, None);
        let order: Vec<_> = corpus.entries.iter().map(|e| e.candidate.resource.url.clone()).collect();
        let expected: Vec<_> = candidates.iter().map(|c| c.resource.url.clone()).collect();
        assert_eq!(order, expected);
    }

    #[tokio::test]
    async fn empty_and_slow_transcripts_count_as_absent() {
        let source = ScriptedTranscripts::default()
            .with("vid00000001", "[Music]   ")
            .with("vid00000002", "slow")
            .delayed("vid00000002", Duration::from_secs(2))
            .with("vid00000003", "ok");
        let candidates: Vec<_> = (1..=3).map(candidate).collect();

        let corpus = fetcher(source).build_corpus(&candidates).await.unwrap();
        assert_eq!(corpus.usable_count(), 1);
        assert_eq!(corpus.absent_count(), 2);
    }

    #[tokio::test]
    async fn no_transcripts_is_insufficient_research() {
        let source = ScriptedTranscripts::default().failing("vid00000001");
        let candidates = vec![candidate(1), candidate(2)];
        let err = fetcher(source).build_corpus(&candidates).await.unwrap_err();
        assert!(matches!(err, FunnelError::InsufficientResearch { requested: 2 }));
    }
}
