//! In-process collaborator mocks for stage and orchestrator tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use funnelport_discovery::{RawVideoRecord, SearchSource};
use funnelport_funnel::PageSource;
use funnelport_shared::{
    CandidateResource, FunnelError, ProductDocument, RankedCandidate, Result, Section,
};

use crate::collaborators::{TextGenerator, TranscriptSource};

pub fn video_id(i: usize) -> String {
    format!("vid{i:08}")
}

pub fn candidate(i: usize) -> RankedCandidate {
    let id = video_id(i);
    RankedCandidate {
        resource: CandidateResource {
            url: format!("https://www.youtube.com/watch?v={id}"),
            video_id: Some(id),
            title: format!("Video {i}"),
            view_count: Some(100_000 * i as u64),
            published_at: None,
            duration_secs: Some(900),
            channel: None,
            is_expert_source: false,
        },
        score: 1.0 / i as f64,
        manual: false,
    }
}

// ---------------------------------------------------------------------------
// Transcripts
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedTranscripts {
    texts: HashMap<String, String>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
}

impl ScriptedTranscripts {
    pub fn with(mut self, id: &str, text: &str) -> Self {
        self.texts.insert(id.into(), text.into());
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.into());
        self
    }

    pub fn delayed(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.into(), delay);
        self
    }
}

#[async_trait]
impl TranscriptSource for ScriptedTranscripts {
    async fn get(&self, video_id: &str) -> Result<Option<String>> {
        if let Some(delay) = self.delays.get(video_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(video_id) {
            return Err(FunnelError::collaborator("transcripts", format!("{video_id}: boom")));
        }
        Ok(self.texts.get(video_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Generative text
// ---------------------------------------------------------------------------

/// Answers from a queue, in call order; an empty queue is a collaborator error.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(FunnelError::collaborator("generation", "script exhausted")))
    }
}

/// Deterministic generator keyed on the prompt: product prompts get a fixed
/// document, every other prompt is answered with the text after its last
/// `TEXT:` marker, prefixed by `tag`.
pub struct EchoGenerator {
    pub tag: String,
    pub product: String,
}

impl EchoGenerator {
    pub fn new(tag: &str, product: &str) -> Self {
        Self {
            tag: tag.into(),
            product: product.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        if prompt.contains("RESEARCH DATA") {
            return Ok(self.product.clone());
        }
        if prompt.contains("customer testimonials") {
            return Ok("1. Loved it.\n2. Worked in a week.".into());
        }
        let text = prompt.rsplit("TEXT:").next().unwrap_or(prompt).trim();
        Ok(format!("[{}] {text}", self.tag))
    }
}

/// Answers like [`EchoGenerator`] but returns an empty reply to every
/// translation prompt.
pub struct BlankTranslations(pub EchoGenerator);

#[async_trait]
impl TextGenerator for BlankTranslations {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        if prompt.starts_with("Translate the following") {
            return Ok(String::new());
        }
        self.0.complete(prompt, max_tokens).await
    }
}

// ---------------------------------------------------------------------------
// Search and pages
// ---------------------------------------------------------------------------

/// Returns the same records for every query, or fails every query.
pub struct StaticSearch {
    pub records: Vec<RawVideoRecord>,
    pub fail: bool,
}

impl StaticSearch {
    pub fn with_videos(n: usize) -> Self {
        Self {
            records: (1..=n)
                .map(|i| {
                    let c = candidate(i);
                    RawVideoRecord {
                        url: c.resource.url,
                        video_id: c.resource.video_id,
                        title: c.resource.title,
                        channel: None,
                        published_at: None,
                        view_count: Some(2_000_000 - 100_000 * i as u64),
                        duration_secs: Some(900),
                    }
                })
                .collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            records: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl SearchSource for StaticSearch {
    async fn query(&self, _text: &str, limit: usize) -> Result<Vec<RawVideoRecord>> {
        if self.fail {
            return Err(FunnelError::collaborator("search", "quota exceeded"));
        }
        Ok(self.records.iter().take(limit).cloned().collect())
    }
}

pub struct StaticPage(pub String);

#[async_trait]
impl PageSource for StaticPage {
    async fn scrape(&self, _url: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

pub const SALES_PAGE: &str = r#"<html><head><title>Sleep Fix</title></head><body>
<h1>Fall Asleep in 10 Minutes</h1>
<p class="subheadline">The simple nightly routine</p>
<ul><li>Wind down faster</li><li>Wake up rested</li><li>No pills</li></ul>
<div class="price">$27</div>
<blockquote>Best purchase this year.</blockquote>
<div class="faq"><details><summary>Does it work?</summary><p>Yes.</p></details></div>
<a class="btn-primary" href="/buy">Get Instant Access</a>
</body></html>"#;

/// A sales page that never states a price.
pub const UNPRICED_PAGE: &str = r#"<html><head><title>Sleep Fix</title></head><body>
<h1>Fall Asleep in 10 Minutes</h1>
<ul><li>Wind down faster</li><li>Wake up rested</li></ul>
<a class="btn-primary" href="/join">Join the waitlist</a>
</body></html>"#;

pub const PRODUCT_MD: &str = "# Deep Sleep Protocol\n> Seven nights to better sleep.\n\n## Night 1\nDim the lights.\n\n## Night 2\nCut caffeine.\n";

pub fn product() -> ProductDocument {
    ProductDocument {
        topic: "focus".into(),
        format: "guide".into(),
        tone: "casual".into(),
        language: "english".into(),
        title: "Deep Focus".into(),
        summary: Some("One week to deep work.".into()),
        sections: vec![Section {
            title: "Day 1".into(),
            body: "Phone in another room.".into(),
        }],
        price: None,
    }
}
