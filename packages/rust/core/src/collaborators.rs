//! Remote collaborators used by the pipeline stages.
//!
//! Each collaborator is a trait so stages can be driven by in-process mocks:
//! - [`TextGenerator`]: generative text (OpenRouter chat completions)
//! - [`TranscriptSource`]: transcript text per video
//!
//! Search and landing-page scrape live with their parsers in the discovery
//! and funnel crates. The `Cached*` decorators put the libSQL cache in front
//! of any implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use funnelport_shared::{FunnelError, Result};
use funnelport_storage::{CachedTranscript, Storage};

/// User-Agent string for collaborator requests.
const USER_AGENT: &str = concat!("funnelport/", env!("CARGO_PKG_VERSION"));

/// Generative-text backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Transcript backend. `Ok(None)` means the video has no usable transcript.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn get(&self, video_id: &str) -> Result<Option<String>>;
}

fn build_client(timeout: Duration, collaborator: &str) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| FunnelError::collaborator(collaborator, format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// OpenRouter
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions client pointed at OpenRouter.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, "generation")?,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len(), max_tokens))]
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let start = std::time::Instant::now();
        let request = ChatRequest {
            model: &self.model,
            max_tokens,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| FunnelError::collaborator("generation", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %truncate(&body, 300), "generation API error");
            return Err(FunnelError::collaborator(
                "generation",
                format!("HTTP {status}"),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| FunnelError::collaborator("generation", format!("invalid response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| FunnelError::collaborator("generation", "response has no choices"))?;

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            len = content.len(),
            "completion received"
        );
        Ok(content)
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Transcript service
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TranscriptResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Client for a transcript sidecar exposing `GET {base}/transcripts/{video_id}`.
///
/// `404` and `410` mean no transcript; any other failure is a collaborator error.
pub struct HttpTranscriptSource {
    client: Client,
    base_url: String,
    languages: String,
}

impl HttpTranscriptSource {
    pub fn new(base_url: &str, languages: &[String], timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, "transcripts")?,
            base_url: base_url.trim_end_matches('/').to_string(),
            languages: languages.join(","),
        })
    }
}

#[async_trait]
impl TranscriptSource for HttpTranscriptSource {
    #[instrument(skip(self))]
    async fn get(&self, video_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/transcripts/{video_id}", self.base_url))
            .query(&[("languages", self.languages.as_str())])
            .send()
            .await
            .map_err(|e| FunnelError::collaborator("transcripts", format!("{video_id}: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                debug!("no transcript");
                return Ok(None);
            }
            s if !s.is_success() => {
                return Err(FunnelError::collaborator(
                    "transcripts",
                    format!("{video_id}: HTTP {s}"),
                ));
            }
            _ => {}
        }

        let body: TranscriptResponse = response.json().await.map_err(|e| {
            FunnelError::collaborator("transcripts", format!("{video_id}: invalid response: {e}"))
        })?;
        Ok(body.text.filter(|t| !t.trim().is_empty()))
    }
}

// ---------------------------------------------------------------------------
// Cache decorators
// ---------------------------------------------------------------------------

/// Cache key for a completion.
pub fn prompt_hash(prompt: &str, max_tokens: u32, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(max_tokens.to_le_bytes());
    hasher.update(model.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// [`TextGenerator`] that answers repeated prompts from `completion_cache`.
pub struct CachedTextGenerator {
    inner: Arc<dyn TextGenerator>,
    storage: Arc<Storage>,
    model: String,
}

impl CachedTextGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, storage: Arc<Storage>, model: impl Into<String>) -> Self {
        Self {
            inner,
            storage,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for CachedTextGenerator {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let hash = prompt_hash(prompt, max_tokens, &self.model);
        if let Some(cached) = self.storage.get_completion(&hash, &self.model).await? {
            debug!(hash = %&hash[..12], "completion cache hit");
            return Ok(cached);
        }

        let text = self.inner.complete(prompt, max_tokens).await?;
        if let Err(e) = self.storage.set_completion(&hash, &self.model, &text).await {
            warn!(error = %e, "failed to cache completion");
        }
        Ok(text)
    }
}

/// [`TranscriptSource`] that remembers both transcripts and NotAvailable answers.
pub struct CachedTranscriptSource {
    inner: Arc<dyn TranscriptSource>,
    storage: Arc<Storage>,
}

impl CachedTranscriptSource {
    pub fn new(inner: Arc<dyn TranscriptSource>, storage: Arc<Storage>) -> Self {
        Self { inner, storage }
    }
}

#[async_trait]
impl TranscriptSource for CachedTranscriptSource {
    async fn get(&self, video_id: &str) -> Result<Option<String>> {
        match self.storage.get_transcript(video_id).await? {
            Some(CachedTranscript::Available(text)) => return Ok(Some(text)),
            Some(CachedTranscript::NotAvailable) => return Ok(None),
            None => {}
        }

        let answer = self.inner.get(video_id).await?;
        if let Err(e) = self.storage.set_transcript(video_id, answer.as_deref()).await {
            warn!(video_id, error = %e, "failed to cache transcript");
        }
        Ok(answer)
    }
}
