//! Core domain types for funnelport runs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FunnelError, Result};

/// Current schema version for `run.json`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

/// A source video found by discovery or supplied by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResource {
    /// Canonical watch URL; the identity used for deduplication.
    pub url: String,
    /// Platform video id, when the URL carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Title or channel matched the authority lexicon.
    #[serde(default)]
    pub is_expert_source: bool,
}

/// A candidate with its quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub resource: CandidateResource,
    pub score: f64,
    /// Supplied explicitly instead of discovered.
    #[serde(default)]
    pub manual: bool,
}

/// One corpus slot: a candidate and its transcript, if one was retrieved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub candidate: RankedCandidate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Ordered research material; absent transcripts are kept as markers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchCorpus {
    pub entries: Vec<CorpusEntry>,
}

impl ResearchCorpus {
    /// Entries with a transcript, in corpus order.
    pub fn usable(&self) -> impl Iterator<Item = (&RankedCandidate, &str)> {
        self.entries
            .iter()
            .filter_map(|e| e.transcript.as_deref().map(|t| (&e.candidate, t)))
    }

    pub fn usable_count(&self) -> usize {
        self.usable().count()
    }

    pub fn absent_count(&self) -> usize {
        self.entries.len() - self.usable_count()
    }
}

// ---------------------------------------------------------------------------
// Product document
// ---------------------------------------------------------------------------

/// A price with an exact decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub amount: Decimal,
    /// ISO 4217 code.
    pub currency: String,
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub body: String,
}

/// Written product content, one per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub topic: String,
    /// Format tag, e.g. "7-day protocol".
    pub format: String,
    pub tone: String,
    /// `english` for generated content, a locale tag for translations.
    pub language: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
}

impl ProductDocument {
    /// A document is complete with a title and at least one titled section.
    pub fn check_complete(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(FunnelError::validation("product document has no title"));
        }
        if self.sections.is_empty() {
            return Err(FunnelError::validation("product document has no sections"));
        }
        if let Some(i) = self.sections.iter().position(|s| s.title.trim().is_empty()) {
            return Err(FunnelError::validation(format!(
                "product section {} has no title",
                i + 1
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Funnel blueprint
// ---------------------------------------------------------------------------

/// Page layout classification derived from extracted components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FunnelStructure {
    LongFormSalesPage,
    ShortFormSalesPage,
    StandardSalesPage,
}

impl FunnelStructure {
    /// Classify a priced page from its bullet count and testimonial presence.
    pub fn classify(bullets: usize, has_testimonials: bool) -> Self {
        match (bullets, has_testimonials) {
            (n, true) if n > 5 => Self::LongFormSalesPage,
            (n, _) if n <= 5 => Self::ShortFormSalesPage,
            _ => Self::StandardSalesPage,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LongFormSalesPage => "long-form-sales-page",
            Self::ShortFormSalesPage => "short-form-sales-page",
            Self::StandardSalesPage => "standard-sales-page",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
}

/// Structured landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelBlueprint {
    pub source_url: String,
    /// `english` for scraped or recreated copy, a locale tag once translated.
    pub language: String,
    /// Topic the copy is written for, once recreated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub headline: String,
    #[serde(default)]
    pub subheadline: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    pub price: Price,
    #[serde(default)]
    pub cta: String,
    #[serde(default)]
    pub testimonials: Vec<String>,
    #[serde(default)]
    pub faq: Vec<FaqEntry>,
    pub structure: FunnelStructure,
}

// ---------------------------------------------------------------------------
// Pipeline bookkeeping
// ---------------------------------------------------------------------------

/// Named workflow plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    Full,
    Clone,
    Research,
    Market,
}

impl Workflow {
    /// Stages executed, in order.
    pub fn stages(self) -> &'static [Stage] {
        use Stage::*;
        match self {
            Self::Full => &[Discover, Fetch, Generate, Extract, Translate, Assemble],
            Self::Clone => &[Extract, Translate, Assemble],
            Self::Research => &[Discover, Fetch, Generate],
            Self::Market => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Clone => "clone",
            Self::Research => "research",
            Self::Market => "market",
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stages, in state-machine order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Discover,
    Fetch,
    Generate,
    Extract,
    Translate,
    Assemble,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discover => "DISCOVER",
            Self::Fetch => "FETCH",
            Self::Generate => "GENERATE",
            Self::Extract => "EXTRACT",
            Self::Translate => "TRANSLATE",
            Self::Assemble => "ASSEMBLE",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Done,
    Failed,
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "UPPERCASE")]
pub enum RunState {
    Init,
    Running(Stage),
    Done,
    Failed(Stage),
    /// Failed outside any stage, e.g. writing `run.json` at INIT.
    Aborted,
    Cancelled,
}

impl RunState {
    pub fn label(self) -> String {
        match self {
            Self::Init => "INIT".into(),
            Self::Running(s) => s.to_string(),
            Self::Done => "DONE".into(),
            Self::Failed(s) => format!("FAILED({s})"),
            Self::Aborted => "FAILED".into(),
            Self::Cancelled => "CANCELLED".into(),
        }
    }
}
