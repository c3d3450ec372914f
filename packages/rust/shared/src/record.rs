//! The run record persisted as `run.json`, plus market analysis results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FunnelError;
use crate::types::{
    CURRENT_SCHEMA_VERSION, FunnelBlueprint, ProductDocument, RankedCandidate, ResearchCorpus,
    RunId, RunState, Stage, StageStatus, Workflow,
};

// ---------------------------------------------------------------------------
// Market analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Saturation {
    Low,
    Medium,
    High,
    Unknown,
}

impl Saturation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Unknown => "unknown",
        }
    }
}

/// Opportunity assessment of one niche in one language market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub niche: String,
    pub language: String,
    /// ISO 639-1 code, absent for markets outside the built-in table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub countries: Vec<String>,
    pub saturation: Saturation,
    /// 1 to 10.
    pub opportunity_score: u8,
    pub research_steps: Vec<String>,
    pub tools: Vec<String>,
}

// ---------------------------------------------------------------------------
// Run record
// ---------------------------------------------------------------------------

/// Error captured on a failed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    /// Machine tag from [`FunnelError::kind`].
    pub kind: String,
    pub message: String,
}

impl From<&FunnelError> for StageError {
    fn from(e: &FunnelError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEntry {
    pub stage: Stage,
    pub status: StageStatus,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
}

/// A file written into the run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Path relative to the run directory.
    pub path: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// What went wrong, and what is still usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub cause: StageError,
    pub usable_artifacts: Vec<String>,
}

/// Everything a run has produced so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub schema_version: u32,
    pub id: RunId,
    pub workflow: Workflow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_url: Option<String>,
    /// Locale tag of the target market.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<RankedCandidate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus: Option<ResearchCorpus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<ProductDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub localized_products: Vec<ProductDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_blueprint: Option<FunnelBlueprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapted_blueprint: Option<FunnelBlueprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_blueprint: Option<FunnelBlueprint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub testimonials: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub market: Vec<MarketAnalysis>,

    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

impl RunRecord {
    /// A fresh record in `INIT` with one pending entry per planned stage.
    pub fn new(id: RunId, workflow: Workflow, started_at: DateTime<Utc>) -> Self {
        let stages = workflow
            .stages()
            .iter()
            .map(|&stage| StageEntry {
                stage,
                status: StageStatus::Pending,
                attempts: 0,
                elapsed_ms: 0,
                error: None,
            })
            .collect();

        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            id,
            workflow,
            topic: None,
            funnel_url: None,
            target: None,
            state: RunState::Init,
            started_at,
            finished_at: None,
            stages,
            candidates: None,
            corpus: None,
            product: None,
            localized_products: Vec::new(),
            source_blueprint: None,
            adapted_blueprint: None,
            localized_blueprint: None,
            testimonials: Vec::new(),
            market: Vec::new(),
            artifacts: Vec::new(),
            failure: None,
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageEntry> {
        self.stages.iter().find(|e| e.stage == stage)
    }

    pub fn stage_mut(&mut self, stage: Stage) -> Option<&mut StageEntry> {
        self.stages.iter_mut().find(|e| e.stage == stage)
    }

    /// Record (or replace) a written artifact, keeping the list sorted by path.
    pub fn record_artifact(&mut self, entry: ArtifactEntry) {
        self.artifacts.retain(|a| a.path != entry.path);
        let pos = self
            .artifacts
            .partition_point(|a| a.path.as_str() < entry.path.as_str());
        self.artifacts.insert(pos, entry);
    }

    pub fn artifact_paths(&self) -> Vec<String> {
        self.artifacts.iter().map(|a| a.path.clone()).collect()
    }
}
