//! Shared types, error model, and configuration for funnelport.
//!
//! This crate is the foundation depended on by all other funnelport crates.
//! It provides:
//! - [`FunnelError`]: the unified error type
//! - Domain types ([`CandidateResource`], [`ProductDocument`], [`FunnelBlueprint`], [`RunId`])
//! - Run records ([`RunRecord`]) persisted as `run.json`
//! - Locale profiles ([`LocaleTable`], [`LocaleProfile`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod locale;
pub mod record;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, DiscoveryConfig, FetchConfig, GenerationConfig, OpenRouterConfig,
    RunConfig, ScoringConfig, ScoringWeights, ScrapeConfig, SearchConfig, StagePolicies,
    StagePolicy, TranscriptsConfig, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, read_api_key, validate_config,
};
pub use error::{FunnelError, Result};
pub use locale::{Formality, LocaleOverride, LocaleProfile, LocaleTable, PRICE_BASE_CURRENCY};
pub use record::{
    ArtifactEntry, FailureReport, MarketAnalysis, RunRecord, Saturation, StageEntry, StageError,
};
pub use types::{
    CURRENT_SCHEMA_VERSION, CandidateResource, CorpusEntry, FaqEntry, FunnelBlueprint,
    FunnelStructure, Price, ProductDocument, RankedCandidate, ResearchCorpus, RunId, RunState,
    Section, Stage, StageStatus, Workflow,
};
