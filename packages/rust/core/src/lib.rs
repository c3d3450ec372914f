//! Pipeline stages and orchestration for funnelport.
//!
//! [`orchestrator::Orchestrator`] drives a run record through the
//! DISCOVER, FETCH, GENERATE, EXTRACT, TRANSLATE and ASSEMBLE stages, using
//! the collaborator traits in [`collaborators`] and the discovery and funnel
//! crates. Market analysis in [`market`] is pure.

pub mod assembler;
pub mod collaborators;
pub mod fetch;
pub mod generator;
pub mod market;
pub mod orchestrator;
pub mod progress;
pub mod recreate;
pub mod retry;
pub mod translator;

#[cfg(test)]
pub(crate) mod testing;

pub use collaborators::{
    CachedTextGenerator, CachedTranscriptSource, HttpTranscriptSource, OpenRouterClient,
    TextGenerator, TranscriptSource,
};
pub use orchestrator::{
    CloneRequest, Collaborators, FullRequest, MarketRequest, Orchestrator, ResearchRequest,
    RunOutcome,
};
pub use progress::{ProgressReporter, SilentProgress};
