//! Error types for funnelport.
//!
//! Library crates use [`FunnelError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all funnelport operations.
#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    /// A remote collaborator (search, transcripts, text generation, page scrape)
    /// failed or timed out. Retryable.
    #[error("{collaborator} unavailable: {message}")]
    CollaboratorUnavailable {
        collaborator: String,
        message: String,
    },

    /// Every discovery query variant failed.
    #[error("discovery unavailable: all {attempted} query variants failed")]
    DiscoveryUnavailable { attempted: usize },

    /// No transcript could be fetched for any candidate.
    #[error("insufficient research: 0 of {requested} transcripts retrieved")]
    InsufficientResearch { requested: usize },

    /// The generative collaborator returned output that does not parse.
    #[error("content generation failed: {message}")]
    ContentGenerationFailed { message: String },

    /// A required landing-page field could not be extracted.
    #[error("blueprint incomplete: missing {field}")]
    BlueprintIncomplete { field: String },

    /// Configuration loading or validation error (unknown locale, bad threshold, ...).
    #[error("config error: {message}")]
    Config { message: String },

    /// Data validation error (bad URL, inconsistent input, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The run was cancelled between stages.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FunnelError>;

impl FunnelError {
    /// Create a collaborator error for the named remote service.
    pub fn collaborator(collaborator: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator: collaborator.into(),
            message: msg.into(),
        }
    }

    /// Create a content-generation error from any displayable message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::ContentGenerationFailed {
            message: msg.into(),
        }
    }

    /// Create a blueprint error naming the missing field.
    pub fn incomplete(field: impl Into<String>) -> Self {
        Self::BlueprintIncomplete {
            field: field.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a stage wrapper may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable { .. })
    }

    /// Short machine-readable tag, stored in run records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            Self::DiscoveryUnavailable { .. } => "discovery_unavailable",
            Self::InsufficientResearch { .. } => "insufficient_research",
            Self::ContentGenerationFailed { .. } => "content_generation_failed",
            Self::BlueprintIncomplete { .. } => "blueprint_incomplete",
            Self::Config { .. } => "configuration_error",
            Self::Validation { .. } => "validation_error",
            Self::Storage(_) => "storage_error",
            Self::Io { .. } => "io_error",
            Self::Cancelled => "cancelled",
        }
    }
}
