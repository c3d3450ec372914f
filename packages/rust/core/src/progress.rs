//! Progress callbacks for front ends.

use std::time::Duration;

use funnelport_shared::{RunState, Stage};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts.
    fn stage_started(&self, stage: Stage);
    /// Called when a stage ends, successfully or not.
    fn stage_finished(&self, stage: Stage, ok: bool, elapsed: Duration);
    /// Free-form status line.
    fn message(&self, text: &str);
    /// Called once with the terminal state.
    fn done(&self, state: RunState);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage, _ok: bool, _elapsed: Duration) {}
    fn message(&self, _text: &str) {}
    fn done(&self, _state: RunState) {}
}
