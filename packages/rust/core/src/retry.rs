//! Stage execution wrapper: per-attempt timeout plus exponential backoff.
//!
//! Only errors for which [`FunnelError::is_retryable`] holds are retried;
//! everything else fails the stage immediately.

use std::future::Future;
use std::time::{Duration, Instant};

use funnelport_shared::{FunnelError, Result, Stage, StagePolicy};
use tracing::warn;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Result of running one stage, with bookkeeping for the run record.
#[derive(Debug)]
pub struct StageOutcome<T> {
    pub result: Result<T>,
    pub attempts: u32,
    pub elapsed: Duration,
}

fn backoff_for(policy: &StagePolicy, retry: u32) -> Duration {
    policy
        .backoff
        .saturating_mul(1u32 << retry.min(16))
        .min(MAX_BACKOFF)
}

/// Run `operation` under `policy`: at most `1 + policy.retries` attempts,
/// each bounded by `policy.timeout`.
///
/// A timed-out attempt counts as a retryable collaborator failure.
pub async fn run_stage<T, F, Fut>(stage: Stage, policy: &StagePolicy, mut operation: F) -> StageOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let result = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(FunnelError::collaborator(
                format!("{stage} stage"),
                format!("timed out after {}s", policy.timeout.as_secs()),
            )),
        };

        let err = match result {
            Ok(value) => {
                return StageOutcome {
                    result: Ok(value),
                    attempts,
                    elapsed: start.elapsed(),
                };
            }
            Err(err) => err,
        };

        let retry = attempts - 1;
        if !err.is_retryable() || retry >= policy.retries {
            return StageOutcome {
                result: Err(err),
                attempts,
                elapsed: start.elapsed(),
            };
        }

        let delay = backoff_for(policy, retry);
        warn!(
            %stage,
            attempt = attempts,
            max_retries = policy.retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "stage failed with a transient error, retrying after backoff"
        );
        tokio::time::sleep(delay).await;
    }
}
