//! Linear retry for mandatory stages.

use super::observer::PipelineObserver;
use crate::config::RetryPolicy;
use crate::error::{Result, ScoutError, StageError};
use crate::types::StageKind;
use std::future::Future;

/// Run `operation` until it succeeds, the error is not retryable, or the
/// policy's attempts are used up.
///
/// The delay before retry `n` is `base_delay * n`. Whatever the last error
/// was, it comes back wrapped in [`StageError::Exhausted`] naming the stage.
pub async fn with_retry<F, Fut, T>(
    stage: StageKind,
    policy: &RetryPolicy,
    observer: &dyn PipelineObserver,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    stage = %stage,
                    attempt,
                    max = max_attempts,
                    error = %e,
                    "Stage attempt failed"
                );
                if !e.is_retryable() || attempt >= max_attempts {
                    return Err(exhausted(stage, attempt, e));
                }
                let delay = policy.delay_for(attempt);
                observer.on_retry(stage, attempt, delay, &e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn exhausted(stage: StageKind, attempts: u32, source: ScoutError) -> ScoutError {
    StageError::Exhausted {
        stage,
        attempts,
        source: Box::new(source),
    }
    .into()
}
