// SPDX-License-Identifier: Apache-2.0

//! Retry driver: runs an attempt-producing closure up to
//! `limit + 1` times, sleeping the configured backoff between attempts and
//! bailing out immediately on a non-retryable outcome or cancellation.

use crate::cancel::{sleep_cancellable, CancellationToken};
use crate::config::RetryConfig;
use crate::error::{OrchestratorError, Result};
use crate::http::Outcome;
use std::future::Future;

/// Drives `attempt` (one HTTP call per invocation) through the retry policy
/// in `retry`. `attempt` is called with the 1-indexed attempt number.
///
/// Returns the successful value and the number of attempts made, or the
/// terminal error (the last retryable error once attempts are exhausted,
/// or the first non-retryable error).
pub async fn run<F, Fut>(retry: &RetryConfig, token: &CancellationToken, mut attempt: F) -> Result<(serde_json::Value, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome>,
{
    let max_attempts = retry.limit + 1;
    let mut last_err: Option<OrchestratorError> = None;

    for n in 1..=max_attempts {
        if token.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        // Race the attempt itself against cancellation: a sibling step's
        // fatal failure must abort an in-flight request, not just skip the
        // next retry iteration (spec §5: "in-flight requests abort").
        let outcome = tokio::select! {
            outcome = attempt(n) => outcome,
            _ = token.cancelled() => return Err(OrchestratorError::Cancelled),
        };

        match outcome {
            Outcome::Success(value) => return Ok((value, n)),
            Outcome::NonRetryable(e) => return Err(e),
            Outcome::Retryable(e) => {
                last_err = Some(e);
                if n < max_attempts {
                    let delay = retry.delay_for_attempt(n)?;
                    sleep_cancellable(delay, token).await?;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| OrchestratorError::network("retry loop produced no attempts")))
}
