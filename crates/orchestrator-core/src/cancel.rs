// SPDX-License-Identifier: Apache-2.0

//! Cooperative cancellation. The engine hands one
//! [`CancellationToken`] down through phases, groups, and steps; any
//! in-flight sleep or request races it instead of running to completion.

use crate::error::{OrchestratorError, Result};
use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

/// Sleeps for `duration`, returning early with [`OrchestratorError::Cancelled`]
/// if `token` fires first. Used for retry backoff and poll intervals so a
/// sibling step's fatal failure doesn't leave the workflow waiting out a
/// full exponential delay before noticing.
pub async fn sleep_cancellable(duration: Duration, token: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = token.cancelled() => Err(OrchestratorError::Cancelled),
    }
}
