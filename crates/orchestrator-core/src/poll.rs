// SPDX-License-Identifier: Apache-2.0

//! Long-poll sub-protocol: after a step submits a remote job, repeatedly
//! GETs a status endpoint until `completion_field` matches one of
//! `completion_values`, one of `failure_values` is seen, or `max_attempts`
//! (a *semantic* budget — transient network hiccups within one poll attempt
//! are retried against the step's own retry policy and do not consume it)
//! is exhausted.

use crate::cancel::{sleep_cancellable, CancellationToken};
use crate::config::{PollConfig, RetryConfig};
use crate::error::{OrchestratorError, Result};
use crate::http;
use crate::pathutil::get_path;
use crate::retry;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub struct PollOutcome {
    pub value: Value,
    pub attempts: usize,
}

/// Polls `endpoint_url` (already fully rendered — any `{{ }}` reference to
/// the submission response must be resolved by the caller before this is
/// invoked) until completion, failure, or attempt exhaustion. Each
/// individual poll GET is retried against `retry` — the step's own retry
/// policy — so a dropped connection inside one poll doesn't consume a unit
/// of `poll_cfg.max_attempts` (spec §4.6: that budget counts semantic polls,
/// not network blips).
pub async fn poll(
    client: &Client,
    endpoint_url: &str,
    headers: &HashMap<String, String>,
    poll_cfg: &PollConfig,
    retry: &RetryConfig,
    attempt_timeout: Duration,
    token: &CancellationToken,
) -> Result<PollOutcome> {
    let interval = Duration::from_millis(poll_cfg.interval_ms()?);

    for attempt in 1..=poll_cfg.max_attempts {
        if token.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let (value, _) = retry::run(retry, token, |_n| {
            http::execute(client, crate::config::Method::Get, endpoint_url, headers, None, attempt_timeout)
        })
        .await?;

        let field = get_path(&value, &poll_cfg.completion_field);

        if let Some(field) = &field {
            if poll_cfg.failure_values.iter().any(|v| v == field) {
                return Err(OrchestratorError::RemoteJobFailure(format!(
                    "job reported failure value {field} at '{}'",
                    poll_cfg.completion_field
                )));
            }
            if poll_cfg.completion_values.iter().any(|v| v == field) {
                let result = match &poll_cfg.result_field {
                    Some(path) => get_path(&value, path).unwrap_or(Value::Null),
                    None => value,
                };
                return Ok(PollOutcome { value: result, attempts: attempt });
            }
        }

        if attempt < poll_cfg.max_attempts {
            sleep_cancellable(interval, token).await?;
        }
    }

    Err(OrchestratorError::PollTimeout(poll_cfg.max_attempts))
}

/// Renders a poll endpoint template against a context that additionally
/// exposes the just-completed submission response under `submission`, so a
/// step can write `poll.endpoint: "/jobs/{{ submission.job_id }}/status"`.
pub fn render_poll_context(context: &Value, submission: &Value) -> Value {
    let mut ctx = context.clone();
    if let Value::Object(map) = &mut ctx {
        map.insert("submission".to_string(), submission.clone());
    }
    ctx
}
