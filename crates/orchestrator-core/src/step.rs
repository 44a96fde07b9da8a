// SPDX-License-Identifier: Apache-2.0

//! Step runner: composes the template renderer, authenticator, HTTP
//! executor, retry driver, and poller into the execution of one configured
//! step against the current [`WorkflowState`].

use crate::auth;
use crate::cancel::CancellationToken;
use crate::config::{AuthConfig, StepConfig, WorkflowConfig};
use crate::env::EnvSource;
use crate::error::{ErrorDetail, OrchestratorError, Result};
use crate::http::{self, Outcome};
use crate::poll;
use crate::retry;
use crate::state::{StepResult, WorkflowState};
use crate::template;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Runs one step to completion (including its poll sub-protocol, if any)
/// and returns its [`StepResult`].
///
/// Returns `Err` only for a hard failure that must abort the enclosing
/// phase — a `continue_on_error` failure is folded into a `Skipped`
/// `StepResult` instead of an `Err`.
pub async fn run_step(
    client: &Client,
    workflow: &WorkflowConfig,
    step: &StepConfig,
    phase_index: usize,
    state: &WorkflowState,
    env: &dyn EnvSource,
    token: &CancellationToken,
) -> Result<StepResult> {
    let started_at = Utc::now();
    let context = state.render_context(env, started_at);
    tracing::info!(step = %step.name, phase = phase_index, "executing step");

    match execute_step(client, workflow, step, &context, token).await {
        Ok((value, attempts)) => {
            let ended_at = Utc::now();
            tracing::info!(step = %step.name, phase = phase_index, attempts, duration_ms = (ended_at - started_at).num_milliseconds(), "step completed successfully");
            Ok(StepResult::success(step.name.clone(), attempts, started_at, ended_at, value))
        }
        Err((err, attempts)) => {
            if matches!(err, OrchestratorError::Cancelled) {
                tracing::warn!(step = %step.name, phase = phase_index, "step cancelled");
                return Err(err);
            }
            let ended_at = Utc::now();
            let detail = ErrorDetail::from_error(&step.name, phase_index, attempts, &err);
            if step.continue_on_error {
                tracing::warn!(step = %step.name, phase = phase_index, attempts, error = %err, "step failed, continuing per continue_on_error");
                Ok(StepResult::skipped(step.name.clone(), attempts, started_at, ended_at, detail))
            } else {
                tracing::error!(step = %step.name, phase = phase_index, attempts, error = %err, "step failed");
                Err(OrchestratorError::step_failure(step.name.clone(), err))
            }
        }
    }
}

const NO_AUTH: AuthConfig = AuthConfig::None;

fn effective_auth<'a>(workflow: &'a WorkflowConfig, step: &'a StepConfig) -> &'a AuthConfig {
    step.auth.as_ref().or(workflow.auth.as_ref()).unwrap_or(&NO_AUTH)
}

fn merge_headers(
    step: &StepConfig,
    context: &Value,
    auth_cfg: &AuthConfig,
) -> Result<std::collections::HashMap<String, String>> {
    let mut headers = std::collections::HashMap::new();
    for (key, value) in &step.headers {
        headers.insert(key.clone(), template::render(value, context)?);
    }
    // Auth-produced headers win over step-declared headers with the same name.
    headers.extend(auth::build_headers(auth_cfg)?);
    tracing::debug!(step = %step.name, headers = ?auth::redact_headers(&headers), "built request headers");
    Ok(headers)
}

/// `retry.timeout`, when set, overrides the step's own `timeout` as the
/// per-attempt deadline — the poll loop's individual GETs use the same
/// value (spec §3: retry carries an "optional per-attempt timeout").
fn effective_attempt_timeout_ms(step: &StepConfig) -> Result<u64> {
    match &step.retry.timeout {
        Some(t) => crate::duration::parse_duration(t),
        None => step.timeout_ms(),
    }
}

fn build_payload(step: &StepConfig, context: &Value) -> Result<Option<Value>> {
    match (&step.payload, &step.payload_template) {
        (Some(p), None) => Ok(Some(p.clone())),
        (None, Some(tpl)) => {
            let rendered = template::render(tpl, context)?;
            serde_json::from_str(&rendered)
                .map(Some)
                .map_err(|e| OrchestratorError::template(format!("payload_template did not render valid JSON: {e}")))
        }
        (None, None) => Ok(None),
        (Some(_), Some(_)) => unreachable!("WorkflowConfig::validate rejects payload + payload_template together"),
    }
}

fn apply_response_transform(step: &StepConfig, context: &Value, value: Value) -> Result<Value> {
    let Some(transform) = &step.response_transform else {
        return Ok(value);
    };
    let mut ctx = context.clone();
    if let Value::Object(map) = &mut ctx {
        map.insert("response".to_string(), value);
    }
    let rendered = template::render(transform, &ctx)?;
    Ok(serde_json::from_str(&rendered).unwrap_or(Value::String(rendered)))
}

/// Resolves each `extract_fields` dotted path against `value` (via
/// [`http::extract_fields`]) and merges the results in as top-level keys,
/// overwriting any existing key of the same name (spec §9: extraction wins
/// on collision). A missing path simply does not contribute a key. If
/// `value` is not a JSON object (e.g. a scalar selected by `result_field`),
/// the extracted keys are merged into a wrapper object alongside the
/// original scalar under `value`.
fn apply_extract_fields(step: &StepConfig, value: Value) -> Value {
    if step.extract_fields.is_empty() {
        return value;
    }
    let extracted = http::extract_fields(&value, &step.extract_fields);
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert("value".to_string(), other);
            wrapper
        }
    };
    map.extend(extracted);
    Value::Object(map)
}

/// Runs the submission request and, if configured, the follow-up poll.
/// Returns the combined attempt count (submission attempts plus poll
/// attempts) alongside the final value on success.
async fn execute_step(
    client: &Client,
    workflow: &WorkflowConfig,
    step: &StepConfig,
    context: &Value,
    token: &CancellationToken,
) -> std::result::Result<(Value, u32), (OrchestratorError, u32)> {
    let auth_cfg = effective_auth(workflow, step).clone();
    let headers = merge_headers(step, context, &auth_cfg).map_err(|e| (e, 0))?;
    let rendered_endpoint = template::render(&step.endpoint, context).map_err(|e| (e, 0))?;
    let base = step.api_base.as_deref().unwrap_or(&workflow.api_base);
    let url = http::join_url(base, &rendered_endpoint);
    let payload = build_payload(step, context).map_err(|e| (e, 0))?;
    let timeout = Duration::from_millis(effective_attempt_timeout_ms(step).map_err(|e| (e, 0))?);

    let method = step.method;
    let (submission, submit_attempts) = retry::run(&step.retry, token, |_n| {
        http::execute(client, method, &url, &headers, payload.as_ref(), timeout)
    })
    .await
    .map_err(|e| (e, step.retry.limit + 1))?;

    let (final_value, poll_attempts) = match &step.poll {
        None => (submission, 0usize),
        Some(poll_cfg) => {
            let poll_ctx = poll::render_poll_context(context, &submission);
            let rendered_poll_endpoint =
                template::render(&poll_cfg.endpoint, &poll_ctx).map_err(|e| (e, submit_attempts))?;
            let poll_url = http::join_url(base, &rendered_poll_endpoint);
            let outcome = poll::poll(client, &poll_url, &headers, poll_cfg, &step.retry, timeout, token)
                .await
                .map_err(|e| (e, submit_attempts))?;
            (outcome.value, outcome.attempts)
        }
    };

    let transformed = apply_response_transform(step, context, final_value).map_err(|e| (e, submit_attempts))?;
    let extracted = apply_extract_fields(step, transformed);
    Ok((extracted, submit_attempts + poll_attempts as u32))
}
