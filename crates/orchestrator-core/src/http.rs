// SPDX-License-Identifier: Apache-2.0

//! Single HTTP attempt executor: builds one request, classifies the
//! response into success/retryable/non-retryable, and applies
//! `extract_fields`/`response_transform`.
//!
//! One call here is one *attempt*; looping across attempts with backoff is
//! [`crate::retry`]'s job.

use crate::config::Method;
use crate::error::{OrchestratorError, Result};
use crate::pathutil::get_path;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// A response body larger than this is rejected rather than buffered in
/// full; guards against an unbounded remote response exhausting memory.
pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// The outcome of one HTTP attempt, already sorted into the three buckets
/// [`crate::retry`] cares about.
pub enum Outcome {
    Success(Value),
    Retryable(OrchestratorError),
    NonRetryable(OrchestratorError),
}

/// Issues one HTTP request and classifies its outcome.
///
/// - 2xx: success. A JSON body is used as-is; a non-JSON body is wrapped as
///   `{"text": "<body>"}` so downstream `extract_fields`/templates still
///   have something to address.
/// - 408, 425, 429, 5xx: retryable.
/// - other 4xx: non-retryable.
/// - connection/timeout/DNS failures: retryable (no status to classify on).
pub async fn execute(
    client: &Client,
    method: Method,
    url: &str,
    headers: &HashMap<String, String>,
    body: Option<&Value>,
    timeout: Duration,
) -> Outcome {
    let mut request = client.request(method.as_reqwest(), url).timeout(timeout);
    for (key, value) in headers {
        request = request.header(key, value);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            return Outcome::Retryable(classify_transport_error(&e, timeout));
        }
    };

    let status = response.status();
    if status.is_success() {
        match read_body_as_json(response).await {
            Ok(v) => Outcome::Success(v),
            Err(e) => Outcome::Retryable(e),
        }
    } else {
        let code = status.as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let err = OrchestratorError::Http { status: code, message };
        if is_retryable_status(code) {
            Outcome::Retryable(err)
        } else {
            Outcome::NonRetryable(err)
        }
    }
}

fn is_retryable_status(code: u16) -> bool {
    code == 408 || code == 425 || code == 429 || (500..600).contains(&code)
}

fn classify_transport_error(e: &reqwest::Error, attempt_timeout: Duration) -> OrchestratorError {
    if e.is_timeout() {
        OrchestratorError::Timeout(attempt_timeout)
    } else {
        OrchestratorError::network(e.to_string())
    }
}

async fn read_body_as_json(response: reqwest::Response) -> Result<Value> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| OrchestratorError::network(format!("failed to read response body: {e}")))?;
    if bytes.len() > MAX_BODY_BYTES {
        return Err(OrchestratorError::network(format!(
            "response body exceeds {MAX_BODY_BYTES} bytes"
        )));
    }
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(v) => Ok(v),
        Err(_) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            Ok(serde_json::json!({ "text": text }))
        }
    }
}

/// Applies `extract_fields` (name -> dotted path into `value`) and returns
/// the extracted map. A path that doesn't resolve is silently omitted
/// rather than failing the step.
pub fn extract_fields(value: &Value, fields: &HashMap<String, String>) -> HashMap<String, Value> {
    fields
        .iter()
        .filter_map(|(key, path)| get_path(value, path).map(|v| (key.clone(), v)))
        .collect()
}

/// Joins a base URL and an endpoint the way a browser would, normalizing
/// exactly one slash at the seam regardless of whether either side already
/// has one.
pub fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}
