// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the workflow execution engine.
//!
//! Every variant maps to one of the wire-stable `kind` strings surfaced in a
//! `WorkflowReport`'s per-step error detail. Callers should match on
//! [`OrchestratorError::kind`] rather than the `Display` text, which is free
//! to change.

use std::time::Duration;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote job reported failure: {0}")]
    RemoteJobFailure(String),

    #[error("polling exceeded max_attempts ({0})")]
    PollTimeout(usize),

    #[error("cancelled")]
    Cancelled,

    #[error("step '{step}' failed: {source}")]
    StepFailure {
        step: String,
        #[source]
        source: Box<OrchestratorError>,
    },
}

impl OrchestratorError {
    /// The wire-stable taxonomy string for this error, stable across
    /// releases regardless of how the `Display` message text changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Template(_) => "TemplateError",
            Self::Auth(_) => "AuthError",
            Self::Http { .. } => "HttpError",
            Self::Network(_) => "NetworkError",
            Self::Timeout(_) => "Timeout",
            Self::RemoteJobFailure(_) => "RemoteJobFailure",
            Self::PollTimeout(_) => "PollTimeout",
            Self::Cancelled => "Cancelled",
            Self::StepFailure { .. } => "StepFailure",
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn step_failure(step: impl Into<String>, source: OrchestratorError) -> Self {
        Self::StepFailure {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// HTTP status code, when this error originated from a response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::StepFailure { source, .. } => source.http_status(),
            _ => None,
        }
    }
}

/// A normalized error record attached to a failed or skipped [`StepResult`](crate::state::StepResult).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    pub http_status: Option<u16>,
    pub attempts: u32,
    pub step: String,
    /// Index of the phase (0-based) the failing step was scheduled into.
    pub phase: usize,
}

impl ErrorDetail {
    pub fn from_error(step: &str, phase: usize, attempts: u32, err: &OrchestratorError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            http_status: err.http_status(),
            attempts,
            step: step.to_string(),
            phase,
        }
    }
}
