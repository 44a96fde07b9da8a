// SPDX-License-Identifier: Apache-2.0

//! Execution engine for declarative, multi-step REST API workflows.
//!
//! A [`config::WorkflowConfig`] describes a DAG of HTTP steps: templated
//! URLs, headers, and payloads; per-step auth and retry policy; optional
//! submit-then-poll semantics for long-running remote jobs. [`engine::execute`]
//! resolves, plans, and runs that DAG, returning a [`state::WorkflowReport`].
//!
//! The engine never touches the filesystem or the process environment
//! directly — callers inject an [`env::EnvSource`] and, for cooperative
//! shutdown, a [`cancel::CancellationToken`].

pub mod auth;
pub mod cancel;
pub mod config;
pub mod duration;
pub mod engine;
pub mod env;
pub mod error;
pub mod http;
pub mod pathutil;
pub mod phase;
pub mod plan;
pub mod poll;
pub mod retry;
pub mod state;
pub mod step;
pub mod template;

pub use cancel::CancellationToken;
pub use config::WorkflowConfig;
pub use env::{EnvSource, MapEnvSource, ProcessEnvSource};
pub use error::{OrchestratorError, Result};
pub use state::{StepResult, StepStatus, WorkflowReport, WorkflowStatus};

/// Runs `config` to completion (or cancellation), following the module's
/// invocation contract: validate, resolve `${NAME}` references, plan the
/// DAG, execute each phase, assemble the report.
pub async fn execute(
    config: &WorkflowConfig,
    env: &dyn EnvSource,
    token: &CancellationToken,
) -> Result<WorkflowReport> {
    engine::execute(config, env, token).await
}
