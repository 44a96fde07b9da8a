// SPDX-License-Identifier: Apache-2.0

//! Top-level engine: validates and resolves a [`WorkflowConfig`],
//! plans it, runs each phase to a barrier, and assembles the final
//! [`WorkflowReport`]. Also fires the best-effort monitoring webhook.

use crate::cancel::CancellationToken;
use crate::config::{MonitoringConfig, WorkflowConfig};
use crate::env::{resolve_workflow_config, EnvSource, ResolutionPolicy};
use crate::error::{OrchestratorError, Result};
use crate::phase;
use crate::plan;
use crate::state::{WorkflowReport, WorkflowState, WorkflowStatus};
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

/// Webhook delivery gets a short, fixed budget of its own; it must never
/// hold up workflow completion reporting.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct WorkflowEngine {
    client: Client,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub async fn execute(
        &self,
        config: &WorkflowConfig,
        env: &dyn EnvSource,
        token: &CancellationToken,
    ) -> Result<WorkflowReport> {
        config.validate()?;
        let resolved = resolve_workflow_config(config, env, ResolutionPolicy::Strict)?;
        let execution_plan = plan::plan(&resolved)?;

        let started_at = Utc::now();
        let state = WorkflowState::new(resolved.variables.clone(), started_at);
        let run_id = state.run_id();
        tracing::info!(run_id = %run_id, workflow = %resolved.name, phases = execution_plan.len(), "starting workflow run");

        let mut status = WorkflowStatus::Success;
        for (phase_index, phase) in execution_plan.iter().enumerate() {
            if token.is_cancelled() {
                status = WorkflowStatus::Cancelled;
                break;
            }
            match phase::run_phase(&self.client, &resolved, phase, phase_index, &state, env, token).await {
                Ok(()) => {}
                Err(OrchestratorError::Cancelled) => {
                    status = WorkflowStatus::Cancelled;
                    break;
                }
                Err(e) => {
                    tracing::warn!(run_id = %run_id, workflow = %resolved.name, error = %e, "workflow aborted by step failure");
                    status = WorkflowStatus::Failed;
                    break;
                }
            }
        }

        let ended_at = Utc::now();
        let report = state.into_report(resolved.name.clone(), status, ended_at);

        if let Some(monitoring) = &resolved.monitoring {
            self.report_long_running_steps(monitoring, &report);
            self.send_webhook(monitoring, &report).await;
        }

        Ok(report)
    }

    fn report_long_running_steps(&self, monitoring: &MonitoringConfig, report: &WorkflowReport) {
        let Some(threshold) = monitoring.long_duration_threshold_ms else {
            return;
        };
        for step in report.step_results.values() {
            if step.duration_ms > threshold {
                tracing::warn!(
                    step = %step.name,
                    duration_ms = step.duration_ms,
                    threshold_ms = threshold,
                    "step exceeded long_duration_threshold_ms"
                );
            }
        }
    }

    /// Posts a summary of `report` to the configured webhook. Never fails
    /// the workflow: delivery errors are logged and swallowed.
    async fn send_webhook(&self, monitoring: &MonitoringConfig, report: &WorkflowReport) {
        let should_notify = if monitoring.failure_alert {
            !matches!(report.status, WorkflowStatus::Success)
        } else {
            true
        };
        if !should_notify {
            return;
        }

        let payload = serde_json::json!({
            "workflow_name": report.workflow_name,
            "status": match report.status {
                WorkflowStatus::Success => "completed",
                WorkflowStatus::Failed | WorkflowStatus::Cancelled => "failed",
            },
            "timestamp": report.ended_at,
            "summary": {
                "run_id": report.run_id,
                "total_duration_ms": report.total_duration_ms,
                "total_steps": report.total_steps,
                "successful_steps": report.successful_steps,
                "failed_steps": report.failed_steps,
                "skipped_steps": report.skipped_steps,
            },
        });

        let result = self
            .client
            .post(&monitoring.webhook_url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(webhook_url = %monitoring.webhook_url, error = %e, "monitoring webhook delivery failed");
        }
    }
}

/// Convenience entry point matching the invocation contract: resolve, plan,
/// run, report.
pub async fn execute(config: &WorkflowConfig, env: &dyn EnvSource, token: &CancellationToken) -> Result<WorkflowReport> {
    WorkflowEngine::new().execute(config, env, token).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, BackoffStrategy, Method, RetryConfig, StepConfig};
    use crate::env::MapEnvSource;
    use std::collections::{HashMap, HashSet};

    fn step(name: &str, endpoint: &str, deps: &[&str]) -> StepConfig {
        StepConfig {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            method: Method::Get,
            api_base: None,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            parallel_group: None,
            max_parallel: None,
            headers: HashMap::new(),
            payload: None,
            payload_template: None,
            auth: None,
            retry: RetryConfig { limit: 0, delay: "0s".into(), backoff: BackoffStrategy::Constant, timeout: None },
            timeout: "5s".to_string(),
            continue_on_error: false,
            extract_fields: HashMap::new(),
            response_transform: None,
            output_key: None,
            poll: None,
        }
    }

    #[tokio::test]
    async fn linear_workflow_reports_success() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/a").with_status(200).with_body("{}").create_async().await;
        server.mock("GET", "/b").with_status(200).with_body("{}").create_async().await;

        let config = WorkflowConfig {
            name: "linear".to_string(),
            api_base: server.url(),
            auth: Some(AuthConfig::None),
            variables: HashMap::new(),
            steps: vec![step("a", "/a", &[]), step("b", "/b", &["a"])],
            monitoring: None,
        };

        let env = MapEnvSource::default();
        let token = CancellationToken::new();
        let report = execute(&config, &env, &token).await.unwrap();
        assert_eq!(report.status, WorkflowStatus::Success);
        assert_eq!(report.step_results.len(), 2);
    }

    #[tokio::test]
    async fn failing_step_marks_workflow_failed() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/a").with_status(500).create_async().await;

        let config = WorkflowConfig {
            name: "fails".to_string(),
            api_base: server.url(),
            auth: Some(AuthConfig::None),
            variables: HashMap::new(),
            steps: vec![step("a", "/a", &[])],
            monitoring: None,
        };

        let env = MapEnvSource::default();
        let token = CancellationToken::new();
        let report = execute(&config, &env, &token).await.unwrap();
        assert_eq!(report.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_any_request() {
        let config = WorkflowConfig {
            name: "".to_string(),
            api_base: "https://api.example.com".to_string(),
            auth: None,
            variables: HashMap::new(),
            steps: vec![],
            monitoring: None,
        };
        let env = MapEnvSource::default();
        let token = CancellationToken::new();
        assert!(execute(&config, &env, &token).await.is_err());
    }

    #[tokio::test]
    async fn pre_cancelled_token_reports_cancelled() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/a").with_status(200).with_body("{}").create_async().await;

        let config = WorkflowConfig {
            name: "wf".to_string(),
            api_base: server.url(),
            auth: Some(AuthConfig::None),
            variables: HashMap::new(),
            steps: vec![step("a", "/a", &[])],
            monitoring: None,
        };
        let env = MapEnvSource::default();
        let token = CancellationToken::new();
        token.cancel();
        let report = execute(&config, &env, &token).await.unwrap();
        assert_eq!(report.status, WorkflowStatus::Cancelled);
    }
}
