// SPDX-License-Identifier: Apache-2.0

//! Runtime state threaded through a single workflow execution: the shared
//! variable pool, per-step results, and the final [`WorkflowReport`].
//!
//! `WorkflowState` is shared behind an `Arc` across concurrently-running
//! steps within a parallel group, so its collections are lock-free
//! (`DashMap`) rather than requiring `&mut self`.

use crate::env::EnvSource;
use crate::error::ErrorDetail;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    /// `continue_on_error` swallowed a failure; downstream `depends_on`
    /// treats this the same as `Success`.
    Skipped,
}

impl StepStatus {
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Skipped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// The step's response body (post `response_transform`), present on
    /// success; `None` on failure.
    pub value: Option<Value>,
    pub error: Option<ErrorDetail>,
}

impl StepResult {
    pub fn success(name: impl Into<String>, attempts: u32, started_at: DateTime<Utc>, ended_at: DateTime<Utc>, value: Value) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Success,
            attempts,
            started_at,
            ended_at,
            duration_ms: duration_millis(started_at, ended_at),
            value: Some(value),
            error: None,
        }
    }

    pub fn skipped(name: impl Into<String>, attempts: u32, started_at: DateTime<Utc>, ended_at: DateTime<Utc>, error: ErrorDetail) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Skipped,
            attempts,
            started_at,
            ended_at,
            duration_ms: duration_millis(started_at, ended_at),
            value: None,
            error: Some(error),
        }
    }

    pub fn failure(name: impl Into<String>, attempts: u32, started_at: DateTime<Utc>, ended_at: DateTime<Utc>, error: ErrorDetail) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Failure,
            attempts,
            started_at,
            ended_at,
            duration_ms: duration_millis(started_at, ended_at),
            value: None,
            error: Some(error),
        }
    }
}

fn duration_millis(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u64 {
    (ended_at - started_at).num_milliseconds().max(0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    /// Correlates this report with tracing spans and the monitoring webhook
    /// payload; not part of the wire schema's required fields but additive.
    pub run_id: Uuid,
    pub workflow_name: String,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub total_steps: usize,
    pub successful_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub step_results: HashMap<String, StepResult>,
    pub final_variables: HashMap<String, Value>,
}

/// Shared execution state for one workflow run.
pub struct WorkflowState {
    run_id: Uuid,
    variables: DashMap<String, Value>,
    results: DashMap<String, StepResult>,
    started_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(variables: HashMap<String, Value>, started_at: DateTime<Utc>) -> Self {
        let map = DashMap::new();
        for (k, v) in variables {
            map.insert(k, v);
        }
        Self {
            run_id: Uuid::new_v4(),
            variables: map,
            results: DashMap::new(),
            started_at,
        }
    }

    /// Stable identifier for this run, surfaced in the final report and in
    /// the engine's tracing spans.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Records a step's outcome and, on success, binds its `output_key`
    /// (if set) into the shared variable pool. `extract_fields` is already
    /// folded into `result.value` by the step runner (spec §4.8 step 8);
    /// this only handles the separate `output_key` → `variables` binding
    /// (spec §4.8 step 9).
    pub fn record(&self, result: StepResult, output_key: Option<&str>) {
        if let Some(value) = &result.value {
            if let Some(key) = output_key {
                self.variables.insert(key.to_string(), value.clone());
            }
        }
        self.results.insert(result.name.clone(), result);
    }

    pub fn result(&self, name: &str) -> Option<StepResult> {
        self.results.get(name).map(|r| r.clone())
    }

    /// Whether `name` has completed in a way that satisfies a `depends_on`
    /// reference. A skipped dependency still satisfies downstream steps.
    pub fn satisfies(&self, name: &str) -> bool {
        self.results
            .get(name)
            .map(|r| r.status.satisfies_dependency())
            .unwrap_or(false)
    }

    pub fn has_any_failure(&self) -> bool {
        self.results.iter().any(|r| r.status == StepStatus::Failure)
    }

    /// Builds the `{variables, steps, env, now}` template context as it
    /// stands at the moment of the call.
    pub fn render_context(&self, env: &dyn EnvSource, now: DateTime<Utc>) -> Value {
        let variables: serde_json::Map<String, Value> =
            self.variables.iter().map(|e| (e.key().clone(), e.value().clone())).collect();

        let mut steps = serde_json::Map::new();
        for entry in self.results.iter() {
            let r = entry.value();
            steps.insert(
                r.name.clone(),
                serde_json::json!({
                    "status": r.status,
                    "value": r.value,
                    "attempts": r.attempts,
                }),
            );
        }

        let env_map: serde_json::Map<String, Value> =
            env.snapshot().into_iter().map(|(k, v)| (k, Value::String(v))).collect();

        serde_json::json!({
            "variables": Value::Object(variables),
            "steps": Value::Object(steps),
            "env": Value::Object(env_map),
            "now": now.to_rfc3339(),
        })
    }

    /// Consumes the state into the final report.
    pub fn into_report(self, workflow_name: String, status: WorkflowStatus, ended_at: DateTime<Utc>) -> WorkflowReport {
        let step_results: HashMap<String, StepResult> =
            self.results.into_iter().collect();
        let final_variables: HashMap<String, Value> = self.variables.into_iter().collect();

        let mut successful_steps = 0;
        let mut failed_steps = 0;
        let mut skipped_steps = 0;
        for r in step_results.values() {
            match r.status {
                StepStatus::Success => successful_steps += 1,
                StepStatus::Failure => failed_steps += 1,
                StepStatus::Skipped => skipped_steps += 1,
            }
        }

        WorkflowReport {
            run_id: self.run_id,
            workflow_name,
            status,
            started_at: self.started_at,
            ended_at,
            total_duration_ms: duration_millis(self.started_at, ended_at),
            total_steps: step_results.len(),
            successful_steps,
            failed_steps,
            skipped_steps,
            step_results,
            final_variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvSource;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-28T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn records_results_and_reports_counts_by_status() {
        let state = WorkflowState::new(HashMap::new(), now());
        state.record(StepResult::success("b", 1, now(), now(), json!({})), None);
        state.record(StepResult::success("a", 1, now(), now(), json!({})), None);
        let report = state.into_report("wf".into(), WorkflowStatus::Success, now());
        assert_eq!(report.total_steps, 2);
        assert_eq!(report.successful_steps, 2);
        assert!(report.step_results.contains_key("a"));
        assert!(report.step_results.contains_key("b"));
    }

    #[test]
    fn output_key_binds_the_whole_step_value_into_variables() {
        let state = WorkflowState::new(HashMap::new(), now());
        state.record(
            StepResult::success("submit", 1, now(), now(), json!({"job_id": "j1"})),
            Some("submit_out"),
        );
        let ctx = state.render_context(&MapEnvSource::default(), now());
        assert_eq!(ctx["variables"]["submit_out"], json!({"job_id": "j1"}));
    }

    #[test]
    fn skipped_step_satisfies_dependency() {
        let state = WorkflowState::new(HashMap::new(), now());
        state.record(
            StepResult::skipped(
                "optional",
                1,
                now(),
                now(),
                ErrorDetail { kind: "HttpError".into(), message: "boom".into(), http_status: Some(500), attempts: 1, step: "optional".into(), phase: 0 },
            ),
            None,
        );
        assert!(state.satisfies("optional"));
        assert!(!state.has_any_failure());
    }

    #[test]
    fn failure_is_not_satisfied_and_is_visible() {
        let state = WorkflowState::new(HashMap::new(), now());
        state.record(
            StepResult::failure(
                "bad",
                1,
                now(),
                now(),
                ErrorDetail { kind: "HttpError".into(), message: "boom".into(), http_status: Some(500), attempts: 1, step: "bad".into(), phase: 0 },
            ),
            None,
        );
        assert!(!state.satisfies("bad"));
        assert!(state.has_any_failure());
    }

    #[test]
    fn render_context_exposes_env_snapshot() {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/root".to_string());
        let state = WorkflowState::new(HashMap::new(), now());
        let ctx = state.render_context(&MapEnvSource(env), now());
        assert_eq!(ctx["env"]["HOME"], json!("/root"));
    }
}
