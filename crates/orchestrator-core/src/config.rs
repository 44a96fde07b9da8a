// SPDX-License-Identifier: Apache-2.0

//! The external workflow configuration surface.
//!
//! These types are plain data: parsing them from YAML/JSON is an external
//! collaborator's job (see `orchestrator-cli`), and the engine never reads
//! a file itself. `WorkflowConfig::validate` performs the structural checks
//! that must hold before planning even starts.

use crate::duration::parse_duration;
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    pub api_base: String,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub steps: Vec<StepConfig>,
    #[serde(default)]
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub webhook_url: String,
    #[serde(default)]
    pub failure_alert: bool,
    /// Threshold, in milliseconds, above which a step duration is flagged as
    /// long-running in the report summary.
    #[serde(default)]
    pub long_duration_threshold_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Default for Method {
    fn default() -> Self {
        Self::Post
    }
}

impl Method {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub method: Method,
    /// Overrides `WorkflowConfig::api_base` for this step only.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub depends_on: HashSet<String>,
    #[serde(default)]
    pub parallel_group: Option<String>,
    #[serde(default)]
    pub max_parallel: Option<usize>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub payload_template: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Wall-clock limit for one attempt; a string in the duration grammar
    /// (e.g. `"5s"`, `"1.5s"`, `"250ms"`).
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub extract_fields: HashMap<String, String>,
    #[serde(default)]
    pub response_transform: Option<String>,
    #[serde(default)]
    pub output_key: Option<String>,
    #[serde(default)]
    pub poll: Option<PollConfig>,
}

fn default_timeout() -> String {
    "30s".to_string()
}

impl StepConfig {
    pub fn timeout_ms(&self) -> Result<u64> {
        parse_duration(&self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    pub endpoint: String,
    pub interval: String,
    pub max_attempts: usize,
    pub completion_field: String,
    pub completion_values: Vec<Value>,
    #[serde(default)]
    pub failure_values: Vec<Value>,
    #[serde(default)]
    pub result_field: Option<String>,
}

impl PollConfig {
    pub fn interval_ms(&self) -> Result<u64> {
        parse_duration(&self.interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    None,
    Bearer { token: String },
    ApiKey { header_name: String, key: String },
    Basic { user: String, pass: String },
    Custom { headers: HashMap<String, String> },
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    #[default]
    Constant,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub limit: u32,
    #[serde(default = "default_retry_delay")]
    pub delay: String,
    #[serde(default)]
    pub backoff: BackoffStrategy,
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_retry_delay() -> String {
    "0s".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            limit: 0,
            delay: default_retry_delay(),
            backoff: BackoffStrategy::Constant,
            timeout: None,
        }
    }
}

impl RetryConfig {
    pub fn delay_ms(&self) -> Result<u64> {
        parse_duration(&self.delay)
    }

    /// Delay before attempt N (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Result<std::time::Duration> {
        let base = self.delay_ms()?;
        let millis = match self.backoff {
            BackoffStrategy::Constant => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => base.saturating_mul(1u64 << attempt.saturating_sub(1)),
        };
        Ok(std::time::Duration::from_millis(millis))
    }
}

impl WorkflowConfig {
    /// Structural validation that must hold before dependency planning runs.
    /// Cycle/reference validation against `parallel_group` names belongs to
    /// the planner because it needs the group-expansion step first.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OrchestratorError::config("workflow name must not be empty"));
        }
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(OrchestratorError::config(format!(
                "api_base must be an absolute URL, got '{}'",
                self.api_base
            )));
        }
        if self.steps.is_empty() {
            return Err(OrchestratorError::config("workflow has no steps"));
        }

        let mut seen = HashSet::new();
        let mut group_names = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(OrchestratorError::config("step name must not be empty"));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(OrchestratorError::config(format!(
                    "duplicate step name: '{}'",
                    step.name
                )));
            }
            if step.payload.is_some() && step.payload_template.is_some() {
                return Err(OrchestratorError::config(format!(
                    "step '{}' sets both payload and payload_template",
                    step.name
                )));
            }
            if let Some(group) = &step.parallel_group {
                group_names.insert(group.as_str());
            }
        }

        // A `depends_on` reference is ambiguous (step or group?) if a step
        // and a group ever share a name — reject outright rather than let
        // the planner silently pick one interpretation (spec §9).
        for name in &seen {
            if group_names.contains(name) {
                return Err(OrchestratorError::config(format!(
                    "'{name}' is used as both a step name and a parallel_group name"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_step(name: &str) -> StepConfig {
        StepConfig {
            name: name.to_string(),
            endpoint: "/echo".to_string(),
            method: Method::Post,
            api_base: None,
            depends_on: HashSet::new(),
            parallel_group: None,
            max_parallel: None,
            headers: HashMap::new(),
            payload: None,
            payload_template: None,
            auth: None,
            retry: RetryConfig::default(),
            timeout: default_timeout(),
            continue_on_error: false,
            extract_fields: HashMap::new(),
            response_transform: None,
            output_key: None,
            poll: None,
        }
    }

    fn minimal_config() -> WorkflowConfig {
        WorkflowConfig {
            name: "wf".to_string(),
            api_base: "https://api.example.com".to_string(),
            auth: None,
            variables: HashMap::new(),
            steps: vec![minimal_step("a")],
            monitoring: None,
        }
    }

    #[test]
    fn rejects_empty_steps() {
        let mut cfg = minimal_config();
        cfg.steps.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_step_names() {
        let mut cfg = minimal_config();
        cfg.steps.push(minimal_step("a"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_payload_and_payload_template_both_set() {
        let mut cfg = minimal_config();
        cfg.steps[0].payload = Some(Value::Null);
        cfg.steps[0].payload_template = Some("{}".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_step_and_group_sharing_a_name() {
        let mut cfg = minimal_config();
        cfg.steps.push(minimal_step("b"));
        cfg.steps[1].parallel_group = Some("a".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_relative_api_base() {
        let mut cfg = minimal_config();
        cfg.api_base = "api.example.com".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let retry = RetryConfig {
            limit: 3,
            delay: "100ms".to_string(),
            backoff: BackoffStrategy::Exponential,
            timeout: None,
        };
        assert_eq!(retry.delay_for_attempt(1).unwrap().as_millis(), 100);
        assert_eq!(retry.delay_for_attempt(2).unwrap().as_millis(), 200);
        assert_eq!(retry.delay_for_attempt(3).unwrap().as_millis(), 400);
    }

    #[test]
    fn linear_backoff_scales_by_attempt() {
        let retry = RetryConfig {
            limit: 3,
            delay: "100ms".to_string(),
            backoff: BackoffStrategy::Linear,
            timeout: None,
        };
        assert_eq!(retry.delay_for_attempt(3).unwrap().as_millis(), 300);
    }
}
