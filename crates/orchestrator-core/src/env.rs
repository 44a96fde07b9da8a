// SPDX-License-Identifier: Apache-2.0

//! Variable resolver: `${NAME}` substitution against an injected
//! [`EnvSource`], and the `EnvSource` interface itself (a simple
//! `lookup(name) -> Option<value>`).
//!
//! The engine never reads `std::env` directly — `orchestrator-cli` supplies
//! a process-backed `EnvSource`; tests supply a `MapEnvSource`.

use crate::config::{AuthConfig, WorkflowConfig};
use crate::error::{OrchestratorError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Lookup interface for `${NAME}` resolution and template `env.*` access.
pub trait EnvSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;

    /// A point-in-time snapshot used to populate the `env` field of a
    /// render context. Taken once per render call so that `template::render`
    /// stays pure in `(template, context)`.
    fn snapshot(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// `EnvSource` backed by the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvSource;

impl EnvSource for ProcessEnvSource {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn snapshot(&self) -> HashMap<String, String> {
        std::env::vars().collect()
    }
}

/// `EnvSource` backed by a fixed map, used in tests and by callers that
/// source secrets from somewhere other than the process environment.
#[derive(Debug, Default, Clone)]
pub struct MapEnvSource(pub HashMap<String, String>);

impl EnvSource for MapEnvSource {
    fn lookup(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.0.clone()
    }
}

/// Whether a missing `${NAME}` reference is a hard error or left as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Raise `ConfigError` on any unresolved reference (the default — auth
    /// tokens must never silently evaluate to empty).
    Strict,
    /// Leave the `${NAME}` token in place.
    Lenient,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self::Strict
    }
}

static VAR_RE: OnceLock<Regex> = OnceLock::new();

fn var_re() -> &'static Regex {
    VAR_RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap())
}

fn resolve_str(input: &str, env: &dyn EnvSource, policy: ResolutionPolicy) -> Result<String> {
    let mut err = None;
    let resolved = var_re()
        .replace_all(input, |caps: &regex::Captures| {
            if err.is_some() {
                return String::new();
            }
            let name = &caps[1];
            match env.lookup(name) {
                Some(v) => v,
                None => match policy {
                    ResolutionPolicy::Lenient => caps.get(0).unwrap().as_str().to_string(),
                    ResolutionPolicy::Strict => {
                        err = Some(OrchestratorError::config(format!(
                            "unresolved environment reference: '${{{name}}}'"
                        )));
                        String::new()
                    }
                },
            }
        })
        .into_owned();

    match err {
        Some(e) => Err(e),
        None => Ok(resolved),
    }
}

fn resolve_auth(auth: &AuthConfig, env: &dyn EnvSource, policy: ResolutionPolicy) -> Result<AuthConfig> {
    Ok(match auth {
        AuthConfig::None => AuthConfig::None,
        AuthConfig::Bearer { token } => AuthConfig::Bearer {
            token: resolve_str(token, env, policy)?,
        },
        AuthConfig::ApiKey { header_name, key } => AuthConfig::ApiKey {
            header_name: resolve_str(header_name, env, policy)?,
            key: resolve_str(key, env, policy)?,
        },
        AuthConfig::Basic { user, pass } => AuthConfig::Basic {
            user: resolve_str(user, env, policy)?,
            pass: resolve_str(pass, env, policy)?,
        },
        AuthConfig::Custom { headers } => {
            let mut resolved = HashMap::with_capacity(headers.len());
            for (k, v) in headers {
                resolved.insert(k.clone(), resolve_str(v, env, policy)?);
            }
            AuthConfig::Custom { headers: resolved }
        }
    })
}

/// Resolves `${NAME}` references in `auth` blocks and `variables`, returning
/// a new config ready for planning. Headers/URLs/payloads are *not*
/// resolved here — those are templates rendered per-step, where
/// `{{ env.NAME }}` reaches the same `EnvSource` directly.
pub fn resolve_workflow_config(
    config: &WorkflowConfig,
    env: &dyn EnvSource,
    policy: ResolutionPolicy,
) -> Result<WorkflowConfig> {
    let mut resolved = config.clone();

    if let Some(auth) = &config.auth {
        resolved.auth = Some(resolve_auth(auth, env, policy)?);
    }

    for (_, value) in resolved.variables.iter_mut() {
        if let serde_json::Value::String(s) = value {
            *s = resolve_str(s, env, policy)?;
        }
    }

    for step in resolved.steps.iter_mut() {
        if let Some(auth) = &step.auth {
            step.auth = Some(resolve_auth(auth, env, policy)?);
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(pairs: &[(&str, &str)]) -> MapEnvSource {
        MapEnvSource(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn resolves_bearer_token() {
        let env = env_with(&[("API_TOKEN", "secret123")]);
        let auth = AuthConfig::Bearer { token: "${API_TOKEN}".to_string() };
        let resolved = resolve_auth(&auth, &env, ResolutionPolicy::Strict).unwrap();
        match resolved {
            AuthConfig::Bearer { token } => assert_eq!(token, "secret123"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn strict_policy_errors_on_missing_var() {
        let env = env_with(&[]);
        let auth = AuthConfig::Bearer { token: "${MISSING}".to_string() };
        assert!(resolve_auth(&auth, &env, ResolutionPolicy::Strict).is_err());
    }

    #[test]
    fn lenient_policy_leaves_token_unresolved() {
        let env = env_with(&[]);
        let auth = AuthConfig::Bearer { token: "${MISSING}".to_string() };
        let resolved = resolve_auth(&auth, &env, ResolutionPolicy::Lenient).unwrap();
        match resolved {
            AuthConfig::Bearer { token } => assert_eq!(token, "${MISSING}"),
            _ => panic!("wrong variant"),
        }
    }
}
