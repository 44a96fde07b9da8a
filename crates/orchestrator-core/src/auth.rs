// SPDX-License-Identifier: Apache-2.0

//! Authenticator: turns a resolved [`AuthConfig`] into request headers.
//!
//! `AuthConfig` values reaching this module have already had their
//! `${NAME}` references resolved by [`crate::env::resolve_workflow_config`];
//! this module only ever deals in final header values.

use crate::config::AuthConfig;
use crate::error::{OrchestratorError, Result};
use base64::Engine;
use std::collections::HashMap;

/// Builds the header map to merge into an outbound request for the given
/// auth scheme. Auth-produced headers win over step-declared headers with
/// the same name.
pub fn build_headers(auth: &AuthConfig) -> Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    match auth {
        AuthConfig::None => {}
        AuthConfig::Bearer { token } => {
            if token.trim().is_empty() {
                return Err(OrchestratorError::auth("bearer token is empty"));
            }
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        AuthConfig::ApiKey { header_name, key } => {
            if key.trim().is_empty() {
                return Err(OrchestratorError::auth("api key is empty"));
            }
            headers.insert(header_name.clone(), key.clone());
        }
        AuthConfig::Basic { user, pass } => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
            headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
        }
        AuthConfig::Custom { headers: custom } => {
            headers.extend(custom.clone());
        }
    }
    Ok(headers)
}

/// Redacts header values that look like credentials, for safe inclusion in
/// trace fields and error messages.
pub fn redact_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    const SENSITIVE: &[&str] = &["authorization", "x-api-key", "api-key"];
    headers
        .iter()
        .map(|(k, v)| {
            if SENSITIVE.contains(&k.to_lowercase().as_str()) {
                (k.clone(), "[REDACTED]".to_string())
            } else {
                (k.clone(), v.clone())
            }
        })
        .collect()
}
