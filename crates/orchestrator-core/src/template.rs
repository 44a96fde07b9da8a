// SPDX-License-Identifier: Apache-2.0

//! Minimal sandboxed template evaluator.
//!
//! Design note: this deliberately does *not* embed a
//! general-purpose templating engine. `{{ expr }}` occurrences are
//! substituted where `expr` is a dotted path with an optional chain of pipe
//! filters drawn from a fixed, closed set. There is no user-definable
//! function, no control flow, and no access to anything outside the
//! `TemplateContext` passed in.

use crate::error::{OrchestratorError, Result};
use crate::pathutil::get_path;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

static EXPR_RE: OnceLock<Regex> = OnceLock::new();

fn expr_re() -> &'static Regex {
    EXPR_RE.get_or_init(|| Regex::new(r"\{\{\s*(.*?)\s*\}\}").unwrap())
}

/// Renders `template` against `context`, a JSON object shaped
/// `{variables, steps, env, now}` (see [`crate::state::render_context`]).
///
/// Pure in `(template, context)`: the same inputs always produce the same
/// output. Callers that need a fresh `now` must build a fresh context.
pub fn render(template: &str, context: &Value) -> Result<String> {
    let mut err: Option<OrchestratorError> = None;
    let rendered = expr_re()
        .replace_all(template, |caps: &regex::Captures| {
            if err.is_some() {
                return String::new();
            }
            let raw_match = caps.get(0).unwrap().as_str().to_string();
            match eval_expr(&caps[1], context) {
                Ok(value) => display(value, &raw_match),
                Err(e) => {
                    err = Some(e);
                    String::new()
                }
            }
        })
        .into_owned();

    match err {
        Some(e) => Err(e),
        None => Ok(rendered),
    }
}

/// `None` means "path resolution failed and no `default` filter rescued it"
/// — render() falls back to the original `{{ ... }}` token in that case.
fn eval_expr(expr: &str, context: &Value) -> Result<Option<Value>> {
    let mut parts = expr.split('|');
    let path = parts.next().unwrap_or("").trim();
    let mut current = get_path(context, path);

    for stage in parts {
        let (name, args) = parse_filter(stage.trim())?;
        current = apply_filter(&name, &args, current)?;
    }

    Ok(current)
}

fn parse_filter(stage: &str) -> Result<(String, Vec<String>)> {
    match stage.find('(') {
        None => Ok((stage.to_string(), Vec::new())),
        Some(open) => {
            let close = stage.rfind(')').ok_or_else(|| {
                OrchestratorError::template(format!("unterminated filter args: '{stage}'"))
            })?;
            if close < open {
                return Err(OrchestratorError::template(format!("malformed filter: '{stage}'")));
            }
            let name = stage[..open].trim().to_string();
            let args_str = &stage[open + 1..close];
            let args = split_args(args_str);
            Ok((name, args))
        }
    }
}

fn split_args(args: &str) -> Vec<String> {
    if args.trim().is_empty() {
        return Vec::new();
    }
    args.split(',')
        .map(|a| unquote(a.trim()))
        .collect()
}

fn unquote(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"'))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn apply_filter(name: &str, args: &[String], value: Option<Value>) -> Result<Option<Value>> {
    match name {
        "default" => {
            if value.is_some() {
                return Ok(value);
            }
            let literal = args.first().map(|s| s.as_str()).unwrap_or("");
            Ok(Some(
                serde_json::from_str(literal).unwrap_or_else(|_| Value::String(literal.to_string())),
            ))
        }
        // Every other filter is a no-op on a missing path: it stays missing
        // until/unless `default` rescues it.
        _ if value.is_none() => Ok(None),
        "tojson" => {
            let v = value.unwrap();
            let text = serde_json::to_string(&v)
                .map_err(|e| OrchestratorError::template(format!("tojson: {e}")))?;
            Ok(Some(Value::String(text)))
        }
        "from_json" => {
            let v = value.unwrap();
            let text = as_str_lossy(&v);
            let parsed: Value = serde_json::from_str(&text)
                .map_err(|e| OrchestratorError::template(format!("from_json: {e}")))?;
            Ok(Some(parsed))
        }
        "length" => {
            let v = value.unwrap();
            let len = match &v {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => return Err(OrchestratorError::template("length: unsupported value type")),
            };
            Ok(Some(Value::Number(len.into())))
        }
        "trim" => {
            let v = value.unwrap();
            Ok(Some(Value::String(as_str_lossy(&v).trim().to_string())))
        }
        "replace" => {
            let v = value.unwrap();
            let from = args.first().cloned().unwrap_or_default();
            let to = args.get(1).cloned().unwrap_or_default();
            Ok(Some(Value::String(as_str_lossy(&v).replace(&from, &to))))
        }
        "regex_replace" => {
            let v = value.unwrap();
            let pattern = args.first().cloned().unwrap_or_default();
            let replacement = args.get(1).cloned().unwrap_or_default();
            let re = Regex::new(&pattern)
                .map_err(|e| OrchestratorError::template(format!("regex_replace: {e}")))?;
            let replaced = re.replace_all(&as_str_lossy(&v), replacement.as_str()).into_owned();
            Ok(Some(Value::String(replaced)))
        }
        other => Err(OrchestratorError::template(format!("unknown filter: '{other}'"))),
    }
}

fn as_str_lossy(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders a resolved value into the literal text spliced into the
/// surrounding template; falls back to the original `{{ ... }}` token when
/// the path never resolved (and no `default` filter rescued it).
fn display(value: Option<Value>, original_token: &str) -> String {
    match value {
        None => original_token.to_string(),
        Some(Value::String(s)) => s,
        Some(Value::Null) => original_token.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "variables": {"name": "Ada"},
            "steps": {
                "submit": {"value": {"job_id": "j1", "count": 3}}
            },
            "env": {"HOME": "/root"},
            "now": "2026-07-28T00:00:00Z",
        })
    }

    #[test]
    fn substitutes_dotted_path() {
        let out = render("hello {{ variables.name }}", &ctx()).unwrap();
        assert_eq!(out, "hello Ada");
    }

    #[test]
    fn missing_path_is_left_unchanged() {
        let out = render("{{ variables.missing }}", &ctx()).unwrap();
        assert_eq!(out, "{{ variables.missing }}");
    }

    #[test]
    fn default_filter_rescues_missing_path() {
        let out = render("{{ variables.missing | default('none') }}", &ctx()).unwrap();
        assert_eq!(out, "none");
    }

    #[test]
    fn tojson_splices_raw_json() {
        let out = render("{{ steps.submit.value | tojson }}", &ctx()).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, json!({"job_id": "j1", "count": 3}));
    }

    #[test]
    fn length_and_replace_chain() {
        let out = render("{{ variables.name | length }}", &ctx()).unwrap();
        assert_eq!(out, "3");
        let out = render("{{ variables.name | replace(A,O) }}", &ctx()).unwrap();
        assert_eq!(out, "Oda");
    }

    #[test]
    fn array_index_path() {
        let ctx = json!({"variables": {}, "steps": {}, "env": {}, "now": "", "poll": {"output": ["R0", "R1"]}});
        let out = render("{{ poll.output.1 }}", &ctx).unwrap();
        assert_eq!(out, "R1");
    }

    #[test]
    fn render_is_idempotent_when_fully_resolved() {
        let once = render("hello {{ variables.name }}", &ctx()).unwrap();
        let twice = render(&once, &ctx()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_filter_errors() {
        assert!(render("{{ variables.name | bogus }}", &ctx()).is_err());
    }
}
