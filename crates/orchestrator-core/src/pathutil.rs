// SPDX-License-Identifier: Apache-2.0

//! Dotted-path lookups into `serde_json::Value`, shared by the template
//! renderer, the HTTP executor's `extract_fields`, and the poller's
//! `completion_field`/`result_field`.

use serde_json::Value;

/// Resolves a dotted path like `steps.submit.value.job_id` or `output.0`
/// against a JSON value. Object keys and array indices are both dotted
/// segments; a numeric segment against an array is treated as an index.
pub fn get_path(value: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_object_path() {
        let v = json!({"a": {"b": 1}});
        assert_eq!(get_path(&v, "a.b"), Some(json!(1)));
    }

    #[test]
    fn missing_path_is_none() {
        let v = json!({"a": {"b": 1}});
        assert_eq!(get_path(&v, "a.c"), None);
        assert_eq!(get_path(&v, "x.y.z"), None);
    }

    #[test]
    fn resolves_array_index() {
        let v = json!({"output": ["R0", "R1"]});
        assert_eq!(get_path(&v, "output.0"), Some(json!("R0")));
        assert_eq!(get_path(&v, "output.5"), None);
    }
}
