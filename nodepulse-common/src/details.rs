//! Flatten/reconstruct convention for probe details.
//!
//! The NodeCheck status schema stores details as `map<string, string>`, so
//! nested maps and arrays cannot survive the write boundary as structure.
//! On write, every non-string value is serialized to its JSON text; on read,
//! any string that parses as JSON is re-parsed. Consumers that need structure
//! (numeric extraction, the query API) always read through `reconstruct`.
//!
//! One consequence, accepted deliberately: a raw string that happens to be
//! valid JSON (for example `"42"`) reconstructs as the parsed value, not the
//! string. Probes therefore never store bare numerals as strings.

use crate::result::Details;
use serde_json::Value;
use std::collections::BTreeMap;

/// Serialize details for the write boundary. Strings pass through verbatim;
/// everything else becomes its JSON text.
pub fn flatten_details(details: &Details) -> BTreeMap<String, String> {
    details
        .iter()
        .map(|(key, value)| {
            let flat = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), flat)
        })
        .collect()
}

/// Reverse of [`flatten_details`]: re-parse any value that is valid JSON,
/// keep the rest as strings.
pub fn reconstruct_details(flat: &BTreeMap<String, String>) -> Details {
    flat.iter()
        .map(|(key, value)| {
            let parsed = match serde_json::from_str::<Value>(value) {
                Ok(v) => v,
                Err(_) => Value::String(value.clone()),
            };
            (key.clone(), parsed)
        })
        .collect()
}
