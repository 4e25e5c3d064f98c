//! Bookmark hashing
//!
//! Bookmarks and stimuli are matched by a digest of their name and correlation-relevant
//! payload. The digest must be stable across process restarts, so [`CorrelationHasher`]
//! hashes a canonical rendering of the payload instead of whatever order a JSON object
//! happened to be built in:
//!
//! ```text
//!   name ──┐
//!          ├─► SHA-256( name ␟ canonical(filter(payload, policy)) ) ─► 64 hex chars
//!   payload┘
//! ```
//!
//! Canonical form: object keys sorted at every level, arrays kept in order unless the
//! policy marks the field unordered, scalars in their JSON text form. An absent payload
//! hashes exactly like JSON `null`. Numbers are not normalized, so `1` and `1.0` differ.

use crate::registry::{CorrelationPolicy, StimulusRegistry};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const NAME_SEPARATOR: u8 = 0x1f;

/// Maps a bookmark or stimulus name plus payload to its index key
pub trait BookmarkHasher: Send + Sync {
    /// Compute the hash; equal inputs must always give equal output
    fn compute(&self, name: &str, payload: Option<&Value>) -> String;
}

/// Default hasher: SHA-256 over the name and the policy-filtered canonical payload
#[derive(Debug, Clone, Default)]
pub struct CorrelationHasher {
    registry: Arc<StimulusRegistry>,
}

impl CorrelationHasher {
    pub fn new(registry: Arc<StimulusRegistry>) -> Self {
        Self { registry }
    }
}

impl BookmarkHasher for CorrelationHasher {
    fn compute(&self, name: &str, payload: Option<&Value>) -> String {
        let policy = self.registry.policy_for(name);
        let filtered = correlation_view(payload.unwrap_or(&Value::Null), policy);

        let mut canonical = String::new();
        write_canonical(&filtered, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        hasher.update([NAME_SEPARATOR]);
        hasher.update(canonical.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Drop non-correlating fields and sort unordered arrays
fn correlation_view(payload: &Value, policy: &CorrelationPolicy) -> Value {
    let Value::Object(map) = payload else {
        return payload.clone();
    };

    let mut filtered = Map::new();
    for (key, value) in map.iter().filter(|(key, _)| policy.includes(key)) {
        let value = match value {
            Value::Array(items) if policy.unordered.contains(key) => {
                let mut keyed: Vec<(String, &Value)> = items
                    .iter()
                    .map(|item| {
                        let mut text = String::new();
                        write_canonical(item, &mut text);
                        (text, item)
                    })
                    .collect();
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                Value::Array(keyed.into_iter().map(|(_, item)| item.clone()).collect())
            }
            other => other.clone(),
        };
        filtered.insert(key.clone(), value);
    }

    Value::Object(filtered)
}

/// Render `value` as JSON with object keys sorted at every level
pub fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
