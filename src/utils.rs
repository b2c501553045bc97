//! Small helpers shared across the engine.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{ComposeError, Result};

/// Hash a JSON value into a stable SHA-256 hex digest.
///
/// Keys are sorted at every level and the encoding is compact, so the
/// digest is reproducible regardless of map iteration order.
pub fn json_hash(value: &Value) -> String {
    let canonical = canonicalize(value);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Re-encode a JSON value with object keys sorted at every level
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Shorten an engine object id for display
pub fn truncate_id(id: &str) -> &str {
    match id.split_once(':') {
        Some((_, digest)) => &digest[..12.min(digest.len())],
        None => &id[..12.min(id.len())],
    }
}

/// De-duplicate while preserving first-seen order
pub fn unique_everseen<T: Clone + Eq + Hash>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Parse a duration expression in the engine's `1h2m3s` format.
///
/// Accepts any combination of `h`, `m`, `s`, `ms`, `us`/`µs` and `ns`
/// components in descending order, each with an optional fractional part,
/// as well as a bare number of seconds (`"10"`).
pub fn parse_compose_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ComposeError::configuration("duration cannot be empty"));
    }

    if let Ok(secs) = trimmed.parse::<f64>() {
        if secs < 0.0 {
            return Err(ComposeError::configuration(format!(
                "duration cannot be negative: {value}"
            )));
        }
        return Ok(Duration::from_secs_f64(secs));
    }

    let mut rest = trimmed;
    let mut total = 0.0f64;
    // Index into the unit order h > m > s > ms > us > ns; components may be
    // omitted but must not repeat or appear out of order.
    let mut unit_index = 0;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| invalid_duration(value))?;
        if digits_end == 0 {
            return Err(invalid_duration(value));
        }
        let number: f64 = rest[..digits_end]
            .parse()
            .map_err(|_| invalid_duration(value))?;
        rest = &rest[digits_end..];

        // Longest suffixes first so `m` does not swallow the `m` of `ms`.
        let (index, suffix_len, multiplier) = if rest.starts_with("ms") {
            (3, 2, 1e-3)
        } else if rest.starts_with("us") {
            (4, 2, 1e-6)
        } else if rest.starts_with("µs") {
            (4, "µs".len(), 1e-6)
        } else if rest.starts_with("ns") {
            (5, 2, 1e-9)
        } else if rest.starts_with('h') {
            (0, 1, 3600.0)
        } else if rest.starts_with('m') {
            (1, 1, 60.0)
        } else if rest.starts_with('s') {
            (2, 1, 1.0)
        } else {
            return Err(invalid_duration(value));
        };
        if index < unit_index {
            return Err(invalid_duration(value));
        }
        unit_index = index + 1;
        total += number * multiplier;
        rest = &rest[suffix_len..];
    }

    Ok(Duration::from_secs_f64(total))
}

fn invalid_duration(value: &str) -> ComposeError {
    ComposeError::configuration(format!("invalid duration: {value:?}"))
}
