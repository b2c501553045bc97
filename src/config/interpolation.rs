//! Environment-variable interpolation over the raw configuration tree.
//!
//! Every scalar string passes through `${VAR}` / `$VAR` substitution
//! against a supplied environment before the tree is typed. `$$` escapes a
//! literal `$`; `${VAR:-default}` falls back when the variable is unset or
//! empty, `${VAR-default}` only when unset. An unresolved variable without
//! a default interpolates to the empty string and logs a warning. The
//! top-level `version` key is never interpolated.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::errors::{ComposeError, Result};

/// Interpolate every scalar of a raw configuration document.
///
/// `env` is the variable mapping supplied by the caller (typically the
/// process environment plus `.env` contents).
pub fn interpolate_config(config: &Value, env: &HashMap<String, String>) -> Result<Value> {
    let Value::Object(map) = config else {
        return Err(ComposeError::configuration(
            "top level of a config document must be a mapping",
        ));
    };

    let mut out = serde_json::Map::new();
    for (key, value) in map {
        if key == "version" {
            out.insert(key.clone(), value.clone());
            continue;
        }
        out.insert(key.clone(), interpolate_value(key, value, env)?);
    }
    Ok(Value::Object(out))
}

fn interpolate_value(path: &str, value: &Value, env: &HashMap<String, String>) -> Result<Value> {
    match value {
        Value::String(text) => Ok(Value::String(interpolate(text, env).map_err(|err| {
            ComposeError::configuration(format!(
                "Invalid interpolation format for \"{path}\": {err}"
            ))
        })?)),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, inner) in map {
                let inner_path = format!("{path}.{key}");
                out.insert(key.clone(), interpolate_value(&inner_path, inner, env)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(path, item, env))
                .collect::<Result<_>>()?,
        )),
        other => Ok(other.clone()),
    }
}

/// Substitute variables in one string
pub fn interpolate(
    template: &str,
    env: &HashMap<String, String>,
) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '{')) => {
                chars.next();
                let start = index + 2;
                let Some(end) = template[start..].find('}').map(|offset| start + offset) else {
                    return Err(format!("unterminated ${{}} in \"{template}\""));
                };
                out.push_str(&resolve_braced(&template[start..end], env));
                // Consume up to and including the closing brace.
                while let Some((position, _)) = chars.next() {
                    if position == end {
                        break;
                    }
                }
            }
            Some((_, next)) if next.is_ascii_alphabetic() || *next == '_' => {
                let start = index + 1;
                let mut end = start;
                while let Some((position, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || *ch == '_' {
                        end = position + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &template[start..end];
                out.push_str(&lookup(name, env));
            }
            _ => return Err(format!("invalid '$' sequence in \"{template}\"")),
        }
    }
    Ok(out)
}

fn resolve_braced(body: &str, env: &HashMap<String, String>) -> String {
    if let Some((name, default)) = body.split_once(":-") {
        return match env.get(name) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => default.to_string(),
        };
    }
    if let Some((name, default)) = body.split_once('-') {
        return match env.get(name) {
            Some(value) => value.clone(),
            None => default.to_string(),
        };
    }
    lookup(body, env)
}

fn lookup(name: &str, env: &HashMap<String, String>) -> String {
    match env.get(name) {
        Some(value) => value.clone(),
        None => {
            warn!(
                variable = name,
                "variable is not set, defaulting to empty string"
            );
            String::new()
        }
    }
}
