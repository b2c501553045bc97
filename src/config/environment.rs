//! Environment-file loading and environment resolution.
//!
//! A service's effective environment is layered: values from `env_file`
//! entries (in order, later files overriding earlier ones) are overridden
//! by the service-level `environment` mapping. Keys declared without a
//! value resolve from the supplied process environment, defaulting to the
//! empty string.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;

use super::types::Environment;
use crate::errors::{ComposeError, Result};

/// Parse one line-delimited environment file's content
pub fn parse_env_file(content: &str) -> IndexMap<String, Option<String>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Environment::split_env)
        .collect()
}

/// Read and parse an environment file
pub fn env_vars_from_file(path: &Path) -> Result<IndexMap<String, Option<String>>> {
    let content = std::fs::read_to_string(path).map_err(|_| {
        ComposeError::configuration(format!("Couldn't find env file: {}", path.display()))
    })?;
    Ok(parse_env_file(&content))
}

/// Combine env files and the declared environment into one mapping.
///
/// `env_files` are already resolved paths, in declaration order; the
/// service `environment` wins per key.
pub fn resolve_environment(
    env_files: &[std::path::PathBuf],
    environment: &Environment,
    process_env: &HashMap<String, String>,
) -> Result<Environment> {
    let mut merged: IndexMap<String, Option<String>> = IndexMap::new();
    for path in env_files {
        for (key, value) in env_vars_from_file(path)? {
            merged.insert(key, value);
        }
    }
    for (key, value) in &environment.0 {
        merged.insert(key.clone(), value.clone());
    }

    let resolved = merged
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Some(value) => Some(value),
                None => Some(process_env.get(&key).cloned().unwrap_or_default()),
            };
            (key, value)
        })
        .collect();
    Ok(Environment(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_env_file_content() {
        let parsed = parse_env_file("# comment\nFOO=bar\n\nBARE\nQUOTED=a=b\n");
        assert_eq!(parsed["FOO"], Some("bar".to_string()));
        assert_eq!(parsed["BARE"], None);
        assert_eq!(parsed["QUOTED"], Some("a=b".to_string()));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn test_missing_env_file() {
        let err = env_vars_from_file(Path::new("/definitely/not/here.env")).unwrap_err();
        assert!(err.to_string().contains("Couldn't find env file"));
    }

    #[test]
    fn test_resolution_priority() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.env");
        let second = dir.path().join("b.env");
        writeln!(std::fs::File::create(&first).unwrap(), "SHARED=first\nONLY_A=1").unwrap();
        writeln!(std::fs::File::create(&second).unwrap(), "SHARED=second").unwrap();

        let environment: Environment =
            serde_json::from_value(serde_json::json!({"SHARED": "service", "FROM_PROC": null}))
                .unwrap();
        let process_env =
            HashMap::from([("FROM_PROC".to_string(), "proc-value".to_string())]);

        let resolved =
            resolve_environment(&[first, second], &environment, &process_env).unwrap();
        // service-level beats both env files; later file beats earlier
        assert_eq!(resolved.0["SHARED"], Some("service".to_string()));
        assert_eq!(resolved.0["ONLY_A"], Some("1".to_string()));
        assert_eq!(resolved.0["FROM_PROC"], Some("proc-value".to_string()));
    }

    #[test]
    fn test_unset_passthrough_defaults_empty() {
        let environment: Environment =
            serde_json::from_value(serde_json::json!(["NOWHERE"])).unwrap();
        let resolved = resolve_environment(&[], &environment, &HashMap::new()).unwrap();
        assert_eq!(resolved.0["NOWHERE"], Some(String::new()));
    }
}
