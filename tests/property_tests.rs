//! Property-based tests for the configuration algebra using proptest.
//!
//! These verify the quantified invariants of the merge and interpolation
//! layers:
//! 1. Merging a service declaration onto itself is the identity
//! 2. Merging is associative when the layers touch disjoint keys
//! 3. `$$` always survives interpolation as a single literal `$`
//! 4. Short port forms parse without panicking and merge by their key

use std::collections::HashMap;

use proptest::prelude::*;

use compose_engine::config::merge::merge_service;
use compose_engine::config::interpolation::interpolate;
use compose_engine::{ServiceConfig, VolumeSpec};

// ============================================================================
// Strategies
// ============================================================================

/// Environment variable keys with a configurable prefix, so layers can be
/// made key-disjoint
fn env_key_strategy(prefix: &'static str) -> impl Strategy<Value = String> {
    "[A-Z][A-Z0-9_]{0,15}".prop_map(move |key| format!("{prefix}{key}"))
}

fn env_value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_./:-]{0,32}"
}

fn env_map_strategy(
    prefix: &'static str,
) -> impl Strategy<Value = HashMap<String, String>> {
    proptest::collection::hash_map(env_key_strategy(prefix), env_value_strategy(), 0..6)
}

fn image_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,20}(:[a-z0-9.]{1,10})?"
}

/// Distinct container-side mount targets under a prefix directory
fn volume_targets_strategy(prefix: &'static str) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set("[a-z]{1,10}", 0..4).prop_map(move |set| {
        set.into_iter()
            .map(|segment| format!("/{prefix}/{segment}"))
            .collect()
    })
}

fn port_strategy() -> impl Strategy<Value = u16> {
    1u16..=65535u16
}

/// A service declaration whose keyed fields live under the given prefixes
fn service_strategy(
    env_prefix: &'static str,
    volume_prefix: &'static str,
) -> impl Strategy<Value = ServiceConfig> {
    (
        image_strategy(),
        env_map_strategy(env_prefix),
        volume_targets_strategy(volume_prefix),
        proptest::collection::btree_set(port_strategy(), 0..4),
        proptest::option::of("[a-z ]{1,20}"),
    )
        .prop_map(|(image, env, volume_targets, ports, command)| {
            let volumes: Vec<String> = volume_targets;
            let ports: Vec<String> = ports.into_iter().map(|port| port.to_string()).collect();
            let mut value = serde_json::json!({
                "image": image,
                "environment": env,
                "volumes": volumes,
                "ports": ports,
            });
            if let Some(command) = command {
                value["command"] = serde_json::Value::String(command);
            }
            let mut config: ServiceConfig = serde_json::from_value(value).unwrap();
            config.name = "svc".into();
            config
        })
}

fn plain_string_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_./: -]{0,40}"
}

// ============================================================================
// Merge properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// merge(a, a) == a for any valid service declaration
    #[test]
    fn merge_is_idempotent(config in service_strategy("A", "a")) {
        let merged = merge_service(&config, &config);
        prop_assert_eq!(merged, config);
    }

    /// merge is associative when the layers touch disjoint keys
    #[test]
    fn merge_is_associative_on_disjoint_keys(
        a in service_strategy("A", "a"),
        b in service_strategy("B", "b"),
        c in service_strategy("C", "c"),
    ) {
        let left = merge_service(&merge_service(&a, &b), &c);
        let right = merge_service(&a, &merge_service(&b, &c));
        prop_assert_eq!(left, right);
    }

    /// Merging the same ports twice never duplicates them
    #[test]
    fn port_merge_key_deduplicates(ports in proptest::collection::btree_set(port_strategy(), 1..6)) {
        let specs: Vec<String> = ports.iter().map(|port| format!("{port}:{port}")).collect();
        let value = serde_json::json!({"image": "busybox", "ports": specs});
        let config: ServiceConfig = serde_json::from_value(value).unwrap();
        let merged = merge_service(&config, &config);
        prop_assert_eq!(merged.ports.0.len(), ports.len());
    }
}

// ============================================================================
// Interpolation properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// `$$` in a source value appears as exactly one literal `$`; no other
    /// `$`-sequence survives with a literal `$`
    #[test]
    fn dollar_escape_round_trip(prefix in plain_string_strategy(), suffix in plain_string_strategy()) {
        let env = HashMap::new();
        let template = format!("{prefix}$${suffix}");
        let result = interpolate(&template, &env).unwrap();
        prop_assert_eq!(result, format!("{prefix}${suffix}"));
    }

    /// Unset variables with a `:-` default interpolate to the default
    #[test]
    fn unset_variable_takes_default(
        name in "[A-Z][A-Z0-9_]{0,10}",
        default in "[a-z0-9.-]{0,20}",
    ) {
        let env = HashMap::new();
        let template = format!("${{{name}:-{default}}}");
        let result = interpolate(&template, &env).unwrap();
        prop_assert_eq!(result, default);
    }

    /// Set variables win over their defaults
    #[test]
    fn set_variable_beats_default(
        name in "[A-Z][A-Z0-9_]{0,10}",
        value in "[a-z0-9.-]{1,20}",
        default in "[a-z0-9.-]{0,20}",
    ) {
        let mut env = HashMap::new();
        env.insert(name.clone(), value.clone());
        let template = format!("${{{name}:-{default}}}");
        let result = interpolate(&template, &env).unwrap();
        prop_assert_eq!(result, value);
    }

    /// Interpolating a template with no `$` at all is the identity
    #[test]
    fn dollar_free_strings_pass_through(text in plain_string_strategy()) {
        let env = HashMap::new();
        prop_assert_eq!(interpolate(&text, &env).unwrap(), text);
    }
}

// ============================================================================
// Parsing properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Short port forms parse without panicking and preserve the target
    #[test]
    fn port_short_form_parses(host in port_strategy(), container in port_strategy()) {
        let parsed = compose_engine::ServicePort::parse(&format!("{host}:{container}")).unwrap();
        prop_assert_eq!(parsed.len(), 1);
        prop_assert_eq!(parsed[0].published, Some(host));
        prop_assert_eq!(parsed[0].target, container);
    }

    /// Volume short forms preserve their target
    #[test]
    fn volume_short_form_preserves_target(name in "[a-z][a-z0-9-]{0,15}", target in "/[a-z]{1,12}") {
        let spec = VolumeSpec::parse(&format!("{name}:{target}")).unwrap();
        prop_assert_eq!(spec.target(), target.as_str());
        prop_assert!(spec.is_named());
    }

    /// Anonymous volume specs stay anonymous
    #[test]
    fn bare_target_is_anonymous(target in "/[a-z]{1,12}") {
        let spec = VolumeSpec::parse(&target).unwrap();
        prop_assert!(spec.is_anonymous());
        prop_assert_eq!(spec.target(), target.as_str());
    }
}
