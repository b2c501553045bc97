//! The layer-merge algebra.
//!
//! Configuration layers merge leaf-first, layer by layer. Every service
//! field follows one of a small set of rules: scalar override-wins, simple
//! list concatenation with value de-duplication, keyed-list override (ports
//! by their merge key, volumes by target), or key-wise mapping merge. The
//! compound blocks (`build`, `logging`, `deploy`, `healthcheck`, network
//! attachments) carry their own merge functions next to their types; this
//! module applies the rule table field by field.

use indexmap::IndexMap;

use super::service::{BuildField, ServiceConfig};
use super::types::{ServicePorts, StringOrList, VolumeSpec};
use crate::utils::unique_everseen;

/// Merge one override layer onto a base service declaration
pub fn merge_service(base: &ServiceConfig, over: &ServiceConfig) -> ServiceConfig {
    // image/build are mutually exclusive: an override declaring one drops
    // the other from the base.
    let (image, build) = merge_image_and_build(base, over);

    ServiceConfig {
        name: if over.name.is_empty() {
            base.name.clone()
        } else {
            over.name.clone()
        },
        image,
        build,

        command: scalar(&base.command, &over.command),
        entrypoint: scalar(&base.entrypoint, &over.entrypoint),

        ports: merge_ports(&base.ports, &over.ports),
        expose: simple_list(&base.expose, &over.expose),

        environment: base.environment.merge(&over.environment),
        env_file: concat_string_or_list(&base.env_file, &over.env_file),

        volumes: merge_volumes(&base.volumes, &over.volumes),
        volumes_from: keyed_list(&base.volumes_from, &over.volumes_from, |v| v.merge_key()),
        tmpfs: concat_string_or_list(&base.tmpfs, &over.tmpfs),

        links: keyed_list(&base.links, &over.links, |link| link.merge_key()),
        external_links: simple_list(&base.external_links, &over.external_links),
        depends_on: base.depends_on.merge(&over.depends_on),

        network_mode: scalar(&base.network_mode, &over.network_mode),
        // v1 `net:` is translated away at load time.
        net: None,
        networks: merge_networks(base, over),
        pid: scalar(&base.pid, &over.pid),
        ipc: scalar(&base.ipc, &over.ipc),

        secrets: keyed_list(&base.secrets, &over.secrets, |s| s.merge_key()),
        configs: keyed_list(&base.configs, &over.configs, |c| c.merge_key()),

        healthcheck: match (&base.healthcheck, &over.healthcheck) {
            (Some(base), Some(over)) => Some(base.merge(over)),
            (base, over) => over.clone().or_else(|| base.clone()),
        },
        restart: scalar(&base.restart, &over.restart),
        scale: over.scale.or(base.scale),
        deploy: match (&base.deploy, &over.deploy) {
            (Some(base), Some(over)) => Some(base.merge(over)),
            (base, over) => over.clone().or_else(|| base.clone()),
        },
        profiles: simple_list(&base.profiles, &over.profiles),
        stop_grace_period: scalar(&base.stop_grace_period, &over.stop_grace_period),
        stop_signal: scalar(&base.stop_signal, &over.stop_signal),
        container_name: scalar(&base.container_name, &over.container_name),
        platform: scalar(&base.platform, &over.platform),
        // extends is resolved before layers merge; it never survives.
        extends: None,

        labels: base.labels.merge(&over.labels),
        extra_hosts: base.extra_hosts.merge(&over.extra_hosts),
        sysctls: base.sysctls.merge(&over.sysctls),
        logging: match (&base.logging, &over.logging) {
            (Some(base), Some(over)) => Some(base.merge(over)),
            (base, over) => over.clone().or_else(|| base.clone()),
        },

        dns: concat_string_or_list(&base.dns, &over.dns),
        dns_search: concat_string_or_list(&base.dns_search, &over.dns_search),
        dns_opt: concat_string_or_list(&base.dns_opt, &over.dns_opt),

        hostname: scalar(&base.hostname, &over.hostname),
        domainname: scalar(&base.domainname, &over.domainname),
        mac_address: scalar(&base.mac_address, &over.mac_address),
        user: scalar(&base.user, &over.user),
        working_dir: scalar(&base.working_dir, &over.working_dir),
        stdin_open: over.stdin_open.or(base.stdin_open),
        tty: over.tty.or(base.tty),
        read_only: over.read_only.or(base.read_only),
        privileged: over.privileged.or(base.privileged),
        init: over.init.or(base.init),

        cap_add: simple_list(&base.cap_add, &over.cap_add),
        cap_drop: simple_list(&base.cap_drop, &over.cap_drop),
        security_opt: simple_list(&base.security_opt, &over.security_opt),
        group_add: simple_list(&base.group_add, &over.group_add),
        devices: keyed_list(&base.devices, &over.devices, |device| {
            device_container_path(device)
        }),
        device_cgroup_rules: simple_list(&base.device_cgroup_rules, &over.device_cgroup_rules),
        userns_mode: scalar(&base.userns_mode, &over.userns_mode),
        isolation: scalar(&base.isolation, &over.isolation),
        cgroup_parent: scalar(&base.cgroup_parent, &over.cgroup_parent),
        runtime: scalar(&base.runtime, &over.runtime),
        storage_opt: base.storage_opt.merge(&over.storage_opt),
        ulimits: mapping(&base.ulimits, &over.ulimits),

        mem_limit: over.mem_limit.or(base.mem_limit),
        mem_reservation: over.mem_reservation.or(base.mem_reservation),
        memswap_limit: over.memswap_limit.or(base.memswap_limit),
        mem_swappiness: over.mem_swappiness.or(base.mem_swappiness),
        cpus: over.cpus.or(base.cpus),
        cpu_shares: over.cpu_shares.or(base.cpu_shares),
        cpuset: scalar(&base.cpuset, &over.cpuset),
        cpu_quota: over.cpu_quota.or(base.cpu_quota),
        cpu_period: over.cpu_period.or(base.cpu_period),
        oom_kill_disable: over.oom_kill_disable.or(base.oom_kill_disable),
        oom_score_adj: over.oom_score_adj.or(base.oom_score_adj),
        pids_limit: over.pids_limit.or(base.pids_limit),
        shm_size: over.shm_size.or(base.shm_size),
        blkio_config: scalar(&base.blkio_config, &over.blkio_config),
    }
}

fn merge_image_and_build(
    base: &ServiceConfig,
    over: &ServiceConfig,
) -> (Option<String>, Option<BuildField>) {
    let image = scalar(&base.image, &over.image);
    let build = match (&base.build, &over.build) {
        (Some(base_build), Some(over_build)) => Some(BuildField::Spec(
            base_build.to_spec().merge(&over_build.to_spec()),
        )),
        (base_build, over_build) => over_build.clone().or_else(|| base_build.clone()),
    };
    if over.image.is_some() && over.build.is_none() && base.build.is_some() {
        return (image, None);
    }
    if over.build.is_some() && over.image.is_none() && base.image.is_some() {
        return (None, build);
    }
    (image, build)
}

/// Scalar rule: override wins when present
fn scalar<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
    over.clone().or_else(|| base.clone())
}

/// Simple-list rule: concatenate preserving order, de-duplicate by value
fn simple_list<T: Clone + Eq + std::hash::Hash>(base: &[T], over: &[T]) -> Vec<T> {
    unique_everseen(base.iter().chain(over.iter()).cloned())
}

fn concat_string_or_list(base: &StringOrList, over: &StringOrList) -> StringOrList {
    let combined = unique_everseen(base.to_vec().into_iter().chain(over.to_vec()));
    if combined.is_empty() {
        StringOrList::None
    } else {
        StringOrList::Many(combined)
    }
}

/// Keyed-list rule: later entries replace earlier ones with the same key,
/// at the earlier entry's position; new keys append in order
fn keyed_list<T: Clone, K: Eq + std::hash::Hash>(
    base: &[T],
    over: &[T],
    key: impl Fn(&T) -> K,
) -> Vec<T> {
    let mut merged: Vec<T> = base.to_vec();
    for entry in over {
        let entry_key = key(entry);
        match merged.iter().position(|existing| key(existing) == entry_key) {
            Some(index) => merged[index] = entry.clone(),
            None => merged.push(entry.clone()),
        }
    }
    merged
}

/// Mapping rule: key-wise merge, override wins per key
fn mapping<V: Clone>(base: &IndexMap<String, V>, over: &IndexMap<String, V>) -> IndexMap<String, V> {
    let mut merged = base.clone();
    for (key, value) in over {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn merge_ports(base: &ServicePorts, over: &ServicePorts) -> ServicePorts {
    ServicePorts(keyed_list(&base.0, &over.0, |port| port.merge_key()))
}

/// Volumes override by target; a bind override replaces the base spec
/// entirely, mode included
fn merge_volumes(base: &[VolumeSpec], over: &[VolumeSpec]) -> Vec<VolumeSpec> {
    keyed_list(base, over, |volume| volume.target().to_string())
}

fn merge_networks(
    base: &ServiceConfig,
    over: &ServiceConfig,
) -> super::types::NetworkAttachments {
    let mut merged = base.networks.0.clone();
    for (name, attachment) in &over.networks.0 {
        let combined = match merged.get(name) {
            Some(existing) => existing.merge(attachment),
            None => attachment.clone(),
        };
        merged.insert(name.clone(), combined);
    }
    super::types::NetworkAttachments(merged)
}

fn device_container_path(device: &str) -> String {
    let parts: Vec<&str> = device.split(':').collect();
    match parts.as_slice() {
        [_, container, ..] => (*container).to_string(),
        _ => device.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(value: serde_json::Value) -> ServiceConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_merge_is_idempotent() {
        let config = service(json!({
            "image": "busybox",
            "command": "top",
            "ports": ["8000:8000"],
            "environment": {"A": "1"},
            "volumes": ["./src:/app", "data:/var/data"],
            "depends_on": ["db"],
            "labels": {"x": "y"},
            "dns": ["8.8.8.8"]
        }));
        assert_eq!(merge_service(&config, &config), config);
    }

    #[test]
    fn test_scalar_override_wins() {
        let base = service(json!({"image": "busybox", "user": "root"}));
        let over = service(json!({"user": "web"}));
        let merged = merge_service(&base, &over);
        assert_eq!(merged.image.as_deref(), Some("busybox"));
        assert_eq!(merged.user.as_deref(), Some("web"));
    }

    #[test]
    fn test_image_drops_base_build() {
        let base = service(json!({"build": "."}));
        let over = service(json!({"image": "busybox"}));
        let merged = merge_service(&base, &over);
        assert_eq!(merged.image.as_deref(), Some("busybox"));
        assert!(merged.build.is_none());
    }

    #[test]
    fn test_build_drops_base_image() {
        let base = service(json!({"image": "busybox"}));
        let over = service(json!({"build": "."}));
        let merged = merge_service(&base, &over);
        assert!(merged.image.is_none());
        assert!(merged.build.is_some());
    }

    #[test]
    fn test_ports_deduplicate_by_merge_key() {
        let base = service(json!({"ports": ["8000:8000", "9000:9000"]}));
        let over = service(json!({"ports": ["8000:8000", "7000:7000"]}));
        let merged = merge_service(&base, &over);
        assert_eq!(merged.ports.0.len(), 3);
    }

    #[test]
    fn test_volumes_override_by_target() {
        let base = service(json!({"volumes": ["./base:/app:ro", "data:/data"]}));
        let over = service(json!({"volumes": ["./over:/app", "cache:/cache"]}));
        let merged = merge_service(&base, &over);
        assert_eq!(merged.volumes.len(), 3);
        // Same target: override replaces entirely, including the mode.
        assert_eq!(
            merged.volumes[0],
            VolumeSpec::Bind {
                source: "./over".into(),
                target: "/app".into(),
                read_only: false,
                propagation: None,
            }
        );
        assert_eq!(merged.volumes[2].target(), "/cache");
    }

    #[test]
    fn test_environment_key_wise() {
        let base = service(json!({"environment": {"A": "1", "B": "2"}}));
        let over = service(json!({"environment": ["B=3", "C=4"]}));
        let merged = merge_service(&base, &over);
        assert_eq!(merged.environment.0["A"], Some("1".to_string()));
        assert_eq!(merged.environment.0["B"], Some("3".to_string()));
        assert_eq!(merged.environment.0["C"], Some("4".to_string()));
    }

    #[test]
    fn test_depends_on_short_form_promotion() {
        let base = service(json!({"depends_on": ["db"]}));
        let over = service(json!({"depends_on": {"cache": {"condition": "service_healthy"}}}));
        let merged = merge_service(&base, &over);
        assert_eq!(
            merged.depends_on.0["db"],
            super::super::types::DependsOnCondition::ServiceStarted
        );
        assert_eq!(
            merged.depends_on.0["cache"],
            super::super::types::DependsOnCondition::ServiceHealthy
        );
    }

    #[test]
    fn test_simple_list_dedup() {
        let base = service(json!({"dns": "8.8.8.8"}));
        let over = service(json!({"dns": ["8.8.8.8", "1.1.1.1"]}));
        let merged = merge_service(&base, &over);
        assert_eq!(merged.dns.to_vec(), vec!["8.8.8.8", "1.1.1.1"]);
    }

    #[test]
    fn test_build_args_key_wise_and_cache_from_union() {
        let base = service(json!({
            "build": {"context": ".", "args": {"A": "1"}, "cache_from": ["app:prev"]}
        }));
        let over = service(json!({
            "build": {"context": ".", "args": {"B": "2"}, "cache_from": ["app:prev", "app:dev"]}
        }));
        let merged = merge_service(&base, &over);
        let spec = merged.build.unwrap().to_spec();
        assert_eq!(spec.args["A"], Some("1".to_string()));
        assert_eq!(spec.args["B"], Some("2".to_string()));
        assert_eq!(spec.cache_from, vec!["app:prev", "app:dev"]);
    }

    #[test]
    fn test_network_attachment_merge() {
        let base = service(json!({"networks": {"front": {"aliases": ["web"]}}}));
        let over = service(json!({
            "networks": {"front": {"aliases": ["www"], "ipv4_address": "172.16.0.10"}}
        }));
        let merged = merge_service(&base, &over);
        let front = &merged.networks.0["front"];
        assert_eq!(front.aliases, vec!["web", "www"]);
        assert_eq!(front.ipv4_address.as_deref(), Some("172.16.0.10"));
    }

    #[test]
    fn test_links_merge_by_alias() {
        let base = service(json!({"links": ["db:database", "cache"]}));
        let over = service(json!({"links": ["postgres:database"]}));
        let merged = merge_service(&base, &over);
        assert_eq!(merged.links.len(), 2);
        assert_eq!(merged.links[0].target, "postgres");
        assert_eq!(merged.links[0].alias(), "database");
    }
}
