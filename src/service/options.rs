//! Container create-option assembly.
//!
//! Turns a merged service declaration plus the runtime context (replica
//! number, resolved links and namespace modes, predecessor container) into
//! the engine's create request: the `Config`/`HostConfig`/
//! `NetworkingConfig` split, the environment priority chain, the volume
//! split into mountpoint declarations, bind strings and mount objects, and
//! the reserved label set.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde_json::json;

use crate::client::{
    version_gte, ContainerConfig, ContainerCreateOptions, DeviceMapping, EndpointConfig,
    HealthConfig, HostConfig, LogConfig, Mount, NetworkingConfig, PortBinding,
};
use crate::config::{
    CommandSpec, Environment, FileReference, Healthcheck, HealthcheckTest, NetworkAttachment,
    ServiceConfig, VolumeSpec,
};
use crate::container::Container;
use crate::errors::{ComposeError, Result};
use crate::labels::{
    LABEL_CONFIG_HASH, LABEL_CONTAINER_NUMBER, LABEL_ONE_OFF, LABEL_PROJECT, LABEL_SERVICE,
    LABEL_SLUG, LABEL_VERSION,
};
use crate::utils::{parse_compose_duration, unique_everseen};

/// Where secret bind mounts land unless the reference names an absolute
/// target
pub const SECRETS_PATH: &str = "/run/secrets";

/// Caller-supplied overrides for one-off (`run`) containers
#[derive(Debug, Clone, Default)]
pub struct OneOffOverrides {
    /// Replace the service command
    pub command: Option<CommandSpec>,
    /// Replace the service entrypoint
    pub entrypoint: Option<CommandSpec>,
    /// Extra environment, highest priority
    pub environment: Environment,
    /// Replace the user
    pub user: Option<String>,
    /// Allocate a tty
    pub tty: Option<bool>,
    /// Keep stdin open
    pub stdin_open: Option<bool>,
    /// Publish the service's ports (off by default for one-offs)
    pub service_ports: bool,
    /// Use a specific container name
    pub name: Option<String>,
}

/// Everything the assembly needs beyond the declaration itself
pub struct CreateContext<'a> {
    /// Project name
    pub project: &'a str,
    /// The merged service declaration (volumes already namespaced)
    pub service: &'a ServiceConfig,
    /// Negotiated engine API version
    pub api_version: &'a str,
    /// Replica number (1 for one-offs)
    pub number: u32,
    /// Whether this is a `run` container
    pub one_off: bool,
    /// One-off slug
    pub slug: Option<&'a str>,
    /// The container name to create under
    pub container_name: String,
    /// Config hash label value; absent for one-offs
    pub config_hash: Option<&'a str>,
    /// Resolved links as `(container_name, alias)` pairs
    pub links: Vec<(String, String)>,
    /// Resolved `volumes_from` container references
    pub volumes_from: Vec<String>,
    /// Resolved network mode string
    pub network_mode: Option<String>,
    /// Resolved PID mode string
    pub pid_mode: Option<String>,
    /// Resolved IPC mode string
    pub ipc_mode: Option<String>,
    /// First-priority network and its endpoint data, when networking
    pub networking: Option<NetworkingContext>,
    /// The predecessor container during recreate
    pub previous: Option<&'a Container>,
    /// Discard the predecessor's anonymous volumes instead of reusing them
    pub renew_anonymous_volumes: bool,
    /// Secret references with their resolved host files
    pub secret_host_files: Vec<(FileReference, String)>,
    /// Caller-injected labels
    pub extra_labels: &'a [(String, String)],
    /// Lowest-priority environment (proxy settings and the like)
    pub proxy_environment: &'a IndexMap<String, String>,
    /// One-off overrides; `None` for replicated containers
    pub overrides: Option<&'a OneOffOverrides>,
}

/// The endpoint configuration of the highest-priority network
pub struct NetworkingContext {
    /// Engine-side network name
    pub network: String,
    /// The declared attachment
    pub attachment: NetworkAttachment,
    /// Aliases to register (service name plus declared aliases)
    pub aliases: Vec<String>,
}

/// Assemble the engine create request
pub fn build_create_options(ctx: &CreateContext<'_>) -> Result<ContainerCreateOptions> {
    let service = ctx.service;
    let overrides = ctx.overrides;

    let mut env = environment_chain(ctx);

    let (volume_declarations, mut binds, tmpfs_map, affinity) = split_volumes(ctx)?;
    if let Some(affinity) = affinity {
        env.insert("affinity:container".into(), Some(affinity));
    }

    let mut mounts: Vec<Mount> = Vec::new();
    let modern_mounts = version_gte(ctx.api_version, "1.30");
    let mut volumes = volume_declarations;
    for (reference, host_file) in &ctx.secret_host_files {
        let target = secret_target(reference);
        if modern_mounts {
            mounts.push(Mount {
                mount_type: "bind".into(),
                source: Some(host_file.clone()),
                target,
                read_only: true,
                bind_options: None,
                volume_options: None,
                tmpfs_options: None,
            });
        } else {
            binds.push(format!("{host_file}:{target}:ro"));
            volumes.insert(target, json!({}));
        }
    }
    binds = unique_everseen(binds);

    let publish_ports = !ctx.one_off || overrides.is_some_and(|o| o.service_ports);
    let (exposed_ports, port_bindings) = build_ports(service, publish_ports);

    let command = overrides
        .and_then(|o| o.command.clone())
        .or_else(|| service.command.clone());
    let entrypoint = overrides
        .and_then(|o| o.entrypoint.clone())
        .or_else(|| service.entrypoint.clone());

    let stop_timeout = match (&service.stop_grace_period, version_gte(ctx.api_version, "1.25")) {
        (Some(period), true) => Some(parse_compose_duration(period)?.as_secs() as i64),
        _ => None,
    };

    let config = ContainerConfig {
        image: image_name(ctx.project, service),
        hostname: service.hostname.clone(),
        domainname: service.domainname.clone(),
        user: overrides
            .and_then(|o| o.user.clone())
            .or_else(|| service.user.clone()),
        cmd: command.map(|cmd| cmd.to_argv()),
        entrypoint: entrypoint.map(|cmd| cmd.to_argv()),
        env: format_environment(&env),
        labels: build_labels(ctx),
        exposed_ports,
        volumes,
        working_dir: service.working_dir.clone(),
        stdin_open: overrides
            .and_then(|o| o.stdin_open)
            .or(service.stdin_open)
            .unwrap_or(false),
        tty: overrides.and_then(|o| o.tty).or(service.tty).unwrap_or(false),
        stop_signal: service.stop_signal.clone(),
        stop_timeout,
        healthcheck: service
            .healthcheck
            .as_ref()
            .map(build_healthcheck)
            .transpose()?,
        mac_address: service.mac_address.clone(),
    };

    let host_config = build_host_config(ctx, binds, mounts, tmpfs_map, port_bindings)?;

    let networking_config = ctx.networking.as_ref().map(|networking| {
        let mut endpoint = EndpointConfig {
            aliases: networking.aliases.clone(),
            ipv4_address: networking.attachment.ipv4_address.clone(),
            ipv6_address: networking.attachment.ipv6_address.clone(),
            link_local_ips: networking.attachment.link_local_ips.clone(),
            links: Vec::new(),
        };
        endpoint.links = ctx
            .links
            .iter()
            .map(|(container, alias)| format!("{container}:{alias}"))
            .collect();
        NetworkingConfig {
            endpoints_config: BTreeMap::from([(networking.network.clone(), endpoint)]),
        }
    });

    Ok(ContainerCreateOptions {
        name: ctx.container_name.clone(),
        config,
        host_config,
        networking_config,
    })
}

/// The image reference: the declared image, or the project-local build tag
pub fn image_name(project: &str, service: &ServiceConfig) -> String {
    match &service.image {
        Some(image) => image.clone(),
        None => format!(
            "{}_{}",
            project.trim_start_matches(['_', '-']),
            service.name
        ),
    }
}

/// The environment priority chain: proxy config, then the service
/// environment (env files already folded in at load), then overrides
fn environment_chain(ctx: &CreateContext<'_>) -> IndexMap<String, Option<String>> {
    let mut env: IndexMap<String, Option<String>> = ctx
        .proxy_environment
        .iter()
        .map(|(key, value)| (key.clone(), Some(value.clone())))
        .collect();
    for (key, value) in &ctx.service.environment.0 {
        env.insert(key.clone(), value.clone());
    }
    if let Some(overrides) = ctx.overrides {
        for (key, value) in &overrides.environment.0 {
            env.insert(key.clone(), value.clone());
        }
    }
    env
}

fn format_environment(env: &IndexMap<String, Option<String>>) -> Vec<String> {
    env.iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{key}={value}"),
            None => key.clone(),
        })
        .collect()
}

fn build_labels(ctx: &CreateContext<'_>) -> BTreeMap<String, String> {
    let mut labels: BTreeMap<String, String> = ctx
        .service
        .labels
        .0
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (key, value) in ctx.extra_labels {
        labels.insert(key.clone(), value.clone());
    }
    labels.insert(LABEL_PROJECT.into(), ctx.project.to_string());
    labels.insert(LABEL_SERVICE.into(), ctx.service.name.clone());
    labels.insert(
        LABEL_ONE_OFF.into(),
        if ctx.one_off { "True" } else { "False" }.into(),
    );
    labels.insert(LABEL_VERSION.into(), crate::VERSION.into());
    if !ctx.one_off {
        labels.insert(LABEL_CONTAINER_NUMBER.into(), ctx.number.to_string());
    }
    if let Some(hash) = ctx.config_hash {
        labels.insert(LABEL_CONFIG_HASH.into(), hash.to_string());
    }
    if let Some(slug) = ctx.slug {
        labels.insert(LABEL_SLUG.into(), slug.to_string());
    }
    labels
}

/// Split the declared volumes into internal mountpoint declarations, bind
/// strings and tmpfs entries, reusing the predecessor's anonymous volumes.
///
/// Returns `(volume declarations, binds, tmpfs, affinity hint)`. The
/// affinity hint is set when any predecessor volume was carried over, to
/// steer cluster placement back to the host holding the data.
fn split_volumes(
    ctx: &CreateContext<'_>,
) -> Result<(
    BTreeMap<String, serde_json::Value>,
    Vec<String>,
    BTreeMap<String, String>,
    Option<String>,
)> {
    let mut declarations: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    let mut binds: Vec<String> = Vec::new();
    let mut tmpfs: BTreeMap<String, String> = BTreeMap::new();
    let mut preserved_any = false;

    for entry in ctx.service.tmpfs.to_vec() {
        let (target, options) = match entry.split_once(':') {
            Some((target, options)) => (target.to_string(), options.to_string()),
            None => (entry, String::new()),
        };
        tmpfs.insert(target, options);
    }

    for volume in &ctx.service.volumes {
        match volume {
            VolumeSpec::Anonymous { target } => {
                declarations.insert(target.clone(), json!({}));
                if ctx.renew_anonymous_volumes {
                    continue;
                }
                // Reuse the engine-generated volume backing the same
                // destination on the predecessor, so the data survives the
                // recreate.
                if let Some(previous) = ctx.previous {
                    if let Some(mount) = previous.mount_for(target) {
                        if mount.mount_type == "volume" {
                            if let Some(name) = &mount.name {
                                binds.push(format!(
                                    "{name}:{target}:{}",
                                    if mount.rw { "rw" } else { "ro" }
                                ));
                                preserved_any = true;
                            }
                        }
                    }
                }
            }
            VolumeSpec::Tmpfs { target, size } => {
                let options = size.map(|size| format!("size={size}")).unwrap_or_default();
                tmpfs.insert(target.clone(), options);
            }
            VolumeSpec::Bind { target, .. }
            | VolumeSpec::Named { target, .. }
            | VolumeSpec::NamedPipe { target, .. } => {
                declarations.insert(target.clone(), json!({}));
                let bind = volume.bind_string().unwrap_or_else(|| {
                    // Named pipes have no mode suffix.
                    match volume {
                        VolumeSpec::NamedPipe { source, target } => format!("{source}:{target}"),
                        _ => unreachable!("bind_string covers bind and named specs"),
                    }
                });
                binds.push(bind);
            }
        }
    }

    // The affinity hint formats as `affinity:container==<id>` once the
    // key=value pair is joined.
    let affinity = if preserved_any {
        ctx.previous.map(|previous| format!("={}", previous.id()))
    } else {
        None
    };
    Ok((declarations, binds, tmpfs, affinity))
}

fn secret_target(reference: &FileReference) -> String {
    match &reference.target {
        Some(target) if target.starts_with('/') => target.clone(),
        Some(target) => format!("{SECRETS_PATH}/{target}"),
        None => format!("{SECRETS_PATH}/{}", reference.source),
    }
}

fn build_ports(
    service: &ServiceConfig,
    publish: bool,
) -> (
    BTreeMap<String, serde_json::Value>,
    BTreeMap<String, Vec<PortBinding>>,
) {
    let mut exposed: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    let mut bindings: BTreeMap<String, Vec<PortBinding>> = BTreeMap::new();

    for port in &service.ports.0 {
        let key = port.engine_port();
        exposed.insert(key.clone(), json!({}));
        if !publish {
            continue;
        }
        bindings.entry(key).or_default().push(PortBinding {
            host_ip: port.external_ip.clone().unwrap_or_default(),
            host_port: port
                .published
                .map(|published| published.to_string())
                .unwrap_or_default(),
        });
    }

    for expose in &service.expose {
        let spec = match expose {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let key = if spec.contains('/') {
            spec
        } else {
            format!("{spec}/tcp")
        };
        exposed.insert(key, json!({}));
    }

    (exposed, bindings)
}

fn build_healthcheck(healthcheck: &Healthcheck) -> Result<HealthConfig> {
    if healthcheck.disable {
        return Ok(HealthConfig {
            test: Some(vec!["NONE".into()]),
            ..Default::default()
        });
    }
    let to_nanos = |value: &Option<String>| -> Result<Option<i64>> {
        value
            .as_deref()
            .map(|text| parse_compose_duration(text).map(|d| d.as_nanos() as i64))
            .transpose()
    };
    Ok(HealthConfig {
        test: healthcheck.test.as_ref().map(HealthcheckTest::to_engine),
        interval: to_nanos(&healthcheck.interval)?,
        timeout: to_nanos(&healthcheck.timeout)?,
        retries: healthcheck.retries,
        start_period: to_nanos(&healthcheck.start_period)?,
    })
}

fn build_host_config(
    ctx: &CreateContext<'_>,
    binds: Vec<String>,
    mounts: Vec<Mount>,
    tmpfs: BTreeMap<String, String>,
    port_bindings: BTreeMap<String, Vec<PortBinding>>,
) -> Result<HostConfig> {
    let service = ctx.service;

    let devices = service
        .devices
        .iter()
        .map(|device| {
            let parts: Vec<&str> = device.split(':').collect();
            match parts.as_slice() {
                [host] => Ok(DeviceMapping {
                    path_on_host: (*host).into(),
                    path_in_container: (*host).into(),
                    cgroup_permissions: "rwm".into(),
                }),
                [host, container] => Ok(DeviceMapping {
                    path_on_host: (*host).into(),
                    path_in_container: (*container).into(),
                    cgroup_permissions: "rwm".into(),
                }),
                [host, container, permissions] => Ok(DeviceMapping {
                    path_on_host: (*host).into(),
                    path_in_container: (*container).into(),
                    cgroup_permissions: (*permissions).into(),
                }),
                _ => Err(ComposeError::configuration(format!(
                    "Invalid device specification: {device}"
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let nano_cpus = service.cpus.map(|cpus| (cpus * 1e9) as i64);

    Ok(HostConfig {
        binds,
        mounts,
        port_bindings,
        links: ctx
            .links
            .iter()
            .map(|(container, alias)| format!("{container}:{alias}"))
            .collect(),
        volumes_from: ctx.volumes_from.clone(),
        network_mode: ctx.network_mode.clone(),
        pid_mode: ctx.pid_mode.clone(),
        ipc_mode: ctx.ipc_mode.clone(),
        restart_policy: if ctx.one_off {
            // One-off containers never restart.
            None
        } else {
            service
                .restart
                .as_ref()
                .map(|restart| restart.to_engine())
                .transpose()?
        },
        privileged: service.privileged.unwrap_or(false),
        cap_add: service.cap_add.clone(),
        cap_drop: service.cap_drop.clone(),
        dns: service.dns.to_vec(),
        dns_opt: service.dns_opt.to_vec(),
        dns_search: service.dns_search.to_vec(),
        extra_hosts: service.extra_hosts.to_engine(),
        security_opt: service.security_opt.clone(),
        tmpfs,
        sysctls: service
            .sysctls
            .0
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        ulimits: service
            .ulimits
            .iter()
            .map(|(name, spec)| spec.to_engine(name))
            .collect(),
        log_config: service.logging.as_ref().map(|logging| LogConfig {
            log_type: logging.driver.clone().unwrap_or_else(|| "json-file".into()),
            config: logging
                .options
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }),
        mem_limit: service.mem_limit.map(|bytes| bytes.0),
        mem_reservation: service.mem_reservation.map(|bytes| bytes.0),
        memswap_limit: service.memswap_limit.map(|bytes| bytes.0),
        mem_swappiness: service.mem_swappiness,
        nano_cpus,
        cpu_shares: service.cpu_shares,
        cpuset_cpus: service.cpuset.clone(),
        cpu_quota: service.cpu_quota,
        cpu_period: service.cpu_period,
        oom_kill_disable: service.oom_kill_disable,
        oom_score_adj: service.oom_score_adj,
        pids_limit: service.pids_limit,
        shm_size: service.shm_size.map(|bytes| bytes.0),
        read_only: service.read_only.unwrap_or(false),
        init: service.init,
        group_add: service.group_add.clone(),
        userns_mode: service.userns_mode.clone(),
        isolation: service.isolation.clone(),
        cgroup_parent: service.cgroup_parent.clone(),
        runtime: service.runtime.clone(),
        storage_opt: service
            .storage_opt
            .0
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        devices,
        device_cgroup_rules: service.device_cgroup_rules.clone(),
        blkio_weight: service.blkio_config.as_ref().and_then(|blkio| blkio.weight),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(value: serde_json::Value) -> ServiceConfig {
        let mut config: ServiceConfig = serde_json::from_value(value).unwrap();
        config.name = "web".into();
        config
    }

    fn context<'a>(
        service: &'a ServiceConfig,
        proxy: &'a IndexMap<String, String>,
    ) -> CreateContext<'a> {
        CreateContext {
            project: "app",
            service,
            api_version: "1.41",
            number: 1,
            one_off: false,
            slug: None,
            container_name: "app_web_1".into(),
            config_hash: Some("abc123"),
            links: Vec::new(),
            volumes_from: Vec::new(),
            network_mode: None,
            pid_mode: None,
            ipc_mode: None,
            networking: None,
            previous: None,
            renew_anonymous_volumes: false,
            secret_host_files: Vec::new(),
            extra_labels: &[],
            proxy_environment: proxy,
            overrides: None,
        }
    }

    #[test]
    fn test_reserved_labels_present() {
        let service = service(json!({"image": "busybox", "labels": {"custom": "1"}}));
        let proxy = IndexMap::new();
        let options = build_create_options(&context(&service, &proxy)).unwrap();
        let labels = &options.config.labels;
        assert_eq!(labels[LABEL_PROJECT], "app");
        assert_eq!(labels[LABEL_SERVICE], "web");
        assert_eq!(labels[LABEL_ONE_OFF], "False");
        assert_eq!(labels[LABEL_CONTAINER_NUMBER], "1");
        assert_eq!(labels[LABEL_CONFIG_HASH], "abc123");
        assert_eq!(labels["custom"], "1");
        assert!(labels.contains_key(LABEL_VERSION));
    }

    #[test]
    fn test_environment_priority_chain() {
        let service = service(json!({
            "image": "busybox",
            "environment": {"SHARED": "service", "ONLY_SERVICE": "1"}
        }));
        let proxy = IndexMap::from([
            ("SHARED".to_string(), "proxy".to_string()),
            ("HTTP_PROXY".to_string(), "http://p".to_string()),
        ]);
        let options = build_create_options(&context(&service, &proxy)).unwrap();
        assert!(options.config.env.contains(&"SHARED=service".to_string()));
        assert!(options
            .config
            .env
            .contains(&"HTTP_PROXY=http://p".to_string()));
    }

    #[test]
    fn test_volume_split() {
        let service = service(json!({
            "image": "busybox",
            "volumes": ["/anon", "./src:/app:ro", "app_data:/data"],
            "tmpfs": "/scratch"
        }));
        let proxy = IndexMap::new();
        let options = build_create_options(&context(&service, &proxy)).unwrap();
        assert!(options.config.volumes.contains_key("/anon"));
        assert!(options.config.volumes.contains_key("/app"));
        assert!(options.config.volumes.contains_key("/data"));
        assert!(options
            .host_config
            .binds
            .iter()
            .any(|bind| bind.ends_with(":/app:ro")));
        assert!(options
            .host_config
            .binds
            .contains(&"app_data:/data:rw".to_string()));
        assert!(options.host_config.tmpfs.contains_key("/scratch"));
    }

    #[test]
    fn test_anonymous_volume_preserved_from_previous() {
        use crate::client::{ContainerDetails, MountPoint};
        let service = service(json!({"image": "busybox", "volumes": ["/data"]}));
        let previous = Container::new(
            std::sync::Arc::new(crate::testing::NullEngine),
            ContainerDetails {
                id: "cafebabe0123".into(),
                name: "/app_web_1".into(),
                mounts: vec![MountPoint {
                    mount_type: "volume".into(),
                    name: Some("generated123".into()),
                    destination: "/data".into(),
                    rw: true,
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        let proxy = IndexMap::new();
        let mut ctx = context(&service, &proxy);
        ctx.previous = Some(&previous);
        let options = build_create_options(&ctx).unwrap();
        assert!(options
            .host_config
            .binds
            .contains(&"generated123:/data:rw".to_string()));
        assert!(options
            .config
            .env
            .contains(&"affinity:container==cafebabe0123".to_string()));
    }

    #[test]
    fn test_renew_anonymous_volumes_skips_preservation() {
        use crate::client::{ContainerDetails, MountPoint};
        let service = service(json!({"image": "busybox", "volumes": ["/data"]}));
        let previous = Container::new(
            std::sync::Arc::new(crate::testing::NullEngine),
            ContainerDetails {
                id: "cafebabe0123".into(),
                name: "/app_web_1".into(),
                mounts: vec![MountPoint {
                    mount_type: "volume".into(),
                    name: Some("generated123".into()),
                    destination: "/data".into(),
                    rw: true,
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        let proxy = IndexMap::new();
        let mut ctx = context(&service, &proxy);
        ctx.previous = Some(&previous);
        ctx.renew_anonymous_volumes = true;
        let options = build_create_options(&ctx).unwrap();
        assert!(options.host_config.binds.is_empty());
    }

    #[test]
    fn test_secret_mounts() {
        let service = service(json!({"image": "busybox"}));
        let proxy = IndexMap::new();
        let mut ctx = context(&service, &proxy);
        ctx.secret_host_files = vec![(
            FileReference {
                source: "db_password".into(),
                target: None,
                uid: None,
                gid: None,
                mode: None,
            },
            "/host/secrets/db_password".into(),
        )];
        let options = build_create_options(&ctx).unwrap();
        let mount = &options.host_config.mounts[0];
        assert_eq!(mount.target, "/run/secrets/db_password");
        assert_eq!(mount.source.as_deref(), Some("/host/secrets/db_password"));
        assert!(mount.read_only);
    }

    #[test]
    fn test_ports_not_published_for_one_off() {
        let service = service(json!({"image": "busybox", "ports": ["8000:8000"]}));
        let proxy = IndexMap::new();
        let overrides = OneOffOverrides::default();
        let mut ctx = context(&service, &proxy);
        ctx.one_off = true;
        ctx.overrides = Some(&overrides);
        let options = build_create_options(&ctx).unwrap();
        assert!(options.config.exposed_ports.contains_key("8000/tcp"));
        assert!(options.host_config.port_bindings.is_empty());
    }

    #[test]
    fn test_healthcheck_conversion() {
        let service = service(json!({
            "image": "busybox",
            "healthcheck": {"test": "curl -f localhost", "interval": "30s", "retries": 3}
        }));
        let proxy = IndexMap::new();
        let options = build_create_options(&context(&service, &proxy)).unwrap();
        let healthcheck = options.config.healthcheck.unwrap();
        assert_eq!(
            healthcheck.test.unwrap(),
            vec!["CMD-SHELL".to_string(), "curl -f localhost".to_string()]
        );
        assert_eq!(healthcheck.interval, Some(30_000_000_000));
        assert_eq!(healthcheck.retries, Some(3));
    }

    #[test]
    fn test_restart_policy_stripped_for_one_off() {
        let service = service(json!({"image": "busybox", "restart": "always"}));
        let proxy = IndexMap::new();
        let mut ctx = context(&service, &proxy);
        ctx.one_off = true;
        let options = build_create_options(&ctx).unwrap();
        assert!(options.host_config.restart_policy.is_none());
    }
}
