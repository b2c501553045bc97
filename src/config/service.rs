//! The typed declaration of one service.
//!
//! [`ServiceConfig`] is the deserialized form of a single `services:` entry
//! after interpolation. Fields keep their file-format shapes (string-or-list
//! commands, short or long volume forms) via the types in
//! [`crate::config::types`]; normalization and layer-merging happen in the
//! load pipeline.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::types::{
    ByteValue, CommandSpec, DependsOn, Environment, ExtendsSpec, ExtraHosts, FileReference,
    Healthcheck, Labels, NetworkAttachments, RestartSpec, ServiceLink, ServicePorts, StringOrList,
    UlimitSpec, VolumeSpec, VolumesFrom,
};

/// The `build` block: bare context string or full mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context directory (resolved against the file's directory)
    pub context: String,
    /// Dockerfile path relative to the context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    /// Build arguments
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub args: IndexMap<String, Option<String>>,
    /// Images used as cache sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cache_from: Vec<String>,
    /// Labels on the built image
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Network used by build-time containers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Target build stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// `/dev/shm` size for build containers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<ByteValue>,
    /// Extra `/etc/hosts` entries for build containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_hosts: Vec<String>,
    /// Isolation technology
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolation: Option<String>,
}

impl BuildSpec {
    /// Merge a build override into this one.
    ///
    /// `args` merge key-wise, `cache_from` as a set union, `labels`
    /// key-wise; the remaining fields follow scalar override-wins.
    pub fn merge(&self, other: &Self) -> Self {
        let mut args = self.args.clone();
        for (key, value) in &other.args {
            args.insert(key.clone(), value.clone());
        }
        let mut cache_from: IndexSet<String> = self.cache_from.iter().cloned().collect();
        cache_from.extend(other.cache_from.iter().cloned());
        Self {
            context: if other.context.is_empty() {
                self.context.clone()
            } else {
                other.context.clone()
            },
            dockerfile: other.dockerfile.clone().or_else(|| self.dockerfile.clone()),
            args,
            cache_from: cache_from.into_iter().collect(),
            labels: self.labels.merge(&other.labels),
            network: other.network.clone().or_else(|| self.network.clone()),
            target: other.target.clone().or_else(|| self.target.clone()),
            shm_size: other.shm_size.or(self.shm_size),
            extra_hosts: if other.extra_hosts.is_empty() {
                self.extra_hosts.clone()
            } else {
                other.extra_hosts.clone()
            },
            isolation: other.isolation.clone().or_else(|| self.isolation.clone()),
        }
    }
}

/// Accepts `build: ./dir` as well as the full mapping form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildField {
    /// Bare context string
    Context(String),
    /// Full mapping
    Spec(BuildSpec),
}

impl BuildField {
    /// Normalize to the mapping form
    pub fn to_spec(&self) -> BuildSpec {
        match self {
            Self::Context(context) => BuildSpec {
                context: context.clone(),
                ..Default::default()
            },
            Self::Spec(spec) => spec.clone(),
        }
    }
}

/// The `logging` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log driver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, String>,
}

impl LoggingConfig {
    /// Merge a logging override into this one.
    ///
    /// An override driver replaces the base driver; when the drivers
    /// differ the base options are discarded, otherwise options merge
    /// key-wise.
    pub fn merge(&self, other: &Self) -> Self {
        let driver = other.driver.clone().or_else(|| self.driver.clone());
        let drivers_differ = other.driver.is_some()
            && self.driver.is_some()
            && other.driver != self.driver;
        let mut options = if drivers_differ {
            IndexMap::new()
        } else {
            self.options.clone()
        };
        for (key, value) in &other.options {
            options.insert(key.clone(), value.clone());
        }
        Self { driver, options }
    }
}

/// The `deploy.placement` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// Placement constraints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    /// Placement preferences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferences: Vec<serde_json::Value>,
    /// Cap on replicas per node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_replicas_per_node: Option<u64>,
}

/// One side of the `deploy.resources` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// CPU quota as a decimal string (`"0.5"`) or number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<serde_json::Value>,
    /// Memory quantity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<ByteValue>,
    /// Device reservations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<serde_json::Value>,
}

/// The `deploy.resources` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Hard limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceSpec>,
    /// Soft reservations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservations: Option<ResourceSpec>,
}

/// The `deploy.restart_policy` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRestartPolicy {
    /// Restart condition (`none`, `on-failure`, `any`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Delay between restarts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,
    /// Maximum restart attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u64>,
    /// Window used to judge restart success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
}

/// The `deploy` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// `replicated` (default) or `global`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Replica count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u64>,
    /// Deploy labels
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Placement constraints and preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementConfig>,
    /// Resource limits and reservations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesConfig>,
    /// Restart policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<DeployRestartPolicy>,
    /// Endpoint mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_mode: Option<String>,
}

impl DeployConfig {
    /// Recursive merge per the layer-merge algebra: labels key-wise,
    /// placement constraints/preferences union, resources and
    /// restart_policy key-wise.
    pub fn merge(&self, other: &Self) -> Self {
        let placement = match (&self.placement, &other.placement) {
            (Some(base), Some(over)) => {
                let mut constraints: IndexSet<String> = base.constraints.iter().cloned().collect();
                constraints.extend(over.constraints.iter().cloned());
                let mut preferences = base.preferences.clone();
                for pref in &over.preferences {
                    if !preferences.contains(pref) {
                        preferences.push(pref.clone());
                    }
                }
                Some(PlacementConfig {
                    constraints: constraints.into_iter().collect(),
                    preferences,
                    max_replicas_per_node: over
                        .max_replicas_per_node
                        .or(base.max_replicas_per_node),
                })
            }
            (base, over) => over.clone().or_else(|| base.clone()),
        };
        let resources = match (&self.resources, &other.resources) {
            (Some(base), Some(over)) => Some(ResourcesConfig {
                limits: merge_resource_spec(&base.limits, &over.limits),
                reservations: merge_resource_spec(&base.reservations, &over.reservations),
            }),
            (base, over) => over.clone().or_else(|| base.clone()),
        };
        let restart_policy = match (&self.restart_policy, &other.restart_policy) {
            (Some(base), Some(over)) => Some(DeployRestartPolicy {
                condition: over.condition.clone().or_else(|| base.condition.clone()),
                delay: over.delay.clone().or_else(|| base.delay.clone()),
                max_attempts: over.max_attempts.or(base.max_attempts),
                window: over.window.clone().or_else(|| base.window.clone()),
            }),
            (base, over) => over.clone().or_else(|| base.clone()),
        };
        Self {
            mode: other.mode.clone().or_else(|| self.mode.clone()),
            replicas: other.replicas.or(self.replicas),
            labels: self.labels.merge(&other.labels),
            placement,
            resources,
            restart_policy,
            endpoint_mode: other
                .endpoint_mode
                .clone()
                .or_else(|| self.endpoint_mode.clone()),
        }
    }
}

fn merge_resource_spec(
    base: &Option<ResourceSpec>,
    over: &Option<ResourceSpec>,
) -> Option<ResourceSpec> {
    match (base, over) {
        (Some(base), Some(over)) => Some(ResourceSpec {
            cpus: over.cpus.clone().or_else(|| base.cpus.clone()),
            memory: over.memory.or(base.memory),
            devices: if over.devices.is_empty() {
                base.devices.clone()
            } else {
                over.devices.clone()
            },
        }),
        (base, over) => over.clone().or_else(|| base.clone()),
    }
}

/// The `blkio_config` block (weight only; per-device tuning passes through)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlkioConfig {
    /// Relative block IO weight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    /// Per-device weights
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weight_device: Vec<serde_json::Value>,
    /// Per-device read byte caps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_read_bps: Vec<serde_json::Value>,
    /// Per-device write byte caps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_write_bps: Vec<serde_json::Value>,
}

/// A mapping accepting the `k=v`/`k:v` list form and the mapping form
pub type StringMapping = Labels;

/// One service declaration, as written (typed, pre-normalization)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name; filled from the `services:` key at load
    #[serde(skip_deserializing)]
    pub name: String,

    /// Image reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Build block
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildField>,
    /// Command override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSpec>,
    /// Entrypoint override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<CommandSpec>,

    /// Published ports
    #[serde(skip_serializing_if = "ServicePorts::is_empty")]
    pub ports: ServicePorts,
    /// Exposed (unpublished) ports
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expose: Vec<serde_json::Value>,

    /// Environment variables
    #[serde(skip_serializing_if = "Environment::is_empty")]
    pub environment: Environment,
    /// Environment files, in priority order (later wins)
    #[serde(skip_serializing_if = "StringOrList::is_none")]
    pub env_file: StringOrList,

    /// Volume specifications
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,
    /// Volumes inherited from services or containers
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<VolumesFrom>,
    /// Tmpfs mounts (short form)
    #[serde(skip_serializing_if = "StringOrList::is_none")]
    pub tmpfs: StringOrList,

    /// Legacy links
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<ServiceLink>,
    /// Links to containers outside the project
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub external_links: Vec<String>,
    /// Startup dependencies
    #[serde(skip_serializing_if = "DependsOn::is_empty")]
    pub depends_on: DependsOn,

    /// Network mode string (`host`, `service:db`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// Legacy v1 `net:` string; translated to `network_mode` at load
    #[serde(skip_serializing)]
    pub net: Option<String>,
    /// Network attachments
    #[serde(skip_serializing_if = "NetworkAttachments::is_empty")]
    pub networks: NetworkAttachments,
    /// PID namespace mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    /// IPC namespace mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipc: Option<String>,

    /// Secret references
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<FileReference>,
    /// Config references
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configs: Vec<FileReference>,

    /// Healthcheck
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<Healthcheck>,
    /// Restart policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartSpec>,
    /// Replica count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u64>,
    /// Deploy block
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployConfig>,
    /// Profiles gating this service
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,
    /// Grace period before SIGKILL on stop (`"10s"`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_grace_period: Option<String>,
    /// Signal used to stop the container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
    /// Literal container name; incompatible with scale > 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Target platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Extends reference, consumed before merging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<ExtendsSpec>,

    /// Container labels
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Extra `/etc/hosts` entries
    #[serde(skip_serializing_if = "ExtraHosts::is_empty")]
    pub extra_hosts: ExtraHosts,
    /// Kernel parameters
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub sysctls: StringMapping,
    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// DNS servers
    #[serde(skip_serializing_if = "StringOrList::is_none")]
    pub dns: StringOrList,
    /// DNS search domains
    #[serde(skip_serializing_if = "StringOrList::is_none")]
    pub dns_search: StringOrList,
    /// DNS options
    #[serde(skip_serializing_if = "StringOrList::is_none")]
    pub dns_opt: StringOrList,

    /// Hostname inside the container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Domain name inside the container
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domainname: Option<String>,
    /// MAC address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// User
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Working directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Keep stdin open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin_open: Option<bool>,
    /// Allocate a tty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tty: Option<bool>,
    /// Read-only root filesystem
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Privileged mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    /// Run an init process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<bool>,

    /// Added capabilities
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    /// Dropped capabilities
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cap_drop: Vec<String>,
    /// Security options
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_opt: Vec<String>,
    /// Supplementary groups
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_add: Vec<String>,
    /// Device mappings (`/dev/x:/dev/x:rwm`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
    /// Device cgroup rules
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub device_cgroup_rules: Vec<String>,
    /// User namespace mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userns_mode: Option<String>,
    /// Isolation technology
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolation: Option<String>,
    /// Parent cgroup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroup_parent: Option<String>,
    /// OCI runtime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Storage driver options
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub storage_opt: StringMapping,
    /// Ulimits by name
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub ulimits: IndexMap<String, UlimitSpec>,

    /// Memory limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_limit: Option<ByteValue>,
    /// Memory soft reservation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_reservation: Option<ByteValue>,
    /// Memory + swap cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memswap_limit: Option<ByteValue>,
    /// Swappiness tuning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mem_swappiness: Option<i64>,
    /// CPU quota in whole CPUs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// CPU shares
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<i64>,
    /// CPU set (`0-3`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpuset: Option<String>,
    /// CFS quota
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_quota: Option<i64>,
    /// CFS period
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_period: Option<i64>,
    /// Disable the OOM killer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom_kill_disable: Option<bool>,
    /// OOM score adjustment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom_score_adj: Option<i64>,
    /// PID cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<i64>,
    /// `/dev/shm` size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<ByteValue>,
    /// Block IO tuning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blkio_config: Option<BlkioConfig>,
}

impl ServiceConfig {
    /// Whether this service can be built from source
    pub fn can_be_built(&self) -> bool {
        self.build.is_some()
    }

    /// The effective replica count: `scale`, or `deploy.replicas` for a
    /// replicated deploy mode, defaulting to 1. Declaring both is a
    /// configuration error caught by validation.
    pub fn effective_scale(&self) -> u64 {
        if let Some(scale) = self.scale {
            return scale;
        }
        if let Some(deploy) = &self.deploy {
            if deploy.mode.as_deref().unwrap_or("replicated") == "replicated" {
                if let Some(replicas) = deploy.replicas {
                    let cap = deploy
                        .placement
                        .as_ref()
                        .and_then(|placement| placement.max_replicas_per_node)
                        .unwrap_or(replicas);
                    return replicas.min(cap);
                }
            }
        }
        1
    }

    /// Whether any declared port pins a host-side port
    pub fn specifies_host_port(&self) -> bool {
        self.ports.0.iter().any(|port| port.published.is_some())
    }

    /// Names of services this one depends on, in declaration order,
    /// de-duplicated
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: String| {
            if !names.contains(&name) {
                names.push(name);
            }
        };
        for link in &self.links {
            push(link.target.clone());
        }
        for volumes_from in &self.volumes_from {
            if let Some(service) = volumes_from.service_name() {
                push(service.to_string());
            }
        }
        for mode in [&self.network_mode, &self.pid, &self.ipc] {
            if let Some(value) = mode {
                if let Some(service) = value.strip_prefix("service:") {
                    push(service.to_string());
                }
            }
        }
        for name in self.depends_on.0.keys() {
            push(name.clone());
        }
        names
    }

    /// Whether this service participates given the active profile set.
    ///
    /// A service with no profiles is always enabled.
    pub fn enabled_for_profiles(&self, active: &[String]) -> bool {
        self.profiles.is_empty()
            || self
                .profiles
                .iter()
                .any(|profile| active.contains(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_minimal() {
        let mut config: ServiceConfig = serde_json::from_value(json!({
            "image": "busybox",
            "command": "top"
        }))
        .unwrap();
        config.name = "web".into();
        assert_eq!(config.image.as_deref(), Some("busybox"));
        assert_eq!(config.effective_scale(), 1);
        assert!(!config.can_be_built());
    }

    #[test]
    fn test_build_field_forms() {
        let bare: BuildField = serde_json::from_value(json!("./dir")).unwrap();
        assert_eq!(bare.to_spec().context, "./dir");

        let full: BuildField = serde_json::from_value(json!({
            "context": ".",
            "dockerfile": "Dockerfile.dev",
            "args": {"RELEASE": "1"}
        }))
        .unwrap();
        let spec = full.to_spec();
        assert_eq!(spec.dockerfile.as_deref(), Some("Dockerfile.dev"));
        assert_eq!(spec.args["RELEASE"], Some("1".to_string()));
    }

    #[test]
    fn test_effective_scale_from_deploy() {
        let config: ServiceConfig = serde_json::from_value(json!({
            "image": "busybox",
            "deploy": {"replicas": 4}
        }))
        .unwrap();
        assert_eq!(config.effective_scale(), 4);

        let capped: ServiceConfig = serde_json::from_value(json!({
            "image": "busybox",
            "deploy": {"replicas": 4, "placement": {"max_replicas_per_node": 2}}
        }))
        .unwrap();
        assert_eq!(capped.effective_scale(), 2);
    }

    #[test]
    fn test_dependency_names_ordering() {
        let config: ServiceConfig = serde_json::from_value(json!({
            "image": "busybox",
            "links": ["db:database"],
            "volumes_from": ["stats"],
            "network_mode": "service:gateway",
            "depends_on": ["db", "cache"]
        }))
        .unwrap();
        assert_eq!(
            config.dependency_names(),
            vec!["db", "stats", "gateway", "cache"]
        );
    }

    #[test]
    fn test_profiles_enablement() {
        let config: ServiceConfig = serde_json::from_value(json!({
            "image": "busybox",
            "profiles": ["debug"]
        }))
        .unwrap();
        assert!(!config.enabled_for_profiles(&[]));
        assert!(config.enabled_for_profiles(&["debug".to_string()]));

        let unprofiled: ServiceConfig =
            serde_json::from_value(json!({"image": "busybox"})).unwrap();
        assert!(unprofiled.enabled_for_profiles(&[]));
    }

    #[test]
    fn test_logging_merge_driver_mismatch() {
        let base = LoggingConfig {
            driver: Some("json-file".into()),
            options: IndexMap::from([("max-size".to_string(), "10m".to_string())]),
        };
        let over = LoggingConfig {
            driver: Some("syslog".into()),
            options: IndexMap::from([("syslog-address".to_string(), "tcp://x".to_string())]),
        };
        let merged = base.merge(&over);
        assert_eq!(merged.driver.as_deref(), Some("syslog"));
        assert!(!merged.options.contains_key("max-size"));
        assert!(merged.options.contains_key("syslog-address"));
    }

    #[test]
    fn test_logging_merge_same_driver() {
        let base = LoggingConfig {
            driver: Some("json-file".into()),
            options: IndexMap::from([("max-size".to_string(), "10m".to_string())]),
        };
        let over = LoggingConfig {
            driver: None,
            options: IndexMap::from([("max-file".to_string(), "3".to_string())]),
        };
        let merged = base.merge(&over);
        assert_eq!(merged.driver.as_deref(), Some("json-file"));
        assert_eq!(merged.options["max-size"], "10m");
        assert_eq!(merged.options["max-file"], "3");
    }
}
