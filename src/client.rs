//! The engine client seam.
//!
//! The convergence engine never speaks the wire protocol itself; it drives
//! an injected [`EngineClient`] carrying the container, image, network,
//! volume and event operations of the Docker Engine HTTP API. Request and
//! response structures mirror the engine's JSON shapes, so a real client
//! can pass them through unchanged and tests can supply an in-memory
//! implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine client calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Stream of decoded engine events
pub type EventStream = BoxStream<'static, EngineResult<EngineEvent>>;

/// Stream of decoded pull/push/build progress frames
pub type ProgressStream = BoxStream<'static, EngineResult<ProgressEvent>>;

/// Stream of raw log lines from a container
pub type LogStream = BoxStream<'static, EngineResult<String>>;

/// Failure of a single engine API call
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested object does not exist
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What kind of object was looked up
        kind: ObjectKind,
        /// The name or id that missed
        name: String,
    },

    /// The engine rejected the call
    #[error("engine API error (status {status}): {message}")]
    Api {
        /// HTTP status code returned by the engine
        status: u16,
        /// The engine's explanation text
        message: String,
    },

    /// The engine could not be reached
    #[error("engine connection error: {message}")]
    Connection {
        /// Transport-level error text
        message: String,
    },

    /// A response or stream frame could not be decoded
    #[error("failed to decode engine response: {message}")]
    Decode {
        /// Decoder error text
        message: String,
    },
}

impl EngineError {
    /// Construct a not-found error
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Construct an API error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether this error is a not-found miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The engine's explanation text, regardless of variant
    pub fn explanation(&self) -> String {
        match self {
            Self::NotFound { kind, name } => format!("{kind} not found: {name}"),
            Self::Api { message, .. }
            | Self::Connection { message }
            | Self::Decode { message } => message.clone(),
        }
    }
}

/// The kinds of engine objects a lookup can miss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A container
    Container,
    /// An image
    Image,
    /// A network
    Network,
    /// A volume
    Volume,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Image => write!(f, "image"),
            Self::Network => write!(f, "network"),
            Self::Volume => write!(f, "volume"),
        }
    }
}

/// Filter set for list and event endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filters(BTreeMap<String, Vec<String>>);

impl Filters {
    /// Create an empty filter set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `label=value` filter term
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.0.entry("label".into()).or_default().push(label.into());
        self
    }

    /// Add several label terms at once
    #[must_use]
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry("label".into())
            .or_default()
            .extend(labels.into_iter().map(Into::into));
        self
    }

    /// Add a container status filter term
    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.0
            .entry("status".into())
            .or_default()
            .push(status.into());
        self
    }

    /// Access the underlying filter map
    pub fn as_map(&self) -> &BTreeMap<String, Vec<String>> {
        &self.0
    }
}

/// One entry of `GET /containers/json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Container id
    #[serde(rename = "Id")]
    pub id: String,
    /// All names, each with a leading slash
    #[serde(rename = "Names")]
    pub names: Vec<String>,
    /// Image reference the container was created from
    #[serde(rename = "Image")]
    pub image: String,
    /// Container labels
    #[serde(rename = "Labels", default)]
    pub labels: BTreeMap<String, String>,
    /// Coarse state (`running`, `exited`, ...)
    #[serde(rename = "State", default)]
    pub state: String,
}

/// Health state carried inside the inspected container state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthState {
    /// `starting`, `healthy` or `unhealthy`
    #[serde(rename = "Status", default)]
    pub status: String,
}

/// The `State` block of an inspected container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerState {
    /// Coarse status string (`running`, `exited`, `created`, ...)
    #[serde(rename = "Status", default)]
    pub status: String,
    /// Whether the container is running
    #[serde(rename = "Running", default)]
    pub running: bool,
    /// Whether the container is paused
    #[serde(rename = "Paused", default)]
    pub paused: bool,
    /// Whether the container is restarting
    #[serde(rename = "Restarting", default)]
    pub restarting: bool,
    /// Exit code of the last run
    #[serde(rename = "ExitCode", default)]
    pub exit_code: i64,
    /// Healthcheck state, when a healthcheck is configured
    #[serde(rename = "Health", skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthState>,
}

/// The `Config` block of an inspected container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectedConfig {
    /// Image reference
    #[serde(rename = "Image", default)]
    pub image: String,
    /// Container labels
    #[serde(rename = "Labels", default)]
    pub labels: BTreeMap<String, String>,
    /// Environment as `KEY=VALUE` lines
    #[serde(rename = "Env", default)]
    pub env: Vec<String>,
    /// Entrypoint
    #[serde(rename = "Entrypoint", skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    /// Command
    #[serde(rename = "Cmd", skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
}

/// The `HostConfig` subset the engine reads back on inspect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectedHostConfig {
    /// Legacy link strings
    #[serde(rename = "Links", skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    /// Network mode string as the engine resolved it
    #[serde(rename = "NetworkMode", default)]
    pub network_mode: String,
}

/// One mount of an inspected container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountPoint {
    /// Mount type (`bind`, `volume`, `tmpfs`, `npipe`)
    #[serde(rename = "Type", default)]
    pub mount_type: String,
    /// Engine-side volume name, for volume mounts
    #[serde(rename = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Source path on the host, for bind mounts
    #[serde(rename = "Source", default)]
    pub source: String,
    /// Destination inside the container
    #[serde(rename = "Destination")]
    pub destination: String,
    /// Volume driver
    #[serde(rename = "Driver", skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Whether the mount is writable
    #[serde(rename = "RW", default)]
    pub rw: bool,
}

/// Endpoint details inside `NetworkSettings.Networks`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointDetails {
    /// Aliases registered on the endpoint
    #[serde(rename = "Aliases", skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    /// IPv4 address on the network
    #[serde(rename = "IPAddress", default)]
    pub ip_address: String,
}

/// The `NetworkSettings` block of an inspected container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Networks the container is connected to
    #[serde(rename = "Networks", default)]
    pub networks: BTreeMap<String, EndpointDetails>,
    /// Published ports: `"80/tcp"` to host bindings
    #[serde(rename = "Ports", default)]
    pub ports: BTreeMap<String, Option<Vec<PortBinding>>>,
}

/// Full payload of `GET /containers/{id}/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerDetails {
    /// Container id
    #[serde(rename = "Id")]
    pub id: String,
    /// Container name with a leading slash
    #[serde(rename = "Name")]
    pub name: String,
    /// Creation timestamp (RFC 3339)
    #[serde(rename = "Created", default)]
    pub created: String,
    /// Runtime state
    #[serde(rename = "State", default)]
    pub state: ContainerState,
    /// Creation-time configuration
    #[serde(rename = "Config", default)]
    pub config: InspectedConfig,
    /// Host configuration subset
    #[serde(rename = "HostConfig", default)]
    pub host_config: InspectedHostConfig,
    /// Mounts attached to the container
    #[serde(rename = "Mounts", default)]
    pub mounts: Vec<MountPoint>,
    /// Network attachments and published ports
    #[serde(rename = "NetworkSettings", default)]
    pub network_settings: NetworkSettings,
}

/// A single host binding of a published port
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Host IP to bind on; empty for all interfaces
    #[serde(rename = "HostIp", default)]
    pub host_ip: String,
    /// Host port; empty for dynamic allocation
    #[serde(rename = "HostPort", default)]
    pub host_port: String,
}

/// Healthcheck configuration at container create time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Test command, engine syntax (`["CMD-SHELL", "curl ..."]`);
    /// `["NONE"]` disables the image's healthcheck
    #[serde(rename = "Test", skip_serializing_if = "Option::is_none")]
    pub test: Option<Vec<String>>,
    /// Interval between probes, in nanoseconds
    #[serde(rename = "Interval", skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    /// Probe timeout, in nanoseconds
    #[serde(rename = "Timeout", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    /// Number of consecutive failures marking the container unhealthy
    #[serde(rename = "Retries", skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Grace period before failures count, in nanoseconds
    #[serde(rename = "StartPeriod", skip_serializing_if = "Option::is_none")]
    pub start_period: Option<i64>,
}

/// Restart policy in engine shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Policy name (`no`, `always`, `on-failure`, `unless-stopped`)
    #[serde(rename = "Name")]
    pub name: String,
    /// Retry cap for `on-failure`
    #[serde(rename = "MaximumRetryCount", default)]
    pub maximum_retry_count: u32,
}

/// One ulimit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ulimit {
    /// Limit name (`nofile`, `nproc`, ...)
    #[serde(rename = "Name")]
    pub name: String,
    /// Soft limit
    #[serde(rename = "Soft")]
    pub soft: i64,
    /// Hard limit
    #[serde(rename = "Hard")]
    pub hard: i64,
}

/// Log driver configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Driver name
    #[serde(rename = "Type")]
    pub log_type: String,
    /// Driver options
    #[serde(rename = "Config", default)]
    pub config: BTreeMap<String, String>,
}

/// A device mapping into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMapping {
    /// Host device path
    #[serde(rename = "PathOnHost")]
    pub path_on_host: String,
    /// Container device path
    #[serde(rename = "PathInContainer")]
    pub path_in_container: String,
    /// Cgroup permissions (`rwm`)
    #[serde(rename = "CgroupPermissions")]
    pub cgroup_permissions: String,
}

/// Bind options of a [`Mount`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindOptions {
    /// Mount propagation mode
    #[serde(rename = "Propagation", skip_serializing_if = "Option::is_none")]
    pub propagation: Option<String>,
}

/// Volume options of a [`Mount`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeOptions {
    /// Skip copying existing content from the image
    #[serde(rename = "NoCopy", default)]
    pub no_copy: bool,
}

/// Tmpfs options of a [`Mount`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmpfsOptions {
    /// Size cap in bytes
    #[serde(rename = "SizeBytes", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
}

/// A mount in the modern (API >= 1.30) create shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    /// Mount type (`bind`, `volume`, `tmpfs`, `npipe`)
    #[serde(rename = "Type")]
    pub mount_type: String,
    /// Source path or volume name; absent for anonymous/tmpfs mounts
    #[serde(rename = "Source", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Target inside the container
    #[serde(rename = "Target")]
    pub target: String,
    /// Read-only flag
    #[serde(rename = "ReadOnly", default)]
    pub read_only: bool,
    /// Bind-specific options
    #[serde(rename = "BindOptions", skip_serializing_if = "Option::is_none")]
    pub bind_options: Option<BindOptions>,
    /// Volume-specific options
    #[serde(rename = "VolumeOptions", skip_serializing_if = "Option::is_none")]
    pub volume_options: Option<VolumeOptions>,
    /// Tmpfs-specific options
    #[serde(rename = "TmpfsOptions", skip_serializing_if = "Option::is_none")]
    pub tmpfs_options: Option<TmpfsOptions>,
}

/// The `HostConfig` block of a container create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Legacy bind strings (`/host:/ctr:mode`)
    #[serde(rename = "Binds", skip_serializing_if = "Vec::is_empty", default)]
    pub binds: Vec<String>,
    /// Modern mount objects
    #[serde(rename = "Mounts", skip_serializing_if = "Vec::is_empty", default)]
    pub mounts: Vec<Mount>,
    /// Published port bindings
    #[serde(
        rename = "PortBindings",
        skip_serializing_if = "BTreeMap::is_empty",
        default
    )]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    /// Legacy links (`container_name:alias`)
    #[serde(rename = "Links", skip_serializing_if = "Vec::is_empty", default)]
    pub links: Vec<String>,
    /// Containers to inherit volumes from
    #[serde(rename = "VolumesFrom", skip_serializing_if = "Vec::is_empty", default)]
    pub volumes_from: Vec<String>,
    /// Network mode string
    #[serde(rename = "NetworkMode", skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// PID namespace mode string
    #[serde(rename = "PidMode", skip_serializing_if = "Option::is_none")]
    pub pid_mode: Option<String>,
    /// IPC namespace mode string
    #[serde(rename = "IpcMode", skip_serializing_if = "Option::is_none")]
    pub ipc_mode: Option<String>,
    /// Restart policy
    #[serde(rename = "RestartPolicy", skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    /// Privileged flag
    #[serde(rename = "Privileged", default)]
    pub privileged: bool,
    /// Added capabilities
    #[serde(rename = "CapAdd", skip_serializing_if = "Vec::is_empty", default)]
    pub cap_add: Vec<String>,
    /// Dropped capabilities
    #[serde(rename = "CapDrop", skip_serializing_if = "Vec::is_empty", default)]
    pub cap_drop: Vec<String>,
    /// DNS servers
    #[serde(rename = "Dns", skip_serializing_if = "Vec::is_empty", default)]
    pub dns: Vec<String>,
    /// DNS options
    #[serde(rename = "DnsOptions", skip_serializing_if = "Vec::is_empty", default)]
    pub dns_opt: Vec<String>,
    /// DNS search domains
    #[serde(rename = "DnsSearch", skip_serializing_if = "Vec::is_empty", default)]
    pub dns_search: Vec<String>,
    /// Extra `/etc/hosts` entries (`host:ip`)
    #[serde(rename = "ExtraHosts", skip_serializing_if = "Vec::is_empty", default)]
    pub extra_hosts: Vec<String>,
    /// Security options
    #[serde(rename = "SecurityOpt", skip_serializing_if = "Vec::is_empty", default)]
    pub security_opt: Vec<String>,
    /// Tmpfs mounts (target to options string)
    #[serde(rename = "Tmpfs", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub tmpfs: BTreeMap<String, String>,
    /// Sysctls
    #[serde(rename = "Sysctls", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub sysctls: BTreeMap<String, String>,
    /// Ulimits
    #[serde(rename = "Ulimits", skip_serializing_if = "Vec::is_empty", default)]
    pub ulimits: Vec<Ulimit>,
    /// Log driver configuration
    #[serde(rename = "LogConfig", skip_serializing_if = "Option::is_none")]
    pub log_config: Option<LogConfig>,
    /// Memory limit in bytes
    #[serde(rename = "Memory", skip_serializing_if = "Option::is_none")]
    pub mem_limit: Option<i64>,
    /// Memory soft reservation in bytes
    #[serde(rename = "MemoryReservation", skip_serializing_if = "Option::is_none")]
    pub mem_reservation: Option<i64>,
    /// Memory + swap cap in bytes
    #[serde(rename = "MemorySwap", skip_serializing_if = "Option::is_none")]
    pub memswap_limit: Option<i64>,
    /// Swappiness tuning (0-100)
    #[serde(rename = "MemorySwappiness", skip_serializing_if = "Option::is_none")]
    pub mem_swappiness: Option<i64>,
    /// CPU quota in units of 1e-9 CPUs
    #[serde(rename = "NanoCpus", skip_serializing_if = "Option::is_none")]
    pub nano_cpus: Option<i64>,
    /// CPU shares (relative weight)
    #[serde(rename = "CpuShares", skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<i64>,
    /// CPUs the container may run on (`0-3`, `0,1`)
    #[serde(rename = "CpusetCpus", skip_serializing_if = "Option::is_none")]
    pub cpuset_cpus: Option<String>,
    /// CFS quota per period
    #[serde(rename = "CpuQuota", skip_serializing_if = "Option::is_none")]
    pub cpu_quota: Option<i64>,
    /// CFS period
    #[serde(rename = "CpuPeriod", skip_serializing_if = "Option::is_none")]
    pub cpu_period: Option<i64>,
    /// Disable the OOM killer
    #[serde(rename = "OomKillDisable", skip_serializing_if = "Option::is_none")]
    pub oom_kill_disable: Option<bool>,
    /// OOM score adjustment
    #[serde(rename = "OomScoreAdj", skip_serializing_if = "Option::is_none")]
    pub oom_score_adj: Option<i64>,
    /// PIDs cgroup cap
    #[serde(rename = "PidsLimit", skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<i64>,
    /// Size of `/dev/shm` in bytes
    #[serde(rename = "ShmSize", skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<i64>,
    /// Mount the root filesystem read-only
    #[serde(rename = "ReadonlyRootfs", default)]
    pub read_only: bool,
    /// Run an init process inside the container
    #[serde(rename = "Init", skip_serializing_if = "Option::is_none")]
    pub init: Option<bool>,
    /// Supplementary groups
    #[serde(rename = "GroupAdd", skip_serializing_if = "Vec::is_empty", default)]
    pub group_add: Vec<String>,
    /// User namespace mode
    #[serde(rename = "UsernsMode", skip_serializing_if = "Option::is_none")]
    pub userns_mode: Option<String>,
    /// Isolation technology (Windows)
    #[serde(rename = "Isolation", skip_serializing_if = "Option::is_none")]
    pub isolation: Option<String>,
    /// Parent cgroup
    #[serde(rename = "CgroupParent", skip_serializing_if = "Option::is_none")]
    pub cgroup_parent: Option<String>,
    /// OCI runtime
    #[serde(rename = "Runtime", skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Storage driver options
    #[serde(rename = "StorageOpt", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub storage_opt: BTreeMap<String, String>,
    /// Device mappings
    #[serde(rename = "Devices", skip_serializing_if = "Vec::is_empty", default)]
    pub devices: Vec<DeviceMapping>,
    /// Device cgroup rules
    #[serde(
        rename = "DeviceCgroupRules",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub device_cgroup_rules: Vec<String>,
    /// Block IO weight
    #[serde(rename = "BlkioWeight", skip_serializing_if = "Option::is_none")]
    pub blkio_weight: Option<u16>,
}

/// The `Config` block of a container create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image reference
    #[serde(rename = "Image")]
    pub image: String,
    /// Hostname inside the container
    #[serde(rename = "Hostname", skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Domain name inside the container
    #[serde(rename = "Domainname", skip_serializing_if = "Option::is_none")]
    pub domainname: Option<String>,
    /// User (name or uid, optionally `:group`)
    #[serde(rename = "User", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Command override
    #[serde(rename = "Cmd", skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    /// Entrypoint override
    #[serde(rename = "Entrypoint", skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    /// Environment as `KEY=VALUE` lines
    #[serde(rename = "Env", skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<String>,
    /// Labels
    #[serde(rename = "Labels", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
    /// Exposed ports (`"80/tcp"` keys, empty values)
    #[serde(
        rename = "ExposedPorts",
        skip_serializing_if = "BTreeMap::is_empty",
        default
    )]
    pub exposed_ports: BTreeMap<String, serde_json::Value>,
    /// Internal mountpoint declarations (`"/data"` keys, empty values)
    #[serde(rename = "Volumes", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub volumes: BTreeMap<String, serde_json::Value>,
    /// Working directory
    #[serde(rename = "WorkingDir", skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Keep stdin open
    #[serde(rename = "OpenStdin", default)]
    pub stdin_open: bool,
    /// Allocate a pseudo-tty
    #[serde(rename = "Tty", default)]
    pub tty: bool,
    /// Signal used to stop the container
    #[serde(rename = "StopSignal", skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
    /// Stop grace period in whole seconds
    #[serde(rename = "StopTimeout", skip_serializing_if = "Option::is_none")]
    pub stop_timeout: Option<i64>,
    /// Healthcheck override
    #[serde(rename = "Healthcheck", skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthConfig>,
    /// MAC address
    #[serde(rename = "MacAddress", skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
}

/// Endpoint configuration used at create and connect time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Name aliases on the network
    #[serde(rename = "Aliases", skip_serializing_if = "Vec::is_empty", default)]
    pub aliases: Vec<String>,
    /// Static IPv4 address
    #[serde(rename = "IPv4Address", skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    /// Static IPv6 address
    #[serde(rename = "IPv6Address", skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
    /// Link-local addresses
    #[serde(rename = "LinkLocalIPs", skip_serializing_if = "Vec::is_empty", default)]
    pub link_local_ips: Vec<String>,
    /// Legacy links visible through this endpoint
    #[serde(rename = "Links", skip_serializing_if = "Vec::is_empty", default)]
    pub links: Vec<String>,
}

/// The `NetworkingConfig` block of a container create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkingConfig {
    /// Per-network endpoint configuration
    #[serde(rename = "EndpointsConfig", default)]
    pub endpoints_config: BTreeMap<String, EndpointConfig>,
}

/// A complete container create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerCreateOptions {
    /// Container name
    pub name: String,
    /// The `Config` block
    pub config: ContainerConfig,
    /// The `HostConfig` block
    pub host_config: HostConfig,
    /// The `NetworkingConfig` block
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networking_config: Option<NetworkingConfig>,
}

/// One IPAM pool of a network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamPool {
    /// Subnet in CIDR form
    #[serde(rename = "Subnet", skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// Allocation range inside the subnet
    #[serde(rename = "IPRange", skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    /// Gateway address
    #[serde(rename = "Gateway", skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Reserved auxiliary addresses
    #[serde(
        rename = "AuxiliaryAddresses",
        skip_serializing_if = "BTreeMap::is_empty",
        default
    )]
    pub aux_addresses: BTreeMap<String, String>,
}

/// IPAM configuration of a network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipam {
    /// IPAM driver
    #[serde(rename = "Driver", skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Address pools
    #[serde(rename = "Config", skip_serializing_if = "Vec::is_empty", default)]
    pub config: Vec<IpamPool>,
    /// Driver options
    #[serde(rename = "Options", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub options: BTreeMap<String, String>,
}

/// A network create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkCreateOptions {
    /// Engine-side network name
    pub name: String,
    /// Driver; engine default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub options: BTreeMap<String, String>,
    /// IPAM configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
    /// Restrict external access
    pub internal: bool,
    /// Enable IPv6
    pub enable_ipv6: bool,
    /// Allow manual container attachment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachable: Option<bool>,
    /// Labels
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
}

/// One entry of `GET /networks`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSummary {
    /// Network id
    #[serde(rename = "Id")]
    pub id: String,
    /// Network name
    #[serde(rename = "Name")]
    pub name: String,
    /// Labels
    #[serde(rename = "Labels", default)]
    pub labels: BTreeMap<String, String>,
}

/// Full payload of `GET /networks/{name}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkDetails {
    /// Network id
    #[serde(rename = "Id")]
    pub id: String,
    /// Network name
    #[serde(rename = "Name")]
    pub name: String,
    /// Driver
    #[serde(rename = "Driver", default)]
    pub driver: String,
    /// Driver options
    #[serde(rename = "Options", default)]
    pub options: BTreeMap<String, String>,
    /// IPAM configuration
    #[serde(rename = "IPAM", skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
    /// Internal flag
    #[serde(rename = "Internal", default)]
    pub internal: bool,
    /// IPv6 flag
    #[serde(rename = "EnableIPv6", default)]
    pub enable_ipv6: bool,
    /// Labels
    #[serde(rename = "Labels", default)]
    pub labels: BTreeMap<String, String>,
}

/// A volume create request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeCreateOptions {
    /// Engine-side volume name
    #[serde(rename = "Name")]
    pub name: String,
    /// Volume driver
    #[serde(rename = "Driver", skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options
    #[serde(
        rename = "DriverOpts",
        skip_serializing_if = "BTreeMap::is_empty",
        default
    )]
    pub driver_opts: BTreeMap<String, String>,
    /// Labels
    #[serde(rename = "Labels", skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
}

/// Payload of `GET /volumes/{name}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeDetails {
    /// Volume name
    #[serde(rename = "Name")]
    pub name: String,
    /// Driver
    #[serde(rename = "Driver", default)]
    pub driver: String,
    /// Mountpoint on the host
    #[serde(rename = "Mountpoint", default)]
    pub mountpoint: String,
    /// Labels
    #[serde(rename = "Labels", default)]
    pub labels: BTreeMap<String, String>,
    /// Driver options
    #[serde(rename = "Options", default)]
    pub options: BTreeMap<String, String>,
}

/// Payload of `GET /images/{name}/json`, reduced to what the engine needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageDetails {
    /// Image id (`sha256:...`)
    #[serde(rename = "Id")]
    pub id: String,
    /// Repository tags
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Vec<String>,
}

/// Payload of `GET /distribution/{name}/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributionDetails {
    /// Content digest of the manifest
    #[serde(rename = "Descriptor", default)]
    pub descriptor: serde_json::Value,
}

/// Actor block of an engine event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventActor {
    /// Object id
    #[serde(rename = "ID")]
    pub id: String,
    /// Attributes (names, labels, image, ...)
    #[serde(rename = "Attributes", default)]
    pub attributes: BTreeMap<String, String>,
}

/// A decoded engine event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Object type (`container`, `network`, ...)
    #[serde(rename = "Type", default)]
    pub event_type: String,
    /// Action (`start`, `die`, `create`, ...)
    #[serde(rename = "Action", default)]
    pub action: String,
    /// Actor details
    #[serde(rename = "Actor", default)]
    pub actor: EventActor,
    /// Event time in whole seconds
    #[serde(rename = "time", default)]
    pub time: i64,
    /// Event time in nanoseconds
    #[serde(rename = "timeNano", default)]
    pub time_nano: i64,
}

/// One decoded frame of a pull/push/build stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Status line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Build output line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// Layer or object id the frame refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Error text; a frame with this set fails the stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Auxiliary payload (image id / digest)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aux: Option<serde_json::Value>,
}

/// An image build request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Build context path
    pub context: String,
    /// Dockerfile path relative to the context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    /// Tag for the built image
    pub tag: String,
    /// Remove intermediate containers
    pub rm: bool,
    /// Always remove intermediate containers
    pub forcerm: bool,
    /// Pull base images even when present
    pub pull: bool,
    /// Disable the build cache
    pub nocache: bool,
    /// Images to use as cache sources
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cache_from: Vec<String>,
    /// Build args
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub buildargs: BTreeMap<String, String>,
    /// Labels for the built image
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub labels: BTreeMap<String, String>,
    /// Network mode for build-time containers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// Target build stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Size of `/dev/shm` in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<i64>,
    /// Extra `/etc/hosts` entries
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub extra_hosts: Vec<String>,
    /// Isolation technology
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolation: Option<String>,
    /// Target platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Memory cap for build containers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
}

/// Compare two dotted engine API versions, `true` when `version >= minimum`
pub fn version_gte(version: &str, minimum: &str) -> bool {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.parse().unwrap_or(0))
            .collect()
    };
    parse(version) >= parse(minimum)
}

/// The engine operations the convergence core consumes.
///
/// Implementations must be safe for concurrent use; the executor shares one
/// client across all workers.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// The negotiated engine API version (`"1.41"`)
    fn api_version(&self) -> String;

    /// List containers, optionally including stopped ones
    async fn containers(&self, all: bool, filters: &Filters) -> EngineResult<Vec<ContainerSummary>>;

    /// Inspect one container by id or name
    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerDetails>;

    /// Create a container, returning its id
    async fn create_container(&self, options: ContainerCreateOptions) -> EngineResult<String>;

    /// Start a container
    async fn start_container(&self, id: &str) -> EngineResult<()>;

    /// Stop a container with a grace period
    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> EngineResult<()>;

    /// Kill a container with a signal (engine default when `None`)
    async fn kill_container(&self, id: &str, signal: Option<&str>) -> EngineResult<()>;

    /// Restart a container with a grace period
    async fn restart_container(&self, id: &str, timeout: Option<Duration>) -> EngineResult<()>;

    /// Pause a container
    async fn pause_container(&self, id: &str) -> EngineResult<()>;

    /// Unpause a container
    async fn unpause_container(&self, id: &str) -> EngineResult<()>;

    /// Remove a container, optionally forcing and removing anonymous volumes
    async fn remove_container(&self, id: &str, force: bool, volumes: bool) -> EngineResult<()>;

    /// Block until a container exits, returning its exit code
    async fn wait_container(&self, id: &str) -> EngineResult<i64>;

    /// Rename a container
    async fn rename_container(&self, id: &str, name: &str) -> EngineResult<()>;

    /// Commit a container's filesystem as a new image, returning the
    /// image id
    async fn commit_container(&self, id: &str, repo: &str, tag: &str) -> EngineResult<String>;

    /// Stream a container's log output
    async fn container_logs(&self, id: &str, follow: bool) -> EngineResult<LogStream>;

    /// Connect a container to a network
    async fn connect_container_to_network(
        &self,
        network: &str,
        container: &str,
        config: EndpointConfig,
    ) -> EngineResult<()>;

    /// Disconnect a container from a network
    async fn disconnect_container_from_network(
        &self,
        network: &str,
        container: &str,
    ) -> EngineResult<()>;

    /// List networks
    async fn networks(&self, filters: &Filters) -> EngineResult<Vec<NetworkSummary>>;

    /// Inspect one network by name or id
    async fn inspect_network(&self, name: &str) -> EngineResult<NetworkDetails>;

    /// Create a network, returning its id
    async fn create_network(&self, options: NetworkCreateOptions) -> EngineResult<String>;

    /// Remove a network
    async fn remove_network(&self, name: &str) -> EngineResult<()>;

    /// List volumes
    async fn volumes(&self) -> EngineResult<Vec<VolumeDetails>>;

    /// Inspect one volume by name
    async fn inspect_volume(&self, name: &str) -> EngineResult<VolumeDetails>;

    /// Create a volume
    async fn create_volume(&self, options: VolumeCreateOptions) -> EngineResult<VolumeDetails>;

    /// Remove a volume
    async fn remove_volume(&self, name: &str) -> EngineResult<()>;

    /// Inspect an image by reference
    async fn inspect_image(&self, name: &str) -> EngineResult<ImageDetails>;

    /// Pull an image, streaming progress
    async fn pull_image(
        &self,
        repo: &str,
        tag: &str,
        platform: Option<&str>,
    ) -> EngineResult<ProgressStream>;

    /// Push an image, streaming progress
    async fn push_image(&self, repo: &str, tag: &str) -> EngineResult<ProgressStream>;

    /// Build an image, streaming output
    async fn build_image(&self, options: BuildOptions) -> EngineResult<ProgressStream>;

    /// Remove an image
    async fn remove_image(&self, name: &str) -> EngineResult<()>;

    /// Query registry distribution data for an image
    async fn inspect_distribution(&self, image: &str) -> EngineResult<DistributionDetails>;

    /// Subscribe to the engine event stream
    async fn events(&self, filters: &Filters) -> EngineResult<EventStream>;
}
