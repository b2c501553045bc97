//! Value types of the declared configuration.
//!
//! These are the typed forms of the fields a service declaration carries:
//! volume specifications, ports, links, namespace modes, healthchecks and
//! the mapping-or-list shapes (`environment`, `labels`) the file format
//! allows. Each type knows how to parse its short string form and carries
//! the merge key used by the layer-merge algebra.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{ComposeError, Result};

/// A command or entrypoint: shell string or argv list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// Shell form, passed through `sh -c` by the engine
    Shell(String),
    /// Exec form
    Argv(Vec<String>),
}

impl CommandSpec {
    /// The argv form the engine expects.
    ///
    /// The shell form is tokenized on whitespace; quoting is the
    /// validation layer's concern.
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            Self::Shell(cmd) => cmd.split_whitespace().map(str::to_string).collect(),
            Self::Argv(argv) => argv.clone(),
        }
    }
}

/// A string-or-list field (`dns`, `tmpfs`, `env_file`, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    /// Field absent
    #[default]
    None,
    /// Single entry
    One(String),
    /// Multiple entries
    Many(Vec<String>),
}

// `One("x")` and `Many(["x"])` are the same declaration.
impl PartialEq for StringOrList {
    fn eq(&self, other: &Self) -> bool {
        self.to_vec() == other.to_vec()
    }
}

impl Eq for StringOrList {}

impl StringOrList {
    /// The list form
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::None => Vec::new(),
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }

    /// Whether the field was absent
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// `environment`-style mapping, accepting both the mapping form and the
/// `KEY=VAL` list form. A key without a value means "inherit from the
/// process environment".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Environment(pub IndexMap<String, Option<String>>);

impl Environment {
    /// Whether no variables are declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split a `KEY=VAL` line; a bare `KEY` yields no value
    pub fn split_env(line: &str) -> (String, Option<String>) {
        match line.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (line.to_string(), None),
        }
    }

    /// Key-wise merge, `other` winning per key
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in &other.0 {
            merged.insert(key.clone(), value.clone());
        }
        Self(merged)
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Map(IndexMap<String, Option<EnvValue>>),
        }

        // Scalars other than strings (booleans, numbers) appear in the wild;
        // they are rendered the way the YAML document spelled them.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum EnvValue {
            Str(String),
            Num(serde_json::Number),
            Bool(bool),
        }

        impl EnvValue {
            fn into_string(self) -> String {
                match self {
                    Self::Str(s) => s,
                    Self::Num(n) => n.to_string(),
                    Self::Bool(b) => b.to_string(),
                }
            }
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(match raw {
            Raw::List(lines) => Self(
                lines
                    .iter()
                    .map(|line| Self::split_env(line))
                    .collect(),
            ),
            Raw::Map(map) => Self(
                map.into_iter()
                    .map(|(key, value)| (key, value.map(EnvValue::into_string)))
                    .collect(),
            ),
        })
    }
}

/// `labels`-style mapping, accepting the mapping form and the `k=v` list
/// form; a bare key maps to the empty string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Labels(pub IndexMap<String, String>);

impl Labels {
    /// Whether no labels are declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key-wise merge, `other` winning per key
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in &other.0 {
            merged.insert(key.clone(), value.clone());
        }
        Self(merged)
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Map(IndexMap<String, Option<String>>),
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(match raw {
            Raw::List(lines) => Self(
                lines
                    .iter()
                    .map(|line| match line.split_once('=') {
                        Some((key, value)) => (key.to_string(), value.to_string()),
                        None => (line.clone(), String::new()),
                    })
                    .collect(),
            ),
            Raw::Map(map) => Self(
                map.into_iter()
                    .map(|(key, value)| (key, value.unwrap_or_default()))
                    .collect(),
            ),
        })
    }
}

/// `extra_hosts`-style mapping, accepting the mapping form and the
/// `host:ip` list form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtraHosts(pub IndexMap<String, String>);

impl ExtraHosts {
    /// Whether no entries are declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key-wise merge, `other` winning per key
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (key, value) in &other.0 {
            merged.insert(key.clone(), value.clone());
        }
        Self(merged)
    }

    /// The engine's `host:ip` line form
    pub fn to_engine(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(host, ip)| format!("{host}:{ip}"))
            .collect()
    }
}

impl<'de> Deserialize<'de> for ExtraHosts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Map(IndexMap<String, String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::List(lines) => {
                let mut map = IndexMap::new();
                for line in lines {
                    let (host, ip) = line.split_once(':').ok_or_else(|| {
                        D::Error::custom(format!("invalid extra_hosts entry: {line}"))
                    })?;
                    map.insert(host.trim().to_string(), ip.trim().to_string());
                }
                Self(map)
            }
            Raw::Map(map) => Self(map),
        })
    }
}

/// A service link: target service plus the alias it is reachable under
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceLink {
    /// The linked service
    pub target: String,
    /// Alias inside the linking container; defaults to the target name
    pub alias: Option<String>,
}

impl ServiceLink {
    /// Parse `service` or `service:alias`
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((target, alias)) => Self {
                target: target.to_string(),
                alias: Some(alias.to_string()),
            },
            None => Self {
                target: spec.to_string(),
                alias: None,
            },
        }
    }

    /// The effective alias
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.target)
    }

    /// The key the merge algebra de-duplicates on
    pub fn merge_key(&self) -> String {
        self.alias().to_string()
    }
}

impl<'de> Deserialize<'de> for ServiceLink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// The source of a `volumes_from` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VolumesFromSource {
    /// Another service of the same project
    Service(String),
    /// An arbitrary container
    Container(String),
}

/// One `volumes_from` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumesFrom {
    /// Where the volumes come from
    pub source: VolumesFromSource,
    /// Access mode (`rw`/`ro`)
    pub mode: String,
}

impl VolumesFrom {
    /// Parse `service[:mode]` or `container:<name>[:mode]`
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [source] => Ok(Self {
                source: VolumesFromSource::Service((*source).to_string()),
                mode: "rw".into(),
            }),
            ["container", name] => Ok(Self {
                source: VolumesFromSource::Container((*name).to_string()),
                mode: "rw".into(),
            }),
            [source, mode] => Ok(Self {
                source: VolumesFromSource::Service((*source).to_string()),
                mode: (*mode).to_string(),
            }),
            ["container", name, mode] => Ok(Self {
                source: VolumesFromSource::Container((*name).to_string()),
                mode: (*mode).to_string(),
            }),
            ["service", name, mode] => Ok(Self {
                source: VolumesFromSource::Service((*name).to_string()),
                mode: (*mode).to_string(),
            }),
            _ => Err(ComposeError::configuration(format!(
                "volumes_from {spec} has incorrect format, should be one of \
                 '<service name>[:<mode>]' or 'container:<container name>[:<mode>]'"
            ))),
        }
    }

    /// The service name, when the source is a service
    pub fn service_name(&self) -> Option<&str> {
        match &self.source {
            VolumesFromSource::Service(name) => Some(name),
            VolumesFromSource::Container(_) => None,
        }
    }

    /// The key the merge algebra de-duplicates on
    pub fn merge_key(&self) -> String {
        match &self.source {
            VolumesFromSource::Service(name) => format!("service:{name}"),
            VolumesFromSource::Container(name) => format!("container:{name}"),
        }
    }
}

impl<'de> Deserialize<'de> for VolumesFrom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

/// A volume attached to a service, keyed by its container-side target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VolumeSpec {
    /// Bind mount of a host path
    Bind {
        /// Host path
        source: String,
        /// Container path
        target: String,
        /// Read-only flag
        read_only: bool,
        /// Mount propagation mode
        propagation: Option<String>,
    },
    /// Mount of a named volume
    Named {
        /// Declared volume name (namespaced to the project at load time)
        source: String,
        /// Container path
        target: String,
        /// Read-only flag
        read_only: bool,
        /// Skip copying image content into a fresh volume
        no_copy: bool,
    },
    /// Anonymous volume: the engine generates and owns the volume name
    Anonymous {
        /// Container path
        target: String,
    },
    /// Tmpfs mount
    Tmpfs {
        /// Container path
        target: String,
        /// Size cap in bytes
        size: Option<i64>,
    },
    /// Windows named pipe
    NamedPipe {
        /// Host pipe path
        source: String,
        /// Container pipe path
        target: String,
    },
}

fn looks_like_path(source: &str) -> bool {
    source.starts_with('/')
        || source.starts_with('.')
        || source.starts_with('~')
        || source.starts_with('\\')
        || is_windows_drive_path(source)
}

/// Whether a path is drive-qualified (`C:\...` or `C:/...`)
pub fn is_windows_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() > 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
}

impl VolumeSpec {
    /// Parse the short form `[source:]target[:mode]`
    pub fn parse(spec: &str) -> Result<Self> {
        let parts = split_volume_spec(spec);
        let (source, target, mode) = match parts.as_slice() {
            [target] => (None, (*target).to_string(), None),
            [source, target] => (Some((*source).to_string()), (*target).to_string(), None),
            [source, target, mode] => (
                Some((*source).to_string()),
                (*target).to_string(),
                Some((*mode).to_string()),
            ),
            _ => {
                return Err(ComposeError::configuration(format!(
                    "Volume {spec} has incorrect format, should be external:internal[:mode]"
                )))
            }
        };

        let read_only = mode.as_deref().is_some_and(|mode| mode.contains("ro"));
        Ok(match source {
            None => Self::Anonymous { target },
            Some(source) if source.starts_with("\\\\.\\pipe") => {
                Self::NamedPipe { source, target }
            }
            Some(source) if looks_like_path(&source) => Self::Bind {
                source,
                target,
                read_only,
                propagation: mode.and_then(|mode| {
                    mode.split(',')
                        .find(|flag| {
                            matches!(
                                *flag,
                                "shared" | "slave" | "private" | "rshared" | "rslave" | "rprivate"
                            )
                        })
                        .map(str::to_string)
                }),
            },
            Some(source) => Self::Named {
                source,
                target,
                read_only,
                no_copy: mode.as_deref().is_some_and(|mode| mode.contains("nocopy")),
            },
        })
    }

    /// The container-side target path
    pub fn target(&self) -> &str {
        match self {
            Self::Bind { target, .. }
            | Self::Named { target, .. }
            | Self::Anonymous { target }
            | Self::Tmpfs { target, .. }
            | Self::NamedPipe { target, .. } => target,
        }
    }

    /// Whether the engine picks the backing volume name
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous { .. })
    }

    /// Whether this is a host bind mount
    pub fn is_bind(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }

    /// Whether this mounts a named volume
    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named { .. })
    }

    /// The legacy `source:target[:mode]` bind string, when expressible
    pub fn bind_string(&self) -> Option<String> {
        match self {
            Self::Bind {
                source,
                target,
                read_only,
                propagation,
            } => {
                let mut mode = if *read_only { "ro" } else { "rw" }.to_string();
                if let Some(propagation) = propagation {
                    mode = format!("{mode},{propagation}");
                }
                Some(format!("{source}:{target}:{mode}"))
            }
            Self::Named {
                source,
                target,
                read_only,
                no_copy,
            } => {
                let mut mode = if *read_only { "ro" } else { "rw" }.to_string();
                if *no_copy {
                    mode = format!("{mode},nocopy");
                }
                Some(format!("{source}:{target}:{mode}"))
            }
            _ => None,
        }
    }
}

/// Split a volume short form on `:`, keeping drive-qualified Windows paths
/// together
fn split_volume_spec(spec: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = spec;
    loop {
        if is_windows_drive_path(rest) {
            // `C:` belongs to the path; find the separator after it.
            match rest[2..].find(':') {
                Some(offset) => {
                    parts.push(&rest[..2 + offset]);
                    rest = &rest[2 + offset + 1..];
                }
                None => {
                    parts.push(rest);
                    break;
                }
            }
        } else {
            match rest.find(':') {
                Some(offset) => {
                    parts.push(&rest[..offset]);
                    rest = &rest[offset + 1..];
                }
                None => {
                    parts.push(rest);
                    break;
                }
            }
        }
    }
    parts
}

impl<'de> Deserialize<'de> for VolumeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct LongBind {
            propagation: Option<String>,
        }

        #[derive(Deserialize)]
        struct LongVolume {
            #[serde(default)]
            nocopy: bool,
        }

        #[derive(Deserialize)]
        struct LongTmpfs {
            size: Option<i64>,
        }

        #[derive(Deserialize)]
        struct Long {
            #[serde(rename = "type")]
            mount_type: String,
            source: Option<String>,
            target: String,
            #[serde(default)]
            read_only: bool,
            bind: Option<LongBind>,
            volume: Option<LongVolume>,
            tmpfs: Option<LongTmpfs>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Short(String),
            Long(Long),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Short(spec) => VolumeSpec::parse(&spec).map_err(D::Error::custom),
            Raw::Long(long) => match long.mount_type.as_str() {
                "bind" => Ok(VolumeSpec::Bind {
                    source: long.source.ok_or_else(|| {
                        D::Error::custom("bind mount requires a source")
                    })?,
                    target: long.target,
                    read_only: long.read_only,
                    propagation: long.bind.and_then(|bind| bind.propagation),
                }),
                "volume" => match long.source {
                    Some(source) => Ok(VolumeSpec::Named {
                        source,
                        target: long.target,
                        read_only: long.read_only,
                        no_copy: long.volume.is_some_and(|volume| volume.nocopy),
                    }),
                    None => Ok(VolumeSpec::Anonymous {
                        target: long.target,
                    }),
                },
                "tmpfs" => Ok(VolumeSpec::Tmpfs {
                    target: long.target,
                    size: long.tmpfs.and_then(|tmpfs| tmpfs.size),
                }),
                "npipe" => Ok(VolumeSpec::NamedPipe {
                    source: long.source.ok_or_else(|| {
                        D::Error::custom("npipe mount requires a source")
                    })?,
                    target: long.target,
                }),
                other => Err(D::Error::custom(format!("unknown mount type: {other}"))),
            },
        }
    }
}

/// Port protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (default)
    #[default]
    Tcp,
    /// UDP
    Udp,
    /// SCTP
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
            Self::Sctp => write!(f, "sctp"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            other => Err(ComposeError::configuration(format!(
                "invalid port protocol: {other}"
            ))),
        }
    }
}

/// Publish mode of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    /// Publish on the host the container lands on
    Host,
    /// Publish through the cluster routing mesh
    Ingress,
}

/// A declared service port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    /// Container-side port
    pub target: u16,
    /// Host-side port; dynamic when absent
    pub published: Option<u16>,
    /// Protocol
    #[serde(default)]
    pub protocol: Protocol,
    /// Publish mode
    pub mode: Option<PortMode>,
    /// Host interface to bind
    pub external_ip: Option<String>,
}

impl ServicePort {
    /// The tuple the merge algebra de-duplicates on
    pub fn merge_key(&self) -> (u16, Option<u16>, Option<String>, Protocol) {
        (
            self.target,
            self.published,
            self.external_ip.clone(),
            self.protocol,
        )
    }

    /// The engine port key, `"80/tcp"`
    pub fn engine_port(&self) -> String {
        format!("{}/{}", self.target, self.protocol)
    }

    /// Parse the short form, expanding ranges.
    ///
    /// Accepts `8000`, `8000:8000`, `127.0.0.1:8001:8001`, `8000/udp` and
    /// range forms like `9090-9091:8080-8081`.
    pub fn parse(spec: &str) -> Result<Vec<Self>> {
        let (body, protocol) = match spec.split_once('/') {
            Some((body, protocol)) => (body, protocol.parse()?),
            None => (spec, Protocol::Tcp),
        };

        let parts: Vec<&str> = body.split(':').collect();
        let (external_ip, published, target) = match parts.as_slice() {
            [target] => (None, None, *target),
            [published, target] => (None, Some(*published), *target),
            [ip, published, target] => (Some((*ip).to_string()), Some(*published), *target),
            _ => {
                return Err(ComposeError::configuration(format!(
                    "Invalid port \"{spec}\", should be [[remote_ip:]remote_port[-remote_port]:]port[/protocol]"
                )))
            }
        };

        let targets = parse_port_range(target)?;
        let published = match published {
            // An empty published part (`":8000"` via `"ip::8000"`) means
            // dynamic allocation on a fixed interface.
            Some("") | None => None,
            Some(range) => Some(parse_port_range(range)?),
        };

        match published {
            None => Ok(targets
                .into_iter()
                .map(|target| Self {
                    target,
                    published: None,
                    protocol,
                    mode: None,
                    external_ip: external_ip.clone(),
                })
                .collect()),
            Some(published) => {
                if published.len() != targets.len() {
                    return Err(ComposeError::configuration(format!(
                        "Port ranges don't match in length in \"{spec}\""
                    )));
                }
                Ok(targets
                    .into_iter()
                    .zip(published)
                    .map(|(target, published)| Self {
                        target,
                        published: Some(published),
                        protocol,
                        mode: None,
                        external_ip: external_ip.clone(),
                    })
                    .collect())
            }
        }
    }
}

fn parse_port_range(range: &str) -> Result<Vec<u16>> {
    let invalid = || ComposeError::configuration(format!("Invalid port: {range}"));
    match range.split_once('-') {
        Some((start, end)) => {
            let start: u16 = start.parse().map_err(|_| invalid())?;
            let end: u16 = end.parse().map_err(|_| invalid())?;
            if end < start {
                return Err(invalid());
            }
            Ok((start..=end).collect())
        }
        None => Ok(vec![range.parse().map_err(|_| invalid())?]),
    }
}

/// Ordered list of service ports accepting short and long forms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServicePorts(pub Vec<ServicePort>);

impl ServicePorts {
    /// Whether no ports are declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ServicePorts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Short(String),
            Number(u32),
            Long(ServicePort),
        }

        let raw = Vec::<Raw>::deserialize(deserializer)?;
        let mut ports = Vec::new();
        for entry in raw {
            match entry {
                Raw::Short(spec) => {
                    ports.extend(ServicePort::parse(&spec).map_err(D::Error::custom)?);
                }
                Raw::Number(port) => {
                    let target =
                        u16::try_from(port).map_err(|_| D::Error::custom("invalid port"))?;
                    ports.push(ServicePort {
                        target,
                        published: None,
                        protocol: Protocol::Tcp,
                        mode: None,
                        external_ip: None,
                    });
                }
                Raw::Long(port) => ports.push(port),
            }
        }
        Ok(Self(ports))
    }
}

/// Condition gating a `depends_on` edge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependsOnCondition {
    /// Dependency has started
    #[default]
    ServiceStarted,
    /// Dependency reports a healthy healthcheck
    ServiceHealthy,
    /// Dependency ran to completion with exit code zero
    ServiceCompletedSuccessfully,
}

/// The `depends_on` mapping, with the short list form promoted to
/// `service_started` conditions at load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependsOn(pub IndexMap<String, DependsOnCondition>);

impl DependsOn {
    /// Whether no dependencies are declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key-wise merge, `other` winning per key
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (name, condition) in &other.0 {
            merged.insert(name.clone(), *condition);
        }
        Self(merged)
    }
}

impl<'de> Deserialize<'de> for DependsOn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Condition {
            condition: DependsOnCondition,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Map(IndexMap<String, Condition>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::List(names) => Self(
                names
                    .into_iter()
                    .map(|name| (name, DependsOnCondition::ServiceStarted))
                    .collect(),
            ),
            Raw::Map(map) => Self(
                map.into_iter()
                    .map(|(name, condition)| (name, condition.condition))
                    .collect(),
            ),
        })
    }
}

/// Namespace sharing mode for network, PID and IPC namespaces
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum Mode {
    /// No explicit mode declared
    #[default]
    Default,
    /// Engine-named mode (`host`, `bridge`, or a network name)
    Named(String),
    /// Share with the first container of another service
    Service(String),
    /// Share with an arbitrary container
    Container(String),
    /// Networking disabled
    None,
}

impl Mode {
    /// Parse the `mode`, `service:<name>` or `container:<id>` string form
    pub fn parse(value: &str) -> Self {
        if let Some(service) = value.strip_prefix("service:") {
            Self::Service(service.to_string())
        } else if let Some(container) = value.strip_prefix("container:") {
            Self::Container(container.to_string())
        } else if value == "none" {
            Self::None
        } else {
            Self::Named(value.to_string())
        }
    }

    /// The referenced service, when the mode shares a service namespace
    pub fn service_name(&self) -> Option<&str> {
        match self {
            Self::Service(name) => Some(name),
            _ => None,
        }
    }

    /// Whether an explicit mode was declared
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// The identity string that feeds the config hash
    pub fn hash_id(&self) -> Option<String> {
        match self {
            Self::Default => None,
            Self::Named(name) => Some(name.clone()),
            Self::Service(name) => Some(format!("service:{name}")),
            Self::Container(id) => Some(format!("container:{id}")),
            Self::None => Some("none".into()),
        }
    }
}

/// Healthcheck test command: shell string or engine-form list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthcheckTest {
    /// Shell form, wrapped in `CMD-SHELL`
    Shell(String),
    /// Engine form (`["CMD", ...]`, `["CMD-SHELL", ...]` or `["NONE"]`)
    Full(Vec<String>),
}

impl HealthcheckTest {
    /// The engine-form list
    pub fn to_engine(&self) -> Vec<String> {
        match self {
            Self::Shell(cmd) => vec!["CMD-SHELL".into(), cmd.clone()],
            Self::Full(parts) => parts.clone(),
        }
    }
}

/// A declared healthcheck
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Healthcheck {
    /// Test command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<HealthcheckTest>,
    /// Interval between probes (`"30s"`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Probe timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Consecutive failures before unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Grace period before failures count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
    /// Disable the image's healthcheck entirely
    #[serde(default)]
    pub disable: bool,
}

impl Healthcheck {
    /// Key-wise merge; `disable: true` on either side collapses the result
    pub fn merge(&self, other: &Self) -> Self {
        if self.disable || other.disable {
            return Self {
                disable: true,
                ..Default::default()
            };
        }
        Self {
            test: other.test.clone().or_else(|| self.test.clone()),
            interval: other.interval.clone().or_else(|| self.interval.clone()),
            timeout: other.timeout.clone().or_else(|| self.timeout.clone()),
            retries: other.retries.or(self.retries),
            start_period: other
                .start_period
                .clone()
                .or_else(|| self.start_period.clone()),
            disable: false,
        }
    }
}

/// A secret or config reference on a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReference {
    /// The declared secret/config name
    pub source: String,
    /// Target path or filename inside the container
    pub target: Option<String>,
    /// Owner uid
    pub uid: Option<String>,
    /// Owner gid
    pub gid: Option<String>,
    /// File mode (octal)
    pub mode: Option<u32>,
}

impl FileReference {
    /// The key the merge algebra de-duplicates on
    pub fn merge_key(&self) -> String {
        self.source.clone()
    }
}

impl<'de> Deserialize<'de> for FileReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Long {
            source: String,
            target: Option<String>,
            uid: Option<String>,
            gid: Option<String>,
            mode: Option<u32>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Short(String),
            Long(Long),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Short(source) => Self {
                source,
                target: None,
                uid: None,
                gid: None,
                mode: None,
            },
            Raw::Long(long) => Self {
                source: long.source,
                target: long.target,
                uid: long.uid,
                gid: long.gid,
                mode: long.mode,
            },
        })
    }
}

/// A network attachment declared under a service's `networks` key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    /// Extra name aliases on the network
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Static IPv4 address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    /// Static IPv6 address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_address: Option<String>,
    /// Link-local addresses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_local_ips: Vec<String>,
    /// Connection priority; higher attaches first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl NetworkAttachment {
    /// Key-wise merge; aliases union, sorted
    pub fn merge(&self, other: &Self) -> Self {
        let mut aliases: IndexSet<String> = self.aliases.iter().cloned().collect();
        aliases.extend(other.aliases.iter().cloned());
        let mut aliases: Vec<String> = aliases.into_iter().collect();
        aliases.sort();
        Self {
            aliases,
            ipv4_address: other
                .ipv4_address
                .clone()
                .or_else(|| self.ipv4_address.clone()),
            ipv6_address: other
                .ipv6_address
                .clone()
                .or_else(|| self.ipv6_address.clone()),
            link_local_ips: if other.link_local_ips.is_empty() {
                self.link_local_ips.clone()
            } else {
                other.link_local_ips.clone()
            },
            priority: other.priority.or(self.priority),
        }
    }
}

/// The `networks` key of a service: list form, or mapping with per-network
/// attachment bodies. A null body means "attach with no overrides".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkAttachments(pub IndexMap<String, NetworkAttachment>);

impl NetworkAttachments {
    /// Whether no networks are declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for NetworkAttachments {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Map(IndexMap<String, Option<NetworkAttachment>>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::List(names) => Self(
                names
                    .into_iter()
                    .map(|name| (name, NetworkAttachment::default()))
                    .collect(),
            ),
            Raw::Map(map) => Self(
                map.into_iter()
                    .map(|(name, attachment)| (name, attachment.unwrap_or_default()))
                    .collect(),
            ),
        })
    }
}

/// A restart policy string (`always`, `on-failure[:retries]`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartSpec(pub String);

impl RestartSpec {
    /// The engine-shape policy
    pub fn to_engine(&self) -> Result<crate::client::RestartPolicy> {
        let parts: Vec<&str> = self.0.split(':').collect();
        match parts.as_slice() {
            [name] => Ok(crate::client::RestartPolicy {
                name: (*name).to_string(),
                maximum_retry_count: 0,
            }),
            [name, retries] => Ok(crate::client::RestartPolicy {
                name: (*name).to_string(),
                maximum_retry_count: retries.parse().map_err(|_| {
                    ComposeError::configuration(format!(
                        "Restart {} has incorrect format, should be mode[:max_retry]",
                        self.0
                    ))
                })?,
            }),
            _ => Err(ComposeError::configuration(format!(
                "Restart {} has incorrect format, should be mode[:max_retry]",
                self.0
            ))),
        }
    }
}

/// A byte quantity: plain number or suffixed string (`512m`, `1g`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteValue(pub i64);

impl ByteValue {
    /// Parse `1024`, `2k`, `512m`, `1g` (binary multipliers)
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if let Ok(number) = trimmed.parse::<i64>() {
            return Ok(Self(number));
        }
        let (number, unit) = trimmed.split_at(trimmed.len().saturating_sub(1));
        let multiplier: i64 = match unit {
            "b" | "B" => 1,
            "k" | "K" => 1024,
            "m" | "M" => 1024 * 1024,
            "g" | "G" => 1024 * 1024 * 1024,
            _ => {
                return Err(ComposeError::configuration(format!(
                    "invalid byte value: {value}"
                )))
            }
        };
        let number: f64 = number.parse().map_err(|_| {
            ComposeError::configuration(format!("invalid byte value: {value}"))
        })?;
        Ok(Self((number * multiplier as f64) as i64))
    }
}

impl<'de> Deserialize<'de> for ByteValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(number) => Ok(Self(number)),
            Raw::Text(text) => Self::parse(&text).map_err(D::Error::custom),
        }
    }
}

/// A ulimit: single value or soft/hard pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UlimitSpec {
    /// Same soft and hard limit
    Single(i64),
    /// Distinct soft and hard limits
    Pair {
        /// Soft limit
        soft: i64,
        /// Hard limit
        hard: i64,
    },
}

impl UlimitSpec {
    /// The engine shape
    pub fn to_engine(&self, name: &str) -> crate::client::Ulimit {
        let (soft, hard) = match self {
            Self::Single(value) => (*value, *value),
            Self::Pair { soft, hard } => (*soft, *hard),
        };
        crate::client::Ulimit {
            name: name.to_string(),
            soft,
            hard,
        }
    }
}

/// The `extends` reference of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendsSpec {
    /// File holding the base service; the current file when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// The base service name
    pub service: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_spec_short_forms() {
        assert_eq!(
            VolumeSpec::parse("/data").unwrap(),
            VolumeSpec::Anonymous {
                target: "/data".into()
            }
        );
        assert_eq!(
            VolumeSpec::parse("./src:/app:ro").unwrap(),
            VolumeSpec::Bind {
                source: "./src".into(),
                target: "/app".into(),
                read_only: true,
                propagation: None,
            }
        );
        assert_eq!(
            VolumeSpec::parse("data:/var/lib/data").unwrap(),
            VolumeSpec::Named {
                source: "data".into(),
                target: "/var/lib/data".into(),
                read_only: false,
                no_copy: false,
            }
        );
    }

    #[test]
    fn test_volume_spec_windows_drive() {
        let spec = VolumeSpec::parse("C:\\data:/data:rw").unwrap();
        assert_eq!(
            spec,
            VolumeSpec::Bind {
                source: "C:\\data".into(),
                target: "/data".into(),
                read_only: false,
                propagation: None,
            }
        );
    }

    #[test]
    fn test_volume_spec_too_many_parts() {
        assert!(VolumeSpec::parse("a:b:c:d").is_err());
    }

    #[test]
    fn test_port_short_forms() {
        let ports = ServicePort::parse("8000").unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].target, 8000);
        assert_eq!(ports[0].published, None);

        let ports = ServicePort::parse("127.0.0.1:8001:8001").unwrap();
        assert_eq!(ports[0].external_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(ports[0].published, Some(8001));

        let ports = ServicePort::parse("53:53/udp").unwrap();
        assert_eq!(ports[0].protocol, Protocol::Udp);
    }

    #[test]
    fn test_port_ranges() {
        let ports = ServicePort::parse("9090-9092:8080-8082").unwrap();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].published, Some(9090));
        assert_eq!(ports[0].target, 8080);
        assert_eq!(ports[2].published, Some(9092));
        assert_eq!(ports[2].target, 8082);

        assert!(ServicePort::parse("9090-9091:8080-8082").is_err());
    }

    #[test]
    fn test_environment_list_form() {
        let env: Environment =
            serde_json::from_value(serde_json::json!(["FOO=bar", "EMPTY=", "PASSTHROUGH"]))
                .unwrap();
        assert_eq!(env.0["FOO"], Some("bar".to_string()));
        assert_eq!(env.0["EMPTY"], Some(String::new()));
        assert_eq!(env.0["PASSTHROUGH"], None);
    }

    #[test]
    fn test_depends_on_promotion() {
        let short: DependsOn = serde_json::from_value(serde_json::json!(["db", "cache"])).unwrap();
        assert_eq!(short.0["db"], DependsOnCondition::ServiceStarted);

        let long: DependsOn = serde_json::from_value(serde_json::json!({
            "db": {"condition": "service_healthy"}
        }))
        .unwrap();
        assert_eq!(long.0["db"], DependsOnCondition::ServiceHealthy);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("host"), Mode::Named("host".into()));
        assert_eq!(Mode::parse("none"), Mode::None);
        assert_eq!(Mode::parse("service:db"), Mode::Service("db".into()));
        assert_eq!(
            Mode::parse("container:abc123"),
            Mode::Container("abc123".into())
        );
        assert_eq!(Mode::parse("service:db").service_name(), Some("db"));
    }

    #[test]
    fn test_healthcheck_disable_collapse() {
        let base = Healthcheck {
            test: Some(HealthcheckTest::Shell("curl localhost".into())),
            interval: Some("30s".into()),
            ..Default::default()
        };
        let disabled = Healthcheck {
            disable: true,
            ..Default::default()
        };
        let merged = base.merge(&disabled);
        assert!(merged.disable);
        assert!(merged.test.is_none());
        assert!(merged.interval.is_none());
    }

    #[test]
    fn test_network_attachment_null_body() {
        let attachments: NetworkAttachments = serde_json::from_value(serde_json::json!({
            "front": null,
            "back": {"aliases": ["db"]}
        }))
        .unwrap();
        assert_eq!(attachments.0["front"], NetworkAttachment::default());
        assert_eq!(attachments.0["back"].aliases, vec!["db"]);
    }

    #[test]
    fn test_network_attachment_alias_union() {
        let base = NetworkAttachment {
            aliases: vec!["b".into(), "a".into()],
            ..Default::default()
        };
        let over = NetworkAttachment {
            aliases: vec!["c".into(), "a".into()],
            ..Default::default()
        };
        assert_eq!(base.merge(&over).aliases, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_volumes_from_parse() {
        let vf = VolumesFrom::parse("db").unwrap();
        assert_eq!(vf.service_name(), Some("db"));
        assert_eq!(vf.mode, "rw");

        let vf = VolumesFrom::parse("container:stats:ro").unwrap();
        assert_eq!(vf.service_name(), None);
        assert_eq!(vf.mode, "ro");

        assert!(VolumesFrom::parse("a:b:c:d").is_err());
    }

    #[test]
    fn test_byte_value_parse() {
        assert_eq!(ByteValue::parse("1024").unwrap().0, 1024);
        assert_eq!(ByteValue::parse("2k").unwrap().0, 2048);
        assert_eq!(ByteValue::parse("512m").unwrap().0, 512 * 1024 * 1024);
        assert!(ByteValue::parse("oops").is_err());
    }

    #[test]
    fn test_restart_spec() {
        let policy = RestartSpec("on-failure:3".into()).to_engine().unwrap();
        assert_eq!(policy.name, "on-failure");
        assert_eq!(policy.maximum_retry_count, 3);
        assert!(RestartSpec("a:b:c".into()).to_engine().is_err());
    }
}
