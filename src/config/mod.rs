//! The configuration model and load pipeline.
//!
//! The core receives raw, schema-validated configuration trees (one
//! [`serde_json::Value`] per file, in override order) and turns them into a
//! single normalized [`Config`]:
//!
//! 1. interpolation of `${VAR}` references against a supplied environment
//!    (the top-level `version` key is skipped),
//! 2. typing into [`ConfigFile`] with per-file path and environment
//!    resolution,
//! 3. `extends` resolution, cycle-checked across `(file, service)` pairs,
//! 4. layer merging per the field rule table in [`merge`],
//! 5. semantic validation and reference checking.
//!
//! The result is the read-only model every other component consumes.

pub mod environment;
pub mod interpolation;
pub mod merge;
pub mod paths;
pub mod service;
pub mod types;
pub mod validation;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::{ComposeError, Result};
use crate::utils::canonicalize;

pub use service::{BuildField, BuildSpec, DeployConfig, LoggingConfig, ServiceConfig};
pub use types::{
    CommandSpec, DependsOn, DependsOnCondition, Environment, ExtraHosts, FileReference,
    Healthcheck, HealthcheckTest, Labels, Mode, NetworkAttachment, NetworkAttachments, Protocol,
    ServiceLink, ServicePort, StringOrList, VolumeSpec, VolumesFrom, VolumesFromSource,
};
pub use validation::ComposeVersion;

/// `external:` marker on a declared resource: plain flag or legacy
/// `{name: ...}` form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalSpec {
    /// `external: true` / `external: false`
    Flag(bool),
    /// Legacy `external: {name: engine-side-name}`
    Named {
        /// The pre-existing engine-side name
        name: String,
    },
}

impl Default for ExternalSpec {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl ExternalSpec {
    /// Whether the resource is externally managed
    pub fn is_external(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Named { .. } => true,
        }
    }

    /// The custom engine-side name, for the legacy form
    pub fn custom_name(&self) -> Option<&str> {
        match self {
            Self::Named { name } => Some(name),
            Self::Flag(_) => None,
        }
    }
}

/// One IPAM pool of a declared network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpamPoolConfig {
    /// Subnet in CIDR form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// Allocation range inside the subnet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    /// Gateway address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Reserved auxiliary addresses
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub aux_addresses: IndexMap<String, String>,
}

/// IPAM block of a declared network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpamConfig {
    /// IPAM driver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Address pools
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<IpamPoolConfig>,
    /// Driver options
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub options: IndexMap<String, String>,
}

/// A declared top-level network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Custom engine-side name; `<project>_<key>` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Network driver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub driver_opts: IndexMap<String, String>,
    /// IPAM configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipam: Option<IpamConfig>,
    /// Externally managed: found, never created or deleted
    #[serde(skip_serializing_if = "is_default_external")]
    pub external: ExternalSpec,
    /// Restrict external access
    pub internal: bool,
    /// Allow manual attachment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachable: Option<bool>,
    /// Enable IPv6
    pub enable_ipv6: bool,
    /// Labels
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

fn is_default_external(external: &ExternalSpec) -> bool {
    !external.is_external()
}

/// A declared top-level volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Custom engine-side name; `<project>_<key>` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Volume driver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Driver options
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub driver_opts: IndexMap<String, String>,
    /// Externally managed: found, never created or deleted
    #[serde(skip_serializing_if = "is_default_external")]
    pub external: ExternalSpec,
    /// Labels
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

/// A declared top-level secret or config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretConfig {
    /// Source file on the host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Custom engine-side name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Externally managed
    #[serde(skip_serializing_if = "is_default_external")]
    pub external: ExternalSpec,
}

/// One typed configuration file, after interpolation and per-file
/// resolution
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    /// Where the file came from; relative paths resolve against its parent
    pub filename: PathBuf,
    /// Declared version
    pub version: ComposeVersion,
    /// Service declarations, in file order
    pub services: IndexMap<String, ServiceConfig>,
    /// Declared networks
    pub networks: IndexMap<String, NetworkConfig>,
    /// Declared volumes
    pub volumes: IndexMap<String, VolumeConfig>,
    /// Declared secrets
    pub secrets: IndexMap<String, SecretConfig>,
    /// Declared configs
    pub configs: IndexMap<String, SecretConfig>,
}

#[derive(Deserialize)]
struct RawTopLevel {
    #[serde(default)]
    services: IndexMap<String, ServiceConfig>,
    #[serde(default)]
    networks: IndexMap<String, Option<NetworkConfig>>,
    #[serde(default)]
    volumes: IndexMap<String, Option<VolumeConfig>>,
    #[serde(default)]
    secrets: IndexMap<String, Option<SecretConfig>>,
    #[serde(default)]
    configs: IndexMap<String, Option<SecretConfig>>,
}

impl ConfigFile {
    /// Type a raw (already interpolated) document.
    ///
    /// Version `"1"` documents use the legacy root-as-services shape; their
    /// `net: container:x` strings are translated to `network_mode` so the
    /// rest of the engine only ever sees one spelling.
    pub fn from_value(
        filename: &Path,
        raw: &Value,
        process_env: &HashMap<String, String>,
    ) -> Result<Self> {
        let Value::Object(map) = raw else {
            return Err(ComposeError::configuration(
                "top level of a config document must be a mapping",
            ));
        };
        let version = map
            .get("version")
            .and_then(Value::as_str)
            .map(|v| ComposeVersion(v.to_string()));

        // Version "1" is the root-as-services shape. A document without a
        // `version` key but with a `services:` mapping is the spec shape.
        let is_v1 = match &version {
            Some(version) => version.is_v1(),
            None => !map.contains_key("services"),
        };

        let mut file = if is_v1 {
            let mut services = IndexMap::new();
            for (name, body) in map {
                if name == "version" {
                    continue;
                }
                let service: ServiceConfig =
                    serde_json::from_value(body.clone()).map_err(|err| {
                        ComposeError::configuration(format!(
                            "Service \"{name}\" in {}: {err}",
                            filename.display()
                        ))
                    })?;
                services.insert(name.clone(), service);
            }
            Self {
                filename: filename.to_path_buf(),
                version: ComposeVersion::v1(),
                services,
                ..Default::default()
            }
        } else {
            let top: RawTopLevel = serde_json::from_value(raw.clone()).map_err(|err| {
                ComposeError::configuration(format!("{}: {err}", filename.display()))
            })?;
            Self::from_top_level(filename, version.unwrap_or_default(), top)?
        };

        for (name, service) in file.services.iter_mut() {
            service.name = name.clone();
            translate_v1_net(service);
            resolve_service_paths(service, filename)?;
            resolve_service_environment(service, process_env)?;
        }
        let file_dir = filename.parent().unwrap_or_else(|| Path::new("."));
        for secret in file.secrets.values_mut().chain(file.configs.values_mut()) {
            if let Some(source) = &secret.file {
                secret.file = Some(
                    paths::expand_path(file_dir, source)
                        .to_string_lossy()
                        .into_owned(),
                );
            }
        }
        Ok(file)
    }

    fn from_top_level(
        filename: &Path,
        version: ComposeVersion,
        top: RawTopLevel,
    ) -> Result<Self> {
        Ok(Self {
            filename: filename.to_path_buf(),
            version,
            services: top.services,
            networks: top
                .networks
                .into_iter()
                .map(|(name, config)| (name, config.unwrap_or_default()))
                .collect(),
            volumes: top
                .volumes
                .into_iter()
                .map(|(name, config)| (name, config.unwrap_or_default()))
                .collect(),
            secrets: top
                .secrets
                .into_iter()
                .map(|(name, config)| (name, config.unwrap_or_default()))
                .collect(),
            configs: top
                .configs
                .into_iter()
                .map(|(name, config)| (name, config.unwrap_or_default()))
                .collect(),
        })
    }
}

/// v1 `net:` strings become `network_mode`, so the graph and the planner
/// only ever see one spelling
fn translate_v1_net(service: &mut ServiceConfig) {
    if let Some(net) = service.net.take() {
        if service.network_mode.is_none() {
            service.network_mode = Some(net);
        }
    }
}

fn resolve_service_paths(service: &mut ServiceConfig, filename: &Path) -> Result<()> {
    let file_dir = filename.parent().unwrap_or_else(|| Path::new("."));

    if let Some(build) = &service.build {
        let mut spec = build.to_spec();
        if !spec.context.is_empty() {
            spec.context = paths::expand_path(file_dir, &spec.context)
                .to_string_lossy()
                .into_owned();
        }
        service.build = Some(BuildField::Spec(spec));
    }

    for volume in &mut service.volumes {
        if let VolumeSpec::Bind { source, .. } = volume {
            let resolved = paths::expand_path(file_dir, source);
            *source = paths::normalize_path_for_engine(&resolved.to_string_lossy());
        }
    }

    let env_files: Vec<String> = service
        .env_file
        .to_vec()
        .iter()
        .map(|path| {
            paths::expand_path(file_dir, path)
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    if !env_files.is_empty() {
        service.env_file = StringOrList::Many(env_files);
    }
    Ok(())
}

fn resolve_service_environment(
    service: &mut ServiceConfig,
    process_env: &HashMap<String, String>,
) -> Result<()> {
    if service.env_file.is_none() && service.environment.is_empty() {
        return Ok(());
    }
    let env_files: Vec<PathBuf> = service
        .env_file
        .to_vec()
        .into_iter()
        .map(PathBuf::from)
        .collect();
    service.environment =
        environment::resolve_environment(&env_files, &service.environment, process_env)?;
    service.env_file = StringOrList::None;
    Ok(())
}

/// Loads raw documents for `extends: {file: ...}` references.
///
/// Parsing the referenced file is the front-end's concern; the core only
/// needs the raw tree back.
pub trait RawFileLoader {
    /// Load the raw (unparsed-by-the-core) tree of one config file
    fn load_raw(&self, path: &Path) -> Result<Value>;
}

/// A loader for configurations that never use cross-file `extends`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFileLoader;

impl RawFileLoader for NoFileLoader {
    fn load_raw(&self, path: &Path) -> Result<Value> {
        Err(ComposeError::configuration(format!(
            "cannot load {}: no file loader was provided for extends resolution",
            path.display()
        )))
    }
}

/// The inputs of one load: raw layers plus the interpolation environment
#[derive(Debug, Clone, Default)]
pub struct ConfigDetails {
    /// Directory the project name and relative paths default to
    pub working_dir: PathBuf,
    /// Raw config layers in override order (base first)
    pub config_files: Vec<(PathBuf, Value)>,
    /// Environment for interpolation and env passthrough
    pub environment: HashMap<String, String>,
}

/// The merged, validated configuration model
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective config version (of the first layer)
    pub version: ComposeVersion,
    /// Merged services, in declaration order
    pub services: Vec<ServiceConfig>,
    /// Declared networks
    pub networks: IndexMap<String, NetworkConfig>,
    /// Declared volumes
    pub volumes: IndexMap<String, VolumeConfig>,
    /// Declared secrets
    pub secrets: IndexMap<String, SecretConfig>,
    /// Declared configs
    pub configs: IndexMap<String, SecretConfig>,
}

impl Config {
    /// Look up one service by name
    pub fn service(&self, name: &str) -> Result<&ServiceConfig> {
        self.services
            .iter()
            .find(|service| service.name == name)
            .ok_or_else(|| ComposeError::no_such_service(name))
    }

    /// Names of all declared services, in order
    pub fn service_names(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|service| service.name.clone())
            .collect()
    }

    /// Render the normalized model as canonical JSON (sorted keys at every
    /// level), for the `config` verb and the config hash
    pub fn render(&self) -> Result<Value> {
        let mut services = serde_json::Map::new();
        for service in &self.services {
            services.insert(service.name.clone(), serde_json::to_value(service)?);
        }
        let value = serde_json::json!({
            "version": self.version.0,
            "services": services,
            "networks": serde_json::to_value(&self.networks)?,
            "volumes": serde_json::to_value(&self.volumes)?,
            "secrets": serde_json::to_value(&self.secrets)?,
            "configs": serde_json::to_value(&self.configs)?,
        });
        Ok(canonicalize(&value))
    }
}

impl From<serde_json::Error> for ComposeError {
    fn from(err: serde_json::Error) -> Self {
        ComposeError::configuration(err.to_string())
    }
}

/// Load, resolve and merge an ordered list of raw config layers
pub fn load(details: &ConfigDetails, loader: &dyn RawFileLoader) -> Result<Config> {
    if details.config_files.is_empty() {
        return Err(ComposeError::configuration("no configuration files given"));
    }

    let mut layers = Vec::new();
    for (path, raw) in &details.config_files {
        let interpolated = interpolation::interpolate_config(raw, &details.environment)?;
        let file = ConfigFile::from_value(path, &interpolated, &details.environment)?;
        layers.push(file);
    }

    // Resolve extends within each layer before the layers merge.
    let mut resolver = ExtendsResolver {
        loader,
        process_env: &details.environment,
        cache: HashMap::new(),
    };
    for layer in &mut layers {
        let names: Vec<String> = layer.services.keys().cloned().collect();
        for name in names {
            let resolved = resolver.resolve(layer, &name, Vec::new())?;
            layer.services.insert(name, resolved);
        }
    }

    let version = layers[0].version.clone();
    let mut merged = layers.remove(0);
    for layer in layers {
        debug!(file = %layer.filename.display(), "merging config layer");
        for (name, service) in layer.services {
            let combined = match merged.services.get(&name) {
                Some(base) => merge::merge_service(base, &service),
                None => service,
            };
            merged.services.insert(name, combined);
        }
        for (name, network) in layer.networks {
            merged.networks.insert(name, network);
        }
        for (name, volume) in layer.volumes {
            merged.volumes.insert(name, volume);
        }
        for (name, secret) in layer.secrets {
            merged.secrets.insert(name, secret);
        }
        for (name, config) in layer.configs {
            merged.configs.insert(name, config);
        }
    }

    let mut services: Vec<ServiceConfig> = Vec::new();
    for (name, mut service) in merged.services {
        service.name = name;
        service.extends = None;
        validation::validate_service(&service, &version)?;
        services.push(service);
    }

    let config = Config {
        version,
        services,
        networks: merged.networks,
        volumes: merged.volumes,
        secrets: merged.secrets,
        configs: merged.configs,
    };
    validate_references(&config)?;
    Ok(config)
}

/// Check that every cross-service and cross-resource reference points at
/// something declared
fn validate_references(config: &Config) -> Result<()> {
    let service_names = config.service_names();
    for service in &config.services {
        for link in &service.links {
            if !service_names.contains(&link.target) {
                return Err(ComposeError::configuration(format!(
                    "Service \"{}\" has a link to service \"{}\" which does not exist.",
                    service.name, link.target
                )));
            }
        }
        for name in service.depends_on.0.keys() {
            if !service_names.contains(name) {
                return Err(ComposeError::configuration(format!(
                    "Service \"{}\" depends on service \"{name}\" which is undefined.",
                    service.name
                )));
            }
        }
        for volumes_from in &service.volumes_from {
            if let Some(source) = volumes_from.service_name() {
                if !service_names.contains(&source.to_string()) {
                    return Err(ComposeError::configuration(format!(
                        "Service \"{}\" mounts volumes from \"{source}\" which is not the \
                         name of a service or container.",
                        service.name
                    )));
                }
            }
        }
        if service.network_mode.is_none() {
            for network in service.networks.0.keys() {
                if network != "default" && !config.networks.contains_key(network) {
                    return Err(ComposeError::configuration(format!(
                        "Service \"{}\" uses an undefined network \"{network}\"",
                        service.name
                    )));
                }
            }
        }
        for secret in &service.secrets {
            if !config.secrets.contains_key(&secret.source) {
                return Err(ComposeError::configuration(format!(
                    "Service \"{}\" uses an undefined secret \"{}\"",
                    service.name, secret.source
                )));
            }
        }
        for config_ref in &service.configs {
            if !config.configs.contains_key(&config_ref.source) {
                return Err(ComposeError::configuration(format!(
                    "Service \"{}\" uses an undefined config \"{}\"",
                    service.name, config_ref.source
                )));
            }
        }
    }
    Ok(())
}

struct ExtendsResolver<'a> {
    loader: &'a dyn RawFileLoader,
    process_env: &'a HashMap<String, String>,
    cache: HashMap<PathBuf, ConfigFile>,
}

impl ExtendsResolver<'_> {
    /// Resolve a service's `extends` chain into a flat declaration.
    ///
    /// `visited` holds the `(file, service)` signatures already on the
    /// trail, passed by value so sibling branches do not contaminate each
    /// other.
    fn resolve(
        &mut self,
        file: &ConfigFile,
        service_name: &str,
        visited: Vec<(PathBuf, String)>,
    ) -> Result<ServiceConfig> {
        let service = file
            .services
            .get(service_name)
            .ok_or_else(|| {
                ComposeError::configuration(format!(
                    "Cannot extend service '{service_name}' in {}: Service not found",
                    file.filename.display()
                ))
            })?
            .clone();

        let Some(extends) = service.extends.clone() else {
            return Ok(service);
        };

        let target_path = match &extends.file {
            Some(reference) => paths::expand_path(
                file.filename.parent().unwrap_or_else(|| Path::new(".")),
                reference,
            ),
            None => file.filename.clone(),
        };

        let signature = (target_path.clone(), extends.service.clone());
        if visited.contains(&signature) {
            let mut trail: Vec<String> = visited
                .iter()
                .map(|(path, name)| format!("{}:{name}", path.display()))
                .collect();
            trail.push(format!("{}:{}", signature.0.display(), signature.1));
            return Err(ComposeError::CircularReference { trail });
        }
        let mut next_visited = visited;
        next_visited.push(signature);

        let target_file = if target_path == file.filename {
            file.clone()
        } else {
            self.load_file(&target_path)?
        };

        let base = self.resolve(&target_file, &extends.service, next_visited)?;
        validate_extended(&base, &target_file.filename, &extends.service)?;

        let mut current = service;
        current.extends = None;
        let mut resolved = merge::merge_service(&base, &current);
        resolved.name = current.name.clone();
        Ok(resolved)
    }

    fn load_file(&mut self, path: &PathBuf) -> Result<ConfigFile> {
        if let Some(cached) = self.cache.get(path) {
            return Ok(cached.clone());
        }
        let raw = self.loader.load_raw(path)?;
        let interpolated = interpolation::interpolate_config(&raw, self.process_env)?;
        let file = ConfigFile::from_value(path, &interpolated, self.process_env)?;
        self.cache.insert(path.clone(), file.clone());
        Ok(file)
    }
}

fn validate_extended(base: &ServiceConfig, filename: &Path, service: &str) -> Result<()> {
    let error_prefix = format!("Cannot extend service '{service}' in {}:", filename.display());
    if !base.links.is_empty() {
        return Err(ComposeError::configuration(format!(
            "{error_prefix} services with 'links' cannot be extended"
        )));
    }
    if !base.volumes_from.is_empty() {
        return Err(ComposeError::configuration(format!(
            "{error_prefix} services with 'volumes_from' cannot be extended"
        )));
    }
    if !base.depends_on.is_empty() {
        return Err(ComposeError::configuration(format!(
            "{error_prefix} services with 'depends_on' cannot be extended"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn details(docs: Vec<(&str, Value)>) -> ConfigDetails {
        ConfigDetails {
            working_dir: PathBuf::from("/proj"),
            config_files: docs
                .into_iter()
                .map(|(path, value)| (PathBuf::from(path), value))
                .collect(),
            environment: HashMap::new(),
        }
    }

    #[test]
    fn test_load_single_layer() {
        let config = load(
            &details(vec![(
                "/proj/docker-compose.yml",
                json!({
                    "version": "3.9",
                    "services": {
                        "db": {"image": "postgres:16"},
                        "web": {"image": "busybox", "depends_on": ["db"]}
                    }
                }),
            )]),
            &NoFileLoader,
        )
        .unwrap();
        assert_eq!(config.service_names(), vec!["db", "web"]);
        assert_eq!(config.version.0, "3.9");
    }

    #[test]
    fn test_load_override_layer() {
        let config = load(
            &details(vec![
                (
                    "/proj/docker-compose.yml",
                    json!({
                        "version": "3.9",
                        "services": {
                            "web": {"image": "busybox", "environment": {"A": "1"}}
                        }
                    }),
                ),
                (
                    "/proj/docker-compose.override.yml",
                    json!({
                        "version": "3.9",
                        "services": {
                            "web": {"environment": {"B": "2"}},
                            "extra": {"image": "alpine"}
                        }
                    }),
                ),
            ]),
            &NoFileLoader,
        )
        .unwrap();
        let web = config.service("web").unwrap();
        assert_eq!(web.environment.0["A"], Some("1".to_string()));
        assert_eq!(web.environment.0["B"], Some("2".to_string()));
        assert!(config.service("extra").is_ok());
    }

    #[test]
    fn test_undefined_link_rejected() {
        let err = load(
            &details(vec![(
                "/proj/docker-compose.yml",
                json!({
                    "version": "3.9",
                    "services": {"web": {"image": "busybox", "links": ["ghost"]}}
                }),
            )]),
            &NoFileLoader,
        )
        .unwrap_err();
        assert!(err.to_string().contains("link to service \"ghost\""));
    }

    #[test]
    fn test_undefined_network_rejected() {
        let err = load(
            &details(vec![(
                "/proj/docker-compose.yml",
                json!({
                    "version": "3.9",
                    "services": {"web": {"image": "busybox", "networks": ["ghost"]}}
                }),
            )]),
            &NoFileLoader,
        )
        .unwrap_err();
        assert!(err.to_string().contains("undefined network"));
    }

    #[test]
    fn test_extends_same_file() {
        let config = load(
            &details(vec![(
                "/proj/docker-compose.yml",
                json!({
                    "version": "3.9",
                    "services": {
                        "base": {"image": "busybox", "environment": {"A": "1"}},
                        "web": {
                            "extends": {"service": "base"},
                            "environment": {"B": "2"}
                        }
                    }
                }),
            )]),
            &NoFileLoader,
        )
        .unwrap();
        let web = config.service("web").unwrap();
        assert_eq!(web.image.as_deref(), Some("busybox"));
        assert_eq!(web.environment.0["A"], Some("1".to_string()));
        assert_eq!(web.environment.0["B"], Some("2".to_string()));
        assert!(web.extends.is_none());
    }

    #[test]
    fn test_extends_cycle_reported_with_trail() {
        let err = load(
            &details(vec![(
                "/proj/docker-compose.yml",
                json!({
                    "version": "3.9",
                    "services": {
                        "a": {"image": "busybox", "extends": {"service": "b"}},
                        "b": {"image": "busybox", "extends": {"service": "a"}}
                    }
                }),
            )]),
            &NoFileLoader,
        )
        .unwrap_err();
        match err {
            ComposeError::CircularReference { trail } => {
                assert!(trail.len() >= 2);
            }
            other => panic!("expected CircularReference, got {other:?}"),
        }
    }

    #[test]
    fn test_extends_base_with_links_rejected() {
        let err = load(
            &details(vec![(
                "/proj/docker-compose.yml",
                json!({
                    "version": "3.9",
                    "services": {
                        "db": {"image": "postgres:16"},
                        "base": {"image": "busybox", "links": ["db"]},
                        "web": {"extends": {"service": "base"}}
                    }
                }),
            )]),
            &NoFileLoader,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'links' cannot be extended"));
    }

    #[test]
    fn test_v1_root_as_services() {
        let config = load(
            &details(vec![(
                "/proj/docker-compose.yml",
                json!({
                    "version": "1",
                    "web": {"image": "busybox"}
                }),
            )]),
            &NoFileLoader,
        )
        .unwrap();
        assert!(config.version.is_v1());
        assert_eq!(config.service_names(), vec!["web"]);
    }

    #[test]
    fn test_render_is_canonical() {
        let config = load(
            &details(vec![(
                "/proj/docker-compose.yml",
                json!({
                    "version": "3.9",
                    "services": {"web": {"image": "busybox"}},
                    "volumes": {"data": null}
                }),
            )]),
            &NoFileLoader,
        )
        .unwrap();
        let rendered = config.render().unwrap();
        assert_eq!(rendered["services"]["web"]["image"], "busybox");
        assert!(rendered["volumes"].get("data").is_some());
    }

    #[test]
    fn test_interpolation_applies_to_services() {
        let mut env = HashMap::new();
        env.insert("TAG".to_string(), "7.2".to_string());
        let config = load(
            &ConfigDetails {
                working_dir: PathBuf::from("/proj"),
                config_files: vec![(
                    PathBuf::from("/proj/docker-compose.yml"),
                    json!({
                        "version": "3.9",
                        "services": {"redis": {"image": "redis:${TAG}"}}
                    }),
                )],
                environment: env,
            },
            &NoFileLoader,
        )
        .unwrap();
        assert_eq!(
            config.service("redis").unwrap().image.as_deref(),
            Some("redis:7.2")
        );
    }
}
