//! Declared networks and their convergence against engine state.
//!
//! Each declared network is *ensured* before any service work: external
//! networks must already exist; owned networks are created when absent and
//! diff-checked when present. A config drift on an existing network is an
//! error naming the changed property, since networks cannot be mutated in
//! place. A legacy name (project separators stripped) is honored on read,
//! never written.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::client::{
    version_gte, EngineClient, Ipam, IpamPool, NetworkCreateOptions, NetworkDetails,
};
use crate::config::{Config, IpamConfig, NetworkConfig};
use crate::errors::{ComposeError, Result};
use crate::labels::{legacy_project_name, LABEL_NETWORK, LABEL_PROJECT, LABEL_VERSION};

/// Engine-internal driver options excluded from the drift comparison
const OPTS_EXCEPTIONS: [&str; 3] = [
    "com.docker.network.driver.overlay.vxlanid_list",
    "com.docker.network.windowsshim.hnsid",
    "com.docker.network.windowsshim.networkname",
];

/// One declared network bound to a client
#[derive(Clone)]
pub struct Network {
    client: Arc<dyn EngineClient>,
    project: String,
    /// The declared key under the top-level `networks` mapping
    pub name: String,
    custom_name: Option<String>,
    driver: Option<String>,
    driver_opts: IndexMap<String, String>,
    ipam: Option<IpamConfig>,
    /// Externally managed: found, never created or deleted
    pub external: bool,
    internal: bool,
    enable_ipv6: bool,
    labels: IndexMap<String, String>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("external", &self.external)
            .finish()
    }
}

impl Network {
    /// Bind one declared network to a client
    pub fn from_config(
        client: Arc<dyn EngineClient>,
        project: &str,
        name: &str,
        config: &NetworkConfig,
    ) -> Self {
        let custom_name = config
            .name
            .clone()
            .or_else(|| config.external.custom_name().map(str::to_string));
        Self {
            client,
            project: project.to_string(),
            name: name.to_string(),
            custom_name,
            driver: config.driver.clone(),
            driver_opts: config.driver_opts.clone(),
            ipam: config.ipam.clone(),
            external: config.external.is_external(),
            internal: config.internal,
            enable_ipv6: config.enable_ipv6,
            labels: config.labels.0.clone(),
        }
    }

    /// The engine-side name: the custom name, the bare declared name for
    /// an external network, or `<project>_<name>`
    pub fn full_name(&self) -> String {
        match &self.custom_name {
            Some(name) => name.clone(),
            None if self.external => self.name.clone(),
            None => format!("{}_{}", self.project, self.name),
        }
    }

    /// The engine-side name a pre-label release would have used
    pub fn legacy_full_name(&self) -> String {
        match &self.custom_name {
            Some(name) => name.clone(),
            None => format!("{}_{}", legacy_project_name(&self.project), self.name),
        }
    }

    fn owned_labels(&self) -> BTreeMap<String, String> {
        let mut labels: BTreeMap<String, String> =
            self.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        labels.insert(LABEL_PROJECT.into(), self.project.clone());
        labels.insert(LABEL_NETWORK.into(), self.name.clone());
        labels.insert(LABEL_VERSION.into(), crate::VERSION.into());
        labels
    }

    /// Find the network on the engine, trying the legacy name once before
    /// declaring not-found
    async fn inspect_with_fallback(&self) -> Result<Option<(NetworkDetails, String)>> {
        match self.client.inspect_network(&self.full_name()).await {
            Ok(details) => return Ok(Some((details, self.full_name()))),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(ComposeError::operation_failed(err.explanation())),
        }
        let legacy = self.legacy_full_name();
        if legacy != self.full_name() {
            match self.client.inspect_network(&legacy).await {
                Ok(details) => return Ok(Some((details, legacy))),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(ComposeError::operation_failed(err.explanation())),
            }
        }
        Ok(None)
    }

    /// Converge this network: verify an external one exists, diff-check an
    /// owned existing one, create an owned missing one
    pub async fn ensure(&self) -> Result<()> {
        if self.external {
            // Swarm nodes do not register overlay networks created on
            // another node until they are in use.
            if self.driver.as_deref() == Some("overlay") {
                return Ok(());
            }
            let name = self.full_name();
            match self.client.inspect_network(&name).await {
                Ok(_) => {
                    debug!(
                        network = %name,
                        "network declared as external, no new network will be created"
                    );
                    return Ok(());
                }
                Err(err) if err.is_not_found() => {
                    return Err(ComposeError::configuration(format!(
                        "Network {name} declared as external, but could not be found. Please \
                         create the network manually using `docker network create {name}` and \
                         try again."
                    )));
                }
                Err(err) => return Err(ComposeError::operation_failed(err.explanation())),
            }
        }

        if let Some((remote, resolved_name)) = self.inspect_with_fallback().await? {
            return self.check_remote_config(&remote, &resolved_name);
        }

        let driver_name = self
            .driver
            .clone()
            .map_or_else(|| "the default driver".to_string(), |d| format!("driver \"{d}\""));
        info!(network = %self.full_name(), "creating network with {driver_name}");

        let attachable = version_gte(&self.client.api_version(), "1.24").then_some(true);
        self.client
            .create_network(NetworkCreateOptions {
                name: self.full_name(),
                driver: self.driver.clone(),
                options: self
                    .driver_opts
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                ipam: self.ipam.as_ref().map(ipam_to_engine),
                internal: self.internal,
                enable_ipv6: self.enable_ipv6,
                attachable,
                labels: self.owned_labels(),
            })
            .await
            .map_err(|err| {
                ComposeError::operation_failed(format!(
                    "Cannot create network {}: {}",
                    self.full_name(),
                    err.explanation()
                ))
            })?;
        Ok(())
    }

    /// Remove the network, unless it is external
    pub async fn remove(&self) -> Result<()> {
        if self.external {
            info!(network = %self.full_name(), "network is external, skipping");
            return Ok(());
        }
        info!(network = %self.full_name(), "removing network");
        match self.client.remove_network(&self.full_name()).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                warn!(network = %self.full_name(), "network not found");
                Ok(())
            }
            Err(err) => Err(ComposeError::operation_failed(err.explanation())),
        }
    }

    /// Compare the declared configuration against the engine-side network
    fn check_remote_config(&self, remote: &NetworkDetails, name: &str) -> Result<()> {
        let changed = |property: &str| ComposeError::NetworkConfigChanged {
            network: name.to_string(),
            property: property.to_string(),
        };

        if let Some(driver) = &self.driver {
            if remote.driver != *driver {
                return Err(changed("driver"));
            }
        }

        let local_opts = &self.driver_opts;
        let mut option_keys: Vec<&String> =
            remote.options.keys().chain(local_opts.keys()).collect();
        option_keys.sort();
        option_keys.dedup();
        for key in option_keys {
            if OPTS_EXCEPTIONS.contains(&key.as_str()) {
                continue;
            }
            if remote.options.get(key) != local_opts.get(key) {
                return Err(changed(&format!("option \"{key}\"")));
            }
        }

        if let Some(local_ipam) = &self.ipam {
            self.check_remote_ipam(remote, local_ipam, name)?;
        }

        if self.internal != remote.internal {
            return Err(changed("internal"));
        }
        if self.enable_ipv6 != remote.enable_ipv6 {
            return Err(changed("enable_ipv6"));
        }

        // User labels drifting is survivable; warn instead of failing.
        let mut label_keys: Vec<&String> =
            remote.labels.keys().chain(self.labels.keys()).collect();
        label_keys.sort();
        label_keys.dedup();
        for key in label_keys {
            if key.starts_with("com.docker.") {
                continue;
            }
            if remote.labels.get(key) != self.labels.get(key) {
                warn!(
                    network = %name,
                    label = %key,
                    "network label has changed, the network may need to be recreated"
                );
            }
        }
        Ok(())
    }

    fn check_remote_ipam(
        &self,
        remote: &NetworkDetails,
        local: &IpamConfig,
        name: &str,
    ) -> Result<()> {
        let changed = |property: &str| ComposeError::NetworkConfigChanged {
            network: name.to_string(),
            property: property.to_string(),
        };
        let remote_ipam = remote.ipam.clone().unwrap_or_default();

        if let Some(driver) = &local.driver {
            if remote_ipam.driver.as_deref().unwrap_or("default") != driver {
                return Err(changed("IPAM driver"));
            }
        }

        if !local.config.is_empty() {
            if local.config.len() != remote_ipam.config.len() {
                return Err(changed("IPAM configs"));
            }
            let mut local_pools = local.config.clone();
            local_pools.sort_by(|a, b| a.subnet.cmp(&b.subnet));
            let mut remote_pools = remote_ipam.config.clone();
            remote_pools.sort_by(|a, b| a.subnet.cmp(&b.subnet));
            for (local_pool, remote_pool) in local_pools.iter().zip(&remote_pools) {
                if local_pool.subnet != remote_pool.subnet {
                    return Err(changed("IPAM config subnet"));
                }
                if local_pool.gateway.is_some() && local_pool.gateway != remote_pool.gateway {
                    return Err(changed("IPAM config gateway"));
                }
                if local_pool.ip_range != remote_pool.ip_range {
                    return Err(changed("IPAM config ip_range"));
                }
                let local_aux: BTreeMap<&String, &String> =
                    local_pool.aux_addresses.iter().collect();
                let remote_aux: BTreeMap<&String, &String> =
                    remote_pool.aux_addresses.iter().collect();
                if local_aux != remote_aux {
                    return Err(changed("IPAM config aux_addresses"));
                }
            }
        }

        let mut option_keys: Vec<&String> = remote_ipam
            .options
            .keys()
            .chain(local.options.keys())
            .collect();
        option_keys.sort();
        option_keys.dedup();
        for key in option_keys {
            if remote_ipam.options.get(key) != local.options.get(key) {
                return Err(changed(&format!("IPAM option \"{key}\"")));
            }
        }
        Ok(())
    }
}

/// Convert a declared IPAM block into the engine shape
pub fn ipam_to_engine(ipam: &IpamConfig) -> Ipam {
    Ipam {
        driver: Some(ipam.driver.clone().unwrap_or_else(|| "default".into())),
        config: ipam
            .config
            .iter()
            .map(|pool| IpamPool {
                subnet: pool.subnet.clone(),
                ip_range: pool.ip_range.clone(),
                gateway: pool.gateway.clone(),
                aux_addresses: pool
                    .aux_addresses
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            })
            .collect(),
        options: ipam
            .options
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

/// The networks one project declares and uses
#[derive(Debug, Clone)]
pub struct ProjectNetworks {
    networks: IndexMap<String, Network>,
    use_networking: bool,
}

impl ProjectNetworks {
    /// Collect the networks the project's services reference.
    ///
    /// The default network always exists for a networking project, even if
    /// no service names it; declared-but-unused networks draw a warning.
    pub fn from_config(
        client: Arc<dyn EngineClient>,
        project: &str,
        config: &Config,
        use_networking: bool,
    ) -> Self {
        let mut declared: IndexMap<String, Network> = config
            .networks
            .iter()
            .map(|(name, network_config)| {
                (
                    name.clone(),
                    Network::from_config(Arc::clone(&client), project, name, network_config),
                )
            })
            .collect();
        if !declared.contains_key("default") {
            declared.insert(
                "default".into(),
                Network::from_config(
                    Arc::clone(&client),
                    project,
                    "default",
                    &NetworkConfig::default(),
                ),
            );
        }

        let mut used: IndexMap<String, Network> = IndexMap::new();
        for service in &config.services {
            for name in service_network_names(service) {
                if let Some(network) = declared.get(&name) {
                    used.insert(name, network.clone());
                }
            }
        }
        if !used.contains_key("default") {
            used.insert("default".into(), declared["default"].clone());
        }

        let unused: Vec<&String> = declared
            .keys()
            .filter(|name| !used.contains_key(*name) && *name != "default")
            .collect();
        if !unused.is_empty() {
            warn!(
                networks = ?unused,
                "some networks were defined but are not used by any service"
            );
        }

        Self {
            networks: used,
            use_networking,
        }
    }

    /// The engine-side name for a declared network key
    pub fn engine_name(&self, declared: &str) -> Option<String> {
        self.networks.get(declared).map(Network::full_name)
    }

    /// Ensure every used network, external ones included
    pub async fn initialize(&self) -> Result<()> {
        if !self.use_networking {
            return Ok(());
        }
        for network in self.networks.values() {
            network.ensure().await?;
        }
        Ok(())
    }

    /// Remove every owned network
    pub async fn remove(&self) -> Result<()> {
        if !self.use_networking {
            return Ok(());
        }
        for network in self.networks.values() {
            network.remove().await?;
        }
        Ok(())
    }
}

/// The network names a service attaches to: its `networks` keys, or
/// `default` when it declares none and no `network_mode`
pub fn service_network_names(service: &crate::config::ServiceConfig) -> Vec<String> {
    if service.network_mode.is_some() {
        return Vec::new();
    }
    if service.networks.is_empty() {
        return vec!["default".into()];
    }
    service.networks.0.keys().cloned().collect()
}
