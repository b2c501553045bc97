//! An in-memory engine used by the integration tests.
//!
//! `MockEngine` implements the full client seam over hash maps, close
//! enough to the real engine for convergence flows: containers are found
//! by label filters, create synthesizes an inspect payload (anonymous
//! volumes get generated names), and every call is journaled so tests can
//! assert ordering.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use compose_engine::{
    BuildOptions, ContainerCreateOptions, ContainerDetails, ContainerSummary, EngineClient,
    EngineError, EngineResult, EventStream, Filters, ImageDetails, LogStream,
    NetworkCreateOptions, NetworkDetails, ObjectKind, ProgressEvent, ProgressStream,
    VolumeCreateOptions, VolumeDetails,
};

#[derive(Default)]
struct EngineState {
    containers: HashMap<String, ContainerDetails>,
    networks: HashMap<String, NetworkDetails>,
    volumes: HashMap<String, VolumeDetails>,
    images: HashSet<String>,
    pullable: HashSet<String>,
}

/// In-memory engine double
pub struct MockEngine {
    state: Mutex<EngineState>,
    sequence: AtomicU64,
    journal: Mutex<Vec<(u64, String)>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            sequence: AtomicU64::new(1),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Register an image as locally present
    pub fn add_image(&self, reference: &str) {
        self.state.lock().unwrap().images.insert(reference.into());
    }

    /// Register an image as pullable from the registry
    pub fn add_pullable(&self, reference: &str) {
        self.state.lock().unwrap().pullable.insert(reference.into());
    }

    /// Whether an image is locally present
    pub fn has_image(&self, reference: &str) -> bool {
        self.state.lock().unwrap().images.contains(reference)
    }

    /// Whether a network exists
    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().unwrap().networks.contains_key(name)
    }

    /// Names of all containers, running or not
    pub fn container_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .values()
            .map(|details| details.name.trim_start_matches('/').to_string())
            .collect()
    }

    /// The journaled operations in order
    pub fn journal(&self) -> Vec<String> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// The journal position of the first entry containing `needle`
    pub fn journal_position(&self, needle: &str) -> Option<usize> {
        self.journal()
            .iter()
            .position(|entry| entry.contains(needle))
    }

    fn record(&self, entry: String) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().unwrap().push((seq, entry));
    }

    fn next_id(&self, prefix: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}{seq:012x}")
    }

    fn find_container<'a>(
        state: &'a EngineState,
        reference: &str,
    ) -> Option<&'a ContainerDetails> {
        state.containers.get(reference).or_else(|| {
            state
                .containers
                .values()
                .find(|details| details.name.trim_start_matches('/') == reference)
        })
    }

    fn matches_filters(details: &ContainerDetails, filters: &Filters) -> bool {
        for (key, terms) in filters.as_map() {
            match key.as_str() {
                "label" => {
                    for term in terms {
                        let matched = match term.split_once('=') {
                            Some((label, value)) => {
                                details.config.labels.get(label).map(String::as_str)
                                    == Some(value)
                            }
                            None => details.config.labels.contains_key(term),
                        };
                        if !matched {
                            return false;
                        }
                    }
                }
                "status" => {
                    if !terms.iter().any(|status| details.state.status == *status) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }
}

fn progress_ok(lines: Vec<ProgressEvent>) -> ProgressStream {
    futures_util::stream::iter(lines.into_iter().map(Ok)).boxed()
}

#[async_trait]
impl EngineClient for MockEngine {
    fn api_version(&self) -> String {
        "1.41".into()
    }

    async fn containers(
        &self,
        all: bool,
        filters: &Filters,
    ) -> EngineResult<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .values()
            .filter(|details| all || details.state.running)
            .filter(|details| Self::matches_filters(details, filters))
            .map(|details| ContainerSummary {
                id: details.id.clone(),
                names: vec![details.name.clone()],
                image: details.config.image.clone(),
                labels: details.config.labels.clone(),
                state: details.state.status.clone(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerDetails> {
        let state = self.state.lock().unwrap();
        Self::find_container(&state, id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(ObjectKind::Container, id))
    }

    async fn create_container(&self, options: ContainerCreateOptions) -> EngineResult<String> {
        let mut state = self.state.lock().unwrap();
        let name = format!("/{}", options.name);
        if state.containers.values().any(|details| details.name == name) {
            return Err(EngineError::api(
                409,
                format!("Conflict. The container name \"{name}\" is already in use"),
            ));
        }

        let id = {
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
            format!("c{seq:015x}")
        };

        // Synthesize the mounts the engine would report back: binds with a
        // path source become bind mounts, binds with a bare source become
        // volume mounts, and leftover mountpoint declarations become
        // anonymous volumes with generated names.
        let mut mounts = Vec::new();
        let mut bound_targets: HashSet<String> = HashSet::new();
        for bind in &options.host_config.binds {
            let parts: Vec<&str> = bind.splitn(3, ':').collect();
            if parts.len() < 2 {
                continue;
            }
            let (source, target) = (parts[0], parts[1]);
            let rw = parts.get(2).map_or(true, |mode| !mode.contains("ro"));
            bound_targets.insert(target.to_string());
            if source.starts_with('/') || source.starts_with('.') {
                mounts.push(compose_engine::client::MountPoint {
                    mount_type: "bind".into(),
                    name: None,
                    source: source.into(),
                    destination: target.into(),
                    driver: None,
                    rw,
                });
            } else {
                mounts.push(compose_engine::client::MountPoint {
                    mount_type: "volume".into(),
                    name: Some(source.into()),
                    source: String::new(),
                    destination: target.into(),
                    driver: Some("local".into()),
                    rw,
                });
            }
        }
        for target in options.config.volumes.keys() {
            if !bound_targets.contains(target) {
                mounts.push(compose_engine::client::MountPoint {
                    mount_type: "volume".into(),
                    name: Some(self.next_id("anon")),
                    source: String::new(),
                    destination: target.clone(),
                    driver: Some("local".into()),
                    rw: true,
                });
            }
        }

        let details = ContainerDetails {
            id: id.clone(),
            name,
            created: format!("2024-01-01T00:00:{:02}Z", state.containers.len() % 60),
            state: compose_engine::client::ContainerState {
                status: "created".into(),
                running: false,
                ..Default::default()
            },
            config: compose_engine::client::InspectedConfig {
                image: options.config.image.clone(),
                labels: options.config.labels.clone(),
                env: options.config.env.clone(),
                entrypoint: options.config.entrypoint.clone(),
                cmd: options.config.cmd.clone(),
            },
            host_config: compose_engine::client::InspectedHostConfig {
                links: (!options.host_config.links.is_empty())
                    .then(|| options.host_config.links.clone()),
                network_mode: options
                    .host_config
                    .network_mode
                    .clone()
                    .unwrap_or_else(|| "default".into()),
            },
            mounts,
            network_settings: Default::default(),
        };
        self.record(format!("create_container {}", options.name));
        state.containers.insert(id.clone(), details);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(details) = state.containers.get_mut(id) else {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        };
        details.state.running = true;
        details.state.status = "running".into();
        let name = details.name.trim_start_matches('/').to_string();
        drop(state);
        self.record(format!("start_container {name}"));
        Ok(())
    }

    async fn stop_container(&self, id: &str, _: Option<Duration>) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(details) = state.containers.get_mut(id) else {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        };
        details.state.running = false;
        details.state.status = "exited".into();
        details.state.exit_code = 0;
        let name = details.name.trim_start_matches('/').to_string();
        drop(state);
        self.record(format!("stop_container {name}"));
        Ok(())
    }

    async fn kill_container(&self, id: &str, _: Option<&str>) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(details) = state.containers.get_mut(id) else {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        };
        details.state.running = false;
        details.state.status = "exited".into();
        details.state.exit_code = 137;
        Ok(())
    }

    async fn restart_container(&self, id: &str, _: Option<Duration>) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(details) = state.containers.get_mut(id) else {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        };
        details.state.running = true;
        details.state.status = "running".into();
        Ok(())
    }

    async fn pause_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(details) = state.containers.get_mut(id) else {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        };
        details.state.paused = true;
        Ok(())
    }

    async fn unpause_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(details) = state.containers.get_mut(id) else {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        };
        details.state.paused = false;
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool, _volumes: bool) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .containers
            .get(id)
            .map(|details| details.name.trim_start_matches('/').to_string());
        if state.containers.remove(id).is_none() {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        }
        drop(state);
        self.record(format!("remove_container {}", name.unwrap_or_default()));
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> EngineResult<i64> {
        let state = self.state.lock().unwrap();
        Self::find_container(&state, id)
            .map(|details| details.state.exit_code)
            .ok_or_else(|| EngineError::not_found(ObjectKind::Container, id))
    }

    async fn rename_container(&self, id: &str, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(details) = state.containers.get_mut(id) else {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        };
        details.name = format!("/{name}");
        Ok(())
    }

    async fn commit_container(&self, id: &str, repo: &str, tag: &str) -> EngineResult<String> {
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(id) {
            return Err(EngineError::not_found(ObjectKind::Container, id));
        }
        let reference = format!("{repo}:{tag}");
        state.images.insert(reference);
        Ok(self.next_id("sha256:"))
    }

    async fn container_logs(&self, _: &str, _: bool) -> EngineResult<LogStream> {
        Ok(futures_util::stream::empty().boxed())
    }

    async fn connect_container_to_network(
        &self,
        network: &str,
        container: &str,
        config: compose_engine::EndpointConfig,
    ) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.networks.contains_key(network) {
            return Err(EngineError::not_found(ObjectKind::Network, network));
        }
        let Some(details) = state.containers.get_mut(container) else {
            return Err(EngineError::not_found(ObjectKind::Container, container));
        };
        details.network_settings.networks.insert(
            network.to_string(),
            compose_engine::client::EndpointDetails {
                aliases: Some(config.aliases),
                ip_address: "172.18.0.2".into(),
            },
        );
        Ok(())
    }

    async fn disconnect_container_from_network(
        &self,
        network: &str,
        container: &str,
    ) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        let Some(details) = state.containers.get_mut(container) else {
            return Err(EngineError::not_found(ObjectKind::Container, container));
        };
        details.network_settings.networks.remove(network);
        Ok(())
    }

    async fn networks(
        &self,
        _: &Filters,
    ) -> EngineResult<Vec<compose_engine::client::NetworkSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .values()
            .map(|details| compose_engine::client::NetworkSummary {
                id: details.id.clone(),
                name: details.name.clone(),
                labels: details.labels.clone(),
            })
            .collect())
    }

    async fn inspect_network(&self, name: &str) -> EngineResult<NetworkDetails> {
        let state = self.state.lock().unwrap();
        state
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::not_found(ObjectKind::Network, name))
    }

    async fn create_network(&self, options: NetworkCreateOptions) -> EngineResult<String> {
        let mut state = self.state.lock().unwrap();
        let id = {
            let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
            format!("n{seq:015x}")
        };
        let details = NetworkDetails {
            id: id.clone(),
            name: options.name.clone(),
            driver: options.driver.unwrap_or_else(|| "bridge".into()),
            options: options.options,
            ipam: options.ipam,
            internal: options.internal,
            enable_ipv6: options.enable_ipv6,
            labels: options.labels,
        };
        self.record(format!("create_network {}", options.name));
        state.networks.insert(options.name, details);
        Ok(id)
    }

    async fn remove_network(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.networks.remove(name).is_none() {
            return Err(EngineError::not_found(ObjectKind::Network, name));
        }
        drop(state);
        self.record(format!("remove_network {name}"));
        Ok(())
    }

    async fn volumes(&self) -> EngineResult<Vec<VolumeDetails>> {
        let state = self.state.lock().unwrap();
        Ok(state.volumes.values().cloned().collect())
    }

    async fn inspect_volume(&self, name: &str) -> EngineResult<VolumeDetails> {
        let state = self.state.lock().unwrap();
        state
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::not_found(ObjectKind::Volume, name))
    }

    async fn create_volume(&self, options: VolumeCreateOptions) -> EngineResult<VolumeDetails> {
        let mut state = self.state.lock().unwrap();
        let details = VolumeDetails {
            name: options.name.clone(),
            driver: options.driver.unwrap_or_else(|| "local".into()),
            mountpoint: format!("/var/lib/docker/volumes/{}/_data", options.name),
            labels: options.labels,
            options: options.driver_opts,
        };
        self.record(format!("create_volume {}", options.name));
        state.volumes.insert(options.name, details.clone());
        Ok(details)
    }

    async fn remove_volume(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.volumes.remove(name).is_none() {
            return Err(EngineError::not_found(ObjectKind::Volume, name));
        }
        drop(state);
        self.record(format!("remove_volume {name}"));
        Ok(())
    }

    async fn inspect_image(&self, name: &str) -> EngineResult<ImageDetails> {
        let state = self.state.lock().unwrap();
        let normalized = if name.contains(':') {
            name.to_string()
        } else {
            format!("{name}:latest")
        };
        if state.images.contains(name) || state.images.contains(&normalized) {
            // A stable fake id derived from the reference keeps the config
            // hash deterministic across calls.
            let mut id_hash: u64 = 0xcbf29ce484222325;
            for byte in normalized.bytes() {
                id_hash ^= u64::from(byte);
                id_hash = id_hash.wrapping_mul(0x100000001b3);
            }
            Ok(ImageDetails {
                id: format!("sha256:{id_hash:016x}"),
                repo_tags: vec![normalized],
            })
        } else {
            Err(EngineError::not_found(ObjectKind::Image, name))
        }
    }

    async fn pull_image(
        &self,
        repo: &str,
        tag: &str,
        _: Option<&str>,
    ) -> EngineResult<ProgressStream> {
        let reference = format!("{repo}:{tag}");
        self.record(format!("pull_image {reference}"));
        let mut state = self.state.lock().unwrap();
        if state.pullable.contains(&reference) || state.pullable.contains(repo) {
            state.images.insert(reference.clone());
            state.images.insert(repo.to_string());
            Ok(progress_ok(vec![
                ProgressEvent {
                    status: Some(format!("Pulling from {repo}")),
                    ..Default::default()
                },
                ProgressEvent {
                    status: Some("Digest: sha256:feedface".into()),
                    ..Default::default()
                },
            ]))
        } else {
            Ok(progress_ok(vec![ProgressEvent {
                error: Some(format!(
                    "pull access denied for {repo}, repository does not exist"
                )),
                ..Default::default()
            }]))
        }
    }

    async fn push_image(&self, repo: &str, tag: &str) -> EngineResult<ProgressStream> {
        self.record(format!("push_image {repo}:{tag}"));
        Ok(progress_ok(vec![ProgressEvent {
            status: Some("Digest: sha256:cafed00d".into()),
            ..Default::default()
        }]))
    }

    async fn build_image(&self, options: BuildOptions) -> EngineResult<ProgressStream> {
        self.record(format!("build_image {}", options.tag));
        let mut state = self.state.lock().unwrap();
        state.images.insert(options.tag.clone());
        Ok(progress_ok(vec![ProgressEvent {
            stream: Some("Successfully built 0123456789ab\n".into()),
            ..Default::default()
        }]))
    }

    async fn remove_image(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.images.remove(name) {
            return Err(EngineError::not_found(ObjectKind::Image, name));
        }
        drop(state);
        self.record(format!("remove_image {name}"));
        Ok(())
    }

    async fn inspect_distribution(
        &self,
        _: &str,
    ) -> EngineResult<compose_engine::client::DistributionDetails> {
        Ok(Default::default())
    }

    async fn events(&self, _: &Filters) -> EngineResult<EventStream> {
        Ok(futures_util::stream::empty().boxed())
    }
}
