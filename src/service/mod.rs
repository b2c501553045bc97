//! Per-service container lifecycle and convergence.
//!
//! A [`Service`] realizes one declared container role against the engine:
//! it finds its containers by label, computes the configuration hash that
//! decides divergence, derives a [`ConvergencePlan`] and executes it with
//! bounded parallelism. Recreate preserves the predecessor's anonymous
//! volumes and steers placement back to the same host; scaling allocates
//! replica numbers upward and removes the highest numbers first.

pub mod options;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use indexmap::IndexMap;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::{EngineClient, Filters, ImageDetails, ProgressStream};
use crate::config::{
    FileReference, Mode, NetworkAttachment, ServiceConfig, VolumesFromSource,
};
use crate::container::Container;
use crate::errors::{ComposeError, Result};
use crate::exec::{parallel_execute, ExecuteOptions};
use crate::labels::{generate_slug, service_labels, LABEL_CONTAINER_NUMBER};
use crate::utils::{json_hash, parse_compose_duration};

pub use options::{build_create_options, image_name, CreateContext, OneOffOverrides};

/// Default grace period for container stop when the service declares none
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// When containers should be recreated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvergenceStrategy {
    /// Recreate when the config hash changed (default)
    #[default]
    Changed,
    /// Recreate unconditionally
    Always,
    /// Start existing containers, never recreate
    Never,
}

impl ConvergenceStrategy {
    /// Whether this strategy permits recreating diverged containers
    pub fn allows_recreate(&self) -> bool {
        !matches!(self, Self::Never)
    }
}

/// What to do about a missing image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildAction {
    /// Build only when the image is missing and the service can be built
    #[default]
    None,
    /// Always build
    Force,
    /// Never build; a missing image is an error
    Skip,
}

/// Which images `down` removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageRemovalMode {
    /// Remove no images
    #[default]
    None,
    /// Remove only images built by the project (no explicit `image:`)
    Local,
    /// Remove every service image
    All,
}

/// The action a convergence plan prescribes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceAction {
    /// No containers exist: create them
    Create,
    /// Create exactly one one-off container
    OneOff,
    /// At least one container diverged: recreate
    Recreate,
    /// Containers exist and match, some are stopped: start them
    Start,
    /// Everything matches and runs
    Noop,
}

/// The planned engine-state transition for one service
#[derive(Debug, Clone)]
pub struct ConvergencePlan {
    /// The prescribed action
    pub action: ConvergenceAction,
    /// The containers the action operates on
    pub containers: Vec<Container>,
}

/// Options for executing a convergence plan
#[derive(Clone, Default)]
pub struct ConvergeOptions {
    /// Stop grace period override
    pub timeout: Option<Duration>,
    /// Start containers after creating them
    pub start: bool,
    /// Scale override for this run
    pub scale_override: Option<u64>,
    /// Whether to adjust replica counts (off for `run` dependencies)
    pub rescale: bool,
    /// Discard anonymous volumes instead of preserving them
    pub renew_anonymous_volumes: bool,
    /// One-off overrides for the `run` path
    pub one_off_overrides: Option<OneOffOverrides>,
}

impl ConvergeOptions {
    /// The defaults used by `up`
    pub fn up() -> Self {
        Self {
            start: true,
            rescale: true,
            ..Default::default()
        }
    }
}

/// One declared service bound to a client and a project
#[derive(Clone)]
pub struct Service {
    /// Service name
    pub name: String,
    project: String,
    client: Arc<dyn EngineClient>,
    /// The merged declaration, volumes already namespaced
    pub config: ServiceConfig,
    network_mode: Mode,
    pid_mode: Mode,
    ipc_mode: Mode,
    /// Engine network name to attachment, highest priority first
    networks: IndexMap<String, NetworkAttachment>,
    use_networking: bool,
    secret_host_files: Vec<(FileReference, String)>,
    extra_labels: Vec<(String, String)>,
    proxy_environment: IndexMap<String, String>,
    default_platform: Option<String>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("project", &self.project)
            .finish()
    }
}

/// Construction parameters for [`Service`]
pub struct ServiceParams {
    /// Project name
    pub project: String,
    /// The merged declaration
    pub config: ServiceConfig,
    /// Resolved network mode
    pub network_mode: Mode,
    /// Resolved PID mode
    pub pid_mode: Mode,
    /// Resolved IPC mode
    pub ipc_mode: Mode,
    /// Engine network name to attachment
    pub networks: IndexMap<String, NetworkAttachment>,
    /// Whether the project uses networking (v2+)
    pub use_networking: bool,
    /// Secret references with resolved host files
    pub secret_host_files: Vec<(FileReference, String)>,
    /// Caller-injected labels
    pub extra_labels: Vec<(String, String)>,
    /// Lowest-priority environment entries
    pub proxy_environment: IndexMap<String, String>,
    /// Default platform for pulls and builds
    pub default_platform: Option<String>,
}

impl Service {
    /// Bind a service declaration to a client
    pub fn new(client: Arc<dyn EngineClient>, params: ServiceParams) -> Self {
        let mut networks = params.networks;
        networks.sort_by(|_, a, _, b| {
            b.priority
                .unwrap_or(0)
                .cmp(&a.priority.unwrap_or(0))
        });
        Self {
            name: params.config.name.clone(),
            project: params.project,
            client,
            config: params.config,
            network_mode: params.network_mode,
            pid_mode: params.pid_mode,
            ipc_mode: params.ipc_mode,
            networks,
            use_networking: params.use_networking,
            secret_host_files: params.secret_host_files,
            extra_labels: params.extra_labels,
            proxy_environment: params.proxy_environment,
            default_platform: params.default_platform,
        }
    }

    /// The image reference this service runs
    pub fn image_name(&self) -> String {
        image_name(&self.project, &self.config)
    }

    /// Names of services this one depends on
    pub fn dependency_names(&self) -> Vec<String> {
        self.config.dependency_names()
    }

    /// The declared replica count
    pub fn scale_num(&self) -> u64 {
        self.config.effective_scale()
    }

    fn labels(&self, one_off: bool, legacy: bool) -> Vec<String> {
        service_labels(&self.project, &self.name, one_off, legacy)
    }

    /// This service's containers, found by label with one legacy-label
    /// read fallback
    pub async fn containers(
        &self,
        stopped: bool,
        one_off: bool,
        extra_labels: &[String],
    ) -> Result<Vec<Container>> {
        let filters = Filters::new()
            .labels(self.labels(one_off, false))
            .labels(extra_labels.to_vec());
        let summaries = self
            .client
            .containers(stopped, &filters)
            .await
            .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
        if !summaries.is_empty() {
            return Ok(summaries
                .iter()
                .map(|summary| Container::from_summary(Arc::clone(&self.client), summary))
                .collect());
        }

        let legacy_filters = Filters::new()
            .labels(self.labels(one_off, true))
            .labels(extra_labels.to_vec());
        let summaries = self
            .client
            .containers(stopped, &legacy_filters)
            .await
            .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
        Ok(summaries
            .iter()
            .map(|summary| Container::from_summary(Arc::clone(&self.client), summary))
            .filter(|container| container.has_legacy_project_name(&self.project))
            .collect())
    }

    /// The container with a given replica number
    pub async fn get_container(&self, number: u32) -> Result<Container> {
        let label = format!("{LABEL_CONTAINER_NUMBER}={number}");
        let containers = self.containers(true, false, &[label]).await?;
        containers.into_iter().next().ok_or_else(|| {
            ComposeError::operation_failed(format!(
                "No container found for {}_{number}",
                self.name
            ))
        })
    }

    /// The next free replica number: `max(existing) + 1`, stopped
    /// containers included
    async fn next_container_number(&self) -> Result<u32> {
        let mut numbers: Vec<u32> = Vec::new();
        for container in self.containers(true, false, &[]).await? {
            if let Some(number) = container.number() {
                numbers.push(number);
            }
        }
        Ok(numbers.into_iter().max().unwrap_or(0) + 1)
    }

    /// Inspect the service image
    pub async fn image(&self) -> Result<ImageDetails> {
        self.client
            .inspect_image(&self.image_name())
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    ComposeError::no_such_image(self.image_name())
                } else {
                    ComposeError::operation_failed(err.explanation())
                }
            })
    }

    /// Whether the service has a build context
    pub fn can_be_built(&self) -> bool {
        self.config.can_be_built()
    }

    /// The platform passed to pulls and builds
    pub fn platform(&self) -> Option<String> {
        self.config
            .platform
            .clone()
            .or_else(|| self.default_platform.clone())
    }

    /// Make sure the image exists locally, building or pulling it per the
    /// build action
    pub async fn ensure_image_exists(&self, do_build: BuildAction) -> Result<()> {
        if self.can_be_built() && do_build == BuildAction::Force {
            self.build(false, false).await?;
            return Ok(());
        }

        if self.image().await.is_ok() {
            return Ok(());
        }

        if !self.can_be_built() {
            self.pull(false).await?;
            return Ok(());
        }

        if do_build == BuildAction::Skip {
            return Err(ComposeError::NeedsBuild {
                service: self.name.clone(),
            });
        }

        self.build(false, false).await?;
        warn!(
            service = %self.name,
            "image was built because it did not already exist; to rebuild it, run the build verb"
        );
        Ok(())
    }

    /// The stable fingerprint of everything that determines a container's
    /// identity at recreate time
    pub async fn config_hash(&self) -> Result<String> {
        Ok(json_hash(&self.config_dict().await?))
    }

    async fn config_dict(&self) -> Result<serde_json::Value> {
        let image_id = match self.image().await {
            Ok(image) => Some(image.id),
            Err(ComposeError::NoSuchImage { .. }) => None,
            Err(err) => return Err(err),
        };

        let mut options = serde_json::to_value(&self.config)?;
        if let Some(map) = options.as_object_mut() {
            // These feed the hash through dedicated keys below.
            for key in [
                "name",
                "links",
                "networks",
                "network_mode",
                "pid",
                "ipc",
                "secrets",
                "volumes_from",
                "extends",
            ] {
                map.remove(key);
            }
        }

        let links: Vec<(String, String)> = self
            .config
            .links
            .iter()
            .map(|link| (link.target.clone(), link.alias().to_string()))
            .collect();
        let volumes_from: Vec<(String, String)> = self
            .config
            .volumes_from
            .iter()
            .filter_map(|vf| {
                vf.service_name()
                    .map(|service| (service.to_string(), vf.mode.clone()))
            })
            .collect();

        Ok(json!({
            "options": options,
            "image_id": image_id,
            "links": links,
            "net": self.network_mode.hash_id(),
            "networks": serde_json::to_value(&self.networks)?,
            "secrets": self.config.secrets,
            "volumes_from": volumes_from,
        }))
    }

    /// Derive the convergence plan for this service
    pub async fn convergence_plan(
        &self,
        strategy: ConvergenceStrategy,
        one_off: bool,
    ) -> Result<ConvergencePlan> {
        if one_off {
            return Ok(ConvergencePlan {
                action: ConvergenceAction::OneOff,
                containers: Vec::new(),
            });
        }

        let containers = self.containers(true, false, &[]).await?;
        if containers.is_empty() {
            return Ok(ConvergencePlan {
                action: ConvergenceAction::Create,
                containers,
            });
        }

        if strategy == ConvergenceStrategy::Never {
            return Ok(ConvergencePlan {
                action: ConvergenceAction::Start,
                containers,
            });
        }

        if strategy == ConvergenceStrategy::Always
            || self.containers_have_diverged(&containers).await?
        {
            return Ok(ConvergencePlan {
                action: ConvergenceAction::Recreate,
                containers,
            });
        }

        if containers.iter().any(|container| !container.is_running()) {
            return Ok(ConvergencePlan {
                action: ConvergenceAction::Start,
                containers,
            });
        }

        Ok(ConvergencePlan {
            action: ConvergenceAction::Noop,
            containers,
        })
    }

    /// Whether any container no longer reflects the declared service
    pub async fn containers_have_diverged(&self, containers: &[Container]) -> Result<bool> {
        let config_hash = match self.config_hash().await {
            Ok(hash) => hash,
            Err(ComposeError::NoSuchImage { image }) => {
                debug!(service = %self.name, %image, "service has diverged: image missing");
                return Ok(true);
            }
            Err(err) => return Err(err),
        };

        let mut diverged = false;
        for container in containers {
            if container.has_legacy_project_name(&self.project) {
                debug!(container = %container.name(), "has diverged: legacy project name");
                diverged = true;
                continue;
            }
            if container.config_hash() != Some(config_hash.as_str()) {
                debug!(
                    container = %container.name(),
                    expected = %config_hash,
                    actual = ?container.config_hash(),
                    "has diverged"
                );
                diverged = true;
            }
        }
        Ok(diverged)
    }

    /// Execute a convergence plan, returning the resulting containers
    pub async fn execute_convergence_plan(
        &self,
        plan: ConvergencePlan,
        converge: &ConvergeOptions,
    ) -> Result<Vec<Container>> {
        let scale = converge
            .scale_override
            .unwrap_or_else(|| self.scale_num());
        let mut containers = plan.containers;
        containers.sort_by_key(Container::number);

        self.show_scale_warnings(scale);

        match plan.action {
            ConvergenceAction::Create | ConvergenceAction::OneOff => {
                self.execute_create(
                    scale,
                    converge,
                    plan.action == ConvergenceAction::OneOff,
                )
                .await
            }
            ConvergenceAction::Recreate => {
                let scale = converge.rescale.then_some(scale);
                self.execute_recreate(containers, scale, converge).await
            }
            ConvergenceAction::Start => {
                let scale = converge.rescale.then_some(scale);
                self.execute_start(containers, scale, converge).await
            }
            ConvergenceAction::Noop => {
                if scale != containers.len() as u64 && converge.rescale {
                    return self
                        .execute_start(containers, Some(scale), converge)
                        .await;
                }
                for container in &containers {
                    info!("{} is up-to-date", container.name());
                }
                Ok(containers)
            }
        }
    }

    async fn execute_create(
        &self,
        scale: u64,
        converge: &ConvergeOptions,
        one_off: bool,
    ) -> Result<Vec<Container>> {
        if one_off {
            let container = self
                .create_container(true, None, None, converge)
                .await?;
            return Ok(vec![container]);
        }

        let first = self.next_container_number().await?;
        let numbers: Vec<u32> = (0..scale).map(|offset| first + offset as u32).collect();
        let service = self.clone();
        let start = converge.start;
        let converge = converge.clone();
        let results = parallel_execute(
            numbers,
            move |number| {
                let service = service.clone();
                let converge = converge.clone();
                async move {
                    let container = service
                        .create_container(false, None, Some(number), &converge)
                        .await?;
                    if start {
                        service.start_container(&container).await?;
                    }
                    Ok(container)
                }
            },
            |number| number.to_string(),
            |_| Vec::new(),
            ExecuteOptions::default(),
        )
        .await;

        if let Some((_, err)) = results.errors.into_iter().next() {
            return Err(ComposeError::operation_failed(err.to_string()));
        }
        let mut containers: Vec<Container> = results.results.into_values().collect();
        containers.sort_by_key(Container::number);
        Ok(containers)
    }

    async fn execute_recreate(
        &self,
        containers: Vec<Container>,
        scale: Option<u64>,
        converge: &ConvergeOptions,
    ) -> Result<Vec<Container>> {
        let mut containers = containers;
        if let Some(scale) = scale {
            if containers.len() as u64 > scale {
                let excess = containers.split_off(scale as usize);
                self.downscale(excess, converge.timeout).await?;
            }
        }

        let service = self.clone();
        let converge_opts = converge.clone();
        let results = parallel_execute(
            containers,
            move |container| {
                let service = service.clone();
                let converge = converge_opts.clone();
                async move { service.recreate_container(container, &converge).await }
            },
            |container| container.name().to_string(),
            |_| Vec::new(),
            ExecuteOptions::default(),
        )
        .await;
        if let Some((_, err)) = results.errors.into_iter().next() {
            return Err(ComposeError::operation_failed(err.to_string()));
        }
        let mut recreated: Vec<Container> = results.results.into_values().collect();
        recreated.sort_by_key(Container::number);

        if let Some(scale) = scale {
            if (recreated.len() as u64) < scale {
                let extra = self
                    .execute_create(scale - recreated.len() as u64, converge, false)
                    .await?;
                recreated.extend(extra);
            }
        }
        Ok(recreated)
    }

    async fn execute_start(
        &self,
        containers: Vec<Container>,
        scale: Option<u64>,
        converge: &ConvergeOptions,
    ) -> Result<Vec<Container>> {
        let mut containers = containers;
        if let Some(scale) = scale {
            if containers.len() as u64 > scale {
                let excess = containers.split_off(scale as usize);
                self.downscale(excess, converge.timeout).await?;
            }
        }

        if converge.start {
            let stopped: Vec<Container> = containers
                .iter()
                .filter(|container| !container.is_running())
                .cloned()
                .collect();
            let service = self.clone();
            let results = parallel_execute(
                stopped,
                move |container| {
                    let service = service.clone();
                    async move {
                        service.start_container_if_stopped(&container).await?;
                        Ok(())
                    }
                },
                |container| container.name().to_string(),
                |_| Vec::new(),
                ExecuteOptions::default(),
            )
            .await;
            if let Some((_, err)) = results.errors.into_iter().next() {
                return Err(ComposeError::operation_failed(err.to_string()));
            }
        }

        if let Some(scale) = scale {
            if (containers.len() as u64) < scale {
                let extra = self
                    .execute_create(scale - containers.len() as u64, converge, false)
                    .await?;
                containers.extend(extra);
            }
        }
        Ok(containers)
    }

    async fn downscale(&self, containers: Vec<Container>, timeout: Option<Duration>) -> Result<()> {
        let service = self.clone();
        let results = parallel_execute(
            containers,
            move |container| {
                let service = service.clone();
                async move {
                    container.stop(Some(service.stop_timeout(timeout))).await?;
                    container.remove(false, false).await
                }
            },
            |container| container.name().to_string(),
            |_| Vec::new(),
            ExecuteOptions::default(),
        )
        .await;
        if let Some((_, err)) = results.errors.into_iter().next() {
            return Err(ComposeError::operation_failed(err.to_string()));
        }
        Ok(())
    }

    /// Adjust the number of running containers to `desired` and make sure
    /// they are running
    pub async fn scale(&self, desired: u64, timeout: Option<Duration>) -> Result<()> {
        self.show_scale_warnings(desired);

        let running = self.containers(false, false, &[]).await?;
        let num_running = running.len() as u64;

        if desired == num_running {
            info!(service = %self.name, "desired container number already achieved");
            return Ok(());
        }

        let converge = ConvergeOptions {
            timeout,
            start: true,
            rescale: true,
            ..Default::default()
        };

        if desired > num_running {
            let mut all = self.containers(true, false, &[]).await?;
            // Stopped containers that have diverged would resurrect stale
            // config; drop them before scaling up.
            let mut kept = Vec::new();
            for container in all.drain(..) {
                if !container.is_running()
                    && self
                        .containers_have_diverged(std::slice::from_ref(&container))
                        .await?
                {
                    container.remove(false, false).await?;
                } else {
                    kept.push(container);
                }
            }
            kept.sort_by_key(Container::number);
            self.execute_start(kept, Some(desired), &converge).await?;
            return Ok(());
        }

        let mut sorted = running;
        sorted.sort_by_key(Container::number);
        let excess = sorted.split_off(desired as usize);
        self.downscale(excess, timeout).await
    }

    fn show_scale_warnings(&self, desired: u64) {
        if desired <= 1 {
            return;
        }
        if let Some(container_name) = &self.config.container_name {
            warn!(
                service = %self.name,
                container_name = %container_name,
                "the service is using a custom container name; the engine requires each \
                 container name to be unique, so it cannot be scaled"
            );
        }
        if self.config.specifies_host_port() {
            warn!(
                service = %self.name,
                "the service specifies a port on the host; if multiple containers are \
                 created on a single host, the port will clash"
            );
        }
    }

    /// The effective stop grace period
    pub fn stop_timeout(&self, timeout: Option<Duration>) -> Duration {
        if let Some(timeout) = timeout {
            return timeout;
        }
        if let Some(period) = &self.config.stop_grace_period {
            if let Ok(parsed) = parse_compose_duration(period) {
                return parsed;
            }
        }
        DEFAULT_STOP_TIMEOUT
    }

    /// Create one container for this service
    pub async fn create_container(
        &self,
        one_off: bool,
        previous_container: Option<&Container>,
        number: Option<u32>,
        converge: &ConvergeOptions,
    ) -> Result<Container> {
        self.ensure_image_exists(BuildAction::None).await?;

        let number = match number {
            Some(number) => number,
            None if one_off => 1,
            None => self.next_container_number().await?,
        };
        let slug = one_off.then(generate_slug);
        let container_name = self.container_name(number, slug.as_deref())?;

        let config_hash = if one_off {
            None
        } else {
            Some(self.config_hash().await?)
        };
        let links = self.resolve_links(one_off).await?;
        let volumes_from = self.resolve_volumes_from().await?;
        let network_mode = self.resolve_mode(&self.network_mode).await?;
        let pid_mode = self.resolve_mode(&self.pid_mode).await?;
        let ipc_mode = self.resolve_mode(&self.ipc_mode).await?;
        let networking = self.networking_context(None);

        let create_options = build_create_options(&CreateContext {
            project: &self.project,
            service: &self.config,
            api_version: &self.client.api_version(),
            number,
            one_off,
            slug: slug.as_deref(),
            container_name: container_name.clone(),
            config_hash: config_hash.as_deref(),
            links,
            volumes_from,
            network_mode,
            pid_mode,
            ipc_mode,
            networking,
            previous: previous_container,
            renew_anonymous_volumes: converge.renew_anonymous_volumes,
            secret_host_files: self.secret_host_files.clone(),
            extra_labels: &self.extra_labels,
            proxy_environment: &self.proxy_environment,
            overrides: converge.one_off_overrides.as_ref(),
        })?;

        info!("Creating {container_name}");
        let id = self
            .client
            .create_container(create_options)
            .await
            .map_err(|err| {
                ComposeError::operation_failed(format!(
                    "Cannot create container for service {}: {}",
                    self.name,
                    err.explanation()
                ))
            })?;
        Container::from_id(Arc::clone(&self.client), &id)
            .await
            .map_err(|err| ComposeError::operation_failed(err.explanation()))
    }

    /// Recreate one container: stop it, rename it out of the way, create
    /// the replacement reusing its anonymous volumes, start the
    /// replacement, remove the original
    pub async fn recreate_container(
        &self,
        mut container: Container,
        converge: &ConvergeOptions,
    ) -> Result<Container> {
        info!("Recreating {}", container.name());
        container.ensure_inspected().await.map_err(|err| {
            ComposeError::operation_failed(err.explanation())
        })?;
        container.stop(Some(self.stop_timeout(converge.timeout))).await?;
        container.rename_to_tmp_name().await?;

        let previous = (!converge.renew_anonymous_volumes).then_some(&container);
        let new_container = self
            .create_container(false, previous, container.number(), converge)
            .await?;
        if converge.start {
            self.start_container(&new_container).await?;
        }
        container.remove(false, false).await?;
        Ok(new_container)
    }

    /// Start a container if it is not already running
    pub async fn start_container_if_stopped(&self, container: &Container) -> Result<()> {
        if container.is_running() {
            return Ok(());
        }
        info!("Starting {}", container.name());
        self.start_container(container).await
    }

    /// Connect a container to its networks and start it
    pub async fn start_container(&self, container: &Container) -> Result<()> {
        self.connect_container_to_networks(container).await?;
        match container.start().await {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.to_string().contains("driver failed programming external connectivity") {
                    warn!("host port is already in use by another container");
                }
                Err(ComposeError::operation_failed(format!(
                    "Cannot start service {}: {err}",
                    self.name
                )))
            }
        }
    }

    async fn connect_container_to_networks(&self, container: &Container) -> Result<()> {
        if !self.use_networking {
            return Ok(());
        }
        let connected = container.connected_networks();
        let links = self.resolve_links(false).await?;
        for (network, attachment) in &self.networks {
            if connected.contains(network) {
                if container.has_short_id_alias(network) {
                    continue;
                }
                self.client
                    .disconnect_container_from_network(network, container.id())
                    .await
                    .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
            }

            let mut aliases = self.aliases_for(attachment);
            aliases.push(container.short_id().to_string());
            self.client
                .connect_container_to_network(
                    network,
                    container.id(),
                    crate::client::EndpointConfig {
                        aliases,
                        ipv4_address: attachment.ipv4_address.clone(),
                        ipv6_address: attachment.ipv6_address.clone(),
                        link_local_ips: attachment.link_local_ips.clone(),
                        links: links
                            .iter()
                            .map(|(container, alias)| format!("{container}:{alias}"))
                            .collect(),
                    },
                )
                .await
                .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
        }
        Ok(())
    }

    fn aliases_for(&self, attachment: &NetworkAttachment) -> Vec<String> {
        let mut aliases = vec![self.name.clone()];
        for alias in &attachment.aliases {
            if !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }
        aliases
    }

    fn networking_context(&self, container: Option<&Container>) -> Option<options::NetworkingContext> {
        if !self.use_networking {
            return None;
        }
        let (network, attachment) = self.networks.first()?;
        let mut aliases = self.aliases_for(attachment);
        if let Some(container) = container {
            aliases.push(container.short_id().to_string());
        }
        Some(options::NetworkingContext {
            network: network.clone(),
            attachment: attachment.clone(),
            aliases,
        })
    }

    /// The name the next container of this service gets
    fn container_name(&self, number: u32, slug: Option<&str>) -> Result<String> {
        if let Some(custom) = &self.config.container_name {
            if slug.is_none() {
                return Ok(custom.clone());
            }
        }
        let name = crate::labels::build_container_name(&self.project, &self.name, number, slug);
        for external_link in &self.config.external_links {
            let origin = external_link.split(':').next().unwrap_or(external_link);
            if origin == name {
                return Err(ComposeError::dependency(format!(
                    "Service {} has a self-referential external link: {name}",
                    self.name
                )));
            }
        }
        Ok(name)
    }

    /// A handle onto a sibling service of the same project, good for
    /// label-filtered container lookups only
    fn peer(&self, name: &str) -> Service {
        Service {
            name: name.to_string(),
            config: ServiceConfig {
                name: name.to_string(),
                ..Default::default()
            },
            ..self.clone()
        }
    }

    /// Resolve declared links into `(container_name, alias)` pairs
    async fn resolve_links(&self, link_to_self: bool) -> Result<Vec<(String, String)>> {
        let mut links: IndexMap<String, String> = IndexMap::new();
        for link in &self.config.links {
            let target = self.peer(&link.target);
            for container in target.containers(false, false, &[]).await? {
                links.insert(link.alias().to_string(), container.name().to_string());
                links.insert(container.name().to_string(), container.name().to_string());
                links.insert(
                    container.name_without_project(),
                    container.name().to_string(),
                );
            }
        }
        if link_to_self {
            for container in self.containers(false, false, &[]).await? {
                links.insert(self.name.clone(), container.name().to_string());
                links.insert(container.name().to_string(), container.name().to_string());
                links.insert(
                    container.name_without_project(),
                    container.name().to_string(),
                );
            }
        }
        for external_link in &self.config.external_links {
            let (name, alias) = match external_link.split_once(':') {
                Some((name, alias)) => (name.to_string(), alias.to_string()),
                None => (external_link.clone(), external_link.clone()),
            };
            links.insert(alias, name);
        }
        Ok(links
            .into_iter()
            .map(|(alias, container)| (container, alias))
            .collect())
    }

    /// Resolve `volumes_from` entries into container references
    async fn resolve_volumes_from(&self) -> Result<Vec<String>> {
        let mut resolved = Vec::new();
        for volumes_from in &self.config.volumes_from {
            match &volumes_from.source {
                VolumesFromSource::Service(name) => {
                    let source = self.peer(name);
                    let mut containers = source.containers(true, false, &[]).await?;
                    containers.sort_by_key(Container::number);
                    if let Some(container) = containers.first() {
                        resolved.push(format!("{}:{}", container.id(), volumes_from.mode));
                    }
                }
                VolumesFromSource::Container(name) => {
                    resolved.push(format!("{name}:{}", volumes_from.mode));
                }
            }
        }
        Ok(resolved)
    }

    /// Resolve a namespace mode into the engine's string form.
    ///
    /// A `service:` mode resolves to the first running container of the
    /// referenced service; with none running, the mode is left to the
    /// engine default and a warning is logged.
    async fn resolve_mode(&self, mode: &Mode) -> Result<Option<String>> {
        match mode {
            Mode::Default => Ok(None),
            Mode::None => Ok(Some("none".into())),
            Mode::Named(name) => Ok(Some(name.clone())),
            Mode::Container(id) => Ok(Some(format!("container:{id}"))),
            Mode::Service(name) => {
                let target = self.peer(name);
                let containers = target.containers(false, false, &[]).await?;
                match containers.first() {
                    Some(container) => Ok(Some(format!("container:{}", container.id()))),
                    None => {
                        warn!(
                            service = %self.name,
                            dependency = %name,
                            "cannot share a namespace with a service that has no running \
                             containers"
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Whether every container reports a healthy healthcheck.
    ///
    /// `Ok(false)` means at least one check is still pending; an unhealthy
    /// container raises [`ComposeError::HealthCheckFailed`].
    pub async fn is_healthy(&self) -> Result<bool> {
        let mut healthy = true;
        for mut container in self.containers(false, false, &[]).await? {
            container
                .refresh()
                .await
                .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
            match container.health_status() {
                None => {
                    return Err(ComposeError::NoHealthCheckConfigured {
                        service: self.name.clone(),
                    })
                }
                Some("healthy") => {}
                Some("unhealthy") => {
                    return Err(ComposeError::HealthCheckFailed {
                        container: container.name().to_string(),
                    })
                }
                Some(_) => healthy = false,
            }
        }
        Ok(healthy)
    }

    /// Younger containers holding an already-seen replica number
    pub async fn duplicate_containers(&self) -> Result<Vec<Container>> {
        let mut containers = self.containers(true, false, &[]).await?;
        containers.sort_by(|a, b| a.details().created.cmp(&b.details().created));
        let mut numbers = std::collections::HashSet::new();
        let mut duplicates = Vec::new();
        for container in containers {
            match container.number() {
                Some(number) if !numbers.insert(number) => duplicates.push(container),
                _ => {}
            }
        }
        Ok(duplicates)
    }

    /// Remove duplicate-numbered containers left behind by interrupted
    /// recreates
    pub async fn remove_duplicate_containers(&self, timeout: Option<Duration>) -> Result<()> {
        for container in self.duplicate_containers().await? {
            info!("Removing {}", container.name());
            container.stop(Some(self.stop_timeout(timeout))).await?;
            container.remove(false, false).await?;
        }
        Ok(())
    }

    /// Pull the service image, consuming the progress stream
    pub async fn pull(&self, ignore_pull_failures: bool) -> Result<Option<String>> {
        let Some(image) = &self.config.image else {
            return Ok(None);
        };
        let (repo, tag) = parse_repository_tag(image);
        let tag = tag.unwrap_or_else(|| "latest".into());
        info!(service = %self.name, "Pulling {repo}:{tag}");

        let stream = self
            .client
            .pull_image(&repo, &tag, self.platform().as_deref())
            .await
            .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
        match consume_progress(stream).await {
            Ok(digest) => Ok(digest),
            Err(err) if ignore_pull_failures => {
                warn!(service = %self.name, error = %err, "ignoring pull failure");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Push the service image; a no-op unless both `image` and `build`
    /// are declared
    pub async fn push(&self, ignore_push_failures: bool) -> Result<Option<String>> {
        if self.config.image.is_none() || self.config.build.is_none() {
            return Ok(None);
        }
        let (repo, tag) = parse_repository_tag(self.config.image.as_ref().unwrap());
        let tag = tag.unwrap_or_else(|| "latest".into());
        info!(service = %self.name, "Pushing {repo}:{tag}");

        let stream = self
            .client
            .push_image(&repo, &tag)
            .await
            .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
        match consume_progress(stream).await {
            Ok(digest) => Ok(digest),
            Err(err) if ignore_push_failures => {
                warn!(service = %self.name, error = %err, "ignoring push failure");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Build the service image, returning the image id
    pub async fn build(&self, no_cache: bool, pull: bool) -> Result<String> {
        let Some(build) = &self.config.build else {
            return Err(ComposeError::configuration(format!(
                "Service {} has no build context", self.name
            )));
        };
        let spec = build.to_spec();
        info!("Building {}", self.name);

        let mut buildargs: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in &spec.args {
            buildargs.insert(key.clone(), value.clone().unwrap_or_default());
        }
        for (key, value) in &self.proxy_environment {
            buildargs.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let stream = self
            .client
            .build_image(crate::client::BuildOptions {
                context: spec.context.clone(),
                dockerfile: spec.dockerfile.clone(),
                tag: self.image_name(),
                rm: true,
                forcerm: false,
                pull,
                nocache: no_cache,
                cache_from: spec.cache_from.clone(),
                buildargs,
                labels: spec
                    .labels
                    .0
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
                network_mode: spec.network.clone(),
                target: spec.target.clone(),
                shm_size: spec.shm_size.map(|bytes| bytes.0),
                extra_hosts: spec.extra_hosts.clone(),
                isolation: spec
                    .isolation
                    .clone()
                    .or_else(|| self.config.isolation.clone()),
                platform: self.platform(),
                memory: None,
            })
            .await
            .map_err(|err| ComposeError::operation_failed(err.explanation()))?;

        let mut image_id: Option<String> = None;
        let mut stream = stream;
        while let Some(event) = stream.next().await {
            let event = event.map_err(|err| ComposeError::stream_output(err.explanation()))?;
            if let Some(error) = event.error {
                return Err(ComposeError::stream_output(error));
            }
            if let Some(aux) = &event.aux {
                if let Some(id) = aux.get("ID").and_then(serde_json::Value::as_str) {
                    image_id = Some(id.to_string());
                }
            }
            if let Some(line) = &event.stream {
                if let Some(rest) = line.strip_prefix("Successfully built ") {
                    image_id = Some(rest.trim().to_string());
                }
            }
        }
        image_id.ok_or_else(|| {
            ComposeError::stream_output(format!("Building {} did not produce an image", self.name))
        })
    }

    /// Remove the service image per the removal mode
    pub async fn remove_image(&self, mode: ImageRemovalMode) -> Result<bool> {
        match mode {
            ImageRemovalMode::None => return Ok(false),
            ImageRemovalMode::Local if self.config.image.is_some() => return Ok(false),
            _ => {}
        }
        info!("Removing image {}", self.image_name());
        match self.client.remove_image(&self.image_name()).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => {
                warn!(image = %self.image_name(), "image not found");
                Ok(false)
            }
            Err(err) => {
                tracing::error!(
                    service = %self.name,
                    error = %err,
                    "failed to remove image"
                );
                Ok(false)
            }
        }
    }
}

/// Split an image reference into repository and optional tag, leaving
/// digests attached to the repository
pub fn parse_repository_tag(image: &str) -> (String, Option<String>) {
    if let Some((repo, digest)) = image.rsplit_once('@') {
        return (format!("{repo}@{digest}"), None);
    }
    match image.rsplit_once(':') {
        // A colon inside the registry host is not a tag separator.
        Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), Some(tag.to_string())),
        _ => (image.to_string(), None),
    }
}

async fn consume_progress(mut stream: ProgressStream) -> Result<Option<String>> {
    let mut digest = None;
    while let Some(event) = stream.next().await {
        let event = event.map_err(|err| ComposeError::stream_output(err.explanation()))?;
        if let Some(error) = event.error {
            return Err(ComposeError::stream_output(error));
        }
        if let Some(aux) = &event.aux {
            if let Some(value) = aux.get("Digest").and_then(serde_json::Value::as_str) {
                digest = Some(value.to_string());
            }
        }
        if let Some(status) = &event.status {
            if let Some(rest) = status.strip_prefix("Digest: ") {
                digest = Some(rest.trim().to_string());
            }
        }
    }
    Ok(digest)
}
