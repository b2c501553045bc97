//! The project orchestrator.
//!
//! A [`Project`] binds the merged configuration to an engine client and
//! implements the verbs: `up` ensures networks and volumes, derives one
//! convergence plan per service and executes the plans in dependency
//! order through the parallel executor; `down` tears everything back
//! down in reverse order; the remaining verbs fan out over services or
//! containers. Profiles gate which services participate; containers whose
//! service no longer exists are surfaced as orphans.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::client::{EngineClient, Filters};
use crate::config::{
    ComposeVersion, Config, DependsOnCondition, Mode, NetworkAttachment, ServiceConfig,
};
use crate::container::Container;
use crate::errors::{ComposeError, Result};
use crate::events::{project_events, ProjectEventStream};
use crate::exec::{parallel_execute, CancelToken, ExecuteOptions};
use crate::graph::DependencyGraph;
use crate::labels::{project_labels, OneOffFilter};
use crate::network::{service_network_names, ProjectNetworks};
use crate::service::{
    BuildAction, ConvergeOptions, ConvergencePlan, ConvergenceStrategy, ImageRemovalMode,
    OneOffOverrides, Service, ServiceParams,
};
use crate::volume::ProjectVolumes;

/// Parallelism cap for image pulls and builds
const BUILD_PULL_LIMIT: usize = 5;

/// Caller-supplied context for constructing a [`Project`]
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    /// Labels injected onto every created container
    pub extra_labels: Vec<(String, String)>,
    /// Default platform for pulls and builds
    pub default_platform: Option<String>,
    /// Lowest-priority environment entries (proxy settings)
    pub proxy_environment: IndexMap<String, String>,
    /// Active profile names
    pub enabled_profiles: Vec<String>,
}

/// Options for the `up` verb
#[derive(Clone, Default)]
pub struct UpOptions {
    /// Target services; everything enabled when empty
    pub service_names: Vec<String>,
    /// Converge dependencies too (default true via [`UpOptions::new`])
    pub start_deps: bool,
    /// Recreate strategy
    pub strategy: ConvergenceStrategy,
    /// Build behavior for missing images
    pub do_build: BuildAction,
    /// Stop grace period override
    pub timeout: Option<Duration>,
    /// Remove orphan containers instead of warning
    pub remove_orphans: bool,
    /// Skip orphan detection entirely
    pub ignore_orphans: bool,
    /// Per-service scale overrides
    pub scale_override: HashMap<String, u64>,
    /// Adjust replica counts (off for `run` dependencies)
    pub rescale: bool,
    /// Start containers after creating them
    pub start: bool,
    /// Recreate dependents whose upstreams changed, even if their own
    /// config did not
    pub always_recreate_deps: bool,
    /// Discard anonymous volumes instead of preserving them
    pub renew_anonymous_volumes: bool,
    /// Cooperative cancellation
    pub cancel: Option<CancelToken>,
}

impl UpOptions {
    /// The defaults of a plain `up`
    pub fn new() -> Self {
        Self {
            start_deps: true,
            rescale: true,
            start: true,
            ..Default::default()
        }
    }
}

/// Options for the `down` verb
#[derive(Debug, Clone, Default)]
pub struct DownOptions {
    /// Which images to remove
    pub remove_image_type: ImageRemovalMode,
    /// Remove declared (non-external) volumes
    pub include_volumes: bool,
    /// Remove orphan containers
    pub remove_orphans: bool,
    /// Skip orphan detection
    pub ignore_orphans: bool,
    /// Stop grace period override
    pub timeout: Option<Duration>,
}

/// One orchestration unit: services, networks and volumes under a name
pub struct Project {
    /// The project name, namespace for every engine object
    pub name: String,
    client: Arc<dyn EngineClient>,
    /// Bound services, declaration order
    pub services: Vec<Service>,
    networks: ProjectNetworks,
    volumes: ProjectVolumes,
    config: Config,
    enabled_profiles: Vec<String>,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("services", &self.service_names())
            .finish()
    }
}

impl Project {
    /// Bind a merged configuration to a client
    pub fn from_config(
        name: &str,
        config: Config,
        client: Arc<dyn EngineClient>,
        options: ProjectOptions,
    ) -> Result<Self> {
        let use_networking = !config.version.is_v1();
        let networks =
            ProjectNetworks::from_config(Arc::clone(&client), name, &config, use_networking);
        let volumes = ProjectVolumes::from_config(Arc::clone(&client), name, &config);

        let mut services = Vec::new();
        for service_config in &config.services {
            let mut service_config = service_config.clone();

            // Named volume sources become engine-side names.
            if !config.version.is_v1() {
                service_config.volumes = service_config
                    .volumes
                    .iter()
                    .map(|spec| volumes.namespace_spec(spec))
                    .collect::<Result<_>>()?;
            }

            let attachments = resolve_attachments(&service_config, &networks)?;
            let network_mode = resolve_network_mode(&service_config, &attachments, use_networking);
            let pid_mode = service_config
                .pid
                .as_deref()
                .map(Mode::parse)
                .unwrap_or_default();
            let ipc_mode = service_config
                .ipc
                .as_deref()
                .map(Mode::parse)
                .unwrap_or_default();
            let secret_host_files = resolve_secrets(&service_config, &config)?;

            services.push(Service::new(
                Arc::clone(&client),
                ServiceParams {
                    project: name.to_string(),
                    config: service_config,
                    network_mode,
                    pid_mode,
                    ipc_mode,
                    networks: attachments,
                    use_networking,
                    secret_host_files,
                    extra_labels: options.extra_labels.clone(),
                    proxy_environment: options.proxy_environment.clone(),
                    default_platform: options.default_platform.clone(),
                },
            ));
        }

        Ok(Self {
            name: name.to_string(),
            client,
            services,
            networks,
            volumes,
            config,
            enabled_profiles: options.enabled_profiles,
        })
    }

    /// The declared config version
    pub fn config_version(&self) -> &ComposeVersion {
        &self.config.version
    }

    /// Render the normalized configuration (the `config` verb)
    pub fn render_config(&self) -> Result<serde_json::Value> {
        self.config.render()
    }

    /// Names of all declared services, declaration order
    pub fn service_names(&self) -> Vec<String> {
        self.services
            .iter()
            .map(|service| service.name.clone())
            .collect()
    }

    /// Look up one service by name
    pub fn get_service(&self, name: &str) -> Result<&Service> {
        self.services
            .iter()
            .find(|service| service.name == name)
            .ok_or_else(|| ComposeError::no_such_service(name))
    }

    fn validate_service_names(&self, names: &[String]) -> Result<()> {
        for name in names {
            self.get_service(name)?;
        }
        Ok(())
    }

    /// Resolve the target service set for a verb.
    ///
    /// Empty `names` selects every service enabled by the active profiles.
    /// Naming services explicitly auto-enables their profiles; their
    /// transitive dependencies must already be enabled, or the verb fails.
    /// With `include_deps`, dependencies join the set in dependency order.
    pub fn get_services(&self, names: &[String], include_deps: bool) -> Result<Vec<&Service>> {
        let mut enabled = self.enabled_profiles.clone();

        let selected: Vec<&Service> = if names.is_empty() {
            self.services
                .iter()
                .filter(|service| service.config.enabled_for_profiles(&enabled))
                .collect()
        } else {
            self.validate_service_names(names)?;
            let selected: Vec<&Service> = self
                .services
                .iter()
                .filter(|service| names.contains(&service.name))
                .collect();
            // Explicitly targeted services enable their own profiles.
            for service in &selected {
                for profile in &service.config.profiles {
                    if !enabled.contains(profile) {
                        enabled.push(profile.clone());
                    }
                }
            }
            selected
        };

        if !include_deps {
            return Ok(selected);
        }

        let mut included: IndexMap<String, &Service> = IndexMap::new();
        for service in &selected {
            self.inject_deps(service, &enabled, &mut included)?;
        }

        // Order the expanded set by dependency, ties by declaration.
        let configs: Vec<ServiceConfig> = self
            .services
            .iter()
            .map(|service| service.config.clone())
            .collect();
        let graph = DependencyGraph::from_services(&configs)?;
        let order = graph.sorted()?;
        Ok(order
            .into_iter()
            .filter_map(|index| included.get(&self.services[index].name))
            .copied()
            .collect())
    }

    fn inject_deps<'a>(
        &'a self,
        service: &'a Service,
        enabled: &[String],
        included: &mut IndexMap<String, &'a Service>,
    ) -> Result<()> {
        if included.contains_key(&service.name) {
            return Ok(());
        }
        included.insert(service.name.clone(), service);
        for dep_name in service.dependency_names() {
            let dep = self.get_service(&dep_name)?;
            if !dep.config.enabled_for_profiles(enabled) {
                return Err(ComposeError::configuration(format!(
                    "Service \"{dep_name}\" was pulled in as a dependency of service \
                     \"{}\" but is not enabled by the active profiles. You may fix this \
                     by adding a common profile to \"{dep_name}\" and \"{}\".",
                    service.name, service.name
                )));
            }
            self.inject_deps(dep, enabled, included)?;
        }
        Ok(())
    }

    fn project_filters(&self, one_off: OneOffFilter, legacy: bool) -> Filters {
        Filters::new().labels(project_labels(&self.name, one_off, legacy))
    }

    /// All containers of this project, label-filtered, with one legacy
    /// read fallback
    async fn labeled_containers(
        &self,
        stopped: bool,
        one_off: OneOffFilter,
    ) -> Result<Vec<Container>> {
        let summaries = self
            .client
            .containers(stopped, &self.project_filters(one_off, false))
            .await
            .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
        if !summaries.is_empty() {
            return Ok(summaries
                .iter()
                .map(|summary| Container::from_summary(Arc::clone(&self.client), summary))
                .collect());
        }

        let summaries = self
            .client
            .containers(stopped, &self.project_filters(one_off, true))
            .await
            .map_err(|err| ComposeError::operation_failed(err.explanation()))?;
        Ok(summaries
            .iter()
            .map(|summary| Container::from_summary(Arc::clone(&self.client), summary))
            .filter(|container| container.has_legacy_project_name(&self.name))
            .collect())
    }

    /// The project's containers, optionally filtered by service (the `ps`
    /// verb)
    pub async fn containers(
        &self,
        service_names: &[String],
        stopped: bool,
        one_off: OneOffFilter,
    ) -> Result<Vec<Container>> {
        let service_names = if service_names.is_empty() {
            self.service_names()
        } else {
            self.validate_service_names(service_names)?;
            service_names.to_vec()
        };

        let containers = self.labeled_containers(stopped, one_off).await?;
        Ok(containers
            .into_iter()
            .filter(|container| {
                container
                    .service()
                    .is_some_and(|service| service_names.contains(&service.to_string()))
            })
            .collect())
    }

    /// Ensure networks and volumes before any service work
    pub async fn initialize(&self) -> Result<()> {
        self.networks.initialize().await?;
        self.volumes.initialize().await?;
        Ok(())
    }

    /// Detect containers labeled for this project whose service is gone;
    /// warn, or kill and remove them
    pub async fn find_orphan_containers(&self, remove_orphans: bool) -> Result<()> {
        let service_names = self.service_names();
        let mut orphans = Vec::new();
        for container in self.labeled_containers(true, OneOffFilter::Exclude).await? {
            let orphaned = container
                .service()
                .is_none_or(|service| !service_names.contains(&service.to_string()));
            if orphaned {
                orphans.push(container);
            }
        }
        if orphans.is_empty() {
            return Ok(());
        }

        if remove_orphans {
            for container in &orphans {
                info!("Removing orphan container \"{}\"", container.name());
                let _ = container.kill(None).await;
                container.remove(true, false).await?;
            }
        } else {
            let names: Vec<&str> = orphans.iter().map(Container::name).collect();
            warn!(
                orphans = ?names,
                "found orphan containers for this project; if you removed or renamed this \
                 service in your compose file, you can run with the remove-orphans option \
                 to clean them up"
            );
        }
        Ok(())
    }

    /// Derive one convergence plan per service, forcing recreate onto
    /// dependents of changed services where needed
    async fn get_convergence_plans(
        &self,
        services: &[&Service],
        strategy: ConvergenceStrategy,
        always_recreate_deps: bool,
        one_off_names: &[String],
    ) -> Result<IndexMap<String, ConvergencePlan>> {
        let mut plans: IndexMap<String, ConvergencePlan> = IndexMap::new();

        for service in services {
            let updated_dependencies: Vec<String> = service
                .dependency_names()
                .into_iter()
                .filter(|name| {
                    plans.get(name).is_some_and(|plan| {
                        matches!(
                            plan.action,
                            crate::service::ConvergenceAction::Recreate
                                | crate::service::ConvergenceAction::Create
                        )
                    })
                })
                .collect();
            let is_one_off = one_off_names.contains(&service.name);

            let plan = if !updated_dependencies.is_empty() && strategy.allows_recreate() {
                debug!(
                    service = %service.name,
                    dependencies = ?updated_dependencies,
                    "service has upstream changes"
                );
                let containers = service.containers(true, false, &[]).await?;
                let has_stopped = containers.iter().any(|container| !container.is_running());
                let service_has_links = !service.config.links.is_empty();
                let containers_have_links = containers
                    .iter()
                    .any(|container| !container.links().is_empty());
                if always_recreate_deps
                    || has_stopped
                    || service_has_links != containers_have_links
                {
                    service
                        .convergence_plan(ConvergenceStrategy::Always, is_one_off)
                        .await?
                } else {
                    service.convergence_plan(strategy, is_one_off).await?
                }
            } else {
                service.convergence_plan(strategy, is_one_off).await?
            };

            plans.insert(service.name.clone(), plan);
        }
        Ok(plans)
    }

    /// Bring the project up: ensure resources, derive plans, execute them
    /// in dependency order
    pub async fn up(&self, options: UpOptions) -> Result<Vec<Container>> {
        self.initialize().await?;
        if !options.ignore_orphans {
            self.find_orphan_containers(options.remove_orphans).await?;
        }

        let services = self.get_services(&options.service_names, options.start_deps)?;
        for service in &services {
            service.remove_duplicate_containers(options.timeout).await?;
        }
        for service in &services {
            service.ensure_image_exists(options.do_build).await?;
        }

        let plans = self
            .get_convergence_plans(&services, options.strategy, options.always_recreate_deps, &[])
            .await?;

        let in_set: HashSet<String> =
            services.iter().map(|service| service.name.clone()).collect();
        let nodes: Vec<Service> = services.iter().map(|service| (*service).clone()).collect();
        let plans = Arc::new(plans);
        let project_name = self.name.clone();
        let this: Arc<ProjectHandle> = Arc::new(ProjectHandle {
            services: self.services.clone(),
        });

        let up_options = options.clone();
        let results = parallel_execute(
            nodes,
            move |service: Service| {
                let plans = Arc::clone(&plans);
                let options = up_options.clone();
                let handle = Arc::clone(&this);
                async move {
                    // Conditions gate this service on its dependencies'
                    // health or completion before its own convergence.
                    for (dep_name, condition) in &service.config.depends_on.0 {
                        if let Some(dep) = handle
                            .services
                            .iter()
                            .find(|candidate| candidate.name == *dep_name)
                        {
                            wait_for_condition(dep, *condition).await?;
                        }
                    }
                    let plan = plans
                        .get(&service.name)
                        .cloned()
                        .expect("a plan exists for every scheduled service");
                    let converge = ConvergeOptions {
                        timeout: options.timeout,
                        start: options.start,
                        scale_override: options.scale_override.get(&service.name).copied(),
                        rescale: options.rescale,
                        renew_anonymous_volumes: options.renew_anonymous_volumes,
                        one_off_overrides: None,
                    };
                    service.execute_convergence_plan(plan, &converge).await
                }
            },
            |service| service.name.clone(),
            move |service| {
                service
                    .dependency_names()
                    .into_iter()
                    .filter(|name| in_set.contains(name))
                    .collect()
            },
            ExecuteOptions {
                cancel: options.cancel.clone(),
                ..Default::default()
            },
        )
        .await;

        if !results.ok() {
            return Err(ComposeError::project(
                format!("Encountered errors while bringing up the project {project_name}."),
                results.error_causes(),
            ));
        }

        let mut containers: Vec<Container> = results
            .results
            .into_values()
            .flatten()
            .collect();
        containers.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(containers)
    }

    /// Which services `up` should attach log streams for
    pub fn attachment_set(
        &self,
        service_names: &[String],
        attach_dependencies: bool,
    ) -> Result<Vec<String>> {
        if service_names.is_empty() || attach_dependencies {
            return Ok(self
                .get_services(service_names, attach_dependencies)?
                .iter()
                .map(|service| service.name.clone())
                .collect());
        }
        Ok(service_names.to_vec())
    }

    /// Stop and remove everything the project owns
    pub async fn down(&self, options: DownOptions) -> Result<()> {
        self.stop_containers(&[], OneOffFilter::Include, options.timeout)
            .await?;
        if !options.ignore_orphans {
            self.find_orphan_containers(options.remove_orphans).await?;
        }
        self.remove_stopped(&[], OneOffFilter::Include, options.include_volumes)
            .await?;
        self.networks.remove().await?;
        if options.include_volumes {
            self.volumes.remove().await?;
        }
        for service in &self.services {
            service.remove_image(options.remove_image_type).await?;
        }
        Ok(())
    }

    /// Start existing containers, dependency order
    pub async fn start(&self, service_names: &[String]) -> Result<()> {
        let services = self.get_services(service_names, false)?;
        let in_set: HashSet<String> =
            services.iter().map(|service| service.name.clone()).collect();
        let nodes: Vec<Service> = services.iter().map(|service| (*service).clone()).collect();

        let results = parallel_execute(
            nodes,
            move |service: Service| async move {
                let containers = service.containers(true, false, &[]).await?;
                for container in &containers {
                    service.start_container_if_stopped(container).await?;
                }
                Ok(containers)
            },
            |service| service.name.clone(),
            move |service| {
                service
                    .dependency_names()
                    .into_iter()
                    .filter(|name| in_set.contains(name))
                    .collect()
            },
            ExecuteOptions {
                fail_check: Some(Arc::new(|service: Service| {
                    Box::pin(async move {
                        // A started service with no containers at all is a
                        // failure, not a success.
                        match service.containers(false, false, &[]).await {
                            Ok(containers) => containers.is_empty(),
                            Err(_) => true,
                        }
                    })
                })),
                ..Default::default()
            },
        )
        .await;

        if !results.ok() {
            return Err(ComposeError::project(
                "Encountered errors while starting the project.",
                results.error_causes(),
            ));
        }
        Ok(())
    }

    /// Fan out a container operation in reverse dependency order: each
    /// container waits for the containers of every service that depends
    /// on its service
    async fn fan_out_reverse<F, Fut>(
        &self,
        containers: Vec<Container>,
        verb: &str,
        op: F,
    ) -> Result<()>
    where
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let mut dependents_of: HashMap<String, HashSet<String>> = HashMap::new();
        for service in &self.services {
            for dep in service.dependency_names() {
                dependents_of
                    .entry(dep)
                    .or_default()
                    .insert(service.name.clone());
            }
        }
        let container_names_by_service: HashMap<String, Vec<String>> = {
            let mut map: HashMap<String, Vec<String>> = HashMap::new();
            for container in &containers {
                if let Some(service) = container.service() {
                    map.entry(service.to_string())
                        .or_default()
                        .push(container.name().to_string());
                }
            }
            map
        };

        let results = parallel_execute(
            containers,
            op,
            |container| container.name().to_string(),
            move |container| {
                let Some(service) = container.service() else {
                    return Vec::new();
                };
                dependents_of
                    .get(service)
                    .into_iter()
                    .flatten()
                    .flat_map(|dependent| {
                        container_names_by_service
                            .get(dependent)
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            },
            ExecuteOptions::default(),
        )
        .await;

        if !results.ok() {
            return Err(ComposeError::project(
                format!("Encountered errors while {verb} containers."),
                results.error_causes(),
            ));
        }
        Ok(())
    }

    async fn stop_containers(
        &self,
        service_names: &[String],
        one_off: OneOffFilter,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let containers = self.containers(service_names, false, one_off).await?;
        let services_by_name: HashMap<String, Service> = self
            .services
            .iter()
            .map(|service| (service.name.clone(), service.clone()))
            .collect();
        self.fan_out_reverse(containers, "stopping", move |container| {
            let services_by_name = services_by_name.clone();
            async move {
                let timeout = container
                    .service()
                    .and_then(|service| services_by_name.get(service))
                    .map(|service| service.stop_timeout(timeout))
                    .or(timeout);
                info!("Stopping {}", container.name());
                container.stop(timeout).await
            }
        })
        .await
    }

    /// Stop containers in reverse dependency order
    pub async fn stop(&self, service_names: &[String], timeout: Option<Duration>) -> Result<()> {
        let service_names = self.enabled_names(service_names)?;
        self.stop_containers(&service_names, OneOffFilter::Exclude, timeout)
            .await
    }

    fn enabled_names(&self, service_names: &[String]) -> Result<Vec<String>> {
        Ok(self
            .get_services(service_names, false)?
            .iter()
            .map(|service| service.name.clone())
            .collect())
    }

    /// Restart containers
    pub async fn restart(&self, service_names: &[String], timeout: Option<Duration>) -> Result<()> {
        let service_names = self.enabled_names(service_names)?;
        let containers = self
            .containers(&service_names, true, OneOffFilter::Exclude)
            .await?;
        let services_by_name: HashMap<String, Service> = self
            .services
            .iter()
            .map(|service| (service.name.clone(), service.clone()))
            .collect();
        self.fan_out(containers, "restarting", move |container| {
            let services_by_name = services_by_name.clone();
            async move {
                let timeout = container
                    .service()
                    .and_then(|service| services_by_name.get(service))
                    .map(|service| service.stop_timeout(timeout))
                    .or(timeout);
                info!("Restarting {}", container.name());
                container.restart(timeout).await
            }
        })
        .await
    }

    /// Kill containers, dependents first
    pub async fn kill(&self, service_names: &[String], signal: Option<String>) -> Result<()> {
        let containers = self
            .containers(service_names, false, OneOffFilter::Exclude)
            .await?;
        self.fan_out_reverse(containers, "killing", move |container| {
            let signal = signal.clone();
            async move {
                info!("Killing {}", container.name());
                container.kill(signal.as_deref()).await
            }
        })
        .await
    }

    /// Pause running containers, dependents first
    pub async fn pause(&self, service_names: &[String]) -> Result<()> {
        let containers = self
            .containers(service_names, false, OneOffFilter::Exclude)
            .await?;
        self.fan_out_reverse(containers, "pausing", |container| async move {
            info!("Pausing {}", container.name());
            container.pause().await
        })
        .await
    }

    /// Unpause paused containers
    pub async fn unpause(&self, service_names: &[String]) -> Result<()> {
        let containers = self
            .containers(service_names, false, OneOffFilter::Exclude)
            .await?;
        self.fan_out(containers, "unpausing", |container| async move {
            info!("Unpausing {}", container.name());
            container.unpause().await
        })
        .await
    }

    /// Remove stopped containers
    pub async fn remove_stopped(
        &self,
        service_names: &[String],
        one_off: OneOffFilter,
        remove_volumes: bool,
    ) -> Result<()> {
        let containers = self.containers(service_names, true, one_off).await?;
        let stopped: Vec<Container> = containers
            .into_iter()
            .filter(|container| !container.is_running())
            .collect();
        self.fan_out(stopped, "removing", move |container| async move {
            info!("Removing {}", container.name());
            container.remove(false, remove_volumes).await
        })
        .await
    }

    async fn fan_out<F, Fut>(
        &self,
        containers: Vec<Container>,
        verb: &str,
        op: F,
    ) -> Result<()>
    where
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let results = parallel_execute(
            containers,
            op,
            |container| container.name().to_string(),
            |_| Vec::new(),
            ExecuteOptions::default(),
        )
        .await;
        if !results.ok() {
            return Err(ComposeError::project(
                format!("Encountered errors while {verb} containers."),
                results.error_causes(),
            ));
        }
        Ok(())
    }

    /// Build every buildable service in the target set
    pub async fn build(
        &self,
        service_names: &[String],
        no_cache: bool,
        pull: bool,
        parallel_build: bool,
    ) -> Result<()> {
        let mut buildable = Vec::new();
        for service in self.get_services(service_names, false)? {
            if service.can_be_built() {
                buildable.push(service.clone());
            } else {
                info!(service = %service.name, "uses an image, skipping");
            }
        }

        if !parallel_build {
            for service in &buildable {
                service.build(no_cache, pull).await?;
            }
            return Ok(());
        }

        let results = parallel_execute(
            buildable,
            move |service: Service| async move {
                service.build(no_cache, pull).await?;
                Ok(())
            },
            |service| service.name.clone(),
            |_| Vec::new(),
            ExecuteOptions::with_limit(BUILD_PULL_LIMIT),
        )
        .await;
        if !results.ok() {
            return Err(ComposeError::project(
                "Encountered errors while building images.",
                results.error_causes(),
            ));
        }
        Ok(())
    }

    /// Pull every image-backed service in the target set
    pub async fn pull(
        &self,
        service_names: &[String],
        ignore_pull_failures: bool,
        include_deps: bool,
    ) -> Result<()> {
        let services: Vec<Service> = self
            .get_services(service_names, include_deps)?
            .into_iter()
            .cloned()
            .collect();

        let results = parallel_execute(
            services,
            move |service: Service| async move {
                service.pull(ignore_pull_failures).await?;
                Ok(())
            },
            |service| service.name.clone(),
            |_| Vec::new(),
            ExecuteOptions::with_limit(BUILD_PULL_LIMIT),
        )
        .await;
        if !results.ok() {
            return Err(ComposeError::project(
                "Encountered errors while pulling images.",
                results.error_causes(),
            ));
        }
        Ok(())
    }

    /// Push every service that declares both an image and a build,
    /// de-duplicated by image reference
    pub async fn push(&self, service_names: &[String], ignore_push_failures: bool) -> Result<()> {
        let mut pushed: HashSet<String> = HashSet::new();
        for service in self.get_services(service_names, false)? {
            // <image> and <image:latest> are the same reference.
            let (repo, tag) = crate::service::parse_repository_tag(&service.image_name());
            let reference = format!("{repo}:{}", tag.unwrap_or_else(|| "latest".into()));
            if pushed.insert(reference) {
                service.push(ignore_push_failures).await?;
            }
        }
        Ok(())
    }

    /// Create and start a one-off container (the `run` verb)
    pub async fn run_one_off(
        &self,
        service_name: &str,
        overrides: OneOffOverrides,
        start_deps: bool,
        timeout: Option<Duration>,
    ) -> Result<Container> {
        let service = self.get_service(service_name)?;

        if start_deps {
            let deps: Vec<String> = service
                .dependency_names()
                .into_iter()
                .filter(|name| self.get_service(name).is_ok())
                .collect();
            if !deps.is_empty() {
                self.up(UpOptions {
                    service_names: deps,
                    timeout,
                    ..UpOptions::new()
                })
                .await?;
            }
        }

        let converge = ConvergeOptions {
            timeout,
            start: false,
            rescale: false,
            one_off_overrides: Some(overrides),
            ..Default::default()
        };
        let plan = service
            .convergence_plan(ConvergenceStrategy::Changed, true)
            .await?;
        let containers = service.execute_convergence_plan(plan, &converge).await?;
        let container = containers
            .into_iter()
            .next()
            .ok_or_else(|| ComposeError::operation_failed("one-off container was not created"))?;
        service.start_container(&container).await?;
        Ok(container)
    }

    /// Subscribe to the normalized project event stream
    pub async fn events(&self, service_names: &[String]) -> Result<ProjectEventStream> {
        let service_names: HashSet<String> = if service_names.is_empty() {
            self.service_names().into_iter().collect()
        } else {
            self.validate_service_names(service_names)?;
            service_names.iter().cloned().collect()
        };
        project_events(
            Arc::clone(&self.client),
            self.project_filters(OneOffFilter::Include, false),
            service_names,
        )
        .await
    }

    /// Adjust one service to `desired` replicas (the `scale` verb)
    pub async fn scale(
        &self,
        service_name: &str,
        desired: u64,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.get_service(service_name)?.scale(desired, timeout).await
    }
}

// `up` worker tasks need the sibling service list without holding a
// reference to the project itself.
struct ProjectHandle {
    services: Vec<Service>,
}

async fn wait_for_condition(dependency: &Service, condition: DependsOnCondition) -> Result<()> {
    match condition {
        DependsOnCondition::ServiceStarted => Ok(()),
        DependsOnCondition::ServiceHealthy => loop {
            if dependency.is_healthy().await? {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        },
        DependsOnCondition::ServiceCompletedSuccessfully => loop {
            let containers = dependency.containers(true, false, &[]).await?;
            if !containers.is_empty()
                && containers
                    .iter()
                    .all(|container| !container.is_running() && container.state() == "exited")
            {
                for container in &containers {
                    if container.exit_code() != 0 {
                        return Err(ComposeError::operation_failed(format!(
                            "Dependency {} exited with code {}",
                            container.name(),
                            container.exit_code()
                        )));
                    }
                }
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        },
    }
}

fn resolve_attachments(
    service: &ServiceConfig,
    networks: &ProjectNetworks,
) -> Result<IndexMap<String, NetworkAttachment>> {
    let mut attachments: IndexMap<String, NetworkAttachment> = IndexMap::new();
    for name in service_network_names(service) {
        let engine_name = networks.engine_name(&name).ok_or_else(|| {
            ComposeError::configuration(format!(
                "Service \"{}\" uses an undefined network \"{name}\"",
                service.name
            ))
        })?;
        let attachment = service.networks.0.get(&name).cloned().unwrap_or_default();
        attachments.insert(engine_name, attachment);
    }
    Ok(attachments)
}

fn resolve_network_mode(
    service: &ServiceConfig,
    attachments: &IndexMap<String, NetworkAttachment>,
    use_networking: bool,
) -> Mode {
    if let Some(mode) = service.network_mode.as_deref() {
        return Mode::parse(mode);
    }
    if !use_networking {
        return Mode::Default;
    }
    match attachments
        .iter()
        .max_by_key(|(_, attachment)| attachment.priority.unwrap_or(0))
    {
        Some((network, _)) => Mode::Named(network.clone()),
        None => Mode::None,
    }
}

fn resolve_secrets(
    service: &ServiceConfig,
    config: &Config,
) -> Result<Vec<(crate::config::FileReference, String)>> {
    let mut resolved = Vec::new();
    for reference in &service.secrets {
        let declaration = config.secrets.get(&reference.source).ok_or_else(|| {
            ComposeError::configuration(format!(
                "Service \"{}\" uses an undefined secret \"{}\"",
                service.name, reference.source
            ))
        })?;
        if declaration.external.is_external() {
            warn!(
                service = %service.name,
                secret = %reference.source,
                "external secrets are not available to containers created by the engine core"
            );
            continue;
        }
        let Some(file) = &declaration.file else {
            warn!(
                service = %service.name,
                secret = %reference.source,
                "secret has no file source and will not be mounted"
            );
            continue;
        };
        resolved.push((reference.clone(), file.clone()));
    }
    Ok(resolved)
}
