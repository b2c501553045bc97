//! Handle onto an engine-side container.
//!
//! A [`Container`] wraps the inspect payload of one container together with
//! the client that produced it, and exposes the identity the engine derives
//! from labels: project, service, replica number, one-off flag and config
//! hash. Identity is always decided by label, never by name; the name is
//! only parsed as a last resort for containers written by pre-label
//! releases.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{
    ContainerDetails, ContainerSummary, EngineClient, EngineResult, LogStream, MountPoint,
};
use crate::errors::{ComposeError, Result};
use crate::labels::{
    legacy_project_name, parse_container_number, LABEL_CONFIG_HASH, LABEL_CONTAINER_NUMBER,
    LABEL_ONE_OFF, LABEL_PROJECT, LABEL_SERVICE, LABEL_SLUG,
};
use crate::utils::truncate_id;

/// A handle onto one engine-side container
#[derive(Clone)]
pub struct Container {
    client: Arc<dyn EngineClient>,
    details: ContainerDetails,
    inspected: bool,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.details.id)
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for Container {
    fn eq(&self, other: &Self) -> bool {
        self.details.id == other.details.id
    }
}

impl Eq for Container {}

impl Container {
    /// Wrap an already-inspected container
    pub fn new(client: Arc<dyn EngineClient>, details: ContainerDetails) -> Self {
        Self {
            client,
            details,
            inspected: true,
        }
    }

    /// Inspect a container by id and wrap it
    pub async fn from_id(client: Arc<dyn EngineClient>, id: &str) -> EngineResult<Self> {
        let details = client.inspect_container(id).await?;
        Ok(Self::new(client, details))
    }

    /// Wrap one entry of a container listing.
    ///
    /// The handle starts from the summary fields only; [`Container::refresh`]
    /// fills in mounts, network settings and the rest of the inspect payload
    /// when they are needed.
    pub fn from_summary(client: Arc<dyn EngineClient>, summary: &ContainerSummary) -> Self {
        let name = summary
            .names
            .iter()
            .min_by_key(|name| name.split('/').count())
            .cloned()
            .unwrap_or_default();
        let details = ContainerDetails {
            id: summary.id.clone(),
            name,
            state: crate::client::ContainerState {
                status: summary.state.clone(),
                running: summary.state == "running",
                ..Default::default()
            },
            config: crate::client::InspectedConfig {
                image: summary.image.clone(),
                labels: summary.labels.clone(),
                ..Default::default()
            },
            ..Default::default()
        };
        Self {
            client,
            details,
            inspected: false,
        }
    }

    /// Re-read the full inspect payload from the engine
    pub async fn refresh(&mut self) -> EngineResult<()> {
        self.details = self.client.inspect_container(&self.details.id).await?;
        self.inspected = true;
        Ok(())
    }

    /// Re-read the inspect payload unless it is already complete
    pub async fn ensure_inspected(&mut self) -> EngineResult<()> {
        if self.inspected {
            return Ok(());
        }
        self.refresh().await
    }

    /// The full container id
    pub fn id(&self) -> &str {
        &self.details.id
    }

    /// The first 12 characters of the id
    pub fn short_id(&self) -> &str {
        truncate_id(&self.details.id)
    }

    /// The container name without the leading slash
    pub fn name(&self) -> &str {
        self.details.name.strip_prefix('/').unwrap_or(&self.details.name)
    }

    /// The name with the leading `<project>_` component removed
    pub fn name_without_project(&self) -> String {
        match self.label(LABEL_PROJECT) {
            Some(project) if self.name().starts_with(&format!("{project}_")) => {
                self.name()[project.len() + 1..].to_string()
            }
            _ => self
                .name()
                .split('_')
                .skip(1)
                .collect::<Vec<_>>()
                .join("_"),
        }
    }

    /// One label value, if present
    pub fn label(&self, key: &str) -> Option<&str> {
        self.details.config.labels.get(key).map(String::as_str)
    }

    /// The service name this container realizes
    pub fn service(&self) -> Option<&str> {
        self.label(LABEL_SERVICE)
    }

    /// The project name this container belongs to
    pub fn project(&self) -> Option<&str> {
        self.label(LABEL_PROJECT)
    }

    /// The replica number, from the label or (legacy) the name suffix
    pub fn number(&self) -> Option<u32> {
        if let Some(value) = self.label(LABEL_CONTAINER_NUMBER) {
            return value.parse().ok();
        }
        parse_container_number(self.name())
    }

    /// Whether this container was created by the `run` verb
    pub fn is_one_off(&self) -> bool {
        self.label(LABEL_ONE_OFF) == Some("True")
    }

    /// The one-off slug, if any
    pub fn slug(&self) -> Option<&str> {
        self.label(LABEL_SLUG)
    }

    /// The config hash recorded at create time
    pub fn config_hash(&self) -> Option<&str> {
        self.label(LABEL_CONFIG_HASH)
    }

    /// Whether the container carries the stripped legacy project name
    pub fn has_legacy_project_name(&self, project: &str) -> bool {
        match self.project() {
            Some(label) => label != project && label == legacy_project_name(project),
            None => self.name().starts_with(&legacy_project_name(project)),
        }
    }

    /// Whether the container is running
    pub fn is_running(&self) -> bool {
        self.details.state.running
    }

    /// Whether the container is paused
    pub fn is_paused(&self) -> bool {
        self.details.state.paused
    }

    /// The coarse state string (`running`, `exited`, ...)
    pub fn state(&self) -> &str {
        &self.details.state.status
    }

    /// Exit code of the last run
    pub fn exit_code(&self) -> i64 {
        self.details.state.exit_code
    }

    /// Healthcheck status, when the container has a healthcheck
    pub fn health_status(&self) -> Option<&str> {
        self.details
            .state
            .health
            .as_ref()
            .map(|health| health.status.as_str())
    }

    /// The image reference the container was created from
    pub fn image(&self) -> &str {
        &self.details.config.image
    }

    /// The container's mounts
    pub fn mounts(&self) -> &[MountPoint] {
        &self.details.mounts
    }

    /// The mount at `destination`, if any
    pub fn mount_for(&self, destination: &str) -> Option<&MountPoint> {
        self.details
            .mounts
            .iter()
            .find(|mount| mount.destination == destination)
    }

    /// Legacy link strings the engine recorded for this container
    pub fn links(&self) -> &[String] {
        self.details
            .host_config
            .links
            .as_deref()
            .unwrap_or_default()
    }

    /// Names of the networks the container is connected to
    pub fn connected_networks(&self) -> Vec<String> {
        self.details
            .network_settings
            .networks
            .keys()
            .cloned()
            .collect()
    }

    /// Whether the short id is registered as an alias on `network`
    pub fn has_short_id_alias(&self, network: &str) -> bool {
        self.details
            .network_settings
            .networks
            .get(network)
            .and_then(|endpoint| endpoint.aliases.as_ref())
            .is_some_and(|aliases| aliases.iter().any(|alias| alias == self.short_id()))
    }

    /// The raw inspect payload
    pub fn details(&self) -> &ContainerDetails {
        &self.details
    }

    /// Start the container
    pub async fn start(&self) -> Result<()> {
        self.client
            .start_container(&self.details.id)
            .await
            .map_err(|err| self.op_failed("start", &err.explanation()))
    }

    /// Stop the container with a grace period
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<()> {
        self.client
            .stop_container(&self.details.id, timeout)
            .await
            .map_err(|err| self.op_failed("stop", &err.explanation()))
    }

    /// Kill the container
    pub async fn kill(&self, signal: Option<&str>) -> Result<()> {
        self.client
            .kill_container(&self.details.id, signal)
            .await
            .map_err(|err| self.op_failed("kill", &err.explanation()))
    }

    /// Restart the container with a grace period
    pub async fn restart(&self, timeout: Option<Duration>) -> Result<()> {
        self.client
            .restart_container(&self.details.id, timeout)
            .await
            .map_err(|err| self.op_failed("restart", &err.explanation()))
    }

    /// Pause the container
    pub async fn pause(&self) -> Result<()> {
        self.client
            .pause_container(&self.details.id)
            .await
            .map_err(|err| self.op_failed("pause", &err.explanation()))
    }

    /// Unpause the container
    pub async fn unpause(&self) -> Result<()> {
        self.client
            .unpause_container(&self.details.id)
            .await
            .map_err(|err| self.op_failed("unpause", &err.explanation()))
    }

    /// Remove the container, optionally with its anonymous volumes
    pub async fn remove(&self, force: bool, volumes: bool) -> Result<()> {
        match self
            .client
            .remove_container(&self.details.id, force, volumes)
            .await
        {
            Ok(()) => Ok(()),
            // Already gone is as good as removed.
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(self.op_failed("remove", &err.explanation())),
        }
    }

    /// Block until the container exits, returning its exit code
    pub async fn wait(&self) -> Result<i64> {
        self.client
            .wait_container(&self.details.id)
            .await
            .map_err(|err| self.op_failed("wait for", &err.explanation()))
    }

    /// Commit the container's filesystem as a new image
    pub async fn commit(&self, repo: &str, tag: &str) -> Result<String> {
        self.client
            .commit_container(&self.details.id, repo, tag)
            .await
            .map_err(|err| self.op_failed("commit", &err.explanation()))
    }

    /// Rename the container out of the way before its replacement is created
    pub async fn rename_to_tmp_name(&mut self) -> Result<()> {
        let new_name = format!("{}_{}", self.short_id(), self.name());
        self.client
            .rename_container(&self.details.id, &new_name)
            .await
            .map_err(|err| self.op_failed("rename", &err.explanation()))?;
        self.details.name = format!("/{new_name}");
        Ok(())
    }

    /// Open the container's log stream
    pub async fn attach_log_stream(&self) -> Result<LogStream> {
        self.client
            .container_logs(&self.details.id, true)
            .await
            .map_err(|err| self.op_failed("attach to", &err.explanation()))
    }

    fn op_failed(&self, verb: &str, explanation: &str) -> ComposeError {
        ComposeError::operation_failed(format!(
            "Cannot {verb} container {}: {explanation}",
            self.name()
        ))
    }
}
