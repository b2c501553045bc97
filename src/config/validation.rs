//! Semantic validation of the typed configuration.
//!
//! Structural (schema) validation happens before the core receives the
//! tree; the checks here are the semantic ones the schema cannot express:
//! version gating of fields, duplicate mount targets, and incompatible
//! field combinations.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::service::ServiceConfig;
use super::types::DependsOnCondition;
use crate::errors::{ComposeError, Result};

/// A recognized config file version, totally ordered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeVersion(pub String);

impl ComposeVersion {
    /// The legacy root-as-services shape
    pub fn v1() -> Self {
        Self("1".into())
    }

    /// Whether this is the legacy shape
    pub fn is_v1(&self) -> bool {
        self.numeric() == (1, 0)
    }

    fn numeric(&self) -> (u64, u64) {
        let mut parts = self.0.split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        (major, minor)
    }

    /// Whether this version is at or above `major.minor`
    pub fn at_least(&self, major: u64, minor: u64) -> bool {
        self.numeric() >= (major, minor)
    }
}

impl PartialOrd for ComposeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComposeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric().cmp(&other.numeric())
    }
}

impl fmt::Display for ComposeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ComposeVersion {
    fn default() -> Self {
        Self("3.9".into())
    }
}

fn version_error(service: &str, field: &str, minimum: &str) -> ComposeError {
    ComposeError::configuration(format!(
        "services.{service}.{field} is only supported by config versions >= {minimum}"
    ))
}

/// Validate one merged service declaration against the file version and
/// the cross-field rules
pub fn validate_service(service: &ServiceConfig, version: &ComposeVersion) -> Result<()> {
    if service.image.is_none() && service.build.is_none() {
        return Err(ComposeError::configuration(format!(
            "Service \"{}\" has neither an image nor a build context specified. \
             At least one must be provided.",
            service.name
        )));
    }

    validate_version_gates(service, version)?;
    validate_mount_targets(service)?;

    if let Some(container_name) = &service.container_name {
        if service.effective_scale() > 1 {
            return Err(ComposeError::configuration(format!(
                "Service \"{}\" uses the custom container name \"{container_name}\" and \
                 cannot be scaled beyond one container",
                service.name
            )));
        }
    }

    if service.scale.is_some()
        && service
            .deploy
            .as_ref()
            .is_some_and(|deploy| deploy.replicas.is_some())
    {
        return Err(ComposeError::configuration(format!(
            "services.{}: both service.scale and service.deploy.replicas are set. \
             Only one of them must be set.",
            service.name
        )));
    }

    Ok(())
}

fn validate_version_gates(service: &ServiceConfig, version: &ComposeVersion) -> Result<()> {
    let name = &service.name;

    if service.healthcheck.is_some() && !version.at_least(2, 1) {
        return Err(version_error(name, "healthcheck", "2.1"));
    }
    if service.init.is_some() && !version.at_least(2, 2) {
        return Err(version_error(name, "init", "2.2"));
    }
    if !service.profiles.is_empty() && !version.at_least(3, 9) {
        return Err(version_error(name, "profiles", "3.9"));
    }
    if service
        .depends_on
        .0
        .values()
        .any(|condition| *condition != DependsOnCondition::ServiceStarted)
        && !version.at_least(2, 1)
    {
        return Err(version_error(name, "depends_on.condition", "2.1"));
    }
    if version.is_v1() {
        if !service.networks.is_empty() {
            return Err(version_error(name, "networks", "2.0"));
        }
        if service.network_mode.as_deref().is_some_and(|mode| {
            mode.starts_with("service:")
        }) {
            return Err(version_error(name, "network_mode: service:", "2.0"));
        }
        if service.deploy.is_some() {
            return Err(version_error(name, "deploy", "3.0"));
        }
    }
    Ok(())
}

/// No two volume specs on one service may share a target, unless they are
/// exactly identical
fn validate_mount_targets(service: &ServiceConfig) -> Result<()> {
    let mut seen: HashMap<&str, &super::types::VolumeSpec> = HashMap::new();
    for volume in &service.volumes {
        if let Some(existing) = seen.get(volume.target()) {
            if *existing != volume {
                return Err(ComposeError::configuration(format!(
                    "Duplicate mount points: [{}]",
                    volume.target()
                )));
            }
        }
        seen.insert(volume.target(), volume);
    }
    Ok(())
}
