//! Declared volumes and their convergence against engine state.
//!
//! Volumes are simpler than networks: external ones must pre-exist, owned
//! ones are created when missing, and an existing volume is never diffed;
//! once created, its driver and options are considered immutable.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::client::{EngineClient, VolumeCreateOptions};
use crate::config::{Config, VolumeConfig, VolumeSpec};
use crate::errors::{ComposeError, Result};
use crate::labels::{LABEL_PROJECT, LABEL_VERSION, LABEL_VOLUME};

/// One declared volume bound to a client
#[derive(Clone)]
pub struct Volume {
    client: Arc<dyn EngineClient>,
    project: String,
    /// The declared key under the top-level `volumes` mapping
    pub name: String,
    custom_name: Option<String>,
    driver: Option<String>,
    driver_opts: IndexMap<String, String>,
    /// Externally managed: found, never created or deleted
    pub external: bool,
    labels: IndexMap<String, String>,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("name", &self.name)
            .field("external", &self.external)
            .finish()
    }
}

impl Volume {
    /// Bind one declared volume to a client
    pub fn from_config(
        client: Arc<dyn EngineClient>,
        project: &str,
        name: &str,
        config: &VolumeConfig,
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
            external: config.external.is_external(),
            labels: config.labels.0.clone(),
        }
    }

    /// The engine-side name: the custom name, the bare declared name for
    /// an external volume, or `<project>_<name>`
    pub fn full_name(&self) -> String {
        match &self.custom_name {
            Some(name) => name.clone(),
            None if self.external => self.name.clone(),
            None => format!("{}_{}", self.project, self.name),
        }
    }

    fn owned_labels(&self) -> BTreeMap<String, String> {
        let mut labels: BTreeMap<String, String> =
            self.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        labels.insert(LABEL_PROJECT.into(), self.project.clone());
        labels.insert(LABEL_VOLUME.into(), self.name.clone());
        labels.insert(LABEL_VERSION.into(), crate::VERSION.into());
        labels
    }

    /// Converge this volume: verify an external one exists, create an
    /// owned missing one, use an existing one as-is
    pub async fn ensure(&self) -> Result<()> {
        let name = self.full_name();
        match self.client.inspect_volume(&name).await {
            Ok(_) => {
                debug!(volume = %name, "volume exists");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                if self.external {
                    return Err(ComposeError::configuration(format!(
                        "Volume {name} declared as external, but could not be found. Please \
                         create the volume manually using `docker volume create --name={name}` \
                         and try again."
                    )));
                }
                info!(volume = %name, "creating volume");
                self.client
                    .create_volume(VolumeCreateOptions {
                        name,
                        driver: self.driver.clone(),
                        driver_opts: self
                            .driver_opts
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                        labels: self.owned_labels(),
                    })
                    .await
                    .map_err(|err| {
                        ComposeError::operation_failed(format!(
                            "Cannot create volume {}: {}",
                            self.full_name(),
                            err.explanation()
                        ))
                    })?;
                Ok(())
            }
            Err(err) => Err(ComposeError::operation_failed(err.explanation())),
        }
    }

    /// Remove the volume, unless it is external
    pub async fn remove(&self) -> Result<()> {
        if self.external {
            info!(volume = %self.full_name(), "volume is external, skipping");
            return Ok(());
        }
        info!(volume = %self.full_name(), "removing volume");
        match self.client.remove_volume(&self.full_name()).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                warn!(volume = %self.full_name(), "volume not found");
                Ok(())
            }
            Err(err) => Err(ComposeError::operation_failed(err.explanation())),
        }
    }
}

/// The volumes one project declares
#[derive(Debug, Clone, Default)]
pub struct ProjectVolumes {
    volumes: IndexMap<String, Volume>,
}

impl ProjectVolumes {
    /// Bind the declared volumes to a client
    pub fn from_config(client: Arc<dyn EngineClient>, project: &str, config: &Config) -> Self {
        Self {
            volumes: config
                .volumes
                .iter()
                .map(|(name, volume_config)| {
                    (
                        name.clone(),
                        Volume::from_config(Arc::clone(&client), project, name, volume_config),
                    )
                })
                .collect(),
        }
    }

    /// Ensure every declared volume
    pub async fn initialize(&self) -> Result<()> {
        for volume in self.volumes.values() {
            volume.ensure().await?;
        }
        Ok(())
    }

    /// Remove every owned volume
    pub async fn remove(&self) -> Result<()> {
        for volume in self.volumes.values() {
            volume.remove().await?;
        }
        Ok(())
    }

    /// Rewrite a named-volume spec so its source is the engine-side name.
    ///
    /// Sources naming a declared volume get the project namespace (or the
    /// declared custom/external name); undeclared sources are a
    /// configuration error.
    pub fn namespace_spec(&self, spec: &VolumeSpec) -> Result<VolumeSpec> {
        let VolumeSpec::Named {
            source,
            target,
            read_only,
            no_copy,
        } = spec
        else {
            return Ok(spec.clone());
        };
        let volume = self.volumes.get(source).ok_or_else(|| {
            ComposeError::configuration(format!(
                "Named volume \"{source}\" is used but no declaration was found in the \
                 volumes section."
            ))
        })?;
        Ok(VolumeSpec::Named {
            source: volume.full_name(),
            target: target.clone(),
            read_only: *read_only,
            no_copy: *no_copy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExternalSpec;

    fn volume(config: VolumeConfig) -> Volume {
        Volume::from_config(Arc::new(crate::testing::NullEngine), "app", "data", &config)
    }

    #[test]
    fn test_full_name() {
        assert_eq!(volume(VolumeConfig::default()).full_name(), "app_data");
        assert_eq!(
            volume(VolumeConfig {
                name: Some("shared-data".into()),
                ..Default::default()
            })
            .full_name(),
            "shared-data"
        );
    }

    #[test]
    fn test_external_legacy_name_form() {
        let external = volume(VolumeConfig {
            external: ExternalSpec::Named {
                name: "preexisting".into(),
            },
            ..Default::default()
        });
        assert!(external.external);
        assert_eq!(external.full_name(), "preexisting");
    }

    #[test]
    fn test_namespace_spec() {
        let client: Arc<dyn EngineClient> = Arc::new(crate::testing::NullEngine);
        let mut config = Config::default();
        config
            .volumes
            .insert("data".into(), VolumeConfig::default());
        let volumes = ProjectVolumes::from_config(client, "app", &config);

        let spec = VolumeSpec::Named {
            source: "data".into(),
            target: "/var/data".into(),
            read_only: false,
            no_copy: false,
        };
        let namespaced = volumes.namespace_spec(&spec).unwrap();
        assert_eq!(
            namespaced,
            VolumeSpec::Named {
                source: "app_data".into(),
                target: "/var/data".into(),
                read_only: false,
                no_copy: false,
            }
        );

        let undeclared = VolumeSpec::Named {
            source: "ghost".into(),
            target: "/x".into(),
            read_only: false,
            no_copy: false,
        };
        assert!(volumes.namespace_spec(&undeclared).is_err());

        let bind = VolumeSpec::Bind {
            source: "/host".into(),
            target: "/ctr".into(),
            read_only: false,
            propagation: None,
        };
        assert_eq!(volumes.namespace_spec(&bind).unwrap(), bind);
    }
}
