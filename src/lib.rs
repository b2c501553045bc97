//! # compose-engine
//!
//! A convergence engine for multi-container applications on the Docker
//! Engine API.
//!
//! The crate turns a declarative description of an application (services,
//! networks and volumes) into the minimum set of create/recreate/start/
//! stop/remove operations needed to reach the declared state, executes
//! them with correct dependency ordering and bounded parallelism, and
//! keeps identity stable across runs through labels on engine objects.
//!
//! ## What it does
//!
//! - **Configuration merge** - layered config files merge deterministically
//!   per a field-by-field rule table, with `extends` resolution and
//!   `${VAR}` interpolation
//! - **Convergence planning** - each service's containers are compared
//!   against a configuration hash and planned as create, recreate, start
//!   or no-op
//! - **Dependency scheduling** - services converge in topological order
//!   with bounded parallelism and fail-fast pruning of dependents
//! - **Stable identity** - every created object carries labels that let a
//!   later run recognize and reuse it
//!
//! ## What it leaves out
//!
//! The engine's HTTP transport (inject any [`EngineClient`]), the CLI
//! front-end, YAML parsing and schema validation, and log/progress
//! rendering are the caller's concern.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use compose_engine::{
//!     load, ComposeError, ConfigDetails, NoFileLoader, Project, ProjectOptions, UpOptions,
//! };
//!
//! # async fn example(client: Arc<dyn compose_engine::EngineClient>) -> Result<(), ComposeError> {
//! let details = ConfigDetails {
//!     working_dir: "/srv/app".into(),
//!     config_files: vec![("/srv/app/docker-compose.yml".into(), serde_json::json!({
//!         "version": "3.9",
//!         "services": {
//!             "db": {"image": "postgres:16"},
//!             "web": {"image": "nginx", "depends_on": ["db"]}
//!         }
//!     }))],
//!     environment: std::env::vars().collect(),
//! };
//! let config = load(&details, &NoFileLoader)?;
//! let project = Project::from_config("app", config, client, ProjectOptions::default())?;
//! project.up(UpOptions::new()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use client::{
    BuildOptions, ContainerConfig, ContainerCreateOptions, ContainerDetails, ContainerSummary,
    EndpointConfig, EngineClient, EngineError, EngineEvent, EngineResult, EventStream, Filters,
    HealthConfig, HostConfig, ImageDetails, LogStream, Mount, NetworkCreateOptions,
    NetworkDetails, NetworkingConfig, ObjectKind, PortBinding, ProgressEvent, ProgressStream,
    VolumeCreateOptions, VolumeDetails,
};
pub use config::{
    load, ComposeVersion, Config, ConfigDetails, ConfigFile, DependsOnCondition, Environment,
    ExternalSpec, Healthcheck, Labels, Mode, NetworkAttachment, NetworkConfig, NoFileLoader,
    Protocol, RawFileLoader, SecretConfig, ServiceConfig, ServicePort, VolumeConfig, VolumeSpec,
};
pub use container::Container;
pub use errors::{ComposeError, Result};
pub use events::{ProjectEvent, ProjectEventStream};
pub use exec::{
    parallel_execute, CancelToken, ExecuteOptions, ExecuteResults, NodeError,
    DEFAULT_PARALLEL_LIMIT,
};
pub use graph::{sort_services, DependencyGraph};
pub use labels::OneOffFilter;
pub use network::{Network, ProjectNetworks};
pub use project::{DownOptions, Project, ProjectOptions, UpOptions};
pub use service::{
    BuildAction, ConvergeOptions, ConvergenceAction, ConvergencePlan, ConvergenceStrategy,
    ImageRemovalMode, OneOffOverrides, Service,
};
pub use volume::{ProjectVolumes, Volume};

// Core modules
pub mod client;
pub mod config;
pub mod container;
pub mod errors;
pub mod events;
pub mod exec;
pub mod graph;
pub mod labels;
pub mod network;
pub mod project;
pub mod service;
pub mod volume;

// Test doubles for the client seam
#[doc(hidden)]
pub mod testing;

// Internal utilities
mod utils;

/// The version of this crate, written onto every created engine object
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The minimum supported engine API version
pub const MIN_API_VERSION: &str = "1.21";
