//! Error types for the convergence engine.
//!
//! Every failure the engine can surface falls into one of the typed
//! categories below. Configuration problems (bad merges, undefined
//! references, cycles) are user errors; engine-side failures during a verb
//! are collected per service and aggregated into a single [`ComposeError::Project`]
//! at the verb boundary.

use thiserror::Error;

/// Result type alias for convergence-engine operations
pub type Result<T> = std::result::Result<T, ComposeError>;

/// Error type covering configuration, planning and execution failures
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Invalid configuration: validation, merge, path resolution, undefined
    /// reference, or duplicate mount target
    #[error("{message}")]
    Configuration {
        /// Description of the problem, with file and field-path context
        message: String,
    },

    /// A cycle was found while resolving `extends` references or service
    /// dependencies
    #[error("Circular reference: {}", trail.join(" -> "))]
    CircularReference {
        /// The full reference trail, in traversal order
        trail: Vec<String>,
    },

    /// A service references itself through `links`, `volumes_from` or
    /// `depends_on`
    #[error("{message}")]
    Dependency {
        /// Description of the self-reference
        message: String,
    },

    /// The service image is missing and the build action forbids building
    #[error("Service {service} needs to be built, but the build action is set to skip")]
    NeedsBuild {
        /// Name of the service whose image is missing
        service: String,
    },

    /// An image inspect failed and the service has no build context
    #[error("Image '{image}' not found")]
    NoSuchImage {
        /// The image reference that could not be found
        image: String,
    },

    /// A service name lookup missed
    #[error("No such service: {name}")]
    NoSuchService {
        /// The unknown service name
        name: String,
    },

    /// An engine API call failed during create/start or another lifecycle
    /// operation
    #[error("{message}")]
    OperationFailed {
        /// The engine's explanation text, with operation context
        message: String,
    },

    /// A `depends_on: service_healthy` dependency reported unhealthy
    #[error("Container {container} is unhealthy")]
    HealthCheckFailed {
        /// Name of the unhealthy container
        container: String,
    },

    /// A `depends_on: service_healthy` dependency has no healthcheck at all
    #[error("Service {service} is missing a healthcheck configuration")]
    NoHealthCheckConfigured {
        /// Name of the dependency without a healthcheck
        service: String,
    },

    /// A declared network no longer matches the engine-side network
    #[error("Network \"{network}\" needs to be recreated - {property} has changed")]
    NetworkConfigChanged {
        /// The network's engine-side name
        network: String,
        /// The property that differs
        property: String,
    },

    /// A build or pull stream carried an error frame
    #[error("{message}")]
    StreamOutput {
        /// The error text from the stream frame
        message: String,
    },

    /// One or more services or resources failed during a verb
    #[error("{message}")]
    Project {
        /// Summary message for the verb failure
        message: String,
        /// Per-node causes as `(node, error text)` pairs
        causes: Vec<(String, String)>,
    },
}

impl ComposeError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new dependency error
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::Dependency {
            message: message.into(),
        }
    }

    /// Create a new operation-failed error
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            message: message.into(),
        }
    }

    /// Create a new missing-image error
    pub fn no_such_image(image: impl Into<String>) -> Self {
        Self::NoSuchImage {
            image: image.into(),
        }
    }

    /// Create a new unknown-service error
    pub fn no_such_service(name: impl Into<String>) -> Self {
        Self::NoSuchService { name: name.into() }
    }

    /// Create a new stream-output error
    pub fn stream_output(message: impl Into<String>) -> Self {
        Self::StreamOutput {
            message: message.into(),
        }
    }

    /// Create a project error aggregating per-node causes
    pub fn project(message: impl Into<String>, causes: Vec<(String, String)>) -> Self {
        Self::Project {
            message: message.into(),
            causes,
        }
    }

    /// Whether this error is the user's fault (invalid configuration or
    /// arguments) as opposed to a failure converging the project.
    ///
    /// Front-ends map this to the distinct non-zero exit code for user
    /// errors.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::CircularReference { .. }
                | Self::Dependency { .. }
                | Self::NoSuchService { .. }
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::CircularReference { .. } => "circular-reference",
            Self::Dependency { .. } => "dependency",
            Self::NeedsBuild { .. } => "needs-build",
            Self::NoSuchImage { .. } => "no-such-image",
            Self::NoSuchService { .. } => "no-such-service",
            Self::OperationFailed { .. } => "operation-failed",
            Self::HealthCheckFailed { .. } | Self::NoHealthCheckConfigured { .. } => "healthcheck",
            Self::NetworkConfigChanged { .. } => "network-config",
            Self::StreamOutput { .. } => "stream-output",
            Self::Project { .. } => "project",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_reference_display() {
        let err = ComposeError::CircularReference {
            trail: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular reference: a -> b -> a");
    }

    #[test]
    fn test_user_error_classification() {
        assert!(ComposeError::configuration("bad").is_user_error());
        assert!(ComposeError::no_such_service("web").is_user_error());
        assert!(!ComposeError::operation_failed("boom").is_user_error());
        assert!(!ComposeError::project("up failed", vec![]).is_user_error());
    }

    #[test]
    fn test_categories() {
        assert_eq!(ComposeError::configuration("x").category(), "configuration");
        assert_eq!(
            ComposeError::NeedsBuild {
                service: "web".into()
            }
            .category(),
            "needs-build"
        );
        assert_eq!(
            ComposeError::NetworkConfigChanged {
                network: "proj_default".into(),
                property: "driver".into(),
            }
            .category(),
            "network-config"
        );
    }

    #[test]
    fn test_network_config_changed_display() {
        let err = ComposeError::NetworkConfigChanged {
            network: "app_front".into(),
            property: "enable_ipv6".into(),
        };
        assert_eq!(
            err.to_string(),
            "Network \"app_front\" needs to be recreated - enable_ipv6 has changed"
        );
    }
}
