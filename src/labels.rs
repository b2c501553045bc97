//! Identity and labeling for engine objects.
//!
//! Every container, network and volume the engine creates carries a set of
//! reserved labels in the `com.docker.compose.*` namespace. Ownership on
//! read-back is decided by label, never by name. Container names follow
//! `<project>_<service>_<N>` for replicated containers and
//! `<project>_<service>_run_<slug>` for one-offs; a legacy form with
//! hyphens/underscores stripped from the project name is recognized on read
//! but never written.

use rand::RngCore;

/// Label carrying the project name
pub const LABEL_PROJECT: &str = "com.docker.compose.project";
/// Label carrying the service name (containers only)
pub const LABEL_SERVICE: &str = "com.docker.compose.service";
/// Label carrying the replica number (non-one-off containers only)
pub const LABEL_CONTAINER_NUMBER: &str = "com.docker.compose.container-number";
/// Label marking one-off containers
pub const LABEL_ONE_OFF: &str = "com.docker.compose.oneoff";
/// Label carrying the declared network name (networks only)
pub const LABEL_NETWORK: &str = "com.docker.compose.network";
/// Label carrying the declared volume name (volumes only)
pub const LABEL_VOLUME: &str = "com.docker.compose.volume";
/// Label carrying the engine-core version that created the object
pub const LABEL_VERSION: &str = "com.docker.compose.version";
/// Label carrying the service configuration hash
pub const LABEL_CONFIG_HASH: &str = "com.docker.compose.config-hash";
/// Label carrying the random slug of a one-off container
pub const LABEL_SLUG: &str = "com.docker.compose.slug";
/// Label carrying the project working directory
pub const LABEL_WORKING_DIR: &str = "com.docker.compose.project.working_dir";
/// Label carrying the config file list
pub const LABEL_CONFIG_FILES: &str = "com.docker.compose.project.config_files";
/// Label carrying the environment file path
pub const LABEL_ENVIRONMENT_FILE: &str = "com.docker.compose.project.environment_file";

/// Strip the separators from a project name, producing the legacy label
/// value written by pre-label releases. Recognized on read, never written.
pub fn legacy_project_name(project: &str) -> String {
    project.replace(['_', '-'], "")
}

/// Generate the random 12-hex-char slug used to name one-off containers
pub fn generate_slug() -> String {
    let mut bytes = [0u8; 6];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Build the name for a replicated or one-off container.
///
/// With a slug the name is `<project>_<service>_run_<slug>`; otherwise it is
/// `<project>_<service>_<number>`.
pub fn build_container_name(
    project: &str,
    service: &str,
    number: u32,
    slug: Option<&str>,
) -> String {
    match slug {
        Some(slug) => format!("{project}_{service}_run_{slug}"),
        None => format!("{project}_{service}_{number}"),
    }
}

/// Parse the trailing replica number out of a container name, if any
pub fn parse_container_number(name: &str) -> Option<u32> {
    name.rsplit('_').next()?.parse().ok()
}

/// The label pairs identifying containers of one service.
///
/// `legacy` substitutes the stripped project-name form for read-side
/// fallback queries.
pub fn service_labels(project: &str, service: &str, one_off: bool, legacy: bool) -> Vec<String> {
    let project = if legacy {
        legacy_project_name(project)
    } else {
        project.to_string()
    };
    vec![
        format!("{LABEL_PROJECT}={project}"),
        format!("{LABEL_SERVICE}={service}"),
        format!("{LABEL_ONE_OFF}={}", if one_off { "True" } else { "False" }),
    ]
}

/// Filter describing which one-off containers a listing should include
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OneOffFilter {
    /// Include both one-off and replicated containers
    Include,
    /// Exclude one-off containers
    #[default]
    Exclude,
    /// Only one-off containers
    Only,
}

/// The label pairs identifying all containers of a project, honoring the
/// one-off filter
pub fn project_labels(project: &str, one_off: OneOffFilter, legacy: bool) -> Vec<String> {
    let project = if legacy {
        legacy_project_name(project)
    } else {
        project.to_string()
    };
    let mut labels = vec![format!("{LABEL_PROJECT}={project}")];
    match one_off {
        OneOffFilter::Include => {}
        OneOffFilter::Exclude => labels.push(format!("{LABEL_ONE_OFF}=False")),
        OneOffFilter::Only => labels.push(format!("{LABEL_ONE_OFF}=True")),
    }
    labels
}
