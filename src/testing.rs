//! Test doubles for the engine client seam.

use std::time::Duration;

use async_trait::async_trait;

use crate::client::{
    BuildOptions, ContainerCreateOptions, ContainerDetails, ContainerSummary, DistributionDetails,
    EndpointConfig, EngineClient, EngineError, EngineResult, EventStream, Filters, ImageDetails,
    LogStream, NetworkCreateOptions, NetworkDetails, NetworkSummary, ProgressStream,
    VolumeCreateOptions, VolumeDetails,
};

/// An engine client that fails every call.
///
/// Useful for unit tests exercising pure logic on types that carry a
/// client but never reach the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEngine;

fn unreachable_call(op: &str) -> EngineError {
    EngineError::Connection {
        message: format!("NullEngine received a {op} call"),
    }
}

#[async_trait]
impl EngineClient for NullEngine {
    fn api_version(&self) -> String {
        "1.41".into()
    }

    async fn containers(&self, _: bool, _: &Filters) -> EngineResult<Vec<ContainerSummary>> {
        Err(unreachable_call("containers"))
    }

    async fn inspect_container(&self, _: &str) -> EngineResult<ContainerDetails> {
        Err(unreachable_call("inspect_container"))
    }

    async fn create_container(&self, _: ContainerCreateOptions) -> EngineResult<String> {
        Err(unreachable_call("create_container"))
    }

    async fn start_container(&self, _: &str) -> EngineResult<()> {
        Err(unreachable_call("start_container"))
    }

    async fn stop_container(&self, _: &str, _: Option<Duration>) -> EngineResult<()> {
        Err(unreachable_call("stop_container"))
    }

    async fn kill_container(&self, _: &str, _: Option<&str>) -> EngineResult<()> {
        Err(unreachable_call("kill_container"))
    }

    async fn restart_container(&self, _: &str, _: Option<Duration>) -> EngineResult<()> {
        Err(unreachable_call("restart_container"))
    }

    async fn pause_container(&self, _: &str) -> EngineResult<()> {
        Err(unreachable_call("pause_container"))
    }

    async fn unpause_container(&self, _: &str) -> EngineResult<()> {
        Err(unreachable_call("unpause_container"))
    }

    async fn remove_container(&self, _: &str, _: bool, _: bool) -> EngineResult<()> {
        Err(unreachable_call("remove_container"))
    }

    async fn wait_container(&self, _: &str) -> EngineResult<i64> {
        Err(unreachable_call("wait_container"))
    }

    async fn rename_container(&self, _: &str, _: &str) -> EngineResult<()> {
        Err(unreachable_call("rename_container"))
    }

    async fn commit_container(&self, _: &str, _: &str, _: &str) -> EngineResult<String> {
        Err(unreachable_call("commit_container"))
    }

    async fn container_logs(&self, _: &str, _: bool) -> EngineResult<LogStream> {
        Err(unreachable_call("container_logs"))
    }

    async fn connect_container_to_network(
        &self,
        _: &str,
        _: &str,
        _: EndpointConfig,
    ) -> EngineResult<()> {
        Err(unreachable_call("connect_container_to_network"))
    }

    async fn disconnect_container_from_network(&self, _: &str, _: &str) -> EngineResult<()> {
        Err(unreachable_call("disconnect_container_from_network"))
    }

    async fn networks(&self, _: &Filters) -> EngineResult<Vec<NetworkSummary>> {
        Err(unreachable_call("networks"))
    }

    async fn inspect_network(&self, _: &str) -> EngineResult<NetworkDetails> {
        Err(unreachable_call("inspect_network"))
    }

    async fn create_network(&self, _: NetworkCreateOptions) -> EngineResult<String> {
        Err(unreachable_call("create_network"))
    }

    async fn remove_network(&self, _: &str) -> EngineResult<()> {
        Err(unreachable_call("remove_network"))
    }

    async fn volumes(&self) -> EngineResult<Vec<VolumeDetails>> {
        Err(unreachable_call("volumes"))
    }

    async fn inspect_volume(&self, _: &str) -> EngineResult<VolumeDetails> {
        Err(unreachable_call("inspect_volume"))
    }

    async fn create_volume(&self, _: VolumeCreateOptions) -> EngineResult<VolumeDetails> {
        Err(unreachable_call("create_volume"))
    }

    async fn remove_volume(&self, _: &str) -> EngineResult<()> {
        Err(unreachable_call("remove_volume"))
    }

    async fn inspect_image(&self, _: &str) -> EngineResult<ImageDetails> {
        Err(unreachable_call("inspect_image"))
    }

    async fn pull_image(&self, _: &str, _: &str, _: Option<&str>) -> EngineResult<ProgressStream> {
        Err(unreachable_call("pull_image"))
    }

    async fn push_image(&self, _: &str, _: &str) -> EngineResult<ProgressStream> {
        Err(unreachable_call("push_image"))
    }

    async fn build_image(&self, _: BuildOptions) -> EngineResult<ProgressStream> {
        Err(unreachable_call("build_image"))
    }

    async fn remove_image(&self, _: &str) -> EngineResult<()> {
        Err(unreachable_call("remove_image"))
    }

    async fn inspect_distribution(&self, _: &str) -> EngineResult<DistributionDetails> {
        Err(unreachable_call("inspect_distribution"))
    }

    async fn events(&self, _: &Filters) -> EngineResult<EventStream> {
        Err(unreachable_call("events"))
    }
}
