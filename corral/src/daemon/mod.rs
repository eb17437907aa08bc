//! The capability surface the engine needs from a container daemon.
//!
//! One production implementation exists ([`moby::MobyDaemon`], over
//! [`bollard::Docker`]); tests implement the trait directly, one double per
//! test concern.

use std::{collections::HashMap, pin::Pin, time::SystemTime};

use async_trait::async_trait;
use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse, ContainerPruneResponse,
    ContainerStatsResponse, ContainerSummary, ContainerTopResponse, ContainerUpdateBody,
    ContainerWaitResponse, ImageDeleteResponseItem, ImageInspect, ImagePruneResponse, ImageSummary,
    Network, NetworkCreateResponse, NetworkPruneResponse, Volume, VolumePruneResponse,
};
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;

use crate::{filters::Filters, labels::Labels};

pub mod moby;

/// Daemon-level failures, bollard's error type verbatim; the engine wraps
/// them into structured errors.
pub type DaemonError = bollard::errors::Error;

pub type DaemonResult<T> = Result<T, DaemonError>;

/// `Ok` items of a streaming daemon call.
pub type DaemonStream<T> = BoxStream<'static, DaemonResult<T>>;

/// Answer to a daemon ping, as much of it as build-backend detection needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonPing {
    /// `"2"` when the daemon builds with BuildKit by default.
    pub builder_version: Option<String>,
    pub os_type: String,
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveContainerSpec {
    pub force: bool,
    /// Also remove anonymous volumes.
    pub volumes: bool,
    pub link: bool,
}

/// Options for a log read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogsSpec {
    pub follow: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub timestamps: bool,
    /// Number of lines from the end, all when absent.
    pub tail: Option<u64>,
    /// Unix timestamp lower bound.
    pub since: Option<i64>,
}

impl LogsSpec {
    /// Both std streams, no follow.
    #[must_use]
    pub fn both() -> Self {
        Self { stdout: true, stderr: true, ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachSpec {
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    /// Replay logged output before streaming.
    pub logs: bool,
}

/// An exec to create inside a running container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    pub tty: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
}

/// A bidirectional attachment to a container or exec.
pub struct AttachedIo {
    pub output: DaemonStream<Bytes>,
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}

impl std::fmt::Debug for AttachedIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedIo").finish_non_exhaustive()
    }
}

/// Metadata for one path inside a container filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathStat {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub modified: Option<SystemTime>,
    pub link_target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeCreateSpec {
    pub name: String,
    pub driver: Option<String>,
    pub driver_opts: HashMap<String, String>,
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkCreateSpec {
    pub name: String,
    pub driver: Option<String>,
    pub internal: bool,
    pub attachable: bool,
    pub options: HashMap<String, String>,
    pub labels: Labels,
}

/// A legacy (pre-BuildKit) image build to delegate to the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyBuildSpec {
    pub tags: Vec<String>,
    pub dockerfile: String,
    pub build_args: HashMap<String, String>,
    pub labels: Labels,
    pub no_cache: bool,
    pub target: String,
    pub pull: bool,
    pub network_mode: String,
}

/// One message from the legacy build stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyBuildMessage {
    pub stream: Option<String>,
    pub error: Option<String>,
}

/// Everything the engine may ask of a daemon. Mirrors the daemon API
/// one-to-one; no labels, no filters, no policy. That is the engine's job.
#[async_trait]
pub trait Daemon: Send + Sync {
    async fn ping(&self) -> DaemonResult<DaemonPing>;

    // containers
    async fn container_create(
        &self,
        name: Option<&str>,
        body: ContainerCreateBody,
    ) -> DaemonResult<ContainerCreateResponse>;
    async fn container_start(&self, id: &str) -> DaemonResult<()>;
    async fn container_stop(&self, id: &str, timeout: Option<i32>) -> DaemonResult<()>;
    async fn container_kill(&self, id: &str, signal: Option<&str>) -> DaemonResult<()>;
    async fn container_pause(&self, id: &str) -> DaemonResult<()>;
    async fn container_unpause(&self, id: &str) -> DaemonResult<()>;
    async fn container_restart(&self, id: &str, timeout: Option<i32>) -> DaemonResult<()>;
    async fn container_rename(&self, id: &str, new_name: &str) -> DaemonResult<()>;
    async fn container_resize(&self, id: &str, width: u16, height: u16) -> DaemonResult<()>;
    async fn container_remove(&self, id: &str, spec: RemoveContainerSpec) -> DaemonResult<()>;
    async fn container_inspect(&self, id: &str) -> DaemonResult<ContainerInspectResponse>;
    async fn container_wait(&self, id: &str)
        -> DaemonResult<DaemonStream<ContainerWaitResponse>>;
    async fn container_logs(&self, id: &str, spec: LogsSpec) -> DaemonResult<DaemonStream<Bytes>>;
    async fn container_attach(&self, id: &str, spec: AttachSpec) -> DaemonResult<AttachedIo>;
    async fn container_top(
        &self,
        id: &str,
        ps_args: Option<&str>,
    ) -> DaemonResult<ContainerTopResponse>;
    async fn container_stats(
        &self,
        id: &str,
        one_shot: bool,
    ) -> DaemonResult<DaemonStream<ContainerStatsResponse>>;
    async fn container_update(&self, id: &str, update: ContainerUpdateBody) -> DaemonResult<()>;
    async fn container_list(
        &self,
        all: bool,
        filters: &Filters,
    ) -> DaemonResult<Vec<ContainerSummary>>;
    async fn container_prune(&self, filters: &Filters) -> DaemonResult<ContainerPruneResponse>;
    async fn container_stat_path(&self, id: &str, path: &str) -> DaemonResult<PathStat>;
    async fn container_copy_to(&self, id: &str, path: &str, archive: Bytes) -> DaemonResult<()>;
    async fn container_copy_from(&self, id: &str, path: &str)
        -> DaemonResult<DaemonStream<Bytes>>;
    async fn exec_create(&self, id: &str, spec: ExecSpec) -> DaemonResult<String>;
    async fn exec_start(&self, exec_id: &str) -> DaemonResult<AttachedIo>;

    // volumes
    async fn volume_create(&self, spec: VolumeCreateSpec) -> DaemonResult<Volume>;
    async fn volume_inspect(&self, name: &str) -> DaemonResult<Volume>;
    async fn volume_remove(&self, name: &str, force: bool) -> DaemonResult<()>;
    async fn volume_list(&self, filters: &Filters) -> DaemonResult<Vec<Volume>>;
    async fn volume_prune(&self, filters: &Filters) -> DaemonResult<VolumePruneResponse>;

    // networks
    async fn network_create(&self, spec: NetworkCreateSpec) -> DaemonResult<NetworkCreateResponse>;
    async fn network_inspect(&self, name: &str) -> DaemonResult<Network>;
    async fn network_remove(&self, name: &str) -> DaemonResult<()>;
    async fn network_connect(&self, network: &str, container: &str) -> DaemonResult<()>;
    async fn network_disconnect(
        &self,
        network: &str,
        container: &str,
        force: bool,
    ) -> DaemonResult<()>;
    async fn network_list(&self, filters: &Filters) -> DaemonResult<Vec<Network>>;
    async fn network_prune(&self, filters: &Filters) -> DaemonResult<NetworkPruneResponse>;

    // images
    async fn image_inspect(&self, name: &str) -> DaemonResult<ImageInspect>;
    async fn image_remove(
        &self,
        name: &str,
        force: bool,
    ) -> DaemonResult<Vec<ImageDeleteResponseItem>>;
    async fn image_tag(&self, name: &str, repo: &str, tag: &str) -> DaemonResult<()>;
    async fn image_list(&self, all: bool, filters: &Filters) -> DaemonResult<Vec<ImageSummary>>;
    async fn image_prune(&self, filters: &Filters) -> DaemonResult<ImagePruneResponse>;
    async fn image_build_legacy(
        &self,
        spec: LegacyBuildSpec,
        context: Bytes,
    ) -> DaemonResult<DaemonStream<LegacyBuildMessage>>;
}

/// A daemon "not found" answer, which the managed jail folds into its own
/// not-found errors.
#[must_use]
pub fn is_not_found(e: &DaemonError) -> bool {
    matches!(e, DaemonError::DockerResponseServerError { status_code: 404, .. })
}

/// A daemon 409, meaning the resource is still in use.
#[must_use]
pub fn is_in_use(e: &DaemonError) -> bool {
    matches!(e, DaemonError::DockerResponseServerError { status_code: 409, .. })
}
