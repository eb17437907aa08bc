//! The production daemon client, a thin mapping onto [`bollard::Docker`].
//!
//! Nothing here filters, labels, or second-guesses: policy lives in the
//! engine. Each method is the corresponding daemon API call, verbatim.

use std::{
    io,
    time::{Duration, UNIX_EPOCH},
};

use async_trait::async_trait;
use bollard::{
    exec::StartExecResults,
    models::{
        ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse,
        ContainerPruneResponse, ContainerStatsResponse, ContainerSummary, ContainerTopResponse,
        ContainerUpdateBody, ContainerWaitResponse, ExecConfig, ImageDeleteResponseItem,
        ImageInspect, ImagePruneResponse, ImageSummary, Network, NetworkConnectRequest,
        NetworkCreateRequest, NetworkCreateResponse, NetworkDisconnectRequest,
        NetworkPruneResponse, Volume, VolumeCreateRequest, VolumePruneResponse,
    },
    query_parameters::{
        AttachContainerOptions, BuildImageOptions, BuilderVersion, CreateContainerOptions,
        DownloadFromContainerOptions, InspectContainerOptions, InspectNetworkOptions,
        KillContainerOptions, ListContainersOptions, ListImagesOptionsBuilder,
        ListNetworksOptions, ListVolumesOptions, LogsOptions, PruneContainersOptions,
        PruneImagesOptions, PruneNetworksOptions, PruneVolumesOptions, RemoveContainerOptions,
        RemoveImageOptionsBuilder, RemoveVolumeOptions, RenameContainerOptions,
        ResizeContainerTTYOptions, RestartContainerOptions, StartContainerOptions, StatsOptions,
        StopContainerOptions, TagImageOptions, TopOptions, UploadToContainerOptions,
        WaitContainerOptions,
    },
    Docker,
};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{Either, Full};
use log::debug;

use crate::{
    daemon::{
        AttachSpec, AttachedIo, Daemon, DaemonError, DaemonPing, DaemonResult, DaemonStream,
        ExecSpec, LegacyBuildMessage, LegacyBuildSpec, LogsSpec, NetworkCreateSpec, PathStat,
        RemoveContainerSpec, VolumeCreateSpec,
    },
    error::{Error, Result},
    filters::Filters,
    labels,
};

/// The one production [`Daemon`].
pub struct MobyDaemon {
    docker: Docker,
}

impl MobyDaemon {
    /// Connects to the process-wide daemon socket (honoring `DOCKER_HOST`).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::docker_not_running("no daemon socket").with_cause(e))?;
        Ok(Self::from_docker(docker))
    }

    #[must_use]
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// The underlying handle, for wiring up the BuildKit driver.
    #[must_use]
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

fn query(filters: &Filters) -> std::collections::HashMap<String, Vec<String>> {
    filters.to_query()
}

#[async_trait]
impl Daemon for MobyDaemon {
    async fn ping(&self) -> DaemonResult<DaemonPing> {
        let version = self.docker.version().await?;
        Ok(DaemonPing {
            // The version endpoint does not advertise the builder generation;
            // detection falls back to the OS rule.
            builder_version: None,
            os_type: version.os.unwrap_or_default(),
        })
    }

    async fn container_create(
        &self,
        name: Option<&str>,
        body: ContainerCreateBody,
    ) -> DaemonResult<ContainerCreateResponse> {
        let options =
            CreateContainerOptions { name: name.map(str::to_owned), ..Default::default() };
        self.docker.create_container(Some(options), body).await
    }

    async fn container_start(&self, id: &str) -> DaemonResult<()> {
        self.docker.start_container(id, None::<StartContainerOptions>).await
    }

    async fn container_stop(&self, id: &str, timeout: Option<i32>) -> DaemonResult<()> {
        let options = StopContainerOptions { t: timeout, ..Default::default() };
        self.docker.stop_container(id, Some(options)).await
    }

    async fn container_kill(&self, id: &str, signal: Option<&str>) -> DaemonResult<()> {
        let mut options = KillContainerOptions::default();
        if let Some(signal) = signal {
            options.signal = signal.to_owned();
        }
        self.docker.kill_container(id, Some(options)).await
    }

    async fn container_pause(&self, id: &str) -> DaemonResult<()> {
        self.docker.pause_container(id).await
    }

    async fn container_unpause(&self, id: &str) -> DaemonResult<()> {
        self.docker.unpause_container(id).await
    }

    async fn container_restart(&self, id: &str, timeout: Option<i32>) -> DaemonResult<()> {
        let options = RestartContainerOptions { t: timeout, ..Default::default() };
        self.docker.restart_container(id, Some(options)).await
    }

    async fn container_rename(&self, id: &str, new_name: &str) -> DaemonResult<()> {
        let options = RenameContainerOptions { name: new_name.to_owned(), ..Default::default() };
        self.docker.rename_container(id, options).await
    }

    async fn container_resize(&self, id: &str, width: u16, height: u16) -> DaemonResult<()> {
        let options = ResizeContainerTTYOptions {
            w: i32::from(width),
            h: i32::from(height),
            ..Default::default()
        };
        self.docker.resize_container_tty(id, options).await
    }

    async fn container_remove(&self, id: &str, spec: RemoveContainerSpec) -> DaemonResult<()> {
        let options = RemoveContainerOptions {
            force: spec.force,
            v: spec.volumes,
            link: spec.link,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await
    }

    async fn container_inspect(&self, id: &str) -> DaemonResult<ContainerInspectResponse> {
        self.docker.inspect_container(id, None::<InspectContainerOptions>).await
    }

    async fn container_wait(
        &self,
        id: &str,
    ) -> DaemonResult<DaemonStream<ContainerWaitResponse>> {
        Ok(self.docker.wait_container(id, None::<WaitContainerOptions>).boxed())
    }

    async fn container_logs(
        &self,
        id: &str,
        spec: LogsSpec,
    ) -> DaemonResult<DaemonStream<Bytes>> {
        let options = LogsOptions {
            follow: spec.follow,
            stdout: spec.stdout,
            stderr: spec.stderr,
            timestamps: spec.timestamps,
            tail: spec.tail.map(|n| n.to_string()).unwrap_or_else(|| "all".to_owned()),
            since: i32::try_from(spec.since.unwrap_or_default()).unwrap_or(i32::MAX),
            ..Default::default()
        };
        Ok(self
            .docker
            .logs(id, Some(options))
            .map(|chunk| chunk.map(|log| log.into_bytes()))
            .boxed())
    }

    async fn container_attach(&self, id: &str, spec: AttachSpec) -> DaemonResult<AttachedIo> {
        let options = AttachContainerOptions {
            stream: true,
            stdin: spec.stdin,
            stdout: spec.stdout,
            stderr: spec.stderr,
            logs: spec.logs,
            ..Default::default()
        };
        let results = self.docker.attach_container(id, Some(options)).await?;
        Ok(AttachedIo {
            output: results.output.map(|chunk| chunk.map(|log| log.into_bytes())).boxed(),
            input: results.input,
        })
    }

    async fn container_top(
        &self,
        id: &str,
        ps_args: Option<&str>,
    ) -> DaemonResult<ContainerTopResponse> {
        let mut options = TopOptions::default();
        if let Some(ps_args) = ps_args {
            options.ps_args = ps_args.to_owned();
        }
        self.docker.top_processes(id, Some(options)).await
    }

    async fn container_stats(
        &self,
        id: &str,
        one_shot: bool,
    ) -> DaemonResult<DaemonStream<ContainerStatsResponse>> {
        let options =
            StatsOptions { stream: !one_shot, one_shot, ..Default::default() };
        Ok(self.docker.stats(id, Some(options)).boxed())
    }

    async fn container_update(&self, id: &str, update: ContainerUpdateBody) -> DaemonResult<()> {
        self.docker.update_container(id, update).await?;
        Ok(())
    }

    async fn container_list(
        &self,
        all: bool,
        filters: &Filters,
    ) -> DaemonResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions {
            all,
            filters: Some(query(filters)),
            ..Default::default()
        };
        self.docker.list_containers(Some(options)).await
    }

    async fn container_prune(&self, filters: &Filters) -> DaemonResult<ContainerPruneResponse> {
        let options = PruneContainersOptions { filters: Some(query(filters)), ..Default::default() };
        self.docker.prune_containers(Some(options)).await
    }

    async fn container_stat_path(&self, id: &str, path: &str) -> DaemonResult<PathStat> {
        // The daemon answers an archive request; only the first tar header is
        // needed for a stat.
        let options = DownloadFromContainerOptions { path: path.to_owned(), ..Default::default() };
        let mut stream = self.docker.download_from_container(id, Some(options));
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
            if buf.len() >= 2048 {
                break;
            }
        }
        drop(stream);

        let mut archive = tar::Archive::new(io::Cursor::new(buf));
        let entry = archive
            .entries()
            .and_then(|mut entries| {
                entries.next().unwrap_or_else(|| {
                    Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty archive"))
                })
            })
            .map_err(DaemonError::from)?;
        let header = entry.header();
        Ok(PathStat {
            name: entry.path().map_err(DaemonError::from)?.display().to_string(),
            size: header.size().map_err(DaemonError::from)?,
            mode: header.mode().map_err(DaemonError::from)?,
            modified: header
                .mtime()
                .ok()
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
            link_target: entry
                .link_name()
                .map_err(DaemonError::from)?
                .map(|p| p.display().to_string()),
        })
    }

    async fn container_copy_to(&self, id: &str, path: &str, archive: Bytes) -> DaemonResult<()> {
        let options = UploadToContainerOptions { path: path.to_owned(), ..Default::default() };
        let body: Either<Full<Bytes>, _> = Either::Left(Full::new(archive));
        self.docker.upload_to_container(id, Some(options), body).await
    }

    async fn container_copy_from(
        &self,
        id: &str,
        path: &str,
    ) -> DaemonResult<DaemonStream<Bytes>> {
        let options = DownloadFromContainerOptions { path: path.to_owned(), ..Default::default() };
        Ok(self.docker.download_from_container(id, Some(options)).boxed())
    }

    async fn exec_create(&self, id: &str, spec: ExecSpec) -> DaemonResult<String> {
        let config = ExecConfig {
            cmd: Some(spec.cmd),
            env: Some(spec.env),
            working_dir: spec.working_dir,
            user: spec.user,
            tty: Some(spec.tty),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            ..Default::default()
        };
        let created = self.docker.create_exec(id, config).await?;
        Ok(created.id)
    }

    async fn exec_start(&self, exec_id: &str) -> DaemonResult<AttachedIo> {
        match self.docker.start_exec(exec_id, None).await? {
            StartExecResults::Attached { output, input } => Ok(AttachedIo {
                output: output.map(|chunk| chunk.map(|log| log.into_bytes())).boxed(),
                input,
            }),
            StartExecResults::Detached => Ok(AttachedIo {
                output: futures::stream::empty().boxed(),
                input: Box::pin(tokio::io::sink()),
            }),
        }
    }

    async fn volume_create(&self, spec: VolumeCreateSpec) -> DaemonResult<Volume> {
        let options = VolumeCreateRequest {
            name: Some(spec.name),
            driver: spec.driver,
            driver_opts: Some(spec.driver_opts),
            labels: Some(labels::to_daemon(&spec.labels)),
            ..Default::default()
        };
        self.docker.create_volume(options).await
    }

    async fn volume_inspect(&self, name: &str) -> DaemonResult<Volume> {
        self.docker.inspect_volume(name).await
    }

    async fn volume_remove(&self, name: &str, force: bool) -> DaemonResult<()> {
        let options = RemoveVolumeOptions { force, ..Default::default() };
        self.docker.remove_volume(name, Some(options)).await
    }

    async fn volume_list(&self, filters: &Filters) -> DaemonResult<Vec<Volume>> {
        let options = ListVolumesOptions { filters: Some(query(filters)), ..Default::default() };
        let response = self.docker.list_volumes(Some(options)).await?;
        Ok(response.volumes.unwrap_or_default())
    }

    async fn volume_prune(&self, filters: &Filters) -> DaemonResult<VolumePruneResponse> {
        let options = PruneVolumesOptions { filters: Some(query(filters)), ..Default::default() };
        self.docker.prune_volumes(Some(options)).await
    }

    async fn network_create(
        &self,
        spec: NetworkCreateSpec,
    ) -> DaemonResult<NetworkCreateResponse> {
        let request = NetworkCreateRequest {
            name: spec.name,
            driver: spec.driver,
            internal: Some(spec.internal),
            attachable: Some(spec.attachable),
            options: Some(spec.options),
            labels: Some(labels::to_daemon(&spec.labels)),
            ..Default::default()
        };
        self.docker.create_network(request).await
    }

    async fn network_inspect(&self, name: &str) -> DaemonResult<Network> {
        let inspect = self.docker.inspect_network(name, None::<InspectNetworkOptions>).await?;
        Ok(Network {
            name: inspect.name,
            id: inspect.id,
            created: inspect.created,
            scope: inspect.scope,
            driver: inspect.driver,
            enable_ipv4: inspect.enable_ipv4,
            enable_ipv6: inspect.enable_ipv6,
            ipam: inspect.ipam,
            internal: inspect.internal,
            attachable: inspect.attachable,
            ingress: inspect.ingress,
            config_from: inspect.config_from,
            config_only: inspect.config_only,
            options: inspect.options,
            labels: inspect.labels,
            peers: inspect.peers,
        })
    }

    async fn network_remove(&self, name: &str) -> DaemonResult<()> {
        self.docker.remove_network(name).await
    }

    async fn network_connect(&self, network: &str, container: &str) -> DaemonResult<()> {
        let request = NetworkConnectRequest { container: container.to_owned(), ..Default::default() };
        self.docker.connect_network(network, request).await
    }

    async fn network_disconnect(
        &self,
        network: &str,
        container: &str,
        force: bool,
    ) -> DaemonResult<()> {
        let request = NetworkDisconnectRequest { container: container.to_owned(), force: Some(force) };
        self.docker.disconnect_network(network, request).await
    }

    async fn network_list(&self, filters: &Filters) -> DaemonResult<Vec<Network>> {
        let options = ListNetworksOptions { filters: Some(query(filters)), ..Default::default() };
        self.docker.list_networks(Some(options)).await
    }

    async fn network_prune(&self, filters: &Filters) -> DaemonResult<NetworkPruneResponse> {
        let options = PruneNetworksOptions { filters: Some(query(filters)), ..Default::default() };
        self.docker.prune_networks(Some(options)).await
    }

    async fn image_inspect(&self, name: &str) -> DaemonResult<ImageInspect> {
        self.docker.inspect_image(name).await
    }

    async fn image_remove(
        &self,
        name: &str,
        force: bool,
    ) -> DaemonResult<Vec<ImageDeleteResponseItem>> {
        let options = RemoveImageOptionsBuilder::new().force(force).build();
        self.docker.remove_image(name, Some(options), None).await
    }

    async fn image_tag(&self, name: &str, repo: &str, tag: &str) -> DaemonResult<()> {
        let options = TagImageOptions {
            repo: Some(repo.to_owned()),
            tag: Some(tag.to_owned()),
            ..Default::default()
        };
        self.docker.tag_image(name, Some(options)).await
    }

    async fn image_list(&self, all: bool, filters: &Filters) -> DaemonResult<Vec<ImageSummary>> {
        let options = ListImagesOptionsBuilder::new().all(all).filters(&query(filters)).build();
        self.docker.list_images(Some(options)).await
    }

    async fn image_prune(&self, filters: &Filters) -> DaemonResult<ImagePruneResponse> {
        let options = PruneImagesOptions { filters: Some(query(filters)), ..Default::default() };
        self.docker.prune_images(Some(options)).await
    }

    async fn image_build_legacy(
        &self,
        spec: LegacyBuildSpec,
        context: Bytes,
    ) -> DaemonResult<DaemonStream<LegacyBuildMessage>> {
        let mut tags = spec.tags.iter();
        let first = tags.next().cloned();
        if tags.len() > 0 {
            debug!("legacy build keeps only the first tag; {} dropped", tags.len());
        }
        let options = BuildImageOptions {
            t: first,
            dockerfile: spec.dockerfile,
            buildargs: Some(spec.build_args),
            labels: Some(labels::to_daemon(&spec.labels)),
            nocache: spec.no_cache,
            target: spec.target,
            pull: Some(spec.pull.to_string()),
            networkmode: (!spec.network_mode.is_empty()).then_some(spec.network_mode),
            rm: true,
            version: BuilderVersion::BuilderV1,
            ..Default::default()
        };
        let body: Either<Full<Bytes>, _> = Either::Left(Full::new(context));
        Ok(self
            .docker
            .build_image(options, None, Some(body))
            .map(|message| {
                message.map(|info| LegacyBuildMessage {
                    stream: info.stream,
                    error: info.error_detail.and_then(|detail| detail.message),
                })
            })
            .boxed())
    }
}
