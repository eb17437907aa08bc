//! One daemon double for the whole engine test suite: canned resources,
//! per-method call counts, last-seen arguments.

use std::{
    collections::BTreeMap,
    sync::Mutex,
};

use async_trait::async_trait;
use bollard::models::{
    ContainerConfig, ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse,
    ContainerPruneResponse, ContainerStatsResponse, ContainerSummary, ContainerTopResponse,
    ContainerUpdateBody, ContainerWaitResponse, ImageDeleteResponseItem, ImageInspect,
    ImagePruneResponse, ImageSummary, Network, NetworkCreateResponse, NetworkPruneResponse,
    Volume, VolumePruneResponse,
};
use bytes::Bytes;
use futures::stream;

use crate::{
    daemon::{
        AttachSpec, AttachedIo, Daemon, DaemonError, DaemonPing, DaemonResult, DaemonStream,
        ExecSpec, LegacyBuildMessage, LegacyBuildSpec, LogsSpec, PathStat, RemoveContainerSpec,
        VolumeCreateSpec, NetworkCreateSpec,
    },
    filters::Filters,
    labels::{self, Labels},
};

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    labels: Labels,
}

#[derive(Default)]
pub(crate) struct FakeDaemon {
    calls: Mutex<Vec<&'static str>>,
    ping: Mutex<DaemonPing>,
    containers: Mutex<BTreeMap<String, FakeContainer>>,
    volumes: Mutex<BTreeMap<String, Labels>>,
    networks: Mutex<BTreeMap<String, Labels>>,
    images: Mutex<BTreeMap<String, Labels>>,
    last_filters: Mutex<Option<Filters>>,
    last_container_body: Mutex<Option<ContainerCreateBody>>,
    last_remove_spec: Mutex<Option<RemoveContainerSpec>>,
    last_volume_spec: Mutex<Option<VolumeCreateSpec>>,
    last_network_spec: Mutex<Option<NetworkCreateSpec>>,
    last_legacy_build: Mutex<Option<LegacyBuildSpec>>,
    fail_message: Mutex<Option<String>>,
}

impl FakeDaemon {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_ping(&self, builder_version: Option<&str>, os_type: &str) {
        *self.ping.lock().unwrap() = DaemonPing {
            builder_version: builder_version.map(str::to_owned),
            os_type: os_type.to_owned(),
        };
    }

    pub(crate) fn add_container(&self, id: &str, labels: &Labels) {
        self.add_container_with_name(id, id, labels);
    }

    pub(crate) fn add_container_with_name(&self, id: &str, name: &str, labels: &Labels) {
        self.containers.lock().unwrap().insert(
            id.to_owned(),
            FakeContainer { name: name.to_owned(), labels: labels.clone() },
        );
    }

    pub(crate) fn add_volume(&self, name: &str, labels: &Labels) {
        self.volumes.lock().unwrap().insert(name.to_owned(), labels.clone());
    }

    pub(crate) fn add_network(&self, name: &str, labels: &Labels) {
        self.networks.lock().unwrap().insert(name.to_owned(), labels.clone());
    }

    pub(crate) fn add_image(&self, name: &str, labels: &Labels) {
        self.images.lock().unwrap().insert(name.to_owned(), labels.clone());
    }

    /// Makes the next forwarded (non-inspect) call fail with a 500.
    pub(crate) fn fail_next(&self, message: &str) {
        *self.fail_message.lock().unwrap() = Some(message.to_owned());
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| **m == method).count()
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn last_filters(&self) -> Option<Filters> {
        self.last_filters.lock().unwrap().clone()
    }

    pub(crate) fn last_container_body(&self) -> Option<ContainerCreateBody> {
        self.last_container_body.lock().unwrap().clone()
    }

    pub(crate) fn last_remove_spec(&self) -> Option<RemoveContainerSpec> {
        *self.last_remove_spec.lock().unwrap()
    }

    pub(crate) fn last_volume_spec(&self) -> Option<VolumeCreateSpec> {
        self.last_volume_spec.lock().unwrap().clone()
    }

    pub(crate) fn last_network_spec(&self) -> Option<NetworkCreateSpec> {
        self.last_network_spec.lock().unwrap().clone()
    }

    pub(crate) fn last_legacy_build(&self) -> Option<LegacyBuildSpec> {
        self.last_legacy_build.lock().unwrap().clone()
    }

    fn called(&self, method: &'static str) -> DaemonResult<()> {
        self.calls.lock().unwrap().push(method);
        if method != "container_inspect" {
            if let Some(message) = self.fail_message.lock().unwrap().take() {
                return Err(server_error(500, &message));
            }
        }
        Ok(())
    }

    fn record_filters(&self, filters: &Filters) {
        *self.last_filters.lock().unwrap() = Some(filters.clone());
    }

    fn matches(&self, filters: &Filters, id: &str, name: &str, labels: &Labels) -> bool {
        filters.category("label").iter().all(|pair| {
            pair.split_once('=')
                .is_some_and(|(k, v)| labels.get(k).is_some_and(|have| have == v))
        }) && filters.category("name").iter().all(|pattern| {
            pattern.trim_start_matches("^/").trim_end_matches('$') == name
        }) && filters.category("id").iter().all(|wanted| *wanted == id)
    }
}

fn server_error(status_code: u16, message: &str) -> DaemonError {
    DaemonError::DockerResponseServerError { status_code, message: message.to_owned() }
}

fn not_found(what: &str) -> DaemonError {
    server_error(404, &format!("no such {what}"))
}

fn empty_io() -> AttachedIo {
    AttachedIo { output: Box::pin(stream::empty()), input: Box::pin(tokio::io::sink()) }
}

#[async_trait]
impl Daemon for FakeDaemon {
    async fn ping(&self) -> DaemonResult<DaemonPing> {
        self.called("ping")?;
        Ok(self.ping.lock().unwrap().clone())
    }

    async fn container_create(
        &self,
        name: Option<&str>,
        body: ContainerCreateBody,
    ) -> DaemonResult<ContainerCreateResponse> {
        self.called("container_create")?;
        let id = name.unwrap_or("generated").to_owned();
        let labels =
            body.labels.as_ref().map(|l| labels::from_daemon(l)).unwrap_or_default();
        *self.last_container_body.lock().unwrap() = Some(body);
        self.add_container(&id, &labels);
        Ok(ContainerCreateResponse { id, warnings: vec![] })
    }

    async fn container_start(&self, id: &str) -> DaemonResult<()> {
        self.called("container_start")?;
        self.require_container(id)
    }

    async fn container_stop(&self, id: &str, _timeout: Option<i32>) -> DaemonResult<()> {
        self.called("container_stop")?;
        self.require_container(id)
    }

    async fn container_kill(&self, id: &str, _signal: Option<&str>) -> DaemonResult<()> {
        self.called("container_kill")?;
        self.require_container(id)
    }

    async fn container_pause(&self, id: &str) -> DaemonResult<()> {
        self.called("container_pause")?;
        self.require_container(id)
    }

    async fn container_unpause(&self, id: &str) -> DaemonResult<()> {
        self.called("container_unpause")?;
        self.require_container(id)
    }

    async fn container_restart(&self, id: &str, _timeout: Option<i32>) -> DaemonResult<()> {
        self.called("container_restart")?;
        self.require_container(id)
    }

    async fn container_rename(&self, id: &str, new_name: &str) -> DaemonResult<()> {
        self.called("container_rename")?;
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(id) {
            Some(container) => {
                container.name = new_name.to_owned();
                Ok(())
            }
            None => Err(not_found("container")),
        }
    }

    async fn container_resize(&self, id: &str, _width: u16, _height: u16) -> DaemonResult<()> {
        self.called("container_resize")?;
        self.require_container(id)
    }

    async fn container_remove(&self, id: &str, spec: RemoveContainerSpec) -> DaemonResult<()> {
        self.called("container_remove")?;
        *self.last_remove_spec.lock().unwrap() = Some(spec);
        match self.containers.lock().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(not_found("container")),
        }
    }

    async fn container_inspect(&self, id: &str) -> DaemonResult<ContainerInspectResponse> {
        self.called("container_inspect")?;
        let containers = self.containers.lock().unwrap();
        let Some(container) = containers.get(id) else {
            return Err(not_found("container"));
        };
        Ok(ContainerInspectResponse {
            id: Some(id.to_owned()),
            name: Some(format!("/{}", container.name)),
            config: Some(ContainerConfig {
                labels: Some(labels::to_daemon(&container.labels)),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn container_wait(
        &self,
        id: &str,
    ) -> DaemonResult<DaemonStream<ContainerWaitResponse>> {
        self.called("container_wait")?;
        self.require_container(id)?;
        Ok(Box::pin(stream::iter(vec![Ok(ContainerWaitResponse {
            status_code: 0,
            error: None,
        })])))
    }

    async fn container_logs(
        &self,
        id: &str,
        _spec: LogsSpec,
    ) -> DaemonResult<DaemonStream<Bytes>> {
        self.called("container_logs")?;
        self.require_container(id)?;
        Ok(Box::pin(stream::iter(vec![Ok(Bytes::from_static(b"hello from the fake\n"))])))
    }

    async fn container_attach(&self, id: &str, _spec: AttachSpec) -> DaemonResult<AttachedIo> {
        self.called("container_attach")?;
        self.require_container(id)?;
        Ok(empty_io())
    }

    async fn container_top(
        &self,
        id: &str,
        _ps_args: Option<&str>,
    ) -> DaemonResult<ContainerTopResponse> {
        self.called("container_top")?;
        self.require_container(id)?;
        Ok(ContainerTopResponse::default())
    }

    async fn container_stats(
        &self,
        id: &str,
        _one_shot: bool,
    ) -> DaemonResult<DaemonStream<ContainerStatsResponse>> {
        self.called("container_stats")?;
        self.require_container(id)?;
        Ok(Box::pin(stream::iter(vec![Ok(ContainerStatsResponse::default())])))
    }

    async fn container_update(
        &self,
        id: &str,
        _update: ContainerUpdateBody,
    ) -> DaemonResult<()> {
        self.called("container_update")?;
        self.require_container(id)
    }

    async fn container_list(
        &self,
        _all: bool,
        filters: &Filters,
    ) -> DaemonResult<Vec<ContainerSummary>> {
        self.called("container_list")?;
        self.record_filters(filters);
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|(id, c)| self.matches(filters, id, &c.name, &c.labels))
            .map(|(id, c)| ContainerSummary {
                id: Some(id.clone()),
                names: Some(vec![format!("/{}", c.name)]),
                labels: Some(labels::to_daemon(&c.labels)),
                ..Default::default()
            })
            .collect())
    }

    async fn container_prune(&self, filters: &Filters) -> DaemonResult<ContainerPruneResponse> {
        self.called("container_prune")?;
        self.record_filters(filters);
        Ok(ContainerPruneResponse::default())
    }

    async fn container_stat_path(&self, id: &str, path: &str) -> DaemonResult<PathStat> {
        self.called("container_stat_path")?;
        self.require_container(id)?;
        Ok(PathStat { name: path.to_owned(), ..Default::default() })
    }

    async fn container_copy_to(
        &self,
        id: &str,
        _path: &str,
        _archive: Bytes,
    ) -> DaemonResult<()> {
        self.called("container_copy_to")?;
        self.require_container(id)
    }

    async fn container_copy_from(
        &self,
        id: &str,
        _path: &str,
    ) -> DaemonResult<DaemonStream<Bytes>> {
        self.called("container_copy_from")?;
        self.require_container(id)?;
        Ok(Box::pin(stream::iter(vec![Ok(Bytes::from_static(b"tar bytes"))])))
    }

    async fn exec_create(&self, id: &str, _spec: ExecSpec) -> DaemonResult<String> {
        self.called("exec_create")?;
        self.require_container(id)?;
        Ok(format!("exec-{id}"))
    }

    async fn exec_start(&self, _exec_id: &str) -> DaemonResult<AttachedIo> {
        self.called("exec_start")?;
        Ok(empty_io())
    }

    async fn volume_create(&self, spec: VolumeCreateSpec) -> DaemonResult<Volume> {
        self.called("volume_create")?;
        let volume = Volume {
            name: spec.name.clone(),
            labels: labels::to_daemon(&spec.labels),
            ..Default::default()
        };
        self.add_volume(&spec.name, &spec.labels);
        *self.last_volume_spec.lock().unwrap() = Some(spec);
        Ok(volume)
    }

    async fn volume_inspect(&self, name: &str) -> DaemonResult<Volume> {
        self.called("volume_inspect")?;
        let volumes = self.volumes.lock().unwrap();
        let Some(labels) = volumes.get(name) else {
            return Err(not_found("volume"));
        };
        Ok(Volume {
            name: name.to_owned(),
            labels: labels::to_daemon(labels),
            ..Default::default()
        })
    }

    async fn volume_remove(&self, name: &str, _force: bool) -> DaemonResult<()> {
        self.called("volume_remove")?;
        match self.volumes.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(not_found("volume")),
        }
    }

    async fn volume_list(&self, filters: &Filters) -> DaemonResult<Vec<Volume>> {
        self.called("volume_list")?;
        self.record_filters(filters);
        let volumes = self.volumes.lock().unwrap();
        Ok(volumes
            .iter()
            .filter(|(name, labels)| self.matches(filters, name, name, labels))
            .map(|(name, labels)| Volume {
                name: name.clone(),
                labels: labels::to_daemon(labels),
                ..Default::default()
            })
            .collect())
    }

    async fn volume_prune(&self, filters: &Filters) -> DaemonResult<VolumePruneResponse> {
        self.called("volume_prune")?;
        self.record_filters(filters);
        Ok(VolumePruneResponse::default())
    }

    async fn network_create(
        &self,
        spec: NetworkCreateSpec,
    ) -> DaemonResult<NetworkCreateResponse> {
        self.called("network_create")?;
        self.add_network(&spec.name, &spec.labels);
        let id = format!("net-{}", spec.name);
        *self.last_network_spec.lock().unwrap() = Some(spec);
        Ok(NetworkCreateResponse { id: Some(id), ..Default::default() })
    }

    async fn network_inspect(&self, name: &str) -> DaemonResult<Network> {
        self.called("network_inspect")?;
        let networks = self.networks.lock().unwrap();
        let Some(labels) = networks.get(name) else {
            return Err(not_found("network"));
        };
        Ok(Network {
            name: Some(name.to_owned()),
            labels: Some(labels::to_daemon(labels)),
            ..Default::default()
        })
    }

    async fn network_remove(&self, name: &str) -> DaemonResult<()> {
        self.called("network_remove")?;
        match self.networks.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(not_found("network")),
        }
    }

    async fn network_connect(&self, network: &str, _container: &str) -> DaemonResult<()> {
        self.called("network_connect")?;
        self.require_network(network)
    }

    async fn network_disconnect(
        &self,
        network: &str,
        _container: &str,
        _force: bool,
    ) -> DaemonResult<()> {
        self.called("network_disconnect")?;
        self.require_network(network)
    }

    async fn network_list(&self, filters: &Filters) -> DaemonResult<Vec<Network>> {
        self.called("network_list")?;
        self.record_filters(filters);
        let networks = self.networks.lock().unwrap();
        Ok(networks
            .iter()
            .filter(|(name, labels)| self.matches(filters, name, name, labels))
            .map(|(name, labels)| Network {
                name: Some(name.clone()),
                labels: Some(labels::to_daemon(labels)),
                ..Default::default()
            })
            .collect())
    }

    async fn network_prune(&self, filters: &Filters) -> DaemonResult<NetworkPruneResponse> {
        self.called("network_prune")?;
        self.record_filters(filters);
        Ok(NetworkPruneResponse::default())
    }

    async fn image_inspect(&self, name: &str) -> DaemonResult<ImageInspect> {
        self.called("image_inspect")?;
        let images = self.images.lock().unwrap();
        let Some(labels) = images.get(name) else {
            return Err(not_found("image"));
        };
        Ok(ImageInspect {
            id: Some(name.to_owned()),
            config: Some(bollard::models::ImageConfig {
                labels: Some(labels::to_daemon(labels)),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    async fn image_remove(
        &self,
        name: &str,
        _force: bool,
    ) -> DaemonResult<Vec<ImageDeleteResponseItem>> {
        self.called("image_remove")?;
        match self.images.lock().unwrap().remove(name) {
            Some(_) => Ok(vec![ImageDeleteResponseItem {
                deleted: Some(name.to_owned()),
                untagged: None,
            }]),
            None => Err(not_found("image")),
        }
    }

    async fn image_tag(&self, name: &str, _repo: &str, _tag: &str) -> DaemonResult<()> {
        self.called("image_tag")?;
        if self.images.lock().unwrap().contains_key(name) {
            Ok(())
        } else {
            Err(not_found("image"))
        }
    }

    async fn image_list(&self, _all: bool, filters: &Filters) -> DaemonResult<Vec<ImageSummary>> {
        self.called("image_list")?;
        self.record_filters(filters);
        let images = self.images.lock().unwrap();
        Ok(images
            .iter()
            .filter(|(name, labels)| self.matches(filters, name, name, labels))
            .map(|(name, labels)| ImageSummary {
                id: name.clone(),
                labels: labels::to_daemon(labels),
                ..Default::default()
            })
            .collect())
    }

    async fn image_prune(&self, filters: &Filters) -> DaemonResult<ImagePruneResponse> {
        self.called("image_prune")?;
        self.record_filters(filters);
        Ok(ImagePruneResponse::default())
    }

    async fn image_build_legacy(
        &self,
        spec: LegacyBuildSpec,
        _context: Bytes,
    ) -> DaemonResult<DaemonStream<LegacyBuildMessage>> {
        self.called("image_build_legacy")?;
        *self.last_legacy_build.lock().unwrap() = Some(spec);
        Ok(Box::pin(stream::iter(vec![
            Ok(LegacyBuildMessage {
                stream: Some("Step 1/1 : FROM alpine\n".to_owned()),
                error: None,
            }),
            Ok(LegacyBuildMessage { stream: Some("Successfully built\n".to_owned()), error: None }),
        ])))
    }
}

impl FakeDaemon {
    fn require_container(&self, id: &str) -> DaemonResult<()> {
        if self.containers.lock().unwrap().contains_key(id) {
            Ok(())
        } else {
            Err(not_found("container"))
        }
    }

    fn require_network(&self, name: &str) -> DaemonResult<()> {
        if self.networks.lock().unwrap().contains_key(name) {
            Ok(())
        } else {
            Err(not_found("network"))
        }
    }
}
