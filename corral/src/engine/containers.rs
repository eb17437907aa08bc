//! Container operations, label-jailed.

use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse, ContainerPruneResponse,
    ContainerStatsResponse, ContainerSummary, ContainerTopResponse, ContainerUpdateBody,
    ContainerWaitResponse,
};
use bytes::Bytes;
use futures::StreamExt;
use log::debug;

use crate::{
    daemon::{
        is_in_use, is_not_found, AttachSpec, AttachedIo, DaemonStream, ExecSpec, LogsSpec,
        PathStat, RemoveContainerSpec,
    },
    engine::Engine,
    error::{Error, Result},
    filters::Filters,
    labels::{self, Labels},
};

impl Engine {
    /// Creates a container carrying the managed label, whatever the caller
    /// put in `body.labels`.
    pub async fn container_create(
        &self,
        name: Option<&str>,
        body: &ContainerCreateBody,
        extras: &[&Labels],
    ) -> Result<ContainerCreateResponse> {
        let mut body = body.clone();
        let caller = body.labels.as_ref().map(|l| labels::from_daemon(l)).unwrap_or_default();

        let mut maps: Vec<&Labels> = vec![&caller];
        maps.extend_from_slice(extras);
        let merged = self.assert_managed(self.config().labels.container_labels(&maps));
        body.labels = Some(labels::to_daemon(&merged));

        debug!("creating container (name: {name:?})");
        self.daemon()
            .container_create(name, body)
            .await
            .map_err(|e| Error::container_create_failed(name.unwrap_or("<unnamed>")).with_cause(e))
    }

    pub async fn container_start(&self, id: &str) -> Result<()> {
        self.require_managed_container(id).await?;
        debug!("starting container {id}");
        self.daemon()
            .container_start(id)
            .await
            .map_err(|e| Error::container_start_failed(id).with_cause(e))
    }

    pub async fn container_stop(&self, id: &str, timeout: Option<i32>) -> Result<()> {
        self.require_managed_container(id).await?;
        debug!("stopping container {id} (timeout: {timeout:?})");
        self.daemon()
            .container_stop(id, timeout)
            .await
            .map_err(|e| Error::container_stop_failed(id).with_cause(e))
    }

    pub async fn container_kill(&self, id: &str, signal: Option<&str>) -> Result<()> {
        self.require_managed_container(id).await?;
        debug!("killing container {id} (signal: {signal:?})");
        self.daemon()
            .container_kill(id, signal)
            .await
            .map_err(|e| Error::container_kill_failed(id).with_cause(e))
    }

    pub async fn container_pause(&self, id: &str) -> Result<()> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_pause(id)
            .await
            .map_err(|e| Error::container_pause_failed(id).with_cause(e))
    }

    pub async fn container_unpause(&self, id: &str) -> Result<()> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_unpause(id)
            .await
            .map_err(|e| Error::container_unpause_failed(id).with_cause(e))
    }

    pub async fn container_restart(&self, id: &str, timeout: Option<i32>) -> Result<()> {
        self.require_managed_container(id).await?;
        debug!("restarting container {id}");
        self.daemon()
            .container_restart(id, timeout)
            .await
            .map_err(|e| Error::container_restart_failed(id).with_cause(e))
    }

    pub async fn container_rename(&self, id: &str, new_name: &str) -> Result<()> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_rename(id, new_name)
            .await
            .map_err(|e| Error::container_rename_failed(id).with_cause(e))
    }

    pub async fn container_resize(&self, id: &str, width: u16, height: u16) -> Result<()> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_resize(id, width, height)
            .await
            .map_err(|e| Error::container_resize_failed(id).with_cause(e))
    }

    pub async fn container_remove(&self, id: &str, spec: RemoveContainerSpec) -> Result<()> {
        self.require_managed_container(id).await?;
        debug!("removing container {id} (force: {})", spec.force);
        self.daemon().container_remove(id, spec).await.map_err(|e| {
            if is_in_use(&e) {
                Error::container_in_use(id).with_cause(e)
            } else {
                Error::container_remove_failed(id).with_cause(e)
            }
        })
    }

    /// The managed check and the result are the same daemon call.
    pub async fn container_inspect(&self, id: &str) -> Result<ContainerInspectResponse> {
        self.require_managed_container(id).await
    }

    /// Resolves once the container exits. The managed check happens before
    /// any stream is returned; an unmanaged target fails synchronously.
    pub async fn container_wait(&self, id: &str) -> Result<DaemonStream<ContainerWaitResponse>> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_wait(id)
            .await
            .map_err(|e| Error::container_wait_failed(id).with_cause(e))
    }

    pub async fn container_logs(&self, id: &str, spec: LogsSpec) -> Result<DaemonStream<Bytes>> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_logs(id, spec)
            .await
            .map_err(|e| Error::container_logs_failed(id).with_cause(e))
    }

    pub async fn container_attach(&self, id: &str, spec: AttachSpec) -> Result<AttachedIo> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_attach(id, spec)
            .await
            .map_err(|e| Error::container_attach_failed(id).with_cause(e))
    }

    pub async fn container_top(
        &self,
        id: &str,
        ps_args: Option<&str>,
    ) -> Result<ContainerTopResponse> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_top(id, ps_args)
            .await
            .map_err(|e| Error::container_top_failed(id).with_cause(e))
    }

    /// Continuous stats stream for one managed container.
    pub async fn container_stats(
        &self,
        id: &str,
    ) -> Result<DaemonStream<ContainerStatsResponse>> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_stats(id, false)
            .await
            .map_err(|e| Error::container_stats_failed(id).with_cause(e))
    }

    pub async fn container_update(&self, id: &str, update: &ContainerUpdateBody) -> Result<()> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_update(id, update.clone())
            .await
            .map_err(|e| Error::container_update_failed(id).with_cause(e))
    }

    pub async fn container_exec_create(&self, id: &str, spec: &ExecSpec) -> Result<String> {
        self.require_managed_container(id).await?;
        debug!("creating exec in container {id}: {:?}", spec.cmd);
        self.daemon()
            .exec_create(id, spec.clone())
            .await
            .map_err(|e| Error::container_exec_failed(id).with_cause(e))
    }

    /// Attaches to an exec previously created through
    /// [`Engine::container_exec_create`].
    pub async fn exec_start(&self, exec_id: &str) -> Result<AttachedIo> {
        self.daemon()
            .exec_start(exec_id)
            .await
            .map_err(|e| Error::container_exec_failed(exec_id).with_cause(e))
    }

    pub async fn container_copy_to(&self, id: &str, path: &str, archive: Bytes) -> Result<()> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_copy_to(id, path, archive)
            .await
            .map_err(|e| Error::container_copy_to_failed(id).with_cause(e))
    }

    pub async fn container_copy_from(&self, id: &str, path: &str) -> Result<DaemonStream<Bytes>> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_copy_from(id, path)
            .await
            .map_err(|e| Error::container_copy_from_failed(id).with_cause(e))
    }

    pub async fn container_stat_path(&self, id: &str, path: &str) -> Result<PathStat> {
        self.require_managed_container(id).await?;
        self.daemon()
            .container_stat_path(id, path)
            .await
            .map_err(|e| Error::container_stat_path_failed(id).with_cause(e))
    }

    /// Lists managed containers; extra filters narrow further, never widen.
    pub async fn container_list(
        &self,
        all: bool,
        extra: &Filters,
    ) -> Result<Vec<ContainerSummary>> {
        let filters = self.scoped_filters(extra);
        self.daemon()
            .container_list(all, &filters)
            .await
            .map_err(|e| Error::container_list_failed().with_cause(e))
    }

    pub async fn containers_by_labels(
        &self,
        wanted: &Labels,
        all: bool,
    ) -> Result<Vec<ContainerSummary>> {
        self.container_list(all, &Filters::labels(wanted)).await
    }

    /// Exact-name lookup among managed containers.
    pub async fn container_find_by_name(&self, name: &str) -> Result<Option<ContainerSummary>> {
        let filters = Filters::new().with("name", &format!("^/{name}$"));
        Ok(self.container_list(true, &filters).await?.into_iter().next())
    }

    /// One stats sample. Scoped through the managed filter: the target must
    /// show up in a managed-filtered list before the daemon is asked.
    pub async fn container_stats_oneshot(&self, id: &str) -> Result<ContainerStatsResponse> {
        let filters = Filters::new().with("id", id);
        if self.container_list(true, &filters).await?.is_empty() {
            return Err(Error::container_not_found(id));
        }
        let mut stream = self
            .daemon()
            .container_stats(id, true)
            .await
            .map_err(|e| Error::container_stats_failed(id).with_cause(e))?;
        match stream.next().await {
            Some(Ok(stats)) => Ok(stats),
            Some(Err(e)) => Err(Error::container_stats_failed(id).with_cause(e)),
            None => Err(Error::container_stats_failed(id)),
        }
    }

    /// Prunes stopped managed containers only.
    pub async fn container_prune(&self, extra: &Filters) -> Result<ContainerPruneResponse> {
        let filters = self.scoped_filters(extra);
        debug!("pruning containers");
        self.daemon()
            .container_prune(&filters)
            .await
            .map_err(|e| Error::container_prune_failed().with_cause(e))
    }

    /// Inspects the target and refuses anything unmanaged. A missing
    /// container and an unmanaged one produce the same error.
    pub(crate) async fn require_managed_container(
        &self,
        id: &str,
    ) -> Result<ContainerInspectResponse> {
        let inspected = self.daemon().container_inspect(id).await.map_err(|e| {
            if is_not_found(&e) {
                Error::container_not_found(id)
            } else {
                Error::container_inspect_failed(id).with_cause(e)
            }
        })?;
        let managed = inspected
            .config
            .as_ref()
            .and_then(|c| c.labels.as_ref())
            .is_some_and(|l| self.is_managed(l));
        if !managed {
            return Err(Error::container_not_found(id));
        }
        Ok(inspected)
    }
}
