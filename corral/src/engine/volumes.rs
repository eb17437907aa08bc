//! Volume operations, label-jailed.

use bollard::models::{Volume, VolumePruneResponse};
use log::debug;

use crate::{
    daemon::{is_in_use, is_not_found, VolumeCreateSpec},
    engine::Engine,
    error::{Error, Result},
    filters::Filters,
    labels::Labels,
};

impl Engine {
    pub async fn volume_create(&self, spec: &VolumeCreateSpec, extras: &[&Labels]) -> Result<Volume> {
        let mut spec = spec.clone();
        let caller = spec.labels.clone();
        let mut maps: Vec<&Labels> = vec![&caller];
        maps.extend_from_slice(extras);
        spec.labels = self.assert_managed(self.config().labels.volume_labels(&maps));

        debug!("creating volume {:?}", spec.name);
        let name = spec.name.clone();
        self.daemon()
            .volume_create(spec)
            .await
            .map_err(|e| Error::volume_create_failed(&name).with_cause(e))
    }

    /// The managed check and the result are the same daemon call.
    pub async fn volume_inspect(&self, name: &str) -> Result<Volume> {
        self.require_managed_volume(name).await
    }

    pub async fn volume_remove(&self, name: &str, force: bool) -> Result<()> {
        self.require_managed_volume(name).await?;
        debug!("removing volume {name} (force: {force})");
        self.daemon().volume_remove(name, force).await.map_err(|e| {
            if is_in_use(&e) {
                Error::volume_in_use(name).with_cause(e)
            } else {
                Error::volume_remove_failed(name).with_cause(e)
            }
        })
    }

    pub async fn volume_list(&self, extra: &Filters) -> Result<Vec<Volume>> {
        let filters = self.scoped_filters(extra);
        self.daemon()
            .volume_list(&filters)
            .await
            .map_err(|e| Error::volume_list_failed().with_cause(e))
    }

    pub async fn volumes_by_labels(&self, wanted: &Labels) -> Result<Vec<Volume>> {
        self.volume_list(&Filters::labels(wanted)).await
    }

    pub async fn volume_find_by_name(&self, name: &str) -> Result<Option<Volume>> {
        let filters = Filters::new().with("name", name);
        Ok(self.volume_list(&filters).await?.into_iter().find(|v| v.name == name))
    }

    pub async fn volume_prune(&self, extra: &Filters) -> Result<VolumePruneResponse> {
        let filters = self.scoped_filters(extra);
        debug!("pruning volumes");
        self.daemon()
            .volume_prune(&filters)
            .await
            .map_err(|e| Error::volume_prune_failed().with_cause(e))
    }

    async fn require_managed_volume(&self, name: &str) -> Result<Volume> {
        let volume = self.daemon().volume_inspect(name).await.map_err(|e| {
            if is_not_found(&e) {
                Error::volume_not_found(name)
            } else {
                Error::volume_inspect_failed(name).with_cause(e)
            }
        })?;
        if !self.is_managed(&volume.labels) {
            return Err(Error::volume_not_found(name));
        }
        Ok(volume)
    }
}
