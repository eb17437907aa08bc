//! Network operations, label-jailed.

use bollard::models::{Network, NetworkCreateResponse, NetworkPruneResponse};
use log::debug;

use crate::{
    daemon::{is_not_found, NetworkCreateSpec},
    engine::Engine,
    error::{Error, Result},
    filters::Filters,
    labels::Labels,
};

impl Engine {
    pub async fn network_create(
        &self,
        spec: &NetworkCreateSpec,
        extras: &[&Labels],
    ) -> Result<NetworkCreateResponse> {
        let mut spec = spec.clone();
        let caller = spec.labels.clone();
        let mut maps: Vec<&Labels> = vec![&caller];
        maps.extend_from_slice(extras);
        spec.labels = self.assert_managed(self.config().labels.network_labels(&maps));

        debug!("creating network {:?}", spec.name);
        let name = spec.name.clone();
        self.daemon()
            .network_create(spec)
            .await
            .map_err(|e| Error::network_create_failed(&name).with_cause(e))
    }

    /// The managed check and the result are the same daemon call.
    pub async fn network_inspect(&self, name: &str) -> Result<Network> {
        self.require_managed_network(name).await
    }

    pub async fn network_remove(&self, name: &str) -> Result<()> {
        self.require_managed_network(name).await?;
        debug!("removing network {name}");
        self.daemon()
            .network_remove(name)
            .await
            .map_err(|e| Error::network_remove_failed(name).with_cause(e))
    }

    /// Connects a container to a managed network. Both ends must be managed.
    pub async fn network_connect(&self, network: &str, container: &str) -> Result<()> {
        self.require_managed_network(network).await?;
        self.require_managed_container(container).await?;
        debug!("connecting container {container} to network {network}");
        self.daemon()
            .network_connect(network, container)
            .await
            .map_err(|e| Error::network_connect_failed(network).with_cause(e))
    }

    pub async fn network_disconnect(
        &self,
        network: &str,
        container: &str,
        force: bool,
    ) -> Result<()> {
        self.require_managed_network(network).await?;
        debug!("disconnecting container {container} from network {network}");
        self.daemon()
            .network_disconnect(network, container, force)
            .await
            .map_err(|e| Error::network_disconnect_failed(network).with_cause(e))
    }

    pub async fn network_list(&self, extra: &Filters) -> Result<Vec<Network>> {
        let filters = self.scoped_filters(extra);
        self.daemon()
            .network_list(&filters)
            .await
            .map_err(|e| Error::network_list_failed().with_cause(e))
    }

    pub async fn networks_by_labels(&self, wanted: &Labels) -> Result<Vec<Network>> {
        self.network_list(&Filters::labels(wanted)).await
    }

    pub async fn network_find_by_name(&self, name: &str) -> Result<Option<Network>> {
        let filters = Filters::new().with("name", name);
        Ok(self
            .network_list(&filters)
            .await?
            .into_iter()
            .find(|n| n.name.as_deref() == Some(name)))
    }

    pub async fn network_prune(&self, extra: &Filters) -> Result<NetworkPruneResponse> {
        let filters = self.scoped_filters(extra);
        debug!("pruning networks");
        self.daemon()
            .network_prune(&filters)
            .await
            .map_err(|e| Error::network_prune_failed().with_cause(e))
    }

    async fn require_managed_network(&self, name: &str) -> Result<Network> {
        let network = self.daemon().network_inspect(name).await.map_err(|e| {
            if is_not_found(&e) {
                Error::network_not_found(name)
            } else {
                Error::network_inspect_failed(name).with_cause(e)
            }
        })?;
        let managed = network.labels.as_ref().is_some_and(|l| self.is_managed(l));
        if !managed {
            return Err(Error::network_not_found(name));
        }
        Ok(network)
    }
}
