//! The managed jail: a gatekeeper between callers and the container daemon.
//!
//! Writes get the managed label injected, queries get the managed filter
//! injected, and targeted operations refuse anything this engine did not
//! mark. An unmanaged target is reported exactly like a missing one.

use std::sync::{Arc, OnceLock};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    build::ImageBuilder,
    daemon::{moby::MobyDaemon, Daemon, DaemonPing},
    error::{Error, Result},
    filters::Filters,
    labels::{LabelConfig, Labels},
};

mod containers;
mod detect;
mod images;
mod networks;
mod volumes;
#[cfg(test)]
pub(crate) mod testing;

pub use detect::build_kit_enabled;

/// The managed label value. Only ever this literal.
pub const MANAGED_VALUE: &str = "true";

const DEFAULT_MANAGED_SUFFIX: &str = "managed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Reverse-DNS prefix for every label this engine writes, e.g.
    /// `"dev.corral"`.
    pub label_prefix: String,
    /// Suffix of the managed marker; the managed key is
    /// `<prefix>.<suffix>`.
    pub managed_label_suffix: String,
    pub labels: LabelConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            label_prefix: "dev.corral".to_owned(),
            managed_label_suffix: DEFAULT_MANAGED_SUFFIX.to_owned(),
            labels: LabelConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new(label_prefix: &str) -> Self {
        Self { label_prefix: label_prefix.to_owned(), ..Self::default() }
    }

    #[must_use]
    pub fn managed_key(&self) -> String {
        let suffix = if self.managed_label_suffix.is_empty() {
            DEFAULT_MANAGED_SUFFIX
        } else {
            &self.managed_label_suffix
        };
        format!("{}.{suffix}", self.label_prefix)
    }
}

/// The engine itself. Cheap to share: all state is immutable after
/// construction except the builder slot, which is set once.
pub struct Engine {
    daemon: Arc<dyn Daemon>,
    config: EngineConfig,
    managed_key: String,
    builder: OnceLock<Arc<dyn ImageBuilder>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("managed_key", &self.managed_key)
            .field("builder", &self.builder.get().map(|_| "..."))
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Connects to the process-wide daemon and verifies it is reachable.
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        let daemon = MobyDaemon::connect()?;
        let engine = Self::with_daemon(config, Arc::new(daemon));
        let ping = engine.ping().await?;
        info!("connected to daemon (os: {})", ping.os_type);
        Ok(engine)
    }

    /// Wraps an already-constructed daemon client. No reachability check.
    #[must_use]
    pub fn with_daemon(config: EngineConfig, daemon: Arc<dyn Daemon>) -> Self {
        let managed_key = config.managed_key();
        Self { daemon, config, managed_key, builder: OnceLock::new() }
    }

    /// Installs the BuildKit builder. May be called once, before the engine
    /// is shared; later calls are ignored and return false.
    pub fn set_builder(&self, builder: Arc<dyn ImageBuilder>) -> bool {
        self.builder.set(builder).is_ok()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The canonical key of the managed label, `<prefix>.<suffix>`.
    #[must_use]
    pub fn managed_key(&self) -> &str {
        &self.managed_key
    }

    pub async fn ping(&self) -> Result<DaemonPing> {
        debug!("pinging daemon");
        self.daemon
            .ping()
            .await
            .map_err(|e| Error::ping_failed("is the daemon socket reachable?").with_cause(e))
    }

    pub(crate) fn daemon(&self) -> &dyn Daemon {
        &*self.daemon
    }

    pub(crate) fn builder(&self) -> Option<&Arc<dyn ImageBuilder>> {
        self.builder.get()
    }

    /// `label: <managed-key>=true`, the filter injected into every query.
    pub(crate) fn managed_filter(&self) -> Filters {
        Filters::label(&self.managed_key, MANAGED_VALUE)
    }

    /// Managed filter plus whatever the caller asked for.
    pub(crate) fn scoped_filters(&self, extra: &Filters) -> Filters {
        self.managed_filter().merged_with(extra)
    }

    /// Re-asserts the managed label on top of a merged map. Callers cannot
    /// override it, whatever they put in their own labels.
    pub(crate) fn assert_managed(&self, mut labels: Labels) -> Labels {
        labels.insert(self.managed_key.clone(), MANAGED_VALUE.to_owned());
        labels
    }

    /// True iff a label map carries `<managed-key>=true`.
    pub(crate) fn is_managed<'a>(
        &self,
        labels: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> bool {
        labels
            .into_iter()
            .any(|(k, v)| k == &self.managed_key && v == MANAGED_VALUE)
    }
}
