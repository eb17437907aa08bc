//! Image build requests and the builder seam the engine drives them through.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use tokio_util::sync::CancellationToken;

use crate::{error::Result, labels::Labels, progress::OnProgress};

pub mod drain;
pub mod moby;
pub mod solve;

/// A high-level build request. Translated into a solve request by
/// [`solve::solve_request`].
#[derive(Clone, Default)]
pub struct ImageBuildOptions {
    /// Tags applied to the built image.
    pub tags: BTreeSet<String>,
    /// Absolute directory holding the build context.
    pub context_dir: Utf8PathBuf,
    /// Path of the Dockerfile relative to the context; `"Dockerfile"` when
    /// empty.
    pub dockerfile: Utf8PathBuf,
    /// `None` values are omitted entirely rather than passed as empty.
    pub build_args: BTreeMap<String, Option<String>>,
    pub labels: Labels,
    pub no_cache: bool,
    /// Target stage for multi-stage builds; empty builds the final stage.
    pub target: String,
    /// Always attempt to pull newer versions of base images.
    pub pull: bool,
    /// Drop all non-error output when no callback is supplied.
    pub suppress_output: bool,
    /// `"host"`, `"none"`, or a network name; empty for the default.
    pub network_mode: String,
    /// Progress sink; invoked from the drain task.
    pub on_progress: Option<OnProgress>,
}

impl fmt::Debug for ImageBuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuildOptions")
            .field("tags", &self.tags)
            .field("context_dir", &self.context_dir)
            .field("dockerfile", &self.dockerfile)
            .field("build_args", &self.build_args)
            .field("labels", &self.labels)
            .field("no_cache", &self.no_cache)
            .field("target", &self.target)
            .field("pull", &self.pull)
            .field("suppress_output", &self.suppress_output)
            .field("network_mode", &self.network_mode)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "..."))
            .finish()
    }
}

/// The builder callable the engine drives BuildKit builds through.
///
/// Production code installs [`moby::BuildkitDriver`]; tests install
/// [`crate::progress::replay::ReplayBuilder`].
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Runs one build to completion, emitting progress through
    /// `opts.on_progress`. Cancelling the token aborts the build; the drain
    /// work is always finished before this returns.
    async fn build(&self, opts: &ImageBuildOptions, cancel: CancellationToken) -> Result<()>;
}
