//! Image operations, label-jailed, including both build paths.

use bollard::models::{
    ImageDeleteResponseItem, ImageInspect, ImagePruneResponse, ImageSummary,
};
use futures::StreamExt;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::{
    build::{moby::archive_context, solve::solve_request, ImageBuildOptions},
    daemon::{is_in_use, is_not_found, LegacyBuildSpec},
    engine::Engine,
    error::{Error, Result},
    filters::Filters,
    labels::Labels,
    progress::{BuildProgressEvent, StepStatus},
};

impl Engine {
    /// The managed check and the result are the same daemon call.
    pub async fn image_inspect(&self, name: &str) -> Result<ImageInspect> {
        self.require_managed_image(name).await
    }

    pub async fn image_remove(
        &self,
        name: &str,
        force: bool,
    ) -> Result<Vec<ImageDeleteResponseItem>> {
        self.require_managed_image(name).await?;
        debug!("removing image {name} (force: {force})");
        self.daemon().image_remove(name, force).await.map_err(|e| {
            if is_in_use(&e) {
                Error::image_in_use(name).with_cause(e)
            } else {
                Error::image_remove_failed(name).with_cause(e)
            }
        })
    }

    pub async fn image_tag(&self, name: &str, repo: &str, tag: &str) -> Result<()> {
        self.require_managed_image(name).await?;
        debug!("tagging image {name} as {repo}:{tag}");
        self.daemon()
            .image_tag(name, repo, tag)
            .await
            .map_err(|e| Error::image_tag_failed(name).with_cause(e))
    }

    pub async fn image_list(&self, all: bool, extra: &Filters) -> Result<Vec<ImageSummary>> {
        let filters = self.scoped_filters(extra);
        self.daemon()
            .image_list(all, &filters)
            .await
            .map_err(|e| Error::image_list_failed().with_cause(e))
    }

    pub async fn images_by_labels(&self, wanted: &Labels) -> Result<Vec<ImageSummary>> {
        self.image_list(false, &Filters::labels(wanted)).await
    }

    pub async fn image_prune(&self, extra: &Filters) -> Result<ImagePruneResponse> {
        let filters = self.scoped_filters(extra);
        debug!("pruning images");
        self.daemon()
            .image_prune(&filters)
            .await
            .map_err(|e| Error::image_prune_failed().with_cause(e))
    }

    /// Builds through the daemon's legacy endpoint. Labels are merged and
    /// jailed exactly like the BuildKit path; progress arrives as log-only
    /// events.
    pub async fn image_build(&self, opts: &ImageBuildOptions) -> Result<()> {
        let opts = self.jailed_build_options(opts);
        // Reuses the solve-side validation so both paths reject the same
        // malformed requests.
        let solve = solve_request(&opts)?;
        let context = archive_context(&solve, &opts)
            .map_err(|e| Error::image_build_failed("could not archive the build context").with_cause(e))?;

        let spec = LegacyBuildSpec {
            tags: opts.tags.iter().cloned().collect(),
            dockerfile: solve.frontend_attrs.get("filename").cloned().unwrap_or_default(),
            build_args: opts
                .build_args
                .iter()
                .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
                .collect(),
            labels: opts.labels.clone(),
            no_cache: opts.no_cache,
            target: opts.target.clone(),
            pull: opts.pull,
            network_mode: opts.network_mode.clone(),
        };

        info!("building image (legacy): {:?}", spec.tags);
        let mut stream = self
            .daemon()
            .image_build_legacy(spec, context)
            .await
            .map_err(|e| Error::image_build_failed("the daemon rejected the build request").with_cause(e))?;

        while let Some(message) = stream.next().await {
            let message =
                message.map_err(|e| Error::image_build_failed("the build stream broke").with_cause(e))?;
            if let Some(error) = message.error {
                return Err(Error::image_build_failed(&error));
            }
            let Some(line) = message.stream else { continue };
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            if let Some(on_progress) = &opts.on_progress {
                on_progress(BuildProgressEvent {
                    status: StepStatus::Running,
                    log_line: line.to_owned(),
                    ..BuildProgressEvent::default()
                });
            } else if !opts.suppress_output {
                info!("build: {line}");
            }
        }
        Ok(())
    }

    /// Builds through the configured BuildKit builder. Fails without ever
    /// touching the daemon when no builder is installed.
    pub async fn image_build_buildkit(
        &self,
        opts: &ImageBuildOptions,
        cancel: CancellationToken,
    ) -> Result<()> {
        let Some(builder) = self.builder() else {
            return Err(Error::buildkit_not_configured());
        };
        let opts = self.jailed_build_options(opts);
        info!("building image (buildkit): {:?}", opts.tags);
        builder.build(&opts, cancel).await
    }

    /// Copy of the request with image-config labels merged in and the
    /// managed label re-asserted.
    fn jailed_build_options(&self, opts: &ImageBuildOptions) -> ImageBuildOptions {
        let mut opts = opts.clone();
        let caller = opts.labels.clone();
        opts.labels = self.assert_managed(self.config().labels.image_labels(&[&caller]));
        opts
    }

    async fn require_managed_image(&self, name: &str) -> Result<ImageInspect> {
        let inspected = self.daemon().image_inspect(name).await.map_err(|e| {
            if is_not_found(&e) {
                Error::image_not_found(name)
            } else {
                Error::image_inspect_failed(name).with_cause(e)
            }
        })?;
        let managed = inspected
            .config
            .as_ref()
            .and_then(|c| c.labels.as_ref())
            .is_some_and(|l| self.is_managed(l));
        if !managed {
            return Err(Error::image_not_found(name));
        }
        Ok(inspected)
    }
}
