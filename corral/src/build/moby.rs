//! The production BuildKit driver: lowers a solve request onto the daemon's
//! build endpoint and drains its status stream.
//!
//! The daemon performs the `/session` + `/grpc` hijack dance itself once the
//! request declares the BuildKit builder; one request means one fresh build
//! connection, torn down when the stream ends.

use std::{
    collections::HashMap,
    io,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use bollard::{
    models::BuildInfoAux,
    moby::buildkit::v1::StatusResponse,
    query_parameters::{BuildImageOptions, BuilderVersion},
    Docker,
};
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use futures::StreamExt;
use http_body_util::{Either, Full};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::{
    build::{
        drain::{EventSink, StatusDrain, StatusSnapshot, VertexLogChunk, VertexUpdate},
        solve::{solve_request, SolveRequest, MOUNT_CONTEXT, MOUNT_DOCKERFILE},
        ImageBuildOptions, ImageBuilder,
    },
    error::{Error, Result},
};

static BUILD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Drives BuildKit builds through a [`bollard::Docker`] handle.
pub struct BuildkitDriver {
    docker: Docker,
}

impl BuildkitDriver {
    #[must_use]
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ImageBuilder for BuildkitDriver {
    async fn build(&self, opts: &ImageBuildOptions, cancel: CancellationToken) -> Result<()> {
        let solve = solve_request(opts)?;
        let context = archive_context(&solve, opts)
            .map_err(|e| Error::image_build_failed("could not archive the build context").with_cause(e))?;
        let (options, extra_tags) = lower(&solve);

        info!("solving {:?} from {}", opts.tags, solve.local_mounts[MOUNT_CONTEXT]);
        let body: Either<Full<Bytes>, _> = Either::Left(Full::new(context));
        let mut stream = self.docker.build_image(options, None, Some(body));

        let sink = match &opts.on_progress {
            Some(on_progress) => EventSink::Callback(on_progress.clone()),
            None => EventSink::Logger { quiet: opts.suppress_output },
        };
        let mut drain = StatusDrain::new(sink);
        let mut solve_error: Option<Error> = None;
        let mut saw_status = false;

        // The drain lives in this task: when the loop exits, all drain work
        // is done, cancelled or not.
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("build cancelled, aborting solve");
                    return Err(Error::build_cancelled());
                }
                next = stream.next() => {
                    let Some(next) = next else { break };
                    match next {
                        Ok(message) => {
                            if let Some(detail) = message.error_detail {
                                let text = detail.message.unwrap_or_default();
                                solve_error.get_or_insert_with(|| {
                                    Error::buildkit_solve_failed().with_cause(text)
                                });
                            }
                            if let Some(BuildInfoAux::BuildKit(status)) = message.aux {
                                saw_status = true;
                                drain.absorb(&snapshot_from(&status));
                            }
                        }
                        Err(e) => {
                            // A transport error before any status means the
                            // build session never came up.
                            let error = if saw_status {
                                Error::buildkit_solve_failed().with_cause(e)
                            } else {
                                Error::buildkit_connect_failed().with_cause(e)
                            };
                            solve_error.get_or_insert(error);
                            break;
                        }
                    }
                }
            }
        }

        if let Some(error) = solve_error {
            return Err(error);
        }
        if let Some(diagnostic) = drain.first_error() {
            debug!("solve succeeded despite vertex error: {diagnostic}");
        }

        // The classic endpoint only applies the first tag; the rest are
        // applied after the fact.
        for tag in extra_tags {
            let (repo, version) = tag.rsplit_once(':').unwrap_or((tag.as_str(), "latest"));
            self.docker
                .tag_image(
                    solve.exports[0].attrs["name"].split(',').next().unwrap_or_default(),
                    Some(bollard::query_parameters::TagImageOptions {
                        repo: repo.to_owned(),
                        tag: version.to_owned(),
                        ..Default::default()
                    }),
                )
                .await
                .map_err(|e| Error::image_tag_failed(&tag).with_cause(e))?;
        }
        Ok(())
    }
}

/// Maps the solve request onto the classic endpoint's query parameters, the
/// same mapping the daemon applies in reverse before invoking its frontend.
/// Returns the options plus any tags beyond the first.
fn lower(solve: &SolveRequest) -> (BuildImageOptions, Vec<String>) {
    let mut buildargs = HashMap::new();
    let mut labels = HashMap::new();
    let mut dockerfile = String::new();
    let mut target = String::new();
    let mut networkmode = None;
    let mut pull = false;
    let mut nocache = false;

    for (key, value) in &solve.frontend_attrs {
        if let Some(name) = key.strip_prefix("build-arg:") {
            buildargs.insert(name.to_owned(), value.clone());
        } else if let Some(name) = key.strip_prefix("label:") {
            labels.insert(name.to_owned(), value.clone());
        } else {
            match key.as_str() {
                "filename" => dockerfile = value.clone(),
                "target" => target = value.clone(),
                "image-resolve-mode" => pull = value == "pull",
                "force-network-mode" => networkmode = Some(value.clone()),
                "no-cache" => nocache = true,
                _ => {}
            }
        }
    }

    let mut tags = solve.exports[0]
        .attrs
        .get("name")
        .map(|joined| joined.split(',').map(str::to_owned).collect::<Vec<_>>())
        .unwrap_or_default();
    let first = if tags.is_empty() { None } else { Some(tags.remove(0)) };

    let options = BuildImageOptions {
        t: first,
        dockerfile,
        target,
        pull: pull.to_string(),
        nocache,
        cachefrom: solve.cache_imports.as_ref().map(|imports| {
            imports.iter().filter_map(|import| import.attrs.get("ref").cloned()).collect()
        }),
        buildargs: Some(buildargs),
        labels: Some(labels),
        networkmode,
        rm: true,
        session: Some(session_id()),
        version: BuilderVersion::BuilderBuildKit,
        ..Default::default()
    };
    (options, tags)
}

/// BuildKit wants a unique session per build.
fn session_id() -> String {
    let seq = BUILD_SEQ.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("corral-{}-{seq}-{nanos}", std::process::id())
}

/// Tars (and gzips) the context directory. A dockerfile living outside the
/// context is injected into the archive under a reserved name, and the
/// options point at it.
pub(crate) fn archive_context(
    solve: &SolveRequest,
    opts: &ImageBuildOptions,
) -> io::Result<Bytes> {
    let context_dir = &solve.local_mounts[MOUNT_CONTEXT];
    let dockerfile_dir = &solve.local_mounts[MOUNT_DOCKERFILE];

    let encoder = GzEncoder::new(Vec::new(), Compression::fast());
    let mut archive = tar::Builder::new(encoder);
    archive.append_dir_all("", context_dir.as_std_path())?;

    if dockerfile_dir != context_dir {
        // `-f /elsewhere/Dockerfile`: ship the file alongside the context.
        let mut file = std::fs::File::open(opts.dockerfile.as_std_path())?;
        let name = solve
            .frontend_attrs
            .get("filename")
            .map(String::as_str)
            .unwrap_or("Dockerfile");
        archive.append_file(name, &mut file)?;
    }

    let bytes = archive.into_inner()?.finish()?;
    Ok(Bytes::from(bytes))
}

fn snapshot_from(status: &StatusResponse) -> StatusSnapshot {
    StatusSnapshot {
        vertexes: status
            .vertexes
            .iter()
            .map(|v| VertexUpdate {
                digest: v.digest.clone(),
                name: v.name.clone(),
                started_at: v.started.as_ref().map(|ts| {
                    UNIX_EPOCH + Duration::new(ts.seconds.max(0) as u64, ts.nanos.max(0) as u32)
                }),
                completed_at: v.completed.as_ref().map(|ts| {
                    UNIX_EPOCH + Duration::new(ts.seconds.max(0) as u64, ts.nanos.max(0) as u32)
                }),
                cached: v.cached,
                error: v.error.clone(),
            })
            .collect(),
        logs: status
            .logs
            .iter()
            .map(|l| VertexLogChunk { vertex: l.vertex.clone(), data: l.msg.clone() })
            .collect(),
    }
}
