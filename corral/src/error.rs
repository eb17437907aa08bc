use std::{error::Error as StdError, fmt};

pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Broad classification of a failure, for programmatic handling.
///
/// A not-found from the daemon and a present-but-unmanaged target both map to
/// [`ErrorKind::NotFound`], on purpose: callers (and attackers) cannot tell
/// managed-jail rejections apart from true absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    DaemonUnreachable,
    NotFound,
    InUse,
    CreateFailed,
    MutateFailed,
    ListFailed,
    PruneFailed,
    BuildConfigInvalid,
    BuildSolveFailed,
    BuildkitNotConfigured,
    BuildkitConnectFailed,
    BuildkitDetectFailed,
    Cancelled,
}

/// A structured engine error: operation tag, optional cause, one-sentence
/// user message, and fixed remediation steps.
///
/// The remediation lists are static per constructor. User input only ever
/// lands in `message`.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    op: &'static str,
    message: String,
    next_steps: &'static [&'static str],
    cause: Option<Cause>,
}

impl Error {
    fn new(
        kind: ErrorKind,
        op: &'static str,
        message: impl Into<String>,
        next_steps: &'static [&'static str],
    ) -> Self {
        Self { kind, op, message: message.into(), next_steps, cause: None }
    }

    #[must_use]
    pub(crate) fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Short machine tag, e.g. `"container.create"`.
    #[must_use]
    pub fn op(&self) -> &'static str {
        self.op
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn next_steps(&self) -> &'static [&'static str] {
        self.next_steps
    }

    #[must_use]
    pub fn cause(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_ref().map(|c| &**c as &(dyn StdError + 'static))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op, self.message)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause()
    }
}

/// Multi-line rendition for terminal display.
#[must_use]
pub fn format_user_error(e: &Error) -> String {
    let mut out = format!("Error: {}\n", e.message);
    if let Some(cause) = e.cause() {
        out.push_str(&format!("  Details: {cause}\n"));
    }
    if !e.next_steps.is_empty() {
        out.push_str("Next Steps:\n");
        for (i, step) in e.next_steps.iter().enumerate() {
            out.push_str(&format!("  {}. {step}\n", i + 1));
        }
    }
    out
}

const STEPS_DAEMON: &[&str] = &[
    "check that the Docker daemon is running: `docker info`",
    "start it with `systemctl start docker` (Linux) or Docker Desktop (macOS/Windows)",
    "verify DOCKER_HOST if the daemon is remote",
];

const STEPS_CONTAINER_MISSING: &[&str] = &[
    "list managed containers: `docker ps -a --filter label=<prefix>.managed=true`",
    "a container by that name may exist but not be managed by this engine",
];

const STEPS_VOLUME_MISSING: &[&str] = &[
    "list managed volumes: `docker volume ls --filter label=<prefix>.managed=true`",
    "a volume by that name may exist but not be managed by this engine",
];

const STEPS_NETWORK_MISSING: &[&str] = &[
    "list managed networks: `docker network ls --filter label=<prefix>.managed=true`",
    "a network by that name may exist but not be managed by this engine",
];

const STEPS_IMAGE_MISSING: &[&str] = &[
    "list managed images: `docker image ls --filter label=<prefix>.managed=true`",
    "an image by that name may exist but not be managed by this engine",
    "build or pull the image first",
];

const STEPS_RETRY_OR_LOGS: &[&str] = &[
    "retry the operation",
    "inspect daemon logs: `journalctl -u docker` or the Docker Desktop console",
];

const STEPS_IN_USE: &[&str] = &[
    "stop whatever is using the resource first",
    "pass force to remove it anyway",
];

const STEPS_BUILD_FAILED: &[&str] = &[
    "read the build log above for the failing step",
    "rerun with no-cache to rule out a stale layer",
];

const STEPS_BUILDKIT_CONFIG: &[&str] = &[
    "construct the engine with a BuildKit builder before building",
    "or use the legacy build path",
];

const STEPS_BUILDKIT_DETECT: &[&str] = &[
    "set DOCKER_BUILDKIT to \"1\" or \"0\"",
    "or unset it to let the daemon decide",
];

macro_rules! constructors {
    ($( $(#[$doc:meta])* $name:ident ($kind:ident, $op:literal, $steps:expr) => $msg:literal ),+ $(,)?) => {
        impl Error {
            $(
                $(#[$doc])*
                #[must_use]
                pub(crate) fn $name(subject: &str) -> Self {
                    Self::new(ErrorKind::$kind, $op, format!($msg, subject), $steps)
                }
            )+
        }
    };
}

constructors! {
    // daemon
    docker_not_running(DaemonUnreachable, "daemon.connect", STEPS_DAEMON) => "Cannot reach the Docker daemon: {}",
    ping_failed(DaemonUnreachable, "daemon.ping", STEPS_DAEMON) => "The Docker daemon did not answer a ping: {}",

    // containers
    container_not_found(NotFound, "container.inspect", STEPS_CONTAINER_MISSING) => "Container {:?} was not found",
    container_inspect_failed(ListFailed, "container.inspect", STEPS_RETRY_OR_LOGS) => "Failed to inspect container {:?}",
    container_create_failed(CreateFailed, "container.create", STEPS_RETRY_OR_LOGS) => "Failed to create container {:?}",
    container_start_failed(MutateFailed, "container.start", STEPS_RETRY_OR_LOGS) => "Failed to start container {:?}",
    container_stop_failed(MutateFailed, "container.stop", STEPS_RETRY_OR_LOGS) => "Failed to stop container {:?}",
    container_kill_failed(MutateFailed, "container.kill", STEPS_RETRY_OR_LOGS) => "Failed to kill container {:?}",
    container_pause_failed(MutateFailed, "container.pause", STEPS_RETRY_OR_LOGS) => "Failed to pause container {:?}",
    container_unpause_failed(MutateFailed, "container.unpause", STEPS_RETRY_OR_LOGS) => "Failed to unpause container {:?}",
    container_restart_failed(MutateFailed, "container.restart", STEPS_RETRY_OR_LOGS) => "Failed to restart container {:?}",
    container_rename_failed(MutateFailed, "container.rename", STEPS_RETRY_OR_LOGS) => "Failed to rename container {:?}",
    container_resize_failed(MutateFailed, "container.resize", STEPS_RETRY_OR_LOGS) => "Failed to resize the TTY of container {:?}",
    container_remove_failed(MutateFailed, "container.remove", STEPS_RETRY_OR_LOGS) => "Failed to remove container {:?}",
    container_in_use(InUse, "container.remove", STEPS_IN_USE) => "Container {:?} is in use and cannot be removed",
    container_attach_failed(MutateFailed, "container.attach", STEPS_RETRY_OR_LOGS) => "Failed to attach to container {:?}",
    container_wait_failed(MutateFailed, "container.wait", STEPS_RETRY_OR_LOGS) => "Failed to wait on container {:?}",
    container_logs_failed(ListFailed, "container.logs", STEPS_RETRY_OR_LOGS) => "Failed to read logs of container {:?}",
    container_top_failed(ListFailed, "container.top", STEPS_RETRY_OR_LOGS) => "Failed to list processes of container {:?}",
    container_stats_failed(ListFailed, "container.stats", STEPS_RETRY_OR_LOGS) => "Failed to read stats of container {:?}",
    container_update_failed(MutateFailed, "container.update", STEPS_RETRY_OR_LOGS) => "Failed to update container {:?}",
    container_exec_failed(MutateFailed, "container.exec", STEPS_RETRY_OR_LOGS) => "Failed to exec in container {:?}",
    container_copy_to_failed(MutateFailed, "container.copy-to", STEPS_RETRY_OR_LOGS) => "Failed to copy into container {:?}",
    container_copy_from_failed(MutateFailed, "container.copy-from", STEPS_RETRY_OR_LOGS) => "Failed to copy out of container {:?}",
    container_stat_path_failed(ListFailed, "container.stat-path", STEPS_RETRY_OR_LOGS) => "Failed to stat a path in container {:?}",

    // volumes
    volume_not_found(NotFound, "volume.inspect", STEPS_VOLUME_MISSING) => "Volume {:?} was not found",
    volume_inspect_failed(ListFailed, "volume.inspect", STEPS_RETRY_OR_LOGS) => "Failed to inspect volume {:?}",
    volume_create_failed(CreateFailed, "volume.create", STEPS_RETRY_OR_LOGS) => "Failed to create volume {:?}",
    volume_remove_failed(MutateFailed, "volume.remove", STEPS_RETRY_OR_LOGS) => "Failed to remove volume {:?}",
    volume_in_use(InUse, "volume.remove", STEPS_IN_USE) => "Volume {:?} is in use and cannot be removed",

    // networks
    network_not_found(NotFound, "network.inspect", STEPS_NETWORK_MISSING) => "Network {:?} was not found",
    network_inspect_failed(ListFailed, "network.inspect", STEPS_RETRY_OR_LOGS) => "Failed to inspect network {:?}",
    network_create_failed(CreateFailed, "network.create", STEPS_RETRY_OR_LOGS) => "Failed to create network {:?}",
    network_remove_failed(MutateFailed, "network.remove", STEPS_RETRY_OR_LOGS) => "Failed to remove network {:?}",
    network_connect_failed(MutateFailed, "network.connect", STEPS_RETRY_OR_LOGS) => "Failed to connect a container to network {:?}",
    network_disconnect_failed(MutateFailed, "network.disconnect", STEPS_RETRY_OR_LOGS) => "Failed to disconnect a container from network {:?}",

    // images
    image_not_found(NotFound, "image.inspect", STEPS_IMAGE_MISSING) => "Image {:?} was not found",
    image_inspect_failed(ListFailed, "image.inspect", STEPS_RETRY_OR_LOGS) => "Failed to inspect image {:?}",
    image_remove_failed(MutateFailed, "image.remove", STEPS_RETRY_OR_LOGS) => "Failed to remove image {:?}",
    image_in_use(InUse, "image.remove", STEPS_IN_USE) => "Image {:?} is in use and cannot be removed",
    image_tag_failed(MutateFailed, "image.tag", STEPS_RETRY_OR_LOGS) => "Failed to tag image {:?}",
    image_build_failed(BuildSolveFailed, "image.build", STEPS_BUILD_FAILED) => "Image build failed: {}",
    build_config_invalid(BuildConfigInvalid, "image.build", STEPS_BUILD_FAILED) => "Image build failed: required field {:?} is missing",
}

macro_rules! plain_constructors {
    ($( $name:ident ($kind:ident, $op:literal, $steps:expr) => $msg:literal ),+ $(,)?) => {
        impl Error {
            $(
                #[must_use]
                pub(crate) fn $name() -> Self {
                    Self::new(ErrorKind::$kind, $op, $msg, $steps)
                }
            )+
        }
    };
}

plain_constructors! {
    container_list_failed(ListFailed, "container.list", STEPS_RETRY_OR_LOGS) => "Failed to list containers",
    container_prune_failed(PruneFailed, "container.prune", STEPS_RETRY_OR_LOGS) => "Failed to prune containers",
    volume_list_failed(ListFailed, "volume.list", STEPS_RETRY_OR_LOGS) => "Failed to list volumes",
    volume_prune_failed(PruneFailed, "volume.prune", STEPS_RETRY_OR_LOGS) => "Failed to prune volumes",
    network_list_failed(ListFailed, "network.list", STEPS_RETRY_OR_LOGS) => "Failed to list networks",
    network_prune_failed(PruneFailed, "network.prune", STEPS_RETRY_OR_LOGS) => "Failed to prune networks",
    image_list_failed(ListFailed, "image.list", STEPS_RETRY_OR_LOGS) => "Failed to list images",
    image_prune_failed(PruneFailed, "image.prune", STEPS_RETRY_OR_LOGS) => "Failed to prune images",
    buildkit_not_configured(BuildkitNotConfigured, "buildkit.build", STEPS_BUILDKIT_CONFIG) => "No BuildKit builder is configured on this engine",
    buildkit_connect_failed(BuildkitConnectFailed, "buildkit.connect", STEPS_DAEMON) => "Failed to reach the daemon's BuildKit endpoint",
    buildkit_solve_failed(BuildSolveFailed, "buildkit.solve", STEPS_BUILD_FAILED) => "BuildKit solve failed",
    buildkit_detect_failed(BuildkitDetectFailed, "buildkit.detect", STEPS_BUILDKIT_DETECT) => "Could not determine whether BuildKit is enabled",
    build_cancelled(Cancelled, "buildkit.solve", &[]) => "The build was cancelled",
}
