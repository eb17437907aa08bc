//! Build-backend detection: should builds go through BuildKit?

use std::env;

use log::debug;

use crate::{
    daemon::Daemon,
    error::{Error, Result},
};

pub(crate) const ENV_DOCKER_BUILDKIT: &str = "DOCKER_BUILDKIT";

/// BuildKit builder generation as reported by a daemon ping.
const BUILDER_VERSION_BUILDKIT: &str = "2";

/// Whether image builds should use BuildKit.
///
/// `DOCKER_BUILDKIT` wins when set (a non-boolean value is an error). With
/// no override, the daemon's advertised builder version decides; failing
/// that, every OS except Windows defaults to BuildKit.
pub async fn build_kit_enabled(daemon: &dyn Daemon) -> Result<bool> {
    if let Ok(raw) = env::var(ENV_DOCKER_BUILDKIT) {
        return parse_bool_env(&raw).ok_or_else(|| {
            Error::buildkit_detect_failed()
                .with_cause(format!("{ENV_DOCKER_BUILDKIT}={raw:?} is not a boolean"))
        });
    }

    let ping = daemon.ping().await.map_err(|e| Error::buildkit_detect_failed().with_cause(e))?;
    debug!("daemon ping: builder_version={:?} os={}", ping.builder_version, ping.os_type);
    if ping.builder_version.as_deref() == Some(BUILDER_VERSION_BUILDKIT) {
        return Ok(true);
    }
    Ok(!ping.os_type.eq_ignore_ascii_case("windows"))
}

fn parse_bool_env(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}
