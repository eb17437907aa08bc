//! Translation from a build request to a BuildKit solve request.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    build::ImageBuildOptions,
    error::{Error, Result},
};

pub(crate) const FRONTEND_DOCKERFILE: &str = "dockerfile.v0";
pub(crate) const DEFAULT_DOCKERFILE: &str = "Dockerfile";

pub(crate) const MOUNT_CONTEXT: &str = "context";
pub(crate) const MOUNT_DOCKERFILE: &str = "dockerfile";

/// What gets handed to the daemon's build engine: the dockerfile frontend,
/// its attribute map, local filesystem mounts, and export/cache wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveRequest {
    pub frontend: String,
    pub frontend_attrs: BTreeMap<String, String>,
    /// `context` and `dockerfile` mounts, each rooted at a local directory.
    pub local_mounts: BTreeMap<String, Utf8PathBuf>,
    pub exports: Vec<ExportEntry>,
    /// `Some(vec![])` suppresses cache import entirely; `None` leaves the
    /// daemon's default in place. The `no-cache` attribute alone only
    /// verifies cache, so both are set together.
    pub cache_imports: Option<Vec<CacheImport>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportEntry {
    pub kind: String,
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheImport {
    pub kind: String,
    pub attrs: BTreeMap<String, String>,
}

/// Pure translation; does not touch the filesystem.
pub fn solve_request(opts: &ImageBuildOptions) -> Result<SolveRequest> {
    if opts.context_dir.as_str().is_empty() {
        return Err(Error::build_config_invalid("context_dir"));
    }

    let dockerfile = if opts.dockerfile.as_str().is_empty() {
        Utf8Path::new(DEFAULT_DOCKERFILE)
    } else {
        opts.dockerfile.as_path()
    };

    let mut attrs = BTreeMap::new();
    attrs.insert("filename".to_owned(), file_name(dockerfile));
    for (key, value) in &opts.build_args {
        // A null build-arg means "omit", not "empty".
        if let Some(value) = value {
            attrs.insert(format!("build-arg:{key}"), value.clone());
        }
    }
    for (key, value) in &opts.labels {
        attrs.insert(format!("label:{key}"), value.clone());
    }
    if !opts.target.is_empty() {
        attrs.insert("target".to_owned(), opts.target.clone());
    }
    if opts.pull {
        attrs.insert("image-resolve-mode".to_owned(), "pull".to_owned());
    }
    if !opts.network_mode.is_empty() {
        attrs.insert("force-network-mode".to_owned(), opts.network_mode.clone());
    }
    if opts.no_cache {
        attrs.insert("no-cache".to_owned(), String::new());
    }

    let mut local_mounts = BTreeMap::new();
    local_mounts.insert(MOUNT_CONTEXT.to_owned(), opts.context_dir.clone());
    local_mounts.insert(MOUNT_DOCKERFILE.to_owned(), dockerfile_mount(&opts.context_dir, dockerfile));

    let exports = vec![ExportEntry {
        kind: "image".to_owned(),
        attrs: [
            ("name".to_owned(), opts.tags.iter().cloned().collect::<Vec<_>>().join(",")),
            ("push".to_owned(), "false".to_owned()),
        ]
        .into(),
    }];

    Ok(SolveRequest {
        frontend: FRONTEND_DOCKERFILE.to_owned(),
        frontend_attrs: attrs,
        local_mounts,
        exports,
        cache_imports: opts.no_cache.then(Vec::new),
    })
}

/// The dockerfile mount is the context directory unless the dockerfile path
/// is absolute and points elsewhere.
fn dockerfile_mount(context_dir: &Utf8Path, dockerfile: &Utf8Path) -> Utf8PathBuf {
    if dockerfile.is_absolute() {
        dockerfile.parent().map(Utf8Path::to_path_buf).unwrap_or_else(|| context_dir.to_path_buf())
    } else {
        context_dir.to_path_buf()
    }
}

fn file_name(dockerfile: &Utf8Path) -> String {
    dockerfile.file_name().unwrap_or(DEFAULT_DOCKERFILE).to_owned()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn base_opts() -> ImageBuildOptions {
        ImageBuildOptions {
            tags: ["img:latest".to_owned()].into(),
            context_dir: "/tmp/ctx".into(),
            ..ImageBuildOptions::default()
        }
    }

    #[test]
    fn full_request_shape() {
        let opts = ImageBuildOptions {
            tags: ["img:latest".to_owned()].into(),
            context_dir: "/tmp/ctx".into(),
            dockerfile: "".into(),
            build_args: [
                ("FOO".to_owned(), Some("bar".to_owned())),
                ("NIL".to_owned(), None),
            ]
            .into(),
            labels: [("k".to_owned(), "v".to_owned())].into(),
            no_cache: true,
            target: "build".to_owned(),
            pull: true,
            network_mode: "host".to_owned(),
            ..ImageBuildOptions::default()
        };

        let solve = solve_request(&opts).unwrap();

        assert_eq!(solve.frontend, "dockerfile.v0");
        assert_eq!(
            solve.frontend_attrs,
            [
                ("filename".to_owned(), "Dockerfile".to_owned()),
                ("build-arg:FOO".to_owned(), "bar".to_owned()),
                ("label:k".to_owned(), "v".to_owned()),
                ("no-cache".to_owned(), String::new()),
                ("target".to_owned(), "build".to_owned()),
                ("image-resolve-mode".to_owned(), "pull".to_owned()),
                ("force-network-mode".to_owned(), "host".to_owned()),
            ]
            .into(),
        );
        assert!(!solve.frontend_attrs.contains_key("build-arg:NIL"));

        assert_eq!(solve.local_mounts[MOUNT_CONTEXT], "/tmp/ctx");
        assert_eq!(solve.local_mounts[MOUNT_DOCKERFILE], "/tmp/ctx");

        assert_eq!(solve.exports.len(), 1);
        assert_eq!(solve.exports[0].kind, "image");
        assert_eq!(solve.exports[0].attrs["push"], "false");
        assert_eq!(solve.exports[0].attrs["name"], "img:latest");

        assert_eq!(solve.cache_imports, Some(vec![]));
    }

    #[test]
    fn missing_context_dir_is_rejected() {
        let opts = ImageBuildOptions::default();
        let err = solve_request(&opts).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BuildConfigInvalid);
        assert!(err.message().contains("context_dir"));
    }

    #[test]
    fn cache_import_left_alone_without_no_cache() {
        let solve = solve_request(&base_opts()).unwrap();
        assert_eq!(solve.cache_imports, None);
        assert!(!solve.frontend_attrs.contains_key("no-cache"));
    }

    #[test]
    fn relative_dockerfile_mounts_the_context() {
        let opts = ImageBuildOptions {
            dockerfile: "docker/prod.Dockerfile".into(),
            ..base_opts()
        };
        let solve = solve_request(&opts).unwrap();
        assert_eq!(solve.frontend_attrs["filename"], "prod.Dockerfile");
        assert_eq!(solve.local_mounts[MOUNT_DOCKERFILE], "/tmp/ctx");
    }

    #[test]
    fn absolute_dockerfile_mounts_its_directory() {
        let opts = ImageBuildOptions {
            dockerfile: "/srv/files/Dockerfile.ci".into(),
            ..base_opts()
        };
        let solve = solve_request(&opts).unwrap();
        assert_eq!(solve.frontend_attrs["filename"], "Dockerfile.ci");
        assert_eq!(solve.local_mounts[MOUNT_DOCKERFILE], "/srv/files");
        assert_eq!(solve.local_mounts[MOUNT_CONTEXT], "/tmp/ctx");
    }

    #[test]
    fn tags_are_comma_joined() {
        let opts = ImageBuildOptions {
            tags: ["a:1".to_owned(), "b:2".to_owned()].into(),
            ..base_opts()
        };
        let solve = solve_request(&opts).unwrap();
        assert_eq!(solve.exports[0].attrs["name"], "a:1,b:2");
    }
}
