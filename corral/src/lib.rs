//! corral: a label-jailed facade over a container daemon.
//!
//! Everything created through the [`engine::Engine`] carries a managed
//! label; everything it lists is filtered to that label; everything it
//! targets must carry it, or the engine answers "not found". On top of
//! that sits a BuildKit build pipeline that streams normalized
//! [`progress::BuildProgressEvent`]s, and a recorded-scenario toolkit that
//! replays builds deterministically in tests.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use corral::{
//!     build::{moby::BuildkitDriver, ImageBuildOptions},
//!     daemon::moby::MobyDaemon,
//!     engine::{Engine, EngineConfig},
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> corral::error::Result<()> {
//! let engine = Engine::connect(EngineConfig::new("dev.corral")).await?;
//! let daemon = MobyDaemon::connect()?;
//! engine.set_builder(Arc::new(BuildkitDriver::new(daemon.docker().clone())));
//!
//! let opts = ImageBuildOptions {
//!     tags: ["corral/demo:latest".to_owned()].into(),
//!     context_dir: "/srv/demo".into(),
//!     ..Default::default()
//! };
//! engine.image_build_buildkit(&opts, CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod filters;
pub mod labels;
pub mod progress;

pub use crate::{
    engine::{Engine, EngineConfig},
    error::{format_user_error, Error, ErrorKind, Result},
    filters::Filters,
    labels::{LabelConfig, Labels},
};
