//! Source descriptors and the fetch stage.
//!
//! A [`Source`] names one package's tree under `<root>/src/<package>`,
//! independent of target. Fetch is idempotent: an existing tree with a
//! recorded fetch is skipped outright; an existing tree without a record gets
//! its revision re-resolved and recorded; a missing tree is cloned from the
//! package's origin.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::pipeline::Stage;
use crate::process::{Exec, ProcessError, StageLog};
use crate::state::{StageRecord, StateError, StateStore};
use crate::target::Target;

/// Errors from source acquisition and version discovery.
#[derive(Debug, Error)]
pub enum SourceError {
  /// The tree is absent and no origin is known to clone from.
  #[error("source tree for '{package}' not found at '{dir}' and no origin is configured")]
  NoOrigin { package: String, dir: PathBuf },

  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error(transparent)]
  State(#[from] StateError),

  #[error("failed to create source root '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// One package's source tree location and fetch metadata.
#[derive(Debug, Clone)]
pub struct Source {
  package: &'static str,
  dir: PathBuf,
  origin: Option<&'static str>,
}

impl Source {
  pub fn new(package: &'static str, dir: PathBuf, origin: Option<&'static str>) -> Self {
    Self { package, dir, origin }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Make sure the source tree exists, cloning it if necessary, and record
  /// the resolved revision in the state store.
  ///
  /// With both a tree on disk and a fetch record in the store this performs
  /// no subprocess work at all.
  pub fn ensure_fetched(&self, store: &mut StateStore, target: Target) -> Result<(), SourceError> {
    if self.dir.exists() && store.get(self.package, target, Stage::Fetch).is_some() {
      debug!(package = self.package, "source already fetched, skipping");
      return Ok(());
    }

    if !self.dir.exists() {
      let origin = self.origin.ok_or_else(|| SourceError::NoOrigin {
        package: self.package.to_string(),
        dir: self.dir.clone(),
      })?;

      if let Some(parent) = self.dir.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SourceError::CreateDir {
          path: parent.to_path_buf(),
          source: e,
        })?;
      }

      info!(package = self.package, origin, "cloning source");
      Exec::new("git")
        .args(["clone", "--recursive", origin])
        .arg(self.dir.display().to_string())
        .run(None)?;
    }

    let commit = Exec::new("git")
      .args(["rev-parse", "HEAD"])
      .current_dir(&self.dir)
      .run(None)?
      .trim()
      .to_string();

    info!(package = self.package, commit = %commit, "source fetched");
    store.set(
      self.package,
      target,
      Stage::Fetch,
      StageRecord {
        commit: Some(commit),
        ..Default::default()
      },
    );
    Ok(())
  }

  /// Discover the package version from version-control tags.
  ///
  /// Runs `git describe` against tags of the form `v<digit>...` and strips
  /// the leading `v`, so tag `v3.2.1` yields `3.2.1`.
  pub fn describe_version(&self, log: Option<&StageLog>) -> Result<String, SourceError> {
    let out = Exec::new("git")
      .args(["describe", "--tags", "--match=v[0-9]*"])
      .current_dir(&self.dir)
      .run(log)?;
    Ok(parse_version_tag(out.trim()))
  }
}

/// Strip the conventional `v` prefix from a version tag.
pub fn parse_version_tag(tag: &str) -> String {
  tag.strip_prefix('v').unwrap_or(tag).to_string()
}
