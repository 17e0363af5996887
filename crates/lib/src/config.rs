//! Run configuration and directory layout.
//!
//! One [`BuildConfig`] is constructed by the driver and handed by reference
//! to every pipeline. All path conventions live here:
//!
//! ```text
//! <root>/src/<package>              source trees (shared across targets)
//! <root>/<target>-build/<package>   build output, one tree per target
//! <root>/sources.db                 persistent state store
//! <prefix>/{bin,lib,include,share}  installed artifacts for one target
//! ```

use std::path::PathBuf;

use crate::target::Target;

/// Global configuration for one buildenv run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Root working directory holding sources, build trees and the state store.
  pub root: PathBuf,
  /// Absolute install prefix shared by all packages on this target.
  pub prefix: PathBuf,
  pub target: Target,
  /// Parallelism hint passed through to the wrapped build tools.
  pub jobs: usize,
}

impl BuildConfig {
  pub fn new(root: impl Into<PathBuf>, prefix: impl Into<PathBuf>, target: Target, jobs: usize) -> Self {
    Self {
      root: root.into(),
      prefix: prefix.into(),
      target,
      jobs,
    }
  }

  pub fn source_dir(&self, package: &str) -> PathBuf {
    self.root.join("src").join(package)
  }

  pub fn build_root(&self) -> PathBuf {
    self.root.join(format!("{}-build", self.target))
  }

  pub fn build_dir(&self, package: &str) -> PathBuf {
    self.build_root().join(package)
  }

  pub fn state_db_path(&self) -> PathBuf {
    self.root.join("sources.db")
  }

  /// The generated site configuration consumed by later b2 invocations.
  pub fn site_config_path(&self) -> PathBuf {
    self
      .prefix
      .join("share")
      .join("boost-build")
      .join("site-config.jam")
  }

  /// The b2 binary once the build-system generator is installed.
  pub fn b2_path(&self) -> PathBuf {
    self.prefix.join("bin").join("b2")
  }
}
