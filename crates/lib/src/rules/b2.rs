//! Stage rules for b2, the build-system generator.
//!
//! b2 bootstraps itself from a pristine copy of its source tree, so
//! configure is destructive: the build directory is recreated from source on
//! every run. Install additionally generates the site configuration that
//! tells later b2 invocations which compiler to use and where previously
//! installed dependencies live.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::pipeline::{RulesError, StageRules};
use crate::process::{Exec, StageLog};
use crate::rules::Package;
use crate::source::Source;

/// Marker b2's bootstrap prints on success.
const BOOTSTRAP_DONE: &str = "Bootstrapping is done";

#[derive(Debug)]
pub struct B2Rules {
  config: BuildConfig,
  source: Source,
}

impl B2Rules {
  pub fn new(config: &BuildConfig) -> Self {
    let source = Source::new("b2", config.source_dir("b2"), Package::B2.origin());
    Self {
      config: config.clone(),
      source,
    }
  }

  fn build_dir(&self) -> PathBuf {
    self.config.build_dir("b2")
  }

  fn configure_log(&self) -> StageLog {
    StageLog::new(&self.build_dir(), "configure")
  }

  /// Body of `site-config.jam`, interpolating this target's toolchain
  /// directives and the install prefix's library/include locations.
  fn site_config_body(&self) -> String {
    let props = self.config.target.props();
    format!(
      r#"import os ;
import path ;

local build-dir = [ path.join {tmpdir} [ os.environ USER ] b2 ] ;

project site-config :
    build-dir $(build-dir) :
    requirements {requirements} ;

using {compiler} :
    {compiler_version} :
    {compiler_command} :
    {compiler_options} ;

local prefix = {prefix} ;

alias boost : : : :
    <include>$(prefix)/include/ ;

lib boost_program_options boost_system : : :
    <search>$(prefix)/lib/ :
    <include>$(prefix)/include/ ;

lib boost_chrono : boost_system : <name>boost_chrono :
    <search>$(prefix)/lib/ :
    <include>$(prefix)/include/ ;

lib fftw3 : : :
    <search>$(prefix)/lib/ :
    <include>$(prefix)/include/ ;
"#,
      tmpdir = std::env::temp_dir().display(),
      requirements = props.requirements,
      compiler = props.compiler,
      compiler_version = props.compiler_version,
      compiler_command = props.compiler_command,
      compiler_options = props.compiler_options,
      prefix = self.config.prefix.display(),
    )
  }
}

impl StageRules for B2Rules {
  fn package(&self) -> &'static str {
    "b2"
  }

  fn source(&self) -> &Source {
    &self.source
  }

  fn log_dir(&self) -> PathBuf {
    self.build_dir()
  }

  fn run_configure(&mut self, log: &StageLog) -> Result<(), RulesError> {
    let build_dir = self.build_dir();

    // Start from a pristine copy of the source tree; stale logs stay behind.
    match std::fs::remove_dir_all(&build_dir) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => {
        return Err(RulesError::PrepareTree {
          path: build_dir,
          source: e,
        });
      }
    }
    copy_tree(self.source.dir(), &build_dir).map_err(|e| RulesError::PrepareTree {
      path: build_dir.clone(),
      source: e,
    })?;

    Exec::new("./bootstrap.sh").current_dir(&build_dir).run(Some(log))?;
    Ok(())
  }

  fn check_configured(&self) -> bool {
    self.configure_log().contains(BOOTSTRAP_DONE)
  }

  fn run_build(&mut self, _log: &StageLog) -> Result<(), RulesError> {
    // Bootstrap already produced the b2 binary.
    Ok(())
  }

  fn check_built(&self) -> bool {
    self.check_configured()
  }

  fn run_install(&mut self, log: &StageLog) -> Result<(), RulesError> {
    Exec::new("./b2")
      .arg("install")
      .arg(format!("--prefix={}", self.config.prefix.display()))
      .current_dir(self.build_dir())
      .run(Some(log))?;

    let site_config = self.config.site_config_path();
    if let Some(parent) = site_config.parent() {
      std::fs::create_dir_all(parent).map_err(|e| RulesError::WriteFile {
        path: site_config.clone(),
        source: e,
      })?;
    }
    std::fs::write(&site_config, self.site_config_body()).map_err(|e| RulesError::WriteFile {
      path: site_config.clone(),
      source: e,
    })?;
    info!(path = %site_config.display(), "site configuration written");
    Ok(())
  }

  fn check_installed(&self) -> bool {
    self.config.site_config_path().exists()
  }
}

/// Recursively copy `src` into `dst`, skipping `*.log` files.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
  for entry in walkdir::WalkDir::new(src).min_depth(1) {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry
      .path()
      .strip_prefix(src)
      .expect("walkdir entries live under their root");
    let dest = dst.join(rel);

    if entry.file_type().is_dir() {
      std::fs::create_dir_all(&dest)?;
    } else if entry.path().extension().is_none_or(|e| e != "log") {
      if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::copy(entry.path(), &dest)?;
      debug!(file = %rel.display(), "copied");
    }
  }
  Ok(())
}
