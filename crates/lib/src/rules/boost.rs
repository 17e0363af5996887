//! Stage rules for the Boost libraries.
//!
//! Boost is built with the b2 installed by the previous package in the
//! chain. Its own bootstrap runs in the source tree and is sensitive to a
//! leftover `boost-build.jam`, which is removed before every configure and
//! asserted absent by the staleness check.

use std::io;
use std::path::PathBuf;

use crate::config::BuildConfig;
use crate::pipeline::{RulesError, StageRules};
use crate::process::{Exec, StageLog};
use crate::rules::Package;
use crate::source::Source;

const BOOTSTRAP_DONE: &str = "Bootstrapping is done";

/// Libraries the chain needs; keeps the boost build small.
const WITH_LIBRARIES: &str = "--with-libraries=program_options,chrono,system";

#[derive(Debug)]
pub struct BoostRules {
  config: BuildConfig,
  source: Source,
}

impl BoostRules {
  pub fn new(config: &BuildConfig) -> Self {
    let source = Source::new("boost", config.source_dir("boost"), Package::Boost.origin());
    Self {
      config: config.clone(),
      source,
    }
  }

  fn build_dir(&self) -> PathBuf {
    self.config.build_dir("boost")
  }

  fn stale_jam(&self) -> PathBuf {
    self.source.dir().join("boost-build.jam")
  }

  fn configure_log(&self) -> StageLog {
    StageLog::new(&self.build_dir(), "configure")
  }

  /// Arguments for the shared b2 build/install invocation.
  fn b2_args(&self) -> Vec<String> {
    vec![
      format!("-j{}", self.config.jobs),
      format!("--stagedir={}", self.build_dir().display()),
      format!("--prefix={}", self.config.prefix.display()),
      "--layout=tagged".to_string(),
      "link=static,shared".to_string(),
      "threading=single,multi".to_string(),
    ]
  }
}

impl StageRules for BoostRules {
  fn package(&self) -> &'static str {
    "boost"
  }

  fn source(&self) -> &Source {
    &self.source
  }

  fn log_dir(&self) -> PathBuf {
    self.build_dir()
  }

  fn run_configure(&mut self, log: &StageLog) -> Result<(), RulesError> {
    match std::fs::remove_file(self.stale_jam()) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => {
        return Err(RulesError::PrepareTree {
          path: self.stale_jam(),
          source: e,
        });
      }
    }

    Exec::new(self.source.dir().join("bootstrap.sh").display().to_string())
      .arg(format!("--prefix={}", self.config.prefix.display()))
      .arg(format!("--with-bjam={}", self.config.b2_path().display()))
      .arg("--with-toolset=gcc")
      .arg("--without-icu")
      .arg(WITH_LIBRARIES)
      .current_dir(self.source.dir())
      .run(Some(log))?;
    Ok(())
  }

  fn check_configured(&self) -> bool {
    self.configure_log().contains(BOOTSTRAP_DONE) && !self.stale_jam().exists()
  }

  fn run_build(&mut self, log: &StageLog) -> Result<(), RulesError> {
    Exec::new(self.config.b2_path().display().to_string())
      .args(self.b2_args())
      .current_dir(self.source.dir())
      .run(Some(log))?;
    Ok(())
  }

  fn check_built(&self) -> bool {
    self.build_dir().join("lib").join("libboost_program_options.a").exists()
  }

  fn run_install(&mut self, log: &StageLog) -> Result<(), RulesError> {
    Exec::new(self.config.b2_path().display().to_string())
      .args(self.b2_args())
      .arg("install")
      .current_dir(self.source.dir())
      .run(Some(log))?;
    Ok(())
  }

  fn check_installed(&self) -> bool {
    let prefix = &self.config.prefix;
    prefix.join("include").join("boost").join("config.hpp").exists()
      && prefix.join("lib").join("libboost_program_options.a").exists()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::Target;
  use tempfile::TempDir;

  #[test]
  fn b2_args_carry_layout_and_parallelism() {
    let config = BuildConfig::new("/work", "/opt/env", Target::X86_64, 8);
    let args = BoostRules::new(&config).b2_args();

    assert!(args.contains(&"-j8".to_string()));
    assert!(args.contains(&"--stagedir=/work/x86_64-build/boost".to_string()));
    assert!(args.contains(&"--prefix=/opt/env".to_string()));
    assert!(args.contains(&"--layout=tagged".to_string()));
    assert!(args.contains(&"link=static,shared".to_string()));
    assert!(args.contains(&"threading=single,multi".to_string()));
  }

  #[test]
  fn configure_check_requires_marker_and_clean_tree() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(temp.path(), "/opt/env", Target::X86_64, 1);
    let rules = BoostRules::new(&config);

    assert!(!rules.check_configured());

    let build_dir = rules.build_dir();
    std::fs::create_dir_all(&build_dir).unwrap();
    std::fs::write(build_dir.join("configure.log"), "...\nBootstrapping is done\n").unwrap();
    assert!(rules.check_configured());

    // A leftover boost-build.jam invalidates the configure.
    std::fs::create_dir_all(rules.source.dir()).unwrap();
    std::fs::write(rules.stale_jam(), "boost-build ;").unwrap();
    assert!(!rules.check_configured());
  }

  #[test]
  fn built_check_looks_for_staged_library() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(temp.path(), temp.path().join("env"), Target::I686, 1);
    let rules = BoostRules::new(&config);

    assert!(!rules.check_built());

    let lib_dir = rules.build_dir().join("lib");
    std::fs::create_dir_all(&lib_dir).unwrap();
    std::fs::write(lib_dir.join("libboost_program_options.a"), b"!<arch>").unwrap();
    assert!(rules.check_built());
  }

  #[test]
  fn installed_check_needs_headers_and_library() {
    let temp = TempDir::new().unwrap();
    let prefix = temp.path().join("env");
    let config = BuildConfig::new(temp.path(), &prefix, Target::X86_64, 1);
    let rules = BoostRules::new(&config);

    assert!(!rules.check_installed());

    std::fs::create_dir_all(prefix.join("include").join("boost")).unwrap();
    std::fs::write(prefix.join("include").join("boost").join("config.hpp"), "//").unwrap();
    assert!(!rules.check_installed());

    std::fs::create_dir_all(prefix.join("lib")).unwrap();
    std::fs::write(prefix.join("lib").join("libboost_program_options.a"), b"!<arch>").unwrap();
    assert!(rules.check_installed());
  }
}
