//! Stage rules for FFTW, the autotools-built numerics library.
//!
//! Configure runs out-of-tree in the per-target build directory, with a
//! per-target argument table supplying cross host triples and 32-bit
//! compiler overrides. Staleness is judged from autotools' own `config.log`
//! and the artifacts each stage leaves behind.

use std::path::PathBuf;

use crate::config::BuildConfig;
use crate::pipeline::{RulesError, StageRules};
use crate::process::{Exec, StageLog};
use crate::rules::Package;
use crate::source::Source;
use crate::target::Target;

/// Marker autotools writes to config.log on a clean exit.
const CONFIGURE_OK: &str = "configure: exit 0";

#[derive(Debug)]
pub struct FftwRules {
  config: BuildConfig,
  source: Source,
}

impl FftwRules {
  pub fn new(config: &BuildConfig) -> Self {
    let source = Source::new("fftw", config.source_dir("fftw"), Package::Fftw.origin());
    Self {
      config: config.clone(),
      source,
    }
  }

  fn build_dir(&self) -> PathBuf {
    self.config.build_dir("fftw")
  }

  /// Full configure argument list for this target.
  fn configure_args(&self) -> Vec<String> {
    let mut args = vec![
      format!("--prefix={}", self.config.prefix.display()),
      "--enable-static".to_string(),
      "--enable-shared".to_string(),
      "--enable-threads".to_string(),
      "--with-combined-threads".to_string(),
      "--enable-sse2".to_string(),
    ];

    match self.config.target {
      Target::X86_64 => {}
      Target::I686 => {
        args.push("--host=i686-pc-linux-gnu".to_string());
        args.push("CC=gcc -m32".to_string());
        args.push("F77=gfortran -m32".to_string());
      }
      Target::Mingw32 | Target::Mingw64 => {
        let triple = self.config.target.host_triple().expect("cross target has a triple");
        args.push(format!("--host={triple}"));
        args.push("--disable-alloca".to_string());
        args.push("--with-our-malloc16".to_string());
        args.push("--with-windows-f77-mangling".to_string());
      }
    }

    args
  }

  fn wisdom_tool(&self) -> PathBuf {
    self.build_dir().join("tools").join("fftw-wisdom")
  }
}

impl StageRules for FftwRules {
  fn package(&self) -> &'static str {
    "fftw"
  }

  fn source(&self) -> &Source {
    &self.source
  }

  fn log_dir(&self) -> PathBuf {
    self.build_dir()
  }

  fn run_configure(&mut self, log: &StageLog) -> Result<(), RulesError> {
    Exec::new(self.source.dir().join("configure").display().to_string())
      .args(self.configure_args())
      .current_dir(self.build_dir())
      .run(Some(log))?;
    Ok(())
  }

  fn check_configured(&self) -> bool {
    // autotools' own log, not the stage log.
    StageLog::new(&self.build_dir(), "config").contains(CONFIGURE_OK)
  }

  fn run_build(&mut self, log: &StageLog) -> Result<(), RulesError> {
    Exec::new("make")
      .arg(format!("-j{}", self.config.jobs))
      .current_dir(self.build_dir())
      .run(Some(log))?;
    Ok(())
  }

  fn check_built(&self) -> bool {
    let wisdom = self.wisdom_tool();
    self.build_dir().join("libfftw3.la").exists()
      && (wisdom.exists() || wisdom.with_extension("exe").exists())
  }

  fn run_install(&mut self, log: &StageLog) -> Result<(), RulesError> {
    Exec::new("make")
      .arg(format!("-j{}", self.config.jobs))
      .arg("install")
      .current_dir(self.build_dir())
      .run(Some(log))?;
    Ok(())
  }

  fn check_installed(&self) -> bool {
    let prefix = &self.config.prefix;
    prefix.join("include").join("fftw3.h").exists() && prefix.join("lib").join("libfftw3.a").exists()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn args_for(target: Target) -> Vec<String> {
    let config = BuildConfig::new("/work", "/opt/env", target, 4);
    FftwRules::new(&config).configure_args()
  }

  #[test]
  fn native_64_has_no_host_override() {
    let args = args_for(Target::X86_64);
    assert!(args.contains(&"--prefix=/opt/env".to_string()));
    assert!(args.contains(&"--enable-sse2".to_string()));
    assert!(!args.iter().any(|a| a.starts_with("--host=")));
  }

  #[test]
  fn native_32_overrides_compilers() {
    let args = args_for(Target::I686);
    assert!(args.contains(&"--host=i686-pc-linux-gnu".to_string()));
    assert!(args.contains(&"CC=gcc -m32".to_string()));
    assert!(args.contains(&"F77=gfortran -m32".to_string()));
  }

  #[test]
  fn cross_targets_use_mingw_triples() {
    let args32 = args_for(Target::Mingw32);
    assert!(args32.contains(&"--host=i686-w64-mingw32".to_string()));
    assert!(args32.contains(&"--with-our-malloc16".to_string()));
    assert!(args32.contains(&"--with-windows-f77-mangling".to_string()));

    let args64 = args_for(Target::Mingw64);
    assert!(args64.contains(&"--host=x86_64-w64-mingw32".to_string()));
    assert!(args64.contains(&"--disable-alloca".to_string()));
  }

  #[test]
  fn configure_check_reads_autotools_log() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(temp.path(), "/opt/env", Target::X86_64, 1);
    let rules = FftwRules::new(&config);

    assert!(!rules.check_configured());

    let build_dir = rules.build_dir();
    std::fs::create_dir_all(&build_dir).unwrap();
    std::fs::write(build_dir.join("config.log"), "...\nconfigure: exit 0\n").unwrap();
    assert!(rules.check_configured());
  }

  #[test]
  fn built_check_accepts_exe_suffix() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(temp.path(), "/opt/env", Target::Mingw64, 1);
    let rules = FftwRules::new(&config);

    let build_dir = rules.build_dir();
    std::fs::create_dir_all(build_dir.join("tools")).unwrap();
    std::fs::write(build_dir.join("libfftw3.la"), "# libtool\n").unwrap();
    assert!(!rules.check_built());

    std::fs::write(build_dir.join("tools").join("fftw-wisdom.exe"), b"MZ").unwrap();
    assert!(rules.check_built());
  }
}
