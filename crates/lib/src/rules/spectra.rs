//! Stage rules for spectra, the final application.
//!
//! Unlike the library packages, spectra's configure performs discovery
//! instead of tree preparation: the version comes from version-control tags
//! and the path of the generated toolchain-identification binary (`tcode`)
//! is found by running b2 in dry-run mode and scanning its output for the
//! copy action that places it. Both are hard preconditions for the build.
//!
//! The terminal operation is `pack`, not `install`: install degenerates to
//! the dynamic-dependency closure gate, and pack writes the versioned
//! distributable archive into the working root.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::archive::{self, ArchiveFormat};
use crate::config::BuildConfig;
use crate::deps;
use crate::pipeline::{RulesError, StageRules};
use crate::process::{Exec, ProcessError, StageLog};
use crate::rules::Package;
use crate::source::Source;

pub const PACKAGE: &str = "spectra";

#[derive(Debug)]
pub struct SpectraRules {
  config: BuildConfig,
  source: Source,
  version: Option<String>,
  tcode: Option<PathBuf>,
  deps_checked: bool,
}

impl SpectraRules {
  pub fn new(config: &BuildConfig) -> Self {
    let source = Source::new(PACKAGE, config.source_dir(PACKAGE), Package::Spectra.origin());
    Self {
      config: config.clone(),
      source,
      version: None,
      tcode: None,
      deps_checked: false,
    }
  }

  fn build_dir(&self) -> PathBuf {
    self.config.build_dir(PACKAGE)
  }

  fn archive_path(&self) -> Option<PathBuf> {
    let version = self.version.as_deref()?;
    Some(
      self
        .config
        .root
        .join(archive::file_name(PACKAGE, version, self.config.target, "")),
    )
  }

  /// Toolset version of the host compiler, for the tcode dry run.
  fn local_gcc_version(&self, log: &StageLog) -> Result<String, RulesError> {
    let out = Exec::new("gcc").arg("-dumpversion").run(Some(log))?;
    Ok(out.trim().to_string())
  }
}

impl StageRules for SpectraRules {
  fn package(&self) -> &'static str {
    PACKAGE
  }

  fn source(&self) -> &Source {
    &self.source
  }

  fn log_dir(&self) -> PathBuf {
    self.build_dir()
  }

  fn is_packager(&self) -> bool {
    true
  }

  fn run_configure(&mut self, log: &StageLog) -> Result<(), RulesError> {
    let version = self.source.describe_version(Some(log))?;

    // The tcode generator is built for the *host*: it runs during the
    // target build, so the dry run pins host toolset, OS and word size.
    let gcc_version = self.local_gcc_version(log)?;
    let host_bits = if cfg!(target_pointer_width = "64") { 64 } else { 32 };
    let out = Exec::new(self.config.b2_path().display().to_string())
      .arg("-a")
      .arg(format!("toolset=gcc-{gcc_version}"))
      .arg(format!("target-os={}", std::env::consts::OS))
      .arg(format!("address-model={host_bits}"))
      .arg("/tools//tcode")
      .current_dir(self.source.dir())
      .run(Some(log))?;

    self.tcode = parse_tcode_output(&out);
    self.version = Some(version);

    info!(version = self.version.as_deref().unwrap_or("?"), "version discovered");
    info!(tcode = ?self.tcode, "toolchain artifact located");
    if let Some(path) = self.archive_path() {
      info!(archive = %path.display(), "archive name resolved");
    }
    Ok(())
  }

  fn check_configured(&self) -> bool {
    self.version.is_some() && self.tcode.is_some()
  }

  fn run_build(&mut self, log: &StageLog) -> Result<(), RulesError> {
    // API documentation is a nice-to-have; skip when doxygen is absent.
    let doc_dir = self.source.dir().join("doc");
    if doc_dir.is_dir() {
      match Exec::new("doxygen").current_dir(&doc_dir).run(Some(log)) {
        Ok(_) => info!("documentation built"),
        Err(ProcessError::NotFound { .. }) => {
          warn!("doxygen not found; skipping documentation build");
        }
        Err(e) => return Err(e.into()),
      }
    }

    let version = self.version.as_deref().ok_or(RulesError::VersionUnresolved)?;
    let tcode = self.tcode.as_ref().ok_or(RulesError::ToolPathUnresolved)?;
    info!(version, "building application");

    Exec::new(self.config.b2_path().display().to_string())
      .arg(format!("-j{}", self.config.jobs))
      .arg(format!("--prefix={}", self.build_dir().display()))
      .arg("link=static")
      .arg(format!("tcode={}", tcode.display()))
      .arg("/spectra//install")
      .current_dir(self.source.dir())
      .run(Some(log))?;
    Ok(())
  }

  fn check_built(&self) -> bool {
    let bin = self.build_dir().join("bin");
    bin.join(PACKAGE).exists() || bin.join(format!("{PACKAGE}.exe")).exists()
  }

  fn run_install(&mut self, _log: &StageLog) -> Result<(), RulesError> {
    deps::assert_closure_complete(&self.build_dir())?;
    self.deps_checked = true;
    Ok(())
  }

  fn check_installed(&self) -> bool {
    self.deps_checked
  }

  fn run_pack(&mut self, _log: &StageLog) -> Result<(), RulesError> {
    let version = self.version.as_deref().ok_or(RulesError::VersionUnresolved)?;
    let dest = self
      .config
      .root
      .join(archive::file_name(PACKAGE, version, self.config.target, ""));
    let base = archive::base_name(PACKAGE, version, self.config.target, "");
    let format = ArchiveFormat::for_target(self.config.target);

    archive::create(&self.build_dir(), &dest, &base, format)?;
    info!(archive = %dest.display(), "archive written");
    Ok(())
  }

  fn check_packed(&self) -> bool {
    self.archive_path().is_some_and(|p| p.exists())
  }
}

/// Find the tcode path in b2 dry-run output.
///
/// The copy action that places the artifact is the last `common.copy` line,
/// so the scan walks bottom-up.
fn parse_tcode_output(out: &str) -> Option<PathBuf> {
  out.lines().rev().find_map(|line| {
    line.strip_prefix("common.copy").and_then(|rest| {
      if !rest.chars().next().is_some_and(char::is_whitespace) {
        return None;
      }
      let rest = rest.trim();
      (!rest.is_empty()).then(|| PathBuf::from(rest))
    })
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::target::Target;
  use tempfile::TempDir;

  fn rules(target: Target) -> SpectraRules {
    let config = BuildConfig::new("/work", "/opt/env", target, 4);
    SpectraRules::new(&config)
  }

  #[test]
  fn parse_tcode_takes_last_copy_line() {
    let out = "\
...found 12 targets...
common.copy /work/first/tcode
gcc.compile.c++ tools/obj/tcode.o
common.copy /work/x86_64-build/tools/tcode
";
    assert_eq!(
      parse_tcode_output(out),
      Some(PathBuf::from("/work/x86_64-build/tools/tcode"))
    );
  }

  #[test]
  fn parse_tcode_requires_copy_line() {
    assert_eq!(parse_tcode_output("...found 12 targets...\n"), None);
    assert_eq!(parse_tcode_output("common.copy\n"), None);
    assert_eq!(parse_tcode_output("common.copying nothing\n"), None);
  }

  #[test]
  fn unconfigured_until_discovery_completes() {
    let mut r = rules(Target::X86_64);
    assert!(!r.check_configured());

    r.version = Some("3.2.1".to_string());
    assert!(!r.check_configured());

    r.tcode = Some(PathBuf::from("/work/tools/tcode"));
    assert!(r.check_configured());
  }

  #[test]
  fn archive_path_depends_on_version() {
    let mut r = rules(Target::X86_64);
    assert!(r.archive_path().is_none());

    r.version = Some("3.2.1".to_string());
    assert_eq!(
      r.archive_path(),
      Some(PathBuf::from("/work/spectra-3.2.1-linux64.tar.bz2"))
    );
  }

  #[test]
  fn archive_path_uses_zip_for_cross_targets() {
    let mut r = rules(Target::Mingw64);
    r.version = Some("3.2.1".to_string());
    assert_eq!(
      r.archive_path(),
      Some(PathBuf::from("/work/spectra-3.2.1-windows64.zip"))
    );
  }

  #[test]
  fn build_fails_without_discovery() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(temp.path(), "/opt/env", Target::X86_64, 1);
    let mut r = SpectraRules::new(&config);
    let log = StageLog::new(temp.path(), "build");

    assert!(matches!(r.run_build(&log), Err(RulesError::VersionUnresolved)));

    r.version = Some("3.2.1".to_string());
    assert!(matches!(r.run_build(&log), Err(RulesError::ToolPathUnresolved)));
  }

  #[test]
  fn built_check_accepts_either_binary_name() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(temp.path(), "/opt/env", Target::Mingw32, 1);
    let r = SpectraRules::new(&config);

    assert!(!r.check_built());

    let bin = r.build_dir().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    std::fs::write(bin.join("spectra.exe"), b"MZ").unwrap();
    assert!(r.check_built());
  }

  #[test]
  fn install_is_the_closure_gate() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(temp.path(), "/opt/env", Target::X86_64, 1);
    let mut r = SpectraRules::new(&config);
    std::fs::create_dir_all(r.build_dir()).unwrap();
    let log = StageLog::new(temp.path(), "install");

    assert!(!r.check_installed());
    r.run_install(&log).unwrap();
    assert!(r.check_installed());
  }

  #[test]
  fn packed_once_archive_exists() {
    let temp = TempDir::new().unwrap();
    let config = BuildConfig::new(temp.path(), "/opt/env", Target::X86_64, 1);
    let mut r = SpectraRules::new(&config);

    r.version = Some("1.0".to_string());
    assert!(!r.check_packed());

    std::fs::write(temp.path().join("spectra-1.0-linux64.tar.bz2"), b"BZh").unwrap();
    assert!(r.check_packed());
  }
}
