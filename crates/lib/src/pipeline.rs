//! The incremental stage pipeline.
//!
//! Every package moves through the same lifecycle:
//!
//! ```text
//! fetch -> configure -> build -> install [-> pack]
//! ```
//!
//! Fetch belongs to the source descriptor and is driven before the pipeline
//! starts; the remaining stages are driven here. Each package variant
//! implements [`StageRules`]: a `run_*` hook that performs the stage and a
//! pure `check_*` predicate that inspects on-disk evidence (artifacts, log
//! markers, state records) for completion. The [`Pipeline`] driver itself is
//! not polymorphic: it owns the ordering, the skip decision and the
//! re-check-after-run contract.
//!
//! Staleness checks are re-evaluated on every run and never cached across
//! pipeline instances, so out-of-band changes (a manually deleted install
//! tree) are picked up at the cost of repeating filesystem probes.
//!
//! # Failure semantics
//!
//! A failing `run_*` hook aborts the run with the tool's captured output
//! attached. No partial-stage rollback happens; `run_configure` hooks are
//! destructive and idempotent, so the next run starts from a clean tree. A
//! `run_*` hook that returns success without its `check_*` predicate turning
//! true is itself a hard failure ([`PipelineError::StageIncomplete`]).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::archive::ArchiveError;
use crate::deps::DepsError;
use crate::process::{ProcessError, StageLog};
use crate::source::{Source, SourceError};

/// One unit of idempotent, checkable work in a package's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
  Fetch,
  Configure,
  Build,
  Install,
  Pack,
}

impl Stage {
  /// The stages the pipeline driver owns, in execution order.
  pub const PIPELINE: [Stage; 4] = [Stage::Configure, Stage::Build, Stage::Install, Stage::Pack];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Fetch => "fetch",
      Self::Configure => "configure",
      Self::Build => "build",
      Self::Install => "install",
      Self::Pack => "pack",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Errors raised by package stage hooks.
#[derive(Debug, Error)]
pub enum RulesError {
  /// An external build tool failed.
  #[error(transparent)]
  Process(#[from] ProcessError),

  /// Source acquisition or version discovery failed.
  #[error(transparent)]
  Source(#[from] SourceError),

  /// The dynamic-dependency closure check failed.
  #[error(transparent)]
  Deps(#[from] DepsError),

  /// Archive creation failed.
  #[error(transparent)]
  Archive(#[from] ArchiveError),

  /// Recreating a build tree failed.
  #[error("failed to prepare build tree '{path}': {source}")]
  PrepareTree {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Writing a generated file (e.g. the site config) failed.
  #[error("failed to write '{path}': {source}")]
  WriteFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Build was attempted before configure resolved the package version.
  #[error("package version is unresolved; configure did not discover it")]
  VersionUnresolved,

  /// Build was attempted before configure located the toolchain artifact.
  #[error("toolchain artifact path is unresolved; configure did not discover it")]
  ToolPathUnresolved,

  /// `pack` was requested on a package that does not produce an archive.
  #[error("package '{package}' does not produce an archive")]
  PackUnsupported { package: String },
}

/// Per-package stage capabilities.
///
/// `run_*` hooks perform work and may fail; `check_*` predicates are pure:
/// they inspect the filesystem and in-memory discovery results but never
/// mutate either. The default `pack` pair marks a package that installs into
/// the shared prefix instead of producing an archive.
pub trait StageRules: fmt::Debug {
  fn package(&self) -> &'static str;

  /// The source descriptor, used by the driver for the fetch stage.
  fn source(&self) -> &Source;

  /// Directory holding this package's stage logs (its build directory).
  fn log_dir(&self) -> PathBuf;

  /// True for variants whose terminal operation is `pack`, not `install`.
  fn is_packager(&self) -> bool {
    false
  }

  fn run_configure(&mut self, log: &StageLog) -> Result<(), RulesError>;
  fn check_configured(&self) -> bool;

  fn run_build(&mut self, log: &StageLog) -> Result<(), RulesError>;
  fn check_built(&self) -> bool;

  fn run_install(&mut self, log: &StageLog) -> Result<(), RulesError>;
  fn check_installed(&self) -> bool;

  fn run_pack(&mut self, _log: &StageLog) -> Result<(), RulesError> {
    Err(RulesError::PackUnsupported {
      package: self.package().to_string(),
    })
  }

  fn check_packed(&self) -> bool {
    false
  }
}

/// Errors from driving a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Rules(#[from] RulesError),

  /// A stage hook reported success but its staleness check still fails.
  #[error("stage '{stage}' of package '{package}' completed without evidence of success")]
  StageIncomplete { package: String, stage: Stage },

  #[error("failed to create build directory '{path}': {source}")]
  CreateBuildDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Drives one package through its stages, skipping completed work.
pub struct Pipeline {
  rules: Box<dyn StageRules>,
}

impl Pipeline {
  pub fn new(rules: Box<dyn StageRules>) -> Self {
    Self { rules }
  }

  pub fn rules(&self) -> &dyn StageRules {
    self.rules.as_ref()
  }

  /// Pure passthrough to the stage's staleness predicate.
  pub fn stage_complete(&self, stage: Stage) -> bool {
    match stage {
      Stage::Fetch => true,
      Stage::Configure => self.rules.check_configured(),
      Stage::Build => self.rules.check_built(),
      Stage::Install => self.rules.check_installed(),
      Stage::Pack => self.rules.check_packed(),
    }
  }

  /// Force every stage up to and including `upto`.
  ///
  /// Stages whose staleness check passes are skipped; a skipped or completed
  /// stage is a precondition for the next one, so completion is monotonic
  /// within a run. After a stage hook runs, its check is re-evaluated; a
  /// check that still fails is a hard error rather than a silent success.
  pub fn ensure(&mut self, upto: Stage) -> Result<(), PipelineError> {
    let package = self.rules.package();

    for stage in Stage::PIPELINE.into_iter().filter(|s| *s <= upto) {
      if self.stage_complete(stage) {
        debug!(package, stage = %stage, "stage already complete, skipping");
        continue;
      }

      let log_dir = self.rules.log_dir();
      std::fs::create_dir_all(&log_dir).map_err(|e| PipelineError::CreateBuildDir {
        path: log_dir.clone(),
        source: e,
      })?;
      let log = StageLog::new(&log_dir, stage.as_str());

      info!(package, stage = %stage, "running stage");
      self.run(stage, &log)?;

      if !self.stage_complete(stage) {
        return Err(PipelineError::StageIncomplete {
          package: package.to_string(),
          stage,
        });
      }
      info!(package, stage = %stage, "stage complete");
    }

    Ok(())
  }

  /// Force configure, build and install.
  pub fn install(&mut self) -> Result<(), PipelineError> {
    self.ensure(Stage::Install)
  }

  /// Force the full lifecycle through archive packaging.
  pub fn pack(&mut self) -> Result<(), PipelineError> {
    self.ensure(Stage::Pack)
  }

  fn run(&mut self, stage: Stage, log: &StageLog) -> Result<(), RulesError> {
    match stage {
      Stage::Fetch => Ok(()),
      Stage::Configure => self.rules.run_configure(log),
      Stage::Build => self.rules.run_build(log),
      Stage::Install => self.rules.run_install(log),
      Stage::Pack => self.rules.run_pack(log),
    }
  }
}
