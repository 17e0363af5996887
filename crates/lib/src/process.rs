//! Subprocess execution and per-stage build logs.
//!
//! Every external tool invocation in buildenv goes through [`Exec::run`]: the
//! child process blocks until completion, stdout and stderr are captured in
//! full, appended to the stage's log file, and attached verbatim to the error
//! when the tool exits nonzero. There are no retries.
//!
//! Stage logs double as staleness evidence: several packages record a success
//! marker in their configure output, and the pure [`StageLog::contains`] scan
//! is how the next run detects it.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ProcessError {
  /// The executable could not be found on PATH.
  ///
  /// Kept separate from other spawn failures so callers can skip optional
  /// tools with a warning instead of aborting.
  #[error("executable not found: {program}")]
  NotFound { program: String },

  /// The process could not be spawned.
  #[error("failed to spawn '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The process ran and exited nonzero. Captured output is attached.
  #[error("command '{program}' failed with status {code:?}\n{output}")]
  CommandFailed {
    program: String,
    code: Option<i32>,
    output: String,
  },

  /// Appending captured output to the stage log failed.
  #[error("failed to write log '{path}': {source}")]
  WriteLog {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// A per-stage log file at `<build-dir>/<stage>.log`.
///
/// Writes append; reads are pure and never create the file.
#[derive(Debug, Clone)]
pub struct StageLog {
  path: PathBuf,
}

impl StageLog {
  pub fn new(dir: &Path, stage_name: &str) -> Self {
    Self {
      path: dir.join(format!("{stage_name}.log")),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn exists(&self) -> bool {
    self.path.exists()
  }

  /// Scan the log for a marker line. Missing or unreadable logs count as
  /// "marker absent", never as an error; staleness checks must stay pure.
  pub fn contains(&self, marker: &str) -> bool {
    match std::fs::read(&self.path) {
      Ok(bytes) => String::from_utf8_lossy(&bytes).lines().any(|line| line.contains(marker)),
      Err(_) => false,
    }
  }

  fn append(&self, bytes: &[u8]) -> Result<(), ProcessError> {
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .map_err(|e| ProcessError::WriteLog {
        path: self.path.clone(),
        source: e,
      })?;
    file.write_all(bytes).map_err(|e| ProcessError::WriteLog {
      path: self.path.clone(),
      source: e,
    })
  }
}

/// Builder for one blocking external tool invocation.
#[derive(Debug)]
pub struct Exec {
  program: String,
  args: Vec<String>,
  cwd: Option<PathBuf>,
  envs: Vec<(String, String)>,
}

impl Exec {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: None,
      envs: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.envs.push((key.into(), value.into()));
    self
  }

  /// Run to completion, capturing all output.
  ///
  /// Both streams are appended to `log` when one is given. On success the
  /// captured stdout is returned; on nonzero exit the combined output rides
  /// along in [`ProcessError::CommandFailed`].
  pub fn run(&self, log: Option<&StageLog>) -> Result<String, ProcessError> {
    info!(program = %self.program, args = ?self.args, "running");

    let mut command = Command::new(&self.program);
    command.args(&self.args);
    if let Some(cwd) = &self.cwd {
      command.current_dir(cwd);
    }
    for (key, value) in &self.envs {
      command.env(key, value);
    }

    let output = command.output().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        ProcessError::NotFound {
          program: self.program.clone(),
        }
      } else {
        ProcessError::Spawn {
          program: self.program.clone(),
          source: e,
        }
      }
    })?;

    if let Some(log) = log {
      log.append(&output.stdout)?;
      log.append(&output.stderr)?;
      debug!(log = %log.path().display(), "output captured");
    }

    if !output.status.success() {
      let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
      combined.push_str(&String::from_utf8_lossy(&output.stderr));
      return Err(ProcessError::CommandFailed {
        program: self.program.clone(),
        code: output.status.code(),
        output: combined,
      });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn run_captures_stdout() {
    let out = Exec::new("echo").arg("hello").run(None).unwrap();
    assert_eq!(out.trim(), "hello");
  }

  #[test]
  fn run_appends_to_log() {
    let temp = TempDir::new().unwrap();
    let log = StageLog::new(temp.path(), "configure");

    Exec::new("echo").arg("first").run(Some(&log)).unwrap();
    Exec::new("echo").arg("second").run(Some(&log)).unwrap();

    let content = std::fs::read_to_string(log.path()).unwrap();
    assert!(content.contains("first"));
    assert!(content.contains("second"));
  }

  #[test]
  fn run_missing_program_is_not_found() {
    let result = Exec::new("definitely-not-a-real-tool-9f2a").run(None);
    assert!(matches!(result, Err(ProcessError::NotFound { .. })));
  }

  #[test]
  fn run_nonzero_exit_carries_output() {
    let temp = TempDir::new().unwrap();
    let log = StageLog::new(temp.path(), "build");

    let result = Exec::new("sh")
      .args(["-c", "echo diagnostic; exit 3"])
      .run(Some(&log))
      .unwrap_err();

    match result {
      ProcessError::CommandFailed { code, output, .. } => {
        assert_eq!(code, Some(3));
        assert!(output.contains("diagnostic"));
      }
      other => panic!("expected CommandFailed, got: {other}"),
    }
    // Failure output still lands in the log.
    assert!(log.contains("diagnostic"));
  }

  #[test]
  fn run_sets_env_and_cwd() {
    let temp = TempDir::new().unwrap();
    let out = Exec::new("sh")
      .args(["-c", "echo $BENV_TEST_VAR; pwd"])
      .current_dir(temp.path())
      .env("BENV_TEST_VAR", "injected")
      .run(None)
      .unwrap();
    assert!(out.contains("injected"));
  }

  #[test]
  fn log_contains_is_pure() {
    let temp = TempDir::new().unwrap();
    let log = StageLog::new(temp.path(), "configure");

    // Missing log: marker absent, and the scan must not create the file.
    assert!(!log.contains("done"));
    assert!(!log.exists());

    std::fs::write(log.path(), "step one\nall done\n").unwrap();
    assert!(log.contains("all done"));
    assert!(log.contains("all done"));
    assert!(!log.contains("never written"));
  }

  #[test]
  fn log_path_names_stage() {
    let log = StageLog::new(Path::new("/work/x86_64-build/fftw"), "install");
    assert_eq!(log.path(), Path::new("/work/x86_64-build/fftw/install.log"));
  }
}
