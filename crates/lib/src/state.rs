//! Persistent incremental-build state.
//!
//! A single JSON document at `<root>/sources.db` maps
//! `(package, target, stage)` to a [`StageRecord`]. The store is opened once
//! per run, mutated in memory, and written back atomically (temp file +
//! rename). `close` flushes explicitly; `Drop` flushes best-effort so state
//! survives every exit path. Concurrent runs are not supported; there is no
//! lock.
//!
//! The schema carries a version field; an unknown version or unparsable file
//! is a typed error rather than a silent reset, so format changes cannot
//! corrupt records quietly.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::pipeline::Stage;
use crate::target::Target;

pub const STATE_DB_VERSION: u32 = 1;

/// Errors from the persistent state store.
#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to read state store '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("state store '{path}' is corrupt: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("state store version {0} is not supported")]
  UnsupportedVersion(u32),

  #[error("failed to write state store '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize state store: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// Completion metadata for one `(package, target, stage)`.
///
/// Enough to answer "was this stage completed, and is that completion still
/// valid": the resolved source revision for fetch, a discovered version
/// string or toolchain detail where a stage produces one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub commit: Option<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDb {
  version: u32,
  records: BTreeMap<String, StageRecord>,
}

impl StateDb {
  fn empty() -> Self {
    Self {
      version: STATE_DB_VERSION,
      records: BTreeMap::new(),
    }
  }
}

/// The on-disk key-value store backing incremental builds.
#[derive(Debug)]
pub struct StateStore {
  path: PathBuf,
  db: StateDb,
  dirty: bool,
}

impl StateStore {
  /// Open the store, creating an empty one in memory if the file is absent.
  pub fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
    let path = path.into();

    let db = match std::fs::read_to_string(&path) {
      Ok(content) => {
        let db: StateDb = serde_json::from_str(&content).map_err(|e| StateError::Parse {
          path: path.clone(),
          source: e,
        })?;
        if db.version != STATE_DB_VERSION {
          return Err(StateError::UnsupportedVersion(db.version));
        }
        db
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => StateDb::empty(),
      Err(e) => {
        return Err(StateError::Read {
          path: path.clone(),
          source: e,
        });
      }
    };

    debug!(path = %path.display(), records = db.records.len(), "state store opened");
    Ok(Self {
      path,
      db,
      dirty: false,
    })
  }

  fn key(package: &str, target: Target, stage: Stage) -> String {
    format!("{package}/{target}/{stage}")
  }

  pub fn get(&self, package: &str, target: Target, stage: Stage) -> Option<&StageRecord> {
    self.db.records.get(&Self::key(package, target, stage))
  }

  pub fn set(&mut self, package: &str, target: Target, stage: Stage, record: StageRecord) {
    self.db.records.insert(Self::key(package, target, stage), record);
    self.dirty = true;
  }

  pub fn len(&self) -> usize {
    self.db.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.db.records.is_empty()
  }

  /// Write the store to disk if anything changed since the last flush.
  pub fn flush(&mut self) -> Result<(), StateError> {
    if !self.dirty {
      return Ok(());
    }

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|e| StateError::Write {
        path: self.path.clone(),
        source: e,
      })?;
    }

    let content = serde_json::to_string_pretty(&self.db).map_err(StateError::Serialize)?;
    let temp_path = self.path.with_extension("db.tmp");
    std::fs::write(&temp_path, &content).map_err(|e| StateError::Write {
      path: temp_path.clone(),
      source: e,
    })?;
    std::fs::rename(&temp_path, &self.path).map_err(|e| StateError::Write {
      path: self.path.clone(),
      source: e,
    })?;

    self.dirty = false;
    debug!(path = %self.path.display(), "state store flushed");
    Ok(())
  }

  /// Flush and consume the store.
  pub fn close(mut self) -> Result<(), StateError> {
    self.flush()
  }
}

impl Drop for StateStore {
  fn drop(&mut self) {
    if let Err(e) = self.flush() {
      warn!(error = %e, "failed to flush state store on drop");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn db_path(temp: &TempDir) -> PathBuf {
    temp.path().join("sources.db")
  }

  #[test]
  fn open_missing_file_is_empty() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::open(db_path(&temp)).unwrap();
    assert!(store.is_empty());
    // Opening must not create the file.
    assert!(!db_path(&temp).exists());
  }

  #[test]
  fn set_flush_reopen_roundtrip() {
    let temp = TempDir::new().unwrap();

    let mut store = StateStore::open(db_path(&temp)).unwrap();
    store.set(
      "fftw",
      Target::X86_64,
      Stage::Fetch,
      StageRecord {
        commit: Some("abc123".to_string()),
        ..Default::default()
      },
    );
    store.close().unwrap();

    let store = StateStore::open(db_path(&temp)).unwrap();
    let record = store.get("fftw", Target::X86_64, Stage::Fetch).unwrap();
    assert_eq!(record.commit.as_deref(), Some("abc123"));
  }

  #[test]
  fn get_absent_key_is_none() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::open(db_path(&temp)).unwrap();
    assert!(store.get("boost", Target::I686, Stage::Configure).is_none());
  }

  #[test]
  fn keys_are_target_and_stage_scoped() {
    let temp = TempDir::new().unwrap();
    let mut store = StateStore::open(db_path(&temp)).unwrap();

    store.set("b2", Target::X86_64, Stage::Fetch, StageRecord::default());

    assert!(store.get("b2", Target::X86_64, Stage::Fetch).is_some());
    assert!(store.get("b2", Target::Mingw64, Stage::Fetch).is_none());
    assert!(store.get("b2", Target::X86_64, Stage::Configure).is_none());
    assert!(store.get("boost", Target::X86_64, Stage::Fetch).is_none());
  }

  #[test]
  fn set_overwrites_previous_record() {
    let temp = TempDir::new().unwrap();
    let mut store = StateStore::open(db_path(&temp)).unwrap();

    store.set(
      "spectra",
      Target::X86_64,
      Stage::Fetch,
      StageRecord {
        commit: Some("old".to_string()),
        ..Default::default()
      },
    );
    store.set(
      "spectra",
      Target::X86_64,
      Stage::Fetch,
      StageRecord {
        commit: Some("new".to_string()),
        ..Default::default()
      },
    );

    assert_eq!(store.len(), 1);
    assert_eq!(
      store
        .get("spectra", Target::X86_64, Stage::Fetch)
        .unwrap()
        .commit
        .as_deref(),
      Some("new")
    );
  }

  #[test]
  fn drop_flushes_dirty_state() {
    let temp = TempDir::new().unwrap();

    {
      let mut store = StateStore::open(db_path(&temp)).unwrap();
      store.set("fftw", Target::I686, Stage::Fetch, StageRecord::default());
      // No explicit flush/close.
    }

    let store = StateStore::open(db_path(&temp)).unwrap();
    assert!(store.get("fftw", Target::I686, Stage::Fetch).is_some());
  }

  #[test]
  fn flush_without_changes_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let mut store = StateStore::open(db_path(&temp)).unwrap();
    store.flush().unwrap();
    assert!(!db_path(&temp).exists());
  }

  #[test]
  fn corrupt_file_is_a_typed_error() {
    let temp = TempDir::new().unwrap();
    std::fs::write(db_path(&temp), "not json {{{").unwrap();

    let result = StateStore::open(db_path(&temp));
    assert!(matches!(result, Err(StateError::Parse { .. })));
  }

  #[test]
  fn unsupported_version_is_rejected() {
    let temp = TempDir::new().unwrap();
    std::fs::write(db_path(&temp), r#"{"version": 99, "records": {}}"#).unwrap();

    let result = StateStore::open(db_path(&temp));
    assert!(matches!(result, Err(StateError::UnsupportedVersion(99))));
  }

  #[test]
  fn record_fields_roundtrip() {
    let temp = TempDir::new().unwrap();
    let mut store = StateStore::open(db_path(&temp)).unwrap();

    store.set(
      "spectra",
      Target::Mingw64,
      Stage::Configure,
      StageRecord {
        version: Some("3.2.1".to_string()),
        commit: None,
        detail: Some("tcode".to_string()),
      },
    );
    store.close().unwrap();

    let store = StateStore::open(db_path(&temp)).unwrap();
    let record = store.get("spectra", Target::Mingw64, Stage::Configure).unwrap();
    assert_eq!(record.version.as_deref(), Some("3.2.1"));
    assert_eq!(record.detail.as_deref(), Some("tcode"));
    assert!(record.commit.is_none());
  }
}
