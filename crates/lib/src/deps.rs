//! Dynamic-library dependency closure check.
//!
//! Before a Windows build tree is packaged, every `.exe`/`.dll` in it is
//! scanned with `objdump -p` and its import table collected. Imports covered
//! by the system allowlist (`KERNEL*`, `USER*`, `msvcrt*`) are provided by
//! the OS; anything else would have to be copied into the archive, which is
//! a known, deliberately unimplemented gap. The check fails closed: refusing
//! to package beats shipping a broken archive.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::process::{Exec, ProcessError};

/// Errors from the dependency closure check.
#[derive(Debug, Error)]
pub enum DepsError {
  /// `objdump` failed or is missing.
  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("failed to scan '{path}': {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  /// Non-system runtime dependencies were found. Copying them into the
  /// archive is not implemented; packaging refuses rather than producing an
  /// incomplete archive.
  #[error("copying of runtime DLLs is not implemented; unresolved dependencies: {dlls:?}")]
  CopyUnimplemented { dlls: Vec<String> },
}

const DLL_NAME_PREFIX: &str = "dll name:";

/// Extract `DLL Name:` entries from `objdump -p` output.
pub fn parse_dll_names(output: &str) -> Vec<String> {
  output
    .lines()
    .filter_map(|line| {
      let line = line.trim_start();
      match line.get(..DLL_NAME_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(DLL_NAME_PREFIX) => {
          Some(line[DLL_NAME_PREFIX.len()..].trim().to_string())
        }
        _ => None,
      }
    })
    .collect()
}

/// True for DLLs every Windows installation provides.
pub fn is_system_dll(name: &str) -> bool {
  let lower = name.to_ascii_lowercase();
  lower.ends_with(".dll")
    && (lower.starts_with("kernel") || lower.starts_with("user") || lower.starts_with("msvcrt"))
}

/// Collect the union of DLL imports of every PE binary under `dir`.
pub fn scan_dynamic_deps(dir: &Path) -> Result<BTreeSet<String>, DepsError> {
  let mut dlls = BTreeSet::new();

  for entry in walkdir::WalkDir::new(dir) {
    let entry = entry.map_err(|e| DepsError::Walk {
      path: dir.to_path_buf(),
      source: e,
    })?;
    if !entry.file_type().is_file() || !is_pe_binary(entry.path()) {
      continue;
    }

    debug!(binary = %entry.path().display(), "reading import table");
    let out = Exec::new("objdump")
      .arg("-p")
      .arg(entry.path().display().to_string())
      .env("LANG", "C")
      .run(None)?;
    dlls.extend(parse_dll_names(&out));
  }

  Ok(dlls)
}

/// Verify that every runtime dependency in `dir` is system-provided.
pub fn assert_closure_complete(dir: &Path) -> Result<(), DepsError> {
  let dlls = scan_dynamic_deps(dir)?;
  let missing: Vec<String> = dlls.into_iter().filter(|d| !is_system_dll(d)).collect();

  if !missing.is_empty() {
    return Err(DepsError::CopyUnimplemented { dlls: missing });
  }

  info!(dir = %dir.display(), "dependency closure complete");
  Ok(())
}

fn is_pe_binary(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| e.eq_ignore_ascii_case("exe") || e.eq_ignore_ascii_case("dll"))
}
