//! Distributable archive creation and naming.
//!
//! Archives are named `{package}-{version}-{platform}{bits}{tag}` and use
//! the platform's conventional container: bzip2-compressed tar on the Linux
//! targets, zip on the Windows cross targets. The archive holds the build
//! tree under a single top-level directory named after the archive base.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use bzip2::Compression;
use bzip2::write::BzEncoder;
use thiserror::Error;
use tracing::info;
use zip::write::SimpleFileOptions;

use crate::target::Target;

/// Errors from archive creation.
#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to create archive '{path}': {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to add '{path}' to archive: {source}")]
  Append {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write zip archive '{path}': {source}")]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },
}

/// Compression container, selected by target platform convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
  TarBz2,
  Zip,
}

impl ArchiveFormat {
  pub fn for_target(target: Target) -> Self {
    if target.is_windows() { Self::Zip } else { Self::TarBz2 }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      Self::TarBz2 => "tar.bz2",
      Self::Zip => "zip",
    }
  }
}

/// `{package}-{version}-{platform}{bits}{tag}`.
pub fn base_name(package: &str, version: &str, target: Target, tag: &str) -> String {
  format!(
    "{package}-{version}-{platform}{bits}{tag}",
    platform = target.platform_label(),
    bits = target.address_model(),
  )
}

/// Base name plus the format extension for the target.
pub fn file_name(package: &str, version: &str, target: Target, tag: &str) -> String {
  format!(
    "{}.{}",
    base_name(package, version, target, tag),
    ArchiveFormat::for_target(target).extension()
  )
}

/// Pack the contents of `src_dir` into `dest`, rooted at `root_name/`.
pub fn create(src_dir: &Path, dest: &Path, root_name: &str, format: ArchiveFormat) -> Result<(), ArchiveError> {
  info!(archive = %dest.display(), from = %src_dir.display(), "creating archive");

  match format {
    ArchiveFormat::TarBz2 => create_tar_bz2(src_dir, dest, root_name),
    ArchiveFormat::Zip => create_zip(src_dir, dest, root_name),
  }
}

fn create_tar_bz2(src_dir: &Path, dest: &Path, root_name: &str) -> Result<(), ArchiveError> {
  let file = File::create(dest).map_err(|e| ArchiveError::Create {
    path: dest.to_path_buf(),
    source: e,
  })?;
  let encoder = BzEncoder::new(file, Compression::best());

  let mut builder = tar::Builder::new(encoder);
  builder.follow_symlinks(false);
  builder
    .append_dir_all(root_name, src_dir)
    .map_err(|e| ArchiveError::Append {
      path: src_dir.to_path_buf(),
      source: e,
    })?;

  let encoder = builder.into_inner().map_err(|e| ArchiveError::Append {
    path: dest.to_path_buf(),
    source: e,
  })?;
  encoder.finish().map_err(|e| ArchiveError::Create {
    path: dest.to_path_buf(),
    source: e,
  })?;
  Ok(())
}

fn create_zip(src_dir: &Path, dest: &Path, root_name: &str) -> Result<(), ArchiveError> {
  let file = File::create(dest).map_err(|e| ArchiveError::Create {
    path: dest.to_path_buf(),
    source: e,
  })?;
  let mut zip = zip::ZipWriter::new(file);
  let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

  for entry in walkdir::WalkDir::new(src_dir).min_depth(1) {
    let entry = entry.map_err(|e| ArchiveError::Append {
      path: src_dir.to_path_buf(),
      source: io::Error::other(e),
    })?;
    let rel = entry
      .path()
      .strip_prefix(src_dir)
      .expect("walkdir entries live under their root");
    let name = format!("{root_name}/{}", rel_to_slashes(rel));

    if entry.file_type().is_dir() {
      zip.add_directory(name.as_str(), options).map_err(|e| ArchiveError::Zip {
        path: dest.to_path_buf(),
        source: e,
      })?;
    } else {
      zip.start_file(name.as_str(), options).map_err(|e| ArchiveError::Zip {
        path: dest.to_path_buf(),
        source: e,
      })?;
      let mut reader = File::open(entry.path()).map_err(|e| ArchiveError::Append {
        path: entry.path().to_path_buf(),
        source: e,
      })?;
      io::copy(&mut reader, &mut zip).map_err(|e| ArchiveError::Append {
        path: entry.path().to_path_buf(),
        source: e,
      })?;
    }
  }

  zip.finish().map_err(|e| ArchiveError::Zip {
    path: dest.to_path_buf(),
    source: e,
  })?;
  Ok(())
}

fn rel_to_slashes(rel: &Path) -> String {
  rel
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}
