//! Selection of the binaries a run operates on.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("failed to list install directory {}: {source}", .path.display())]
pub struct EnumerateError {
  pub path: PathBuf,
  #[source]
  pub source: io::Error,
}

/// Returns the artifacts to rebuild.
///
/// Explicit targets are returned verbatim and are not checked for existence or
/// membership in `bin_dir`. Without targets, every non-directory entry of
/// `bin_dir` is returned, ordered by file name.
pub fn targets(explicit: &[PathBuf], bin_dir: &Path) -> Result<Vec<PathBuf>, EnumerateError> {
  if !explicit.is_empty() {
    return Ok(explicit.to_vec());
  }

  let err = |source| EnumerateError {
    path: bin_dir.to_path_buf(),
    source,
  };

  let mut found = Vec::new();
  for entry in std::fs::read_dir(bin_dir).map_err(err)? {
    let entry = entry.map_err(err)?;
    // file_type() does not follow symlinks, so a link to a binary counts as a file.
    if entry.file_type().map_err(err)?.is_dir() {
      continue;
    }
    found.push(entry.path());
  }
  found.sort();

  debug!(dir = ?bin_dir, count = found.len(), "enumerated installed binaries");
  Ok(found)
}
