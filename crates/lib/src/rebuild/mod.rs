//! Rebuild and atomic promotion of installed binaries.
//!
//! Each package is built into a private staging directory. Only after the
//! toolchain exits successfully are the produced files renamed over the
//! installed ones, so an installed binary is always either the old build or
//! the new one, never a partial write.

mod toolchain;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::consts::STAGING_PREFIX;

pub use toolchain::Toolchain;

/// Filesystem failures that make it unsafe to continue the run.
#[derive(Debug, Error)]
pub enum RebuildError {
  #[error("failed to create staging directory in {}: {source}", .path.display())]
  CreateStaging {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read metadata for {}: {source}", .path.display())]
  Stat {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(
    "staging directory {} and install directory {} are on different filesystems; promotion would not be atomic",
    .staging.display(),
    .dest.display()
  )]
  CrossDevice { staging: PathBuf, dest: PathBuf },

  #[error("failed to list staging directory {}: {source}", .path.display())]
  ListStaging {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
  Promote {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to clear {} from staging directory: {source}", .path.display())]
  ClearStaging {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Why a single build did not produce anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BuildFailure {
  /// The toolchain ran and exited unsuccessfully (`code` is absent when killed by a signal).
  Exit { code: Option<i32> },
  /// The toolchain could not be started.
  Spawn { message: String },
}

impl fmt::Display for BuildFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildFailure::Exit { code: Some(code) } => write!(f, "go install exited with status {}", code),
      BuildFailure::Exit { code: None } => write!(f, "go install was terminated by a signal"),
      BuildFailure::Spawn { message } => write!(f, "failed to run go: {}", message),
    }
  }
}

/// Result of rebuilding one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
  /// File names moved into the install directory, sorted.
  Promoted(Vec<String>),
  Failed(BuildFailure),
}

/// Runs builds into a staging directory and promotes their output.
///
/// The staging directory lives for as long as the `Rebuilder` and is removed
/// when it is dropped or closed, whatever happened to the builds. It must be
/// on the same filesystem as the install directory so that promotion is a
/// single atomic rename; [`Rebuilder::new`] guarantees this by creating it
/// inside the install directory and [`Rebuilder::with_staging_root`] checks it.
#[derive(Debug)]
pub struct Rebuilder {
  toolchain: Toolchain,
  dest: PathBuf,
  staging: TempDir,
}

impl Rebuilder {
  /// Creates a hidden `.gorebuild-*` staging directory inside `dest`.
  ///
  /// Removal relies on `Drop`, which does not run when the process is killed
  /// by a signal. An interrupted run can therefore leave a staging directory
  /// behind in the install directory. Enumeration only considers files, so a
  /// leftover is never mistaken for an installed binary, and a later run
  /// creates a fresh one next to it.
  pub fn new(toolchain: Toolchain, dest: impl Into<PathBuf>) -> Result<Self, RebuildError> {
    let dest = dest.into();
    let root = dest.clone();
    Self::with_staging_root(toolchain, dest, &root)
  }

  /// Creates the staging directory under `staging_root` instead of the install directory.
  pub fn with_staging_root(
    toolchain: Toolchain,
    dest: impl Into<PathBuf>,
    staging_root: &Path,
  ) -> Result<Self, RebuildError> {
    let dest = dest.into();
    let staging = tempfile::Builder::new()
      .prefix(STAGING_PREFIX)
      .tempdir_in(staging_root)
      .map_err(|source| RebuildError::CreateStaging {
        path: staging_root.to_path_buf(),
        source,
      })?;
    check_same_device(staging.path(), &dest)?;

    debug!(staging = ?staging.path(), dest = ?dest, "created staging directory");
    Ok(Self {
      toolchain,
      dest,
      staging,
    })
  }

  pub fn staging_dir(&self) -> &Path {
    self.staging.path()
  }

  pub fn dest_dir(&self) -> &Path {
    &self.dest
  }

  /// Builds `import_path` and promotes everything the build produced.
  ///
  /// A build failure is an `Ok` outcome: nothing in the install directory is
  /// touched and whatever the build left in staging is discarded. An `Err`
  /// means staging or promotion failed at the filesystem level.
  pub async fn rebuild(&self, import_path: &str, verbose: bool) -> Result<BuildOutcome, RebuildError> {
    info!(package = import_path, "rebuilding");

    let failure = match self.toolchain.install(import_path, verbose, self.staging.path()).await {
      Ok(status) if status.success() => None,
      Ok(status) => Some(BuildFailure::Exit { code: status.code() }),
      Err(e) => Some(BuildFailure::Spawn { message: e.to_string() }),
    };

    if let Some(failure) = failure {
      warn!(package = import_path, reason = %failure, "build failed");
      self.discard().await?;
      return Ok(BuildOutcome::Failed(failure));
    }

    let files = self.promote().await?;
    Ok(BuildOutcome::Promoted(files))
  }

  /// Removes the staging directory now, logging instead of failing.
  pub fn close(self) {
    let path = self.staging.path().to_path_buf();
    if let Err(e) = self.staging.close() {
      warn!(path = ?path, error = %e, "failed to remove staging directory");
    }
  }

  async fn promote(&self) -> Result<Vec<String>, RebuildError> {
    let staging = self.staging.path();
    let list_err = |source| RebuildError::ListStaging {
      path: staging.to_path_buf(),
      source,
    };

    let mut promoted = Vec::new();
    let mut entries = fs::read_dir(staging).await.map_err(list_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
      let from = entry.path();
      if entry.file_type().await.map_err(list_err)?.is_dir() {
        warn!(path = ?from, "discarding directory left in staging");
        remove(&from, true).await?;
        continue;
      }

      let name = entry.file_name();
      let to = self.dest.join(&name);
      if let Err(source) = fs::rename(&from, &to).await {
        return Err(RebuildError::Promote { from, to, source });
      }
      info!(path = ?to, "installed");
      promoted.push(name.to_string_lossy().into_owned());
    }

    promoted.sort();
    Ok(promoted)
  }

  /// Empties staging so a failed build's leftovers are never promoted later.
  async fn discard(&self) -> Result<(), RebuildError> {
    let staging = self.staging.path();
    let list_err = |source| RebuildError::ListStaging {
      path: staging.to_path_buf(),
      source,
    };

    let mut entries = fs::read_dir(staging).await.map_err(list_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(list_err)? {
      let path = entry.path();
      let is_dir = entry.file_type().await.map_err(list_err)?.is_dir();
      debug!(path = ?path, "discarding output of failed build");
      remove(&path, is_dir).await?;
    }
    Ok(())
  }
}

async fn remove(path: &Path, is_dir: bool) -> Result<(), RebuildError> {
  let result = if is_dir {
    fs::remove_dir_all(path).await
  } else {
    fs::remove_file(path).await
  };
  result.map_err(|source| RebuildError::ClearStaging {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(unix)]
fn check_same_device(staging: &Path, dest: &Path) -> Result<(), RebuildError> {
  use std::os::unix::fs::MetadataExt;

  let device = |path: &Path| {
    std::fs::metadata(path)
      .map(|m| m.dev())
      .map_err(|source| RebuildError::Stat {
        path: path.to_path_buf(),
        source,
      })
  };

  if device(staging)? != device(dest)? {
    return Err(RebuildError::CrossDevice {
      staging: staging.to_path_buf(),
      dest: dest.to_path_buf(),
    });
  }
  Ok(())
}

#[cfg(not(unix))]
fn check_same_device(_staging: &Path, dest: &Path) -> Result<(), RebuildError> {
  std::fs::metadata(dest).map(|_| ()).map_err(|source| RebuildError::Stat {
    path: dest.to_path_buf(),
    source,
  })
}
