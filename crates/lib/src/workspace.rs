//! Go workspace discovery.
//!
//! Resolves the source root and the installed-binaries directory the same way
//! `go install` does for GOPATH-mode packages: `$GOPATH` (first entry) or
//! `~/go`, with `$GOBIN` taking precedence for the install directory.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::consts::{GOPATH_ENV, OUTPUT_DIR_ENV};

#[derive(Debug, Error)]
pub enum WorkspaceError {
  #[error("cannot locate the Go workspace: $GOPATH is unset and the home directory is unknown")]
  NoHome,
}

/// The directories a run operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoWorkspace {
  root: PathBuf,
  bin_dir: PathBuf,
}

impl GoWorkspace {
  /// Workspace rooted at `root` with the conventional `<root>/bin` install directory.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    let bin_dir = root.join("bin");
    Self { root, bin_dir }
  }

  /// Override the install directory (what `$GOBIN` does).
  pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
    self.bin_dir = bin_dir.into();
    self
  }

  pub fn from_env() -> Result<Self, WorkspaceError> {
    let root = match env::var_os(GOPATH_ENV).and_then(first_path_entry) {
      Some(root) => root,
      None => dirs::home_dir().ok_or(WorkspaceError::NoHome)?.join("go"),
    };

    let mut workspace = Self::new(root);
    if let Some(gobin) = env::var_os(OUTPUT_DIR_ENV).filter(|v| !v.is_empty()) {
      workspace = workspace.with_bin_dir(gobin);
    }

    debug!(root = ?workspace.root, bin = ?workspace.bin_dir, "resolved go workspace");
    Ok(workspace)
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Root that import paths are relative to.
  pub fn src_dir(&self) -> PathBuf {
    self.root.join("src")
  }

  /// Directory holding the installed binaries.
  pub fn bin_dir(&self) -> &Path {
    &self.bin_dir
  }
}

fn first_path_entry(list: OsString) -> Option<PathBuf> {
  env::split_paths(&list).find(|p| !p.as_os_str().is_empty())
}
