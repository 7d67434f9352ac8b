//! Invocation of the Go toolchain.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use tokio::process::Command;
use tracing::debug;

use crate::consts::{OUTPUT_DIR_ENV, TOOLCHAIN_ENV};

/// The `go` command used for rebuilds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
  program: PathBuf,
}

impl Toolchain {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  /// `$GOREBUILD_GO` if set, otherwise `go` from `PATH`.
  pub fn from_env() -> Self {
    let program = env::var_os(TOOLCHAIN_ENV)
      .filter(|v| !v.is_empty())
      .map(PathBuf::from)
      .unwrap_or_else(|| PathBuf::from("go"));
    Self::new(program)
  }

  pub fn program(&self) -> &Path {
    &self.program
  }

  /// `go install [-v] <import_path>` writing its output to `out_dir`.
  ///
  /// The rest of the environment is inherited, as are stdout and stderr, so
  /// compiler diagnostics reach the terminal as they are produced.
  pub fn install_command(&self, import_path: &str, verbose: bool, out_dir: &Path) -> Command {
    let mut command = Command::new(&self.program);
    command.arg("install");
    if verbose {
      command.arg("-v");
    }
    command.arg(import_path).env(OUTPUT_DIR_ENV, out_dir);
    command
  }

  /// Runs `go install` to completion.
  ///
  /// An `Err` means the toolchain could not be started at all.
  pub async fn install(&self, import_path: &str, verbose: bool, out_dir: &Path) -> io::Result<ExitStatus> {
    debug!(program = ?self.program, package = import_path, out_dir = ?out_dir, "spawning go install");
    self.install_command(import_path, verbose, out_dir).status().await
  }
}
