//! One rebuild run: enumerate, locate, rebuild, promote.
//!
//! Artifacts are processed strictly one after another. Per-artifact problems
//! (unrecoverable source, failed build) are recorded in the [`RunReport`] and
//! the run continues; filesystem-level problems abort it with a [`RunError`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::enumerate::{self, EnumerateError};
use crate::locate::{ImportPathError, SourceLocator, import_path};
use crate::rebuild::{BuildFailure, BuildOutcome, RebuildError, Rebuilder, Toolchain};
use crate::workspace::GoWorkspace;

#[derive(Debug, Error)]
pub enum RunError {
  #[error(transparent)]
  Enumerate(#[from] EnumerateError),

  #[error("cannot derive import path for {}: {source}", .artifact.display())]
  ImportPath {
    artifact: PathBuf,
    #[source]
    source: ImportPathError,
  },

  #[error(transparent)]
  Rebuild(#[from] RebuildError),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  /// Explicit binaries; empty means everything in the install directory.
  pub targets: Vec<PathBuf>,
  /// Resolve and report import paths without building.
  pub dry_run: bool,
  /// Pass `-v` to `go install`.
  pub verbose: bool,
}

/// Terminal state of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Outcome {
  /// The source package could not be recovered; the artifact was skipped.
  Unresolved { reason: String },
  /// Dry run: the import path that would have been rebuilt.
  Resolved { import_path: String },
  BuildFailed { import_path: String, failure: BuildFailure },
  Promoted { import_path: String, files: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
  pub artifact: PathBuf,
  #[serde(flatten)]
  pub outcome: Outcome,
}

/// Outcomes of a run in enumeration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
  pub dry_run: bool,
  pub artifacts: Vec<ArtifactReport>,
}

impl RunReport {
  /// Whether any build failed. Unresolved artifacts do not count.
  pub fn has_build_failures(&self) -> bool {
    self.count(|o| matches!(o, Outcome::BuildFailed { .. })) > 0
  }

  pub fn promoted(&self) -> usize {
    self.count(|o| matches!(o, Outcome::Promoted { .. }))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| matches!(o, Outcome::BuildFailed { .. }))
  }

  pub fn skipped(&self) -> usize {
    self.count(|o| matches!(o, Outcome::Unresolved { .. }))
  }

  fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
    self.artifacts.iter().filter(|a| pred(&a.outcome)).count()
  }
}

/// Notified as each artifact reaches its terminal state, before the next one starts.
pub trait RunObserver {
  fn on_outcome(&mut self, report: &ArtifactReport);
}

impl RunObserver for () {
  fn on_outcome(&mut self, _report: &ArtifactReport) {}
}

/// Executes a run.
///
/// In dry-run mode no staging directory is created and the toolchain is
/// never invoked.
pub async fn run(
  options: &RunOptions,
  workspace: &GoWorkspace,
  locator: &dyn SourceLocator,
  toolchain: &Toolchain,
  observer: &mut dyn RunObserver,
) -> Result<RunReport, RunError> {
  let targets = enumerate::targets(&options.targets, workspace.bin_dir())?;
  info!(count = targets.len(), dry_run = options.dry_run, "starting run");

  let rebuilder = if options.dry_run {
    None
  } else {
    Some(Rebuilder::new(toolchain.clone(), workspace.bin_dir())?)
  };

  let src_dir = workspace.src_dir();
  let mut report = RunReport {
    dry_run: options.dry_run,
    artifacts: Vec::with_capacity(targets.len()),
  };

  for artifact in targets {
    let outcome = process(&artifact, &src_dir, locator, rebuilder.as_ref(), options.verbose).await?;
    let entry = ArtifactReport { artifact, outcome };
    observer.on_outcome(&entry);
    report.artifacts.push(entry);
  }

  if let Some(rebuilder) = rebuilder {
    rebuilder.close();
  }

  info!(
    promoted = report.promoted(),
    failed = report.failed(),
    skipped = report.skipped(),
    "run finished"
  );
  Ok(report)
}

async fn process(
  artifact: &Path,
  src_dir: &Path,
  locator: &dyn SourceLocator,
  rebuilder: Option<&Rebuilder>,
  verbose: bool,
) -> Result<Outcome, RunError> {
  let dir = match locator.locate(artifact) {
    Ok(dir) => dir,
    Err(e) => {
      warn!(artifact = ?artifact, error = %e, "skipping");
      return Ok(Outcome::Unresolved { reason: e.to_string() });
    }
  };

  let import_path = import_path(src_dir, &dir).map_err(|source| RunError::ImportPath {
    artifact: artifact.to_path_buf(),
    source,
  })?;

  let Some(rebuilder) = rebuilder else {
    return Ok(Outcome::Resolved { import_path });
  };

  Ok(match rebuilder.rebuild(&import_path, verbose).await? {
    BuildOutcome::Promoted(files) => Outcome::Promoted { import_path, files },
    BuildOutcome::Failed(failure) => Outcome::BuildFailed { import_path, failure },
  })
}
