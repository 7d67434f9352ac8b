//! Implementation of the default `gorebuild` command.
//!
//! Rebuilds every binary in the Go install directory, or the ones named on the
//! command line, from source found in the workspace.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use gorebuild_lib::locate::default_locator;
use gorebuild_lib::rebuild::Toolchain;
use gorebuild_lib::run::{ArtifactReport, RunObserver, RunOptions, run};
use gorebuild_lib::workspace::GoWorkspace;

use crate::output::{OutputFormat, print_outcome, print_report_json, print_summary};

/// Prints each outcome as soon as the binary is done.
struct TerminalObserver {
  output: OutputFormat,
}

impl RunObserver for TerminalObserver {
  fn on_outcome(&mut self, report: &ArtifactReport) {
    print_outcome(report, self.output);
  }
}

pub fn cmd_rebuild(binaries: Vec<PathBuf>, dry_run: bool, verbose: bool, output: OutputFormat) -> Result<ExitCode> {
  let start = Instant::now();

  let workspace = GoWorkspace::from_env().context("Failed to locate Go workspace")?;
  let toolchain = Toolchain::from_env();
  let locator = default_locator(&workspace);
  debug!(bin = ?workspace.bin_dir(), go = ?toolchain.program(), "configured run");
  let options = RunOptions {
    targets: binaries,
    dry_run,
    verbose,
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let mut observer = TerminalObserver { output };
  let report = rt
    .block_on(run(&options, &workspace, &locator, &toolchain, &mut observer))
    .context("Rebuild failed")?;

  if output.is_json() {
    print_report_json(&report)?;
  } else if !dry_run {
    print_summary(&report, start.elapsed());
  }

  Ok(if report.has_build_failures() {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  })
}
