//! Terminal rendering of a rebuild run.
//!
//! The wording of every line is produced by a plain `*_line` function so it
//! can be checked without a terminal. The `print_*` functions pick the stream
//! and add a coloured status marker when that stream supports it.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use gorebuild_lib::rebuild::BuildFailure;
use gorebuild_lib::run::{ArtifactReport, Outcome, RunReport};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  /// One line per binary as it finishes, then a summary.
  #[default]
  Text,
  /// The whole run report as one JSON document on stdout.
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

const REBUILT: &str = "✓";
const FAILED: &str = "✗";
const SKIPPED: &str = "⚠";

pub fn skip_line(artifact: &Path, reason: &str) -> String {
  format!("Skipping {}: {}", artifact.display(), reason)
}

pub fn failure_line(artifact: &Path, import_path: &str, failure: &BuildFailure) -> String {
  format!("Failed to rebuild {} ({}): {}", artifact.display(), import_path, failure)
}

pub fn promoted_line(import_path: &str, files: &[String]) -> String {
  match files {
    [] => format!("Rebuilt {} (no output)", import_path),
    files => format!("Rebuilt {} ({})", import_path, files.join(", ")),
  }
}

/// One-line tally for a finished run.
pub fn summary_line(report: &RunReport, elapsed: Duration) -> String {
  if report.artifacts.is_empty() {
    return "Nothing to rebuild".to_string();
  }
  format!(
    "{} rebuilt, {} failed, {} skipped in {}",
    report.promoted(),
    report.failed(),
    report.skipped(),
    format_elapsed(elapsed)
  )
}

pub fn format_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  if secs >= 60 {
    format!("{}m{:02}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{:.1}s", elapsed.as_secs_f64())
  } else {
    format!("{}ms", elapsed.as_millis())
  }
}

/// Prints the line for one finished binary.
///
/// Skips always go to stderr. In JSON mode nothing else is printed here, so
/// stdout carries only the final report.
pub fn print_outcome(report: &ArtifactReport, format: OutputFormat) {
  let artifact = &report.artifact;
  match &report.outcome {
    Outcome::Unresolved { reason } => eprintln!(
      "{} {}",
      SKIPPED.if_supports_color(Stream::Stderr, |s| s.yellow()),
      skip_line(artifact, reason)
    ),
    _ if format.is_json() => {}
    // Dry run output is meant for scripts: bare import paths.
    Outcome::Resolved { import_path } => println!("{}", import_path),
    Outcome::BuildFailed { import_path, failure } => eprintln!(
      "{} {}",
      FAILED.if_supports_color(Stream::Stderr, |s| s.red()),
      failure_line(artifact, import_path, failure).if_supports_color(Stream::Stderr, |s| s.red())
    ),
    Outcome::Promoted { import_path, files } => println!(
      "{} {}",
      REBUILT.if_supports_color(Stream::Stdout, |s| s.green()),
      promoted_line(import_path, files)
    ),
  }
}

pub fn print_summary(report: &RunReport, elapsed: Duration) {
  let line = summary_line(report, elapsed);
  println!();
  if report.has_build_failures() {
    println!("{}", line.if_supports_color(Stream::Stdout, |s| s.red()));
  } else {
    println!("{}", line.if_supports_color(Stream::Stdout, |s| s.dimmed()));
  }
}

/// Reports an error that ended the run, with its full cause chain.
pub fn print_fatal(err: &anyhow::Error) {
  eprintln!("{} {:#}", "error:".if_supports_color(Stream::Stderr, |s| s.red()), err);
}

pub fn print_report_json(report: &RunReport) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
  println!("{}", json);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  fn report(outcomes: Vec<Outcome>) -> RunReport {
    RunReport {
      dry_run: false,
      artifacts: outcomes
        .into_iter()
        .enumerate()
        .map(|(i, outcome)| ArtifactReport {
          artifact: PathBuf::from(format!("/go/bin/tool{}", i)),
          outcome,
        })
        .collect(),
    }
  }

  #[test]
  fn skip_line_names_binary_and_reason() {
    assert_eq!(
      skip_line(Path::new("/go/bin/bar"), "no Go symbol table found"),
      "Skipping /go/bin/bar: no Go symbol table found"
    );
  }

  #[test]
  fn failure_line_includes_package_and_cause() {
    let exit = BuildFailure::Exit { code: Some(2) };
    assert_eq!(
      failure_line(Path::new("/go/bin/foo"), "example.com/foo", &exit),
      "Failed to rebuild /go/bin/foo (example.com/foo): go install exited with status 2"
    );

    let spawn = BuildFailure::Spawn {
      message: "No such file or directory".to_string(),
    };
    let line = failure_line(Path::new("/go/bin/foo"), "example.com/foo", &spawn);
    assert!(line.ends_with("failed to run go: No such file or directory"));
  }

  #[test]
  fn promoted_line_lists_installed_files() {
    assert_eq!(
      promoted_line("example.com/foo", &["foo".to_string()]),
      "Rebuilt example.com/foo (foo)"
    );
    assert_eq!(
      promoted_line("example.com/multi", &["helper".to_string(), "multi".to_string()]),
      "Rebuilt example.com/multi (helper, multi)"
    );
    assert_eq!(promoted_line("example.com/lib", &[]), "Rebuilt example.com/lib (no output)");
  }

  #[test]
  fn summary_counts_each_outcome() {
    let run = report(vec![
      Outcome::Promoted {
        import_path: "example.com/a".to_string(),
        files: vec!["a".to_string()],
      },
      Outcome::BuildFailed {
        import_path: "example.com/b".to_string(),
        failure: BuildFailure::Exit { code: Some(1) },
      },
      Outcome::Unresolved {
        reason: "no Go build info found".to_string(),
      },
      Outcome::Unresolved {
        reason: "no Go build info found".to_string(),
      },
    ]);

    assert_eq!(
      summary_line(&run, Duration::from_millis(1500)),
      "1 rebuilt, 1 failed, 2 skipped in 1.5s"
    );
  }

  #[test]
  fn summary_of_empty_run() {
    assert_eq!(summary_line(&report(vec![]), Duration::ZERO), "Nothing to rebuild");
  }

  #[test]
  fn elapsed_time_formats() {
    assert_eq!(format_elapsed(Duration::from_millis(40)), "40ms");
    assert_eq!(format_elapsed(Duration::from_millis(2400)), "2.4s");
    assert_eq!(format_elapsed(Duration::from_secs(125)), "2m05s");
  }

  #[test]
  fn json_is_the_only_machine_format() {
    assert!(OutputFormat::Json.is_json());
    assert!(!OutputFormat::Text.is_json());
    assert!(!OutputFormat::default().is_json());
  }
}
