mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_fatal};

/// Rebuild installed Go binaries from their workspace sources
#[derive(Parser)]
#[command(name = "gorebuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Binaries to rebuild (default: everything in the Go install directory)
  binaries: Vec<PathBuf>,

  /// Print the import path of each binary instead of rebuilding it
  #[arg(short = 'n', long)]
  dry_run: bool,

  /// Pass -v to go install
  #[arg(short, long)]
  verbose: bool,

  /// Output format
  #[arg(short, long, value_enum, default_value_t)]
  output: OutputFormat,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cli = Cli::parse();

  match cmd::cmd_rebuild(cli.binaries, cli.dry_run, cli.verbose, cli.output) {
    Ok(code) => code,
    Err(e) => {
      print_fatal(&e);
      ExitCode::FAILURE
    }
  }
}
