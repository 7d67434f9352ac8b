//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use gorebuild_lib::util::testutil::FakeGo;

/// Isolated Go workspace with a scripted `go` command.
pub struct TestEnv {
  pub fake: FakeGo,
}

impl TestEnv {
  pub fn new() -> Self {
    Self { fake: FakeGo::new() }
  }

  /// Installed artifact path for `name`.
  pub fn installed(&self, name: &str) -> PathBuf {
    self.fake.bin_dir().join(name)
  }

  /// Contents of the installed artifact `name`.
  pub fn installed_bytes(&self, name: &str) -> Vec<u8> {
    std::fs::read(self.installed(name)).unwrap_or_else(|e| panic!("Failed to read {}: {}", name, e))
  }

  /// Installs a binary whose source is not part of the workspace.
  pub fn install_foreign(&self, name: &str) -> PathBuf {
    let path = self.installed(name);
    std::fs::write(&path, b"#!/bin/sh\necho not go\n").unwrap();
    path
  }

  /// Get a pre-configured Command for the gorebuild binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `GOPATH`: The fake workspace root
  /// - `GOREBUILD_GO`: The fake toolchain script
  ///
  /// `GOBIN` and `RUST_LOG` are cleared so the host setup cannot leak in.
  pub fn gorebuild_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("gorebuild");
    cmd.env("GOPATH", self.fake.root());
    cmd.env("GOREBUILD_GO", self.fake.program());
    cmd.env_remove("GOBIN");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// Whether any staging directory was left in the install directory.
  pub fn has_staging_leftovers(&self) -> bool {
    std::fs::read_dir(self.fake.bin_dir())
      .unwrap()
      .any(|e| e.unwrap().file_name().to_string_lossy().starts_with(".gorebuild-"))
  }
}
