//! Rebuild integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn rebuilds_package_and_skips_foreign_binary() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");
  let bar = env.install_foreign("bar");
  let old_foo = env.installed_bytes("foo");

  env
    .gorebuild_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("Rebuilt example.com/foo"))
    .stdout(predicate::str::contains("1 rebuilt, 0 failed, 1 skipped"))
    .stderr(predicate::str::contains(format!("Skipping {}", bar.display())));

  assert_ne!(env.installed_bytes("foo"), old_foo);
  assert_eq!(env.installed_bytes("bar"), b"#!/bin/sh\necho not go\n");
  assert_eq!(env.fake.invocations(), vec!["example.com/foo"]);
  assert!(!env.has_staging_leftovers());
}

#[test]
fn failed_build_keeps_installed_binary() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");
  env.fake.fail("example.com/foo", None);
  let old_foo = env.installed_bytes("foo");

  env
    .gorebuild_cmd()
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Failed to rebuild"))
    .stderr(predicate::str::contains("example.com/foo: build failed"));

  assert_eq!(env.installed_bytes("foo"), old_foo);
  assert!(!env.has_staging_leftovers());
}

#[test]
fn failure_does_not_stop_later_builds() {
  let env = TestEnv::new();
  env.fake.package("example.com/alpha");
  env.fake.package("example.com/beta");
  env.fake.fail("example.com/alpha", Some("leaked"));
  let old_beta = env.installed_bytes("beta");

  env.gorebuild_cmd().assert().code(1);

  assert_eq!(env.fake.invocations(), vec!["example.com/alpha", "example.com/beta"]);
  assert_ne!(env.installed_bytes("beta"), old_beta);
  assert!(!env.installed("leaked").exists());
}

#[test]
fn explicit_target_outside_install_dir() {
  let env = TestEnv::new();
  let src = env.fake.package("example.com/tools/foo");
  std::fs::remove_file(&src).unwrap();

  let outside = env.fake.root().join("elsewhere");
  std::fs::create_dir_all(&outside).unwrap();
  let target = outside.join("foo-copy");
  env
    .fake
    .binary_for(&env.fake.src_dir().join("example.com/tools/foo"))
    .write_to(&target);

  env.gorebuild_cmd().arg(&target).assert().success();

  assert_eq!(env.fake.invocations(), vec!["example.com/tools/foo"]);
  // go install writes into the install directory, not next to the target.
  assert!(env.installed("foo").exists());
}

#[test]
fn explicit_targets_limit_the_run() {
  let env = TestEnv::new();
  let foo = env.fake.package("example.com/foo");
  env.fake.package("example.com/bar");

  env.gorebuild_cmd().arg(&foo).assert().success();

  assert_eq!(env.fake.invocations(), vec!["example.com/foo"]);
}

#[test]
fn missing_explicit_target_is_skipped() {
  let env = TestEnv::new();

  env
    .gorebuild_cmd()
    .arg(env.installed("ghost"))
    .assert()
    .success()
    .stderr(predicate::str::contains("Skipping"))
    .stderr(predicate::str::contains("ghost"));
}

#[test]
fn verbose_is_passed_to_go() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");

  env
    .gorebuild_cmd()
    .arg("--verbose")
    .assert()
    .success()
    .stderr(predicate::str::contains("example.com/foo"));
}

#[test]
fn rebuild_is_repeatable() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");

  env.gorebuild_cmd().assert().success();
  let first = env.installed_bytes("foo");
  env.gorebuild_cmd().assert().success();

  assert_eq!(env.installed_bytes("foo"), first);
  assert_eq!(env.fake.invocations().len(), 2);
}

#[test]
fn json_report_lists_every_artifact() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");
  env.install_foreign("bar");

  let assert = env.gorebuild_cmd().args(["--output", "json"]).assert().success();
  let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();

  assert_eq!(report["dry_run"], false);
  let artifacts = report["artifacts"].as_array().unwrap();
  assert_eq!(artifacts.len(), 2);
  assert_eq!(artifacts[0]["status"], "unresolved");
  assert_eq!(artifacts[1]["status"], "promoted");
  assert_eq!(artifacts[1]["import_path"], "example.com/foo");
  assert_eq!(artifacts[1]["files"], serde_json::json!(["foo"]));
}

#[test]
fn json_report_describes_build_failure() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");
  env.fake.fail("example.com/foo", None);

  let assert = env.gorebuild_cmd().args(["-o", "json"]).assert().code(1);
  let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();

  let failed = &report["artifacts"][0];
  assert_eq!(failed["status"], "build_failed");
  assert_eq!(failed["failure"]["kind"], "exit");
  assert_eq!(failed["failure"]["code"], 1);
}

#[test]
fn missing_toolchain_counts_as_build_failure() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");
  let old_foo = env.installed_bytes("foo");

  env
    .gorebuild_cmd()
    .env("GOREBUILD_GO", env.fake.root().join("no-such-go"))
    .assert()
    .code(1)
    .stderr(predicate::str::contains("failed to run go"));

  assert_eq!(env.installed_bytes("foo"), old_foo);
}
