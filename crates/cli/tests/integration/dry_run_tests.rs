//! Dry-run integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn dry_run_prints_import_paths() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");
  env.fake.package("example.com/cmd/bar");
  env.install_foreign("zed");
  let old_foo = env.installed_bytes("foo");

  env
    .gorebuild_cmd()
    .arg("--dry-run")
    .assert()
    .success()
    .stdout("example.com/cmd/bar\nexample.com/foo\n")
    .stderr(predicate::str::contains("Skipping"))
    .stderr(predicate::str::contains("zed"));

  assert!(env.fake.invocations().is_empty());
  assert_eq!(env.installed_bytes("foo"), old_foo);
  assert!(!env.has_staging_leftovers());
}

#[test]
fn dry_run_ignores_failing_packages() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");
  env.fake.fail("example.com/foo", None);

  env.gorebuild_cmd().arg("-n").assert().success().stdout("example.com/foo\n");
}

#[test]
fn dry_run_json_reports_resolved_paths() {
  let env = TestEnv::new();
  env.fake.package("example.com/foo");

  let assert = env.gorebuild_cmd().args(["-n", "-o", "json"]).assert().success();
  let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();

  assert_eq!(report["dry_run"], true);
  assert_eq!(report["artifacts"][0]["status"], "resolved");
  assert_eq!(report["artifacts"][0]["import_path"], "example.com/foo");
  assert!(env.fake.invocations().is_empty());
}
