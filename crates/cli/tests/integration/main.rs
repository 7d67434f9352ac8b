//! CLI integration tests against a fake Go toolchain.

#![cfg(unix)]

mod common;
mod dry_run_tests;
mod rebuild_tests;
