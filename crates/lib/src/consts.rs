/// Overrides the toolchain program (default: `go` on `PATH`).
pub const TOOLCHAIN_ENV: &str = "GOREBUILD_GO";

/// Environment variable `go install` writes its output to.
pub const OUTPUT_DIR_ENV: &str = "GOBIN";

pub const GOPATH_ENV: &str = "GOPATH";

/// Prefix of the per-run staging directory created inside the install directory.
pub const STAGING_PREFIX: &str = ".gorebuild-";
