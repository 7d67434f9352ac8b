//! gorebuild-lib: rebuilding installed Go binaries in place.
//!
//! The pipeline for one run:
//! - [`enumerate`]: pick the binaries to process
//! - [`locate`]: recover each binary's source package from the binary itself
//! - [`rebuild`]: `go install` into a staging directory, then atomically rename
//!   the output over the installed binary
//! - [`run`]: drives the above sequentially and collects per-binary outcomes

pub mod consts;
pub mod enumerate;
pub mod locate;
pub mod rebuild;
pub mod run;
pub mod util;
pub mod workspace;
