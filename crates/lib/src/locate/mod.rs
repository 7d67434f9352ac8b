//! Recovering the source package of an installed binary.
//!
//! A [`SourceLocator`] inspects a built executable and returns the directory
//! of the `main` package that produced it. Failure is always per-binary: the
//! caller reports it and moves on to the next one.

mod buildinfo;
mod symtab;

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::workspace::GoWorkspace;

pub use buildinfo::{BuildInfoLocator, module_path};
pub use symtab::{SymtabLocator, main_source_file};

/// Why the source of a binary could not be recovered.
#[derive(Debug, Error)]
pub enum LocateError {
  #[error("cannot read binary: {0}")]
  Read(#[source] io::Error),

  #[error("no Go symbol table found")]
  NoSymbolTable,

  #[error("malformed Go symbol table: {0}")]
  Malformed(&'static str),

  #[error("no main.main function in symbol table")]
  NoMainFunction,

  #[error("no Go build info found")]
  NoBuildInfo,

  #[error("malformed Go build info: {0}")]
  MalformedBuildInfo(&'static str),

  #[error("binary was built from a list of files, not a package")]
  FileListBuild,

  #[error("recorded source path {0} is not absolute")]
  RelativePath(String),

  #[error("source directory {} no longer exists", .0.display())]
  MissingSource(PathBuf),

  #[error("no source locator configured")]
  NoLocator,
}

/// Recovers the source package directory of a built binary.
pub trait SourceLocator {
  /// Short name used in logs.
  fn name(&self) -> &'static str;

  /// Returns the absolute path of the directory holding the binary's `main` package.
  fn locate(&self, artifact: &Path) -> Result<PathBuf, LocateError>;
}

/// Tries each locator in order and returns the first directory found.
///
/// When every locator fails, the error of the first one is returned since it
/// is the most specific.
#[derive(Default)]
pub struct FallbackLocator {
  locators: Vec<Box<dyn SourceLocator>>,
}

impl FallbackLocator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, locator: impl SourceLocator + 'static) -> Self {
    self.locators.push(Box::new(locator));
    self
  }
}

impl SourceLocator for FallbackLocator {
  fn name(&self) -> &'static str {
    "fallback"
  }

  fn locate(&self, artifact: &Path) -> Result<PathBuf, LocateError> {
    let mut first_err = None;
    for locator in &self.locators {
      match locator.locate(artifact) {
        Ok(dir) => {
          debug!(artifact = ?artifact, locator = locator.name(), dir = ?dir, "located source");
          return Ok(dir);
        }
        Err(e) => {
          debug!(artifact = ?artifact, locator = locator.name(), error = %e, "locator failed");
          first_err.get_or_insert(e);
        }
      }
    }
    Err(first_err.unwrap_or(LocateError::NoLocator))
  }
}

/// Symbol table first, embedded build info for binaries built with `-trimpath`.
pub fn default_locator(workspace: &GoWorkspace) -> FallbackLocator {
  FallbackLocator::new()
    .with(SymtabLocator)
    .with(BuildInfoLocator::new(workspace.src_dir()))
}

/// The source directory lies outside the workspace source root.
#[derive(Debug, Error)]
#[error("source directory {} is not inside {}", .dir.display(), .root.display())]
pub struct ImportPathError {
  pub dir: PathBuf,
  pub root: PathBuf,
}

/// Converts a source directory into the import path `go install` expects.
///
/// Pure path arithmetic: `dir` must be strictly below `src_root` and contain
/// no `..` components. Separators are always `/`.
pub fn import_path(src_root: &Path, dir: &Path) -> Result<String, ImportPathError> {
  let err = || ImportPathError {
    dir: dir.to_path_buf(),
    root: src_root.to_path_buf(),
  };

  let rel = dir.strip_prefix(src_root).map_err(|_| err())?;
  let parts = rel
    .components()
    .map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy()),
      _ => None,
    })
    .collect::<Option<Vec<_>>>()
    .ok_or_else(err)?;

  if parts.is_empty() {
    return Err(err());
  }
  Ok(parts.join("/"))
}

/// Confirms a recovered directory still exists on disk.
fn existing_dir(dir: PathBuf) -> Result<PathBuf, LocateError> {
  if dir.is_dir() {
    Ok(dir)
  } else {
    Err(LocateError::MissingSource(dir))
  }
}

/// Reads an unsigned LEB128 varint, advancing `p`.
pub(crate) fn read_uvarint(p: &mut &[u8]) -> Option<u64> {
  let data: &[u8] = *p;
  let mut value = 0u64;
  for (i, &byte) in data.iter().enumerate().take(10) {
    value |= u64::from(byte & 0x7f) << (7 * i);
    if byte & 0x80 == 0 {
      *p = &data[i + 1..];
      return Some(value);
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  enum Fixed {
    Found(&'static str),
    Fails(fn() -> LocateError),
  }

  impl SourceLocator for Fixed {
    fn name(&self) -> &'static str {
      "fixed"
    }

    fn locate(&self, _artifact: &Path) -> Result<PathBuf, LocateError> {
      match self {
        Fixed::Found(dir) => Ok(PathBuf::from(dir)),
        Fixed::Fails(err) => Err(err()),
      }
    }
  }

  #[test]
  fn import_path_relativizes_below_root() {
    let ip = import_path(Path::new("/go/src"), Path::new("/go/src/github.com/user/tool")).unwrap();
    assert_eq!(ip, "github.com/user/tool");
  }

  #[test]
  fn import_path_rejects_outside_root() {
    let err = import_path(Path::new("/go/src"), Path::new("/home/user/tool")).unwrap_err();
    assert_eq!(err.dir, PathBuf::from("/home/user/tool"));
    assert!(err.to_string().contains("is not inside"));
  }

  #[test]
  fn import_path_rejects_root_and_parent_components() {
    assert!(import_path(Path::new("/go/src"), Path::new("/go/src")).is_err());
    assert!(import_path(Path::new("/go/src"), Path::new("/go/src/../elsewhere")).is_err());
  }

  #[test]
  fn fallback_returns_first_success() {
    let locator = FallbackLocator::new()
      .with(Fixed::Fails(|| LocateError::NoSymbolTable))
      .with(Fixed::Found("/go/src/tool"))
      .with(Fixed::Found("/go/src/other"));

    assert_eq!(locator.locate(Path::new("bin")).unwrap(), PathBuf::from("/go/src/tool"));
  }

  #[test]
  fn fallback_reports_first_error() {
    let locator = FallbackLocator::new()
      .with(Fixed::Fails(|| LocateError::NoMainFunction))
      .with(Fixed::Fails(|| LocateError::NoBuildInfo));

    assert!(matches!(
      locator.locate(Path::new("bin")),
      Err(LocateError::NoMainFunction)
    ));
  }

  #[test]
  fn empty_fallback_has_no_locator() {
    assert!(matches!(
      FallbackLocator::new().locate(Path::new("bin")),
      Err(LocateError::NoLocator)
    ));
  }

  #[test]
  fn existing_dir_checks_the_filesystem() {
    let temp = TempDir::new().unwrap();
    assert!(existing_dir(temp.path().to_path_buf()).is_ok());
    assert!(matches!(
      existing_dir(temp.path().join("gone")),
      Err(LocateError::MissingSource(_))
    ));
  }

  #[test]
  fn uvarint_decodes_multibyte_values() {
    let data = [0xac, 0x02, 0x05];
    let mut p = &data[..];
    assert_eq!(read_uvarint(&mut p), Some(300));
    assert_eq!(p, &[0x05]);

    let mut truncated = &[0x80u8][..];
    assert_eq!(read_uvarint(&mut truncated), None);
  }
}
