//! Source recovery from the embedded Go build info.
//!
//! Since go1.18 the linker embeds a `.go.buildinfo` blob holding the toolchain
//! version and the module info printed by `go version -m`. Its `path` line is
//! the import path of the main package, which survives `-trimpath`.

use std::fs;
use std::path::{Path, PathBuf};

use super::{LocateError, SourceLocator, existing_dir, read_uvarint};

const MAGIC: &[u8] = b"\xff Go buildinf:";
const HEADER_LEN: usize = 32;
/// Strings are stored inline (go1.18+) rather than behind pointers.
const FLAG_INLINE: u8 = 0x2;
const SENTINEL_LEN: usize = 16;

/// Maps the recorded import path onto the workspace source root.
#[derive(Debug, Clone)]
pub struct BuildInfoLocator {
  src_dir: PathBuf,
}

impl BuildInfoLocator {
  pub fn new(src_dir: impl Into<PathBuf>) -> Self {
    Self { src_dir: src_dir.into() }
  }
}

impl SourceLocator for BuildInfoLocator {
  fn name(&self) -> &'static str {
    "buildinfo"
  }

  fn locate(&self, artifact: &Path) -> Result<PathBuf, LocateError> {
    let data = fs::read(artifact).map_err(LocateError::Read)?;
    let path = module_path(&data)?;
    if path == "command-line-arguments" {
      return Err(LocateError::FileListBuild);
    }

    let dir = path.split('/').fold(self.src_dir.clone(), |dir, part| dir.join(part));
    existing_dir(dir)
  }
}

/// Returns the main package import path recorded in a Go binary image.
pub fn module_path(data: &[u8]) -> Result<String, LocateError> {
  let start = data
    .windows(MAGIC.len())
    .position(|w| w == MAGIC)
    .ok_or(LocateError::NoBuildInfo)?;
  let header = data
    .get(start..start + HEADER_LEN)
    .ok_or(LocateError::MalformedBuildInfo("truncated header"))?;
  if header[MAGIC.len() + 1] & FLAG_INLINE == 0 {
    return Err(LocateError::MalformedBuildInfo("pre-go1.18 layout"));
  }

  let mut rest = &data[start + HEADER_LEN..];
  let _version = read_string(&mut rest)?;
  let modinfo = read_string(&mut rest)?;

  let modinfo = strip_sentinels(modinfo).ok_or(LocateError::NoBuildInfo)?;
  let text = String::from_utf8_lossy(modinfo);
  text
    .lines()
    .find_map(|line| line.strip_prefix("path\t"))
    .map(str::to_string)
    .ok_or(LocateError::NoBuildInfo)
}

fn read_string<'a>(p: &mut &'a [u8]) -> Result<&'a [u8], LocateError> {
  let len = read_uvarint(p).ok_or(LocateError::MalformedBuildInfo("truncated length"))?;
  let len = usize::try_from(len).map_err(|_| LocateError::MalformedBuildInfo("length overflow"))?;
  let data: &'a [u8] = *p;
  let s = data.get(..len).ok_or(LocateError::MalformedBuildInfo("truncated string"))?;
  *p = &data[len..];
  Ok(s)
}

/// Module info is framed by 16-byte sentinels; anything else means none was recorded.
fn strip_sentinels(modinfo: &[u8]) -> Option<&[u8]> {
  let len = modinfo.len();
  if len > 2 * SENTINEL_LEN && modinfo[len - SENTINEL_LEN - 1] == b'\n' {
    Some(&modinfo[SENTINEL_LEN..len - SENTINEL_LEN])
  } else {
    None
  }
}
