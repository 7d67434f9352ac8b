//! Source recovery from the Go runtime symbol table (`pclntab`).
//!
//! Every Go executable carries a function table used by the runtime for stack
//! traces, even when the ELF/Mach-O/PE symbols are stripped. The table records
//! the file each function was compiled from, so the file of `main.main` names
//! the directory of the main package at build time.
//!
//! Supported layouts (little-endian only):
//!
//! | magic        | toolchain       | differences                                  |
//! |--------------|-----------------|----------------------------------------------|
//! | `0xfffffffb` | go1.2 - go1.15  | one table, offsets relative to its start, no cutab |
//! | `0xfffffffa` | go1.16, go1.17  | pointer-sized functab entries and `_func.entry` |
//! | `0xfffffff0` | go1.18, go1.19  | adds `textStart`, 32-bit functab entries     |
//! | `0xfffffff1` | go1.20+         | same fields as go1.18 for our purposes       |

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{LocateError, SourceLocator, existing_dir, read_uvarint};

const MAGIC_GO12: u32 = 0xffff_fffb;
const MAGIC_GO116: u32 = 0xffff_fffa;
const MAGIC_GO118: u32 = 0xffff_fff0;
const MAGIC_GO120: u32 = 0xffff_fff1;

const MAIN_FUNC: &[u8] = b"main.main";

/// Symbol-table based locator. Works for any binary not built with `-trimpath`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymtabLocator;

impl SourceLocator for SymtabLocator {
  fn name(&self) -> &'static str {
    "symtab"
  }

  fn locate(&self, artifact: &Path) -> Result<PathBuf, LocateError> {
    let data = fs::read(artifact).map_err(LocateError::Read)?;
    let file = main_source_file(&data)?;

    let path = PathBuf::from(&file);
    if !path.is_absolute() {
      return Err(LocateError::RelativePath(file));
    }
    let dir = path.parent().ok_or_else(|| LocateError::RelativePath(file.clone()))?;
    existing_dir(dir.to_path_buf())
  }
}

/// Returns the source file recorded for `main.main` in a Go binary image.
pub fn main_source_file(data: &[u8]) -> Result<String, LocateError> {
  let mut result = Err(LocateError::NoSymbolTable);

  for offset in header_candidates(data) {
    let table = match LineTable::parse(&data[offset..]) {
      Ok(table) => table,
      Err(e) => {
        debug!(offset, error = %e, "rejected pclntab candidate");
        continue;
      }
    };

    match table.main_file() {
      Ok(Some(file)) => {
        debug!(offset, version = ?table.version, file = %file, "found main.main");
        return Ok(file);
      }
      Ok(None) => result = Err(LocateError::NoMainFunction),
      Err(e) => {
        debug!(offset, error = %e, "unreadable pclntab");
        if matches!(result, Err(LocateError::NoSymbolTable)) {
          result = Err(e);
        }
      }
    }
  }

  result
}

/// Offsets that start with a plausible pclntab header.
fn header_candidates(data: &[u8]) -> impl Iterator<Item = usize> + '_ {
  data.windows(8).enumerate().filter_map(|(i, w)| {
    let magic = u32::from_le_bytes([w[0], w[1], w[2], w[3]]);
    let known = matches!(magic, MAGIC_GO12 | MAGIC_GO116 | MAGIC_GO118 | MAGIC_GO120);
    let padded = w[4] == 0 && w[5] == 0;
    let quantum = matches!(w[6], 1 | 2 | 4);
    let ptr_size = matches!(w[7], 4 | 8);
    (known && padded && quantum && ptr_size).then_some(i)
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
  Go12,
  Go116,
  Go118,
  Go120,
}

struct LineTable<'a> {
  version: Version,
  ptr_size: usize,
  nfunc: usize,
  funcnametab: &'a [u8],
  /// Empty before go1.16, where `filetab` maps file numbers straight to names.
  cutab: &'a [u8],
  filetab: &'a [u8],
  pctab: &'a [u8],
  /// `(entry, funcoff)` pairs.
  functab: &'a [u8],
  /// Base that `funcoff` is relative to.
  funcdata: &'a [u8],
}

/// A `_func` record.
struct Func<'a> {
  data: &'a [u8],
  /// Size of the leading entry field.
  entry_size: usize,
}

impl Func<'_> {
  /// Reads the n-th 32-bit field after the entry (1 = nameOff, 5 = pcfile, 8 = cuOffset).
  fn field(&self, n: usize) -> Result<u32, LocateError> {
    read_u32(self.data, self.entry_size + (n - 1) * 4).ok_or(LocateError::Malformed("truncated function record"))
  }
}

impl<'a> LineTable<'a> {
  fn parse(data: &'a [u8]) -> Result<Self, LocateError> {
    let truncated = LocateError::Malformed("truncated header");

    let version = match read_u32(data, 0) {
      Some(MAGIC_GO12) => Version::Go12,
      Some(MAGIC_GO116) => Version::Go116,
      Some(MAGIC_GO118) => Version::Go118,
      Some(MAGIC_GO120) => Version::Go120,
      _ => return Err(LocateError::NoSymbolTable),
    };
    let ptr_size = data.get(7).copied().map(usize::from).ok_or(LocateError::Malformed("truncated header"))?;

    let word = |n: usize| read_uint(data, 8 + n * ptr_size, ptr_size).ok_or(LocateError::Malformed("truncated header"));
    let nfunc = word(0)?;

    let mut table = if version == Version::Go12 {
      let functab = data
        .get(8 + ptr_size..)
        .ok_or(LocateError::Malformed("truncated header"))?;
      Self {
        version,
        ptr_size,
        nfunc,
        funcnametab: data,
        cutab: &[],
        filetab: &[],
        pctab: data,
        functab,
        funcdata: data,
      }
    } else {
      // go1.18 inserted textStart after nfiles.
      let first_offset = if version == Version::Go116 { 2 } else { 3 };
      let section = |n: usize| -> Result<&'a [u8], LocateError> {
        let off = word(first_offset + n)?;
        data.get(off..).ok_or(LocateError::Malformed("section offset out of range"))
      };
      let pcln = section(4)?;
      Self {
        version,
        ptr_size,
        nfunc,
        funcnametab: section(0)?,
        cutab: section(1)?,
        filetab: section(2)?,
        pctab: section(3)?,
        functab: pcln,
        funcdata: pcln,
      }
    };

    let functab_len = nfunc
      .checked_mul(2)
      .and_then(|n| n.checked_add(1))
      .and_then(|n| n.checked_mul(table.functab_field_size()))
      .ok_or(truncated)?;
    if functab_len > table.functab.len() {
      return Err(LocateError::Malformed("function table exceeds image"));
    }

    if version == Version::Go12 {
      // The file table offset follows the last functab entry.
      let filetab_off = read_u32(table.functab, functab_len).ok_or(LocateError::Malformed("truncated function table"))?;
      table.filetab = data
        .get(filetab_off as usize..)
        .ok_or(LocateError::Malformed("section offset out of range"))?;
    }

    Ok(table)
  }

  fn functab_field_size(&self) -> usize {
    match self.version {
      Version::Go12 | Version::Go116 => self.ptr_size,
      Version::Go118 | Version::Go120 => 4,
    }
  }

  fn func(&self, index: usize) -> Result<Func<'a>, LocateError> {
    let size = self.functab_field_size();
    let off = read_uint(self.functab, (2 * index + 1) * size, size)
      .ok_or(LocateError::Malformed("truncated function table"))?;
    let data = self
      .funcdata
      .get(off..)
      .ok_or(LocateError::Malformed("function offset out of range"))?;
    let entry_size = match self.version {
      Version::Go12 | Version::Go116 => self.ptr_size,
      Version::Go118 | Version::Go120 => 4,
    };
    Ok(Func { data, entry_size })
  }

  fn main_file(&self) -> Result<Option<String>, LocateError> {
    match self.find_func(MAIN_FUNC)? {
      Some(func) => self.entry_file(&func).map(Some),
      None => Ok(None),
    }
  }

  fn find_func(&self, name: &[u8]) -> Result<Option<Func<'a>>, LocateError> {
    for index in 0..self.nfunc {
      let func = self.func(index)?;
      let name_off = func.field(1)? as usize;
      if cstr(self.funcnametab, name_off) == Some(name) {
        return Ok(Some(func));
      }
    }
    Ok(None)
  }

  /// File containing the entry instruction of `func`.
  fn entry_file(&self, func: &Func<'_>) -> Result<String, LocateError> {
    let pcfile = func.field(5)? as usize;
    if pcfile == 0 {
      return Err(LocateError::Malformed("function has no file table"));
    }

    let file_index = self.first_pc_value(pcfile)?;
    let file_index = usize::try_from(file_index).map_err(|_| LocateError::Malformed("negative file index"))?;

    let name = if self.version == Version::Go12 {
      // Entry 0 holds the number of entries; file numbers start at 1.
      let count = read_u32(self.filetab, 0).ok_or(LocateError::Malformed("truncated file table"))? as usize;
      if file_index == 0 || file_index >= count {
        return Err(LocateError::Malformed("file index out of range"));
      }
      let name_off = read_u32(self.filetab, file_index * 4).ok_or(LocateError::Malformed("file index out of range"))?;
      cstr(self.funcnametab, name_off as usize)
    } else {
      let cu_offset = func.field(8)? as usize;
      let name_off = read_u32(self.cutab, (cu_offset + file_index) * 4)
        .ok_or(LocateError::Malformed("file index out of range"))?;
      cstr(self.filetab, name_off as usize)
    };
    let name = name.ok_or(LocateError::Malformed("file name out of range"))?;
    Ok(String::from_utf8_lossy(name).into_owned())
  }

  /// Decodes the first value of a pc-value table, which starts from -1.
  fn first_pc_value(&self, off: usize) -> Result<i64, LocateError> {
    let mut p = self
      .pctab
      .get(off..)
      .ok_or(LocateError::Malformed("pc table offset out of range"))?;
    let uvdelta = read_uvarint(&mut p).ok_or(LocateError::Malformed("truncated pc table"))?;
    let delta = if uvdelta & 1 != 0 {
      !(uvdelta >> 1) as i64
    } else {
      (uvdelta >> 1) as i64
    };
    Ok(-1 + delta)
  }
}

fn read_u32(data: &[u8], off: usize) -> Option<u32> {
  let bytes = data.get(off..off.checked_add(4)?)?;
  Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_uint(data: &[u8], off: usize, size: usize) -> Option<usize> {
  let bytes = data.get(off..off.checked_add(size)?)?;
  let value = match size {
    4 => u64::from(u32::from_le_bytes(bytes.try_into().ok()?)),
    8 => u64::from_le_bytes(bytes.try_into().ok()?),
    _ => return None,
  };
  usize::try_from(value).ok()
}

/// NUL-terminated string at `off`.
fn cstr(data: &[u8], off: usize) -> Option<&[u8]> {
  let rest = data.get(off..)?;
  let end = rest.iter().position(|&b| b == 0)?;
  Some(&rest[..end])
}
