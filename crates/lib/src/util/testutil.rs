//! Test utilities for gorebuild-lib.
//!
//! Builds byte images that look enough like Go executables for the source
//! locators to parse, and writes a stand-in `go` command for rebuild tests.

use std::path::{Path, PathBuf};

/// Layout of the synthesized function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PclnLayout {
  Go12,
  Go116,
  Go118,
  #[default]
  Go120,
}

/// Builder for a fake Go executable.
///
/// The image starts with an ELF-looking prefix and a decoy pclntab header
/// that fails validation, followed by the real tables.
#[derive(Debug, Clone, Default)]
pub struct GoBinary {
  layout: PclnLayout,
  funcs: Vec<(String, String)>,
  build_info: Option<String>,
}

impl GoBinary {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn layout(mut self, layout: PclnLayout) -> Self {
    self.layout = layout;
    self
  }

  /// Adds a function compiled from `file`.
  pub fn func(mut self, name: &str, file: &str) -> Self {
    self.funcs.push((name.to_string(), file.to_string()));
    self
  }

  /// Embeds build info naming `import_path` as the main package.
  pub fn build_info(mut self, import_path: &str) -> Self {
    self.build_info = Some(import_path.to_string());
    self
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    let mut image = b"\x7fELF\x02\x01\x01".to_vec();
    image.resize(64, 0);
    // Decoy: valid-looking magic whose function count runs past the image.
    image.extend_from_slice(&[0xf1, 0xff, 0xff, 0xff, 0, 0, 1, 8]);
    image.extend_from_slice(&[0xff; 24]);
    image.resize(image.len().next_multiple_of(16), 0);

    if !self.funcs.is_empty() {
      image.extend_from_slice(&self.pclntab());
      image.resize(image.len().next_multiple_of(16), 0);
    }
    if let Some(path) = &self.build_info {
      image.extend_from_slice(&build_info_blob(path));
    }
    image.extend_from_slice(b"\0trailer");
    image
  }

  pub fn write_to(&self, path: &Path) {
    std::fs::write(path, self.to_bytes()).unwrap_or_else(|e| panic!("failed to write {}: {}", path.display(), e));
  }

  fn pclntab(&self) -> Vec<u8> {
    const PTR: usize = 8;
    let magic: u32 = match self.layout {
      PclnLayout::Go12 => return self.go12_pclntab(),
      PclnLayout::Go116 => 0xffff_fffa,
      PclnLayout::Go118 => 0xffff_fff0,
      PclnLayout::Go120 => 0xffff_fff1,
    };
    let legacy = self.layout == PclnLayout::Go116;

    let mut files: Vec<&str> = Vec::new();
    for (_, file) in &self.funcs {
      if !files.contains(&file.as_str()) {
        files.push(file.as_str());
      }
    }

    let mut filetab = Vec::new();
    let mut cutab = Vec::new();
    for file in &files {
      cutab.extend_from_slice(&(filetab.len() as u32).to_le_bytes());
      filetab.extend_from_slice(file.as_bytes());
      filetab.push(0);
    }

    let mut funcnametab = Vec::new();
    let mut pctab = vec![0u8];
    let mut records = Vec::new();
    for (i, (name, file)) in self.funcs.iter().enumerate() {
      let name_off = funcnametab.len() as u32;
      funcnametab.extend_from_slice(name.as_bytes());
      funcnametab.push(0);

      let pcfile = pctab.len() as u32;
      let file_index = files.iter().position(|f| *f == file.as_str()).unwrap_or_default() as u64;
      // First value delta from -1, zigzag encoded, then a one-quantum pc step and the terminator.
      put_uvarint(&mut pctab, (file_index + 1) << 1);
      put_uvarint(&mut pctab, 1);
      pctab.push(0);

      let mut record = Vec::new();
      let entry = (i as u64) * 16;
      if legacy {
        record.extend_from_slice(&entry.to_le_bytes());
      } else {
        record.extend_from_slice(&(entry as u32).to_le_bytes());
      }
      // nameOff, args, deferreturn, pcsp, pcfile, pcln, npcdata, cuOffset
      for field in [name_off, 0, 0, 0, pcfile, 0, 0, 0] {
        record.extend_from_slice(&field.to_le_bytes());
      }
      if self.layout == PclnLayout::Go120 {
        record.extend_from_slice(&0i32.to_le_bytes());
      }
      // funcID, flag, padding, nfuncdata
      record.extend_from_slice(&[0, 0, 0, 0]);
      records.push(record);
    }

    let field = if legacy { PTR } else { 4 };
    let put_field = |buf: &mut Vec<u8>, value: u64| {
      if legacy {
        buf.extend_from_slice(&value.to_le_bytes());
      } else {
        buf.extend_from_slice(&(value as u32).to_le_bytes());
      }
    };

    let nfunc = self.funcs.len();
    let mut functab = Vec::new();
    let mut func_off = (2 * nfunc + 1) * field;
    for (i, record) in records.iter().enumerate() {
      put_field(&mut functab, (i as u64) * 16);
      put_field(&mut functab, func_off as u64);
      func_off += record.len();
    }
    put_field(&mut functab, (nfunc as u64) * 16);
    for record in &records {
      functab.extend_from_slice(record);
    }

    let words = if legacy { 7 } else { 8 };
    let header_len = 8 + words * PTR;
    let funcname_off = header_len;
    let cu_off = funcname_off + funcnametab.len();
    let filetab_off = cu_off + cutab.len();
    let pctab_off = filetab_off + filetab.len();
    let pcln_off = pctab_off + pctab.len();

    let mut out = Vec::new();
    out.extend_from_slice(&magic.to_le_bytes());
    out.extend_from_slice(&[0, 0, 1, PTR as u8]);
    let mut header_words = vec![nfunc, files.len()];
    if !legacy {
      header_words.push(0); // textStart
    }
    header_words.extend([funcname_off, cu_off, filetab_off, pctab_off, pcln_off]);
    for word in header_words {
      out.extend_from_slice(&(word as u64).to_le_bytes());
    }
    out.extend_from_slice(&funcnametab);
    out.extend_from_slice(&cutab);
    out.extend_from_slice(&filetab);
    out.extend_from_slice(&pctab);
    out.extend_from_slice(&functab);
    out
  }

  /// Single-table layout used from go1.2 to go1.15; every offset is from the table start.
  fn go12_pclntab(&self) -> Vec<u8> {
    const PTR: usize = 8;
    const RECORD_LEN: usize = PTR + 8 * 4;

    let mut files: Vec<&str> = Vec::new();
    for (_, file) in &self.funcs {
      if !files.contains(&file.as_str()) {
        files.push(file.as_str());
      }
    }

    let nfunc = self.funcs.len();
    let functab_off = 8 + PTR;
    let records_off = functab_off + (2 * nfunc + 1) * PTR + 4;
    let filetab_off = records_off + nfunc * RECORD_LEN;
    let strings_off = filetab_off + (files.len() + 1) * 4;

    let mut strings = Vec::new();
    let mut put_str = |s: &str| {
      let off = strings_off + strings.len();
      strings.extend_from_slice(s.as_bytes());
      strings.push(0);
      off as u32
    };
    let name_offs: Vec<u32> = self.funcs.iter().map(|(name, _)| put_str(name.as_str())).collect();
    let file_offs: Vec<u32> = files.iter().map(|&file| put_str(file)).collect();
    let pctab_off = strings_off + strings.len();

    let mut pctab = vec![0u8];
    let mut pcfile_offs = Vec::new();
    for (_, file) in &self.funcs {
      pcfile_offs.push((pctab_off + pctab.len()) as u32);
      // File numbers are 1-based here.
      let fno = files.iter().position(|f| *f == file.as_str()).unwrap_or_default() as u64 + 1;
      put_uvarint(&mut pctab, (fno + 1) << 1);
      put_uvarint(&mut pctab, 1);
      pctab.push(0);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&0xffff_fffbu32.to_le_bytes());
    out.extend_from_slice(&[0, 0, 1, PTR as u8]);
    out.extend_from_slice(&(nfunc as u64).to_le_bytes());
    for i in 0..nfunc {
      out.extend_from_slice(&((i as u64) * 16).to_le_bytes());
      out.extend_from_slice(&((records_off + i * RECORD_LEN) as u64).to_le_bytes());
    }
    out.extend_from_slice(&((nfunc as u64) * 16).to_le_bytes());
    out.extend_from_slice(&(filetab_off as u32).to_le_bytes());

    for i in 0..nfunc {
      out.extend_from_slice(&((i as u64) * 16).to_le_bytes());
      // nameoff, args, frame, pcsp, pcfile, pcln, npcdata, nfuncdata
      for field in [name_offs[i], 0, 0, 0, pcfile_offs[i], 0, 0, 0] {
        out.extend_from_slice(&field.to_le_bytes());
      }
    }

    out.extend_from_slice(&((files.len() + 1) as u32).to_le_bytes());
    for off in file_offs {
      out.extend_from_slice(&off.to_le_bytes());
    }
    out.extend_from_slice(&strings);
    out.extend_from_slice(&pctab);
    out
  }
}

fn build_info_blob(import_path: &str) -> Vec<u8> {
  const START: [u8; 16] = [
    0x30, 0x77, 0xaf, 0x0c, 0x92, 0x74, 0x08, 0x02, 0x41, 0xe1, 0xc1, 0x07, 0xe6, 0xd6, 0x18, 0xe6,
  ];
  const END: [u8; 16] = [
    0xf9, 0x32, 0x43, 0x31, 0x86, 0x18, 0x20, 0x72, 0x00, 0x82, 0x42, 0x10, 0x41, 0x16, 0xd8, 0xf2,
  ];

  let mut blob = b"\xff Go buildinf:".to_vec();
  blob.extend_from_slice(&[8, 0x2]);
  blob.resize(32, 0);

  let version = b"go1.22.4";
  put_uvarint(&mut blob, version.len() as u64);
  blob.extend_from_slice(version);

  let mut modinfo = START.to_vec();
  modinfo.extend_from_slice(format!("path\t{import_path}\nbuild\t-compiler=gc\n").as_bytes());
  modinfo.extend_from_slice(&END);
  put_uvarint(&mut blob, modinfo.len() as u64);
  blob.extend_from_slice(&modinfo);
  blob
}

pub fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
  while value >= 0x80 {
    buf.push((value as u8) | 0x80);
    value >>= 7;
  }
  buf.push(value as u8);
}

/// A GOPATH-style workspace with a stand-in `go` command.
///
/// The fake toolchain understands `go install [-v] <import path>`: it fails
/// when `<src>/<import path>/FAIL` exists, otherwise it copies every file of
/// `<src>/<import path>/out/` into `$GOBIN` and records the call in
/// `<root>/invocations`.
#[cfg(unix)]
pub struct FakeGo {
  pub temp: tempfile::TempDir,
}

#[cfg(unix)]
impl FakeGo {
  pub fn new() -> Self {
    let temp = tempfile::TempDir::new().unwrap();
    let fake = Self { temp };
    std::fs::create_dir_all(fake.bin_dir()).unwrap();
    std::fs::create_dir_all(fake.src_dir()).unwrap();
    fake.write_script();
    fake
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn src_dir(&self) -> PathBuf {
    self.root().join("src")
  }

  pub fn bin_dir(&self) -> PathBuf {
    self.root().join("bin")
  }

  pub fn program(&self) -> PathBuf {
    self.root().join("fake-go")
  }

  pub fn workspace(&self) -> crate::workspace::GoWorkspace {
    crate::workspace::GoWorkspace::new(self.root())
  }

  pub fn toolchain(&self) -> crate::rebuild::Toolchain {
    crate::rebuild::Toolchain::new(self.program())
  }

  /// Creates the package `import_path` and installs an older build of it.
  ///
  /// A rebuild produces one binary named after the last path element, which
  /// differs from the installed one but resolves to the same package.
  pub fn package(&self, import_path: &str) -> PathBuf {
    let name = import_path.rsplit('/').next().unwrap_or(import_path);
    let fresh = self.binary_for(&self.src_dir().join(import_path)).to_bytes();
    self.package_with_outputs(import_path, &[(name, fresh.as_slice())])
  }

  /// Like [`FakeGo::package`] but a build produces exactly `outputs`.
  pub fn package_with_outputs(&self, import_path: &str, outputs: &[(&str, &[u8])]) -> PathBuf {
    let dir = self.src_dir().join(import_path);
    let out = dir.join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(dir.join("main.go"), "package main\n").unwrap();
    for (name, content) in outputs {
      std::fs::write(out.join(name), content).unwrap();
    }

    let name = import_path.rsplit('/').next().unwrap_or(import_path);
    let artifact = self.bin_dir().join(name);
    self.binary_for(&dir).build_info(import_path).write_to(&artifact);
    artifact
  }

  /// A Go image whose `main.main` lives in `dir/main.go`.
  pub fn binary_for(&self, dir: &Path) -> GoBinary {
    GoBinary::new()
      .func("runtime.main", "/usr/local/go/src/runtime/proc.go")
      .func("main.main", &dir.join("main.go").to_string_lossy())
  }

  /// Makes every build of `import_path` fail, leaving `stray` behind in `$GOBIN`.
  pub fn fail(&self, import_path: &str, stray: Option<&str>) {
    let marker = self.src_dir().join(import_path).join("FAIL");
    std::fs::write(marker, stray.unwrap_or_default()).unwrap();
  }

  /// Import paths passed to `go install`, in call order.
  pub fn invocations(&self) -> Vec<String> {
    std::fs::read_to_string(self.root().join("invocations"))
      .map(|s| s.lines().map(str::to_string).collect())
      .unwrap_or_default()
  }

  fn write_script(&self) {
    use std::os::unix::fs::PermissionsExt;

    let script = format!(
      r#"#!/bin/sh
root='{root}'
[ "$1" = install ] || {{ echo "unsupported: $*" >&2; exit 2; }}
shift
if [ "$1" = -v ]; then
  shift
  echo "$1" >&2
fi
pkg="$root/src/$1"
echo "$1" >> "$root/invocations"
if [ -f "$pkg/FAIL" ]; then
  stray=$(cat "$pkg/FAIL")
  [ -n "$stray" ] && echo partial > "$GOBIN/$stray"
  echo "$1: build failed" >&2
  exit 1
fi
cp "$pkg"/out/* "$GOBIN"/
"#,
      root = self.root().display()
    );

    let program = self.program();
    std::fs::write(&program, script).unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
  }
}

#[cfg(unix)]
impl Default for FakeGo {
  fn default() -> Self {
    Self::new()
  }
}
