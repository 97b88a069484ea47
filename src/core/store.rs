//! Hierarchical byte store holding a snapshot.
//!
//! A snapshot lives either in a plain directory or in a single zip file.
//! Both backends address entries with '/'-delimited relative paths and
//! behave identically: restore only ever talks to the [`Store`] trait.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{Result, SnapshotError, ErrorContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

pub trait Store {
    /// Names one level below `dir`, sorted; empty when `dir` does not exist
    fn listdir(&self, dir: &str) -> Result<Vec<String>>;

    /// Copy the files under `src` into `dst` on the real filesystem
    fn extractdir(&self, src: &str, dst: &Path, recursive: bool) -> Result<()>;

    fn read(&self, path: &str) -> Result<Vec<u8>>;

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()>;

    fn close(self: Box<Self>) -> Result<()>;

    /// `read`, mapping a missing entry to `None`
    fn read_optional(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_string_optional(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .read_optional(path)?
            .map(|data| String::from_utf8_lossy(&data).into_owned()))
    }
}

/// Open the store at `path`, picking the backend from the location's form
pub fn open_store(path: &Path, mode: OpenMode) -> Result<Box<dyn Store>> {
    if path.is_dir() {
        return Ok(Box::new(DirStore::open(path, mode)?));
    }
    if path.is_file() {
        return Ok(Box::new(ZipStore::open(path, mode)?));
    }
    match mode {
        OpenMode::Read => Err(SnapshotError::NotFound {
            resource: "archive".to_string(),
            identifier: path.display().to_string(),
        }),
        OpenMode::Write if is_zip_name(path) => Ok(Box::new(ZipStore::open(path, mode)?)),
        OpenMode::Write => Ok(Box::new(DirStore::open(path, mode)?)),
    }
}

fn is_zip_name(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("zip"))
}

/// Strip leading/trailing separators and empty components
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Join store path components with '/'
pub fn join(parts: &[&str]) -> String {
    normalize(&parts.join("/"))
}

fn not_found(path: &str) -> SnapshotError {
    SnapshotError::NotFound {
        resource: "archive entry".to_string(),
        identifier: path.to_string(),
    }
}

fn write_file(dst: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_io_context(|| format!("creating directory {}", parent.display()))?;
    }
    fs::write(dst, data).with_io_context(|| format!("writing {}", dst.display()))
}

/// Store backed by a plain directory tree
pub struct DirStore {
    root: PathBuf,
    mode: OpenMode,
}

impl DirStore {
    pub fn open<P: AsRef<Path>>(root: P, mode: OpenMode) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if mode == OpenMode::Write {
            fs::create_dir_all(&root)
                .with_io_context(|| format!("creating archive directory {}", root.display()))?;
        }
        Ok(Self { root, mode })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let normalized = normalize(path);
        if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(normalized)
        }
    }
}

impl Store for DirStore {
    fn listdir(&self, dir: &str) -> Result<Vec<String>> {
        let dir_path = self.resolve(dir);
        if !dir_path.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let entries = fs::read_dir(&dir_path)
            .with_io_context(|| format!("reading archive directory {}", dir_path.display()))?;
        for entry in entries {
            let entry = entry
                .with_io_context(|| format!("reading entry in {}", dir_path.display()))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn extractdir(&self, src: &str, dst: &Path, recursive: bool) -> Result<()> {
        for name in self.listdir(src)? {
            let child = join(&[src, &name]);
            let child_path = self.resolve(&child);
            if child_path.is_dir() {
                if recursive {
                    self.extractdir(&child, &dst.join(&name), true)?;
                }
            } else {
                write_file(&dst.join(&name), &self.read(&child)?)?;
            }
        }
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.resolve(path);
        if !file.is_file() {
            return Err(not_found(path));
        }
        fs::read(&file).with_io_context(|| format!("reading {}", file.display()))
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        if self.mode == OpenMode::Read {
            return Err(SnapshotError::ReadOnly { path: path.to_string() });
        }
        write_file(&self.resolve(path), data)
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

enum ZipInner {
    Reader(RefCell<ZipArchive<File>>),
    Writer(ZipWriter<File>),
}

/// Store backed by a single zip file with a flattened path index
pub struct ZipStore {
    path: PathBuf,
    inner: ZipInner,
    /// Every file entry, keyed by normalized path
    index: BTreeSet<String>,
}

impl ZipStore {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match mode {
            OpenMode::Read => {
                let file = File::open(&path)
                    .with_io_context(|| format!("opening archive {}", path.display()))?;
                let archive = ZipArchive::new(file)
                    .with_io_context(|| format!("reading archive {}", path.display()))?;
                let index = archive
                    .file_names()
                    .filter(|name| !name.ends_with('/'))
                    .map(normalize)
                    .collect();
                Ok(Self {
                    path,
                    inner: ZipInner::Reader(RefCell::new(archive)),
                    index,
                })
            }
            OpenMode::Write => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)
                        .with_io_context(|| format!("creating directory {}", parent.display()))?;
                }
                let file = File::create(&path)
                    .with_io_context(|| format!("creating archive {}", path.display()))?;
                Ok(Self {
                    path,
                    inner: ZipInner::Writer(ZipWriter::new(file)),
                    index: BTreeSet::new(),
                })
            }
        }
    }

    /// Entries strictly below `dir`, as paths relative to it
    fn entries_under(&self, dir: &str) -> Vec<String> {
        let dir = normalize(dir);
        let prefix = if dir.is_empty() { String::new() } else { format!("{}/", dir) };
        self.index
            .iter()
            .filter_map(|name| name.strip_prefix(prefix.as_str()).map(str::to_string))
            .collect()
    }
}

impl Store for ZipStore {
    fn listdir(&self, dir: &str) -> Result<Vec<String>> {
        let names: BTreeSet<String> = self
            .entries_under(dir)
            .iter()
            .filter_map(|rel| rel.split('/').next().map(str::to_string))
            .collect();
        Ok(names.into_iter().collect())
    }

    fn extractdir(&self, src: &str, dst: &Path, recursive: bool) -> Result<()> {
        let mut files: BTreeMap<String, String> = BTreeMap::new();
        for rel in self.entries_under(src) {
            if recursive || !rel.contains('/') {
                files.insert(join(&[src, &rel]), rel);
            }
        }
        for (full, rel) in files {
            write_file(&dst.join(&rel), &self.read(&full)?)?;
        }
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let name = normalize(path);
        let archive = match &self.inner {
            ZipInner::Reader(archive) => archive,
            ZipInner::Writer(_) => {
                return Err(SnapshotError::Archive {
                    operation: format!("reading {}", name),
                    reason: format!("{} is opened for writing", self.path.display()),
                })
            }
        };
        if !self.index.contains(&name) {
            return Err(not_found(path));
        }

        let mut archive = archive.borrow_mut();
        let mut entry = archive
            .by_name(&name)
            .with_io_context(|| format!("locating {} in {}", name, self.path.display()))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_io_context(|| format!("reading {} from {}", name, self.path.display()))?;
        Ok(data)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let name = normalize(path);
        let writer = match &mut self.inner {
            ZipInner::Writer(writer) => writer,
            ZipInner::Reader(_) => return Err(SnapshotError::ReadOnly { path: name }),
        };
        if self.index.contains(&name) {
            return Err(SnapshotError::Archive {
                operation: format!("writing {}", name),
                reason: "entry already written".to_string(),
            });
        }

        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        writer
            .start_file(name.as_str(), options)
            .with_io_context(|| format!("adding {} to {}", name, self.path.display()))?;
        writer
            .write_all(data)
            .with_io_context(|| format!("writing {} to {}", name, self.path.display()))?;
        self.index.insert(name);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let path = self.path;
        if let ZipInner::Writer(mut writer) = self.inner {
            let mut file = writer
                .finish()
                .with_io_context(|| format!("finalizing archive {}", path.display()))?;
            file.flush()
                .with_io_context(|| format!("flushing archive {}", path.display()))?;
        }
        Ok(())
    }
}
