//! Storage backend contract
//!
//! The loader never touches a filesystem directly; it consumes a backend
//! through this minimal stat/open/read contract. Backend failures surface as
//! ordinary `TaskError`s (kind `Os`), so a broken backend fails the
//! importing task, never the scheduler.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use crate::runtime::errors::TaskError;

/// Metadata for a stored unit file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitStat {
    /// File size in bytes.
    pub size: usize,
}

/// A readable handle to one stored file.
pub trait Blob {
    /// Read the entire contents.
    fn read_all(&mut self) -> Result<Vec<u8>, TaskError>;
}

/// A pluggable storage backend.
pub trait Storage {
    /// Look up a path. A missing path is an `Os` error.
    fn stat(
        &self,
        path: &str,
    ) -> Result<UnitStat, TaskError>;

    /// Open a path for reading.
    fn open(
        &self,
        path: &str,
    ) -> Result<Box<dyn Blob>, TaskError>;
}

/// In-memory backend: a path -> bytes map.
#[derive(Debug, Default)]
pub struct MemStorage {
    files: HashMap<String, Vec<u8>>,
}

impl MemStorage {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) {
        self.files.insert(path.into(), data.into());
    }
}

struct MemBlob {
    data: Vec<u8>,
}

impl Blob for MemBlob {
    fn read_all(&mut self) -> Result<Vec<u8>, TaskError> {
        Ok(std::mem::take(&mut self.data))
    }
}

impl Storage for MemStorage {
    fn stat(
        &self,
        path: &str,
    ) -> Result<UnitStat, TaskError> {
        match self.files.get(path) {
            Some(data) => Ok(UnitStat { size: data.len() }),
            None => Err(TaskError::os(format!("no such file: {}", path))),
        }
    }

    fn open(
        &self,
        path: &str,
    ) -> Result<Box<dyn Blob>, TaskError> {
        match self.files.get(path) {
            Some(data) => Ok(Box::new(MemBlob { data: data.clone() })),
            None => Err(TaskError::os(format!("no such file: {}", path))),
        }
    }
}

/// Directory-rooted backend over the host filesystem.
#[derive(Debug)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Create a backend rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(
        &self,
        path: &str,
    ) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

struct FileBlob {
    file: fs::File,
}

impl Blob for FileBlob {
    fn read_all(&mut self) -> Result<Vec<u8>, TaskError> {
        let mut data = Vec::new();
        self.file
            .read_to_end(&mut data)
            .map_err(|err| TaskError::os(err.to_string()))?;
        Ok(data)
    }
}

impl Storage for DirStorage {
    fn stat(
        &self,
        path: &str,
    ) -> Result<UnitStat, TaskError> {
        let meta = fs::metadata(self.resolve(path))
            .map_err(|_| TaskError::os(format!("no such file: {}", path)))?;
        if !meta.is_file() {
            return Err(TaskError::os(format!("not a file: {}", path)));
        }
        Ok(UnitStat {
            size: meta.len() as usize,
        })
    }

    fn open(
        &self,
        path: &str,
    ) -> Result<Box<dyn Blob>, TaskError> {
        let file = fs::File::open(self.resolve(path))
            .map_err(|_| TaskError::os(format!("no such file: {}", path)))?;
        Ok(Box::new(FileBlob { file }))
    }
}
