//! Compiled-unit loader
//!
//! Locates a named compiled unit (`.xjc`) on the loader's search paths,
//! reads it through the storage contract, and validates the container
//! header before handing the payload over. Every failure mode is an
//! ordinary `TaskError`, so a bad unit fails the importing task while the
//! scheduler keeps running.

use std::rc::Rc;

use tracing::debug;

use crate::runtime::coroutine::{from_fn, CoroFrame};
use crate::runtime::errors::TaskError;
use crate::runtime::value::Value;
use super::storage::Storage;

/// Compiled-unit container magic byte.
pub const UNIT_MAGIC: u8 = b'X';

/// Supported container version.
pub const UNIT_VERSION: u8 = 6;

/// File extension for compiled units.
pub const UNIT_EXT: &str = "xjc";

/// A validated compiled unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    /// Unit name as imported.
    pub name: String,
    /// Container version.
    pub version: u8,
    /// Raw payload after the header.
    pub payload: Vec<u8>,
}

/// Locates and validates compiled units through a storage backend.
pub struct UnitLoader {
    storage: Box<dyn Storage>,
    search_paths: Vec<String>,
}

impl std::fmt::Debug for UnitLoader {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("UnitLoader")
            .field("search_paths", &self.search_paths)
            .finish()
    }
}

impl UnitLoader {
    /// Create a loader over a backend, with the backend root as the only
    /// search path.
    pub fn new<S>(storage: S) -> Self
    where
        S: Storage + 'static,
    {
        Self {
            storage: Box::new(storage),
            search_paths: vec![String::new()],
        }
    }

    /// Append a search path.
    pub fn add_search_path(
        &mut self,
        path: impl Into<String>,
    ) {
        self.search_paths.push(path.into());
    }

    /// Locate, read, and validate a unit by name.
    pub fn load(
        &self,
        name: &str,
    ) -> Result<CompiledUnit, TaskError> {
        for dir in &self.search_paths {
            let path = if dir.is_empty() {
                format!("/{}.{}", name, UNIT_EXT)
            } else {
                format!("{}/{}.{}", dir.trim_end_matches('/'), name, UNIT_EXT)
            };
            match self.storage.stat(&path) {
                // Missing on this path: try the next one.
                Err(err) if err.kind == crate::runtime::errors::ErrorKind::Os => continue,
                Err(err) => return Err(err),
                Ok(stat) => {
                    debug!("loading unit '{}' from {} ({} bytes)", name, path, stat.size);
                    let mut blob = self.storage.open(&path)?;
                    let bytes = blob.read_all()?;
                    return validate(name, &bytes);
                }
            }
        }
        Err(TaskError::import(format!("no unit named '{}'", name)))
    }
}

/// Validate a unit container header.
fn validate(
    name: &str,
    bytes: &[u8],
) -> Result<CompiledUnit, TaskError> {
    if bytes.len() < 2 {
        return Err(TaskError::value(
            "incompatible unit file: truncated header",
        ));
    }
    if bytes[0] != UNIT_MAGIC {
        return Err(TaskError::value(format!(
            "incompatible unit file: bad magic 0x{:02x}",
            bytes[0]
        )));
    }
    if bytes[1] != UNIT_VERSION {
        return Err(TaskError::value(format!(
            "incompatible unit file: unsupported version {}",
            bytes[1]
        )));
    }
    Ok(CompiledUnit {
        name: name.to_string(),
        version: bytes[1],
        payload: bytes[2..].to_vec(),
    })
}

/// Build a coroutine frame that performs the import when driven.
///
/// Scheduling this as a task makes import failures ordinary `Failed`
/// outcomes delivered to whoever awaits the import.
pub fn import_unit(
    loader: Rc<UnitLoader>,
    name: impl Into<String>,
) -> CoroFrame {
    let name = name.into();
    from_fn(move || {
        let unit = loader.load(&name)?;
        Ok(Value::from(unit.payload))
    })
    .named("import_unit")
}
