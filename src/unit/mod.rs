//! Compiled-unit subsystem
//!
//! Loading and validating compiled module units (`.xjc`) through a
//! pluggable storage backend.

pub mod loader;
pub mod storage;

pub use loader::{import_unit, CompiledUnit, UnitLoader, UNIT_EXT, UNIT_MAGIC, UNIT_VERSION};
pub use storage::{Blob, DirStorage, MemStorage, Storage, UnitStat};
