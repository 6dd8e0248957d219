//! XuanJi (璇玑) Cooperative Task Runtime
//!
//! A strictly single-threaded, deterministic task scheduler for embedded
//! interpreters: coroutine frames, an event loop with FIFO readiness, and
//! await-chain resolution that only yields to the loop at task boundaries.
//!
//! # Example
//!
//! ```rust
//! use xuanji::runtime::{ready, Value};
//!
//! let value = xuanji::run(ready(42i64)).unwrap();
//! assert_eq!(value, Value::Int(42));
//! ```

#![doc(html_root_url = "https://docs.rs/xuanji")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod runtime;
pub mod unit;

// Utility modules
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use thiserror::Error;

use tracing::debug;

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime name
pub const NAME: &str = "XuanJi (璇玑)";

/// Drive a coroutine frame to completion on a fresh event loop.
///
/// The frame becomes the root task; its value is returned, its error is
/// re-raised. Fails with [`runtime::RuntimeError::NestedRun`] if a loop is
/// already active on this thread.
///
/// # Example
///
/// ```rust
/// use xuanji::runtime::{ready, Value};
///
/// let value = xuanji::run(ready("hello")).unwrap();
/// assert_eq!(value, Value::from("hello"));
/// ```
pub fn run(frame: runtime::CoroFrame) -> runtime::RuntimeResult<runtime::Value> {
    debug!("run: fresh event loop for '{}'", frame.name());
    let mut event_loop = runtime::EventLoop::new();
    event_loop.run(frame)
}
