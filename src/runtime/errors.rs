//! Runtime errors
//!
//! Two layers are kept deliberately apart: `TaskError` is the application
//! level error that travels across task boundaries and is delivered to every
//! waiter of a failed task, while `RuntimeError` covers scheduler usage
//! faults and loop-level conditions (deadlock, nested `run`). Application
//! errors never become loop faults and vice versa.

use thiserror::Error;

use crate::runtime::scheduler::TaskId;

/// Runtime result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Category of an application-level task error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The task was cancelled deliberately.
    Cancelled,
    /// Malformed value or data (bad compiled-unit header, etc).
    Value,
    /// Type mismatch.
    Type,
    /// A unit/module could not be located.
    Import,
    /// Storage backend failure.
    Os,
    /// Generic runtime failure inside a body.
    Runtime,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Cancelled => "CancelledError",
            ErrorKind::Value => "ValueError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Import => "ImportError",
            ErrorKind::Os => "OSError",
            ErrorKind::Runtime => "RuntimeError",
        };
        write!(f, "{}", name)
    }
}

/// An error raised by (or injected into) a coroutine body.
///
/// Travels through the waiter-notification path as data, never by stack
/// unwinding. `Clone` + `PartialEq` so that every waiter of a failed task
/// observes the identical error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl TaskError {
    /// Create a task error with an explicit kind.
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The distinguished cancellation signal.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "task was cancelled")
    }

    /// A malformed-data error.
    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    /// A type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    /// A unit lookup failure.
    pub fn import(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Import, message)
    }

    /// A storage backend failure.
    pub fn os(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Os, message)
    }

    /// A generic body failure.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    /// Check whether this is the cancellation signal.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Scheduler-usage and loop-level errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The root task failed or was cancelled; the stored error is re-raised
    /// to the caller of `run`.
    #[error("root task failed: {0}")]
    Task(#[from] TaskError),

    /// All live tasks are suspended and none can ever become ready.
    #[error("deadlock: {live} live task(s) but none can be made ready")]
    Deadlock {
        /// Number of non-terminal tasks at detection time.
        live: usize,
    },

    /// `run` was called while an event loop was already active on this thread.
    #[error("`run` called while an event loop is already active on this thread")]
    NestedRun,

    /// A completed coroutine frame was resumed again.
    #[error("coroutine frame resumed after completion")]
    FrameCompleted,

    /// An operation referenced a task id the loop does not know.
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
}
