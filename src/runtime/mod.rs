//! Runtime system
//!
//! This module contains the value representation, the coroutine frame state
//! machine, and the cooperative event loop that schedules frames as tasks.

pub mod coroutine;
pub mod errors;
pub mod scheduler;
pub mod value;

pub use coroutine::{
    from_fn, from_resume_fn, ready, sleep, yield_now, Awaitable, CoroFrame, Coroutine,
    FrameResult, FrameState, Resume, Step, Suspend,
};
pub use errors::{ErrorKind, RuntimeError, RuntimeResult, TaskError};
pub use scheduler::{Cx, EventLoop, LoopConfig, Task, TaskHandle, TaskId, TaskState};
pub use value::Value;
