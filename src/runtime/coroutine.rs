//! Coroutine frames
//!
//! A `Coroutine` is the opaque body capability the scheduler drives: given a
//! resume call it either runs to completion or suspends on an `Awaitable`.
//! `CoroFrame` wraps one body invocation as a resumable unit and implements
//! the direct-await chain: a body that awaits another frame has that frame
//! driven in-line on the same call stack, with suspensions bubbling up
//! transparently and completions injected straight back. Only a task
//! boundary ever yields control to the event loop.

use std::fmt;
use std::time::Duration;

use crate::runtime::errors::{RuntimeError, RuntimeResult, TaskError};
use crate::runtime::scheduler::{Cx, TaskHandle, TaskId};
use crate::runtime::value::Value;

/// What a frame is resumed with.
#[derive(Debug, Clone)]
pub enum Resume {
    /// First resume: begin executing the body from the start.
    Start,
    /// The result of whatever the body was suspended on.
    Value(Value),
    /// The failure (or cancellation) of whatever the body was suspended on.
    Error(TaskError),
}

/// What a body produces per resume call.
#[derive(Debug)]
pub enum Step {
    /// Suspend on an awaitable.
    Yield(Awaitable),
    /// Run to completion with a value.
    Return(Value),
    /// Run to completion with an error.
    Raise(TaskError),
}

/// The closed set of things a body may suspend on.
#[derive(Debug)]
pub enum Awaitable {
    /// Another coroutine frame, awaited directly: driven in-line, no task
    /// created, no scheduling round-trip.
    Frame(CoroFrame),
    /// A scheduled task; resolves when the task reaches a terminal state.
    Task(TaskHandle),
    /// Yield control so other ready tasks can run.
    Yield,
    /// Wake after the given duration has elapsed.
    Timer(Duration),
}

/// The loop-visible subset of suspension reasons.
///
/// `Awaitable::Frame` never reaches the loop: the frame driver resolves it
/// in-line and only re-exposes the inner suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// Parked until the task completes.
    Task(TaskId),
    /// Re-enqueue at the back of the ready queue.
    Yield,
    /// Park until the duration elapses.
    Timer(Duration),
}

/// Outcome of resuming a frame once.
#[derive(Debug)]
pub enum FrameResult {
    /// The frame suspended; the loop decides when it becomes resumable.
    Suspended(Suspend),
    /// The body returned.
    Done(Value),
    /// The body raised.
    Failed(TaskError),
}

/// Completion state of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Never resumed.
    NotStarted,
    /// Suspended at an await point.
    Suspended,
    /// Returned a value.
    Done,
    /// Raised an error.
    Failed,
}

impl FrameState {
    /// Check whether the frame can no longer be resumed.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, FrameState::Done | FrameState::Failed)
    }
}

/// The opaque coroutine body capability.
///
/// A body receiving `Resume::Error` it does not want to handle should
/// `Step::Raise` it onward so failures and cancellation propagate.
pub trait Coroutine {
    /// Run until the next suspension point or completion.
    fn resume(
        &mut self,
        cx: &mut Cx<'_>,
        input: Resume,
    ) -> Step;

    /// Body name for diagnostics.
    fn name(&self) -> &str {
        "<coroutine>"
    }
}

/// One invocation of a coroutine body, wrapped as a resumable unit.
///
/// Holds the body call stack: the root body plus any directly-awaited
/// sub-bodies, innermost last. Owned exclusively by whoever drives it.
pub struct CoroFrame {
    name: String,
    stack: Vec<Box<dyn Coroutine>>,
    state: FrameState,
}

impl fmt::Debug for CoroFrame {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CoroFrame")
            .field("name", &self.name)
            .field("depth", &self.stack.len())
            .field("state", &self.state)
            .finish()
    }
}

impl CoroFrame {
    /// Wrap a body as a frame.
    pub fn new<C>(body: C) -> Self
    where
        C: Coroutine + 'static,
    {
        let name = body.name().to_string();
        Self {
            name,
            stack: vec![Box::new(body)],
            state: FrameState::NotStarted,
        }
    }

    /// Rename the frame (builder style).
    pub fn named(
        mut self,
        name: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self
    }

    /// Get the frame name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the completion state.
    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Current direct-await nesting depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Resume the frame with an injected value or error.
    ///
    /// Drives the innermost body; direct awaits of other frames are resolved
    /// here without returning to the caller. Resuming a terminal frame is a
    /// programmer error.
    pub fn resume(
        &mut self,
        cx: &mut Cx<'_>,
        injected: Resume,
    ) -> RuntimeResult<FrameResult> {
        if self.state.is_terminal() {
            return Err(RuntimeError::FrameCompleted);
        }
        let mut input = injected;
        loop {
            let Some(top) = self.stack.last_mut() else {
                return Err(RuntimeError::FrameCompleted);
            };
            match top.resume(cx, input) {
                Step::Yield(Awaitable::Frame(sub)) => {
                    if sub.state.is_terminal() {
                        // A completed frame cannot be re-driven; surface the
                        // misuse to the awaiting body as an ordinary error.
                        input = Resume::Error(TaskError::runtime(format!(
                            "awaited coroutine '{}' has already completed",
                            sub.name
                        )));
                    } else {
                        self.stack.extend(sub.stack);
                        input = Resume::Start;
                    }
                }
                Step::Yield(Awaitable::Task(handle)) => {
                    self.state = FrameState::Suspended;
                    return Ok(FrameResult::Suspended(Suspend::Task(handle.id())));
                }
                Step::Yield(Awaitable::Yield) => {
                    self.state = FrameState::Suspended;
                    return Ok(FrameResult::Suspended(Suspend::Yield));
                }
                Step::Yield(Awaitable::Timer(dur)) => {
                    self.state = FrameState::Suspended;
                    return Ok(FrameResult::Suspended(Suspend::Timer(dur)));
                }
                Step::Return(value) => {
                    self.stack.pop();
                    if self.stack.is_empty() {
                        self.state = FrameState::Done;
                        return Ok(FrameResult::Done(value));
                    }
                    input = Resume::Value(value);
                }
                Step::Raise(err) => {
                    self.stack.pop();
                    if self.stack.is_empty() {
                        self.state = FrameState::Failed;
                        return Ok(FrameResult::Failed(err));
                    }
                    input = Resume::Error(err);
                }
            }
        }
    }
}

/// Leaf body built from a closure; completes on its first resume.
struct OnceBody<F> {
    name: &'static str,
    body: Option<F>,
}

impl<F> Coroutine for OnceBody<F>
where
    F: FnOnce() -> Result<Value, TaskError>,
{
    fn resume(
        &mut self,
        _cx: &mut Cx<'_>,
        _input: Resume,
    ) -> Step {
        match self.body.take() {
            Some(body) => match body() {
                Ok(value) => Step::Return(value),
                Err(err) => Step::Raise(err),
            },
            None => Step::Raise(TaskError::runtime("coroutine body resumed after completion")),
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// General body built from a resume closure.
struct FnBody<F> {
    name: &'static str,
    body: F,
}

impl<F> Coroutine for FnBody<F>
where
    F: FnMut(&mut Cx<'_>, Resume) -> Step,
{
    fn resume(
        &mut self,
        cx: &mut Cx<'_>,
        input: Resume,
    ) -> Step {
        (self.body)(cx, input)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Build a leaf frame from a closure that runs to completion in one resume.
pub fn from_fn<F>(body: F) -> CoroFrame
where
    F: FnOnce() -> Result<Value, TaskError> + 'static,
{
    CoroFrame::new(OnceBody {
        name: "<fn>",
        body: Some(body),
    })
}

/// Build a frame from a full resume closure.
///
/// The closure receives every resume input, including injected errors, and
/// decides whether to suspend, return, or raise.
pub fn from_resume_fn<F>(
    name: &'static str,
    body: F,
) -> CoroFrame
where
    F: FnMut(&mut Cx<'_>, Resume) -> Step + 'static,
{
    CoroFrame::new(FnBody { name, body })
}

/// A frame that immediately completes with the given value.
pub fn ready(value: impl Into<Value>) -> CoroFrame {
    let value = value.into();
    from_fn(move || Ok(value)).named("ready")
}

/// A frame that yields control once and then completes.
pub fn yield_now() -> CoroFrame {
    let mut yielded = false;
    from_resume_fn("yield_now", move |_cx, input| {
        if !yielded {
            yielded = true;
            return Step::Yield(Awaitable::Yield);
        }
        match input {
            Resume::Error(err) => Step::Raise(err),
            _ => Step::Return(Value::Unit),
        }
    })
}

/// A frame that completes after the given duration has elapsed.
pub fn sleep(dur: Duration) -> CoroFrame {
    let mut armed = false;
    from_resume_fn("sleep", move |_cx, input| {
        if !armed {
            armed = true;
            return Step::Yield(Awaitable::Timer(dur));
        }
        match input {
            Resume::Error(err) => Step::Raise(err),
            _ => Step::Return(Value::Unit),
        }
    })
}
