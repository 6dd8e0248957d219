//! Task definitions for the event loop.
//!
//! A task is a coroutine frame registered with the scheduler for independent
//! progress, with its own completion state and waiter set.

use smallvec::SmallVec;

use crate::runtime::coroutine::CoroFrame;
use crate::runtime::errors::TaskError;
use crate::runtime::value::Value;

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub usize);

impl TaskId {
    /// Get the inner value.
    #[inline]
    pub fn inner(&self) -> usize {
        self.0
    }
}

impl From<usize> for TaskId {
    fn from(val: usize) -> Self {
        Self(val)
    }
}

impl From<TaskId> for usize {
    fn from(val: TaskId) -> Self {
        val.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// Opaque handle to a scheduled task.
///
/// Returned at submission time, before any of the task's body has run.
/// Awaiting the handle (`Awaitable::Task`) resolves once the task reaches a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: TaskId,
}

impl TaskHandle {
    /// Wrap a task id.
    #[inline]
    pub(crate) fn new(id: TaskId) -> Self {
        Self { id }
    }

    /// Get the task id.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Task state.
///
/// Transitions are monotonic: `Pending` -> `Running` -> one of the terminal
/// states. There is no transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting to be scheduled or parked on an awaitable.
    Pending,
    /// Currently being resumed by the loop.
    Running,
    /// Completed with a value.
    Done,
    /// Completed with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl TaskState {
    /// Check if this is a terminal state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Done | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// A scheduled, independently-progressing coroutine frame.
pub struct Task {
    /// Unique task ID.
    id: TaskId,
    /// Task name for debugging.
    name: String,
    /// The wrapped coroutine frame.
    frame: CoroFrame,
    /// Current state.
    state: TaskState,
    /// Terminal payload, set exactly once.
    outcome: Option<Result<Value, TaskError>>,
    /// Tasks suspended pending this task's completion, in registration order.
    waiters: SmallVec<[TaskId; 2]>,
    /// A cancellation has been requested but not yet delivered.
    cancel_requested: bool,
    /// The frame has been resumed at least once.
    started: bool,
    /// The terminal outcome has been retrieved at least once.
    outcome_observed: bool,
}

impl std::fmt::Debug for Task {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("waiters", &self.waiters.len())
            .field("cancel_requested", &self.cancel_requested)
            .finish()
    }
}

impl Task {
    /// Create a new pending task wrapping the given frame.
    pub fn new(
        id: TaskId,
        name: String,
        frame: CoroFrame,
    ) -> Self {
        Self {
            id,
            name,
            frame,
            state: TaskState::Pending,
            outcome: None,
            waiters: SmallVec::new(),
            cancel_requested: false,
            started: false,
            outcome_observed: false,
        }
    }

    /// Get the task ID.
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Get the task name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state.
    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Set a non-terminal state.
    #[inline]
    pub(crate) fn set_state(
        &mut self,
        state: TaskState,
    ) {
        debug_assert!(!self.state.is_terminal(), "no transition out of terminal");
        debug_assert!(!state.is_terminal(), "terminal states go through finish()");
        self.state = state;
    }

    /// Check if the task has reached a terminal state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Mutable access to the wrapped frame.
    #[inline]
    pub(crate) fn frame_mut(&mut self) -> &mut CoroFrame {
        &mut self.frame
    }

    /// Mark the frame as having been resumed at least once.
    #[inline]
    pub(crate) fn mark_started(&mut self) {
        self.started = true;
    }

    /// Whether the frame has ever been resumed.
    #[inline]
    pub fn started(&self) -> bool {
        self.started
    }

    /// Request cancellation; delivered at the next resume point.
    #[inline]
    pub(crate) fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    /// Consume a pending cancellation request.
    #[inline]
    pub(crate) fn take_cancel_request(&mut self) -> bool {
        std::mem::take(&mut self.cancel_requested)
    }

    /// Whether a cancellation request is pending.
    #[inline]
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Register a waiter, notified once when this task becomes terminal.
    pub(crate) fn push_waiter(
        &mut self,
        waiter: TaskId,
    ) {
        debug_assert!(!self.waiters.contains(&waiter), "waiter registered twice");
        self.waiters.push(waiter);
    }

    /// Remove a parked waiter (it is being cancelled). Returns whether it
    /// was registered here.
    pub(crate) fn remove_waiter(
        &mut self,
        waiter: TaskId,
    ) -> bool {
        match self.waiters.iter().position(|w| *w == waiter) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Take the registered waiters in FIFO order.
    pub(crate) fn take_waiters(&mut self) -> SmallVec<[TaskId; 2]> {
        std::mem::take(&mut self.waiters)
    }

    /// Transition to a terminal state and store the outcome, exactly once.
    pub(crate) fn finish(
        &mut self,
        state: TaskState,
        outcome: Result<Value, TaskError>,
    ) {
        debug_assert!(state.is_terminal());
        debug_assert!(self.outcome.is_none(), "task finished twice");
        self.state = state;
        self.outcome = Some(outcome);
    }

    /// Retrieve a copy of the terminal outcome, marking it observed.
    ///
    /// Idempotent: every retrieval returns the identical stored result.
    pub(crate) fn observe_outcome(&mut self) -> Result<Value, TaskError> {
        self.outcome_observed = true;
        self.outcome
            .clone()
            .unwrap_or_else(|| Err(TaskError::runtime("task has no outcome yet")))
    }

    /// Whether the outcome was ever retrieved.
    #[inline]
    pub fn outcome_observed(&self) -> bool {
        self.outcome_observed
    }
}

/// Iterator for generating task IDs.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next_id: usize,
}

impl TaskIdGenerator {
    /// Create a new task ID generator.
    #[inline]
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Generate the next task ID.
    #[inline]
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        TaskId(id)
    }
}
