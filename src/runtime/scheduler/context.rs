//! Scheduling context and loop scope
//!
//! `Cx` is the explicit handle threaded into every body resume: it is the
//! only way running code can submit or cancel tasks, so task creation
//! outside an active loop is unrepresentable rather than a runtime check.
//! The thread-local scope guard enforces the remaining dynamic rule: at most
//! one `run` active per thread.

use std::cell::Cell;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::runtime::coroutine::{CoroFrame, Resume};
use crate::runtime::errors::{RuntimeError, RuntimeResult, TaskError};
use super::queue::ReadyQueue;
use super::task::{Task, TaskHandle, TaskId, TaskIdGenerator, TaskState};

/// The scheduling capability handed to a coroutine body for the duration of
/// one resume call.
pub struct Cx<'a> {
    ids: &'a mut TaskIdGenerator,
    tasks: &'a mut IndexMap<TaskId, Task>,
    ready: &'a mut ReadyQueue,
    cancels: &'a mut Vec<TaskId>,
    max_tasks: usize,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(
        ids: &'a mut TaskIdGenerator,
        tasks: &'a mut IndexMap<TaskId, Task>,
        ready: &'a mut ReadyQueue,
        cancels: &'a mut Vec<TaskId>,
        max_tasks: usize,
    ) -> Self {
        Self {
            ids,
            tasks,
            ready,
            cancels,
            max_tasks,
        }
    }

    /// Submit a frame as an independent task.
    ///
    /// The task is registered and enqueued for a later tick; none of its
    /// body runs before the submitting resume call returns. The handle is
    /// returned immediately.
    pub fn spawn(
        &mut self,
        frame: CoroFrame,
    ) -> TaskHandle {
        self.spawn_named_inner(None, frame)
    }

    /// Submit a frame as a task with an explicit debug name.
    pub fn spawn_named(
        &mut self,
        name: impl Into<String>,
        frame: CoroFrame,
    ) -> TaskHandle {
        self.spawn_named_inner(Some(name.into()), frame)
    }

    fn spawn_named_inner(
        &mut self,
        name: Option<String>,
        frame: CoroFrame,
    ) -> TaskHandle {
        enroll(
            self.ids,
            self.tasks,
            self.ready,
            self.max_tasks,
            name,
            frame,
        )
    }

    /// Request cancellation of a task.
    ///
    /// Applied by the loop after the current resume call returns; the
    /// cancellation signal is delivered at the target's next resume point,
    /// never between two suspension points.
    pub fn cancel(
        &mut self,
        handle: TaskHandle,
    ) {
        self.cancels.push(handle.id());
    }

    /// Look up the state of a task.
    pub fn task_state(
        &self,
        handle: TaskHandle,
    ) -> Option<TaskState> {
        self.tasks.get(&handle.id()).map(|t| t.state())
    }
}

/// Register a new pending task and enqueue its first resume.
///
/// Shared by `Cx::spawn` (mid-resume submission) and the loop's own spawn
/// surface; both therefore preserve FIFO submission order.
pub(crate) fn enroll(
    ids: &mut TaskIdGenerator,
    tasks: &mut IndexMap<TaskId, Task>,
    ready: &mut ReadyQueue,
    max_tasks: usize,
    name: Option<String>,
    frame: CoroFrame,
) -> TaskHandle {
    let id = ids.next();
    let name = name.unwrap_or_else(|| format!("Task({})", id.inner()));
    let mut task = Task::new(id, name, frame);

    if tasks.len() >= max_tasks {
        warn!(
            "task limit ({}) reached, {} fails at submission",
            max_tasks,
            task.name()
        );
        task.finish(
            TaskState::Failed,
            Err(TaskError::runtime("task limit reached")),
        );
        tasks.insert(id, task);
        return TaskHandle::new(id);
    }

    debug!("scheduled {}", task.name());
    tasks.insert(id, task);
    ready.push(id, Resume::Start);
    TaskHandle::new(id)
}

thread_local! {
    /// Whether an event loop is currently running on this thread.
    static LOOP_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// RAII guard marking a `run` call's scope.
pub(crate) struct ScopeGuard {
    _priv: (),
}

impl ScopeGuard {
    /// Enter the loop scope; fails if one is already active on this thread.
    pub(crate) fn enter() -> RuntimeResult<Self> {
        LOOP_ACTIVE.with(|active| {
            if active.get() {
                Err(RuntimeError::NestedRun)
            } else {
                active.set(true);
                Ok(ScopeGuard { _priv: () })
            }
        })
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        LOOP_ACTIVE.with(|active| active.set(false));
    }
}
