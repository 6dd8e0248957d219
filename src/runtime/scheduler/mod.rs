//! Cooperative event loop
//!
//! This module provides the `EventLoop`, the single-threaded scheduler that
//! owns the set of live tasks and drives their coroutine frames to
//! completion. Concurrency here is interleaving, not parallelism: exactly
//! one task runs at a time, suspension points are explicit awaits, and tasks
//! become ready in FIFO order relative to when their unblocking condition
//! was processed. Interleavings are therefore deterministic for a given
//! program, which is what makes programs against this scheduler testable.

pub mod context;
pub mod queue;
pub mod task;

pub use context::Cx;
pub use queue::{ReadyEntry, ReadyQueue};
pub use task::{Task, TaskHandle, TaskId, TaskIdGenerator, TaskState};

use std::thread;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, error, trace, warn};

use crate::runtime::coroutine::{CoroFrame, FrameResult, Resume, Suspend};
use crate::runtime::errors::{RuntimeError, RuntimeResult, TaskError};
use crate::runtime::value::Value;

/// Event loop configuration.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum number of registered tasks; submissions past the limit fail
    /// at submission time with an ordinary task error.
    pub max_tasks: usize,
    /// Log failed tasks whose error was never retrieved when the loop tears
    /// down.
    pub warn_unobserved: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tasks: 1024,
            warn_unobserved: true,
        }
    }
}

/// A task parked until a deadline passes.
#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    deadline: Instant,
    task: TaskId,
}

/// The single-threaded cooperative scheduler.
///
/// Owns the task registry and the ready queue. Created explicitly and
/// passed around as a handle; there is no implicit global loop. Running
/// bodies reach the scheduler through the [`Cx`] threaded into every resume.
#[derive(Debug, Default)]
pub struct EventLoop {
    /// Configuration.
    config: LoopConfig,
    /// Task registry; insertion-ordered for deterministic iteration.
    tasks: IndexMap<TaskId, Task>,
    /// Tasks eligible to run this tick, with their pending injections.
    ready: ReadyQueue,
    /// Tasks parked on a deadline.
    timers: Vec<TimerEntry>,
    /// Task ID generator.
    ids: TaskIdGenerator,
}

impl EventLoop {
    /// Create a new event loop with default config.
    #[inline]
    pub fn new() -> Self {
        Self::with_config(LoopConfig::default())
    }

    /// Create an event loop with custom configuration.
    pub fn with_config(config: LoopConfig) -> Self {
        Self {
            config,
            tasks: IndexMap::new(),
            ready: ReadyQueue::new(),
            timers: Vec::new(),
            ids: TaskIdGenerator::new(),
        }
    }

    /// Submit a frame as a task before (or between) `run` calls.
    ///
    /// The task is enqueued in state `Pending`; none of its body runs until
    /// the loop ticks. Submission order is execution order for the first
    /// resume of each task.
    pub fn spawn(
        &mut self,
        frame: CoroFrame,
    ) -> TaskHandle {
        context::enroll(
            &mut self.ids,
            &mut self.tasks,
            &mut self.ready,
            self.config.max_tasks,
            None,
            frame,
        )
    }

    /// Submit a frame as a task with an explicit debug name.
    pub fn spawn_named(
        &mut self,
        name: impl Into<String>,
        frame: CoroFrame,
    ) -> TaskHandle {
        context::enroll(
            &mut self.ids,
            &mut self.tasks,
            &mut self.ready,
            self.config.max_tasks,
            Some(name.into()),
            frame,
        )
    }

    /// Request cancellation of a task.
    ///
    /// Returns `Ok(true)` if the request took effect, `Ok(false)` if the
    /// task was already terminal.
    pub fn cancel(
        &mut self,
        handle: TaskHandle,
    ) -> RuntimeResult<bool> {
        self.cancel_task(handle.id())
    }

    /// Look up the state of a task.
    pub fn task_state(
        &self,
        handle: TaskHandle,
    ) -> Option<TaskState> {
        self.tasks.get(&handle.id()).map(|t| t.state())
    }

    /// Retrieve a terminal task's stored outcome.
    ///
    /// `None` while the task is live. Idempotent: the stored result is
    /// cloned out, so repeated retrieval observes the identical outcome.
    pub fn task_result(
        &mut self,
        handle: TaskHandle,
    ) -> Option<Result<Value, TaskError>> {
        let task = self.tasks.get_mut(&handle.id())?;
        if !task.is_terminal() {
            return None;
        }
        Some(task.observe_outcome())
    }

    /// Total number of registered tasks (live and terminal).
    #[inline]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of non-terminal tasks.
    pub fn live_tasks(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_terminal()).count()
    }

    /// Run the loop to completion with `frame` as the root task.
    ///
    /// Drives all ready tasks until the root reaches a terminal state; the
    /// root's value is the loop's result, its error is re-raised to the
    /// caller. Tasks spawned before `run` are driven ahead of the root in
    /// submission order. Remaining live tasks are cancelled on the way out.
    pub fn run(
        &mut self,
        frame: CoroFrame,
    ) -> RuntimeResult<Value> {
        let _scope = context::ScopeGuard::enter()?;
        let root = self.spawn_named("main", frame);
        let root_id = root.id();
        debug!("event loop started, root {}", root_id);

        loop {
            self.expire_timers();

            let Some(entry) = self.ready.pop() else {
                if let Some(deadline) = self.next_deadline() {
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                    continue;
                }
                let live = self.live_tasks();
                error!("deadlock: {} live task(s) but none runnable", live);
                return Err(RuntimeError::Deadlock { live });
            };

            self.drive(entry.task, entry.inject)?;

            if self.tasks.get(&root_id).is_some_and(Task::is_terminal) {
                break;
            }
        }

        let outcome = self
            .tasks
            .get_mut(&root_id)
            .ok_or(RuntimeError::UnknownTask(root_id))?
            .observe_outcome();
        self.teardown();
        debug!("event loop finished, root {}", root_id);

        outcome.map_err(RuntimeError::Task)
    }

    /// Resume one task with its pending injection and resolve the result.
    fn drive(
        &mut self,
        id: TaskId,
        mut inject: Resume,
    ) -> RuntimeResult<()> {
        let Some(mut task) = self.tasks.shift_remove(&id) else {
            return Ok(());
        };
        if task.is_terminal() {
            self.tasks.insert(id, task);
            return Ok(());
        }

        // A pending cancellation replaces whatever was about to be injected.
        if task.take_cancel_request() {
            inject = Resume::Error(TaskError::cancelled());
        }

        task.set_state(TaskState::Running);
        task.mark_started();
        trace!("resuming {}", task.name());

        let mut cancels: Vec<TaskId> = Vec::new();
        let outcome = loop {
            let result = {
                let mut cx = Cx::new(
                    &mut self.ids,
                    &mut self.tasks,
                    &mut self.ready,
                    &mut cancels,
                    self.config.max_tasks,
                );
                task.frame_mut().resume(&mut cx, inject)?
            };
            match result {
                FrameResult::Suspended(Suspend::Task(target)) => {
                    if target == id {
                        inject = Resume::Error(TaskError::runtime("task cannot await itself"));
                        continue;
                    }
                    match self.tasks.get_mut(&target) {
                        // Already terminal: inject the stored outcome and
                        // keep going, no suspension (idempotent retrieval).
                        Some(t) if t.is_terminal() => {
                            inject = outcome_to_resume(t.observe_outcome());
                            continue;
                        }
                        Some(t) => {
                            t.push_waiter(id);
                            task.set_state(TaskState::Pending);
                            break None;
                        }
                        None => {
                            inject = Resume::Error(TaskError::runtime(format!(
                                "unknown task: {}",
                                target
                            )));
                            continue;
                        }
                    }
                }
                FrameResult::Suspended(Suspend::Yield) => {
                    task.set_state(TaskState::Pending);
                    self.ready.push(id, Resume::Value(Value::Unit));
                    break None;
                }
                FrameResult::Suspended(Suspend::Timer(dur)) => {
                    task.set_state(TaskState::Pending);
                    self.timers.push(TimerEntry {
                        deadline: Instant::now() + dur,
                        task: id,
                    });
                    break None;
                }
                FrameResult::Done(value) => break Some(Ok(value)),
                FrameResult::Failed(err) => break Some(Err(err)),
            }
        };

        self.tasks.insert(id, task);
        if let Some(outcome) = outcome {
            self.finish(id, outcome);
        }

        for target in cancels {
            if let Err(err) = self.cancel_task(target) {
                warn!("cancel request ignored: {}", err);
            }
        }
        Ok(())
    }

    /// Mark a task terminal and notify its waiters in registration order.
    fn finish(
        &mut self,
        id: TaskId,
        outcome: Result<Value, TaskError>,
    ) {
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        let state = match &outcome {
            Ok(_) => TaskState::Done,
            Err(err) if err.is_cancelled() => TaskState::Cancelled,
            Err(_) => TaskState::Failed,
        };
        task.finish(state, outcome);
        debug!("{} -> {:?}", task.name(), state);

        let waiters = task.take_waiters();
        for waiter in waiters {
            let inject = outcome_to_resume(task.observe_outcome());
            self.ready.push(waiter, inject);
        }
    }

    /// Apply a cancellation request to one task.
    fn cancel_task(
        &mut self,
        id: TaskId,
    ) -> RuntimeResult<bool> {
        let (terminal, started) = match self.tasks.get(&id) {
            Some(task) => (task.is_terminal(), task.started()),
            None => return Err(RuntimeError::UnknownTask(id)),
        };
        if terminal {
            return Ok(false);
        }

        // Never resumed: straight to Cancelled, the frame never runs.
        if !started {
            self.ready.remove(id);
            self.finish(id, Err(TaskError::cancelled()));
            return Ok(true);
        }

        if let Some(task) = self.tasks.get_mut(&id) {
            task.request_cancel();
        }

        // Wake the task from wherever it is parked so the signal lands at
        // its next resume point.
        if self
            .ready
            .replace_inject(id, Resume::Error(TaskError::cancelled()))
        {
            return Ok(true);
        }
        if let Some(pos) = self.timers.iter().position(|t| t.task == id) {
            self.timers.remove(pos);
            self.ready.push(id, Resume::Error(TaskError::cancelled()));
            return Ok(true);
        }
        let mut parked_on_task = false;
        for task in self.tasks.values_mut() {
            if task.remove_waiter(id) {
                parked_on_task = true;
                break;
            }
        }
        if parked_on_task {
            self.ready.push(id, Resume::Error(TaskError::cancelled()));
        }
        // Otherwise the task is mid-resume (it cancelled itself); the
        // request flag is consumed at its next resume.
        Ok(true)
    }

    /// Move due timers onto the ready queue, FIFO by deadline.
    fn expire_timers(&mut self) {
        if self.timers.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut due: Vec<TimerEntry> = Vec::new();
        self.timers.retain(|entry| {
            if entry.deadline <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|entry| entry.deadline);
        for entry in due {
            self.ready.push(entry.task, Resume::Value(Value::Unit));
        }
    }

    /// Nearest pending timer deadline.
    fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Cancel and drain whatever is still live after the root completed.
    fn teardown(&mut self) {
        let live: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| !t.is_terminal())
            .map(Task::id)
            .collect();
        for id in live {
            if let Err(err) = self.cancel_task(id) {
                warn!("teardown cancel failed: {}", err);
            }
        }

        // One bounded delivery round so cancelled bodies get to run their
        // cleanup arms; anything that keeps re-suspending is cut off.
        let drain_limit = self.tasks.len().saturating_mul(4).max(16);
        let mut driven = 0usize;
        while let Some(entry) = self.ready.pop() {
            if driven >= drain_limit {
                warn!(
                    "teardown drain limit hit, {} entries dropped",
                    self.ready.len() + 1
                );
                break;
            }
            driven += 1;
            if let Err(err) = self.drive(entry.task, entry.inject) {
                warn!("teardown drive failed: {}", err);
            }
            // Nothing may re-park on a deadline while draining.
            self.timers.clear();
        }
        self.timers.clear();

        for task in self.tasks.values_mut() {
            if !task.is_terminal() {
                task.finish(TaskState::Cancelled, Err(TaskError::cancelled()));
            }
        }

        if self.config.warn_unobserved {
            for task in self.tasks.values() {
                if task.state() == TaskState::Failed && !task.outcome_observed() {
                    warn!("{} failed but its error was never retrieved", task.name());
                }
            }
        }
    }
}

/// Convert a stored task outcome into the resume input for a waiter.
fn outcome_to_resume(outcome: Result<Value, TaskError>) -> Resume {
    match outcome {
        Ok(value) => Resume::Value(value),
        Err(err) => Resume::Error(err),
    }
}
