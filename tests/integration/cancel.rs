//! Cancellation delivery
//!
//! Cancelling a task that never started moves it straight to Cancelled
//! without resuming its frame; cancelling a suspended task delivers the
//! signal at its next resume point so cleanup code still runs, and waiters
//! observe a cancellation error rather than a value.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use xuanji::runtime::{
    from_fn, from_resume_fn, sleep, Awaitable, EventLoop, Resume, Step, TaskError, TaskHandle,
    TaskState, Value,
};

#[test]
fn cancel_before_start_skips_the_body() {
    let ran = Rc::new(Cell::new(false));
    let cancelled_task = Rc::new(Cell::new(None::<TaskHandle>));

    let flag = ran.clone();
    let cell = cancelled_task.clone();
    let mut step = 0;
    let main = from_resume_fn("main", move |cx, input| match step {
        0 => {
            step = 1;
            let flag = flag.clone();
            let handle = cx.spawn(from_fn(move || {
                flag.set(true);
                Ok(Value::Unit)
            }));
            cell.set(Some(handle));
            cx.cancel(handle);
            Step::Yield(Awaitable::Task(handle))
        }
        _ => match input {
            Resume::Error(err) if err.is_cancelled() => Step::Return(Value::Unit),
            other => Step::Raise(TaskError::runtime(format!("expected cancel, got {:?}", other))),
        },
    });

    let mut event_loop = EventLoop::new();
    event_loop.run(main).unwrap();

    assert!(!ran.get(), "cancelled-before-start frame must never be resumed");
    let handle = cancelled_task.get().unwrap();
    assert_eq!(event_loop.task_state(handle), Some(TaskState::Cancelled));
}

#[test]
fn cancel_suspended_task_runs_cleanup_then_propagates() {
    let cleanup_ran = Rc::new(Cell::new(false));

    let victim = {
        let cleanup = cleanup_ran.clone();
        let mut step = 0;
        from_resume_fn("victim", move |_cx, input| {
            if step == 0 {
                step = 1;
                return Step::Yield(Awaitable::Timer(Duration::from_secs(3600)));
            }
            match input {
                Resume::Error(err) if err.is_cancelled() => {
                    // Cleanup arm: record, then let the cancellation keep
                    // propagating.
                    cleanup.set(true);
                    Step::Raise(err)
                }
                other => Step::Raise(TaskError::runtime(format!("{:?}", other))),
            }
        })
    };

    let waiter_saw = Rc::new(Cell::new(false));
    let saw = waiter_saw.clone();
    let mut victim = Some(victim);
    let mut handle: Option<TaskHandle> = None;
    let mut step = 0;
    let main = from_resume_fn("main", move |cx, input| match step {
        0 => {
            step = 1;
            handle = Some(cx.spawn(victim.take().expect("first resume")));
            // Let the victim start and park before cancelling it.
            Step::Yield(Awaitable::Yield)
        }
        1 => {
            step = 2;
            cx.cancel(handle.expect("spawned"));
            Step::Yield(Awaitable::Task(handle.expect("spawned")))
        }
        _ => match input {
            Resume::Error(err) if err.is_cancelled() => {
                saw.set(true);
                Step::Return(Value::Unit)
            }
            other => Step::Raise(TaskError::runtime(format!("expected cancel, got {:?}", other))),
        },
    });

    xuanji::run(main).unwrap();
    assert!(cleanup_ran.get(), "cleanup must run at the next resume point");
    assert!(waiter_saw.get(), "waiter must observe the cancellation error");
}

#[test]
fn cancellation_is_not_delivered_between_suspension_points() {
    // A task that never suspends after being scheduled cannot observe a
    // cancellation issued while it is mid-run: it completes normally.
    let mut handle: Option<TaskHandle> = None;
    let mut step = 0;
    let main = from_resume_fn("main", move |cx, input| match step {
        0 => {
            step = 1;
            let h = cx.spawn(from_fn(|| Ok(Value::Int(7))));
            handle = Some(h);
            Step::Yield(Awaitable::Task(h))
        }
        1 => {
            step = 2;
            // The task already finished; cancelling now is a no-op.
            cx.cancel(handle.expect("spawned"));
            Step::Yield(Awaitable::Task(handle.expect("spawned")))
        }
        _ => match input {
            Resume::Value(value) => Step::Return(value),
            other => Step::Raise(TaskError::runtime(format!("{:?}", other))),
        },
    });

    assert_eq!(xuanji::run(main).unwrap(), Value::Int(7));
}

#[test]
fn cancelling_twice_is_harmless() {
    let mut handle: Option<TaskHandle> = None;
    let mut step = 0;
    let main = from_resume_fn("main", move |cx, input| match step {
        0 => {
            step = 1;
            let h = cx.spawn(sleep(Duration::from_secs(3600)));
            handle = Some(h);
            Step::Yield(Awaitable::Yield)
        }
        1 => {
            step = 2;
            cx.cancel(handle.expect("spawned"));
            cx.cancel(handle.expect("spawned"));
            Step::Yield(Awaitable::Task(handle.expect("spawned")))
        }
        _ => match input {
            Resume::Error(err) if err.is_cancelled() => Step::Return(Value::Unit),
            other => Step::Raise(TaskError::runtime(format!("{:?}", other))),
        },
    });

    xuanji::run(main).unwrap();
}
