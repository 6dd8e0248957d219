//! Tasks return their value correctly to the caller
//!
//! A coroutine called directly via an await and the same coroutine run
//! through a task boundary must produce the identical value, and neither
//! path may run any body code before the loop drives it.

use std::cell::RefCell;
use std::rc::Rc;

use xuanji::runtime::{
    from_resume_fn, ready, Awaitable, EventLoop, Resume, Step, TaskError, TaskHandle, Value,
};

/// The coroutine under test: returns 42 with no awaits inside.
fn forty_two() -> xuanji::runtime::CoroFrame {
    ready(42i64)
}

#[test]
fn direct_await_and_task_await_agree() {
    let observed = Rc::new(RefCell::new(Vec::new()));

    let log = observed.clone();
    let mut step = 0;
    let main = from_resume_fn("main", move |cx, input| match step {
        0 => {
            step = 1;
            // Call the function directly via an await.
            Step::Yield(Awaitable::Frame(forty_two()))
        }
        1 => {
            step = 2;
            match input {
                Resume::Value(value) => log.borrow_mut().push(value),
                other => return Step::Raise(TaskError::runtime(format!("{:?}", other))),
            }
            // Create a task and await it.
            let handle = cx.spawn(forty_two());
            Step::Yield(Awaitable::Task(handle))
        }
        _ => match input {
            Resume::Value(value) => {
                log.borrow_mut().push(value);
                Step::Return(Value::Unit)
            }
            other => Step::Raise(TaskError::runtime(format!("{:?}", other))),
        },
    });

    let mut event_loop = EventLoop::new();
    event_loop.run(main).unwrap();

    assert_eq!(*observed.borrow(), vec![Value::Int(42), Value::Int(42)]);
    // The direct call created no task: only main and the explicit one.
    assert_eq!(event_loop.task_count(), 2);
}

#[test]
fn direct_await_of_leaf_is_synchronous() {
    // A body with no awaits inside completes within a single loop tick.
    let result = xuanji::run(forty_two()).unwrap();
    assert_eq!(result, Value::Int(42));
}

#[test]
fn awaiting_finished_task_again_returns_same_value() {
    let mut step = 0;
    let mut task: Option<TaskHandle> = None;
    let main = from_resume_fn("main", move |cx, input| match step {
        0 => {
            step = 1;
            let handle = cx.spawn(forty_two());
            task = Some(handle);
            Step::Yield(Awaitable::Task(handle))
        }
        1 => {
            step = 2;
            assert!(matches!(input, Resume::Value(Value::Int(42))));
            Step::Yield(Awaitable::Task(task.expect("spawned")))
        }
        _ => match input {
            Resume::Value(value) => Step::Return(value),
            other => Step::Raise(TaskError::runtime(format!("{:?}", other))),
        },
    });

    assert_eq!(xuanji::run(main).unwrap(), Value::Int(42));
}
