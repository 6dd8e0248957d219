//! Deadlock detection
//!
//! When every live task is waiting on another task and nothing can ever
//! become ready, `run` must report the condition rather than hang.

use std::cell::Cell;
use std::rc::Rc;

use xuanji::runtime::{
    from_resume_fn, Awaitable, Resume, RuntimeError, Step, TaskError, TaskHandle,
};

/// A body that awaits whatever handle is in the cell.
fn await_cell(
    name: &'static str,
    cell: Rc<Cell<Option<TaskHandle>>>,
) -> xuanji::runtime::CoroFrame {
    let mut step = 0;
    from_resume_fn(name, move |_cx, input| {
        if step == 0 {
            step = 1;
            return Step::Yield(Awaitable::Task(cell.get().expect("handle set")));
        }
        match input {
            Resume::Value(value) => Step::Return(value),
            Resume::Error(err) => Step::Raise(err),
            Resume::Start => Step::Raise(TaskError::runtime("unexpected start")),
        }
    })
}

#[test]
fn mutual_wait_is_reported_not_hung() {
    let a_cell = Rc::new(Cell::new(None::<TaskHandle>));
    let b_cell = Rc::new(Cell::new(None::<TaskHandle>));

    let (a_set, b_set) = (a_cell.clone(), b_cell.clone());
    let mut step = 0;
    let main = from_resume_fn("main", move |cx, input| {
        if step == 0 {
            step = 1;
            let a = cx.spawn(await_cell("a", b_cell.clone()));
            let b = cx.spawn(await_cell("b", a_cell.clone()));
            a_set.set(Some(a));
            b_set.set(Some(b));
            return Step::Yield(Awaitable::Task(a));
        }
        match input {
            Resume::Value(value) => Step::Return(value),
            Resume::Error(err) => Step::Raise(err),
            Resume::Start => Step::Raise(TaskError::runtime("unexpected start")),
        }
    });

    let err = xuanji::run(main).unwrap_err();
    match err {
        RuntimeError::Deadlock { live } => assert_eq!(live, 3),
        other => panic!("expected deadlock report, got {:?}", other),
    }
}

#[test]
fn self_await_errors_instead_of_deadlocking() {
    let self_cell = Rc::new(Cell::new(None::<TaskHandle>));

    let cell = self_cell.clone();
    let mut step = 0;
    let main = from_resume_fn("main", move |cx, input| {
        if step == 0 {
            step = 1;
            // The worker awaits its own handle.
            let worker_cell = cell.clone();
            let handle = cx.spawn({
                let mut inner_step = 0;
                from_resume_fn("selfish", move |_cx, input| {
                    if inner_step == 0 {
                        inner_step = 1;
                        // Yield once so the handle is published first.
                        return Step::Yield(Awaitable::Yield);
                    }
                    if inner_step == 1 {
                        inner_step = 2;
                        return Step::Yield(Awaitable::Task(
                            worker_cell.get().expect("own handle"),
                        ));
                    }
                    match input {
                        Resume::Error(err) => Step::Raise(err),
                        _ => Step::Raise(TaskError::runtime("self-await returned a value")),
                    }
                })
            });
            cell.set(Some(handle));
            return Step::Yield(Awaitable::Task(handle));
        }
        match input {
            Resume::Error(err) => {
                assert!(err.message.contains("cannot await itself"));
                Step::Return(xuanji::runtime::Value::Unit)
            }
            other => Step::Raise(TaskError::runtime(format!("{:?}", other))),
        }
    });

    xuanji::run(main).unwrap();
}
