//! XuanJi Cooperative Task Runtime - CLI

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::rc::Rc;
use std::time::Duration;

use xuanji::runtime::{
    from_resume_fn, ready, sleep, Awaitable, EventLoop, Resume, Step, TaskError, TaskHandle, Value,
};
use xuanji::unit::{import_unit, MemStorage, UnitLoader};
use xuanji::util::logger::{self, LogLevel};
use xuanji::{NAME, VERSION};

/// A deterministic single-threaded task runtime for embedded interpreters
#[derive(Parser, Debug)]
#[command(name = "xuanji")]
#[command(author = "YaoXiang Team")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a built-in demo scenario
    Demo {
        /// Scenario to run
        #[arg(value_enum, value_name = "SCENARIO")]
        scenario: Scenario,
    },

    /// Print version information
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Scenario {
    /// Direct await vs task await of the same coroutine
    SpawnAwait,
    /// Two tasks interleaving through the ready queue
    Interleave,
    /// Cancellation delivered at a suspension point
    Cancel,
    /// Importing compiled units, valid and malformed
    Import,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_with_level(args.log_level);

    match args.command {
        Commands::Demo { scenario } => run_demo(scenario),
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
            Ok(())
        }
    }
}

fn run_demo(scenario: Scenario) -> Result<()> {
    match scenario {
        Scenario::SpawnAwait => demo_spawn_await(),
        Scenario::Interleave => demo_interleave(),
        Scenario::Cancel => demo_cancel(),
        Scenario::Import => demo_import(),
    }
}

/// Call a coroutine directly via an await, then through a task boundary.
fn demo_spawn_await() -> Result<()> {
    let forty_two = || ready(42i64);

    let mut step = 0;
    let root = from_resume_fn("main", move |cx, input| match step {
        0 => {
            step = 1;
            Step::Yield(Awaitable::Frame(forty_two()))
        }
        1 => {
            step = 2;
            if let Resume::Value(value) = input {
                println!("{}", value);
            }
            let task = cx.spawn(forty_two());
            Step::Yield(Awaitable::Task(task))
        }
        _ => match input {
            Resume::Value(value) => {
                println!("{}", value);
                Step::Return(Value::Unit)
            }
            Resume::Error(err) => Step::Raise(err),
            Resume::Start => Step::Raise(TaskError::runtime("unexpected start")),
        },
    });

    xuanji::run(root)?;
    Ok(())
}

/// Two workers yielding back and forth; the trace is deterministic.
fn demo_interleave() -> Result<()> {
    let worker = |tag: &'static str| {
        let mut step = 0;
        from_resume_fn(tag, move |_cx, input| {
            if let Resume::Error(err) = input {
                return Step::Raise(err);
            }
            step += 1;
            if step <= 3 {
                println!("{} tick {}", tag, step);
                return Step::Yield(Awaitable::Yield);
            }
            Step::Return(Value::Unit)
        })
    };

    let mut event_loop = EventLoop::new();
    let odd = event_loop.spawn_named("odd", worker("odd"));
    let even = event_loop.spawn_named("even", worker("even"));

    let mut step = 0;
    let root = from_resume_fn("main", move |_cx, input| {
        if let Resume::Error(err) = input {
            return Step::Raise(err);
        }
        match step {
            0 => {
                step = 1;
                Step::Yield(Awaitable::Task(odd))
            }
            1 => {
                step = 2;
                Step::Yield(Awaitable::Task(even))
            }
            _ => Step::Return(Value::Unit),
        }
    });
    event_loop.run(root)?;
    Ok(())
}

/// Cancel a sleeping task; its waiter observes the cancellation error.
fn demo_cancel() -> Result<()> {
    let mut step = 0;
    let mut handle: Option<TaskHandle> = None;
    let root = from_resume_fn("main", move |cx, input| match step {
        0 => {
            step = 1;
            handle = Some(cx.spawn(sleep(Duration::from_secs(3600))));
            Step::Yield(Awaitable::Yield)
        }
        1 => {
            step = 2;
            let h = handle.expect("spawned above");
            println!("cancelling {}", h);
            cx.cancel(h);
            Step::Yield(Awaitable::Task(h))
        }
        _ => match input {
            Resume::Error(err) if err.is_cancelled() => {
                println!("waiter observed: {}", err);
                Step::Return(Value::Unit)
            }
            Resume::Value(value) => {
                println!("unexpected value: {}", value);
                Step::Return(Value::Unit)
            }
            _ => Step::Raise(TaskError::runtime("unexpected resume")),
        },
    });

    xuanji::run(root)?;
    Ok(())
}

/// Import one valid and three malformed compiled units as tasks.
fn demo_import() -> Result<()> {
    let mut storage = MemStorage::new();
    storage.insert("/mod0.xjc", b"".to_vec());
    storage.insert("/mod1.xjc", b"X".to_vec());
    storage.insert("/mod2.xjc", b"X\x05".to_vec());
    storage.insert("/mod3.xjc", b"X\x06payload".to_vec());
    let loader = Rc::new(UnitLoader::new(storage));

    let mut step = 0;
    let mut imports: Vec<(String, TaskHandle)> = Vec::new();
    let root = from_resume_fn("main", move |cx, input| {
        if step == 0 {
            step = 1;
            for name in ["mod0", "mod1", "mod2", "mod3"] {
                let task = cx.spawn(import_unit(loader.clone(), name));
                imports.push((name.to_string(), task));
            }
            let (_, first) = &imports[0];
            return Step::Yield(Awaitable::Task(*first));
        }

        let (name, _) = &imports[step - 1];
        match input {
            Resume::Value(value) => println!("{} ok: {}", name, value),
            Resume::Error(err) => println!("{} {}", name, err),
            Resume::Start => return Step::Raise(TaskError::runtime("unexpected start")),
        }
        if step < imports.len() {
            let (_, next) = &imports[step];
            let next = *next;
            step += 1;
            return Step::Yield(Awaitable::Task(next));
        }
        Step::Return(Value::Unit)
    });

    xuanji::run(root)?;
    Ok(())
}
