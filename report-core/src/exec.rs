//! Execution adapter.
//!
//! Decorated units are either plain closures or futures. Both are run to completion on
//! the calling thread, so callers never need to be async aware:
//!
//! ```text
//! Callable::Sync  ------------------------------------------> f()
//! Callable::Async --> Handle::try_current()
//!                       |- no runtime -----------> new current-thread runtime, block_on
//!                       |- multi-thread runtime --> block_in_place + Handle::block_on
//!                       |- current-thread runtime -> scoped helper thread with its own
//!                       |                            runtime and the caller's context
//!                       '- other failure ----------> Error::Scheduler
//! ```
//!
//! Whatever the unit returns is handed back untouched, and panics keep unwinding with
//! their original payload.
use std::{future::Future, panic};
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tracing::*;

use crate::{session::Context, Error, Result};

/// A unit of work wrapped by a decorator.
pub enum Callable<'a, T> {
    Sync(Box<dyn FnOnce() -> T + 'a>),
    /// A future, already paired with the code that drives it to completion.
    Async(Box<dyn FnOnce() -> Result<T> + 'a>),
}

impl<'a, T> Callable<'a, T> {
    pub fn sync<F>(f: F) -> Callable<'a, T>
    where
        F: FnOnce() -> T + 'a,
    {
        Callable::Sync(Box::new(f))
    }

    pub fn future<F>(future: F) -> Callable<'a, T>
    where
        F: Future<Output = T> + Send + 'a,
        T: Send + 'a,
    {
        Callable::Async(Box::new(move || block_on(future)))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Callable::Async(_))
    }
}

impl<T> std::fmt::Debug for Callable<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Sync(_) => f.write_str("Callable::Sync"),
            Callable::Async(_) => f.write_str("Callable::Async"),
        }
    }
}

/// Run `callable` to completion and return its output.
pub fn run<T>(callable: Callable<'_, T>) -> Result<T> {
    match callable {
        Callable::Sync(f) => Ok(f()),
        Callable::Async(drive) => drive(),
    }
}

/// Drive `future` to completion from synchronous code.
pub fn block_on<F>(future: F) -> Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                trace!("driving future on the running multi-thread runtime");
                Ok(tokio::task::block_in_place(|| handle.block_on(future)))
            }
            flavor => {
                trace!("{flavor:?} runtime is running; driving future on a helper thread");
                on_helper_thread(future)
            }
        },
        Err(e) if e.is_missing_context() => {
            trace!("no runtime is running; creating one");
            Ok(new_runtime()?.block_on(future))
        }
        Err(e) => Err(Error::Scheduler(e.to_string())),
    }
}

fn new_runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Scheduler(format!("failed to build tokio runtime: {e}")))
}

fn on_helper_thread<F>(future: F) -> Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    let context = Context::capture();
    std::thread::scope(|scope| {
        let handle = scope.spawn(move || context.scope(|| Ok(new_runtime()?.block_on(future))));
        match handle.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

/// Extracts the message of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked with unknown message".to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        launch::ItemId,
        session::{activate, caller},
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    async fn add(a: u32, b: u32) -> u32 {
        tokio::time::sleep(Duration::from_millis(1)).await;
        a + b
    }

    #[test]
    fn sync_callable_returns_value() -> eyre::Result<()> {
        let callable = Callable::sync(|| 42);
        assert!(!callable.is_async());
        assert_eq!(run(callable)?, 42);
        Ok(())
    }

    #[test]
    fn sync_callable_returns_err_untouched() -> eyre::Result<()> {
        let result: std::result::Result<(), String> = run(Callable::sync(|| Err("nope".into())))?;
        assert_eq!(result, Err("nope".to_string()));
        Ok(())
    }

    #[test]
    fn future_without_runtime_matches_isolated_runtime() -> eyre::Result<()> {
        let expected = new_runtime()?.block_on(add(1, 2));
        let callable = Callable::future(add(1, 2));
        assert!(callable.is_async());
        assert_eq!(run(callable)?, expected);
        Ok(())
    }

    #[test]
    fn future_borrowing_locals() -> eyre::Result<()> {
        let words = vec!["a".to_string(), "b".to_string()];
        let joined = run(Callable::future(async { words.join(",") }))?;
        assert_eq!(joined, "a,b");
        assert_eq!(words.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn future_inside_current_thread_runtime() -> eyre::Result<()> {
        assert_eq!(run(Callable::future(add(2, 3)))?, 5);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn future_inside_multi_thread_runtime() -> eyre::Result<()> {
        assert_eq!(run(Callable::future(add(3, 4)))?, 7);
        Ok(())
    }

    #[tokio::test]
    async fn helper_thread_sees_active_items() -> eyre::Result<()> {
        let id = ItemId::new("7");
        let _active = activate("outer", id.clone());
        let seen = run(Callable::future(async { caller().map(|item| item.id) }))??;
        assert_eq!(seen, id);
        Ok(())
    }

    #[test]
    fn panic_in_future_propagates_with_payload() {
        let result = panic::catch_unwind(|| {
            run(Callable::future(async {
                panic!("boom");
            }))
        });
        let payload = result.unwrap_err();
        assert_eq!(panic_message(&*payload), "boom");
    }

    #[tokio::test]
    async fn panic_on_helper_thread_propagates_with_payload() {
        let result = panic::catch_unwind(|| {
            run(Callable::future(async {
                panic!("{}", String::from("helper boom"));
            }))
        });
        let payload = result.unwrap_err();
        assert_eq!(panic_message(&*payload), "helper boom");
    }

    #[test]
    fn panic_message_of_unknown_payload() {
        assert_eq!(panic_message(&42u8), "panicked with unknown message");
    }
}
