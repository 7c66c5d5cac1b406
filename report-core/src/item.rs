//! Runtime behind the `step`, `title`, `feature` and `story` attributes, plus the
//! side-channel reporters `log` and `attachment`.
//!
//! The attribute macros expand to calls into this module, and everything here is
//! usable without the macros as well:
//!
//! ```rust,ignore
//! fn login(user: &str) -> eyre::Result<()> {
//!     let call = Call::new("login", "Login as {user}").arg(0, "user", &user);
//!     step(call, Callable::sync(|| {
//!         report::log("typing credentials")?;
//!         Ok(())
//!     }))
//! }
//! ```
use std::{
    fmt::Display,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use tracing::*;

use crate::{
    exec::{self, panic_message, Callable},
    hierarchy::Class,
    launch::{Attachment, ItemId, ItemType, Level, NewItem},
    session::{self, activate, Session},
    title::{self, Args},
    Error, Result,
};

/// What a wrapped unit returns, and how a failure is recognised in it.
pub trait Outcome: Sized {
    /// Message of the failure carried by this value, if any.
    fn failure(&self) -> Option<String>;

    /// Surface an instrumentation error through the unit's own return type.
    fn from_error(error: Error) -> Self;
}

impl<T, E> Outcome for std::result::Result<T, E>
where
    E: Display + From<Error>,
{
    fn failure(&self) -> Option<String> {
        self.as_ref().err().map(ToString::to_string)
    }

    fn from_error(error: Error) -> Self {
        Err(E::from(error))
    }
}

/// Return value of a unit that can only fail by panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plain<T>(pub T);

impl<T> Plain<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Outcome for Plain<T> {
    fn failure(&self) -> Option<String> {
        None
    }

    fn from_error(error: Error) -> Self {
        panic!("{error}")
    }
}

/// One invocation of a decorated function.
#[derive(Debug, Clone)]
pub struct Call<'a> {
    key: &'a str,
    template: &'a str,
    args: Args,
    description: Option<&'a str>,
}

impl<'a> Call<'a> {
    /// `key` is the function name the item is registered under.
    pub fn new(key: &'a str, template: &'a str) -> Call<'a> {
        Call {
            key,
            template,
            args: Args::new(),
            description: None,
        }
    }

    /// Add the parameter at `index` (not counting `self`) named `name`.
    pub fn arg(mut self, index: usize, name: &str, value: &dyn Display) -> Call<'a> {
        self.args = self.args.arg(index, name, value);
        self
    }

    pub fn args(mut self, args: Args) -> Call<'a> {
        self.args = args;
        self
    }

    pub fn description(mut self, description: Option<&'a str>) -> Call<'a> {
        self.description = description;
        self
    }

    pub fn key(&self) -> &str {
        self.key
    }

    pub fn display_name(&self) -> Result<String> {
        title::render(self.template, &self.args)
    }

    fn open(
        &self,
        session: &Session,
        item_type: ItemType,
        parent: ItemId,
    ) -> Result<ItemId> {
        let item = NewItem::new(self.display_name()?, item_type)
            .parent(Some(parent))
            .has_stats(item_type != ItemType::Step)
            .description(self.description);
        let id = session.launch().create_report_item(&item)?;
        session.registry().register(self.key, id.clone());
        Ok(id)
    }
}

/// Run `unit` as a step of the innermost executing item.
///
/// The step is finished as passed when `unit` succeeds and as failed when it returns a
/// failure or panics. The unit's result, or its panic, reaches the caller unchanged.
pub fn step<O: Outcome>(call: Call<'_>, unit: Callable<'_, O>) -> O {
    let opened = Session::current().and_then(|session| {
        let parent = session::caller()?;
        let id = call.open(&session, ItemType::Step, parent.id)?;
        Ok((session, id))
    });
    let (session, id) = match opened {
        Ok(opened) => opened,
        Err(e) => return O::from_error(e),
    };

    let _active = activate(call.key, id.clone());
    match panic::catch_unwind(AssertUnwindSafe(|| exec::run(unit))) {
        Ok(Ok(outcome)) => match outcome.failure() {
            Some(message) => {
                finish_failed(&session, &id, &message);
                outcome
            }
            None => match session.launch().finish_passed_item(&id) {
                Ok(()) => outcome,
                Err(e) => O::from_error(e),
            },
        },
        Ok(Err(e)) => {
            finish_failed(&session, &id, &e.to_string());
            O::from_error(e)
        }
        Err(payload) => {
            finish_failed(&session, &id, &panic_message(&*payload));
            panic::resume_unwind(payload)
        }
    }
}

fn finish_failed(session: &Arc<Session>, id: &ItemId, message: &str) {
    if let Err(e) = session.launch().finish_failed_item(id, message) {
        error!("failed to finish step {id} after failure \"{message}\": {e}");
    }
}

/// Run `unit` as a test case of the type registered under `suite`.
///
/// The test is finished only when `unit` succeeds. A failure is returned, or a panic
/// unwinds, without finishing the item.
pub fn title<O: Outcome>(suite: &str, call: Call<'_>, unit: Callable<'_, O>) -> O {
    let opened = Session::current().and_then(|session| {
        let parent = session.registry().lookup(suite)?;
        let id = call.open(&session, ItemType::Test, parent)?;
        Ok((session, id))
    });
    let (session, id) = match opened {
        Ok(opened) => opened,
        Err(e) => return O::from_error(e),
    };

    let _active = activate(call.key, id.clone());
    let outcome = match exec::run(unit) {
        Ok(outcome) => outcome,
        Err(e) => return O::from_error(e),
    };
    if let Some(message) = outcome.failure() {
        debug!("test {id} failed: {message}");
        return outcome;
    }
    match session.launch().finish_item(&id) {
        Ok(()) => outcome,
        Err(e) => O::from_error(e),
    }
}

/// Register the feature declared by `C` with the current session.
pub fn feature<C: Class>(name: &str) -> Result<ItemId> {
    Session::current()?.feature(name, &C::class_info())
}

/// Register the story declared by `C` with the current session.
pub fn story<C: Class>(name: &str) -> Result<ItemId> {
    Session::current()?.story(name, &C::class_info())
}

/// Log `message` at [`Level::Info`] on the innermost executing test or step.
pub fn log(message: impl AsRef<str>) -> Result<()> {
    log_at(Level::Info, message)
}

pub fn log_at(level: Level, message: impl AsRef<str>) -> Result<()> {
    Session::current()?.log(message.as_ref(), level)
}

/// Attach evidence to the item registered under `attachment.item`.
pub fn attachment(attachment: Attachment) -> Result<()> {
    Session::current()?.attachment(&attachment)
}
