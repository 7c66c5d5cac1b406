//! Reporting session.
//!
//! A [`Session`] ties a [`Launch`] to the item registry and the configuration. It has an
//! explicit lifecycle: [`Session::start`] announces the launch, [`Session::finish`]
//! closes it. Decorated code finds the session implicitly, either through the
//! process-wide slot ([`Session::install`]) or through a thread-scoped override
//! ([`Session::enter`]), which takes precedence.
//!
//! ```text
//! +------------------+     +------------------+     +------------------+
//! | Session::start   | --> | install / enter  | --> | Session::current |
//! | launch + config  |     | global | thread  |     | used by items    |
//! +------------------+     +------------------+     +------------------+
//!                                                            |
//!                                                            v
//! +------------------+     +------------------+     +------------------+
//! | Session::finish  | <-- | uninstall        | <-- | active item      |
//! | finish_launch    |     |                  |     | stack per thread |
//! +------------------+     +------------------+     +------------------+
//! ```
//!
//! Every thread keeps a stack of the test and step items executing on it. The top of
//! the stack is "the caller" that new steps and logs attach to.
use once_cell::sync::Lazy;
use std::{
    cell::RefCell,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::*;

use crate::{
    config::Config,
    hierarchy::{self, ClassInfo},
    launch::{Attachment, ItemId, ItemType, Launch, Level, NewItem},
    registry::Registry,
    Error, ItemKey, Result,
};

static SESSION: Lazy<Mutex<Option<Arc<Session>>>> = Lazy::new(|| Mutex::new(None));

thread_local! {
    static SCOPED: RefCell<Option<Arc<Session>>> = const { RefCell::new(None) };
    static STACK: RefCell<Vec<ActiveItem>> = const { RefCell::new(Vec::new()) };
}

/// A test or step currently executing on this thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveItem {
    pub key: ItemKey,
    pub id: ItemId,
}

/// Returns the innermost executing item of the current thread.
pub fn caller() -> Result<ActiveItem> {
    STACK.with(|stack| stack.borrow().last().cloned().ok_or(Error::NoActiveItem))
}

/// Pushes an item on the current thread's stack. The item stays active until the
/// returned guard is dropped.
pub(crate) fn activate(key: &str, id: ItemId) -> Activation {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(ActiveItem {
            key: key.to_string(),
            id,
        });
        Activation { depth }
    })
}

#[must_use]
pub(crate) struct Activation {
    depth: usize,
}

impl Drop for Activation {
    fn drop(&mut self) {
        STACK.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

/// Reporting state of one thread, captured to continue on another thread.
#[derive(Clone, Default)]
pub struct Context {
    session: Option<Arc<Session>>,
    stack: Vec<ActiveItem>,
}

impl Context {
    pub fn capture() -> Context {
        Context {
            session: SCOPED.with(|scoped| scoped.borrow().clone()),
            stack: STACK.with(|stack| stack.borrow().clone()),
        }
    }

    /// Run `f` with this context installed on the current thread.
    pub fn scope<R>(self, f: impl FnOnce() -> R) -> R {
        let session = SCOPED.with(|scoped| scoped.replace(self.session));
        let stack = STACK.with(|stack| stack.replace(self.stack));
        let _restore = Restore { session, stack };
        f()
    }
}

struct Restore {
    session: Option<Arc<Session>>,
    stack: Vec<ActiveItem>,
}

impl Drop for Restore {
    fn drop(&mut self) {
        SCOPED.with(|scoped| scoped.replace(self.session.take()));
        STACK.with(|stack| stack.replace(std::mem::take(&mut self.stack)));
    }
}

/// Wrap `f` so that it runs with the caller's session and active items, wherever it
/// ends up running.
///
/// ```rust,ignore
/// std::thread::spawn(report::scope_current(|| {
///     report::log("from a worker thread")
/// }));
/// ```
pub fn scope_current<F, R>(f: F) -> impl FnOnce() -> R + Send
where
    F: FnOnce() -> R + Send,
{
    let context = Context::capture();
    move || context.scope(f)
}

/// Guard returned by [`Session::enter`].
#[must_use]
pub struct Entered {
    previous: Option<Arc<Session>>,
}

impl Drop for Entered {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SCOPED.with(|scoped| scoped.replace(previous));
    }
}

pub struct Session {
    config: Config,
    launch: Arc<dyn Launch>,
    registry: Registry,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start a reporting session on `launch`.
    pub fn start(config: Config, launch: Arc<dyn Launch>) -> Result<Arc<Session>> {
        let info = config.launch_info();
        launch.start_launch(&info)?;
        debug!("launch \"{}\" started for project \"{}\"", info.name, info.project);

        Ok(Arc::new(Session {
            config,
            launch,
            registry: Registry::new(),
        }))
    }

    /// Finish the launch. Items still open stay unfinished.
    pub fn finish(&self) -> Result<()> {
        debug!("finishing launch \"{}\"", self.config.launch.name);
        self.launch.finish_launch()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn launch(&self) -> &dyn Launch {
        self.launch.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Make this session visible to every thread.
    pub fn install(self: &Arc<Self>) -> Result<()> {
        let mut slot = SESSION.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(Error::SessionActive);
        }
        *slot = Some(Arc::clone(self));
        Ok(())
    }

    /// Remove the process-wide session, if any.
    pub fn uninstall() -> Option<Arc<Session>> {
        SESSION
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Make this session current for the calling thread until the guard is dropped.
    pub fn enter(self: &Arc<Self>) -> Entered {
        let previous = SCOPED.with(|scoped| scoped.replace(Some(Arc::clone(self))));
        Entered { previous }
    }

    /// The thread-scoped session if one was entered, the installed one otherwise.
    pub fn current() -> Result<Arc<Session>> {
        if let Some(session) = SCOPED.with(|scoped| scoped.borrow().clone()) {
            return Ok(session);
        }
        SESSION
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NoSession)
    }

    /// Create the root suite item of a feature and register it under both the type
    /// name and the feature name.
    pub fn feature(&self, name: &str, class: &ClassInfo) -> Result<ItemId> {
        let item = NewItem::new(name, ItemType::Suite).description(class.doc.as_deref());
        let id = self.launch.create_report_item(&item)?;
        self.registry.register(class.name.as_str(), id.clone());
        self.registry.register(name, id.clone());
        debug!("feature \"{name}\" ({}) registered as {id}", class.name);
        Ok(id)
    }

    /// Create a story item under the nearest registered ancestor of `class`.
    pub fn story(&self, name: &str, class: &ClassInfo) -> Result<ItemId> {
        let parent = hierarchy::nearest_registered(
            class,
            &self.registry,
            self.config.hierarchy.ancestor_search,
        )
        .map(|key| self.registry.lookup(&key))
        .transpose()?;

        let item = NewItem::new(name, ItemType::Story)
            .parent(parent)
            .description(class.doc.as_deref());
        let id = self.launch.create_report_item(&item)?;
        self.registry.register(class.name.as_str(), id.clone());
        debug!("story \"{name}\" ({}) registered as {id}", class.name);
        Ok(id)
    }

    /// Log `message` on the innermost executing item of the calling thread.
    pub fn log(&self, message: &str, level: Level) -> Result<()> {
        let caller = caller()?;
        if level < self.config.log.level {
            trace!("dropping {level} log on \"{}\"", caller.key);
            return Ok(());
        }

        match level {
            Level::Trace => trace!(item = %caller.key, "{message}"),
            Level::Debug => debug!(item = %caller.key, "{message}"),
            Level::Info => info!(item = %caller.key, "{message}"),
            Level::Warn => warn!(item = %caller.key, "{message}"),
            Level::Error | Level::Fatal => error!(item = %caller.key, "{message}"),
        }

        self.launch.create_log(&caller.id, message, level)
    }

    /// Attach evidence to the item registered under `attachment.item`.
    pub fn attachment(&self, attachment: &Attachment) -> Result<()> {
        let id = self.registry.lookup(&attachment.item)?;
        debug!(
            "attaching \"{}\" ({}) to \"{}\"",
            attachment.name, attachment.attachment_type, attachment.item
        );
        self.launch.add_attachment(&id, attachment)
    }
}
