//! # Report - hierarchical test-report instrumentation
//!
//! Report turns plain Rust types and functions into a report tree of
//! suites, stories, tests and steps, with logs and attachments correlated to the item that
//! is executing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! /// Everything about paying.
//! #[report::feature("Checkout")]
//! struct Checkout;
//!
//! #[report::story("Pay by card", extends(Checkout))]
//! struct CardPayment;
//!
//! impl CardPayment {
//!     #[report::title("Pay {amount} with {card}")]
//!     fn pay(&self, amount: u32, card: &str) -> eyre::Result<()> {
//!         self.enter_card(card)?;
//!         report::log(format!("charged {amount}"))?;
//!         Ok(())
//!     }
//!
//!     #[report::step("Enter card {0}")]
//!     async fn enter_card(&self, card: &str) -> eyre::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> eyre::Result<()> {
//!     let launch = Arc::new(report::LocalLaunch::new());
//!     report::start(launch.clone())?;
//!     CardPayment.pay(42, "visa")?;
//!     report::finish()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Report Tree
//!
//! - `feature` types are root suites.
//! - `story` types hang under their nearest reported ancestor, declared with
//!   `extends(..)`. By default only the first declared ancestor is followed; set
//!   `hierarchy.ancestor_search = "exhaustive"` to search all of them.
//! - `title` methods are tests of their type, created on every call.
//! - `step` functions are steps of whatever test or step calls them.
//!
//! ## Error Types
//!
//! Decorated functions returning a `Result` fail with `Err`. The error type must
//! implement `From<report::Error>`, which `eyre::Report`, `anyhow::Error` and
//! `Box<dyn std::error::Error>` all do. Other functions can only fail by panicking.
//!
//! ## Threads
//!
//! The executing item is tracked per thread. Use [`scope_current`] to carry it into
//! threads you spawn yourself.

use itertools::Itertools;
use std::sync::Arc;
use tracing::*;

mod app;

// Re-export procedural macros
pub use report_derive::{class, feature, step, story, title};

// Re-export error handling crates for user convenience
pub use anyhow;
pub use eyre;
pub use inventory;

// Re-export main application struct
pub use app::App;

// Re-export core functionality
pub use report_core::{
    attachment,
    config::{get_config, Config},
    exec::Callable,
    hierarchy::{AncestorSearch, Class, ClassInfo},
    item::{Call, Outcome, Plain},
    launch::{Attachment, AttachmentType, ItemId, ItemType, Launch, LaunchInfo, Level, NewItem, Payload},
    local::{LocalLaunch, Message, Status},
    log, log_at,
    reporter::{ListReporter, NullReporter, Reporter},
    session::{caller, scope_current, Session},
    step, title, Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeclarationKind {
    Feature,
    Story,
}

/// A type declared with `#[report::feature]` or `#[report::story]`.
pub struct Declaration {
    pub kind: DeclarationKind,
    /// Display name given to the attribute.
    pub name: &'static str,
    pub class: fn() -> ClassInfo,
    pub module: &'static str,
    pub line: u32,
}

// Collect declarations using inventory
inventory::collect!(Declaration);

/// Every declaration of the binary, in registration order: features first, then
/// stories with ancestors before descendants.
pub fn declarations() -> Vec<(&'static Declaration, ClassInfo)> {
    inventory::iter::<Declaration>
        .into_iter()
        .map(|declaration| (declaration, (declaration.class)()))
        .sorted_by_key(|(declaration, class)| {
            (
                declaration.kind,
                class.depth(),
                declaration.module,
                declaration.line,
            )
        })
        .collect()
}

/// Register every declared feature and story with `session`.
pub fn declare(session: &Session) -> Result<()> {
    for (declaration, class) in declarations() {
        match declaration.kind {
            DeclarationKind::Feature => session.feature(declaration.name, &class)?,
            DeclarationKind::Story => session.story(declaration.name, &class)?,
        };
    }
    debug!("{} declarations registered", session.registry().len());
    Ok(())
}

/// Start a session on `launch` with the configuration from `report.toml`, register the
/// declared types and make the session visible to every thread.
pub fn start(launch: Arc<dyn Launch>) -> Result<Arc<Session>> {
    let config = get_config().clone();
    if config.log.capture {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("report_core=debug")),
            )
            .try_init();
    }

    let session = Session::start(config, launch)?;
    declare(&session)?;
    session.install()?;
    Ok(session)
}

/// Finish the session installed by [`start`].
pub fn finish() -> Result<()> {
    Session::uninstall().ok_or(Error::NoSession)?.finish()
}
