//! # Report Core
//!
//! Core functionality for report, the hierarchical test-report instrumentation.
//!
//! This crate provides the building blocks behind the `report` attribute macros:
//! - Sessions and the per-thread stack of executing items
//! - The execution adapter for sync and async units
//! - Parent resolution over declared type hierarchies
//! - The decorator runtime (`step`, `title`, `feature`, `story`, `log`, `attachment`)
//! - The `Launch` backend trait and the in-process `LocalLaunch`
//! - Configuration and console reporters
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | #[report::step]     | ---> | item (runtime)      | ---> | Launch              |
//! | #[report::title]    |      | + exec adapter      |      | LocalLaunch / user  |
//! +---------------------+      +---------------------+      +---------------------+
//!            |                    |            ^                       |
//!            v                    v            |                       v
//! +---------------------+  +-------------+  +-------------+  +---------------------+
//! | #[report::feature]  |  | title       |  | session     |  | broadcast channel   |
//! | #[report::story]    |  | templates   |  | + registry  |  | --> Reporter        |
//! +---------------------+  +-------------+  +-------------+  +---------------------+
//!            |                                 ^
//!            v                                 |
//! +---------------------+                      |
//! | hierarchy resolver  | ---------------------+
//! | ClassInfo / extends |
//! +---------------------+
//! ```
//!
//! Most users should use the main `report` crate rather than importing `report-core`
//! directly.

pub mod config;
pub mod error;
pub mod exec;
pub mod hierarchy;
pub mod item;
pub mod launch;
pub mod local;
pub mod registry;
pub mod reporter;
pub mod session;
pub mod title;

// Re-export error handling crates
pub use anyhow;
pub use eyre;

/// Symbolic name of a report item: a type name, a function name, or a feature's
/// display name.
pub type ItemKey = String;

// Re-export key functionality
pub use config::{get_config, Config};
pub use error::{Error, Result};
pub use exec::Callable;
pub use hierarchy::{AncestorSearch, Class, ClassInfo};
pub use item::{attachment, log, log_at, step, title, Call, Outcome, Plain};
pub use launch::{Attachment, AttachmentType, ItemId, ItemType, Launch, LaunchInfo, Level, NewItem, Payload};
pub use local::{LocalLaunch, Message, Status};
pub use reporter::{ListReporter, NullReporter, Reporter};
pub use session::{caller, scope_current, Session};
