//! The launch is the reporting backend seen from the instrumentation layer.
//!
//! Everything the decorators produce ends up as calls on a [`Launch`]: items are
//! created, finished, and decorated with logs and attachments. How those calls reach
//! a reporting server is up to the implementation; [`crate::local::LocalLaunch`]
//! keeps everything in memory and publishes it to reporters.
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
    borrow::Cow,
    fmt,
    path::{Path, PathBuf},
};

use crate::Result;

/// Opaque identifier of a report item, assigned by the launch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> ItemId {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a node in the report tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ItemType {
    Suite,
    Story,
    Test,
    Step,
}

/// Severity of logs and attachments. Ordered from the most verbose to the most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown log level \"{s}\"")))
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Request to create a report item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    /// Display name shown in the report.
    pub name: String,
    pub parent: Option<ItemId>,
    pub item_type: ItemType,
    /// Whether the item counts towards launch statistics. Steps don't.
    pub has_stats: bool,
    pub description: Option<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>, item_type: ItemType) -> NewItem {
        NewItem {
            name: name.into(),
            parent: None,
            item_type,
            has_stats: true,
            description: None,
        }
    }

    pub fn parent(mut self, parent: Option<ItemId>) -> NewItem {
        self.parent = parent;
        self
    }

    pub fn has_stats(mut self, has_stats: bool) -> NewItem {
        self.has_stats = has_stats;
        self
    }

    pub fn description(mut self, description: Option<impl Into<String>>) -> NewItem {
        self.description = description.map(Into::into);
        self
    }
}

/// Launch-wide metadata sent when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchInfo {
    pub name: String,
    pub description: Option<String>,
    pub project: String,
    pub attributes: Vec<String>,
}

/// MIME type of an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentType(Cow<'static, str>);

impl AttachmentType {
    pub const PNG: AttachmentType = AttachmentType(Cow::Borrowed("image/png"));
    pub const JPG: AttachmentType = AttachmentType(Cow::Borrowed("image/jpeg"));
    pub const GIF: AttachmentType = AttachmentType(Cow::Borrowed("image/gif"));
    pub const SVG: AttachmentType = AttachmentType(Cow::Borrowed("image/svg+xml"));
    pub const TEXT: AttachmentType = AttachmentType(Cow::Borrowed("text/plain"));
    pub const HTML: AttachmentType = AttachmentType(Cow::Borrowed("text/html"));
    pub const JSON: AttachmentType = AttachmentType(Cow::Borrowed("application/json"));
    pub const XML: AttachmentType = AttachmentType(Cow::Borrowed("application/xml"));
    pub const CSV: AttachmentType = AttachmentType(Cow::Borrowed("text/csv"));
    pub const PDF: AttachmentType = AttachmentType(Cow::Borrowed("application/pdf"));
    pub const ZIP: AttachmentType = AttachmentType(Cow::Borrowed("application/zip"));

    pub fn custom(mime: impl Into<String>) -> AttachmentType {
        AttachmentType(Cow::Owned(mime.into()))
    }

    pub fn mime(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttachmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attachment content: either the raw bytes or a path the launch reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl Payload {
    /// Short human readable description used by console reporters.
    pub fn describe(&self) -> String {
        match self {
            Payload::Bytes(bytes) => format!("{} bytes", bytes.len()),
            Payload::Path(path) => path.display().to_string(),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Payload {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Payload {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<PathBuf> for Payload {
    fn from(path: PathBuf) -> Payload {
        Payload::Path(path)
    }
}

impl From<&Path> for Payload {
    fn from(path: &Path) -> Payload {
        Payload::Path(path.to_path_buf())
    }
}

/// Attachment addressed to an item by its symbolic key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Symbolic key of the item, usually the name of the test or step function.
    pub item: String,
    pub name: String,
    pub payload: Payload,
    pub attachment_type: AttachmentType,
    pub level: Level,
}

impl Attachment {
    /// Attachments default to [`Level::Error`]: they are usually evidence of a failure.
    pub fn new(
        item: impl Into<String>,
        name: impl Into<String>,
        payload: impl Into<Payload>,
        attachment_type: AttachmentType,
    ) -> Attachment {
        Attachment {
            item: item.into(),
            name: name.into(),
            payload: payload.into(),
            attachment_type,
            level: Level::Error,
        }
    }

    pub fn level(mut self, level: Level) -> Attachment {
        self.level = level;
        self
    }
}

/// Reporting backend consumed by the instrumentation layer.
pub trait Launch: Send + Sync {
    /// Called once when a session starts.
    fn start_launch(&self, _info: &LaunchInfo) -> Result<()> {
        Ok(())
    }

    /// Called once when a session finishes.
    fn finish_launch(&self) -> Result<()> {
        Ok(())
    }

    fn create_report_item(&self, item: &NewItem) -> Result<ItemId>;

    fn finish_passed_item(&self, id: &ItemId) -> Result<()>;

    fn finish_failed_item(&self, id: &ItemId, message: &str) -> Result<()>;

    /// Finish without a status; the backend derives it from the children.
    fn finish_item(&self, id: &ItemId) -> Result<()>;

    fn create_log(&self, id: &ItemId, message: &str, level: Level) -> Result<()>;

    fn add_attachment(&self, id: &ItemId, attachment: &Attachment) -> Result<()>;
}
