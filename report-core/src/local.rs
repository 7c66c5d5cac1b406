//! In-process launch.
//!
//! [`LocalLaunch`] keeps every item, log and attachment in memory and publishes each
//! event on a broadcast channel so that reporters can render the run as it happens.
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, MutexGuard, PoisonError,
};
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    launch::{Attachment, ItemId, ItemType, Launch, LaunchInfo, Level, NewItem},
    Error, Result,
};

/// Final state of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Passed,
    Failed(String),
    /// Finished without an explicit status.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: ItemId,
    pub name: String,
    pub item_type: ItemType,
    pub parent: Option<ItemId>,
    pub has_stats: bool,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// `None` while the item is running.
    pub status: Option<Status>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub item: ItemId,
    pub message: String,
    pub level: Level,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub item: ItemId,
    pub attachment: Attachment,
    pub time: DateTime<Utc>,
}

/// Events published by [`LocalLaunch`].
#[derive(Debug, Clone)]
pub enum Message {
    LaunchStarted(LaunchInfo),
    ItemStarted(Box<ItemRecord>),
    Log(Box<LogRecord>),
    Attachment(Box<AttachmentRecord>),
    ItemFinished(ItemId, Status),
    LaunchFinished,
}

#[derive(Debug, Default)]
struct State {
    info: Option<LaunchInfo>,
    items: IndexMap<ItemId, ItemRecord>,
    logs: Vec<LogRecord>,
    attachments: Vec<AttachmentRecord>,
    finished: bool,
}

#[derive(Debug)]
pub struct LocalLaunch {
    next_id: AtomicU64,
    state: Mutex<State>,
    channel: Mutex<Option<broadcast::Sender<Message>>>,
}

impl Default for LocalLaunch {
    fn default() -> Self {
        LocalLaunch::new()
    }
}

impl LocalLaunch {
    pub fn new() -> LocalLaunch {
        LocalLaunch {
            next_id: AtomicU64::new(1),
            state: Mutex::new(State::default()),
            channel: Mutex::new(Some(broadcast::channel(1000).0)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, message: Message) {
        let guard = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            // Nobody listening is fine.
            let _ = tx.send(message);
        }
    }

    /// Subscribe to the events of this launch. Fails once the launch has finished.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Message>> {
        let guard = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| Error::Launch("launch channel has been already closed".into()))
    }

    pub fn info(&self) -> Option<LaunchInfo> {
        self.state().info.clone()
    }

    /// All items in creation order.
    pub fn items(&self) -> Vec<ItemRecord> {
        self.state().items.values().cloned().collect()
    }

    pub fn item(&self, id: &ItemId) -> Option<ItemRecord> {
        self.state().items.get(id).cloned()
    }

    /// First item created with the display name `name`.
    pub fn find(&self, name: &str) -> Option<ItemRecord> {
        self.state()
            .items
            .values()
            .find(|item| item.name == name)
            .cloned()
    }

    /// Direct children of `parent`, or the root items when `parent` is `None`.
    pub fn children(&self, parent: Option<&ItemId>) -> Vec<ItemRecord> {
        self.state()
            .items
            .values()
            .filter(|item| item.parent.as_ref() == parent)
            .cloned()
            .collect()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.state().logs.clone()
    }

    pub fn attachments(&self) -> Vec<AttachmentRecord> {
        self.state().attachments.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    fn finish(&self, id: &ItemId, status: Status) -> Result<()> {
        {
            let mut state = self.state();
            let item = state
                .items
                .get_mut(id)
                .ok_or_else(|| Error::UnknownItem(id.clone()))?;
            if item.status.is_some() {
                return Err(Error::AlreadyFinished(id.clone()));
            }
            item.status = Some(status.clone());
            item.end_time = Some(Utc::now());
        }
        debug!("item {id} finished: {status:?}");
        self.publish(Message::ItemFinished(id.clone(), status));
        Ok(())
    }

    fn ensure_known(state: &State, id: &ItemId) -> Result<()> {
        if state.items.contains_key(id) {
            Ok(())
        } else {
            Err(Error::UnknownItem(id.clone()))
        }
    }
}

impl Launch for LocalLaunch {
    fn start_launch(&self, info: &LaunchInfo) -> Result<()> {
        self.state().info = Some(info.clone());
        self.publish(Message::LaunchStarted(info.clone()));
        Ok(())
    }

    fn finish_launch(&self) -> Result<()> {
        self.state().finished = true;
        self.publish(Message::LaunchFinished);
        self.channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn create_report_item(&self, item: &NewItem) -> Result<ItemId> {
        let record = {
            let mut state = self.state();
            if let Some(parent) = &item.parent {
                LocalLaunch::ensure_known(&state, parent)?;
            }
            let id = ItemId::new(self.next_id.fetch_add(1, Ordering::Relaxed).to_string());
            let record = ItemRecord {
                id: id.clone(),
                name: item.name.clone(),
                item_type: item.item_type,
                parent: item.parent.clone(),
                has_stats: item.has_stats,
                description: item.description.clone(),
                start_time: Utc::now(),
                end_time: None,
                status: None,
            };
            state.items.insert(id, record.clone());
            record
        };
        debug!(
            "{} \"{}\" created as {}",
            record.item_type, record.name, record.id
        );
        let id = record.id.clone();
        self.publish(Message::ItemStarted(Box::new(record)));
        Ok(id)
    }

    fn finish_passed_item(&self, id: &ItemId) -> Result<()> {
        self.finish(id, Status::Passed)
    }

    fn finish_failed_item(&self, id: &ItemId, message: &str) -> Result<()> {
        self.finish(id, Status::Failed(message.to_string()))
    }

    fn finish_item(&self, id: &ItemId) -> Result<()> {
        self.finish(id, Status::Finished)
    }

    fn create_log(&self, id: &ItemId, message: &str, level: Level) -> Result<()> {
        let record = LogRecord {
            item: id.clone(),
            message: message.to_string(),
            level,
            time: Utc::now(),
        };
        {
            let mut state = self.state();
            LocalLaunch::ensure_known(&state, id)?;
            state.logs.push(record.clone());
        }
        self.publish(Message::Log(Box::new(record)));
        Ok(())
    }

    fn add_attachment(&self, id: &ItemId, attachment: &Attachment) -> Result<()> {
        let record = AttachmentRecord {
            item: id.clone(),
            attachment: attachment.clone(),
            time: Utc::now(),
        };
        {
            let mut state = self.state();
            LocalLaunch::ensure_known(&state, id)?;
            state.attachments.push(record.clone());
        }
        self.publish(Message::Attachment(Box::new(record)));
        Ok(())
    }
}
