//! Symbolic key to item id mapping.
//!
//! Keys are type names, function names and feature display names. Function keys are
//! re-registered on every invocation, so the last writer wins: two concurrent calls of
//! the same decorated function leave only one of them addressable by key. Caller
//! resolution does not go through the registry and is not affected.
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::*;

use crate::{launch::ItemId, Error, Result};

#[derive(Debug, Default)]
pub struct Registry {
    items: Mutex<HashMap<String, ItemId>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    fn items(&self) -> MutexGuard<'_, HashMap<String, ItemId>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `id` under `key`, replacing any previous entry.
    pub fn register(&self, key: impl Into<String>, id: ItemId) {
        let key = key.into();
        trace!("registering \"{key}\" as {id}");
        self.items().insert(key, id);
    }

    pub fn lookup(&self, key: &str) -> Result<ItemId> {
        self.items()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::ItemNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}
