//! Durable URL slots
//!
//! Three named slots survive process restarts:
//! - `start`: last known-good URL from the remote resolver (never cleared)
//! - `last`: last non-auth URL the browser finished loading
//! - `unlocked`: one-way flag set by the first successful web load
//!
//! Backends implement [`KeyValueStore`]; every `set` is flushed before it
//! returns. Callers validate with `UrlPolicy` before writing.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::consts::{LAST_URL_KEY, START_URL_KEY, UNLOCKED_KEY};

#[cfg(not(target_arch = "wasm32"))]
pub mod file;
#[cfg(target_arch = "wasm32")]
pub mod local_storage;

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStore;
#[cfg(target_arch = "wasm32")]
pub use local_storage::LocalStorageStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage contents are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raw string key-value backend.
///
/// Failures are logged and swallowed by the backend: a broken store reads as
/// empty and drops writes, it never aborts the launch.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    /// Write and durably flush before returning
    fn set(&self, key: &str, value: &str);
}

/// Volatile store, used by hosts without durable storage and by tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
    }
}

/// Named persistent slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Start,
    Last,
    Unlocked,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Start, Slot::Last, Slot::Unlocked];

    pub fn key(self) -> &'static str {
        match self {
            Slot::Start => START_URL_KEY,
            Slot::Last => LAST_URL_KEY,
            Slot::Unlocked => UNLOCKED_KEY,
        }
    }
}

/// Typed slot value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Url(String),
    Flag(bool),
}

/// Slot-level view over a [`KeyValueStore`].
///
/// Cheap to clone; every clone shares the same backend.
#[derive(Clone)]
pub struct PersistentUrlStore {
    backend: Rc<dyn KeyValueStore>,
}

impl PersistentUrlStore {
    pub fn new(backend: Rc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Rc::new(MemoryStore::new()))
    }

    pub fn get(&self, slot: Slot) -> Option<SlotValue> {
        let raw = self.backend.get(slot.key())?;
        match slot {
            Slot::Unlocked => Some(SlotValue::Flag(raw.trim() == "1")),
            Slot::Start | Slot::Last => {
                if raw.is_empty() {
                    None
                } else {
                    Some(SlotValue::Url(raw))
                }
            }
        }
    }

    pub fn set(&self, slot: Slot, value: SlotValue) {
        match (slot, value) {
            (Slot::Unlocked, SlotValue::Flag(true)) => {
                self.backend.set(slot.key(), "1");
            }
            (Slot::Unlocked, SlotValue::Flag(false)) => {
                log::warn!("Ignoring attempt to clear the unlocked flag");
            }
            (Slot::Start | Slot::Last, SlotValue::Url(url)) => {
                self.backend.set(slot.key(), &url);
            }
            (slot, value) => {
                log::warn!("Ignoring mismatched write {value:?} to slot {slot:?}");
            }
        }
    }

    pub fn start(&self) -> Option<String> {
        self.url(Slot::Start)
    }

    pub fn last(&self) -> Option<String> {
        self.url(Slot::Last)
    }

    pub fn set_start(&self, url: &str) {
        self.set(Slot::Start, SlotValue::Url(url.to_owned()));
    }

    pub fn set_last(&self, url: &str) {
        self.set(Slot::Last, SlotValue::Url(url.to_owned()));
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.get(Slot::Unlocked), Some(SlotValue::Flag(true)))
    }

    /// One-way ratchet; never cleared
    pub fn mark_unlocked(&self) {
        if !self.is_unlocked() {
            log::info!("Web mode unlocked");
        }
        self.set(Slot::Unlocked, SlotValue::Flag(true));
    }

    fn url(&self, slot: Slot) -> Option<String> {
        match self.get(slot) {
            Some(SlotValue::Url(url)) => Some(url),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PersistentUrlStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentUrlStore")
            .field("start", &self.start())
            .field("last", &self.last())
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}
