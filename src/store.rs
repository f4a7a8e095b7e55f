use crate::models::{FlagEntry, FlagSet};
use arc_swap::{ArcSwap, ArcSwapOption};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Flag key must not be empty")]
    EmptyKey,

    #[error("Flag {0:?} already exists")]
    DuplicateKey(String),

    #[error("Flag {0:?} does not exist")]
    NotFound(String),
}

/// Holds the flag collection being edited.
///
/// Writes always replace a whole flag or the whole collection, never part of
/// a flag. Every write bumps the revision published by [Store::subscribe].
pub trait Store {
    /// Current state of the collection
    fn snapshot(&self) -> Arc<FlagSet>;

    /// Replace the whole collection, e.g. after an import
    fn replace_all(&self, set: FlagSet);

    /// Replace the flag with the same key
    fn replace_flag(&self, flag: FlagEntry) -> Result<(), StoreError>;

    /// Revision counter, changes after every write
    fn subscribe(&self) -> watch::Receiver<u64>;

    fn flag(&self, key: &str) -> Option<FlagEntry> {
        self.snapshot().flag(key).cloned()
    }
}

impl<T: Store> Store for Arc<T> {
    fn snapshot(&self) -> Arc<FlagSet> {
        self.as_ref().snapshot()
    }

    fn replace_all(&self, set: FlagSet) {
        self.as_ref().replace_all(set)
    }

    fn replace_flag(&self, flag: FlagEntry) -> Result<(), StoreError> {
        self.as_ref().replace_flag(flag)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.as_ref().subscribe()
    }
}

/// In-memory [Store] with a current selection
pub struct MemoryStore {
    flags: ArcSwap<FlagSet>,
    selected: ArcSwapOption<String>,
    revision: watch::Sender<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(set: FlagSet) -> Self {
        let store = Self::new();
        store.replace_all(set);
        store
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Key of the flag open in the editor
    pub fn selected_key(&self) -> Option<String> {
        self.selected.load_full().map(|key| key.as_ref().clone())
    }

    pub fn selected_flag(&self) -> Option<FlagEntry> {
        let key = self.selected.load_full()?;
        self.flag(&key)
    }

    pub fn select_flag(&self, key: Option<&str>) {
        self.selected.store(key.map(|k| Arc::new(k.to_owned())));
    }

    /// Add a default flag and select it
    pub fn add_flag(&self, key: &str) -> Result<(), StoreError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.update(|set| {
            if set.contains(key) {
                return Err(StoreError::DuplicateKey(key.to_owned()));
            }
            set.flags.push(FlagEntry::new(key));
            Ok(())
        })?;
        info!(%key, "added flag");
        self.select_flag(Some(key));
        Ok(())
    }

    /// Remove a flag. A selection pointing at it moves to the first flag left.
    pub fn delete_flag(&self, key: &str) -> Result<FlagEntry, StoreError> {
        let removed = self.update(|set| {
            let pos = set
                .flags
                .iter()
                .position(|f| f.key == key)
                .ok_or_else(|| StoreError::NotFound(key.to_owned()))?;
            Ok(set.flags.remove(pos))
        })?;
        if self.selected_key().as_deref() == Some(key) {
            let first = self.snapshot().flags.first().map(|f| f.key.clone());
            self.select_flag(first.as_deref());
        }
        info!(%key, "deleted flag");
        Ok(removed)
    }

    /// Change a flag's key. The selection follows the flag.
    pub fn rename_flag(&self, old: &str, new: &str) -> Result<(), StoreError> {
        let new = new.trim();
        if new.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        if new == old {
            return Ok(());
        }
        self.update(|set| {
            if set.contains(new) {
                return Err(StoreError::DuplicateKey(new.to_owned()));
            }
            let flag = set
                .flags
                .iter_mut()
                .find(|f| f.key == old)
                .ok_or_else(|| StoreError::NotFound(old.to_owned()))?;
            flag.key = new.to_owned();
            Ok(())
        })?;
        if self.selected_key().as_deref() == Some(old) {
            self.select_flag(Some(new));
        }
        info!(%old, %new, "renamed flag");
        Ok(())
    }

    pub fn set_global_metadata(&self, metadata: Map<String, Value>) {
        self.replace_with(|set| set.global_metadata = metadata);
    }

    pub fn set_evaluators(&self, evaluators: Map<String, Value>) {
        self.replace_with(|set| set.evaluators = evaluators);
    }

    /// [MemoryStore::update] for changes that can't fail
    fn replace_with<F>(&self, f: F)
    where
        F: FnOnce(&mut FlagSet),
    {
        let mut updated = self.flags.load().as_ref().clone();
        f(&mut updated);
        self.flags.store(Arc::new(updated));
        self.bump();
    }

    /// Copy the collection, change the copy and swap it in.
    ///
    /// Nothing is stored when `f` fails.
    fn update<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut FlagSet) -> Result<T, E>,
    {
        // Drop once cloned - don't hold guard while storing
        let mut updated = self.flags.load().as_ref().clone();
        let out = f(&mut updated)?;
        self.flags.store(Arc::new(updated));
        self.bump();
        Ok(out)
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
        debug!(revision = self.revision(), "flag collection replaced");
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            flags: ArcSwap::from_pointee(FlagSet::default()),
            selected: ArcSwapOption::empty(),
            revision,
        }
    }
}

impl Store for MemoryStore {
    fn snapshot(&self) -> Arc<FlagSet> {
        self.flags.load_full()
    }

    fn replace_all(&self, set: FlagSet) {
        let first = set.flags.first().map(|f| f.key.clone());
        self.flags.store(Arc::new(set));
        self.select_flag(first.as_deref());
        self.bump();
    }

    fn replace_flag(&self, flag: FlagEntry) -> Result<(), StoreError> {
        self.update(|set| {
            let slot = set
                .flags
                .iter_mut()
                .find(|f| f.key == flag.key)
                .ok_or_else(|| StoreError::NotFound(flag.key.clone()))?;
            *slot = flag;
            Ok(())
        })
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
