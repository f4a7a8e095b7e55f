use self::{
    document::{export_string, ExportError, ImportError},
    store::{MemoryStore, Store},
    sync::{LiveSync, SyncConfig},
    validator::Finding,
};
use std::sync::Arc;
use tracing::info;

pub mod compiler;
pub mod decompiler;
pub mod document;
pub mod edit;
pub mod id;
pub mod infer;
pub mod models;
pub mod node;
pub mod store;
pub mod sync;
#[cfg(test)]
mod test_utils;
pub mod validator;

pub use compiler::compile;
pub use decompiler::decompile;
pub use validator::validate;

/// An editing session over one flag collection.
///
/// Glue code on top of the smaller building blocks: import and export of
/// documents, validation of single flags and the raw document view.
pub struct Session<ST> {
    store: Arc<ST>,
}

impl Session<MemoryStore> {
    /// Session over an empty in-memory collection
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for Session<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<ST> Session<ST>
where
    ST: Store,
{
    /// Make a session with a custom store
    pub fn with_store<STA: Into<Arc<ST>>>(store: STA) -> Self {
        Self {
            store: store.into(),
        }
    }

    pub fn store(&self) -> &Arc<ST> {
        &self.store
    }

    /// Replace the collection with the flags of a document.
    ///
    /// Unlike edits in the raw view, a failed import is reported. Returns the
    /// number of imported flags.
    pub fn import(&self, text: &str) -> Result<usize, ImportError> {
        let set = document::import_str(text)?;
        let count = set.flags.len();
        self.store.replace_all(set);
        Ok(count)
    }

    /// Render the collection as a pretty-printed document.
    ///
    /// Validation findings don't prevent exporting.
    pub fn export(&self) -> Result<String, ExportError> {
        let set = self.store.snapshot();
        let text = export_string(&set)?;
        info!(num_flags = set.flags.len(), "exported flag document");
        Ok(text)
    }

    /// Findings for one flag, `None` if there's no such flag
    pub fn validate(&self, key: &str) -> Option<Vec<Finding>> {
        self.store.flag(key).map(|flag| validate(&flag))
    }

    /// Findings for every flag that has any, in collection order
    pub fn validate_all(&self) -> Vec<(String, Vec<Finding>)> {
        self.store
            .snapshot()
            .flags
            .iter()
            .map(|flag| (flag.key.clone(), validate(flag)))
            .filter(|(_, findings)| !findings.is_empty())
            .collect()
    }

    /// Controller for a raw document view over this session's store
    pub fn live_sync(&self, config: SyncConfig) -> LiveSync<Arc<ST>> {
        LiveSync::new(Arc::clone(&self.store), config)
    }
}
