//! In-memory [`DocumentStore`] for tests and embedded use.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::Result;

use super::DocumentStore;

/// Holds the persisted value in memory. `save` overwrites, `load` clones.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    value: RwLock<Option<Value>>,
    saves: RwLock<usize>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an already-persisted value.
    pub fn with_value(value: Value) -> Self {
        Self {
            value: RwLock::new(Some(value)),
            saves: RwLock::new(0),
        }
    }

    /// Current persisted value, if any.
    pub fn snapshot(&self) -> Option<Value> {
        self.value.read().clone()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        *self.saves.read()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load(&self) -> Result<Option<Value>> {
        Ok(self.value.read().clone())
    }

    async fn save(&self, value: &Value) -> Result<()> {
        *self.value.write() = Some(value.clone());
        *self.saves.write() += 1;
        Ok(())
    }
}
