//! In-memory key-value store for tests and ephemeral sessions.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::KeyValueStore;
use crate::shared::error::SyncError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, SyncError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), SyncError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
