use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::{InMemoryDocumentStore, StoreError};

/// Shared registry of document stores keyed by index name.
///
/// Cloning is cheap; all clones see the same stores.
#[derive(Clone, Default)]
pub struct StoreCatalog {
    stores: Arc<RwLock<BTreeMap<String, Arc<InMemoryDocumentStore>>>>,
}

impl StoreCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the store for `index`, creating an empty one on first use.
    pub fn get_or_create(&self, index: &str) -> Result<Arc<InMemoryDocumentStore>, StoreError> {
        if let Some(store) = self.get(index)? {
            return Ok(store);
        }
        let mut stores = self.stores.write().map_err(|_| StoreError::LockPoisoned)?;
        let store = stores
            .entry(index.to_string())
            .or_insert_with(|| {
                tracing::info!(index, "document index created");
                Arc::new(InMemoryDocumentStore::new(index))
            })
            .clone();
        Ok(store)
    }

    pub fn get(&self, index: &str) -> Result<Option<Arc<InMemoryDocumentStore>>, StoreError> {
        let stores = self.stores.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(stores.get(index).cloned())
    }

    pub fn indexes(&self) -> Result<Vec<String>, StoreError> {
        let stores = self.stores.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(stores.keys().cloned().collect())
    }
}
