#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use super::{StoreError, VectorStore, validate_records};
use crate::records::Record;
use crate::schema::{CollectionSchema, IndexSpec};

/// A call received by [`MemoryStore`], in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    HasCollection(String),
    CreateCollection(String),
    CreateIndex(String),
    LoadCollection(String),
    Insert { collection: String, rows: usize },
}

#[derive(Debug, Clone)]
struct MemoryCollection {
    schema: CollectionSchema,
    index: Option<IndexSpec>,
    loaded: bool,
    next_id: i64,
    rows: Vec<(i64, Record)>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, MemoryCollection>,
    calls: Vec<StoreCall>,
}

/// In-process vector store that enforces the same rules as a Milvus collection.
///
/// Used for dry runs and for exercising the loader without a server.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a collection, as if an earlier run had provisioned it
    #[inline]
    pub fn with_collection(self, name: &str, schema: &CollectionSchema) -> Self {
        self.lock().collections.insert(
            name.to_string(),
            MemoryCollection {
                schema: schema.clone(),
                index: None,
                loaded: false,
                next_id: 1,
                rows: Vec::new(),
            },
        );
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call received so far
    #[inline]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    #[inline]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().collections.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    #[inline]
    pub fn row_count(&self, name: &str) -> Option<usize> {
        self.lock().collections.get(name).map(|c| c.rows.len())
    }

    /// Stored records in insertion order
    #[inline]
    pub fn records(&self, name: &str) -> Option<Vec<Record>> {
        self.lock()
            .collections
            .get(name)
            .map(|c| c.rows.iter().map(|(_, record)| record.clone()).collect())
    }

    /// Auto-assigned primary keys in insertion order
    #[inline]
    pub fn ids(&self, name: &str) -> Option<Vec<i64>> {
        self.lock()
            .collections
            .get(name)
            .map(|c| c.rows.iter().map(|(id, _)| *id).collect())
    }

    #[inline]
    pub fn index(&self, name: &str) -> Option<IndexSpec> {
        self.lock()
            .collections
            .get(name)
            .and_then(|c| c.index.clone())
    }

    #[inline]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.lock()
            .collections
            .get(name)
            .is_some_and(|c| c.loaded)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::HasCollection(name.to_string()));
        Ok(state.collections.contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        schema: &CollectionSchema,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::CreateCollection(name.to_string()));

        if state.collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }

        state.collections.insert(
            name.to_string(),
            MemoryCollection {
                schema: schema.clone(),
                index: None,
                loaded: false,
                next_id: 1,
                rows: Vec::new(),
            },
        );
        debug!("Created in-memory collection {}", name);
        Ok(())
    }

    async fn create_index(&self, name: &str, schema: &CollectionSchema) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::CreateIndex(name.to_string()));

        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        match &collection.index {
            Some(existing) if *existing == schema.index => {
                debug!("Index {} already exists on {}", existing.name, name);
                Ok(())
            }
            Some(existing) => Err(StoreError::IndexConflict {
                collection: name.to_string(),
                index: existing.name.clone(),
            }),
            None => {
                collection.index = Some(schema.index.clone());
                Ok(())
            }
        }
    }

    async fn load_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::LoadCollection(name.to_string()));

        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        if collection.index.is_none() {
            return Err(StoreError::IndexNotFound(name.to_string()));
        }

        collection.loaded = true;
        Ok(())
    }

    async fn insert(
        &self,
        name: &str,
        _schema: &CollectionSchema,
        records: &[Record],
        first_row: usize,
    ) -> Result<u64, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::Insert {
            collection: name.to_string(),
            rows: records.len(),
        });

        let collection = state
            .collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        // The collection's own schema is authoritative, like a real server
        validate_records(&collection.schema, records, first_row)?;

        for record in records {
            let id = collection.next_id;
            collection.next_id += 1;
            collection.rows.push((id, record.clone()));
        }

        Ok(records.len() as u64)
    }
}
