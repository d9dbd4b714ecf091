use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use logfollower_model::ApplierState;
use serde_json::Value;
use tracing::trace;

use crate::{LocalTxHandle, Storage, StorageError};

enum Mutation {
    Upsert { collection: String, doc: Value },
    Remove { collection: String, key: String },
}

struct Inner {
    collections: BTreeMap<String, BTreeMap<String, Value>>,
    next_tx: u64,
    open: HashMap<u64, Vec<Mutation>>,
    state: Option<ApplierState>,
}

/// An in-memory [`Storage`] implementation, used by `logfollower-core`'s
/// tests and by `logfollower-cli --memory` for demos. Not durable: a
/// process restart loses everything, including the checkpoint, which
/// is fine for its intended uses.
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        MemoryStorage {
            inner: Mutex::new(Inner {
                collections: BTreeMap::new(),
                next_tx: 1,
                open: HashMap::new(),
                state: None,
            }),
        }
    }
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    /// Snapshot of a collection's documents, keyed by `_key`. Used by
    /// tests to assert on applied state.
    pub fn snapshot(&self, collection: &str) -> BTreeMap<String, Value> {
        let inner = self.inner.lock().expect("memory storage mutex poisoned");
        inner.collections.get(collection).cloned().unwrap_or_default()
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        let inner = self.inner.lock().expect("memory storage mutex poisoned");
        inner.collections.contains_key(collection)
    }
}

fn extract_key(doc: &Value) -> Result<String, StorageError> {
    doc.get("_key")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| StorageError::Other("document missing _key".to_owned()))
}

fn extract_name(properties: &Value) -> Result<String, StorageError> {
    properties
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| StorageError::Other("collection properties missing name".to_owned()))
}

impl Storage for MemoryStorage {
    fn begin_tx(&self) -> Result<LocalTxHandle, StorageError> {
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        let id = inner.next_tx;
        inner.next_tx += 1;
        inner.open.insert(id, Vec::new());
        trace!(tx = id, "memory storage: begin_tx");
        Ok(LocalTxHandle(id))
    }

    fn commit_tx(&self, tx: LocalTxHandle) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        let mutations = inner
            .open
            .remove(&tx.0)
            .ok_or(StorageError::NotFound)?;
        for m in mutations {
            match m {
                Mutation::Upsert { collection, doc } => {
                    let key = extract_key(&doc)?;
                    inner.collections.entry(collection).or_default().insert(key, doc);
                }
                Mutation::Remove { collection, key } => {
                    if let Some(col) = inner.collections.get_mut(&collection) {
                        col.remove(&key);
                    }
                }
            }
        }
        trace!(tx = tx.0, "memory storage: commit_tx");
        Ok(())
    }

    fn abort_tx(&self, tx: LocalTxHandle) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        inner.open.remove(&tx.0).ok_or(StorageError::NotFound)?;
        trace!(tx = tx.0, "memory storage: abort_tx");
        Ok(())
    }

    fn upsert_by_key(
        &self,
        tx: LocalTxHandle,
        collection: &str,
        doc: Value,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        let buf = inner.open.get_mut(&tx.0).ok_or(StorageError::NotFound)?;
        buf.push(Mutation::Upsert {
            collection: collection.to_owned(),
            doc,
        });
        Ok(())
    }

    fn remove_by_key(
        &self,
        tx: LocalTxHandle,
        collection: &str,
        key: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        let buf = inner.open.get_mut(&tx.0).ok_or(StorageError::NotFound)?;
        buf.push(Mutation::Remove {
            collection: collection.to_owned(),
            key: key.to_owned(),
        });
        Ok(())
    }

    fn create_collection(&self, properties: Value) -> Result<(), StorageError> {
        let name = extract_name(&properties)?;
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        if inner.collections.contains_key(&name) {
            return Err(StorageError::AlreadyExists);
        }
        inner.collections.insert(name, BTreeMap::new());
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        if inner.collections.remove(name).is_none() {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    fn rename_collection(&self, old_name: &str, new_name: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        let docs = inner.collections.remove(old_name).ok_or(StorageError::NotFound)?;
        inner.collections.insert(new_name.to_owned(), docs);
        Ok(())
    }

    fn change_collection_properties(
        &self,
        name: &str,
        _properties: Value,
    ) -> Result<(), StorageError> {
        let inner = self.inner.lock().expect("memory storage mutex poisoned");
        if !inner.collections.contains_key(name) {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    fn persist_state(&self, state: &ApplierState) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("memory storage mutex poisoned");
        inner.state = Some(state.clone());
        Ok(())
    }

    fn load_state(&self) -> Result<Option<ApplierState>, StorageError> {
        let inner = self.inner.lock().expect("memory storage mutex poisoned");
        Ok(inner.state.clone())
    }
}
