use logfollower_model::ApplierState;
use serde_json::Value;

use crate::StorageError;

/// An opaque handle to a local transaction, returned by
/// [`Storage::begin_tx`]. Owned exclusively by the transaction
/// tracker; the core never inspects its contents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct LocalTxHandle(pub u64);

/// The local storage engine contract the follower core is built
/// against. The engine itself is out of scope here — only this
/// interface is specified.
///
/// Implementations must guarantee that, between `begin_tx` and
/// `commit_tx`, writes made through the handle are invisible to
/// readers until commit, and that commit is atomic.
pub trait Storage: Send + Sync {
    fn begin_tx(&self) -> Result<LocalTxHandle, StorageError>;
    fn commit_tx(&self, tx: LocalTxHandle) -> Result<(), StorageError>;
    fn abort_tx(&self, tx: LocalTxHandle) -> Result<(), StorageError>;

    /// Insert-or-update a document by its `_key` field. Used for both
    /// `InsertDoc` and `UpdateDoc` markers: an insert with an existing
    /// key is treated as an update.
    fn upsert_by_key(
        &self,
        tx: LocalTxHandle,
        collection: &str,
        doc: Value,
    ) -> Result<(), StorageError>;

    /// Remove a document by key. Implementations must return `Ok(())`
    /// for a missing key, not `NotFound` — tolerance is decided once,
    /// at the applier, and storage only needs to report whether a
    /// document existed if it wants to (ignored by callers).
    fn remove_by_key(
        &self,
        tx: LocalTxHandle,
        collection: &str,
        key: &str,
    ) -> Result<(), StorageError>;

    fn create_collection(&self, properties: Value) -> Result<(), StorageError>;
    fn drop_collection(&self, name: &str) -> Result<(), StorageError>;
    fn rename_collection(&self, old_name: &str, new_name: &str) -> Result<(), StorageError>;
    fn change_collection_properties(
        &self,
        name: &str,
        properties: Value,
    ) -> Result<(), StorageError>;

    /// Atomically persist the applier's checkpoint.
    fn persist_state(&self, state: &ApplierState) -> Result<(), StorageError>;

    /// Read back the last persisted checkpoint, if any (the original
    /// syncer's `getLocalState`).
    fn load_state(&self) -> Result<Option<ApplierState>, StorageError>;
}
