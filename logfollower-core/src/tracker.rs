use std::collections::BTreeMap;

use logfollower_model::{RemoteTxId, Tick};
use logfollower_storage::{LocalTxHandle, Storage, StorageError};
use thiserror::Error;

/// A record held per open remote transaction.
/// Exclusively owned by the tracker; destroyed on commit or abort.
#[derive(Clone, Copy, Debug)]
pub struct OngoingTx {
    pub remote_id: RemoteTxId,
    pub local: LocalTxHandle,
    pub first_seen_tick: Tick,
}

/// Errors the transaction tracker can raise.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("duplicate BeginTx for remote transaction {0}")]
    DuplicateBegin(RemoteTxId),
    #[error("{0} refers to unknown remote transaction")]
    UnknownTx(RemoteTxId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Whether an operation context was opened implicitly (a single-op
/// marker with no enclosing `BeginTx`) or belongs to an explicit,
/// already-open remote transaction. Implicit contexts must be
/// committed immediately after the single operation they wrap.
pub struct OperationContext {
    pub handle: LocalTxHandle,
    pub implicit: bool,
}

/// Reconstructs transactions from `BEGIN`/`COMMIT`/`ABORT` and
/// per-operation markers.
///
/// Holds `ongoing: RemoteTxId -> OngoingTx` and is the sole owner of
/// every local transaction it opens; it exposes only `open_ids` and
/// `oldest_open_tick` upward, so the follower loop never needs a
/// back-pointer into the tracker's internals.
#[derive(Default)]
pub struct TransactionTracker {
    ongoing: BTreeMap<RemoteTxId, OngoingTx>,
}

impl TransactionTracker {
    pub fn new() -> TransactionTracker {
        TransactionTracker::default()
    }

    pub fn on_begin(
        &mut self,
        storage: &dyn Storage,
        remote_id: RemoteTxId,
        tick: Tick,
    ) -> Result<LocalTxHandle, TrackerError> {
        if self.ongoing.contains_key(&remote_id) {
            return Err(TrackerError::DuplicateBegin(remote_id));
        }
        let local = storage.begin_tx()?;
        self.ongoing.insert(
            remote_id,
            OngoingTx {
                remote_id,
                local,
                first_seen_tick: tick,
            },
        );
        Ok(local)
    }

    /// Returns the open handle for `remote_id`, or opens an implicit
    /// single-statement transaction if `remote_id` is `None` or absent
    /// from `ongoing`.
    pub fn on_operation(
        &mut self,
        storage: &dyn Storage,
        remote_id: Option<RemoteTxId>,
        tick: Tick,
    ) -> Result<OperationContext, TrackerError> {
        if let Some(remote_id) = remote_id {
            if let Some(tx) = self.ongoing.get(&remote_id) {
                return Ok(OperationContext {
                    handle: tx.local,
                    implicit: false,
                });
            }
        }
        let local = storage.begin_tx()?;
        let _ = tick;
        Ok(OperationContext {
            handle: local,
            implicit: true,
        })
    }

    /// Commits an implicit transaction immediately after its single
    /// operation has been applied. Not used for explicit transactions
    /// (those commit only on an observed `CommitTx` marker).
    pub fn commit_implicit(
        &mut self,
        storage: &dyn Storage,
        handle: LocalTxHandle,
    ) -> Result<(), TrackerError> {
        storage.commit_tx(handle)?;
        Ok(())
    }

    pub fn on_commit(
        &mut self,
        storage: &dyn Storage,
        remote_id: RemoteTxId,
    ) -> Result<(), TrackerError> {
        let tx = self
            .ongoing
            .remove(&remote_id)
            .ok_or(TrackerError::UnknownTx(remote_id))?;
        storage.commit_tx(tx.local)?;
        Ok(())
    }

    pub fn on_abort(
        &mut self,
        storage: &dyn Storage,
        remote_id: RemoteTxId,
    ) -> Result<(), TrackerError> {
        let tx = self
            .ongoing
            .remove(&remote_id)
            .ok_or(TrackerError::UnknownTx(remote_id))?;
        storage.abort_tx(tx.local)?;
        Ok(())
    }

    pub fn open_ids(&self) -> impl Iterator<Item = RemoteTxId> + '_ {
        self.ongoing.keys().copied()
    }

    pub fn oldest_open_tick(&self) -> Option<Tick> {
        self.ongoing.values().map(|tx| tx.first_seen_tick).min()
    }

    pub fn is_empty(&self) -> bool {
        self.ongoing.is_empty()
    }

    /// Aborts every still-open transaction, locally, without requiring
    /// a matching remote `AbortTx` marker. Called on follower shutdown
    /// (orderly or crash-recovery cleanup): durability is guaranteed
    /// only up to the last applied tick, so anything still open will
    /// be re-observed and reapplied from the resume point on restart.
    pub fn abort_all(&mut self, storage: &dyn Storage) {
        for (_, tx) in std::mem::take(&mut self.ongoing) {
            if let Err(e) = storage.abort_tx(tx.local) {
                tracing::warn!(remote_id = %tx.remote_id, error = %e, "failed to abort stale local transaction on shutdown");
            }
        }
    }
}
