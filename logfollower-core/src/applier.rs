use logfollower_model::{Event, EventKind, Tick};
use logfollower_storage::{Storage, StorageError};

use crate::error::FollowError;
use crate::tracker::TransactionTracker;

fn doc_key(payload: &serde_json::Value) -> Result<String, FollowError> {
    if let Some(s) = payload.as_str() {
        return Ok(s.to_owned());
    }
    payload
        .get("_key")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| FollowError::ProtocolViolation("document operation missing _key".to_owned()))
}

fn new_collection_name(payload: &serde_json::Value) -> Result<String, FollowError> {
    payload
        .get("name")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| {
            FollowError::ProtocolViolation("rename marker missing new collection name".to_owned())
        })
}

/// Dispatches a decoded event to the local storage engine, via the
/// tracker's transaction context.
///
/// Returns `Some(tick)` when this event concluded a top-level unit of
/// work — an explicit commit, an explicit abort, an implicit
/// single-statement commit, or an immediately-applied DDL op — at
/// which point the caller should advance its last-applied tick to
/// `tick`. Returns `None` while a transaction remains open, buffering
/// its writes, or when the event produced no storage call at all.
pub fn apply(
    storage: &dyn Storage,
    tracker: &mut TransactionTracker,
    event: &Event,
) -> Result<Option<Tick>, FollowError> {
    if event.kind.is_ddl() && event.tx_id.is_some() {
        return Err(FollowError::ProtocolViolation(
            "DDL marker is not permitted inside a transaction".to_owned(),
        ));
    }

    match event.kind {
        EventKind::BeginTx => {
            let tx_id = event
                .tx_id
                .ok_or_else(|| FollowError::ProtocolViolation("BeginTx missing txId".to_owned()))?;
            tracker.on_begin(storage, tx_id, event.tick)?;
            Ok(None)
        }
        EventKind::CommitTx => {
            let tx_id = event
                .tx_id
                .ok_or_else(|| FollowError::ProtocolViolation("CommitTx missing txId".to_owned()))?;
            tracker.on_commit(storage, tx_id)?;
            Ok(Some(event.tick))
        }
        EventKind::AbortTx => {
            let tx_id = event
                .tx_id
                .ok_or_else(|| FollowError::ProtocolViolation("AbortTx missing txId".to_owned()))?;
            tracker.on_abort(storage, tx_id)?;
            // An aborted transaction leaves no pending effects behind
            // it; the last-applied tick advances past it the same as
            // a commit would.
            Ok(Some(event.tick))
        }
        EventKind::InsertDoc | EventKind::UpdateDoc => {
            let name = event.collection_name().ok_or_else(|| {
                FollowError::ProtocolViolation("document op missing collection".to_owned())
            })?;
            let ctx = tracker.on_operation(storage, event.tx_id, event.tick)?;
            storage.upsert_by_key(ctx.handle, name, event.payload.clone())?;
            if ctx.implicit {
                tracker.commit_implicit(storage, ctx.handle)?;
                Ok(Some(event.tick))
            } else {
                Ok(None)
            }
        }
        EventKind::RemoveDoc => {
            let name = event.collection_name().ok_or_else(|| {
                FollowError::ProtocolViolation("document op missing collection".to_owned())
            })?;
            let key = doc_key(&event.payload)?;
            let ctx = tracker.on_operation(storage, event.tx_id, event.tick)?;
            // A missing key is tolerated, not an error: a replayed
            // delete after a crash must not fail just because the
            // first attempt already removed it.
            storage.remove_by_key(ctx.handle, name, &key)?;
            if ctx.implicit {
                tracker.commit_implicit(storage, ctx.handle)?;
                Ok(Some(event.tick))
            } else {
                Ok(None)
            }
        }
        EventKind::CreateCollection => {
            match storage.create_collection(event.payload.clone()) {
                Ok(()) | Err(StorageError::AlreadyExists) => Ok(Some(event.tick)),
                Err(e) => Err(e.into()),
            }
        }
        EventKind::DropCollection => {
            let name = event.collection_name().ok_or_else(|| {
                FollowError::ProtocolViolation("DropCollection missing collection".to_owned())
            })?;
            match storage.drop_collection(name) {
                Ok(()) | Err(StorageError::NotFound) => Ok(Some(event.tick)),
                Err(e) => Err(e.into()),
            }
        }
        EventKind::RenameCollection => {
            let old_name = event.collection_name().ok_or_else(|| {
                FollowError::ProtocolViolation("RenameCollection missing collection".to_owned())
            })?;
            let new_name = new_collection_name(&event.payload)?;
            match storage.rename_collection(old_name, &new_name) {
                Ok(()) => Ok(Some(event.tick)),
                // Unlike create/drop, a missing source collection here
                // is fatal: there is no idempotent replay to tolerate.
                Err(e) => Err(e.into()),
            }
        }
        EventKind::ChangeCollection => {
            let name = event.collection_name().ok_or_else(|| {
                FollowError::ProtocolViolation("ChangeCollection missing collection".to_owned())
            })?;
            match storage.change_collection_properties(name, event.payload.clone()) {
                Ok(()) => Ok(Some(event.tick)),
                Err(e) => Err(e.into()),
            }
        }
        EventKind::Other => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logfollower_model::{CollectionRef, RemoteTxId};
    use logfollower_storage::MemoryStorage;
    use serde_json::json;

    fn insert(tick: u64, tx: Option<u64>, collection: &str, doc: serde_json::Value) -> Event {
        Event {
            tick: Tick(tick),
            kind: EventKind::InsertDoc,
            tx_id: tx.map(RemoteTxId),
            collection: Some(CollectionRef::named(collection)),
            payload: doc,
        }
    }

    #[test]
    fn implicit_insert_commits_immediately() {
        let storage = MemoryStorage::new();
        storage.create_collection(json!({"name": "c"})).unwrap();
        let mut tracker = TransactionTracker::new();
        let ev = insert(10, None, "c", json!({"_key": "a", "v": 1}));
        let result = apply(&storage, &mut tracker, &ev).unwrap();
        assert_eq!(result, Some(Tick(10)));
        assert_eq!(storage.snapshot("c").len(), 1);
    }

    #[test]
    fn explicit_tx_buffers_until_commit() {
        let storage = MemoryStorage::new();
        storage.create_collection(json!({"name": "c"})).unwrap();
        let mut tracker = TransactionTracker::new();

        let begin = Event {
            tick: Tick(20),
            kind: EventKind::BeginTx,
            tx_id: Some(RemoteTxId(7)),
            collection: None,
            payload: serde_json::Value::Null,
        };
        assert_eq!(apply(&storage, &mut tracker, &begin).unwrap(), None);

        let ins = insert(21, Some(7), "c", json!({"_key": "x"}));
        assert_eq!(apply(&storage, &mut tracker, &ins).unwrap(), None);
        assert!(storage.snapshot("c").is_empty());

        let commit = Event {
            tick: Tick(22),
            kind: EventKind::CommitTx,
            tx_id: Some(RemoteTxId(7)),
            collection: None,
            payload: serde_json::Value::Null,
        };
        assert_eq!(
            apply(&storage, &mut tracker, &commit).unwrap(),
            Some(Tick(22))
        );
        assert_eq!(storage.snapshot("c").len(), 1);
    }

    #[test]
    fn create_collection_ignores_already_exists() {
        let storage = MemoryStorage::new();
        storage.create_collection(json!({"name": "c"})).unwrap();
        let mut tracker = TransactionTracker::new();
        let ev = Event {
            tick: Tick(1),
            kind: EventKind::CreateCollection,
            tx_id: None,
            collection: Some(CollectionRef::named("c")),
            payload: json!({"name": "c"}),
        };
        assert_eq!(apply(&storage, &mut tracker, &ev).unwrap(), Some(Tick(1)));
    }

    #[test]
    fn drop_collection_ignores_not_found() {
        let storage = MemoryStorage::new();
        let mut tracker = TransactionTracker::new();
        let ev = Event {
            tick: Tick(1),
            kind: EventKind::DropCollection,
            tx_id: None,
            collection: Some(CollectionRef::named("nope")),
            payload: json!({}),
        };
        assert_eq!(apply(&storage, &mut tracker, &ev).unwrap(), Some(Tick(1)));
    }

    #[test]
    fn rename_not_found_is_fatal() {
        let storage = MemoryStorage::new();
        let mut tracker = TransactionTracker::new();
        let ev = Event {
            tick: Tick(1),
            kind: EventKind::RenameCollection,
            tx_id: None,
            collection: Some(CollectionRef::named("nope")),
            payload: json!({"name": "newname"}),
        };
        let err = apply(&storage, &mut tracker, &ev).unwrap_err();
        assert!(matches!(err, FollowError::StorageFatal(_)));
    }

    #[test]
    fn ddl_inside_tx_is_protocol_violation() {
        let storage = MemoryStorage::new();
        let mut tracker = TransactionTracker::new();
        let ev = Event {
            tick: Tick(1),
            kind: EventKind::DropCollection,
            tx_id: Some(RemoteTxId(1)),
            collection: Some(CollectionRef::named("c")),
            payload: json!({}),
        };
        let err = apply(&storage, &mut tracker, &ev).unwrap_err();
        assert!(matches!(err, FollowError::ProtocolViolation(_)));
    }
}
