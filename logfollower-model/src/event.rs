use serde::{Deserialize, Serialize};

use crate::{CollectionRef, RemoteTxId, Tick};

/// The kind of mutation a decoded marker carries.
///
/// `Other` covers any marker kind not known to this follower (forward
/// compatibility with masters that emit newer marker kinds); it is
/// always ignored by the applier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum EventKind {
    BeginTx,
    CommitTx,
    AbortTx,
    InsertDoc,
    UpdateDoc,
    RemoveDoc,
    CreateCollection,
    DropCollection,
    RenameCollection,
    ChangeCollection,
    Other,
}

impl EventKind {
    /// Whether markers of this kind are always top-level (never legal
    /// inside an open transaction's wire range). A master never emits
    /// DDL markers nested inside a BEGIN/COMMIT range.
    pub fn is_ddl(self) -> bool {
        matches!(
            self,
            EventKind::CreateCollection
                | EventKind::DropCollection
                | EventKind::RenameCollection
                | EventKind::ChangeCollection
        )
    }

    pub fn is_tx_fence(self) -> bool {
        matches!(self, EventKind::BeginTx | EventKind::CommitTx | EventKind::AbortTx)
    }

    pub fn is_doc_op(self) -> bool {
        matches!(
            self,
            EventKind::InsertDoc | EventKind::UpdateDoc | EventKind::RemoveDoc
        )
    }
}

/// One decoded log record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub tick: Tick,
    pub kind: EventKind,
    pub tx_id: Option<RemoteTxId>,
    pub collection: Option<CollectionRef>,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn collection_name(&self) -> Option<&str> {
        self.collection.as_ref().and_then(|c| c.name.as_deref())
    }
}
