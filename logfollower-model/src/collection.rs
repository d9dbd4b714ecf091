use serde::{Deserialize, Serialize};

/// Identifies a collection an event targets, by name and/or an opaque
/// id the master assigned it. The name is what the collection filter
/// and the storage interface key off; the id is carried through for
/// markers the wire format labels only by id.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    pub name: Option<String>,
    pub id: Option<u64>,
}

impl CollectionRef {
    pub fn named(name: impl Into<String>) -> CollectionRef {
        CollectionRef {
            name: Some(name.into()),
            id: None,
        }
    }

    /// Whether this collection's name marks it as a system collection
    /// (name begins with `_`). Returns `false` if the name is unknown.
    pub fn is_system(&self) -> bool {
        self.name.as_deref().is_some_and(|n| n.starts_with('_'))
    }
}
