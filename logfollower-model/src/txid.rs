use serde::{Deserialize, Serialize};

/// An opaque transaction id assigned by the master. Two remote
/// transactions are equal iff their ids are equal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct RemoteTxId(pub u64);

impl std::fmt::Display for RemoteTxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
