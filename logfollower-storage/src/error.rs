use thiserror::Error;

/// Errors the storage engine can signal back to the applier.
///
/// The applier's dispatch table treats `AlreadyExists` and `NotFound`
/// specially depending on which operation raised them (idempotent
/// replay tolerance); `Conflict` and `Corrupt` map onto the
/// `StorageTransient`/`StorageFatal` error kinds.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("collection or document already exists")]
    AlreadyExists,
    #[error("collection or document not found")]
    NotFound,
    #[error("transient storage conflict: {0}")]
    Conflict(String),
    #[error("unrecoverable storage corruption: {0}")]
    Corrupt(String),
    #[error("{0}")]
    Other(String),
}
