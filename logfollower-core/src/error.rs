use logfollower_model::ErrorDescriptor;
use logfollower_storage::StorageError;
use logfollower_transport::TransportError;
use thiserror::Error;

use crate::codec::DecodeError;
use crate::tracker::TrackerError;

/// Every failure the follower loop can observe, classified at the
/// boundary where it first occurs.
///
/// Only `TransientTransport` and `StorageTransient` are recovered
/// locally (retried); every other variant bubbles to the follower
/// loop, which writes it into `ApplierState::last_error` and
/// transitions to `Failed`.
#[derive(Debug, Error)]
pub enum FollowError {
    #[error("transient transport error: {0}")]
    TransientTransport(#[from] TransportError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("log gap: master no longer retains the requested tick")]
    LogGap,

    #[error("transient storage error: {0}")]
    StorageTransient(String),

    #[error("fatal storage error: {0}")]
    StorageFatal(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("follower stopped on request")]
    Cancelled,
}

impl FollowError {
    /// Whether the follower loop should retry locally: only these two
    /// kinds are recovered without bubbling up and changing `phase`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FollowError::TransientTransport(_) | FollowError::StorageTransient(_)
        )
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            FollowError::TransientTransport(_) => "TransientTransport",
            FollowError::ProtocolViolation(_) => "ProtocolViolation",
            FollowError::LogGap => "LogGap",
            FollowError::StorageTransient(_) => "StorageTransient",
            FollowError::StorageFatal(_) => "StorageFatal",
            FollowError::ConfigInvalid(_) => "ConfigInvalid",
            FollowError::Cancelled => "Cancelled",
        }
    }

    pub fn to_descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind_str().to_owned(),
            message: self.to_string(),
        }
    }
}

impl From<DecodeError> for FollowError {
    fn from(e: DecodeError) -> FollowError {
        FollowError::ProtocolViolation(e.to_string())
    }
}

impl From<TrackerError> for FollowError {
    fn from(e: TrackerError) -> FollowError {
        match e {
            TrackerError::Storage(storage_err) => storage_err.into(),
            TrackerError::DuplicateBegin(_) | TrackerError::UnknownTx(_) => {
                FollowError::ProtocolViolation(e.to_string())
            }
        }
    }
}

impl From<StorageError> for FollowError {
    fn from(e: StorageError) -> FollowError {
        match e {
            StorageError::Conflict(msg) => FollowError::StorageTransient(msg),
            StorageError::Corrupt(msg) => FollowError::StorageFatal(msg),
            // AlreadyExists/NotFound are handled by the applier's
            // per-kind dispatch before they would ever reach here; if
            // one does, it indicates a storage contract violation.
            StorageError::AlreadyExists | StorageError::NotFound => {
                FollowError::StorageFatal(e.to_string())
            }
            StorageError::Other(msg) => FollowError::StorageFatal(msg),
        }
    }
}
