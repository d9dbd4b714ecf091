use thiserror::Error;

/// Errors the transport can signal back to the follower loop.
///
/// Every variant here is transient by construction — a socket reset, a
/// timeout, or a 5xx status are all retried with back-off; a transport
/// that wants to signal something fatal (e.g. a 401) should still
/// return one of these and let the caller decide, since the transport
/// contract itself has no notion of "fatal".
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("request timed out")]
    RequestTimeout,
    #[error("i/o error: {0}")]
    Io(String),
    #[error("server returned status {0}")]
    Status(u16),
    #[error("response missing required header {0}")]
    MissingHeader(&'static str),
    #[error("malformed header {0}: {1}")]
    MalformedHeader(&'static str, String),
}
