use async_trait::async_trait;
use bytes::Bytes;

use crate::{ChunkHeaders, TransportError};

/// One fetch response: a body of newline-separated self-describing
/// structured records, the required headers, and the raw HTTP status.
#[derive(Debug)]
pub struct ChunkResponse {
    pub body: Bytes,
    pub headers: ChunkHeaders,
    pub status: u16,
}

/// The wire transport the follower core consumes.
///
/// The core only ever calls [`Transport::fetch`]; everything about
/// connection management, retries at the socket level, and framing is
/// the implementation's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(
        &self,
        from_tick: u64,
        chunk_size: u64,
    ) -> Result<ChunkResponse, TransportError>;
}
