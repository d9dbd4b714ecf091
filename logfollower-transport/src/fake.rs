use std::sync::Mutex;

use async_trait::async_trait;

use crate::{ChunkResponse, Transport, TransportError};

/// A scriptable [`Transport`] that replays a fixed sequence of
/// responses, used to drive end-to-end follower tests without a real
/// network.
pub struct FakeTransport {
    scripted: Mutex<Vec<Result<ChunkResponse, TransportError>>>,
}

impl FakeTransport {
    /// `script` is consumed front-to-back, one entry per call to
    /// `fetch`. The last entry repeats once exhausted, so a test can
    /// end a script with an "empty, no more" response and let the
    /// follower loop idle forever without panicking.
    pub fn new(script: Vec<Result<ChunkResponse, TransportError>>) -> FakeTransport {
        FakeTransport {
            scripted: Mutex::new(script),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(
        &self,
        _from_tick: u64,
        _chunk_size: u64,
    ) -> Result<ChunkResponse, TransportError> {
        let mut scripted = self.scripted.lock().expect("fake transport mutex poisoned");
        if scripted.len() > 1 {
            scripted.remove(0)
        } else {
            match scripted.first() {
                Some(Ok(resp)) => Ok(ChunkResponse {
                    body: resp.body.clone(),
                    headers: resp.headers,
                    status: resp.status,
                }),
                Some(Err(_)) => scripted.remove(0),
                None => panic!("fake transport script exhausted"),
            }
        }
    }
}
