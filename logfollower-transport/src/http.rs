use std::time::Duration;

use async_trait::async_trait;
use logfollower_model::Tick;
use tracing::debug;

use crate::{ChunkHeaders, ChunkResponse, Transport, TransportError};

const HDR_LAST_INCLUDED: &str = "x-last-included-tick";
const HDR_LAST_TICK: &str = "x-last-tick";
const HDR_CHECK_MORE: &str = "x-check-more";
const HDR_FROM_PRESENT: &str = "x-from-present";
const HDR_ACTIVE: &str = "x-active";

/// A [`Transport`] backed by a real HTTP client, polling a master's
/// replication-log endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<HttpTransport, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(HttpTransport {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn header_bool(resp: &reqwest::Response, name: &'static str) -> Result<bool, TransportError> {
        let raw = resp
            .headers()
            .get(name)
            .ok_or(TransportError::MissingHeader(name))?
            .to_str()
            .map_err(|e| TransportError::MalformedHeader(name, e.to_string()))?;
        match raw {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(TransportError::MalformedHeader(name, other.to_owned())),
        }
    }

    fn header_tick(resp: &reqwest::Response, name: &'static str) -> Result<Tick, TransportError> {
        let raw = resp
            .headers()
            .get(name)
            .ok_or(TransportError::MissingHeader(name))?
            .to_str()
            .map_err(|e| TransportError::MalformedHeader(name, e.to_string()))?;
        raw.parse::<u64>()
            .map(Tick)
            .map_err(|e| TransportError::MalformedHeader(name, e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        from_tick: u64,
        chunk_size: u64,
    ) -> Result<ChunkResponse, TransportError> {
        debug!(from_tick, chunk_size, "fetching replication chunk");
        let url = format!(
            "{}/_api/replication/logger-follow?from={}&chunkSize={}",
            self.endpoint.trim_end_matches('/'),
            from_tick,
            chunk_size
        );
        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::RequestTimeout
            } else if e.is_connect() {
                TransportError::ConnectTimeout
            } else {
                TransportError::Io(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) && status != 204 {
            return Err(TransportError::Status(status));
        }

        let headers = ChunkHeaders {
            last_included_tick: Self::header_tick(&resp, HDR_LAST_INCLUDED)?,
            last_tick: Self::header_tick(&resp, HDR_LAST_TICK)?,
            check_more: Self::header_bool(&resp, HDR_CHECK_MORE)?,
            from_present: Self::header_bool(&resp, HDR_FROM_PRESENT)?,
            active: Self::header_bool(&resp, HDR_ACTIVE)?,
        };

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;

        Ok(ChunkResponse {
            body,
            headers,
            status,
        })
    }
}
