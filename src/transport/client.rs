//! JSON-RPC client used for every outbound protocol call. Each request is
//! a single blocking round trip with a total deadline; retries exist only
//! on the idempotent paths (registration dedupe, UNIQUE match results) and
//! back off exponentially up to the configured attempt cap.

use crate::{
    config::RetriesConfig,
    protocol::{
        codec::{JsonRpcRequest, JsonRpcResponse, ResponseBody},
        Envelope, RpcError, PROTOCOL_VERSION,
    },
};
use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused or the deadline elapsed; the caller decides
    /// whether a retry is safe
    #[error("transport timeout")]
    Timeout,

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("invalid response frame: {0}")]
    InvalidFrame(String),

    /// The peer answered with a JSON-RPC error object
    #[error("peer error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),
}

pub type ClientResult<T> = Result<T, ClientError>;

pub struct MessageClient {
    http: reqwest::Client,
    max_attempts: u32,
    backoff: Duration,
}

impl MessageClient {
    pub fn new(retries: &RetriesConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            max_attempts: retries.max_attempts.max(1),
            backoff: Duration::from_millis(retries.backoff_ms),
        }
    }

    /// Sends one request and waits for the mirrored response within the
    /// deadline. Never retried; non-idempotent messages go through here.
    pub async fn send(
        &self,
        endpoint: &str,
        envelope: Envelope,
        payload: Value,
        timeout: Duration,
    ) -> ClientResult<ResponseBody> {
        let request = JsonRpcRequest::new(envelope, Some(payload));
        self.round_trip(endpoint, &request, timeout).await
    }

    /// Sends with capped exponential backoff on transport timeouts. Only
    /// safe for idempotent messages; protocol errors are never retried.
    pub async fn send_idempotent(
        &self,
        endpoint: &str,
        envelope: Envelope,
        payload: Value,
        timeout: Duration,
    ) -> ClientResult<ResponseBody> {
        let request = JsonRpcRequest::new(envelope, Some(payload));

        let mut attempt = 0;
        loop {
            match self.round_trip(endpoint, &request, timeout).await {
                Err(ClientError::Timeout) if attempt + 1 < self.max_attempts => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        "Request to {} timed out (attempt {}/{}), retrying in {:?}",
                        endpoint,
                        attempt + 1,
                        self.max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn round_trip(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> ClientResult<ResponseBody> {
        let url = format!("{}/mcp", endpoint.trim_end_matches('/'));
        debug!("-> {} {}", request.params.envelope.message_type, url);

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() {
                    ClientError::Timeout
                } else {
                    ClientError::InvalidFrame(err.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let frame: JsonRpcResponse = response
            .json()
            .await
            .map_err(|_| ClientError::Status(status))?;

        if let Some(error) = frame.error {
            return Err(ClientError::Rpc(error));
        }

        let body = frame
            .result
            .ok_or_else(|| ClientError::InvalidFrame("missing result and error".to_string()))?;

        // The response must mirror our request id and speak our protocol
        if frame.id.as_str() != Some(request.id.as_str()) {
            return Err(ClientError::InvalidFrame("response id mismatch".to_string()));
        }
        if body.envelope.protocol != PROTOCOL_VERSION {
            return Err(ClientError::InvalidFrame(format!(
                "unexpected protocol {}",
                body.envelope.protocol
            )));
        }

        debug!("<- {}", body.envelope.message_type);
        Ok(body)
    }
}
