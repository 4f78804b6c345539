//! The outbound-request boundary: a small trait standing between the
//! scanner's task loop and the actual HTTP client, so the retry/timeout
//! policy in `lib.rs` can be exercised against a scripted executor in
//! tests without opening a socket.

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HttpOutcome {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

/// Error classes from spec §7, collapsed to what the retry policy needs to
/// branch on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("hard network error: {0}")]
    HardNetwork(String),
    #[error("client-side request construction error: {0}")]
    ClientConstruction(String),
    #[error("request timed out")]
    Timeout,
}

#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &OutboundRequest,
        timeout: Duration,
    ) -> Result<HttpOutcome, ExecutorError>;
}

pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(
        &self,
        request: &OutboundRequest,
        timeout: Duration,
    ) -> Result<HttpOutcome, ExecutorError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ExecutorError::ClientConstruction(e.to_string()))?;
        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let started = std::time::Instant::now();
        let response = builder.send().await.map_err(classify_send_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(classify_send_error)?
            .to_vec();
        let elapsed = started.elapsed();

        if status >= 500 {
            return Err(ExecutorError::TransientNetwork(format!("server error {status}")));
        }

        Ok(HttpOutcome {
            status,
            headers,
            body,
            elapsed,
        })
    }
}

fn classify_send_error(error: reqwest::Error) -> ExecutorError {
    if error.is_timeout() {
        return ExecutorError::Timeout;
    }
    if error.is_connect() || error.is_body() {
        return ExecutorError::TransientNetwork(error.to_string());
    }
    if error.is_builder() || error.is_request() {
        return ExecutorError::ClientConstruction(error.to_string());
    }
    ExecutorError::HardNetwork(error.to_string())
}
