//! Probe transport - the network side of each measurement phase

use async_trait::async_trait;
use measure::ProbeError;
use std::time::{Duration, Instant};
use tracing::debug;

/// One round trip, download chunk or upload chunk against a server host
#[async_trait]
pub trait Transport: Send + Sync {
    /// Round-trip time of one lightweight request
    async fn ping(&self, host: &str, timeout: Duration) -> Result<Duration, ProbeError>;

    /// Fetch `bytes` bytes, returning how many actually arrived
    async fn download(&self, host: &str, bytes: u64, timeout: Duration) -> Result<u64, ProbeError>;

    /// Post `payload`, returning the number of bytes sent
    async fn upload(&self, host: &str, payload: &[u8], timeout: Duration)
    -> Result<u64, ProbeError>;
}

/// [`Transport`] over HTTP(S) using `HEAD /`, `GET /__down` and `POST /__up`
pub struct HttpTransport {
    client: reqwest::Client,
    scheme: String,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ProbeError> {
        Self::with_scheme("https")
    }

    pub fn with_scheme(scheme: &str) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            scheme: scheme.to_string(),
        })
    }

    fn url(&self, host: &str, path: &str) -> String {
        format!("{}://{}{}", self.scheme, host, path)
    }
}

fn classify(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Transport(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn ping(&self, host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        let start = Instant::now();
        let response = self
            .client
            .head(self.url(host, "/"))
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let rtt = start.elapsed();

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ProbeError::Status(status.as_u16()));
        }
        Ok(rtt)
    }

    async fn download(&self, host: &str, bytes: u64, timeout: Duration) -> Result<u64, ProbeError> {
        let mut response = self
            .client
            .get(self.url(host, "/__down"))
            .query(&[("bytes", bytes)])
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let mut received = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            received += chunk.len() as u64;
        }
        debug!("Downloaded {} of {} bytes from {}", received, bytes, host);
        Ok(received)
    }

    async fn upload(
        &self,
        host: &str,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<u64, ProbeError> {
        let response = self
            .client
            .post(self.url(host, "/__up"))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload.to_vec())
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }
        Ok(payload.len() as u64)
    }
}
