//! HTTP probe implementation.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{settle, Probe, ProbeError, ProbeKind};

/// Measures the time to fetch a full response from `http://<endpoint>`.
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    async fn fetch(&self, endpoint: &str) -> Result<Duration, ProbeError> {
        let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };

        let start = Instant::now();

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

        // Any status counts as an answer; read the body to time the full transfer
        let _body = response
            .bytes()
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        Ok(start.elapsed())
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, endpoint: &str) -> Option<Duration> {
        let result = self.fetch(endpoint).await;
        settle(ProbeKind::Http, endpoint, self.timeout, result)
    }
}
