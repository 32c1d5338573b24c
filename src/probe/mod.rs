//! Probe adapters for reachability checks.
//!
//! Supports ICMP ping, TCP connect and HTTP GET probes.

mod http;
mod ping;
mod tcp;

pub use http::*;
pub use ping::*;
pub use tcp::*;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("command failed: {0}")]
    Command(String),
}

/// A reachability check against a single endpoint.
///
/// Returns the measured latency, or `None` when the endpoint did not answer. The reason
/// for a failure is not surfaced to callers.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, endpoint: &str) -> Option<Duration>;
}

/// Fold a detailed probe result into the reachable/unreachable contract.
pub(crate) fn settle(
    kind: ProbeKind,
    endpoint: &str,
    timeout: Duration,
    result: Result<Duration, ProbeError>,
) -> Option<Duration> {
    match result {
        Ok(latency) if latency >= timeout => {
            tracing::debug!("{} probe for {} exceeded {:?}", kind, endpoint, timeout);
            None
        }
        Ok(latency) => Some(latency),
        Err(e) => {
            tracing::debug!("{} probe for {} failed: {}", kind, endpoint, e);
            None
        }
    }
}

/// Available probe implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    Ping,
    Tcp,
    Http,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Ping => "ping",
            ProbeKind::Tcp => "tcp",
            ProbeKind::Http => "http",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ping" | "icmp" => Ok(ProbeKind::Ping),
            "tcp" => Ok(ProbeKind::Tcp),
            "http" => Ok(ProbeKind::Http),
            other => Err(ProbeError::Config(format!("unknown probe type: {}", other))),
        }
    }
}

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub kind: ProbeKind,
    pub timeout: Duration,
    /// Port used by the TCP probe when the endpoint does not name one.
    pub tcp_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Ping,
            timeout: Duration::from_secs(4),
            tcp_port: 80,
        }
    }
}

/// Build the probe adapter described by `config`.
pub fn build_probe(config: &ProbeConfig) -> Result<Arc<dyn Probe>, ProbeError> {
    let probe: Arc<dyn Probe> = match config.kind {
        ProbeKind::Ping => Arc::new(PingProbe::new(config.timeout)),
        ProbeKind::Tcp => Arc::new(TcpProbe::new(config.timeout, config.tcp_port)),
        ProbeKind::Http => Arc::new(HttpProbe::new(config.timeout)?),
    };
    Ok(probe)
}
