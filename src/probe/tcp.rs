//! TCP connect probe implementation.

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use super::{settle, Probe, ProbeError, ProbeKind};

/// Measures the time to complete a TCP handshake with the endpoint.
pub struct TcpProbe {
    timeout: Duration,
    default_port: u16,
}

impl TcpProbe {
    pub fn new(timeout: Duration, default_port: u16) -> Self {
        Self {
            timeout,
            default_port,
        }
    }

    /// `host`, `host:port`, `[v6]:port` or a bare IPv6 address.
    fn socket_address(&self, endpoint: &str) -> String {
        if let Ok(ip) = endpoint.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.default_port).to_string();
        }
        if endpoint.parse::<SocketAddr>().is_ok() {
            return endpoint.to_string();
        }
        match endpoint.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
                endpoint.to_string()
            }
            _ => format!("{}:{}", endpoint, self.default_port),
        }
    }

    async fn connect(&self, endpoint: &str) -> Result<Duration, ProbeError> {
        let addr = self.socket_address(endpoint);
        let start = Instant::now();

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))?
            .map_err(|e| ProbeError::Network(format!("connect to {} failed: {}", addr, e)))?;

        let elapsed = start.elapsed();
        drop(stream);
        Ok(elapsed)
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, endpoint: &str) -> Option<Duration> {
        let result = self.connect(endpoint).await;
        settle(ProbeKind::Tcp, endpoint, self.timeout, result)
    }
}
