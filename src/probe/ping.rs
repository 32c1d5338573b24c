//! ICMP echo probe with native sockets and a `ping` command fallback.
//!
//! Native pings run on the blocking pool so the round-trip timing is not skewed by the
//! async scheduler.

use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::{settle, Probe, ProbeError, ProbeKind};

const ECHO_PACKET_LEN: usize = 64;

static NATIVE_ICMP: OnceLock<bool> = OnceLock::new();

static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// ICMP echo probe.
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn ping(&self, endpoint: &str) -> Result<Duration, ProbeError> {
        if !*NATIVE_ICMP.get_or_init(detect_native_icmp) {
            return run_ping_command(endpoint, self.timeout).await;
        }

        let ip = resolve_address(endpoint).await?;
        let timeout = self.timeout;
        let result = tokio::task::spawn_blocking(move || blocking_echo(ip, timeout))
            .await
            .map_err(|e| ProbeError::Network(format!("spawn_blocking failed: {}", e)))?;

        match result {
            Err(ProbeError::Network(msg)) if is_permission_error(&msg) => {
                tracing::warn!(
                    "Native ping to {} not permitted, falling back to command: {}",
                    endpoint,
                    msg
                );
                run_ping_command(endpoint, self.timeout).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl Probe for PingProbe {
    async fn probe(&self, endpoint: &str) -> Option<Duration> {
        let result = self.ping(endpoint).await;
        settle(ProbeKind::Ping, endpoint, self.timeout, result)
    }
}

/// Raw sockets need CAP_NET_RAW; datagram ICMP sockets work unprivileged where allowed.
fn detect_native_icmp() -> bool {
    if open_icmp_socket(Domain::IPV4).is_ok() {
        tracing::info!("Ping probe: using native ICMP sockets");
        true
    } else {
        tracing::info!("Ping probe: native ICMP unavailable, using the ping command");
        false
    }
}

fn open_icmp_socket(domain: Domain) -> io::Result<Socket> {
    let protocol = if domain == Domain::IPV6 {
        Protocol::ICMPV6
    } else {
        Protocol::ICMPV4
    };
    Socket::new(domain, Type::RAW, Some(protocol))
        .or_else(|_| Socket::new(domain, Type::DGRAM, Some(protocol)))
}

fn is_permission_error(msg: &str) -> bool {
    msg.contains("Permission") || msg.contains("not permitted") || msg.contains("denied")
}

async fn resolve_address(endpoint: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = endpoint.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host(format!("{}:0", endpoint))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("no addresses found for {}", endpoint)))
}

/// Send one echo request and wait for the matching reply.
fn blocking_echo(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    let (domain, request_type, reply_type) = match ip {
        IpAddr::V4(_) => (Domain::IPV4, 8u8, 0u8),
        IpAddr::V6(_) => (Domain::IPV6, 128u8, 129u8),
    };

    let net_err = |what: &str, e: io::Error| ProbeError::Network(format!("{}: {}", what, e));

    let mut socket =
        open_icmp_socket(domain).map_err(|e| net_err("failed to open ICMP socket", e))?;
    socket
        .set_write_timeout(Some(timeout))
        .map_err(|e| net_err("failed to set timeout", e))?;
    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| net_err("failed to connect", e))?;

    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let packet = build_echo_request(request_type, identifier, sequence, ip.is_ipv4());

    let start = Instant::now();
    socket
        .send(&packet)
        .map_err(|e| net_err("failed to send", e))?;

    let mut buf = [0u8; 1500];
    loop {
        let remaining = timeout
            .checked_sub(start.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or(ProbeError::Timeout(timeout))?;
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| net_err("failed to set timeout", e))?;

        let len = socket.read(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ProbeError::Timeout(timeout),
            _ => net_err("failed to receive", e),
        })?;
        let elapsed = start.elapsed();

        if is_echo_reply(&buf[..len], reply_type, identifier, sequence) {
            return Ok(elapsed);
        }
        // Someone else's reply; keep waiting for ours
    }
}

/// Check an incoming packet against the request we sent.
///
/// Raw IPv4 sockets deliver the IP header too, datagram sockets start at the ICMP header.
/// Datagram sockets may rewrite the identifier, so only raw replies are matched on it.
fn is_echo_reply(packet: &[u8], reply_type: u8, identifier: u16, sequence: u16) -> bool {
    let (icmp, raw) = match packet.first() {
        Some(b) if reply_type == 0 && b >> 4 == 4 => {
            let header_len = usize::from(b & 0x0f) * 4;
            (packet.get(header_len..).unwrap_or_default(), true)
        }
        _ => (packet, false),
    };

    if icmp.len() < 8 || icmp[0] != reply_type {
        return false;
    }
    let reply_id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let reply_seq = u16::from_be_bytes([icmp[6], icmp[7]]);
    reply_seq == sequence && (!raw || reply_id == identifier)
}

/// Build an echo request. The ICMPv6 checksum is filled in by the kernel.
fn build_echo_request(icmp_type: u8, identifier: u16, sequence: u16, checksum: bool) -> Vec<u8> {
    let mut packet = vec![0u8; ECHO_PACKET_LEN];
    packet[0] = icmp_type;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let stamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    packet[8..16].copy_from_slice(&stamp.to_be_bytes());

    if checksum {
        let sum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&sum.to_be_bytes());
    }
    packet
}

/// Internet checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

async fn run_ping_command(endpoint: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let timeout_secs = timeout.as_secs().max(1);

    let output = Command::new("ping")
        .args(["-c", "1", "-W", &timeout_secs.to_string(), endpoint])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("timeout")
            || stdout.contains("100% packet loss")
            || stdout.contains("100.0% packet loss")
        {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Command(format!("ping failed: {}", stdout.trim())));
    }

    parse_ping_output(&stdout)
}

/// Extract the round-trip time from `ping` output.
///
/// Prefers the per-reply `time=` field, then the average of the summary line
/// (`rtt min/avg/max/mdev` on Linux, `round-trip min/avg/max/stddev` on BSD/macOS).
fn parse_ping_output(output: &str) -> Result<Duration, ProbeError> {
    static REPLY: OnceLock<Option<Regex>> = OnceLock::new();
    static SUMMARY: OnceLock<Option<Regex>> = OnceLock::new();

    let reply = REPLY.get_or_init(|| Regex::new(r"time[=<](?P<ms>[0-9.]+)\s*ms").ok());
    let summary = SUMMARY.get_or_init(|| {
        Regex::new(
            r"(?:rtt|round-trip)\s+min/avg/max/(?:mdev|stddev)\s*=\s*[0-9.]+/(?P<ms>[0-9.]+)/",
        )
        .ok()
    });

    [reply, summary]
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(output)?.name("ms")?.as_str().parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .map(|ms| Duration::from_micros((ms * 1000.0).round() as u64))
        .ok_or_else(|| ProbeError::Command(format!("failed to parse ping output: {}", output)))
}
