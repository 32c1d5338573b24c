//! Configuration module for pingwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::probe::{ProbeConfig, ProbeKind};

/// File holding the target registry inside the data directory.
pub const REGISTRY_FILE: &str = "servers.json";
/// File holding the event log inside the data directory.
pub const EVENT_LOG_FILE: &str = "monitoring_log.json";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the registry and event log files (default: ".")
    pub data_dir: PathBuf,
    /// Directory the HTML report is written to (default: "reports")
    pub report_dir: PathBuf,
    /// HTTP port for the control API (default: 8080)
    pub http_port: u16,
    /// Probe used for reachability checks
    pub probe: ProbeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            report_dir: PathBuf::from("reports"),
            http_port: 8080,
            probe: ProbeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PINGWATCH_DATA_DIR`: registry and log directory (default: ".")
    /// - `PINGWATCH_REPORT_DIR`: report directory (default: "reports")
    /// - `PINGWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `PINGWATCH_PROBE`: `ping`, `tcp` or `http` (default: "ping")
    /// - `PINGWATCH_PROBE_TIMEOUT`: probe timeout in seconds (default: 4)
    /// - `PINGWATCH_TCP_PORT`: port for TCP probes without one (default: 80)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(dir) = lookup("PINGWATCH_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("PINGWATCH_REPORT_DIR") {
            cfg.report_dir = PathBuf::from(dir);
        }

        if let Some(port) = lookup("PINGWATCH_HTTP_PORT").and_then(|s| s.parse().ok()) {
            cfg.http_port = port;
        }

        if let Some(kind) = lookup("PINGWATCH_PROBE").and_then(|s| s.parse::<ProbeKind>().ok()) {
            cfg.probe.kind = kind;
        }

        if let Some(secs) = lookup("PINGWATCH_PROBE_TIMEOUT")
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s > 0.0)
        {
            cfg.probe.timeout = Duration::from_secs_f64(secs);
        }

        if let Some(port) = lookup("PINGWATCH_TCP_PORT").and_then(|s| s.parse().ok()) {
            cfg.probe.tcp_port = port;
        }

        cfg
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.data_dir.join(EVENT_LOG_FILE)
    }
}
