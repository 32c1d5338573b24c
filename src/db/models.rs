//! Persisted data model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One probe result for an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Round-trip time of a successful probe, `None` when unreachable.
    #[serde(with = "optional_seconds")]
    pub response_time: Option<Duration>,
}

impl Observation {
    /// Latencies are kept at microsecond precision, which the file format preserves exactly.
    pub fn new(timestamp: DateTime<Utc>, response_time: Option<Duration>) -> Self {
        Self {
            timestamp,
            response_time: response_time.map(|d| Duration::from_micros(d.as_micros() as u64)),
        }
    }

    pub fn status(&self) -> Status {
        if self.response_time.is_some() {
            Status::Online
        } else {
            Status::Offline
        }
    }
}

/// Check history of a registered endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    #[serde(default)]
    pub checks: Vec<Observation>,
}

/// Reachability classification of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Online => "online",
            Status::Offline => "offline",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flat event log record, used for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "server")]
    pub endpoint: String,
    pub status: Status,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn from_observation(endpoint: &str, observation: &Observation) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            status: observation.status(),
            timestamp: observation.timestamp,
        }
    }
}

/// Timestamps are written as RFC 3339. Files from older releases hold `ctime` strings
/// such as `Mon Oct 19 09:00:00 2026` in local time, which are accepted on read.
mod timestamp {
    use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    const CTIME: &str = "%a %b %e %H:%M:%S %Y";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        value.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {:?}", raw)))
    }

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = raw.parse::<DateTime<FixedOffset>>() {
            return Some(ts.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(raw.trim(), CTIME).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Latencies are stored as fractional seconds, `null` for an unreachable probe.
mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        match secs {
            Some(s) if s.is_finite() && s >= 0.0 => {
                Ok(Some(Duration::from_micros((s * 1e6).round() as u64)))
            }
            Some(s) => Err(serde::de::Error::custom(format!(
                "invalid response time: {}",
                s
            ))),
            None => Ok(None),
        }
    }
}
