use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol used to health-check a monitored device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Icmp,
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "icmp"),
            Protocol::Http => write!(f, "http"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "icmp" => Ok(Protocol::Icmp),
            "http" => Ok(Protocol::Http),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

fn default_scan_interval() -> u64 {
    crate::DEFAULT_SCAN_INTERVAL_SECS
}

/// A device as declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    #[serde(alias = "ip")]
    pub address: String,
    pub name: String,
    #[serde(alias = "type")]
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_path", alias = "endpoint")]
    pub path: String,
}

impl DeviceSpec {
    pub fn icmp(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            protocol: Protocol::Icmp,
            port: None,
            path: default_path(),
        }
    }

    pub fn http(address: impl Into<String>, name: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            protocol: Protocol::Http,
            port: Some(port),
            path: default_path(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// A named group of devices; declaration order is check order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

impl Section {
    pub fn new(name: impl Into<String>, devices: Vec<DeviceSpec>) -> Self {
        Self { name: name.into(), devices }
    }
}

/// A subnet to sweep for unmonitored devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub subnet: String,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
}

/// What the prober needs to know to check one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub address: String,
    pub protocol: Protocol,
    pub port: Option<u16>,
    pub path: String,
}

impl ProbeTarget {
    /// Plain ICMP liveness target, as used by discovery sweeps
    pub fn icmp(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            protocol: Protocol::Icmp,
            port: None,
            path: default_path(),
        }
    }

    /// URL requested by an HTTP check; the port defaults to 80 and IPv6
    /// literals are bracketed
    pub fn url(&self) -> String {
        let port = self.port.unwrap_or(80);
        let host = if self.address.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.address)
        } else {
            self.address.clone()
        };
        let slash = if self.path.starts_with('/') { "" } else { "/" };
        format!("http://{host}:{port}{slash}{}", self.path)
    }
}

impl From<&DeviceSpec> for ProbeTarget {
    fn from(spec: &DeviceSpec) -> Self {
        Self {
            address: spec.address.clone(),
            protocol: spec.protocol,
            port: spec.port,
            path: spec.path.clone(),
        }
    }
}

/// Result of a single probe. Never persisted as its own entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// Address that was probed
    pub address: String,

    pub is_alive: bool,

    /// Round-trip time, ICMP only
    pub latency_ms: Option<f64>,

    /// HTTP status code, HTTP only
    pub status_code: Option<u16>,

    /// Error message when the probe failed at transport level
    pub error: Option<String>,

    pub observed_at: DateTime<Utc>,
}

impl CheckResult {
    /// Create a new, not-yet-alive result stamped with the current time
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            is_alive: false,
            latency_ms: None,
            status_code: None,
            error: None,
            observed_at: Utc::now(),
        }
    }

    /// Mark the check as successful
    pub fn alive(mut self, latency_ms: Option<f64>, status_code: Option<u16>) -> Self {
        self.is_alive = true;
        self.latency_ms = latency_ms;
        self.status_code = status_code;
        self.error = None;
        self
    }

    /// Mark the check as failed with an error
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.is_alive = false;
        self.latency_ms = None;
        self.status_code = None;
        self.error = Some(error.into());
        self
    }

    /// Mark the check as failed because the server answered with a non-2xx status
    pub fn rejected(mut self, status_code: u16) -> Self {
        self.is_alive = false;
        self.latency_ms = None;
        self.status_code = Some(status_code);
        self.error = None;
        self
    }
}

/// A monitored device with its last known status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredDevice {
    pub address: String,
    pub name: String,
    #[serde(rename = "type")]
    pub protocol: Protocol,
    pub section: String,
    pub port: Option<u16>,
    pub path: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_alive: bool,
    pub last_latency_ms: Option<f64>,
    pub last_status_code: Option<u16>,
    pub last_error: Option<String>,
    /// Lifetime count of cycles in which the device answered
    pub uptime_ticks: u64,
}

impl MonitoredDevice {
    /// A freshly registered device that has never been checked
    pub fn registered(spec: &DeviceSpec, section: &str) -> Self {
        Self {
            address: spec.address.clone(),
            name: spec.name.clone(),
            protocol: spec.protocol,
            section: section.to_string(),
            port: spec.port,
            path: spec.path.clone(),
            last_checked_at: None,
            last_alive: false,
            last_latency_ms: None,
            last_status_code: None,
            last_error: None,
            uptime_ticks: 0,
        }
    }

    /// Refresh the static fields from configuration, keeping status untouched
    pub fn reconfigure(&mut self, spec: &DeviceSpec, section: &str) {
        self.name = spec.name.clone();
        self.protocol = spec.protocol;
        self.section = section.to_string();
        self.port = spec.port;
        self.path = spec.path.clone();
    }

    /// Merge a check result into the status fields.
    ///
    /// `uptime_ticks` grows by one iff the device was alive and is never reset.
    pub fn apply(&mut self, result: &CheckResult) {
        self.last_checked_at = Some(result.observed_at);
        self.last_alive = result.is_alive;
        self.last_latency_ms = result.latency_ms;
        self.last_status_code = result.status_code;
        self.last_error = result.error.clone();
        if result.is_alive {
            self.uptime_ticks += 1;
        }
    }
}

/// One sighting of a live address during a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub address: String,
    pub hostname: Option<String>,
    pub hardware_address: Option<String>,
    pub seen_at: DateTime<Utc>,
}

impl Sighting {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            hostname: None,
            hardware_address: None,
            seen_at: Utc::now(),
        }
    }
}

/// An address seen alive during a sweep that is not explicitly monitored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub address: String,
    pub hostname: Option<String>,
    pub hardware_address: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub total_seen_ticks: u64,
}

impl DiscoveredDevice {
    pub fn first_sighting(sighting: &Sighting) -> Self {
        Self {
            address: sighting.address.clone(),
            hostname: sighting.hostname.clone(),
            hardware_address: sighting.hardware_address.clone(),
            first_seen_at: sighting.seen_at,
            last_seen_at: sighting.seen_at,
            total_seen_ticks: 1,
        }
    }

    /// Merge a later sighting: metadata is only overwritten by non-null values
    pub fn record(&mut self, sighting: &Sighting) {
        self.last_seen_at = sighting.seen_at;
        self.total_seen_ticks += 1;
        if sighting.hostname.is_some() {
            self.hostname = sighting.hostname.clone();
        }
        if sighting.hardware_address.is_some() {
            self.hardware_address = sighting.hardware_address.clone();
        }
    }
}

/// Per-device update pushed after every health check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    #[serde(flatten)]
    pub result: CheckResult,
    pub name: String,
    pub section: String,
    #[serde(rename = "type")]
    pub protocol: Protocol,
    pub port: Option<u16>,
    pub path: String,
}

impl DeviceUpdate {
    pub fn new(result: CheckResult, spec: &DeviceSpec, section: &str) -> Self {
        Self {
            result,
            name: spec.name.clone(),
            section: section.to_string(),
            protocol: spec.protocol,
            port: spec.port,
            path: spec.path.clone(),
        }
    }
}
