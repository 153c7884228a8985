//! Lanwatch - network device monitoring and subnet discovery engine
//!
//! This library walks a configured list of devices on a schedule (ICMP ping or
//! HTTP health check) and sweeps subnets for devices that are not yet under
//! explicit monitoring. Persistence and real-time delivery are reached through
//! the [`DeviceStore`] and [`EventSink`] traits.

pub mod discovery;
pub mod engine;
pub mod error;
pub mod events;
pub mod prober;
pub mod scheduler;
pub mod store;
pub mod types;

// Re-export main types
pub use discovery::{MetadataResolver, ScanControl, ScanOutcome, ScanState, SubnetScanner, SystemResolver};
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
pub use events::{Event, EventHub, EventSink, Snapshot, Subscription};
pub use prober::{Checker, HttpChecker, IcmpChecker, ProbeFailure, Prober};
pub use scheduler::HealthScheduler;
pub use store::{DeviceStore, MemoryStore};
pub use types::{
    CheckResult, DeviceSpec, DeviceUpdate, DiscoveredDevice, MonitoredDevice, NetworkSpec,
    ProbeTarget, Protocol, Section, Sighting,
};

/// Default delay inserted between two health checks of the same cycle
pub const DEFAULT_DEVICE_DELAY_MS: u64 = 1000;

/// Default timeout for a monitoring ICMP echo
pub const DEFAULT_ICMP_TIMEOUT_MS: u64 = 1000;

/// Default timeout for an HTTP health check
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

/// Default timeout for a discovery ICMP echo
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 1000;

/// Default interval between two sweeps of the same subnet
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;
