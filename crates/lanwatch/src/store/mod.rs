/// Device store abstraction
///
/// The engine reads and writes device records only through [`DeviceStore`].
/// Any backing store must keep the merge rules: uptime counters are never
/// reset, discovery upserts increment the sighting counter and only overwrite
/// metadata with non-null values, and discovered listings exclude monitored
/// addresses at query time.
pub mod memory;

pub use memory::MemoryStore;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{CheckResult, DeviceSpec, DiscoveredDevice, MonitoredDevice, Sighting};

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Register a monitored device, or refresh its static fields (keyed by address)
    async fn upsert_monitored_device(&self, device: &DeviceSpec, section: &str) -> Result<()>;

    /// All monitored devices ordered by section, then name
    async fn monitored_devices(&self) -> Result<Vec<MonitoredDevice>>;

    /// Merge a check result into the status fields of a monitored device
    async fn update_monitored_status(&self, result: &CheckResult) -> Result<()>;

    /// Discovered devices whose address is not monitored, most recently seen first
    async fn discovered_devices(&self) -> Result<Vec<DiscoveredDevice>>;

    /// Create or update the discovery record of a sighted address
    async fn upsert_discovered_device(&self, sighting: &Sighting) -> Result<DiscoveredDevice>;

    /// Addresses currently under monitoring
    async fn monitored_addresses(&self) -> Result<HashSet<String>>;
}
