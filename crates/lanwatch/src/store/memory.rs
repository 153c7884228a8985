//! In-memory device store

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::DeviceStore;
use crate::types::{CheckResult, DeviceSpec, DiscoveredDevice, MonitoredDevice, Sighting};

/// Device store kept in process memory, mostly useful for tests and dry runs
#[derive(Clone, Default)]
pub struct MemoryStore {
    monitored: Arc<RwLock<HashMap<String, MonitoredDevice>>>,
    discovered: Arc<RwLock<HashMap<String, DiscoveredDevice>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn upsert_monitored_device(&self, device: &DeviceSpec, section: &str) -> Result<()> {
        let mut monitored = self.monitored.write().await;
        monitored
            .entry(device.address.clone())
            .and_modify(|existing| existing.reconfigure(device, section))
            .or_insert_with(|| MonitoredDevice::registered(device, section));
        Ok(())
    }

    async fn monitored_devices(&self) -> Result<Vec<MonitoredDevice>> {
        let monitored = self.monitored.read().await;
        let mut devices: Vec<MonitoredDevice> = monitored.values().cloned().collect();
        devices.sort_by(|a, b| a.section.cmp(&b.section).then_with(|| a.name.cmp(&b.name)));
        Ok(devices)
    }

    async fn update_monitored_status(&self, result: &CheckResult) -> Result<()> {
        let mut monitored = self.monitored.write().await;
        match monitored.get_mut(&result.address) {
            Some(device) => {
                device.apply(result);
                Ok(())
            }
            None => bail!("monitored device {} is not registered", result.address),
        }
    }

    async fn discovered_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        let monitored = self.monitored.read().await;
        let discovered = self.discovered.read().await;

        let mut devices: Vec<DiscoveredDevice> = discovered
            .values()
            .filter(|device| !monitored.contains_key(&device.address))
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        Ok(devices)
    }

    async fn upsert_discovered_device(&self, sighting: &Sighting) -> Result<DiscoveredDevice> {
        let mut discovered = self.discovered.write().await;
        let device = discovered
            .entry(sighting.address.clone())
            .and_modify(|existing| existing.record(sighting))
            .or_insert_with(|| DiscoveredDevice::first_sighting(sighting));
        Ok(device.clone())
    }

    async fn monitored_addresses(&self) -> Result<HashSet<String>> {
        Ok(self.monitored.read().await.keys().cloned().collect())
    }
}
