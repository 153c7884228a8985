//! Real-time event delivery
//!
//! The scheduler and scanner push through [`EventSink`]. [`EventHub`] is the
//! in-process implementation: a broadcast bus that any number of viewers can
//! subscribe to, each receiving an initial snapshot first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::DeviceStore;
use crate::types::{DeviceUpdate, DiscoveredDevice, MonitoredDevice};

/// Everything a new viewer needs before incremental events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub monitored: Vec<MonitoredDevice>,
    pub discovered: Vec<DiscoveredDevice>,
}

impl Snapshot {
    /// Read all monitored devices and all discovered devices excluding monitored ones
    pub async fn collect(store: &dyn DeviceStore) -> Result<Self> {
        let monitored = store.monitored_devices().await.map_err(Error::Store)?;
        let discovered = store.discovered_devices().await.map_err(Error::Store)?;
        Ok(Self { monitored, discovered })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    DeviceUpdate(DeviceUpdate),
    DiscoveredDevice(DiscoveredDevice),
    InitialData(Snapshot),
}

impl Event {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Event::DeviceUpdate(_) => "deviceUpdate",
            Event::DiscoveredDevice(_) => "discoveredDevice",
            Event::InitialData(_) => "initialData",
        }
    }
}

/// Push contract used by the engine
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish the outcome of one health check
    async fn emit_device_update(&self, update: &DeviceUpdate) -> Result<()>;

    /// Publish a discovery record after a sweep sighting
    async fn emit_discovery(&self, device: &DiscoveredDevice) -> Result<()>;
}

/// A fresh subscription: the snapshot to send first, then the live receiver
pub struct Subscription {
    pub snapshot: Snapshot,
    pub receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    pub fn initial_event(&self) -> Event {
        Event::InitialData(self.snapshot.clone())
    }
}

/// Broadcast event bus
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new viewer.
    ///
    /// The receiver is created before the snapshot is read, so nothing that
    /// happens after the snapshot can be missed.
    pub async fn subscribe(&self, store: &dyn DeviceStore) -> Result<Subscription> {
        let receiver = self.tx.subscribe();
        let snapshot = Snapshot::collect(store).await?;
        debug!(
            monitored = snapshot.monitored.len(),
            discovered = snapshot.discovered.len(),
            "new event subscriber"
        );
        Ok(Subscription { snapshot, receiver })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, event: Event) {
        // Ignore errors if there are no receivers
        let _ = self.tx.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for EventHub {
    async fn emit_device_update(&self, update: &DeviceUpdate) -> Result<()> {
        self.publish(Event::DeviceUpdate(update.clone()));
        Ok(())
    }

    async fn emit_discovery(&self, device: &DiscoveredDevice) -> Result<()> {
        self.publish(Event::DiscoveredDevice(device.clone()));
        Ok(())
    }
}
