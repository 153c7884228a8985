use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use ipnetwork::Ipv4Network;
use tracing::{debug, error, info, warn};

use super::resolver::MetadataResolver;
use super::subnet::{parse_subnet, sweep_addresses};
use crate::error::Result;
use crate::events::EventSink;
use crate::prober::Checker;
use crate::scheduler::periodic;
use crate::store::DeviceStore;
use crate::types::{ProbeTarget, Sighting};

const IDLE: u8 = 0;
const SCANNING: u8 = 1;
const STOPPING: u8 = 2;

/// Lifecycle of a scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No sweep in progress, a new one may start
    Idle,
    /// A sweep is running
    Scanning,
    /// Stop requested; no sweep will start again
    Stopping,
}

/// Result of one call to [`SubnetScanner::scan_network`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every host of the subnet was visited
    Completed { probed: usize, alive: usize },
    /// A stop request ended the sweep between two addresses
    Stopped { probed: usize, alive: usize },
    /// Another sweep of this scanner was already running
    AlreadyRunning,
    /// The scanner had been stopped before the call
    StopRequested,
    /// The monitored-address snapshot could not be read
    Aborted(String),
}

/// Shared handle on a scanner's state.
///
/// Cloning is cheap; every clone controls the same scanner.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    state: Arc<AtomicU8>,
    sweeping: Arc<AtomicBool>,
}

impl ScanControl {
    pub fn state(&self) -> ScanState {
        match self.state.load(Ordering::Acquire) {
            IDLE => ScanState::Idle,
            SCANNING => ScanState::Scanning,
            _ => ScanState::Stopping,
        }
    }

    /// Request that the running sweep end and that no new sweep start
    pub fn stop(&self) {
        self.state.store(STOPPING, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        self.state.load(Ordering::Acquire) == STOPPING
    }

    /// Whether a sweep is still running, including one that was asked to stop
    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    /// Idle -> Scanning, or the state that prevented it
    fn begin(&self) -> std::result::Result<SweepGuard<'_>, ScanState> {
        self.state
            .compare_exchange(IDLE, SCANNING, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| {
                self.sweeping.store(true, Ordering::Release);
                SweepGuard { control: self }
            })
            .map_err(|current| if current == SCANNING { ScanState::Scanning } else { ScanState::Stopping })
    }
}

/// Returns the scanner to Idle when a sweep ends, unless a stop is pending
struct SweepGuard<'a> {
    control: &'a ScanControl,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        let _ = self
            .control
            .state
            .compare_exchange(SCANNING, IDLE, Ordering::AcqRel, Ordering::Acquire);
        self.control.sweeping.store(false, Ordering::Release);
    }
}

/// Discovery scanner for one subnet
pub struct SubnetScanner {
    subnet: String,
    network: Ipv4Network,
    checker: Arc<dyn Checker>,
    resolver: Arc<dyn MetadataResolver>,
    store: Arc<dyn DeviceStore>,
    events: Arc<dyn EventSink>,
    control: ScanControl,
}

impl SubnetScanner {
    /// Fails with [`Error::InvalidSubnet`](crate::Error::InvalidSubnet) when
    /// `subnet` is not an IPv4 network
    pub fn new(
        subnet: &str,
        checker: Arc<dyn Checker>,
        resolver: Arc<dyn MetadataResolver>,
        store: Arc<dyn DeviceStore>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let network = parse_subnet(subnet)?;
        Ok(Self {
            subnet: subnet.trim().to_string(),
            network,
            checker,
            resolver,
            store,
            events,
            control: ScanControl::default(),
        })
    }

    pub fn subnet(&self) -> &str {
        &self.subnet
    }

    pub fn state(&self) -> ScanState {
        self.control.state()
    }

    pub fn control(&self) -> ScanControl {
        self.control.clone()
    }

    /// Stop the running sweep at the next address and refuse later sweeps
    pub fn stop(&self) {
        info!(subnet = %self.subnet, "Stopping network scan");
        self.control.stop();
    }

    /// Sweep the subnet once.
    ///
    /// At most one sweep of a scanner runs at a time; a concurrent call
    /// returns [`ScanOutcome::AlreadyRunning`] without probing anything.
    pub async fn scan_network(&self) -> ScanOutcome {
        let _guard = match self.control.begin() {
            Ok(guard) => guard,
            Err(ScanState::Stopping) => {
                debug!(subnet = %self.subnet, "Scanner stopped, not starting a sweep");
                return ScanOutcome::StopRequested;
            }
            Err(_) => {
                info!(subnet = %self.subnet, "Scan already in progress, skipping");
                return ScanOutcome::AlreadyRunning;
            }
        };

        let monitored = match self.store.monitored_addresses().await {
            Ok(addresses) => addresses,
            Err(e) => {
                error!(subnet = %self.subnet, "Could not read monitored addresses, aborting scan: {e:#}");
                return ScanOutcome::Aborted(format!("{e:#}"));
            }
        };

        info!(subnet = %self.subnet, skipped = monitored.len(), "Starting network scan");
        let outcome = self.sweep(&monitored).await;

        match &outcome {
            ScanOutcome::Completed { probed, alive } => {
                info!(subnet = %self.subnet, probed, alive, "Network scan completed")
            }
            ScanOutcome::Stopped { probed, alive } => {
                info!(subnet = %self.subnet, probed, alive, "Network scan stopped")
            }
            _ => {}
        }
        outcome
    }

    async fn sweep(&self, monitored: &HashSet<String>) -> ScanOutcome {
        let mut probed = 0;
        let mut alive = 0;

        for ip in sweep_addresses(&self.network) {
            if self.control.is_stopping() {
                return ScanOutcome::Stopped { probed, alive };
            }

            let address = ip.to_string();
            if monitored.contains(&address) {
                debug!(address = %address, "Skipping monitored device");
                continue;
            }

            probed += 1;
            match self.checker.check(&ProbeTarget::icmp(address.as_str())).await {
                Ok(_) => {
                    alive += 1;
                    self.record_sighting(ip, address).await;
                }
                Err(failure) => debug!(address = %address, "No response: {failure}"),
            }
        }

        ScanOutcome::Completed { probed, alive }
    }

    async fn record_sighting(&self, ip: Ipv4Addr, address: String) {
        let mut sighting = Sighting::new(address);
        sighting.hostname = self.resolver.hostname(ip).await;
        sighting.hardware_address = self.resolver.hardware_address(ip).await;

        let device = match self.store.upsert_discovered_device(&sighting).await {
            Ok(device) => device,
            Err(e) => {
                warn!(address = %sighting.address, "Could not record discovered device: {e:#}");
                return;
            }
        };

        info!(
            address = %device.address,
            hostname = ?device.hostname,
            mac = ?device.hardware_address,
            seen = device.total_seen_ticks,
            "Discovered device"
        );

        if let Err(e) = self.events.emit_discovery(&device).await {
            warn!(address = %device.address, "Could not publish discovered device: {e}");
        }
    }

    /// Launch a sweep immediately, then once per `period`, until stopped.
    ///
    /// Each sweep runs on its own task, so a sweep that outlasts the period
    /// meets the next launch, which is then skipped.
    pub fn spawn(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = periodic(period);

            loop {
                timer.tick().await;
                if self.control.is_stopping() {
                    break;
                }
                let scanner = Arc::clone(&self);
                tokio::spawn(async move {
                    scanner.scan_network().await;
                });
            }
        })
    }
}
