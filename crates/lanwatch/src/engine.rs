//! Engine lifecycle: register configured devices, run the health-check loop
//! and one discovery loop per subnet, stop everything on shutdown.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::discovery::{MetadataResolver, SubnetScanner, SystemResolver};
use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::prober::{Checker, IcmpChecker, Prober};
use crate::scheduler::HealthScheduler;
use crate::store::DeviceStore;
use crate::types::{NetworkSpec, Section};

const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between the starts of two health-check cycles
    pub check_interval: Duration,
    /// Delay between two checks within a cycle
    pub device_delay: Duration,
    pub icmp_timeout: Duration,
    pub http_timeout: Duration,
    /// Echo timeout used by discovery sweeps
    pub discovery_timeout: Duration,
    pub sections: Vec<Section>,
    pub networks: Vec<NetworkSpec>,
    /// ARP tool invocation used to resolve hardware addresses
    pub arp_command: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            device_delay: Duration::from_millis(crate::DEFAULT_DEVICE_DELAY_MS),
            icmp_timeout: Duration::from_millis(crate::DEFAULT_ICMP_TIMEOUT_MS),
            http_timeout: Duration::from_millis(crate::DEFAULT_HTTP_TIMEOUT_MS),
            discovery_timeout: Duration::from_millis(crate::DEFAULT_DISCOVERY_TIMEOUT_MS),
            sections: Vec::new(),
            networks: Vec::new(),
            arp_command: ["arp-scan", "--localnet", "--numeric", "--quiet"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Owns the scheduler and the scanners and the tasks that drive them
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn DeviceStore>,
    scheduler: Arc<HealthScheduler>,
    scanners: Vec<(Arc<SubnetScanner>, Duration)>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine with the system ICMP/HTTP checkers and resolver
    pub fn new(config: EngineConfig, store: Arc<dyn DeviceStore>, events: Arc<dyn EventSink>) -> Result<Self> {
        let prober = Prober::new(config.icmp_timeout, config.http_timeout)?;
        let discovery_checker: Arc<dyn Checker> = Arc::new(IcmpChecker::new(config.discovery_timeout));
        let resolver: Arc<dyn MetadataResolver> = Arc::new(SystemResolver::new(config.arp_command.clone()));
        Self::with_components(config, prober, discovery_checker, resolver, store, events)
    }

    /// Build an engine from explicit probing components
    pub fn with_components(
        config: EngineConfig,
        prober: Prober,
        discovery_checker: Arc<dyn Checker>,
        resolver: Arc<dyn MetadataResolver>,
        store: Arc<dyn DeviceStore>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        if config.check_interval.is_zero() {
            return Err(Error::ZeroInterval("health-check".to_string()));
        }
        if let Some(network) = config.networks.iter().find(|n| n.scan_interval_secs == 0) {
            return Err(Error::ZeroInterval(format!("scan interval of {}", network.subnet)));
        }

        let scheduler = HealthScheduler::new(prober, store.clone(), events.clone(), config.sections.clone())
            .with_device_delay(config.device_delay);

        let scanners = config
            .networks
            .iter()
            .map(|network| {
                let scanner = SubnetScanner::new(
                    &network.subnet,
                    discovery_checker.clone(),
                    resolver.clone(),
                    store.clone(),
                    events.clone(),
                )?;
                Ok((Arc::new(scanner), Duration::from_secs(network.scan_interval_secs)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            store,
            scheduler: Arc::new(scheduler),
            scanners,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn scheduler(&self) -> &Arc<HealthScheduler> {
        &self.scheduler
    }

    pub fn scanners(&self) -> impl Iterator<Item = &Arc<SubnetScanner>> {
        self.scanners.iter().map(|(scanner, _)| scanner)
    }

    /// Upsert every configured device into the store, returning how many
    pub async fn register_devices(&self) -> Result<usize> {
        let mut registered = 0;
        for section in &self.config.sections {
            for device in &section.devices {
                self.store
                    .upsert_monitored_device(device, &section.name)
                    .await
                    .map_err(Error::Store)?;
                registered += 1;
            }
        }
        info!(devices = registered, sections = self.config.sections.len(), "Registered monitored devices");
        Ok(registered)
    }

    /// Register devices, then start the health-check and discovery loops.
    ///
    /// The first cycle and the first sweep of each subnet start immediately.
    pub async fn start(&self) -> Result<()> {
        self.register_devices().await?;

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(self.scheduler.clone().spawn(self.config.check_interval));
        for (scanner, period) in &self.scanners {
            info!(subnet = %scanner.subnet(), every_secs = period.as_secs(), "Scheduling network discovery");
            tasks.push(scanner.clone().spawn(*period));
        }

        info!(
            check_interval_secs = self.config.check_interval.as_secs(),
            networks = self.scanners.len(),
            "Monitoring engine started"
        );
        Ok(())
    }

    /// Stop every scanner, cancel the periodic loops, then give running
    /// sweeps up to `grace` to end at their next address.
    ///
    /// Calling this twice is harmless.
    pub async fn shutdown(&self, grace: Duration) {
        for (scanner, _) in &self.scanners {
            scanner.stop();
        }
        let aborted = self.abort_tasks();

        let deadline = Instant::now() + grace;
        while self.scanners().any(|s| s.control().is_sweeping()) {
            if Instant::now() >= deadline {
                warn!("Network scan still running at shutdown");
                break;
            }
            sleep(SHUTDOWN_POLL).await;
        }

        info!(tasks = aborted, "Monitoring engine stopped");
    }
}

impl Engine {
    fn abort_tasks(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let count = tasks.len();
        for task in tasks.drain(..) {
            task.abort();
        }
        count
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::ScanState;
    use crate::events::EventHub;
    use crate::prober::{ProbeFailure, Reply};
    use crate::store::MemoryStore;
    use crate::types::{DeviceSpec, ProbeTarget};
    use std::net::Ipv4Addr;

    struct SilentChecker;

    #[async_trait::async_trait]
    impl Checker for SilentChecker {
        async fn check(&self, _target: &ProbeTarget) -> std::result::Result<Reply, ProbeFailure> {
            Err(ProbeFailure::NoReply)
        }
    }

    struct NoMetadata;

    #[async_trait::async_trait]
    impl MetadataResolver for NoMetadata {
        async fn hostname(&self, _ip: Ipv4Addr) -> Option<String> {
            None
        }

        async fn hardware_address(&self, _ip: Ipv4Addr) -> Option<String> {
            None
        }
    }

    fn engine(config: EngineConfig, store: Arc<MemoryStore>) -> Result<Engine> {
        let silent: Arc<dyn Checker> = Arc::new(SilentChecker);
        Engine::with_components(
            config,
            Prober::with_checkers(silent.clone(), silent.clone()),
            silent,
            Arc::new(NoMetadata),
            store,
            Arc::new(EventHub::default()),
        )
    }

    fn config() -> EngineConfig {
        EngineConfig {
            device_delay: Duration::ZERO,
            sections: vec![Section::new(
                "core",
                vec![DeviceSpec::icmp("10.0.0.1", "router"), DeviceSpec::http("10.0.0.2", "nas", 5000)],
            )],
            networks: vec![NetworkSpec { subnet: "10.0.0.0/24".into(), scan_interval_secs: 3600 }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_devices() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(config(), store.clone()).unwrap();

        assert_eq!(engine.register_devices().await.unwrap(), 2);
        assert_eq!(store.monitored_addresses().await.unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_network_rejected() {
        let mut config = config();
        config.networks.push(NetworkSpec { subnet: "bogus".into(), scan_interval_secs: 60 });

        let result = engine(config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(Error::InvalidSubnet { .. })));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = config();
        config.check_interval = Duration::ZERO;
        let result = engine(config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(Error::ZeroInterval(_))));

        let mut config = self::config();
        config.networks[0].scan_interval_secs = 0;
        let result = engine(config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(Error::ZeroInterval(ref what)) if what.contains("10.0.0.0/24")));
    }

    #[tokio::test]
    async fn test_start_then_shutdown_stops_scanners() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(config(), store.clone()).unwrap();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let devices = store.monitored_devices().await.unwrap();
        assert!(devices.iter().all(|d| d.last_checked_at.is_some()));

        engine.shutdown(Duration::from_secs(1)).await;
        assert!(engine.scanners().all(|s| s.state() == ScanState::Stopping));
        assert!(engine.scanners().all(|s| !s.control().is_sweeping()));
        engine.shutdown(Duration::ZERO).await;
    }
}
