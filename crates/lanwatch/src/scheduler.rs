use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval, sleep};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::events::EventSink;
use crate::prober::Prober;
use crate::store::DeviceStore;
use crate::types::{CheckResult, DeviceSpec, DeviceUpdate, ProbeTarget, Section};

/// Summary of one health-check cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices probed during the cycle
    pub checked: usize,
    /// Devices that answered
    pub alive: usize,
    /// Devices whose store write or event emission failed
    pub failures: usize,
}

/// Health-check scheduler - walks the monitored devices once per cycle.
///
/// Checks within a cycle run strictly one after another, in section order and
/// declaration order, with a fixed delay between two checks. A failure while
/// persisting or publishing one device is logged and never stops the cycle.
pub struct HealthScheduler {
    prober: Prober,
    store: Arc<dyn DeviceStore>,
    events: Arc<dyn EventSink>,
    sections: Vec<Section>,
    device_delay: Duration,
}

impl HealthScheduler {
    /// Create a new scheduler over the configured sections
    pub fn new(
        prober: Prober,
        store: Arc<dyn DeviceStore>,
        events: Arc<dyn EventSink>,
        sections: Vec<Section>,
    ) -> Self {
        Self {
            prober,
            store,
            events,
            sections,
            device_delay: Duration::from_millis(crate::DEFAULT_DEVICE_DELAY_MS),
        }
    }

    /// Set the delay inserted between two consecutive checks
    pub fn with_device_delay(mut self, delay: Duration) -> Self {
        self.device_delay = delay;
        self
    }

    /// Run one full pass over every configured device
    pub async fn run_cycle(&self) -> CycleReport {
        info!("Starting monitoring cycle...");
        let mut report = CycleReport::default();

        let mut first = true;
        for section in &self.sections {
            for spec in &section.devices {
                if !first && !self.device_delay.is_zero() {
                    sleep(self.device_delay).await;
                }
                first = false;

                report.checked += 1;
                match self.check_device(spec, &section.name).await {
                    Ok(result) => {
                        if result.is_alive {
                            report.alive += 1;
                        }
                    }
                    Err(e) => {
                        report.failures += 1;
                        warn!(address = %spec.address, name = %spec.name, "health check not recorded: {e}");
                    }
                }
            }
        }

        info!(
            checked = report.checked,
            alive = report.alive,
            failures = report.failures,
            "Monitoring cycle completed"
        );
        report
    }

    /// Probe one device, persist the result, then publish it
    async fn check_device(&self, spec: &DeviceSpec, section: &str) -> Result<CheckResult> {
        let result = self.prober.probe(&ProbeTarget::from(spec)).await;

        info!(
            name = %spec.name,
            address = %spec.address,
            protocol = %spec.protocol,
            alive = result.is_alive,
            latency_ms = ?result.latency_ms,
            status_code = ?result.status_code,
            error = ?result.error,
            "Device status"
        );

        self.store.update_monitored_status(&result).await.map_err(Error::Store)?;

        let update = DeviceUpdate::new(result.clone(), spec, section);
        self.events.emit_device_update(&update).await?;

        Ok(result)
    }

    /// Run a cycle immediately, then once per `period`.
    ///
    /// Each cycle runs in its own task and the loop waits for it, so cycles
    /// never overlap and a cycle that panics is logged and retried on the next
    /// tick. Ticks missed while a cycle runs are skipped.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = periodic(period);

            loop {
                timer.tick().await;
                let scheduler = Arc::clone(&self);
                let mut cycle = CycleTask(tokio::spawn(async move { scheduler.run_cycle().await }));
                if let Err(e) = (&mut cycle.0).await {
                    error!("monitoring cycle aborted: {e}");
                }
            }
        })
    }
}

/// Aborts the running cycle when the loop itself is cancelled
struct CycleTask(JoinHandle<CycleReport>);

impl Drop for CycleTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Interval timer for the periodic loops; a zero period is raised to 1 ms
/// since `tokio::time::interval` rejects it.
pub(crate) fn periodic(period: Duration) -> Interval {
    let period = if period.is_zero() {
        warn!("zero period requested for a periodic loop, using 1ms");
        Duration::from_millis(1)
    } else {
        period
    };
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventHub};
    use crate::prober::{Checker, ProbeFailure, Reply};
    use crate::store::MemoryStore;
    use crate::types::DiscoveredDevice;
    use std::sync::Mutex;

    /// Records probe order and answers "alive" for addresses in `alive`
    struct RecordingChecker {
        alive: Vec<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Checker for RecordingChecker {
        async fn check(&self, target: &ProbeTarget) -> std::result::Result<Reply, ProbeFailure> {
            self.seen.lock().unwrap().push(target.address.clone());
            if self.alive.contains(&target.address.as_str()) {
                Ok(Reply { latency_ms: Some(1.0), status_code: None })
            } else {
                Err(ProbeFailure::NoReply)
            }
        }
    }

    struct FailingSink;

    #[async_trait::async_trait]
    impl EventSink for FailingSink {
        async fn emit_device_update(&self, _update: &DeviceUpdate) -> Result<()> {
            Err(Error::Transport("viewer gone".to_string()))
        }

        async fn emit_discovery(&self, _device: &DiscoveredDevice) -> Result<()> {
            Err(Error::Transport("viewer gone".to_string()))
        }
    }

    fn sections() -> Vec<Section> {
        vec![
            Section::new(
                "network",
                vec![DeviceSpec::icmp("10.0.0.1", "router"), DeviceSpec::icmp("10.0.0.2", "switch")],
            ),
            Section::new("servers", vec![DeviceSpec::icmp("10.0.0.10", "nas")]),
        ]
    }

    async fn seeded_store(sections: &[Section]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for section in sections {
            for spec in &section.devices {
                store.upsert_monitored_device(spec, &section.name).await.unwrap();
            }
        }
        store
    }

    fn scheduler(
        checker: Arc<RecordingChecker>,
        store: Arc<MemoryStore>,
        events: Arc<dyn EventSink>,
        sections: Vec<Section>,
    ) -> HealthScheduler {
        let prober = Prober::with_checkers(checker.clone(), checker);
        HealthScheduler::new(prober, store, events, sections).with_device_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_cycle_checks_in_section_order_and_publishes() {
        let checker = Arc::new(RecordingChecker { alive: vec!["10.0.0.1"], seen: Mutex::new(Vec::new()) });
        let store = seeded_store(&sections()).await;
        let hub = EventHub::new(16);
        let mut subscription = hub.subscribe(store.as_ref()).await.unwrap();

        let scheduler = scheduler(checker.clone(), store.clone(), Arc::new(hub), sections());
        let report = scheduler.run_cycle().await;

        assert_eq!(report, CycleReport { checked: 3, alive: 1, failures: 0 });
        assert_eq!(*checker.seen.lock().unwrap(), ["10.0.0.1", "10.0.0.2", "10.0.0.10"]);

        let first = subscription.receiver.recv().await.unwrap();
        match first {
            Event::DeviceUpdate(update) => {
                assert_eq!(update.result.address, "10.0.0.1");
                assert_eq!(update.section, "network");
                assert_eq!(update.name, "router");
                assert!(update.result.is_alive);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_uptime_accumulates_across_cycles() {
        let checker = Arc::new(RecordingChecker { alive: vec!["10.0.0.1"], seen: Mutex::new(Vec::new()) });
        let store = seeded_store(&sections()).await;
        let scheduler = scheduler(checker, store.clone(), Arc::new(EventHub::new(4)), sections());

        for _ in 0..3 {
            scheduler.run_cycle().await;
        }

        let devices = store.monitored_devices().await.unwrap();
        let router = devices.iter().find(|d| d.address == "10.0.0.1").unwrap();
        let switch = devices.iter().find(|d| d.address == "10.0.0.2").unwrap();
        assert_eq!(router.uptime_ticks, 3);
        assert_eq!(switch.uptime_ticks, 0);
        assert_eq!(switch.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_cycle() {
        let checker = Arc::new(RecordingChecker { alive: vec![], seen: Mutex::new(Vec::new()) });
        let mut configured = sections();
        // Not registered in the store, so its status write fails
        configured[0].devices.insert(0, DeviceSpec::icmp("10.0.0.99", "ghost"));
        let store = seeded_store(&sections()).await;

        let scheduler = scheduler(checker.clone(), store, Arc::new(EventHub::new(4)), configured);
        let report = scheduler.run_cycle().await;

        assert_eq!(report.checked, 4);
        assert_eq!(report.failures, 1);
        assert_eq!(checker.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_persisted_status() {
        let checker = Arc::new(RecordingChecker { alive: vec!["10.0.0.1", "10.0.0.2"], seen: Mutex::new(Vec::new()) });
        let store = seeded_store(&sections()).await;

        let scheduler = scheduler(checker, store.clone(), Arc::new(FailingSink), sections());
        let report = scheduler.run_cycle().await;

        assert_eq!(report.failures, 3);
        let devices = store.monitored_devices().await.unwrap();
        assert_eq!(devices.iter().filter(|d| d.uptime_ticks == 1).count(), 2);
    }

    #[tokio::test]
    async fn test_device_delay_spaces_out_checks() {
        let checker = Arc::new(RecordingChecker { alive: vec![], seen: Mutex::new(Vec::new()) });
        let store = seeded_store(&sections()).await;
        let prober = Prober::with_checkers(checker.clone(), checker);
        let scheduler = HealthScheduler::new(prober, store, Arc::new(EventHub::new(4)), sections())
            .with_device_delay(Duration::from_millis(50));

        let started = std::time::Instant::now();
        scheduler.run_cycle().await;

        // Three devices, two gaps
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_spawn_runs_first_cycle_immediately() {
        let checker = Arc::new(RecordingChecker { alive: vec![], seen: Mutex::new(Vec::new()) });
        let store = seeded_store(&sections()).await;
        let scheduler = Arc::new(scheduler(checker.clone(), store, Arc::new(EventHub::new(4)), sections()));

        let handle = scheduler.spawn(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert_eq!(checker.seen.lock().unwrap().len(), 3);
    }

    /// Panics on its very first check, then answers normally
    #[derive(Default)]
    struct PanicOnceChecker {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Checker for PanicOnceChecker {
        async fn check(&self, _target: &ProbeTarget) -> std::result::Result<Reply, ProbeFailure> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                panic!("checker blew up");
            }
            Ok(Reply { latency_ms: Some(1.0), status_code: None })
        }
    }

    #[tokio::test]
    async fn test_panicking_cycle_is_retried_on_next_tick() {
        let checker = Arc::new(PanicOnceChecker::default());
        let store = seeded_store(&sections()).await;
        let prober = Prober::with_checkers(checker.clone(), checker.clone());
        let scheduler = Arc::new(
            HealthScheduler::new(prober, store.clone(), Arc::new(EventHub::new(16)), sections())
                .with_device_delay(Duration::ZERO),
        );

        let handle = scheduler.spawn(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!handle.is_finished());
        assert!(checker.calls.load(std::sync::atomic::Ordering::SeqCst) > 1);
        let devices = store.monitored_devices().await.unwrap();
        assert!(devices.iter().all(|d| d.uptime_ticks >= 1));
        handle.abort();
    }

    #[tokio::test]
    async fn test_zero_period_does_not_kill_loop() {
        let checker = Arc::new(RecordingChecker { alive: vec![], seen: Mutex::new(Vec::new()) });
        let store = seeded_store(&sections()).await;
        let scheduler = Arc::new(scheduler(checker.clone(), store, Arc::new(EventHub::new(64)), sections()));

        let handle = scheduler.spawn(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!handle.is_finished());
        assert!(checker.seen.lock().unwrap().len() >= 3);
        handle.abort();
    }
}
