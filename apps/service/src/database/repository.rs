use std::collections::HashSet;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lanwatch::{
    CheckResult, DeviceSpec, DeviceStore, DiscoveredDevice, MonitoredDevice, Protocol, Sighting,
};
use libsql::{Row, params};

use crate::pool::{LibsqlManager, LibsqlPool};

const MONITORED_COLUMNS: &str = "address, name, protocol, section, port, path, last_checked_at, last_alive, \
     last_latency_ms, last_status_code, last_error, uptime_ticks";

const DISCOVERED_COLUMNS: &str =
    "address, hostname, hardware_address, first_seen_at, last_seen_at, total_seen_ticks";

/// Device store backed by a pooled libsql database
#[derive(Clone)]
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow!("could not get a database connection: {e}"))
    }
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn monitored_from_row(row: &Row) -> Result<MonitoredDevice> {
    let protocol: String = row.get(2)?;
    let last_checked_at: Option<i64> = row.get(6)?;

    Ok(MonitoredDevice {
        address: row.get(0)?,
        name: row.get(1)?,
        protocol: protocol.parse::<Protocol>().map_err(|e| anyhow!(e))?,
        section: row.get(3)?,
        port: row.get::<Option<i64>>(4)?.map(u16::try_from).transpose()?,
        path: row.get(5)?,
        last_checked_at: last_checked_at.map(from_millis).transpose()?,
        last_alive: row.get::<i64>(7)? != 0,
        last_latency_ms: row.get(8)?,
        last_status_code: row.get::<Option<i64>>(9)?.map(u16::try_from).transpose()?,
        last_error: row.get(10)?,
        uptime_ticks: u64::try_from(row.get::<i64>(11)?)?,
    })
}

fn discovered_from_row(row: &Row) -> Result<DiscoveredDevice> {
    Ok(DiscoveredDevice {
        address: row.get(0)?,
        hostname: row.get(1)?,
        hardware_address: row.get(2)?,
        first_seen_at: from_millis(row.get(3)?)?,
        last_seen_at: from_millis(row.get(4)?)?,
        total_seen_ticks: u64::try_from(row.get::<i64>(5)?)?,
    })
}

#[async_trait]
impl DeviceStore for LibsqlStore {
    async fn upsert_monitored_device(&self, device: &DeviceSpec, section: &str) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitored_devices (address, name, protocol, section, port, path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(address) DO UPDATE SET
                name = excluded.name,
                protocol = excluded.protocol,
                section = excluded.section,
                port = excluded.port,
                path = excluded.path",
            params![
                device.address.clone(),
                device.name.clone(),
                device.protocol.to_string(),
                section,
                device.port.map(i64::from),
                device.path.clone()
            ],
        )
        .await
        .with_context(|| format!("could not register monitored device {}", device.address))?;
        Ok(())
    }

    async fn monitored_devices(&self) -> Result<Vec<MonitoredDevice>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {MONITORED_COLUMNS} FROM monitored_devices ORDER BY section, name"),
                (),
            )
            .await?;

        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            devices.push(monitored_from_row(&row)?);
        }
        Ok(devices)
    }

    async fn update_monitored_status(&self, result: &CheckResult) -> Result<()> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE monitored_devices SET
                    last_checked_at = ?2,
                    last_alive = ?3,
                    last_latency_ms = ?4,
                    last_status_code = ?5,
                    last_error = ?6,
                    uptime_ticks = uptime_ticks + ?7
                 WHERE address = ?1",
                params![
                    result.address.clone(),
                    millis(result.observed_at),
                    i64::from(result.is_alive),
                    result.latency_ms,
                    result.status_code.map(i64::from),
                    result.error.clone(),
                    i64::from(result.is_alive)
                ],
            )
            .await?;

        if updated == 0 {
            bail!("monitored device {} is not registered", result.address);
        }
        Ok(())
    }

    async fn discovered_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {DISCOVERED_COLUMNS} FROM discovered_devices
                     WHERE address NOT IN (SELECT address FROM monitored_devices)
                     ORDER BY last_seen_at DESC"
                ),
                (),
            )
            .await?;

        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            devices.push(discovered_from_row(&row)?);
        }
        Ok(devices)
    }

    async fn upsert_discovered_device(&self, sighting: &Sighting) -> Result<DiscoveredDevice> {
        let conn = self.get_conn().await?;
        let seen_at = millis(sighting.seen_at);

        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO discovered_devices
                        (address, hostname, hardware_address, first_seen_at, last_seen_at, total_seen_ticks)
                     VALUES (?1, ?2, ?3, ?4, ?4, 1)
                     ON CONFLICT(address) DO UPDATE SET
                        hostname = COALESCE(excluded.hostname, hostname),
                        hardware_address = COALESCE(excluded.hardware_address, hardware_address),
                        last_seen_at = excluded.last_seen_at,
                        total_seen_ticks = total_seen_ticks + 1
                     RETURNING {DISCOVERED_COLUMNS}"
                ),
                params![
                    sighting.address.clone(),
                    sighting.hostname.clone(),
                    sighting.hardware_address.clone(),
                    seen_at
                ],
            )
            .await
            .with_context(|| format!("could not record discovered device {}", sighting.address))?;

        match rows.next().await? {
            Some(row) => discovered_from_row(&row),
            None => bail!("upsert of discovered device {} returned no row", sighting.address),
        }
    }

    async fn monitored_addresses(&self) -> Result<HashSet<String>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT address FROM monitored_devices", ()).await?;

        let mut addresses = HashSet::new();
        while let Some(row) = rows.next().await? {
            addresses.insert(row.get::<String>(0)?);
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::open_pool;
    use tempfile::{TempDir, tempdir};

    /// Helper to create a migrated store in a temporary directory
    async fn create_test_store() -> Result<(LibsqlStore, TempDir)> {
        let temp_dir = tempdir()?;
        let pool = open_pool(&temp_dir.path().join("test.db")).await?;

        let conn = pool.get().await.map_err(|e| anyhow!("{e}"))?;
        crate::database::initialize_database(&conn).await?;
        drop(conn);

        Ok((LibsqlStore::new_from_pool(pool), temp_dir))
    }

    #[tokio::test]
    async fn test_monitored_roundtrip_and_order() {
        let (store, _dir) = create_test_store().await.unwrap();
        store.upsert_monitored_device(&DeviceSpec::icmp("10.0.0.3", "switch"), "network").await.unwrap();
        store
            .upsert_monitored_device(&DeviceSpec::http("10.0.0.2", "nas", 5000).with_path("/ping"), "storage")
            .await
            .unwrap();
        store.upsert_monitored_device(&DeviceSpec::icmp("10.0.0.1", "router"), "network").await.unwrap();

        let devices = store.monitored_devices().await.unwrap();
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["router", "switch", "nas"]);

        let nas = &devices[2];
        assert_eq!(nas.protocol, Protocol::Http);
        assert_eq!(nas.port, Some(5000));
        assert_eq!(nas.path, "/ping");
        assert_eq!(nas.last_checked_at, None);
        assert_eq!(nas.uptime_ticks, 0);
    }

    #[tokio::test]
    async fn test_status_updates_accumulate_uptime() {
        let (store, _dir) = create_test_store().await.unwrap();
        let spec = DeviceSpec::icmp("10.0.0.1", "router");
        store.upsert_monitored_device(&spec, "network").await.unwrap();

        store.update_monitored_status(&CheckResult::new("10.0.0.1").alive(Some(7.0), None)).await.unwrap();
        store.update_monitored_status(&CheckResult::new("10.0.0.1").alive(Some(0.42), None)).await.unwrap();
        // Sub-millisecond latencies are kept as is
        assert_eq!(store.monitored_devices().await.unwrap()[0].last_latency_ms, Some(0.42));
        store.update_monitored_status(&CheckResult::new("10.0.0.1").failure("timeout")).await.unwrap();

        // Re-registering keeps the counters
        store.upsert_monitored_device(&spec, "core").await.unwrap();

        let device = &store.monitored_devices().await.unwrap()[0];
        assert_eq!(device.uptime_ticks, 2);
        assert!(!device.last_alive);
        assert_eq!(device.last_latency_ms, None);
        assert_eq!(device.last_error.as_deref(), Some("timeout"));
        assert_eq!(device.section, "core");
        assert!(device.last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_status_for_unknown_address_fails() {
        let (store, _dir) = create_test_store().await.unwrap();
        let err = store.update_monitored_status(&CheckResult::new("10.9.9.9").failure("timeout")).await;
        assert!(err.unwrap_err().to_string().contains("not registered"));
    }

    #[tokio::test]
    async fn test_discovery_upsert_merges_metadata() {
        let (store, _dir) = create_test_store().await.unwrap();

        let mut first = Sighting::new("10.0.0.50");
        first.hostname = Some("printer.lan".into());
        first.hardware_address = Some("aa:bb:cc:dd:ee:ff".into());
        let created = store.upsert_discovered_device(&first).await.unwrap();
        assert_eq!(created.total_seen_ticks, 1);
        assert_eq!(created.first_seen_at, created.last_seen_at);

        let second = Sighting::new("10.0.0.50");
        let updated = store.upsert_discovered_device(&second).await.unwrap();

        assert_eq!(updated.total_seen_ticks, 2);
        assert_eq!(updated.hostname.as_deref(), Some("printer.lan"));
        assert_eq!(updated.hardware_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(updated.first_seen_at, created.first_seen_at);
        assert!(updated.last_seen_at >= created.last_seen_at);
    }

    #[tokio::test]
    async fn test_discovered_excludes_monitored() {
        let (store, _dir) = create_test_store().await.unwrap();
        store.upsert_discovered_device(&Sighting::new("10.0.0.1")).await.unwrap();
        store.upsert_discovered_device(&Sighting::new("10.0.0.60")).await.unwrap();
        store.upsert_monitored_device(&DeviceSpec::icmp("10.0.0.1", "router"), "network").await.unwrap();

        let discovered = store.discovered_devices().await.unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].address, "10.0.0.60");

        let monitored = store.monitored_addresses().await.unwrap();
        assert!(monitored.contains("10.0.0.1"));
        assert_eq!(monitored.len(), 1);
    }
}
