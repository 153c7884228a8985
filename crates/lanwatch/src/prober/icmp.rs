use std::net::IpAddr;
use std::time::Duration;

use rand::random;
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use tokio::sync::OnceCell;
use tracing::debug;

use super::checker::{Checker, ProbeFailure, Reply};
use crate::types::ProbeTarget;

const PAYLOAD: [u8; 56] = [0; 56];

/// ICMP echo checker.
///
/// Raw ICMP sockets need elevated privileges (or `net.ipv4.ping_group_range`
/// on Linux); the sockets are opened lazily so that a missing privilege shows
/// up as a failed check instead of a startup error.
pub struct IcmpChecker {
    timeout: Duration,
    v4: OnceCell<Client>,
    v6: OnceCell<Client>,
}

impl IcmpChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, v4: OnceCell::new(), v6: OnceCell::new() }
    }

    async fn client(&self, ip: IpAddr) -> Result<&Client, ProbeFailure> {
        let (cell, config) = match ip {
            IpAddr::V4(_) => (&self.v4, Config::default()),
            IpAddr::V6(_) => (&self.v6, Config::builder().kind(ICMP::V6).build()),
        };

        cell.get_or_try_init(|| async move { Client::new(&config) })
            .await
            .map_err(|e| ProbeFailure::Transport(format!("failed to open ICMP socket: {e}")))
    }
}

/// Round-trip time in fractional milliseconds
fn rtt_millis(rtt: Duration) -> f64 {
    rtt.as_secs_f64() * 1000.0
}

/// Resolve a configured address (literal IP or hostname) to an IP
pub(crate) async fn resolve_address(address: &str) -> Result<IpAddr, ProbeFailure> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host((address, 0))
        .await
        .map_err(|e| ProbeFailure::Transport(format!("failed to resolve {address}: {e}")))?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ProbeFailure::Transport(format!("no address found for {address}")))
}

#[async_trait::async_trait]
impl Checker for IcmpChecker {
    async fn check(&self, target: &ProbeTarget) -> Result<Reply, ProbeFailure> {
        let ip = resolve_address(&target.address).await?;
        let client = self.client(ip).await?;

        let mut pinger = client.pinger(ip, PingIdentifier(random())).await;
        pinger.timeout(self.timeout);

        match pinger.ping(PingSequence(0), &PAYLOAD).await {
            Ok((_packet, rtt)) => {
                let latency = rtt_millis(rtt);
                debug!(address = %ip, rtt_ms = latency, "ICMP echo reply");
                Ok(Reply { latency_ms: Some(latency), status_code: None })
            }
            Err(SurgeError::Timeout { .. }) => Err(ProbeFailure::NoReply),
            Err(e) => Err(ProbeFailure::Transport(e.to_string())),
        }
    }
}
