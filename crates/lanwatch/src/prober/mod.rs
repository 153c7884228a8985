//! Prober - executes a single health check against one address
//!
//! Both protocols are normalised into one [`CheckResult`] shape so that the
//! scheduler and the store stay protocol-agnostic. Probing never fails: every
//! failure mode ends up as `is_alive = false` with the details recorded.

pub mod checker;
pub mod http;
pub mod icmp;

pub use checker::{Checker, ProbeFailure, Reply};
pub use http::HttpChecker;
pub use icmp::IcmpChecker;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::types::{CheckResult, ProbeTarget, Protocol};

/// Dispatches a probe to the checker matching the target's protocol
#[derive(Clone)]
pub struct Prober {
    icmp: Arc<dyn Checker>,
    http: Arc<dyn Checker>,
}

impl Prober {
    /// Create a prober with independent ICMP and HTTP timeouts
    pub fn new(icmp_timeout: Duration, http_timeout: Duration) -> Result<Self> {
        Ok(Self {
            icmp: Arc::new(IcmpChecker::new(icmp_timeout)),
            http: Arc::new(HttpChecker::new(http_timeout)?),
        })
    }

    /// Create a prober from explicit checkers
    pub fn with_checkers(icmp: Arc<dyn Checker>, http: Arc<dyn Checker>) -> Self {
        Self { icmp, http }
    }

    /// Execute a probe and fold the outcome into a check result
    pub async fn probe(&self, target: &ProbeTarget) -> CheckResult {
        let result = CheckResult::new(target.address.clone());

        let checker: &dyn Checker = match target.protocol {
            Protocol::Icmp => self.icmp.as_ref(),
            Protocol::Http => self.http.as_ref(),
        };

        match checker.check(target).await {
            Ok(reply) => result.alive(reply.latency_ms, reply.status_code),
            Err(ProbeFailure::Status(code)) => result.rejected(code),
            Err(failure) => {
                debug!(address = %target.address, protocol = %target.protocol, "probe failed: {failure}");
                result.failure(failure.to_string())
            }
        }
    }
}
