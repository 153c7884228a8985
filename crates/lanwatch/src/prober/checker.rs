use thiserror::Error;

use crate::types::ProbeTarget;

/// Why a single probe did not produce a healthy reply.
///
/// The `Display` output is what ends up in `CheckResult::error`, except for
/// [`ProbeFailure::Status`] which is recorded as a status code only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    /// No ICMP echo reply arrived before the timeout
    #[error("timeout")]
    NoReply,

    /// The HTTP request was aborted when its deadline expired
    #[error("Timeout")]
    Deadline,

    /// The probe could not be carried out (socket, DNS, connection refused)
    #[error("{0}")]
    Transport(String),

    /// The server answered outside of [200, 300)
    #[error("unexpected status code {0}")]
    Status(u16),
}

/// A healthy reply
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reply {
    pub latency_ms: Option<f64>,
    pub status_code: Option<u16>,
}

/// Checker trait for the different kinds of probes
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform the check against `target`
    async fn check(&self, target: &ProbeTarget) -> Result<Reply, ProbeFailure>;
}
