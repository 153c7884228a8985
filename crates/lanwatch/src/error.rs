use thiserror::Error;

/// Errors surfaced by the engine outside of probing.
///
/// Probe failures never show up here: they are folded into a
/// [`CheckResult`](crate::types::CheckResult) by the prober.
#[derive(Debug, Error)]
pub enum Error {
    #[error("store failure: {0:#}")]
    Store(anyhow::Error),

    #[error("event transport failure: {0}")]
    Transport(String),

    #[error("invalid subnet {subnet}: {reason}")]
    InvalidSubnet { subnet: String, reason: String },

    #[error("probe setup failed: {0}")]
    ProbeSetup(String),

    #[error("{0} interval must be non-zero")]
    ZeroInterval(String),
}

pub type Result<T> = std::result::Result<T, Error>;
