//! Subnet discovery
//!
//! A [`SubnetScanner`] sweeps the hosts of one /24, skipping addresses that are
//! already monitored, and records every responder as a discovered device.

pub mod resolver;
pub mod scanner;
pub mod subnet;

pub use resolver::{MetadataResolver, SystemResolver, find_hardware_address};
pub use scanner::{ScanControl, ScanOutcome, ScanState, SubnetScanner};
pub use subnet::{parse_subnet, sweep_addresses};
