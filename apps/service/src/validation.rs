//! Configuration checks run before the engine starts.
//!
//! Every problem is collected so one run reports all of them.

use std::collections::HashSet;

use lanwatch::Protocol;
use lanwatch::discovery::parse_subnet;

use crate::config::{Config, ConfigError};

const MIN_INTERVAL_SECS: u64 = 1;
const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Validate a loaded configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    validate_web(config, &mut problems);
    validate_timing(config, &mut problems);
    validate_devices(config, &mut problems);
    validate_networks(config, &mut problems);

    if problems.is_empty() { Ok(()) } else { Err(ConfigError::Invalid(problems.join("; "))) }
}

fn validate_web(config: &Config, problems: &mut Vec<String>) {
    if config.web.port == 0 {
        problems.push("web.port must not be 0".into());
    }
    if config.web.metrics_port == Some(0) {
        problems.push("web.metrics_port must not be 0".into());
    }
    if config.web.metrics_port == Some(config.web.port) {
        problems.push("web.metrics_port must differ from web.port".into());
    }
    if config.discovery.event_buffer == 0 {
        problems.push("discovery.event_buffer must be at least 1".into());
    }
}

fn validate_timing(config: &Config, problems: &mut Vec<String>) {
    check_interval("monitoring.check_interval_secs", config.monitoring.check_interval_secs, problems);

    for (label, value) in [
        ("monitoring.icmp_timeout_ms", config.monitoring.icmp_timeout_ms),
        ("monitoring.http_timeout_ms", config.monitoring.http_timeout_ms),
        ("discovery.probe_timeout_ms", config.discovery.probe_timeout_ms),
    ] {
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&value) {
            problems.push(format!("{label} must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS}, got {value}"));
        }
    }

    if config.monitoring.device_delay_ms > MAX_TIMEOUT_MS {
        problems.push(format!("monitoring.device_delay_ms must be at most {MAX_TIMEOUT_MS}"));
    }
}

fn check_interval(label: &str, value: u64, problems: &mut Vec<String>) {
    if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&value) {
        problems.push(format!("{label} must be between {MIN_INTERVAL_SECS} and {MAX_INTERVAL_SECS}, got {value}"));
    }
}

fn validate_devices(config: &Config, problems: &mut Vec<String>) {
    let mut seen = HashSet::new();

    for section in &config.sections {
        if section.name.trim().is_empty() {
            problems.push("section name must not be empty".into());
        }

        for device in &section.devices {
            let at = format!("section '{}', device '{}'", section.name, device.name);

            if device.address.trim().is_empty() {
                problems.push(format!("{at}: address must not be empty"));
            } else if !seen.insert(device.address.trim()) {
                problems.push(format!("{at}: address {} is declared more than once", device.address));
            }
            if device.name.trim().is_empty() {
                problems.push(format!("{at}: name must not be empty"));
            }
            if device.port == Some(0) {
                problems.push(format!("{at}: port must not be 0"));
            }
            if device.protocol == Protocol::Http && !device.path.starts_with('/') {
                problems.push(format!("{at}: path must start with '/'"));
            }
        }
    }
}

fn validate_networks(config: &Config, problems: &mut Vec<String>) {
    for network in &config.networks {
        if let Err(e) = parse_subnet(&network.subnet) {
            problems.push(e.to_string());
        }
        check_interval(
            &format!("networks '{}' scan_interval_secs", network.subnet),
            network.scan_interval_secs,
            problems,
        );
    }
}
