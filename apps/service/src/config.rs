use std::time::Duration;
use std::{env, fmt, fs, io, path};

use lanwatch::{EngineConfig, NetworkSpec, Section};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("could not write {}: {source}", path.display())]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("could not parse {}: {source}", path.display())]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("could not serialize configuration: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no configuration directory, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web: Web,
    pub database: DatabaseConfig,
    pub monitoring: Monitoring,
    pub discovery: Discovery,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<Section>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Web {
    pub bind: String,
    pub port: u16,
    /// Serve `/metrics` on this port too
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitoring {
    pub check_interval_secs: u64,
    pub device_delay_ms: u64,
    pub icmp_timeout_ms: u64,
    pub http_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Discovery {
    pub probe_timeout_ms: u64,
    pub arp_command: Vec<String>,
    pub event_buffer: usize,
}

impl Default for Web {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 3000, metrics_port: None }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "lanwatch.db".into() }
    }
}

impl Default for Monitoring {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            device_delay_ms: lanwatch::DEFAULT_DEVICE_DELAY_MS,
            icmp_timeout_ms: lanwatch::DEFAULT_ICMP_TIMEOUT_MS,
            http_timeout_ms: lanwatch::DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            probe_timeout_ms: lanwatch::DEFAULT_DISCOVERY_TIMEOUT_MS,
            arp_command: EngineConfig::default().arp_command,
            event_buffer: 256,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/lanwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("lanwatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Web")?;
        write_1(f, "Bind Address", &self.web.bind)?;
        write_1(f, "Port", &self.web.port)?;
        match self.web.metrics_port {
            Some(port) => write_1(f, "Metrics Port", &port)?,
            None => write_1(f, "Metrics Port", &"(main port)")?,
        }

        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;

        write_title_1(f, "Monitoring")?;
        write_1(f, "Check Interval (s)", &self.monitoring.check_interval_secs)?;
        write_1(f, "Device Delay (ms)", &self.monitoring.device_delay_ms)?;
        write_1(f, "ICMP Timeout (ms)", &self.monitoring.icmp_timeout_ms)?;
        write_1(f, "HTTP Timeout (ms)", &self.monitoring.http_timeout_ms)?;

        write_title_1(f, "Discovery")?;
        write_1(f, "Probe Timeout (ms)", &self.discovery.probe_timeout_ms)?;
        write_1(f, "ARP Command", &self.discovery.arp_command.join(" "))?;
        write_1(f, "Event Buffer", &self.discovery.event_buffer)?;

        write_title_1(f, "Sections")?;
        for section in &self.sections {
            write_title_2(f, &section.name)?;
            for device in &section.devices {
                let target = match device.port {
                    Some(port) => format!("{} {}:{}{}", device.protocol, device.address, port, device.path),
                    None => format!("{} {}", device.protocol, device.address),
                };
                write_2(f, &device.name, &target)?;
            }
        }

        write_title_1(f, "Networks")?;
        for network in &self.networks {
            write_1(f, &network.subnet, &format_args!("every {}s", network.scan_interval_secs))?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/lanwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| ConfigError::ParseFailed { path: config_path.clone(), source })?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            config
        };

        crate::validation::validate_config(&config)?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Engine settings derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            check_interval: Duration::from_secs(self.monitoring.check_interval_secs),
            device_delay: Duration::from_millis(self.monitoring.device_delay_ms),
            icmp_timeout: Duration::from_millis(self.monitoring.icmp_timeout_ms),
            http_timeout: Duration::from_millis(self.monitoring.http_timeout_ms),
            discovery_timeout: Duration::from_millis(self.discovery.probe_timeout_ms),
            sections: self.sections.clone(),
            networks: self.networks.clone(),
            arp_command: self.discovery.arp_command.clone(),
        }
    }
}
