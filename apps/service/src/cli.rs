use std::path::PathBuf;

use clap::Parser;

/// Network device monitor and subnet discovery service
#[derive(Debug, Parser)]
#[command(name = "lanwatch", version, about)]
pub struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/lanwatch/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database file, overriding `[database] path`
    #[arg(short, long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,
}
