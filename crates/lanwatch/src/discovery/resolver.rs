//! Best-effort metadata for live addresses: reverse DNS and hardware address.
//!
//! Nothing here fails a sweep. A missing PTR record, an unavailable resolver or
//! an ARP tool that cannot run (it usually needs root) all resolve to `None`.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::debug;

const ARP_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves descriptive metadata for an address seen alive during a sweep
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Reverse-DNS name of the address
    async fn hostname(&self, ip: Ipv4Addr) -> Option<String>;

    /// Hardware (MAC) address of the address on the local link
    async fn hardware_address(&self, ip: Ipv4Addr) -> Option<String>;
}

/// Resolver backed by the system DNS configuration and a local ARP tool
pub struct SystemResolver {
    dns: OnceCell<Option<TokioAsyncResolver>>,
    arp_command: Vec<String>,
}

impl SystemResolver {
    /// `arp_command` is the program followed by its arguments, for example
    /// `["arp-scan", "--localnet", "--numeric", "--quiet"]`
    pub fn new(arp_command: Vec<String>) -> Self {
        Self { dns: OnceCell::new(), arp_command }
    }

    async fn dns(&self) -> Option<&TokioAsyncResolver> {
        self.dns
            .get_or_init(|| async {
                match TokioAsyncResolver::tokio_from_system_conf() {
                    Ok(resolver) => Some(resolver),
                    Err(e) => {
                        debug!("reverse DNS unavailable: {e}");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    async fn arp_table(&self) -> Option<String> {
        let (program, args) = self.arp_command.split_first()?;

        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = match timeout(ARP_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(program = %program, "could not run ARP tool: {e}");
                return None;
            }
            Err(_) => {
                debug!(program = %program, "ARP tool timed out");
                return None;
            }
        };

        if !output.status.success() {
            debug!(program = %program, status = %output.status, "ARP tool failed");
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(
            ["arp-scan", "--localnet", "--numeric", "--quiet"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

#[async_trait]
impl MetadataResolver for SystemResolver {
    async fn hostname(&self, ip: Ipv4Addr) -> Option<String> {
        let resolver = self.dns().await?;
        match resolver.reverse_lookup(IpAddr::V4(ip)).await {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .filter(|name| !name.is_empty()),
            Err(e) => {
                debug!(address = %ip, "No hostname found: {e}");
                None
            }
        }
    }

    async fn hardware_address(&self, ip: Ipv4Addr) -> Option<String> {
        let table = self.arp_table().await?;
        let mac = find_hardware_address(&table, ip);
        if mac.is_none() {
            debug!(address = %ip, "Could not get MAC address");
        }
        mac
    }
}

/// Pick the hardware address of `ip` out of ARP tool output.
///
/// Works with `arp-scan` (`ip<TAB>mac<TAB>vendor`), `arp -n` and
/// `/proc/net/arp` layouts: the line must start with exactly `ip` and the
/// first MAC-shaped column is returned. Incomplete entries are ignored.
pub fn find_hardware_address(table: &str, ip: Ipv4Addr) -> Option<String> {
    let wanted = ip.to_string();

    table
        .lines()
        .filter(|line| line.split_whitespace().next() == Some(wanted.as_str()))
        .flat_map(|line| line.split_whitespace().skip(1))
        .find(|column| is_hardware_address(column) && *column != "00:00:00:00:00:00")
        .map(|mac| mac.to_lowercase())
}

fn is_hardware_address(column: &str) -> bool {
    let parts: Vec<&str> = column.split([':', '-']).collect();
    parts.len() == 6 && parts.iter().all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}
