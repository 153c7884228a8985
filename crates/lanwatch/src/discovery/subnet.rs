use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnetwork::Ipv4Network;

use crate::error::{Error, Result};

/// Parse a configured subnet such as `192.168.1.0/24`
pub fn parse_subnet(subnet: &str) -> Result<Ipv4Network> {
    Ipv4Network::from_str(subnet.trim()).map_err(|e| Error::InvalidSubnet {
        subnet: subnet.to_string(),
        reason: e.to_string(),
    })
}

/// Host addresses visited by a sweep: `.1` through `.254` of the /24 that
/// contains the subnet's network address, in ascending order.
pub fn sweep_addresses(network: &Ipv4Network) -> impl Iterator<Item = Ipv4Addr> {
    let [a, b, c, _] = network.network().octets();
    (1..=254u8).map(move |host| Ipv4Addr::new(a, b, c, host))
}
