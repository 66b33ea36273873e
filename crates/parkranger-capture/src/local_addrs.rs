//! Local-address detection
//!
//! The observer must distinguish "our" endpoint of a flow from the remote
//! peer. §4.1: an address is local if it is assigned to any local interface,
//! is loopback, or falls in a private RFC 1918 range.

use ipnetwork::Ipv4Network;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// The set of addresses considered "local" to this host, computed once at
/// startup (§4.1: "at startup it enumerates all...addresses").
#[derive(Debug, Clone)]
pub struct LocalAddressSet {
    addrs: HashSet<IpAddr>,
}

impl LocalAddressSet {
    /// Enumerate all interface addresses on this host plus loopback.
    pub fn detect() -> Self {
        let mut addrs = HashSet::new();
        addrs.insert(IpAddr::V4(Ipv4Addr::LOCALHOST));
        addrs.insert(IpAddr::V6(Ipv6Addr::LOCALHOST));

        for iface in pnet_datalink::interfaces() {
            for ip_network in iface.ips {
                addrs.insert(ip_network.ip());
            }
        }

        LocalAddressSet { addrs }
    }

    /// For tests: build a set from an explicit address list instead of
    /// enumerating real interfaces.
    pub fn from_addrs(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut set: HashSet<IpAddr> = addrs.into_iter().collect();
        set.insert(IpAddr::V4(Ipv4Addr::LOCALHOST));
        set.insert(IpAddr::V6(Ipv6Addr::LOCALHOST));
        LocalAddressSet { addrs: set }
    }

    /// `true` iff `ip` is one of this host's own addresses, loopback, or in
    /// a private RFC 1918 range (10/8, 172.16/12, 192.168/16).
    pub fn is_local(&self, ip: IpAddr) -> bool {
        if self.addrs.contains(&ip) {
            return true;
        }
        match ip {
            IpAddr::V4(v4) => is_private_ipv4(v4),
            IpAddr::V6(_) => false,
        }
    }
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    const PRIVATE_RANGES: &[(Ipv4Addr, u8)] = &[
        (Ipv4Addr::new(127, 0, 0, 0), 8),
        (Ipv4Addr::new(10, 0, 0, 0), 8),
        (Ipv4Addr::new(192, 168, 0, 0), 16),
        (Ipv4Addr::new(172, 16, 0, 0), 12),
    ];
    PRIVATE_RANGES.iter().any(|(network, prefix)| {
        Ipv4Network::new(*network, *prefix)
            .map(|net| net.contains(ip))
            .unwrap_or(false)
    })
}
