//! Address parsing shared by the command-line socket tables

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Parse `host:port` as printed by `ss`, `lsof` and `sockstat`
///
/// Accepts `[v6]:port`, zone suffixes (`%lo`) and `*` for the wildcard.
/// A `*` port (the remote side of a listener) yields `None`.
pub fn parse_endpoint(s: &str) -> Option<(IpAddr, u16)> {
    let (host, port) = s.rsplit_once(':')?;
    Some((parse_host(host, false)?, port.parse().ok()?))
}

/// Like [`parse_endpoint`] but `*` means the IPv6 wildcard
pub fn parse_endpoint_v6(s: &str) -> Option<(IpAddr, u16)> {
    let (host, port) = s.rsplit_once(':')?;
    Some((parse_host(host, true)?, port.parse().ok()?))
}

/// Parse BSD `netstat` style `host.port` (`*.80`, `127.0.0.1.8080`, `::1.5432`)
pub fn parse_dotted_endpoint(s: &str, ipv6: bool) -> Option<(IpAddr, u16)> {
    let (host, port) = s.rsplit_once('.')?;
    Some((parse_host(host, ipv6)?, port.parse().ok()?))
}

fn parse_host(host: &str, ipv6: bool) -> Option<IpAddr> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = host.split('%').next().unwrap_or(host);
    if host == "*" {
        return Some(if ipv6 {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
    }
    host.parse().ok()
}
