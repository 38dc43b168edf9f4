//! Destination policy: accept or reject a `{host, port}` pair before any
//! socket is opened.
//!
//! Port decisions are pure over the configured lists. Host decisions block
//! localhost spellings and private/reserved address ranges, resolving
//! hostnames once so a public name cannot smuggle in a private address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

/// Hostname spellings that always refer to the local machine.
const LOCAL_HOSTNAMES: &[&str] = &["localhost", "local", "localhost.localdomain"];

/// Policy rejections, reported to metrics as distinct reason codes.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Port {0} is not allowed")]
    BlockedPort(u32),

    #[error("Host \"{0}\" is private or local and not allowed")]
    BlockedHost(String),
}

/// Port lists from configuration, in decision order.
#[derive(Debug, Clone, Default)]
pub struct PortPolicy {
    /// Non-empty means only these ports pass, deny/allow lists ignored.
    pub allowlist_override: Vec<u16>,
    /// Rejected outright when the override list is empty.
    pub denylist: Vec<u16>,
    /// Base allow-list consulted last.
    pub allowlist: Vec<u16>,
}

impl PortPolicy {
    pub fn from_config(cfg: &mudgate_core::Config) -> Self {
        Self {
            allowlist_override: cfg.port_allowlist_override.clone(),
            denylist: cfg.port_denylist.clone(),
            allowlist: cfg.port_allowlist.clone(),
        }
    }
}

/// Validate a requested port against the policy.
///
/// Returns the port narrowed to `u16` so callers downstream cannot dial an
/// unvalidated value.
pub fn check_port(port: u32, policy: &PortPolicy) -> Result<u16, PolicyError> {
    if port == 0 || port > u32::from(u16::MAX) {
        return Err(PolicyError::BlockedPort(port));
    }
    let p = port as u16;

    if !policy.allowlist_override.is_empty() {
        if policy.allowlist_override.contains(&p) {
            return Ok(p);
        }
        return Err(PolicyError::BlockedPort(port));
    }

    if policy.denylist.contains(&p) {
        return Err(PolicyError::BlockedPort(port));
    }

    if policy.allowlist.contains(&p) {
        Ok(p)
    } else {
        Err(PolicyError::BlockedPort(port))
    }
}

/// Validate a hostname or IP literal for an outbound connection.
///
/// IP literals are checked directly; hostnames are resolved and every
/// resolved address must be public. DNS failure here is non-fatal — the dial
/// will surface a clearer error for a truly unreachable host.
pub async fn check_host(host: &str) -> Result<(), PolicyError> {
    if is_local_hostname(host) {
        return Err(PolicyError::BlockedHost(host.to_string()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(PolicyError::BlockedHost(host.to_string()));
        }
        return Ok(());
    }

    match tokio::net::lookup_host((host, 0u16)).await {
        Ok(addrs) => {
            for addr in addrs {
                if is_private_ip(addr.ip()) {
                    return Err(PolicyError::BlockedHost(host.to_string()));
                }
            }
            Ok(())
        }
        Err(err) => {
            tracing::debug!(host, %err, "DNS lookup failed during policy check, deferring to dial");
            Ok(())
        }
    }
}

fn is_local_hostname(host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    LOCAL_HOSTNAMES.contains(&lower.as_str()) || lower.ends_with(".local")
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()                 // 127/8
        || ip.is_private()           // 10/8, 172.16/12, 192.168/16
        || ip.is_link_local()        // 169.254/16
        || ip.octets()[0] == 0 // 0/8 ("this network")
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let seg0 = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (seg0 & 0xfe00) == 0xfc00 // unique local fc00::/7
        || (seg0 & 0xffc0) == 0xfe80 // link local fe80::/10
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_policy() -> PortPolicy {
        PortPolicy::from_config(&mudgate_core::Config::default())
    }

    #[test]
    fn telnet_port_allowed_by_default() {
        assert_eq!(check_port(23, &default_policy()).unwrap(), 23);
    }

    #[test]
    fn out_of_range_ports_rejected() {
        assert!(matches!(
            check_port(0, &default_policy()),
            Err(PolicyError::BlockedPort(0))
        ));
        assert!(matches!(
            check_port(65536, &default_policy()),
            Err(PolicyError::BlockedPort(65536))
        ));
    }

    #[test]
    fn denylisted_port_rejected() {
        assert!(check_port(80, &default_policy()).is_err());
        assert!(check_port(5432, &default_policy()).is_err());
    }

    #[test]
    fn port_outside_allowlist_rejected() {
        // 4000 is neither denied nor allowed by default.
        assert!(check_port(4000, &default_policy()).is_err());
    }

    #[test]
    fn custom_allowlist_admits_mud_ports() {
        let mut policy = default_policy();
        policy.allowlist = vec![23, 4000, 6666];
        assert!(check_port(4000, &policy).is_ok());
        // Deny-list still wins over the base allow-list.
        policy.allowlist.push(80);
        assert!(check_port(80, &policy).is_err());
    }

    #[test]
    fn override_list_is_exclusive() {
        let mut policy = default_policy();
        policy.allowlist_override = vec![7777];

        assert!(check_port(7777, &policy).is_ok());
        // Even the default telnet port is rejected under an override.
        assert!(check_port(23, &policy).is_err());
        // The deny-list is ignored: an override owner opted in explicitly.
        policy.allowlist_override.push(80);
        assert!(check_port(80, &policy).is_ok());
    }

    #[tokio::test]
    async fn localhost_spellings_rejected() {
        for host in ["localhost", "LOCALHOST", "local", "localhost.localdomain"] {
            assert!(check_host(host).await.is_err(), "{host} should be blocked");
        }
    }

    #[tokio::test]
    async fn dot_local_suffix_rejected() {
        assert!(check_host("my-server.local").await.is_err());
        assert!(check_host("printer.Local").await.is_err());
    }

    #[tokio::test]
    async fn private_v4_literals_rejected() {
        for host in [
            "127.0.0.1",
            "127.1.2.3",
            "10.0.0.1",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "169.254.0.10",
            "0.0.0.0",
        ] {
            assert!(check_host(host).await.is_err(), "{host} should be blocked");
        }
    }

    #[tokio::test]
    async fn private_v6_literals_rejected() {
        for host in ["::1", "fd00::1", "fc00::1", "fe80::1", "::", "::ffff:10.0.0.1"] {
            assert!(check_host(host).await.is_err(), "{host} should be blocked");
        }
    }

    #[tokio::test]
    async fn public_literals_allowed() {
        for host in ["8.8.8.8", "172.32.0.1", "11.0.0.1", "2607:f8b0::1"] {
            assert!(check_host(host).await.is_ok(), "{host} should pass");
        }
    }

    #[tokio::test]
    async fn unresolvable_hostname_defers_to_dial() {
        // DNS failure is not a policy rejection.
        assert!(check_host("no-such-host.invalid").await.is_ok());
    }
}
