//! Peer access control: the single-client allow list.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::RelayError;

/// Decides whether a connecting peer may use the relay.
///
/// Exactly one IPv4 address is allowed; there is deliberately no list and no
/// subnet support. The check is a predicate over the already-parsed peer
/// address, so widening it later (CIDR ranges, several entries) stays inside
/// this type and never touches the session logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPolicy {
    allowed: Ipv4Addr,
}

impl ClientPolicy {
    /// Parse the configured allow-list literal.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::AllowedClient`] for anything that is not a
    /// plain IPv4 literal, IPv6 literals included.
    pub fn from_literal(literal: &str) -> Result<Self, RelayError> {
        let allowed = literal
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|source| RelayError::AllowedClient {
                literal: literal.to_string(),
                source,
            })?;
        Ok(Self { allowed })
    }

    /// `true` iff the peer's IP is IPv4 and equals the allowed address.
    ///
    /// The peer's port is ignored. Anything that is not plain IPv4 fails
    /// closed, v4-mapped IPv6 forms included.
    pub fn allows(&self, peer: &SocketAddr) -> bool {
        match peer.ip() {
            IpAddr::V4(ip) => ip == self.allowed,
            IpAddr::V6(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv6Addr, SocketAddrV4, SocketAddrV6};

    fn policy() -> ClientPolicy {
        ClientPolicy::from_literal("192.0.2.7").unwrap()
    }

    fn v4(ip: [u8; 4], port: u16) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(ip.into(), port))
    }

    #[test]
    fn allows_the_configured_address_on_any_port() {
        let p = policy();
        assert!(p.allows(&v4([192, 0, 2, 7], 1)));
        assert!(p.allows(&v4([192, 0, 2, 7], 54321)));
    }

    #[test]
    fn rejects_other_ipv4_addresses() {
        let p = policy();
        assert!(!p.allows(&v4([192, 0, 2, 8], 1000)));
        assert!(!p.allows(&v4([127, 0, 0, 1], 1000)));
    }

    #[test]
    fn rejects_ipv6_peers() {
        let p = policy();
        let loopback = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 1000, 0, 0));
        assert!(!p.allows(&loopback));

        // Even when the IPv6 form wraps the allowed IPv4 address.
        let mapped = Ipv4Addr::new(192, 0, 2, 7).to_ipv6_mapped();
        let mapped = SocketAddr::V6(SocketAddrV6::new(mapped, 1000, 0, 0));
        assert!(!p.allows(&mapped));
    }

    #[test]
    fn from_literal_trims_whitespace() {
        assert!(ClientPolicy::from_literal(" 10.0.0.1 ").is_ok());
    }

    #[test]
    fn from_literal_rejects_malformed_input() {
        for literal in ["", "relay.example.com", "::1", "10.0.0.1:80", "999.0.0.1"] {
            assert!(
                ClientPolicy::from_literal(literal).is_err(),
                "accepted {literal:?}"
            );
        }
    }
}
