//! IPv4/IPv6 address value type: an address family tag alongside its
//! octets, constructed either from a raw address or by resolving a
//! hostname. Wraps `std::net::IpAddr` rather than hand-rolling 4-vs-16-byte
//! octet storage, and uses `ToSocketAddrs` for resolution.

use std::fmt;
use std::net::{IpAddr, ToSocketAddrs};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(IpAddr);

impl Address {
    pub fn from_ip(ip: IpAddr) -> Self {
        Address(ip)
    }

    /// Resolves a literal address or hostname, preferring an exact literal
    /// parse before falling back to DNS resolution (mirroring the
    /// original's "try as a literal, then resolve" order).
    pub fn resolve(host: &str) -> Result<Self> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Address(ip));
        }
        (host, 0u16)
            .to_socket_addrs()
            .map_err(Error::Io)?
            .next()
            .map(|sa| Address(sa.ip()))
            .ok_or_else(|| Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no address found for host")))
    }

    pub fn addr_type(&self) -> AddressType {
        match self.0 {
            IpAddr::V4(_) => AddressType::V4,
            IpAddr::V6(_) => AddressType::V6,
        }
    }

    pub fn octets(&self) -> Vec<u8> {
        match self.0 {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        Address(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_ipv4_literal() {
        let addr = Address::resolve("127.0.0.1").unwrap();
        assert_eq!(addr.addr_type(), AddressType::V4);
        assert_eq!(addr.octets(), vec![127, 0, 0, 1]);
    }

    #[test]
    fn resolves_ipv6_literal() {
        let addr = Address::resolve("::1").unwrap();
        assert_eq!(addr.addr_type(), AddressType::V6);
        assert_eq!(addr.octets().len(), 16);
    }

    #[test]
    fn displays_as_plain_address() {
        let addr = Address::resolve("127.0.0.1").unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1");
    }
}
