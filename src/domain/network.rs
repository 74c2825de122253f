// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4, 0-128 for IPv6)")]
    InvalidPrefixLength(u8),

    #[error("Host bits set in network range: {0}")]
    HostBitsSet(String),
}

/// IP range in CIDR notation
///
/// Invariants:
/// - Valid IP address format
/// - Prefix length present and within range for the address family
/// - Address is the network address (no host bits set)
///
/// # Examples
///
/// ```rust
/// use cim_provisioning::domain::Cidr;
///
/// let private = Cidr::new("10.0.32.0/19").unwrap();
/// let public = Cidr::new("10.0.64.0/19").unwrap();
/// assert!(!private.overlaps(&public));
/// assert!(Cidr::new("10.0.32.1/19").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    address: IpAddr,
    prefix_length: u8,
}

impl Cidr {
    /// Parse a CIDR range such as `10.0.0.0/28`
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let address = IpAddr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        let max_prefix = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        if prefix_length > max_prefix {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        let range = Self {
            address,
            prefix_length,
        };

        if range.network_bits() != range.address_bits() {
            return Err(NetworkError::HostBitsSet(cidr.to_string()));
        }

        Ok(range)
    }

    /// Network address
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Check if this is an IPv4 range
    pub fn is_ipv4(&self) -> bool {
        matches!(self.address, IpAddr::V4(_))
    }

    /// Whether `ip` falls inside this range
    pub fn contains(&self, ip: IpAddr) -> bool {
        if self.is_ipv4() != ip.is_ipv4() {
            return false;
        }
        bits(ip) & self.mask() == self.network_bits()
    }

    /// Whether two ranges share at least one address
    pub fn overlaps(&self, other: &Cidr) -> bool {
        if self.is_ipv4() != other.is_ipv4() {
            return false;
        }
        let shorter = self.prefix_length.min(other.prefix_length);
        let mask = mask_for(self.address, shorter);
        self.address_bits() & mask == other.address_bits() & mask
    }

    /// N-th usable host address (network and broadcast addresses excluded)
    pub fn host(&self, n: u32) -> Option<IpAddr> {
        match self.address {
            IpAddr::V4(v4) => {
                let size = 1u64 << (32 - u32::from(self.prefix_length));
                if u64::from(n) + 2 >= size {
                    return None;
                }
                Some(IpAddr::V4(Ipv4Addr::from(u32::from(v4) + n + 1)))
            }
            IpAddr::V6(_) => None,
        }
    }

    /// Get as CIDR notation string
    pub fn as_cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_length)
    }

    fn address_bits(&self) -> u128 {
        bits(self.address)
    }

    fn mask(&self) -> u128 {
        mask_for(self.address, self.prefix_length)
    }

    fn network_bits(&self) -> u128 {
        self.address_bits() & self.mask()
    }
}

fn bits(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn mask_for(ip: IpAddr, prefix: u8) -> u128 {
    let width: u32 = if ip.is_ipv4() { 32 } else { 128 };
    let prefix = u32::from(prefix);
    if prefix == 0 {
        return 0;
    }
    let all = if width == 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    };
    all & !((1u128.checked_shl(width - prefix).unwrap_or(0)).wrapping_sub(1))
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cidr())
    }
}

impl FromStr for Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Cidr {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cidr> for String {
    fn from(value: Cidr) -> Self {
        value.as_cidr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ranges() {
        let range = Cidr::new("10.0.0.0/28").unwrap();
        assert_eq!(range.prefix_length(), 28);
        assert!(range.is_ipv4());
        assert_eq!(range.to_string(), "10.0.0.0/28");

        assert!(Cidr::new("0.0.0.0/0").is_ok());
        assert!(Cidr::new("fd00::/8").is_ok());
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(matches!(Cidr::new("10.0.0.0"), Err(NetworkError::InvalidCidr(_))));
        assert!(matches!(
            Cidr::new("10.0.0.300/24"),
            Err(NetworkError::InvalidIpAddress(_))
        ));
        assert_eq!(
            Cidr::new("10.0.0.0/33"),
            Err(NetworkError::InvalidPrefixLength(33))
        );
        assert!(matches!(
            Cidr::new("10.0.0.5/24"),
            Err(NetworkError::HostBitsSet(_))
        ));
    }

    #[test]
    fn test_contains_and_overlaps() {
        let private = Cidr::new("10.0.32.0/19").unwrap();
        let public = Cidr::new("10.0.64.0/19").unwrap();
        let master = Cidr::new("10.0.0.0/28").unwrap();
        let wide = Cidr::new("10.0.0.0/8").unwrap();

        assert!(private.contains("10.0.40.7".parse().unwrap()));
        assert!(!private.contains("10.0.64.1".parse().unwrap()));
        assert!(!private.overlaps(&public));
        assert!(!master.overlaps(&private));
        assert!(wide.overlaps(&private));
        assert!(private.overlaps(&wide));
    }

    #[test]
    fn test_host_addresses() {
        let range = Cidr::new("10.2.0.0/29").unwrap();
        assert_eq!(range.host(0), Some("10.2.0.1".parse().unwrap()));
        assert_eq!(range.host(6), None);
    }
}
