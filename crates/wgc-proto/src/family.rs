//! Address family tag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// The v4/v6 protocol variant.
///
/// The family selects the option table, the envelope shape, and which
/// interface addresses are considered during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4 family.
    V4,
    /// IPv6 family.
    V6,
}

impl AddressFamily {
    /// Returns `true` for the v4 family.
    #[must_use]
    pub const fn is_v4(self) -> bool {
        matches!(self, Self::V4)
    }

    /// Returns `true` for the v6 family.
    #[must_use]
    pub const fn is_v6(self) -> bool {
        matches!(self, Self::V6)
    }

    /// Returns the family of an address.
    #[must_use]
    pub const fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// Returns `true` if `addr` belongs to this family.
    #[must_use]
    pub fn matches(self, addr: &IpAddr) -> bool {
        Self::of(addr) == self
    }

    /// Unspecified address of this family (`0.0.0.0` or `::`).
    #[must_use]
    pub const fn unspecified(self) -> IpAddr {
        match self {
            Self::V4 => IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            Self::V6 => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => write!(f, "v4"),
            Self::V6 => write!(f, "v6"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_of_address() {
        let v4: IpAddr = "10.0.0.1".parse().expect("v4");
        let v6: IpAddr = "fd00::1".parse().expect("v6");
        assert_eq!(AddressFamily::of(&v4), AddressFamily::V4);
        assert_eq!(AddressFamily::of(&v6), AddressFamily::V6);
        assert!(AddressFamily::V4.matches(&v4));
        assert!(!AddressFamily::V4.matches(&v6));
    }

    #[test]
    fn display_and_unspecified() {
        assert_eq!(AddressFamily::V4.to_string(), "v4");
        assert_eq!(AddressFamily::V6.to_string(), "v6");
        assert_eq!(AddressFamily::V6.unspecified().to_string(), "::");
    }
}
