//! Structured view of a tunnel interface and its peers.

use crate::error::WireGuardError;
use crate::keys::{PublicKey, SecretKey};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A peer endpoint: host and port.
///
/// The host is kept as text so an unparseable address can be reported as
/// unresolved instead of failing the whole dump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host part without brackets.
    pub host: String,
    /// UDP port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint from an address and port.
    #[must_use]
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self {
            host: addr.to_string(),
            port,
        }
    }

    /// The host as an IP address, if it is one.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

impl FromStr for Endpoint {
    type Err = WireGuardError;

    /// Parses `addr:port` or `[v6addr]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WireGuardError::InvalidEndpoint(s.to_string());
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            (host, tail.strip_prefix(':').ok_or_else(invalid)?)
        } else {
            s.rsplit_once(':').ok_or_else(invalid)?
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// One peer line of an interface dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Peer public key.
    pub public_key: PublicKey,
    /// Pre-shared key, absent when the dump shows `(none)`.
    #[serde(skip_serializing)]
    pub preshared_key: Option<SecretKey>,
    /// Endpoint, absent when the dump shows `(none)`.
    pub endpoint: Option<Endpoint>,
    /// Allowed subnets in CIDR form, in dump order.
    pub allowed_ips: Vec<String>,
    /// Unix time of the latest handshake, 0 if none.
    pub latest_handshake: u64,
    /// Bytes received from the peer.
    pub rx_bytes: u64,
    /// Bytes sent to the peer.
    pub tx_bytes: u64,
    /// Keepalive token as printed (`25`, `off`, ...).
    pub persistent_keepalive: String,
}

impl Peer {
    /// Keepalive interval in seconds; non-numeric tokens such as `off` are 0.
    #[must_use]
    pub fn keepalive_secs(&self) -> u32 {
        self.persistent_keepalive.parse().unwrap_or(0)
    }

    /// Allowed subnets that parse as CIDR networks.
    #[must_use]
    pub fn allowed_nets(&self) -> Vec<IpNet> {
        self.allowed_ips.iter().filter_map(|s| s.parse().ok()).collect()
    }

    /// Address part of the first allowed subnet.
    ///
    /// This is the peer's tunnel-side address.
    #[must_use]
    pub fn tunnel_addr(&self) -> Option<IpAddr> {
        let first = self.allowed_ips.first()?;
        first
            .parse::<IpNet>()
            .map(|net| net.addr())
            .ok()
            .or_else(|| first.split('/').next()?.parse().ok())
    }
}

/// Snapshot of one tunnel interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceSnapshot {
    /// Interface name.
    pub name: String,
    /// Local private key.
    #[serde(skip_serializing)]
    pub private_key: Option<SecretKey>,
    /// Local public key.
    pub public_key: Option<PublicKey>,
    /// UDP listen port.
    pub listen_port: u16,
    /// Firewall mark, absent when `off`.
    pub fwmark: Option<u32>,
    /// Peers in dump order.
    pub peers: Vec<Peer>,
}

impl InterfaceSnapshot {
    /// Returns `true` if the snapshot carries everything reconciliation
    /// needs: both local keys, at least one peer, and at least one peer
    /// endpoint, allowed subnet and keepalive.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.private_key.is_some()
            && self.public_key.is_some()
            && !self.peers.is_empty()
            && self.peers.iter().any(|p| p.endpoint.is_some())
            && self.peers.iter().any(|p| !p.allowed_ips.is_empty())
            && self.peers.iter().any(|p| !p.persistent_keepalive.is_empty())
    }

    /// Looks up a peer by public key.
    #[must_use]
    pub fn peer(&self, public_key: &PublicKey) -> Option<&Peer> {
        self.peers.iter().find(|p| &p.public_key == public_key)
    }

    /// Endpoint hosts of every peer that has one.
    pub fn endpoint_hosts(&self) -> impl Iterator<Item = &str> {
        self.peers
            .iter()
            .filter_map(|p| p.endpoint.as_ref())
            .map(|e| e.host.as_str())
    }
}
