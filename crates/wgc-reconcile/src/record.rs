//! Persisted tunnel records.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wgc_proto::AddressFamily;
use wgc_wireguard::{Peer, PublicKey, SecretKey};

use crate::config::EndpointRole;

/// Status written to records created from a live interface.
pub const STATUS_UP: &str = "up";

/// Fields that a pass or a reply can change, reported to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelField {
    /// Peer's record id.
    RemoteId,
    /// Peer's endpoint role.
    RemoteEndpointType,
    /// Local physical address.
    LocalPhysAddr,
    /// Peer's tunnel listen port.
    RemotePhysListenPort,
    /// Peer's control-channel port.
    RemotePhysComPort,
    /// Firewall mark.
    Fwmark,
    /// Latest handshake time.
    LatestHandshake,
    /// Bytes received.
    RxBytes,
    /// Bytes sent.
    TxBytes,
    /// Keepalive interval.
    Keepalive,
    /// Status string.
    Status,
}

/// Set of fields changed by one update.
pub type ChangedFields = BTreeSet<TunnelField>;

/// One local-to-remote tunnel endpoint pairing.
///
/// Physical ports come in two kinds: the tunnel's own listen port and the
/// control-channel ("com") port the info protocol runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelRecord {
    /// Record id.
    pub id: Uuid,
    /// Peer's id for the same tunnel, once learned.
    #[serde(default)]
    pub remote_id: Option<Uuid>,
    /// Address family.
    pub family: AddressFamily,
    /// This host's role.
    pub local_endpoint_type: EndpointRole,
    /// Peer's role.
    pub remote_endpoint_type: EndpointRole,

    /// This host's physical address towards the peer.
    pub local_phys_addr: Option<IpAddr>,
    /// This host's tunnel listen port.
    pub local_phys_listen_port: u16,
    /// This host's control-channel port.
    pub local_phys_com_port: u16,
    /// Peer's physical address.
    pub remote_phys_addr: Option<IpAddr>,
    /// Peer's tunnel listen port.
    pub remote_phys_listen_port: u16,
    /// Peer's control-channel port.
    pub remote_phys_com_port: u16,

    /// This host's address inside the tunnel.
    pub local_tunnel_addr: Option<IpAddr>,
    /// This host's control port inside the tunnel.
    pub local_tunnel_com_port: u16,
    /// Peer's address inside the tunnel.
    pub remote_tunnel_addr: Option<IpAddr>,
    /// Peer's control port inside the tunnel.
    pub remote_tunnel_com_port: u16,
    /// Tunnel subnet in CIDR form.
    #[serde(default)]
    pub tunnel_network: Option<String>,

    /// Local interface name.
    pub local_interface_name: String,
    /// Peer's interface name, once learned.
    #[serde(default)]
    pub remote_interface_name: Option<String>,
    /// Local public key.
    pub local_public_key: PublicKey,
    /// Peer's public key.
    pub remote_public_key: PublicKey,
    /// Local private key.
    pub local_private_key: SecretKey,
    /// Pre-shared key, if any.
    #[serde(default)]
    pub local_preshared_key: Option<SecretKey>,

    /// Firewall mark.
    #[serde(default)]
    pub fwmark: Option<u32>,
    /// Unix time of the latest handshake.
    #[serde(default)]
    pub latest_handshake: u64,
    /// Bytes received from the peer.
    #[serde(default)]
    pub rx_bytes: u64,
    /// Bytes sent to the peer.
    #[serde(default)]
    pub tx_bytes: u64,
    /// Persistent keepalive in seconds.
    pub keepalive: u32,

    /// Last lifecycle change.
    pub datestamp: DateTime<Utc>,
    /// Status string.
    pub status: String,
    /// Whether the tunnel has been configured end to end.
    #[serde(default)]
    pub is_configured: bool,
}

impl TunnelRecord {
    /// Local tunnel control socket, if the tunnel address is known.
    #[must_use]
    pub fn local_tunnel_socket(&self) -> Option<SocketAddr> {
        self.local_tunnel_addr
            .map(|addr| SocketAddr::new(addr, self.local_tunnel_com_port))
    }

    /// Remote tunnel control socket, if the tunnel address is known.
    #[must_use]
    pub fn remote_tunnel_socket(&self) -> Option<SocketAddr> {
        self.remote_tunnel_addr
            .map(|addr| SocketAddr::new(addr, self.remote_tunnel_com_port))
    }

    /// Copies live counters and keepalive from a peer.
    ///
    /// A peer without a numeric keepalive gets `default_keepalive`. Returns
    /// the fields that changed.
    pub fn apply_peer_stats(
        &mut self,
        fwmark: Option<u32>,
        peer: &Peer,
        default_keepalive: u32,
    ) -> ChangedFields {
        let mut changed = ChangedFields::new();
        set_if_changed(&mut self.fwmark, fwmark, TunnelField::Fwmark, &mut changed);
        set_if_changed(
            &mut self.latest_handshake,
            peer.latest_handshake,
            TunnelField::LatestHandshake,
            &mut changed,
        );
        set_if_changed(&mut self.rx_bytes, peer.rx_bytes, TunnelField::RxBytes, &mut changed);
        set_if_changed(&mut self.tx_bytes, peer.tx_bytes, TunnelField::TxBytes, &mut changed);
        set_if_changed(
            &mut self.keepalive,
            effective_keepalive(peer, default_keepalive),
            TunnelField::Keepalive,
            &mut changed,
        );
        changed
    }
}

/// Keepalive of `peer` in seconds, or `default` if it reports none.
pub(crate) fn effective_keepalive(peer: &Peer, default: u32) -> u32 {
    match peer.keepalive_secs() {
        0 => default,
        secs => secs,
    }
}

pub(crate) fn set_if_changed<T: PartialEq>(
    slot: &mut T,
    value: T,
    field: TunnelField,
    changed: &mut ChangedFields,
) {
    if *slot != value {
        *slot = value;
        changed.insert(field);
    }
}
