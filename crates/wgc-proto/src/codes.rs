//! Numeric option codes and well-known ports shared by both families.

/// Message type (v4 only; v6 carries it in the header).
pub const OPTION_MESSAGE_TYPE: u32 = 153;
/// Role of the sender (server or client).
pub const OPTION_MESSAGE_SENDER: u32 = 154;

/// Physical address of the remote endpoint.
pub const OPTION_REMOTE_PHYS_INET_ADDR: u32 = 155;
/// Physical address of the local endpoint.
pub const OPTION_LOCAL_PHYS_INET_ADDR: u32 = 156;

/// Tunnel-side address of the local endpoint.
pub const OPTION_LOCAL_TUNNEL_INET_ADDR: u32 = 157;
/// Tunnel-side address of the remote endpoint.
pub const OPTION_REMOTE_TUNNEL_INET_ADDR: u32 = 158;

/// Control-channel port on the remote tunnel address.
pub const OPTION_REMOTE_TUNNEL_INET_COM_PORT: u32 = 159;

/// Tunnel interface name.
pub const OPTION_INTERFACE_NAME: u32 = 160;

/// Remote `WireGuard` public key.
pub const OPTION_REMOTE_WG_PUBLIC_KEY: u32 = 161;
/// Local `WireGuard` public key.
pub const OPTION_LOCAL_WG_PUBLIC_KEY: u32 = 162;

/// Endpoint role of the remote side.
pub const OPTION_REMOTE_ENDPOINT_TYPE: u32 = 163;
/// Endpoint role of the local side.
pub const OPTION_LOCAL_ENDPOINT_TYPE: u32 = 164;

/// Tunnel listen port of the remote endpoint.
pub const OPTION_REMOTE_PHYS_INET_LISTEN_PORT: u32 = 165;
/// Tunnel listen port of the local endpoint.
pub const OPTION_LOCAL_PHYS_INET_LISTEN_PORT: u32 = 166;

/// Control-channel port of the remote endpoint.
pub const OPTION_REMOTE_PHYS_INET_COM_PORT: u32 = 167;
/// Control-channel port of the local endpoint.
pub const OPTION_LOCAL_PHYS_INET_COM_PORT: u32 = 168;

/// Tunnel record id.
pub const OPTION_TUNNEL_ID: u32 = 169;
/// Free-form identifier.
pub const OPTION_GENERIC_ID: u32 = 170;
/// Persistent keepalive interval in seconds.
pub const OPTION_KEEPALIVE_POLICY: u32 = 171;
/// Tunnel status string.
pub const OPTION_TUNNEL_STATUS: u32 = 172;
/// Accept/decline response code, see the `RESPONSE_*` constants.
pub const OPTION_GENERIC_RESPONSE: u32 = 173;
/// Free-form diagnostic text.
pub const OPTION_SPECIFIC_INFO: u32 = 174;
/// Additional physical addresses of a client. No registered kind.
pub const OPTION_CLIENT_OTHER_PHYS_INET_ADDRS: u32 = 175;
/// Public key used outside the tunnel handshake.
pub const OPTION_GENERIC_PUBLIC_KEY: u32 = 176;
/// Raw local public key bytes.
pub const OPTION_LOCAL_GENERIC_PUBLIC_KEY: u32 = 177;
/// Address to ping through the tunnel.
pub const OPTION_PING_INET_ADDR: u32 = 178;
/// Port to ping through the tunnel.
pub const OPTION_PING_INET_PORT: u32 = 179;
/// Tunnel network in CIDR notation.
pub const OPTION_TUNNEL_NETWORK: u32 = 180;

/// Reserved end-of-options marker.
pub const OPTION_EOF: u32 = 255;

/// Generic response: request accepted.
pub const RESPONSE_ACCEPT: u32 = 0;
/// Generic response: declined because the public key is already in use.
pub const RESPONSE_DECLINE_REDUNDANT_PUBLIC_KEY: u32 = 1;
/// Generic response: declined because the tunnel network is unusable.
pub const RESPONSE_DECLINE_TUNNEL_NETWORK: u32 = 2;

/// Default control port for the v4 family.
pub const V4_DEFAULT_PORT: u16 = 268;
/// Default control port for the v6 family.
pub const V6_DEFAULT_PORT: u16 = 547;
/// Multicast control port for the v6 family.
pub const V6_MULTICAST_PORT: u16 = 548;

/// Magic cookie that precedes the v4 option sequence.
pub const V4_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
