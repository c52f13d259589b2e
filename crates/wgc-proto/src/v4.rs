//! Request/response envelope used by the v4 family.
//!
//! ## Binary Format
//!
//! ```text
//!  0      1      2      4           8             12            16            20            24
//!  | op   | htype| pad  | xid:u32   | client addr | client port | server addr | server port |
//!  24: magic cookie [99, 130, 83, 99]
//!  28: options... end marker (255)
//! ```
//!
//! The message type travels in the message-type option rather than the header.

use crate::codes::{OPTION_MESSAGE_SENDER, OPTION_MESSAGE_TYPE, V4_MAGIC_COOKIE};
use crate::error::{ProtoError, Result};
use crate::family::AddressFamily;
use crate::message::{MessageSender, OptionList};
use crate::option::{OptionValue, TunnelOption};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::RngCore;
use std::net::{Ipv4Addr, SocketAddr};

/// Length of the fixed header, excluding the magic cookie.
pub const V4_HEADER_LEN: usize = 24;

/// Hardware type tag written by every builder.
pub const V4_HTYPE: u8 = 1;

/// Operation code in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    /// Request from the initiating side.
    Request = 101,
    /// Reply to a request.
    Reply = 102,
}

impl TryFrom<u8> for Operation {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            101 => Ok(Self::Request),
            102 => Ok(Self::Reply),
            other => Err(ProtoError::UnknownOperation(other)),
        }
    }
}

/// Message types for the v4 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum V4MessageType {
    /// Server announcement.
    Server = 101,
    /// Client announcement.
    Client = 102,
    /// Discover a tunnel server.
    Discover = 103,
    /// Offer from a tunnel server.
    Offer = 104,
    /// Request a tunnel.
    Request = 105,
    /// Acknowledge a tunnel request.
    Ack = 106,
    /// Ping through the tunnel.
    TunnelPing = 107,
    /// Reply to a tunnel ping.
    TunnelPingReply = 108,
    /// Ask the peer for its view of shared tunnels.
    InfoRequest = 109,
    /// Peer's view of one shared tunnel.
    InfoRequestReply = 110,
}

impl TryFrom<u8> for V4MessageType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            101 => Self::Server,
            102 => Self::Client,
            103 => Self::Discover,
            104 => Self::Offer,
            105 => Self::Request,
            106 => Self::Ack,
            107 => Self::TunnelPing,
            108 => Self::TunnelPingReply,
            109 => Self::InfoRequest,
            110 => Self::InfoRequestReply,
            other => return Err(ProtoError::UnknownMessageType(other)),
        })
    }
}

/// Generates a full-width random transaction id.
#[must_use]
pub fn generate_transaction_id() -> u32 {
    rand::thread_rng().next_u32()
}

/// A v4 request/response message.
///
/// `local_addr` and `remote_addr` describe the transport sockets and are not
/// serialized; decoders take them from the receiving socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V4Message {
    /// Local socket the message is sent from or was received on.
    pub local_addr: SocketAddr,
    /// Remote socket the message is sent to or was received from.
    pub remote_addr: SocketAddr,
    /// Request or reply.
    pub op: Operation,
    /// Hardware type tag.
    pub htype: u8,
    /// Transaction id, echoed by replies.
    pub transaction_id: u32,
    /// Address of the requesting endpoint.
    pub client_addr: Ipv4Addr,
    /// Port of the requesting endpoint.
    pub client_port: u16,
    /// Address of the addressed endpoint.
    pub server_addr: Ipv4Addr,
    /// Port of the addressed endpoint.
    pub server_port: u16,
    /// Option sequence.
    pub options: OptionList,
}

impl V4Message {
    /// Creates an empty request with a fresh transaction id.
    #[must_use]
    pub fn new(local_addr: SocketAddr, remote_addr: SocketAddr) -> Self {
        Self {
            local_addr,
            remote_addr,
            op: Operation::Request,
            htype: V4_HTYPE,
            transaction_id: generate_transaction_id(),
            client_addr: Ipv4Addr::UNSPECIFIED,
            client_port: 0,
            server_addr: Ipv4Addr::UNSPECIFIED,
            server_port: 0,
            options: OptionList::new(),
        }
    }

    /// Message type from the message-type option.
    ///
    /// Returns `None` if the option is absent or holds an unknown value.
    #[must_use]
    pub fn message_type(&self) -> Option<V4MessageType> {
        self.options
            .get_byte(OPTION_MESSAGE_TYPE)
            .and_then(|b| V4MessageType::try_from(b).ok())
    }

    /// Sets the message-type option, replacing any previous one.
    pub fn set_message_type(&mut self, message_type: V4MessageType) {
        self.options.set(TunnelOption::from_parts(
            OPTION_MESSAGE_TYPE,
            AddressFamily::V4,
            OptionValue::Byte(message_type as u8),
        ));
    }

    /// Sender role from the message-sender option.
    #[must_use]
    pub fn sender(&self) -> Option<MessageSender> {
        self.options.sender(AddressFamily::V4)
    }

    /// Sets the message-sender option, replacing any previous one.
    pub fn set_sender(&mut self, sender: MessageSender) {
        self.options.set(TunnelOption::from_parts(
            OPTION_MESSAGE_SENDER,
            AddressFamily::V4,
            OptionValue::Byte(sender.to_wire(AddressFamily::V4)),
        ));
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        V4_HEADER_LEN + V4_MAGIC_COOKIE.len() + self.options.encoded_len()
    }

    /// Serializes the message.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.op as u8);
        buf.put_u8(self.htype);
        buf.put_u16(0);
        buf.put_u32(self.transaction_id);
        buf.put_slice(&self.client_addr.octets());
        buf.put_u32(u32::from(self.client_port));
        buf.put_slice(&self.server_addr.octets());
        buf.put_u32(u32::from(self.server_port));
        buf.put_slice(&V4_MAGIC_COOKIE);
        self.options.encode(&mut buf);
        buf.freeze()
    }

    /// Parses a message received between the given sockets.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is truncated, the operation or magic
    /// cookie is wrong, a port does not fit in 16 bits, or an option is
    /// malformed.
    pub fn decode(mut buf: &[u8], local_addr: SocketAddr, remote_addr: SocketAddr) -> Result<Self> {
        let needed = V4_HEADER_LEN + V4_MAGIC_COOKIE.len();
        if buf.remaining() < needed {
            return Err(ProtoError::truncated("v4 header", needed, buf.remaining()));
        }
        let op = Operation::try_from(buf.get_u8())?;
        let htype = buf.get_u8();
        buf.advance(2);
        let transaction_id = buf.get_u32();
        let client_addr = Ipv4Addr::from(buf.get_u32());
        let client_port = read_port(&mut buf)?;
        let server_addr = Ipv4Addr::from(buf.get_u32());
        let server_port = read_port(&mut buf)?;

        let mut cookie = [0u8; 4];
        buf.copy_to_slice(&mut cookie);
        if cookie != V4_MAGIC_COOKIE {
            return Err(ProtoError::BadMagicCookie(cookie));
        }

        let options = OptionList::decode(buf, AddressFamily::V4)?;
        Ok(Self {
            local_addr,
            remote_addr,
            op,
            htype,
            transaction_id,
            client_addr,
            client_port,
            server_addr,
            server_port,
            options,
        })
    }
}

fn read_port(buf: &mut &[u8]) -> Result<u16> {
    let raw = buf.get_u32();
    u16::try_from(raw).map_err(|_| ProtoError::InvalidPort(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::*;

    fn sock(s: &str) -> SocketAddr {
        s.parse().expect("socket addr")
    }

    fn sample() -> V4Message {
        let mut msg = V4Message::new(sock("10.10.0.1:268"), sock("10.10.0.2:268"));
        msg.client_addr = "10.10.0.1".parse().expect("addr");
        msg.client_port = 268;
        msg.server_addr = "192.0.2.7".parse().expect("addr");
        msg.server_port = 268;
        msg.set_message_type(V4MessageType::InfoRequest);
        msg.options.push(
            TunnelOption::ip(
                OPTION_LOCAL_TUNNEL_INET_ADDR,
                AddressFamily::V4,
                "10.10.0.2".parse().expect("addr"),
            )
            .expect("opt"),
        );
        msg
    }

    #[test]
    fn header_layout() {
        let msg = sample();
        let wire = msg.encode();
        assert_eq!(wire[0], 101);
        assert_eq!(wire[1], 1);
        assert_eq!(&wire[2..4], &[0, 0]);
        assert_eq!(&wire[4..8], &msg.transaction_id.to_be_bytes());
        assert_eq!(&wire[8..12], &[10, 10, 0, 1]);
        assert_eq!(&wire[12..16], &[0, 0, 1, 12]);
        assert_eq!(&wire[16..20], &[192, 0, 2, 7]);
        assert_eq!(&wire[24..28], &V4_MAGIC_COOKIE);
        assert_eq!(&wire[wire.len() - 4..], &[0, 0, 0, 255]);
        assert_eq!(wire.len(), msg.encoded_len());
    }

    #[test]
    fn round_trip_preserves_everything() {
        let msg = sample();
        let back = V4Message::decode(&msg.encode(), msg.local_addr, msg.remote_addr)
            .expect("decode");
        assert_eq!(back, msg);
        assert_eq!(back.message_type(), Some(V4MessageType::InfoRequest));
    }

    #[test]
    fn set_message_type_replaces() {
        let mut msg = sample();
        msg.set_message_type(V4MessageType::InfoRequestReply);
        assert_eq!(msg.options.get_all(OPTION_MESSAGE_TYPE).count(), 1);
        assert_eq!(msg.message_type(), Some(V4MessageType::InfoRequestReply));
    }

    #[test]
    fn sender_round_trip() {
        let mut msg = sample();
        msg.set_sender(MessageSender::Server);
        assert_eq!(msg.options.get_byte(OPTION_MESSAGE_SENDER), Some(101));
        assert_eq!(msg.sender(), Some(MessageSender::Server));
    }

    #[test]
    fn bad_cookie_rejected() {
        let mut wire = BytesMut::from(sample().encode().as_ref());
        wire[25] = 0;
        let err = V4Message::decode(&wire, sock("0.0.0.0:0"), sock("0.0.0.0:0"))
            .expect_err("cookie");
        assert!(matches!(err, ProtoError::BadMagicCookie(_)));
    }

    #[test]
    fn bad_operation_rejected() {
        let mut wire = BytesMut::from(sample().encode().as_ref());
        wire[0] = 7;
        let err = V4Message::decode(&wire, sock("0.0.0.0:0"), sock("0.0.0.0:0"))
            .expect_err("op");
        assert_eq!(err, ProtoError::UnknownOperation(7));
    }

    #[test]
    fn short_header_rejected() {
        let err = V4Message::decode(&[101, 1, 0], sock("0.0.0.0:0"), sock("0.0.0.0:0"))
            .expect_err("short");
        assert_eq!(err, ProtoError::truncated("v4 header", 28, 3));
    }

    #[test]
    fn transaction_ids_vary() {
        let ids: std::collections::HashSet<u32> =
            (0..32).map(|_| generate_transaction_id()).collect();
        assert!(ids.len() > 1);
    }

    #[test]
    fn unknown_message_type_is_none() {
        let mut msg = sample();
        msg.options.set(
            TunnelOption::byte(OPTION_MESSAGE_TYPE, AddressFamily::V4, 42).expect("opt"),
        );
        assert_eq!(msg.message_type(), None);
    }
}
