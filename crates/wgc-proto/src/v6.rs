//! Simple envelope used by the v6 family.
//!
//! ## Binary Format
//!
//! ```text
//!  0          1                4
//!  | msg type | xid:u24        | options... end marker (255)
//! ```

use crate::codes::OPTION_MESSAGE_SENDER;
use crate::error::{ProtoError, Result};
use crate::family::AddressFamily;
use crate::message::{MessageSender, OptionList};
use crate::option::{OptionValue, TunnelOption};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::Rng;
use std::net::SocketAddr;

/// Length of the fixed header.
pub const V6_HEADER_LEN: usize = 4;

/// Largest transaction id the 24-bit header field can carry.
pub const V6_MAX_TRANSACTION_ID: u32 = 0x00FF_FFFF;

/// Message types for the v6 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum V6MessageType {
    /// Server announcement.
    Server = 1,
    /// Client announcement.
    Client = 2,
    /// Solicit a tunnel server.
    Solicit = 3,
    /// Advertisement from a tunnel server.
    Advertise = 4,
    /// Request a tunnel.
    Request = 5,
    /// Reply to a tunnel request.
    Reply = 6,
    /// Ping through the tunnel.
    TunnelPing = 7,
    /// Reply to a tunnel ping.
    TunnelPingReply = 8,
    /// Ask the peer for its view of shared tunnels.
    InfoRequest = 9,
    /// Peer's view of one shared tunnel.
    InfoRequestReply = 10,
}

impl TryFrom<u8> for V6MessageType {
    type Error = ProtoError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::Server,
            2 => Self::Client,
            3 => Self::Solicit,
            4 => Self::Advertise,
            5 => Self::Request,
            6 => Self::Reply,
            7 => Self::TunnelPing,
            8 => Self::TunnelPingReply,
            9 => Self::InfoRequest,
            10 => Self::InfoRequestReply,
            other => return Err(ProtoError::UnknownMessageType(other)),
        })
    }
}

/// Generates a random 24-bit transaction id.
#[must_use]
pub fn generate_transaction_id() -> u32 {
    rand::thread_rng().gen_range(0..=V6_MAX_TRANSACTION_ID)
}

/// A v6 message.
///
/// The socket addresses are transport metadata and are not serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V6Message {
    /// Local tunnel socket.
    pub local_addr: SocketAddr,
    /// Remote tunnel socket.
    pub remote_addr: SocketAddr,
    /// Message type discriminator.
    pub message_type: V6MessageType,
    /// 24-bit transaction id.
    pub transaction_id: u32,
    /// Option sequence.
    pub options: OptionList,
}

impl V6Message {
    /// Creates an empty message with a fresh transaction id.
    #[must_use]
    pub fn new(local_addr: SocketAddr, remote_addr: SocketAddr, message_type: V6MessageType) -> Self {
        Self {
            local_addr,
            remote_addr,
            message_type,
            transaction_id: generate_transaction_id(),
            options: OptionList::new(),
        }
    }

    /// Sender role from the message-sender option.
    #[must_use]
    pub fn sender(&self) -> Option<MessageSender> {
        self.options.sender(AddressFamily::V6)
    }

    /// Sets the message-sender option, replacing any previous one.
    pub fn set_sender(&mut self, sender: MessageSender) {
        self.options.set(TunnelOption::from_parts(
            OPTION_MESSAGE_SENDER,
            AddressFamily::V6,
            OptionValue::Byte(sender.to_wire(AddressFamily::V6)),
        ));
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        V6_HEADER_LEN + self.options.encoded_len()
    }

    /// Serializes the message.
    ///
    /// The header is 4 bytes: the message type, then the transaction id as a
    /// 24-bit big-endian value with no padding. Only the low 24 bits of the
    /// transaction id are written. Options follow, closed by the end marker.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.message_type as u8);
        buf.put_uint(u64::from(self.transaction_id & V6_MAX_TRANSACTION_ID), 3);
        self.options.encode(&mut buf);
        buf.freeze()
    }

    /// Parses a message received between the given sockets.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is truncated, the message type is
    /// unknown, or an option is malformed.
    pub fn decode(mut buf: &[u8], local_addr: SocketAddr, remote_addr: SocketAddr) -> Result<Self> {
        if buf.remaining() < V6_HEADER_LEN {
            return Err(ProtoError::truncated("v6 header", V6_HEADER_LEN, buf.remaining()));
        }
        let message_type = V6MessageType::try_from(buf.get_u8())?;
        let transaction_id = buf.get_uint(3) as u32;
        let options = OptionList::decode(buf, AddressFamily::V6)?;
        Ok(Self {
            local_addr,
            remote_addr,
            message_type,
            transaction_id,
            options,
        })
    }
}
