//! Ordered option list shared by both envelopes.
//!
//! Options keep insertion order on the wire. Duplicate codes are allowed:
//! [`OptionList::push`] appends, [`OptionList::set`] replaces every earlier
//! option with the same code, and [`OptionList::get`] returns the last one
//! written.

use crate::codes::{OPTION_EOF, OPTION_MESSAGE_SENDER};
use crate::error::{ProtoError, Result};
use crate::family::AddressFamily;
use crate::option::{OptionKind, TunnelOption};
use bytes::{Buf, BufMut, BytesMut};
use std::net::IpAddr;
use tracing::{debug, trace};

/// Size of the end-of-options marker.
pub const EOF_LEN: usize = 4;

/// Role of the endpoint that sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSender {
    /// Sent by the server side of a tunnel.
    Server,
    /// Sent by the client side of a tunnel.
    Client,
}

impl MessageSender {
    /// Wire value for the family (v4: 101/102, v6: 1/2).
    #[must_use]
    pub const fn to_wire(self, family: AddressFamily) -> u8 {
        let base = match family {
            AddressFamily::V4 => 101,
            AddressFamily::V6 => 1,
        };
        match self {
            Self::Server => base,
            Self::Client => base + 1,
        }
    }

    /// Parses a wire value for the family.
    #[must_use]
    pub const fn from_wire(family: AddressFamily, value: u8) -> Option<Self> {
        match (family, value) {
            (AddressFamily::V4, 101) | (AddressFamily::V6, 1) => Some(Self::Server),
            (AddressFamily::V4, 102) | (AddressFamily::V6, 2) => Some(Self::Client),
            _ => None,
        }
    }
}

/// An ordered sequence of options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionList {
    options: Vec<TunnelOption>,
}

impl OptionList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            options: Vec::new(),
        }
    }

    /// Appends an option, keeping any earlier option with the same code.
    pub fn push(&mut self, option: TunnelOption) {
        self.options.push(option);
    }

    /// Removes every option with the same code, then appends.
    pub fn set(&mut self, option: TunnelOption) {
        let code = option.code();
        self.options.retain(|o| o.code() != code);
        self.options.push(option);
    }

    /// Removes all options with `code`, returning how many were removed.
    pub fn remove(&mut self, code: u32) -> usize {
        let before = self.options.len();
        self.options.retain(|o| o.code() != code);
        before - self.options.len()
    }

    /// Returns the last option written with `code`.
    #[must_use]
    pub fn get(&self, code: u32) -> Option<&TunnelOption> {
        self.options.iter().rev().find(|o| o.code() == code)
    }

    /// Returns every option with `code`, in insertion order.
    pub fn get_all(&self, code: u32) -> impl Iterator<Item = &TunnelOption> {
        self.options.iter().filter(move |o| o.code() == code)
    }

    /// Returns `true` if any option has `code`.
    #[must_use]
    pub fn contains(&self, code: u32) -> bool {
        self.options.iter().any(|o| o.code() == code)
    }

    /// String value of the last option with `code`.
    #[must_use]
    pub fn get_str(&self, code: u32) -> Option<&str> {
        self.get(code).and_then(TunnelOption::as_str)
    }

    /// Byte value of the last option with `code`.
    #[must_use]
    pub fn get_byte(&self, code: u32) -> Option<u8> {
        self.get(code).and_then(TunnelOption::as_byte)
    }

    /// Integer value of the last option with `code`.
    #[must_use]
    pub fn get_uint(&self, code: u32) -> Option<u64> {
        self.get(code).and_then(TunnelOption::as_uint)
    }

    /// Address value of the last option with `code`.
    #[must_use]
    pub fn get_ip(&self, code: u32) -> Option<IpAddr> {
        self.get(code).and_then(TunnelOption::as_ip)
    }

    /// Address value of a required option.
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::MissingOption`] if absent or not an address.
    pub fn require_ip(&self, code: u32) -> Result<IpAddr> {
        self.get_ip(code).ok_or(ProtoError::MissingOption(code))
    }

    /// Iterates options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TunnelOption> {
        self.options.iter()
    }

    /// Number of options, counting duplicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Returns `true` if the list holds no options.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Sender role carried by the message-sender option.
    #[must_use]
    pub fn sender(&self, family: AddressFamily) -> Option<MessageSender> {
        self.get_byte(OPTION_MESSAGE_SENDER)
            .and_then(|b| MessageSender::from_wire(family, b))
    }

    /// Encoded size of all options plus the end marker.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.options.iter().map(TunnelOption::encoded_len).sum::<usize>() + EOF_LEN
    }

    /// Appends every option followed by the end-of-options marker.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        for option in &self.options {
            option.encode(buf);
        }
        buf.put_u32(OPTION_EOF);
    }

    /// Decodes options until the end marker or the end of the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if an option header or value is truncated, or a
    /// registered option carries a malformed value.
    pub fn decode(mut buf: &[u8], family: AddressFamily) -> Result<Self> {
        let mut list = Self::new();
        while buf.has_remaining() {
            if buf.remaining() < 4 {
                return Err(ProtoError::truncated("option code", 4, buf.remaining()));
            }
            let code = buf.get_u32();
            if code == OPTION_EOF {
                if buf.has_remaining() {
                    trace!(trailing = buf.remaining(), "ignoring bytes after end of options");
                }
                break;
            }
            if buf.remaining() < 4 {
                return Err(ProtoError::truncated("option length", 4, buf.remaining()));
            }
            let len = buf.get_u32() as usize;
            if buf.remaining() < len {
                return Err(ProtoError::truncated("option value", len, buf.remaining()));
            }
            let (value, rest) = buf.split_at(len);
            buf = rest;

            let option = TunnelOption::decode(code, family, value)?;
            if option.kind() == OptionKind::Unknown {
                debug!(code, len, %family, "preserving unknown option");
            }
            list.push(option);
        }
        Ok(list)
    }
}

impl<'a> IntoIterator for &'a OptionList {
    type Item = &'a TunnelOption;
    type IntoIter = std::slice::Iter<'a, TunnelOption>;

    fn into_iter(self) -> Self::IntoIter {
        self.options.iter()
    }
}

impl FromIterator<TunnelOption> for OptionList {
    fn from_iter<I: IntoIterator<Item = TunnelOption>>(iter: I) -> Self {
        Self {
            options: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::*;

    fn status(value: &str) -> TunnelOption {
        TunnelOption::string(OPTION_TUNNEL_STATUS, AddressFamily::V4, value).expect("status")
    }

    #[test]
    fn get_returns_last_writer() {
        let mut list = OptionList::new();
        list.push(status("down"));
        list.push(status("up"));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get_str(OPTION_TUNNEL_STATUS), Some("up"));
        let all: Vec<_> = list.get_all(OPTION_TUNNEL_STATUS).filter_map(TunnelOption::as_str).collect();
        assert_eq!(all, vec!["down", "up"]);
    }

    #[test]
    fn set_replaces_all_duplicates() {
        let mut list = OptionList::new();
        list.push(status("a"));
        list.push(status("b"));
        list.set(status("c"));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get_str(OPTION_TUNNEL_STATUS), Some("c"));
    }

    #[test]
    fn duplicates_survive_the_wire_in_order() {
        let mut list = OptionList::new();
        list.push(status("first"));
        list.push(TunnelOption::uint(OPTION_PING_INET_PORT, AddressFamily::V4, 7).expect("port"));
        list.push(status("second"));

        let mut buf = BytesMut::new();
        list.encode(&mut buf);
        assert_eq!(buf.len(), list.encoded_len());

        let back = OptionList::decode(&buf, AddressFamily::V4).expect("decode");
        assert_eq!(back, list);
        assert_eq!(back.get_str(OPTION_TUNNEL_STATUS), Some("second"));
    }

    #[test]
    fn encode_ends_with_marker() {
        let mut buf = BytesMut::new();
        OptionList::new().encode(&mut buf);
        assert_eq!(buf.as_ref(), &[0, 0, 0, 255]);
    }

    #[test]
    fn decode_accepts_missing_marker() {
        let mut buf = BytesMut::new();
        status("up").encode(&mut buf);
        let list = OptionList::decode(&buf, AddressFamily::V4).expect("decode");
        assert_eq!(list.get_str(OPTION_TUNNEL_STATUS), Some("up"));
    }

    #[test]
    fn decode_ignores_bytes_after_marker() {
        let mut buf = BytesMut::new();
        let mut list = OptionList::new();
        list.push(status("up"));
        list.encode(&mut buf);
        buf.put_slice(&[1, 2, 3]);
        let back = OptionList::decode(&buf, AddressFamily::V4).expect("decode");
        assert_eq!(back, list);
    }

    #[test]
    fn decode_truncated_value_fails() {
        let mut buf = BytesMut::new();
        buf.put_u32(OPTION_TUNNEL_STATUS);
        buf.put_u32(10);
        buf.put_slice(b"abc");
        let err = OptionList::decode(&buf, AddressFamily::V4).expect_err("truncated");
        assert_eq!(err, ProtoError::truncated("option value", 10, 3));
    }

    #[test]
    fn decode_truncated_code_fails() {
        let err = OptionList::decode(&[0, 0], AddressFamily::V6).expect_err("truncated");
        assert!(err.is_framing());
    }

    #[test]
    fn unknown_option_survives_list_round_trip() {
        let mut buf = BytesMut::new();
        buf.put_u32(OPTION_CLIENT_OTHER_PHYS_INET_ADDRS);
        buf.put_u32(3);
        buf.put_slice(&[9, 8, 7]);
        buf.put_u32(OPTION_EOF);

        let list = OptionList::decode(&buf, AddressFamily::V6).expect("decode");
        assert_eq!(list.len(), 1);
        let mut again = BytesMut::new();
        list.encode(&mut again);
        assert_eq!(again, buf);
    }

    #[test]
    fn sender_values_per_family() {
        assert_eq!(MessageSender::Server.to_wire(AddressFamily::V4), 101);
        assert_eq!(MessageSender::Client.to_wire(AddressFamily::V6), 2);
        assert_eq!(MessageSender::from_wire(AddressFamily::V4, 2), None);
        assert_eq!(
            MessageSender::from_wire(AddressFamily::V6, 1),
            Some(MessageSender::Server)
        );
    }

    #[test]
    fn require_ip_reports_missing_code() {
        let list = OptionList::new();
        assert_eq!(
            list.require_ip(OPTION_LOCAL_TUNNEL_INET_ADDR),
            Err(ProtoError::MissingOption(OPTION_LOCAL_TUNNEL_INET_ADDR))
        );
    }
}
