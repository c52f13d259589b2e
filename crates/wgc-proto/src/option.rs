//! Typed option model and byte-level encoding.
//!
//! ## Binary Format
//!
//! - Option: `[code:u32] [length:u32] [value...]`
//! - Value kinds:
//!   - string: UTF-8 bytes, no terminator
//!   - byte: 1 byte
//!   - uint: 4 bytes big-endian
//!   - ip: 4 bytes (IPv4) or 16 bytes (IPv6)
//!   - bytes / unknown: raw payload

use crate::codes::OPTION_EOF;
use crate::error::{ProtoError, Result};
use crate::family::AddressFamily;
use crate::registry;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Size of the `code` and `length` framing fields.
pub const OPTION_HEADER_LEN: usize = 8;

/// The kind of value an option code carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    /// UTF-8 text.
    String,
    /// Unsigned byte, 0 to 255.
    Byte,
    /// Unsigned 32-bit integer.
    UInt,
    /// IPv4 or IPv6 address.
    Ip,
    /// Opaque bytes passed through unchanged.
    Bytes,
    /// Unregistered code, raw payload preserved.
    Unknown,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Byte => "byte",
            Self::UInt => "uint",
            Self::Ip => "ip",
            Self::Bytes => "bytes",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A decoded option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// UTF-8 text.
    String(String),
    /// Unsigned byte.
    Byte(u8),
    /// Unsigned 32-bit integer.
    UInt(u32),
    /// IP address.
    Ip(IpAddr),
    /// Opaque bytes.
    Bytes(Bytes),
    /// Raw payload of an unregistered code.
    Unknown(Bytes),
}

impl OptionValue {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> OptionKind {
        match self {
            Self::String(_) => OptionKind::String,
            Self::Byte(_) => OptionKind::Byte,
            Self::UInt(_) => OptionKind::UInt,
            Self::Ip(_) => OptionKind::Ip,
            Self::Bytes(_) => OptionKind::Bytes,
            Self::Unknown(_) => OptionKind::Unknown,
        }
    }

    /// The value a freshly resolved option holds before decoding.
    #[must_use]
    pub fn empty(kind: OptionKind, family: AddressFamily) -> Self {
        match kind {
            OptionKind::String => Self::String(String::new()),
            OptionKind::Byte => Self::Byte(0),
            OptionKind::UInt => Self::UInt(0),
            OptionKind::Ip => Self::Ip(family.unspecified()),
            OptionKind::Bytes => Self::Bytes(Bytes::new()),
            OptionKind::Unknown => Self::Unknown(Bytes::new()),
        }
    }

    /// Length of the encoded value in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::String(s) => s.len(),
            Self::Byte(_) => 1,
            Self::UInt(_) => 4,
            Self::Ip(IpAddr::V4(_)) => 4,
            Self::Ip(IpAddr::V6(_)) => 16,
            Self::Bytes(b) | Self::Unknown(b) => b.len(),
        }
    }

    fn put(&self, buf: &mut BytesMut) {
        match self {
            Self::String(s) => buf.put_slice(s.as_bytes()),
            Self::Byte(b) => buf.put_u8(*b),
            Self::UInt(v) => buf.put_u32(*v),
            Self::Ip(IpAddr::V4(a)) => buf.put_slice(&a.octets()),
            Self::Ip(IpAddr::V6(a)) => buf.put_slice(&a.octets()),
            Self::Bytes(b) | Self::Unknown(b) => buf.put_slice(b),
        }
    }

    fn parse(kind: OptionKind, code: u32, payload: &[u8]) -> Result<Self> {
        match kind {
            OptionKind::String => std::str::from_utf8(payload)
                .map(|s| Self::String(s.to_string()))
                .map_err(|_| ProtoError::InvalidUtf8 { code }),
            OptionKind::Byte => match payload {
                [b] => Ok(Self::Byte(*b)),
                _ => Err(ProtoError::InvalidLength {
                    code,
                    expected: "1",
                    actual: payload.len(),
                }),
            },
            OptionKind::UInt => <[u8; 4]>::try_from(payload)
                .map(|b| Self::UInt(u32::from_be_bytes(b)))
                .map_err(|_| ProtoError::InvalidLength {
                    code,
                    expected: "4",
                    actual: payload.len(),
                }),
            OptionKind::Ip => {
                if let Ok(octets) = <[u8; 4]>::try_from(payload) {
                    Ok(Self::Ip(IpAddr::V4(Ipv4Addr::from(octets))))
                } else if let Ok(octets) = <[u8; 16]>::try_from(payload) {
                    Ok(Self::Ip(IpAddr::V6(Ipv6Addr::from(octets))))
                } else {
                    Err(ProtoError::InvalidLength {
                        code,
                        expected: "4 or 16",
                        actual: payload.len(),
                    })
                }
            }
            OptionKind::Bytes => Ok(Self::Bytes(Bytes::copy_from_slice(payload))),
            OptionKind::Unknown => Ok(Self::Unknown(Bytes::copy_from_slice(payload))),
        }
    }
}

/// A typed option tagged with its code and address family.
///
/// The code is always stamped from the registry's view of the family, so
/// every constructor of the same code produces the same tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelOption {
    code: u32,
    family: AddressFamily,
    value: OptionValue,
}

impl TunnelOption {
    /// Creates an option, checking the value against the registered kind.
    ///
    /// Unregistered codes only accept [`OptionValue::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns an error for the reserved end-of-options code or when the value
    /// kind does not match the registry.
    pub fn new(code: u32, family: AddressFamily, value: OptionValue) -> Result<Self> {
        if code == OPTION_EOF {
            return Err(ProtoError::ReservedCode(code));
        }
        let expected = registry::kind_of(code, family);
        if value.kind() != expected {
            return Err(ProtoError::KindMismatch {
                code,
                expected,
                actual: value.kind(),
            });
        }
        Ok(Self {
            code,
            family,
            value,
        })
    }

    /// Creates a value-less option, ready to receive a decoded payload.
    ///
    /// # Errors
    ///
    /// Returns an error for the reserved end-of-options code.
    pub fn empty(code: u32, family: AddressFamily) -> Result<Self> {
        if code == OPTION_EOF {
            return Err(ProtoError::ReservedCode(code));
        }
        Ok(registry::resolve(code, family))
    }

    /// Creates a string option.
    ///
    /// # Errors
    ///
    /// Returns an error if `code` is not a string option for `family`.
    pub fn string(code: u32, family: AddressFamily, value: impl Into<String>) -> Result<Self> {
        Self::new(code, family, OptionValue::String(value.into()))
    }

    /// Creates an unsigned byte option.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` exceeds 255 or `code` is not a byte option.
    pub fn byte(code: u32, family: AddressFamily, value: u32) -> Result<Self> {
        let b = u8::try_from(value)
            .map_err(|_| ProtoError::invalid_value(code, format!("{value} exceeds 255")))?;
        Self::new(code, family, OptionValue::Byte(b))
    }

    /// Creates an unsigned 32-bit integer option.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` exceeds `u32::MAX` or `code` is not a uint option.
    pub fn uint(code: u32, family: AddressFamily, value: u64) -> Result<Self> {
        let v = u32::try_from(value)
            .map_err(|_| ProtoError::invalid_value(code, format!("{value} exceeds u32")))?;
        Self::new(code, family, OptionValue::UInt(v))
    }

    /// Creates an IP address option.
    ///
    /// # Errors
    ///
    /// Returns an error if `code` is not an IP option for `family`.
    pub fn ip(code: u32, family: AddressFamily, value: IpAddr) -> Result<Self> {
        Self::new(code, family, OptionValue::Ip(value))
    }

    /// Creates an opaque byte array option.
    ///
    /// # Errors
    ///
    /// Returns an error if `code` is not a bytes option for `family`.
    pub fn bytes(code: u32, family: AddressFamily, value: impl Into<Bytes>) -> Result<Self> {
        Self::new(code, family, OptionValue::Bytes(value.into()))
    }

    /// Creates an option for a code the registry does not know.
    ///
    /// # Errors
    ///
    /// Returns an error if `code` is registered for `family` or reserved.
    pub fn unknown(code: u32, family: AddressFamily, raw: impl Into<Bytes>) -> Result<Self> {
        Self::new(code, family, OptionValue::Unknown(raw.into()))
    }

    /// Decodes an option payload (the bytes after the length field).
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not fit the registered kind.
    pub fn decode(code: u32, family: AddressFamily, payload: &[u8]) -> Result<Self> {
        let mut option = Self::empty(code, family)?;
        option.value = OptionValue::parse(option.value.kind(), code, payload)?;
        Ok(option)
    }

    pub(crate) const fn from_parts(code: u32, family: AddressFamily, value: OptionValue) -> Self {
        Self {
            code,
            family,
            value,
        }
    }

    /// Numeric option code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        self.code
    }

    /// Address family the option was built for.
    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        self.family
    }

    /// The typed value.
    #[must_use]
    pub const fn value(&self) -> &OptionValue {
        &self.value
    }

    /// The value kind.
    #[must_use]
    pub const fn kind(&self) -> OptionKind {
        self.value.kind()
    }

    /// Human-readable option name from the registry.
    #[must_use]
    pub fn name(&self) -> &'static str {
        registry::lookup(self.code, self.family).map_or("unknown", |spec| spec.name)
    }

    /// Returns the string value, if this is a string option.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the byte value, if this is a byte option.
    #[must_use]
    pub const fn as_byte(&self) -> Option<u8> {
        match self.value {
            OptionValue::Byte(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the integer value widened to `u64`, if this is a uint option.
    #[must_use]
    pub const fn as_uint(&self) -> Option<u64> {
        match self.value {
            OptionValue::UInt(v) => Some(v as u64),
            _ => None,
        }
    }

    /// Returns the address, if this is an IP option.
    #[must_use]
    pub const fn as_ip(&self) -> Option<IpAddr> {
        match self.value {
            OptionValue::Ip(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the raw bytes of a bytes or unknown option.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            OptionValue::Bytes(b) | OptionValue::Unknown(b) => Some(b),
            _ => None,
        }
    }

    /// Total encoded size including the code and length fields.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        OPTION_HEADER_LEN + self.value.encoded_len()
    }

    /// Appends the encoded option to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32(self.code);
        buf.put_u32(self.value.encoded_len() as u32);
        self.value.put(buf);
    }

    /// Encodes the option into a new buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl fmt::Display for TunnelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})=", self.name(), self.code)?;
        match &self.value {
            OptionValue::String(s) => write!(f, "{s:?}"),
            OptionValue::Byte(b) => write!(f, "{b}"),
            OptionValue::UInt(v) => write!(f, "{v}"),
            OptionValue::Ip(a) => write!(f, "{a}"),
            OptionValue::Bytes(b) | OptionValue::Unknown(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::*;
    use test_case::test_case;

    fn payload(option: &TunnelOption) -> Bytes {
        option.to_bytes().slice(OPTION_HEADER_LEN..)
    }

    #[test]
    fn uint_is_big_endian() {
        let opt = TunnelOption::uint(OPTION_REMOTE_TUNNEL_INET_COM_PORT, AddressFamily::V4, 268)
            .expect("uint");
        assert_eq!(
            opt.to_bytes().as_ref(),
            &[0, 0, 0, 159, 0, 0, 0, 4, 0, 0, 1, 12]
        );
    }

    #[test]
    fn string_has_no_terminator() {
        let opt = TunnelOption::string(OPTION_INTERFACE_NAME, AddressFamily::V6, "v6wgconnect0")
            .expect("string");
        assert_eq!(payload(&opt).as_ref(), b"v6wgconnect0");
        assert_eq!(opt.encoded_len(), 8 + 12);
    }

    #[test_case("10.0.0.5", 4 ; "ipv4 dotted quad")]
    #[test_case("fd00::1", 16 ; "ipv6 literal")]
    fn ip_width_follows_address(addr: &str, width: usize) {
        let ip: IpAddr = addr.parse().expect("addr");
        let opt = TunnelOption::ip(OPTION_LOCAL_TUNNEL_INET_ADDR, AddressFamily::V4, ip)
            .expect("ip");
        assert_eq!(payload(&opt).len(), width);
        let back = TunnelOption::decode(opt.code(), opt.family(), &payload(&opt)).expect("decode");
        assert_eq!(back.as_ip(), Some(ip));
    }

    #[test]
    fn byte_range_checked() {
        assert!(TunnelOption::byte(OPTION_MESSAGE_SENDER, AddressFamily::V4, 255).is_ok());
        let err = TunnelOption::byte(OPTION_MESSAGE_SENDER, AddressFamily::V4, 256)
            .expect_err("out of range");
        assert!(matches!(err, ProtoError::InvalidValue { code: 154, .. }));
    }

    #[test]
    fn uint_range_checked() {
        let max = u64::from(u32::MAX);
        let opt = TunnelOption::uint(OPTION_KEEPALIVE_POLICY, AddressFamily::V6, max)
            .expect("max fits");
        assert_eq!(opt.as_uint(), Some(max));
        assert!(TunnelOption::uint(OPTION_KEEPALIVE_POLICY, AddressFamily::V6, max + 1).is_err());
    }

    #[test]
    fn code_stamping_is_constructor_invariant() {
        let empty = TunnelOption::empty(OPTION_LOCAL_TUNNEL_INET_ADDR, AddressFamily::V4)
            .expect("empty");
        let valued = TunnelOption::ip(
            OPTION_LOCAL_TUNNEL_INET_ADDR,
            AddressFamily::V4,
            "10.10.0.1".parse().expect("addr"),
        )
        .expect("valued");
        assert_eq!(empty.code(), valued.code());
        assert_eq!(empty.kind(), valued.kind());
        assert_eq!(empty.name(), "local tunnel addr");
        assert_eq!(empty.as_ip(), Some(AddressFamily::V4.unspecified()));
    }

    #[test]
    fn kind_mismatch_rejected() {
        let err = TunnelOption::string(OPTION_LOCAL_TUNNEL_INET_ADDR, AddressFamily::V4, "x")
            .expect_err("wrong kind");
        assert_eq!(
            err,
            ProtoError::KindMismatch {
                code: OPTION_LOCAL_TUNNEL_INET_ADDR,
                expected: OptionKind::Ip,
                actual: OptionKind::String,
            }
        );
    }

    #[test]
    fn reserved_code_rejected() {
        assert_eq!(
            TunnelOption::unknown(OPTION_EOF, AddressFamily::V4, vec![1]),
            Err(ProtoError::ReservedCode(OPTION_EOF))
        );
        assert!(TunnelOption::empty(OPTION_EOF, AddressFamily::V6).is_err());
    }

    #[test]
    fn unregistered_code_decodes_as_unknown() {
        let raw = [0xde, 0xad, 0xbe, 0xef];
        let opt = TunnelOption::decode(200, AddressFamily::V4, &raw).expect("decode");
        assert_eq!(opt.kind(), OptionKind::Unknown);
        assert_eq!(opt.code(), 200);
        assert_eq!(opt.as_bytes(), Some(raw.as_slice()));
        assert_eq!(payload(&opt).as_ref(), &raw);
    }

    #[test]
    fn message_type_is_unknown_in_v6() {
        let opt = TunnelOption::decode(OPTION_MESSAGE_TYPE, AddressFamily::V6, &[9]).expect("decode");
        assert_eq!(opt.kind(), OptionKind::Unknown);
        let opt = TunnelOption::decode(OPTION_MESSAGE_TYPE, AddressFamily::V4, &[109]).expect("decode");
        assert_eq!(opt.as_byte(), Some(109));
    }

    #[test_case(OPTION_MESSAGE_SENDER, &[1, 2] ; "byte too long")]
    #[test_case(OPTION_PING_INET_PORT, &[0, 1] ; "uint too short")]
    #[test_case(OPTION_PING_INET_ADDR, &[1, 2, 3] ; "ip odd width")]
    fn bad_length_rejected(code: u32, raw: &[u8]) {
        let err = TunnelOption::decode(code, AddressFamily::V4, raw).expect_err("bad length");
        assert!(matches!(err, ProtoError::InvalidLength { .. }));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let err = TunnelOption::decode(OPTION_TUNNEL_STATUS, AddressFamily::V4, &[0xff, 0xfe])
            .expect_err("utf8");
        assert_eq!(err, ProtoError::InvalidUtf8 { code: OPTION_TUNNEL_STATUS });
    }

    #[test]
    fn display_names_option() {
        let opt = TunnelOption::string(OPTION_TUNNEL_STATUS, AddressFamily::V4, "up").expect("opt");
        assert_eq!(opt.to_string(), "tunnel status(172)=\"up\"");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn family() -> impl Strategy<Value = AddressFamily> {
            prop_oneof![Just(AddressFamily::V4), Just(AddressFamily::V6)]
        }

        fn ip() -> impl Strategy<Value = IpAddr> {
            prop_oneof![
                any::<[u8; 4]>().prop_map(|o| IpAddr::V4(Ipv4Addr::from(o))),
                any::<[u8; 16]>().prop_map(|o| IpAddr::V6(Ipv6Addr::from(o))),
            ]
        }

        fn round_trip(opt: &TunnelOption) -> TunnelOption {
            let bytes = opt.to_bytes();
            TunnelOption::decode(opt.code(), opt.family(), &bytes[OPTION_HEADER_LEN..])
                .expect("decode")
        }

        proptest! {
            #[test]
            fn string_round_trip(s in ".*", fam in family()) {
                let opt = TunnelOption::string(OPTION_SPECIFIC_INFO, fam, s).expect("opt");
                prop_assert_eq!(round_trip(&opt), opt);
            }

            #[test]
            fn byte_round_trip(b in any::<u8>()) {
                let opt = TunnelOption::byte(OPTION_MESSAGE_TYPE, AddressFamily::V4, u32::from(b))
                    .expect("opt");
                prop_assert_eq!(round_trip(&opt), opt);
            }

            #[test]
            fn uint_round_trip(v in any::<u32>(), fam in family()) {
                let opt = TunnelOption::uint(OPTION_GENERIC_RESPONSE, fam, u64::from(v)).expect("opt");
                prop_assert_eq!(round_trip(&opt), opt);
            }

            #[test]
            fn ip_round_trip(addr in ip(), fam in family()) {
                let opt = TunnelOption::ip(OPTION_REMOTE_PHYS_INET_ADDR, fam, addr).expect("opt");
                prop_assert_eq!(round_trip(&opt), opt);
            }

            #[test]
            fn bytes_round_trip(raw in proptest::collection::vec(any::<u8>(), 0..64), fam in family()) {
                let opt = TunnelOption::bytes(OPTION_LOCAL_GENERIC_PUBLIC_KEY, fam, raw).expect("opt");
                prop_assert_eq!(round_trip(&opt), opt);
            }

            #[test]
            fn unknown_reencodes_identically(
                code in 181u32..255,
                raw in proptest::collection::vec(any::<u8>(), 0..64),
                fam in family(),
            ) {
                let mut wire = BytesMut::new();
                wire.put_u32(code);
                wire.put_u32(raw.len() as u32);
                wire.put_slice(&raw);
                let opt = TunnelOption::decode(code, fam, &raw).expect("decode");
                prop_assert_eq!(opt.kind(), OptionKind::Unknown);
                let encoded = opt.to_bytes();
                prop_assert_eq!(encoded.as_ref(), wire.as_ref());
            }
        }
    }
}
