//! Option registry: maps `(code, family)` to a value kind.
//!
//! The tables are plain data. The v6 table is the v4 table without the
//! message-type option, which v6 carries in its header instead.

use crate::codes::*;
use crate::family::AddressFamily;
use crate::option::{OptionKind, OptionValue, TunnelOption};

/// Registry entry for one option code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    /// Numeric option code.
    pub code: u32,
    /// Value kind carried by the code.
    pub kind: OptionKind,
    /// Human-readable name used in logs.
    pub name: &'static str,
}

const fn spec(code: u32, kind: OptionKind, name: &'static str) -> OptionSpec {
    OptionSpec { code, kind, name }
}

/// Options understood by the v4 family.
pub const V4_OPTIONS: &[OptionSpec] = &[
    spec(OPTION_MESSAGE_TYPE, OptionKind::Byte, "message type"),
    spec(OPTION_MESSAGE_SENDER, OptionKind::Byte, "message sender"),
    spec(OPTION_REMOTE_PHYS_INET_ADDR, OptionKind::Ip, "remote phys addr"),
    spec(OPTION_LOCAL_PHYS_INET_ADDR, OptionKind::Ip, "local phys addr"),
    spec(OPTION_LOCAL_TUNNEL_INET_ADDR, OptionKind::Ip, "local tunnel addr"),
    spec(OPTION_REMOTE_TUNNEL_INET_ADDR, OptionKind::Ip, "remote tunnel addr"),
    spec(OPTION_REMOTE_TUNNEL_INET_COM_PORT, OptionKind::UInt, "remote tunnel com port"),
    spec(OPTION_INTERFACE_NAME, OptionKind::String, "interface name"),
    spec(OPTION_REMOTE_WG_PUBLIC_KEY, OptionKind::String, "remote wg public key"),
    spec(OPTION_LOCAL_WG_PUBLIC_KEY, OptionKind::String, "local wg public key"),
    spec(OPTION_REMOTE_ENDPOINT_TYPE, OptionKind::String, "remote endpoint type"),
    spec(OPTION_LOCAL_ENDPOINT_TYPE, OptionKind::String, "local endpoint type"),
    spec(OPTION_REMOTE_PHYS_INET_LISTEN_PORT, OptionKind::UInt, "remote phys listen port"),
    spec(OPTION_LOCAL_PHYS_INET_LISTEN_PORT, OptionKind::UInt, "local phys listen port"),
    spec(OPTION_REMOTE_PHYS_INET_COM_PORT, OptionKind::UInt, "remote phys com port"),
    spec(OPTION_LOCAL_PHYS_INET_COM_PORT, OptionKind::UInt, "local phys com port"),
    spec(OPTION_TUNNEL_ID, OptionKind::String, "tunnel id"),
    spec(OPTION_GENERIC_ID, OptionKind::String, "generic id"),
    spec(OPTION_KEEPALIVE_POLICY, OptionKind::UInt, "keepalive policy"),
    spec(OPTION_TUNNEL_STATUS, OptionKind::String, "tunnel status"),
    spec(OPTION_GENERIC_RESPONSE, OptionKind::UInt, "generic response"),
    spec(OPTION_SPECIFIC_INFO, OptionKind::String, "specific info"),
    spec(OPTION_GENERIC_PUBLIC_KEY, OptionKind::String, "generic public key"),
    spec(OPTION_LOCAL_GENERIC_PUBLIC_KEY, OptionKind::Bytes, "local generic public key"),
    spec(OPTION_PING_INET_ADDR, OptionKind::Ip, "ping addr"),
    spec(OPTION_PING_INET_PORT, OptionKind::UInt, "ping port"),
    spec(OPTION_TUNNEL_NETWORK, OptionKind::String, "tunnel network"),
];

/// Codes present in the v4 table but absent from v6.
const V4_ONLY: &[u32] = &[OPTION_MESSAGE_TYPE];

/// Looks up the registry entry for a code in a family.
#[must_use]
pub fn lookup(code: u32, family: AddressFamily) -> Option<&'static OptionSpec> {
    if family.is_v6() && V4_ONLY.contains(&code) {
        return None;
    }
    V4_OPTIONS.iter().find(|spec| spec.code == code)
}

/// Returns the kind for a code, or [`OptionKind::Unknown`] if unregistered.
#[must_use]
pub fn kind_of(code: u32, family: AddressFamily) -> OptionKind {
    lookup(code, family).map_or(OptionKind::Unknown, |spec| spec.kind)
}

/// Returns `true` if the family's table contains `code`.
#[must_use]
pub fn is_registered(code: u32, family: AddressFamily) -> bool {
    lookup(code, family).is_some()
}

/// Resolves a code to an empty option instance ready for decoding.
///
/// Unregistered codes resolve to the unknown fallback carrying the original
/// code and family. This never fails.
#[must_use]
pub fn resolve(code: u32, family: AddressFamily) -> TunnelOption {
    let kind = kind_of(code, family);
    TunnelOption::from_parts(code, family, OptionValue::empty(kind, family))
}

/// Iterates the entries registered for a family.
pub fn entries(family: AddressFamily) -> impl Iterator<Item = &'static OptionSpec> {
    V4_OPTIONS
        .iter()
        .filter(move |spec| family.is_v4() || !V4_ONLY.contains(&spec.code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn v6_is_v4_minus_message_type() {
        let v4: HashSet<u32> = entries(AddressFamily::V4).map(|s| s.code).collect();
        let v6: HashSet<u32> = entries(AddressFamily::V6).map(|s| s.code).collect();
        assert!(v6.is_subset(&v4));
        let diff: Vec<u32> = v4.difference(&v6).copied().collect();
        assert_eq!(diff, vec![OPTION_MESSAGE_TYPE]);
    }

    #[test]
    fn codes_are_unique() {
        let codes: HashSet<u32> = V4_OPTIONS.iter().map(|s| s.code).collect();
        assert_eq!(codes.len(), V4_OPTIONS.len());
        assert!(!codes.contains(&OPTION_EOF));
    }

    #[test]
    fn client_other_addrs_is_unregistered() {
        assert!(!is_registered(OPTION_CLIENT_OTHER_PHYS_INET_ADDRS, AddressFamily::V4));
        let opt = resolve(OPTION_CLIENT_OTHER_PHYS_INET_ADDRS, AddressFamily::V4);
        assert_eq!(opt.kind(), OptionKind::Unknown);
        assert_eq!(opt.code(), OPTION_CLIENT_OTHER_PHYS_INET_ADDRS);
    }

    #[test]
    fn resolve_carries_family() {
        let opt = resolve(OPTION_TUNNEL_ID, AddressFamily::V6);
        assert_eq!(opt.family(), AddressFamily::V6);
        assert_eq!(opt.kind(), OptionKind::String);
    }

    #[test]
    fn every_entry_resolves_to_its_kind() {
        for family in [AddressFamily::V4, AddressFamily::V6] {
            for spec in entries(family) {
                let opt = resolve(spec.code, family);
                assert_eq!(opt.kind(), spec.kind, "code {}", spec.code);
                assert_eq!(opt.name(), spec.name);
            }
        }
    }
}
