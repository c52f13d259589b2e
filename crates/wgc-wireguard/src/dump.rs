//! Parser for `wg show <if> dump` output.
//!
//! The first line describes the interface:
//!
//! ```text
//! <private-key> <public-key> <listen-port> <fwmark>
//! ```
//!
//! Each following line describes a peer:
//!
//! ```text
//! <public-key> <preshared-key> <endpoint> <allowed-ips>... <latest-handshake> <rx> <tx> <keepalive>
//! ```
//!
//! Allowed IPs are consumed while tokens contain a `/`. `wg` itself prints
//! them comma-separated, which is also accepted.

use crate::error::{Result, WireGuardError};
use crate::keys::{PublicKey, SecretKey};
use crate::types::{Endpoint, InterfaceSnapshot, Peer};
use std::collections::BTreeMap;
use tracing::trace;

const NONE: &str = "(none)";

/// Minimum fields on a peer line: key, psk, endpoint, handshake, rx, tx, keepalive.
const PEER_MIN_FIELDS: usize = 7;

/// Minimum fields on an interface line.
const INTERFACE_MIN_FIELDS: usize = 3;

/// Parses the dump of a single interface.
///
/// Blank lines are ignored.
///
/// # Errors
///
/// Returns [`WireGuardError::MalformedDump`] if the dump is empty, a line has
/// too few fields, or a numeric field is not numeric.
pub fn parse_dump(name: &str, dump: &str) -> Result<InterfaceSnapshot> {
    let mut lines = dump
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let (line_no, first) = lines
        .next()
        .ok_or_else(|| WireGuardError::malformed(1, "empty dump"))?;
    let fields: Vec<&str> = first.split_whitespace().collect();
    let mut snapshot = parse_interface_fields(name, &fields, line_no)?;

    for (line_no, line) in lines {
        let peer = parse_peer_line(line).map_err(|e| at_line(e, line_no))?;
        snapshot.peers.push(peer);
    }

    trace!(interface = %name, peers = snapshot.peers.len(), "parsed interface dump");
    Ok(snapshot)
}

/// Parses `wg show all dump` output, where every line starts with the
/// interface name.
///
/// # Errors
///
/// Returns [`WireGuardError::MalformedDump`] on the first bad line.
pub fn parse_all_dump(dump: &str) -> Result<BTreeMap<String, InterfaceSnapshot>> {
    let mut interfaces: BTreeMap<String, InterfaceSnapshot> = BTreeMap::new();
    for (i, line) in dump.lines().enumerate() {
        let line_no = i + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some((name, rest)) = fields.split_first() else {
            continue;
        };
        match interfaces.get_mut(*name) {
            Some(snapshot) => {
                let peer = parse_peer_fields(rest).map_err(|e| at_line(e, line_no))?;
                snapshot.peers.push(peer);
            }
            None => {
                let snapshot = parse_interface_fields(name, rest, line_no)?;
                interfaces.insert((*name).to_string(), snapshot);
            }
        }
    }
    Ok(interfaces)
}

/// Parses a single peer line.
///
/// # Errors
///
/// Returns [`WireGuardError::MalformedDump`] with line number 0; callers
/// that know the position replace it.
pub fn parse_peer_line(line: &str) -> Result<Peer> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    parse_peer_fields(&fields)
}

fn parse_interface_fields(name: &str, fields: &[&str], line_no: usize) -> Result<InterfaceSnapshot> {
    if fields.len() < INTERFACE_MIN_FIELDS {
        return Err(WireGuardError::malformed(
            line_no,
            format!(
                "interface line needs at least {INTERFACE_MIN_FIELDS} fields, got {}",
                fields.len()
            ),
        ));
    }
    let listen_port = fields[2].parse::<u16>().map_err(|_| {
        WireGuardError::malformed(line_no, format!("listen port '{}' is not a port", fields[2]))
    })?;
    let fwmark = match fields.get(3) {
        Some(token) => parse_fwmark(token).map_err(|e| at_line(e, line_no))?,
        None => None,
    };

    Ok(InterfaceSnapshot {
        name: name.to_string(),
        private_key: optional(fields[0]).map(SecretKey::new),
        public_key: optional(fields[1]).map(PublicKey::new),
        listen_port,
        fwmark,
        peers: Vec::new(),
    })
}

fn parse_peer_fields(fields: &[&str]) -> Result<Peer> {
    if fields.len() < PEER_MIN_FIELDS {
        return Err(WireGuardError::malformed(
            0,
            format!(
                "peer line needs at least {PEER_MIN_FIELDS} fields, got {}",
                fields.len()
            ),
        ));
    }

    let endpoint = match optional(fields[2]) {
        Some(token) => Some(
            token
                .parse::<Endpoint>()
                .map_err(|e| WireGuardError::malformed(0, e.to_string()))?,
        ),
        None => None,
    };

    let mut idx = 3;
    let mut allowed_ips = Vec::new();
    while let Some(token) = fields.get(idx) {
        if *token == NONE {
            idx += 1;
            continue;
        }
        if !token.contains('/') {
            break;
        }
        allowed_ips.extend(
            token
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        idx += 1;
    }

    let tail = &fields[idx..];
    if tail.len() < 4 {
        return Err(WireGuardError::malformed(
            0,
            format!("peer line ends after allowed ips with {} fields", tail.len()),
        ));
    }

    Ok(Peer {
        public_key: PublicKey::new(fields[0]),
        preshared_key: optional(fields[1]).map(SecretKey::new),
        endpoint,
        allowed_ips,
        latest_handshake: parse_number("latest handshake", tail[0])?,
        rx_bytes: parse_number("received bytes", tail[1])?,
        tx_bytes: parse_number("sent bytes", tail[2])?,
        persistent_keepalive: tail[3].to_string(),
    })
}

fn parse_number(field: &str, token: &str) -> Result<u64> {
    token
        .parse()
        .map_err(|_| WireGuardError::malformed(0, format!("{field} '{token}' is not numeric")))
}

fn parse_fwmark(token: &str) -> Result<Option<u32>> {
    if token == "off" || token == "0" {
        return Ok(None);
    }
    let parsed = match token.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => token.parse(),
    };
    parsed
        .map(Some)
        .map_err(|_| WireGuardError::malformed(0, format!("fwmark '{token}' is not numeric")))
}

fn optional(token: &str) -> Option<&str> {
    (token != NONE).then_some(token)
}

fn at_line(err: WireGuardError, line: usize) -> WireGuardError {
    match err {
        WireGuardError::MalformedDump { reason, .. } => WireGuardError::MalformedDump { line, reason },
        other => other,
    }
}
