//! Info-request and info-reply messages.
//!
//! Requests carry the tunnel addresses from the receiver's point of view: the
//! request's local-tunnel-address option holds our remote tunnel address and
//! its remote-tunnel-address option holds ours. Replies are built and applied
//! with the same flip.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use bytes::Bytes;
use tracing::{debug, trace};
use uuid::Uuid;
use wgc_proto::{
    AddressFamily, MessageSender, Operation, OptionList, TunnelOption, V4Message, V4MessageType,
    V6Message, V6MessageType, OPTION_LOCAL_ENDPOINT_TYPE, OPTION_LOCAL_PHYS_INET_ADDR,
    OPTION_LOCAL_PHYS_INET_COM_PORT, OPTION_LOCAL_PHYS_INET_LISTEN_PORT,
    OPTION_LOCAL_TUNNEL_INET_ADDR, OPTION_LOCAL_WG_PUBLIC_KEY, OPTION_REMOTE_ENDPOINT_TYPE,
    OPTION_REMOTE_PHYS_INET_ADDR, OPTION_REMOTE_PHYS_INET_COM_PORT,
    OPTION_REMOTE_PHYS_INET_LISTEN_PORT, OPTION_REMOTE_TUNNEL_INET_ADDR,
    OPTION_REMOTE_WG_PUBLIC_KEY, OPTION_TUNNEL_ID, OPTION_TUNNEL_STATUS,
};

use crate::config::EndpointRole;
use crate::error::{ReconcileError, Result};
use crate::record::{set_if_changed, ChangedFields, TunnelField, TunnelRecord};

/// An outbound info request for either family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoRequest {
    /// Request/response envelope.
    V4(V4Message),
    /// Compact envelope.
    V6(V6Message),
}

impl InfoRequest {
    /// Socket the request is addressed to.
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        match self {
            Self::V4(m) => m.remote_addr,
            Self::V6(m) => m.remote_addr,
        }
    }

    /// Transaction id a reply must echo.
    #[must_use]
    pub const fn transaction_id(&self) -> u32 {
        match self {
            Self::V4(m) => m.transaction_id,
            Self::V6(m) => m.transaction_id,
        }
    }

    /// Serializes the request.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::V4(m) => m.encode(),
            Self::V6(m) => m.encode(),
        }
    }
}

fn require_addr(record: &TunnelRecord, addr: Option<IpAddr>, field: &'static str) -> Result<IpAddr> {
    addr.ok_or(ReconcileError::IncompleteRecord {
        id: record.id,
        field,
    })
}

fn require_v4(record: &TunnelRecord, addr: IpAddr, field: &'static str) -> Result<Ipv4Addr> {
    match addr {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(_) => Err(ReconcileError::IncompleteRecord {
            id: record.id,
            field,
        }),
    }
}

/// Tunnel-address options seen from the peer's side.
fn flipped_tunnel_options(record: &TunnelRecord, options: &mut OptionList) -> Result<()> {
    let local = require_addr(record, record.local_tunnel_addr, "local tunnel address")?;
    let remote = require_addr(record, record.remote_tunnel_addr, "remote tunnel address")?;
    options.set(TunnelOption::ip(OPTION_LOCAL_TUNNEL_INET_ADDR, record.family, remote)?);
    options.set(TunnelOption::ip(OPTION_REMOTE_TUNNEL_INET_ADDR, record.family, local)?);
    Ok(())
}

/// Builds a v4 info request for `record`, addressed to `remote`.
///
/// # Errors
///
/// Returns [`ReconcileError::IncompleteRecord`] if a tunnel address is
/// missing or either socket is not IPv4.
pub fn build_v4_info_request(record: &TunnelRecord, remote: SocketAddr) -> Result<V4Message> {
    let local_addr = require_addr(record, record.local_tunnel_addr, "local tunnel address")?;
    let local = SocketAddr::new(local_addr, record.local_tunnel_com_port);

    let mut message = V4Message::new(local, remote);
    message.op = Operation::Request;
    message.client_addr = require_v4(record, local_addr, "IPv4 local tunnel address")?;
    message.client_port = local.port();
    message.server_addr = require_v4(record, remote.ip(), "IPv4 remote tunnel address")?;
    message.server_port = remote.port();
    message.set_message_type(V4MessageType::InfoRequest);
    flipped_tunnel_options(record, &mut message.options)?;

    debug!(tunnel_id = %record.id, xid = message.transaction_id, to = %remote, "built v4 info request");
    Ok(message)
}

/// Builds a v6 info request between the record's tunnel sockets.
///
/// # Errors
///
/// Returns [`ReconcileError::IncompleteRecord`] if a tunnel address is missing.
pub fn build_v6_info_request(record: &TunnelRecord) -> Result<V6Message> {
    let local = record
        .local_tunnel_socket()
        .ok_or(ReconcileError::IncompleteRecord {
            id: record.id,
            field: "local tunnel address",
        })?;
    let remote = record
        .remote_tunnel_socket()
        .ok_or(ReconcileError::IncompleteRecord {
            id: record.id,
            field: "remote tunnel address",
        })?;

    let mut message = V6Message::new(local, remote, V6MessageType::InfoRequest);
    flipped_tunnel_options(record, &mut message.options)?;

    debug!(tunnel_id = %record.id, xid = message.transaction_id, to = %remote, "built v6 info request");
    Ok(message)
}

/// Builds the info request for a record of either family.
///
/// v4 requests are addressed to the record's remote tunnel socket.
///
/// # Errors
///
/// Returns [`ReconcileError::IncompleteRecord`] if the record lacks the
/// addresses its family needs.
pub fn build_info_request(record: &TunnelRecord) -> Result<InfoRequest> {
    match record.family {
        AddressFamily::V4 => {
            let remote = record
                .remote_tunnel_socket()
                .ok_or(ReconcileError::IncompleteRecord {
                    id: record.id,
                    field: "remote tunnel address",
                })?;
            build_v4_info_request(record, remote).map(InfoRequest::V4)
        }
        AddressFamily::V6 => build_v6_info_request(record).map(InfoRequest::V6),
    }
}

/// Options describing one record, in our own perspective.
fn reply_options(record: &TunnelRecord) -> Result<OptionList> {
    let family = record.family;
    let mut options = OptionList::new();
    options.push(TunnelOption::string(OPTION_TUNNEL_ID, family, record.id.to_string())?);
    options.push(TunnelOption::string(OPTION_TUNNEL_STATUS, family, record.status.clone())?);
    options.push(TunnelOption::string(
        OPTION_REMOTE_ENDPOINT_TYPE,
        family,
        record.remote_endpoint_type.to_string(),
    )?);
    options.push(TunnelOption::string(
        OPTION_LOCAL_ENDPOINT_TYPE,
        family,
        record.local_endpoint_type.to_string(),
    )?);
    if let Some(addr) = record.remote_phys_addr {
        options.push(TunnelOption::ip(OPTION_REMOTE_PHYS_INET_ADDR, family, addr)?);
    }
    if let Some(addr) = record.local_phys_addr {
        options.push(TunnelOption::ip(OPTION_LOCAL_PHYS_INET_ADDR, family, addr)?);
    }
    options.push(TunnelOption::uint(
        OPTION_REMOTE_PHYS_INET_COM_PORT,
        family,
        u64::from(record.remote_phys_com_port),
    )?);
    options.push(TunnelOption::uint(
        OPTION_LOCAL_PHYS_INET_COM_PORT,
        family,
        u64::from(record.local_phys_com_port),
    )?);
    if let Some(addr) = record.remote_tunnel_addr {
        options.push(TunnelOption::ip(OPTION_REMOTE_TUNNEL_INET_ADDR, family, addr)?);
    }
    if let Some(addr) = record.local_tunnel_addr {
        options.push(TunnelOption::ip(OPTION_LOCAL_TUNNEL_INET_ADDR, family, addr)?);
    }
    options.push(TunnelOption::string(
        OPTION_REMOTE_WG_PUBLIC_KEY,
        family,
        record.remote_public_key.as_str(),
    )?);
    options.push(TunnelOption::string(
        OPTION_LOCAL_WG_PUBLIC_KEY,
        family,
        record.local_public_key.as_str(),
    )?);
    options.push(TunnelOption::uint(
        OPTION_REMOTE_PHYS_INET_LISTEN_PORT,
        family,
        u64::from(record.remote_phys_listen_port),
    )?);
    options.push(TunnelOption::uint(
        OPTION_LOCAL_PHYS_INET_LISTEN_PORT,
        family,
        u64::from(record.local_phys_listen_port),
    )?);
    Ok(options)
}

/// Records of `family` answering a request, or nothing if the request names
/// no tunnel we hold.
fn reply_records<'a>(
    request: &OptionList,
    family: AddressFamily,
    records: &'a [TunnelRecord],
) -> Vec<&'a TunnelRecord> {
    let local = request.get_ip(OPTION_LOCAL_TUNNEL_INET_ADDR);
    let remote = request.get_ip(OPTION_REMOTE_TUNNEL_INET_ADDR);
    let anchored = local.is_some()
        && remote.is_some()
        && records.iter().any(|r| {
            r.family == family && r.local_tunnel_addr == local && r.remote_tunnel_addr == remote
        });
    if !anchored {
        trace!(?local, ?remote, "info request matches no tunnel");
        return Vec::new();
    }
    records.iter().filter(|r| r.family == family).collect()
}

/// Builds v4 replies to a received info request.
///
/// # Errors
///
/// Returns an error if a reply option cannot be built.
pub fn build_v4_info_replies(request: &V4Message, records: &[TunnelRecord]) -> Result<Vec<V4Message>> {
    reply_records(&request.options, AddressFamily::V4, records)
        .into_iter()
        .map(|record| {
            let mut reply = V4Message::new(request.local_addr, request.remote_addr);
            reply.op = Operation::Reply;
            reply.htype = request.htype;
            reply.transaction_id = request.transaction_id;
            reply.client_addr = request.client_addr;
            reply.client_port = request.client_port;
            reply.server_addr = request.server_addr;
            reply.server_port = request.server_port;
            reply.options = reply_options(record)?;
            reply.set_message_type(V4MessageType::InfoRequestReply);
            reply.set_sender(MessageSender::Server);
            Ok(reply)
        })
        .collect()
}

/// Builds v6 replies to a received info request.
///
/// # Errors
///
/// Returns an error if a reply option cannot be built.
pub fn build_v6_info_replies(request: &V6Message, records: &[TunnelRecord]) -> Result<Vec<V6Message>> {
    reply_records(&request.options, AddressFamily::V6, records)
        .into_iter()
        .map(|record| {
            let mut reply = V6Message::new(
                request.local_addr,
                request.remote_addr,
                V6MessageType::InfoRequestReply,
            );
            reply.transaction_id = request.transaction_id;
            reply.options = reply_options(record)?;
            reply.set_sender(MessageSender::Server);
            Ok(reply)
        })
        .collect()
}

/// Returns `true` if a reply describes `record` from the peer's side.
#[must_use]
pub fn reply_matches(record: &TunnelRecord, reply: &OptionList) -> bool {
    reply.get_str(OPTION_LOCAL_WG_PUBLIC_KEY) == Some(record.remote_public_key.as_str())
        && reply.get_str(OPTION_REMOTE_WG_PUBLIC_KEY) == Some(record.local_public_key.as_str())
}

fn port_of(options: &OptionList, code: u32) -> Option<u16> {
    options.get_uint(code).and_then(|v| u16::try_from(v).ok())
}

/// Applies a peer's info reply to our record.
///
/// Returns `None` if the reply describes a different tunnel, otherwise the
/// fields that changed.
pub fn apply_info_reply(record: &mut TunnelRecord, reply: &OptionList) -> Option<ChangedFields> {
    if !reply_matches(record, reply) {
        return None;
    }
    let mut changed = ChangedFields::new();

    if let Some(id) = reply
        .get_str(OPTION_TUNNEL_ID)
        .and_then(|s| s.parse::<Uuid>().ok())
    {
        set_if_changed(&mut record.remote_id, Some(id), TunnelField::RemoteId, &mut changed);
    }
    if let Some(role) = reply
        .get_str(OPTION_LOCAL_ENDPOINT_TYPE)
        .and_then(|s| s.parse::<EndpointRole>().ok())
    {
        set_if_changed(
            &mut record.remote_endpoint_type,
            role,
            TunnelField::RemoteEndpointType,
            &mut changed,
        );
    }
    if let Some(port) = port_of(reply, OPTION_LOCAL_PHYS_INET_COM_PORT) {
        set_if_changed(
            &mut record.remote_phys_com_port,
            port,
            TunnelField::RemotePhysComPort,
            &mut changed,
        );
    }
    if let Some(port) = port_of(reply, OPTION_LOCAL_PHYS_INET_LISTEN_PORT) {
        set_if_changed(
            &mut record.remote_phys_listen_port,
            port,
            TunnelField::RemotePhysListenPort,
            &mut changed,
        );
    }
    if record.local_phys_addr.is_none() {
        if let Some(addr) = reply.get_ip(OPTION_REMOTE_PHYS_INET_ADDR) {
            record.local_phys_addr = Some(addr);
            changed.insert(TunnelField::LocalPhysAddr);
        }
    }
    Some(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::v4_record;
    use wgc_proto::v6::V6_MAX_TRANSACTION_ID;
    use wgc_wireguard::{PublicKey, SecretKey};

    fn ip(s: &str) -> IpAddr {
        s.parse().expect("addr")
    }

    /// The same tunnel as held by the peer.
    fn mirror(record: &TunnelRecord) -> TunnelRecord {
        TunnelRecord {
            id: Uuid::new_v4(),
            remote_id: Some(record.id),
            local_endpoint_type: record.remote_endpoint_type,
            remote_endpoint_type: record.local_endpoint_type,
            local_phys_addr: record.remote_phys_addr,
            local_phys_listen_port: record.remote_phys_listen_port,
            local_phys_com_port: 1268,
            remote_phys_addr: record.local_phys_addr,
            remote_phys_listen_port: record.local_phys_listen_port,
            remote_phys_com_port: record.local_phys_com_port,
            local_tunnel_addr: record.remote_tunnel_addr,
            local_tunnel_com_port: record.remote_tunnel_com_port,
            remote_tunnel_addr: record.local_tunnel_addr,
            remote_tunnel_com_port: record.local_tunnel_com_port,
            local_public_key: record.remote_public_key.clone(),
            remote_public_key: record.local_public_key.clone(),
            local_private_key: SecretKey::new("peer-priv"),
            ..record.clone()
        }
    }

    fn v6_record() -> TunnelRecord {
        TunnelRecord {
            family: AddressFamily::V6,
            local_endpoint_type: EndpointRole::Client,
            remote_endpoint_type: EndpointRole::Client,
            local_tunnel_addr: Some(ip("fd00::1")),
            remote_tunnel_addr: Some(ip("fd00::2")),
            local_tunnel_com_port: 547,
            remote_tunnel_com_port: 547,
            ..v4_record()
        }
    }

    #[test]
    fn v4_request_flips_tunnel_addresses() {
        let record = v4_record();
        let request = build_v4_info_request(&record, "10.10.0.2:268".parse().expect("sock"))
            .expect("request");

        assert_eq!(request.op, Operation::Request);
        assert_eq!(request.htype, 1);
        assert_eq!(request.message_type(), Some(V4MessageType::InfoRequest));
        assert_eq!(request.client_addr, Ipv4Addr::new(10, 10, 0, 1));
        assert_eq!(request.server_addr, Ipv4Addr::new(10, 10, 0, 2));
        assert_eq!(request.options.get_ip(OPTION_LOCAL_TUNNEL_INET_ADDR), Some(ip("10.10.0.2")));
        assert_eq!(request.options.get_ip(OPTION_REMOTE_TUNNEL_INET_ADDR), Some(ip("10.10.0.1")));
    }

    #[test]
    fn v4_request_survives_the_wire() {
        let record = v4_record();
        assert!(matches!(build_info_request(&record), Ok(InfoRequest::V4(_))));

        let sent = build_v4_info_request(&record, "10.10.0.2:268".parse().expect("sock"))
            .expect("request");
        let request = InfoRequest::V4(sent.clone());
        let decoded = V4Message::decode(&request.encode(), sent.remote_addr, sent.local_addr)
            .expect("decode");
        assert_eq!(decoded.transaction_id, request.transaction_id());
        assert_eq!(decoded.options, sent.options);
    }

    #[test]
    fn v4_request_requires_tunnel_addresses() {
        let record = TunnelRecord {
            remote_tunnel_addr: None,
            ..v4_record()
        };
        let err = build_info_request(&record).expect_err("incomplete");
        assert!(matches!(err, ReconcileError::IncompleteRecord { .. }));
    }

    #[test]
    fn v4_request_rejects_v6_sockets() {
        let err = build_v4_info_request(&v4_record(), "[fd00::2]:268".parse().expect("sock"))
            .expect_err("v6 socket");
        assert!(matches!(err, ReconcileError::IncompleteRecord { .. }));
    }

    #[test]
    fn v6_request_uses_tunnel_sockets_and_narrow_xid() {
        let record = v6_record();
        let request = build_v6_info_request(&record).expect("request");
        assert_eq!(request.message_type, V6MessageType::InfoRequest);
        assert_eq!(request.local_addr, "[fd00::1]:547".parse().expect("sock"));
        assert_eq!(request.remote_addr, "[fd00::2]:547".parse().expect("sock"));
        assert!(request.transaction_id <= V6_MAX_TRANSACTION_ID);
        assert_eq!(request.options.get_ip(OPTION_LOCAL_TUNNEL_INET_ADDR), Some(ip("fd00::2")));
    }

    #[test]
    fn peer_answers_request_for_shared_tunnel() {
        let ours = v4_record();
        let theirs = mirror(&ours);
        let request = build_v4_info_request(&ours, "10.10.0.2:268".parse().expect("sock"))
            .expect("request");

        let replies = build_v4_info_replies(&request, &[theirs.clone()]).expect("replies");
        assert_eq!(replies.len(), 1);
        let reply = &replies[0];
        assert_eq!(reply.op, Operation::Reply);
        assert_eq!(reply.transaction_id, request.transaction_id);
        assert_eq!(reply.client_addr, request.client_addr);
        assert_eq!(reply.message_type(), Some(V4MessageType::InfoRequestReply));
        assert_eq!(reply.sender(), Some(MessageSender::Server));
        assert_eq!(
            reply.options.get_str(OPTION_TUNNEL_ID),
            Some(theirs.id.to_string().as_str())
        );
    }

    #[test]
    fn unknown_tunnel_gets_no_reply() {
        let ours = v4_record();
        let request = build_v4_info_request(&ours, "10.10.0.2:268".parse().expect("sock"))
            .expect("request");
        let stranger = TunnelRecord {
            local_tunnel_addr: Some(ip("10.99.0.1")),
            ..mirror(&ours)
        };
        assert!(build_v4_info_replies(&request, &[stranger]).expect("replies").is_empty());
    }

    #[test]
    fn v6_replies_skip_other_families() {
        let ours = v6_record();
        let theirs = mirror(&ours);
        let request = build_v6_info_request(&ours).expect("request");

        let replies =
            build_v6_info_replies(&request, &[theirs, mirror(&v4_record())]).expect("replies");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].transaction_id, request.transaction_id);
        assert_eq!(replies[0].message_type, V6MessageType::InfoRequestReply);
    }

    #[test]
    fn reply_is_applied_with_flipped_perspective() {
        let mut ours = TunnelRecord {
            local_phys_addr: None,
            ..v4_record()
        };
        let theirs = mirror(&v4_record());
        let request = build_v4_info_request(&ours, "10.10.0.2:268".parse().expect("sock"))
            .expect("request");
        let reply = build_v4_info_replies(&request, &[theirs.clone()])
            .expect("replies")
            .remove(0);

        let changed = apply_info_reply(&mut ours, &reply.options).expect("matching reply");
        assert!(changed.contains(&TunnelField::RemoteId));
        assert!(changed.contains(&TunnelField::RemotePhysComPort));
        assert!(changed.contains(&TunnelField::LocalPhysAddr));
        assert_eq!(ours.remote_id, Some(theirs.id));
        assert_eq!(ours.remote_phys_com_port, 1268);
        assert_eq!(ours.local_phys_addr, Some(ip("192.0.2.1")));

        let again = apply_info_reply(&mut ours, &reply.options).expect("matching reply");
        assert!(again.is_empty());
    }

    #[test]
    fn reply_for_other_keys_is_ignored() {
        let mut ours = v4_record();
        let mut theirs = mirror(&ours);
        theirs.local_public_key = PublicKey::new("someone-else");
        let options = reply_options(&theirs).expect("options");
        assert!(apply_info_reply(&mut ours, &options).is_none());
    }
}
