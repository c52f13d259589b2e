//! Reconciliation of live tunnel interfaces against the inventory.
//!
//! A pass runs in three phases:
//!
//! 1. Enumerate host interfaces, keep those carrying a family prefix, and
//!    parse each one's dump. Interfaces that fail here are skipped.
//! 2. Split the inventory into candidates, whose remote physical address is
//!    an endpoint of some live peer, and stale records, which are left alone.
//! 3. Match every live peer against the candidates. Matches are refreshed,
//!    misses become new records.
//!
//! Passes are serialized by a lock held for the whole pass, so two passes
//! never both create a record for the same peer.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::IpAddr;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wgc_proto::{AddressFamily, OptionList};
use wgc_wireguard::{parse_dump, HostInterface, InterfaceSnapshot, LiveStateSource, Peer};

use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, Result};
use crate::info::{apply_info_reply, build_info_request, reply_matches, InfoRequest};
use crate::inventory::TunnelInventory;
use crate::notify::TunnelNotifier;
use crate::record::{effective_keepalive, TunnelRecord, STATUS_UP};

/// An interface left out of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedInterface {
    /// Interface name.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// A record whose save or update failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Record id.
    pub id: Uuid,
    /// Failure reported by the inventory.
    pub reason: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Records that need an info request, one per local tunnel socket.
    ///
    /// Both retained and newly created records qualify, since a new record
    /// knows nothing yet about the peer's side of the tunnel. Records whose
    /// save failed are left out.
    pub info_requests: Vec<TunnelRecord>,
    /// Records created by this pass.
    pub created: Vec<Uuid>,
    /// Existing records matched to a live peer.
    pub retained: Vec<Uuid>,
    /// Matched records whose live counters changed.
    pub updated: Vec<Uuid>,
    /// Records whose remote address no live peer uses.
    pub stale: Vec<Uuid>,
    /// Interfaces that were not reconciled.
    pub skipped: Vec<SkippedInterface>,
    /// Records that could not be persisted.
    pub failures: Vec<RecordFailure>,
}

impl PassReport {
    /// Builds the info requests for [`Self::info_requests`].
    ///
    /// Records lacking tunnel addresses are logged and left out.
    pub fn build_requests(&self) -> Vec<InfoRequest> {
        self.info_requests
            .iter()
            .filter_map(|record| match build_info_request(record) {
                Ok(request) => Some(request),
                Err(e) => {
                    warn!(tunnel_id = %record.id, error = %e, "cannot build info request");
                    None
                }
            })
            .collect()
    }

    fn fail(&mut self, id: Uuid, err: &ReconcileError) {
        self.failures.push(RecordFailure {
            id,
            reason: err.to_string(),
        });
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} retained={} updated={} stale={} skipped={} failed={} requests={}",
            self.created.len(),
            self.retained.len(),
            self.updated.len(),
            self.stale.len(),
            self.skipped.len(),
            self.failures.len(),
            self.info_requests.len()
        )
    }
}

/// A tunnel interface ready for matching.
struct LiveInterface {
    family: AddressFamily,
    addr: IpAddr,
    snapshot: InterfaceSnapshot,
}

struct Candidate {
    record: TunnelRecord,
    claimed: bool,
}

/// Match key of a live peer, in record terms.
struct PeerKey<'a> {
    live: &'a LiveInterface,
    peer: &'a Peer,
    remote_addr: IpAddr,
    remote_port: u16,
    remote_tunnel: Option<IpAddr>,
}

impl PeerKey<'_> {
    fn matches(&self, record: &TunnelRecord) -> bool {
        let snapshot = &self.live.snapshot;
        record.family == self.live.family
            && snapshot.private_key.as_ref() == Some(&record.local_private_key)
            && snapshot.public_key.as_ref() == Some(&record.local_public_key)
            && record.local_phys_listen_port == snapshot.listen_port
            && record.remote_public_key == self.peer.public_key
            && record.remote_phys_addr == Some(self.remote_addr)
            && record.remote_phys_listen_port == self.remote_port
            && record.remote_tunnel_addr == self.remote_tunnel
            && record.local_tunnel_addr == Some(self.live.addr)
    }
}

/// Reconciles live tunnel state against a tunnel inventory.
pub struct Reconciler<S, I, N> {
    config: ReconcileConfig,
    source: S,
    inventory: I,
    notifier: N,
    pass_lock: Mutex<()>,
}

impl<S, I, N> Reconciler<S, I, N>
where
    S: LiveStateSource,
    I: TunnelInventory,
    N: TunnelNotifier,
{
    /// Creates a reconciler.
    pub fn new(config: ReconcileConfig, source: S, inventory: I, notifier: N) -> Self {
        Self {
            config,
            source,
            inventory,
            notifier,
            pass_lock: Mutex::new(()),
        }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// The inventory.
    pub const fn inventory(&self) -> &I {
        &self.inventory
    }

    /// The live-state source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Runs one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Enumeration`] if host interfaces cannot be
    /// listed, or an error if the inventory cannot be read. Per-interface and
    /// per-record failures are collected in the report instead.
    pub async fn reconcile(&self) -> Result<PassReport> {
        let _pass = self.pass_lock.lock().await;
        let mut report = PassReport::default();

        let live = self.collect_interfaces(&mut report).await?;

        let observed: HashSet<IpAddr> = live
            .iter()
            .flat_map(|l| l.snapshot.peers.iter())
            .filter_map(|p| p.endpoint.as_ref()?.ip())
            .collect();
        let mut candidates = Vec::new();
        for record in self.inventory.list_all()? {
            if record.remote_phys_addr.is_some_and(|a| observed.contains(&a)) {
                candidates.push(Candidate {
                    record,
                    claimed: false,
                });
            } else {
                debug!(tunnel_id = %record.id, "no live endpoint for record");
                report.stale.push(record.id);
            }
        }

        let mut discovered = Vec::new();
        for iface in &live {
            for peer in &iface.snapshot.peers {
                if let Some(record) = self
                    .reconcile_peer(iface, peer, &mut candidates, &mut report)
                    .await
                {
                    discovered.push(record);
                }
            }
        }

        let mut sockets = HashSet::new();
        report.info_requests = discovered
            .into_iter()
            .filter(|r| sockets.insert((r.local_tunnel_addr, r.local_tunnel_com_port)))
            .collect();

        info!(
            interfaces = live.len(),
            created = report.created.len(),
            retained = report.retained.len(),
            stale = report.stale.len(),
            skipped = report.skipped.len(),
            "reconciliation pass complete"
        );
        Ok(report)
    }

    /// Copies live counters onto every record of a live peer.
    ///
    /// Records are matched by local and remote public key only. No records
    /// are created.
    ///
    /// # Errors
    ///
    /// Same as [`Self::reconcile`].
    pub async fn refresh(&self) -> Result<PassReport> {
        let _pass = self.pass_lock.lock().await;
        let mut report = PassReport::default();

        let live = self.collect_interfaces(&mut report).await?;
        let mut records = self.inventory.list_all()?;

        for iface in &live {
            let Some(local_key) = iface.snapshot.public_key.as_ref() else {
                continue;
            };
            for peer in &iface.snapshot.peers {
                let owned = records.iter_mut().filter(|r| {
                    &r.local_public_key == local_key && r.remote_public_key == peer.public_key
                });
                for record in owned {
                    let changed = record.apply_peer_stats(
                        iface.snapshot.fwmark,
                        peer,
                        self.config.persistent_keepalive,
                    );
                    report.retained.push(record.id);
                    if changed.is_empty() {
                        continue;
                    }
                    match self.inventory.update(record) {
                        Ok(()) => {
                            self.notifier.on_tunnel_changed(record, &changed);
                            report.updated.push(record.id);
                        }
                        Err(e) => {
                            warn!(tunnel_id = %record.id, error = %e, "failed to update tunnel");
                            report.fail(record.id, &e);
                        }
                    }
                }
            }
        }

        debug!(updated = report.updated.len(), "refresh pass complete");
        Ok(report)
    }

    /// Applies a peer's info reply to the matching record.
    ///
    /// Returns the id of the matching record, or `None` if the reply
    /// describes no tunnel we hold.
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be read or the update fails.
    pub async fn handle_info_reply(&self, reply: &OptionList) -> Result<Option<Uuid>> {
        let _pass = self.pass_lock.lock().await;

        let Some(mut record) = self
            .inventory
            .list_all()?
            .into_iter()
            .find(|r| reply_matches(r, reply))
        else {
            debug!("info reply matches no tunnel");
            return Ok(None);
        };

        if let Some(changed) = apply_info_reply(&mut record, reply) {
            if !changed.is_empty() {
                self.inventory.update(&record)?;
                self.notifier.on_tunnel_changed(&record, &changed);
            }
        }
        Ok(Some(record.id))
    }

    /// Lists tunnel interfaces and parses their dumps.
    async fn collect_interfaces(&self, report: &mut PassReport) -> Result<Vec<LiveInterface>> {
        let hosts = self
            .source
            .interfaces()
            .await
            .map_err(|e| ReconcileError::enumeration(e.to_string()))?;

        let mut by_name: BTreeMap<String, Vec<HostInterface>> = BTreeMap::new();
        for host in hosts {
            by_name.entry(host.name.clone()).or_default().push(host);
        }

        let mut live = Vec::new();
        for (name, addrs) in by_name {
            let Some(family) = self.config.family_for(&name) else {
                continue;
            };
            let Some(addr) = addrs
                .iter()
                .find(|h| !h.is_loopback && family.matches(&h.addr))
                .map(|h| h.addr)
            else {
                skip(report, &name, format!("no {family} address"));
                continue;
            };

            let snapshot = match self.source.dump(&name).await {
                Ok(text) => match parse_dump(&name, &text) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        skip(report, &name, e.to_string());
                        continue;
                    }
                },
                Err(e) => {
                    skip(report, &name, e.to_string());
                    continue;
                }
            };
            if !snapshot.is_complete() {
                skip(report, &name, "incomplete interface state".to_string());
                continue;
            }

            debug!(interface = %name, %family, %addr, peers = snapshot.peers.len(), "live tunnel interface");
            live.push(LiveInterface {
                family,
                addr,
                snapshot,
            });
        }
        Ok(live)
    }

    /// Matches one live peer, creating a record on a miss.
    ///
    /// Returns the record to send an info request for, if any.
    async fn reconcile_peer(
        &self,
        live: &LiveInterface,
        peer: &Peer,
        candidates: &mut Vec<Candidate>,
        report: &mut PassReport,
    ) -> Option<TunnelRecord> {
        let Some((remote_addr, remote_port)) = peer
            .endpoint
            .as_ref()
            .and_then(|e| Some((e.ip()?, e.port)))
        else {
            debug!(interface = %live.snapshot.name, peer = ?peer.public_key, "peer has no endpoint address");
            return None;
        };
        let key = PeerKey {
            live,
            peer,
            remote_addr,
            remote_port,
            remote_tunnel: peer.tunnel_addr(),
        };

        if let Some(candidate) = candidates.iter_mut().find(|c| key.matches(&c.record)) {
            if candidate.claimed {
                return None;
            }
            candidate.claimed = true;
            let record = &mut candidate.record;
            report.retained.push(record.id);

            let changed = record.apply_peer_stats(
                live.snapshot.fwmark,
                peer,
                self.config.persistent_keepalive,
            );
            if !changed.is_empty() {
                match self.inventory.update(record) {
                    Ok(()) => {
                        self.notifier.on_tunnel_changed(record, &changed);
                        report.updated.push(record.id);
                    }
                    Err(e) => {
                        warn!(tunnel_id = %record.id, error = %e, "failed to update tunnel");
                        report.fail(record.id, &e);
                    }
                }
            }
            debug!(tunnel_id = %record.id, "retained tunnel");
            return Some(record.clone());
        }

        let record = self.new_record(&key).await?;
        if let Err(e) = self.inventory.save(&record) {
            warn!(tunnel_id = %record.id, error = %e, "failed to save new tunnel");
            report.fail(record.id, &e);
            return None;
        }
        self.notifier.on_new_tunnel(&record);
        info!(
            tunnel_id = %record.id,
            interface = %record.local_interface_name,
            remote = %remote_addr,
            "discovered new tunnel"
        );
        report.created.push(record.id);
        candidates.push(Candidate {
            record: record.clone(),
            claimed: true,
        });
        Some(record)
    }

    async fn new_record(&self, key: &PeerKey<'_>) -> Option<TunnelRecord> {
        let live = key.live;
        let snapshot = &live.snapshot;
        let (Some(private_key), Some(public_key)) =
            (snapshot.private_key.clone(), snapshot.public_key.clone())
        else {
            return None;
        };
        let roles = self.config.roles(live.family);
        let port = self.config.port(live.family);

        let local_phys_addr = match self.source.local_addr_for(key.remote_addr).await {
            Ok(addr) => addr.filter(|a| live.family.matches(a)),
            Err(e) => {
                debug!(remote = %key.remote_addr, error = %e, "could not resolve local address");
                None
            }
        };

        Some(TunnelRecord {
            id: Uuid::new_v4(),
            remote_id: None,
            family: live.family,
            local_endpoint_type: roles.local,
            remote_endpoint_type: roles.remote,
            local_phys_addr,
            local_phys_listen_port: snapshot.listen_port,
            local_phys_com_port: port,
            remote_phys_addr: Some(key.remote_addr),
            remote_phys_listen_port: key.remote_port,
            remote_phys_com_port: port,
            local_tunnel_addr: Some(live.addr),
            local_tunnel_com_port: port,
            remote_tunnel_addr: key.remote_tunnel,
            remote_tunnel_com_port: port,
            tunnel_network: None,
            local_interface_name: snapshot.name.clone(),
            remote_interface_name: None,
            local_public_key: public_key,
            remote_public_key: key.peer.public_key.clone(),
            local_private_key: private_key,
            local_preshared_key: key.peer.preshared_key.clone(),
            fwmark: snapshot.fwmark,
            latest_handshake: key.peer.latest_handshake,
            rx_bytes: key.peer.rx_bytes,
            tx_bytes: key.peer.tx_bytes,
            keepalive: effective_keepalive(key.peer, self.config.persistent_keepalive),
            datestamp: Utc::now(),
            status: STATUS_UP.to_string(),
            is_configured: true,
        })
    }
}

fn skip(report: &mut PassReport, name: &str, reason: String) {
    warn!(interface = %name, %reason, "skipping interface");
    report.skipped.push(SkippedInterface {
        name: name.to_string(),
        reason,
    });
}
