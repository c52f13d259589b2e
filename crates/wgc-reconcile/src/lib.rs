//! Tunnel reconciliation for wgconnect.
//!
//! The [`Reconciler`] compares the `WireGuard` interfaces configured on this
//! host against a persisted [`TunnelInventory`]. Each pass creates records
//! for newly discovered peers, refreshes counters on known ones, and returns
//! the records whose peers should be sent an info request.
//!
//! ```rust,ignore
//! use wgc_reconcile::{LogNotifier, MemoryInventory, ReconcileConfig, Reconciler};
//! use wgc_wireguard::SystemSource;
//!
//! let engine = Reconciler::new(
//!     ReconcileConfig::default(),
//!     SystemSource::new(),
//!     MemoryInventory::new(),
//!     LogNotifier,
//! );
//! let report = engine.reconcile().await?;
//! for request in report.build_requests() {
//!     // hand to the transport
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod info;
pub mod inventory;
pub mod notify;
pub mod record;

pub use config::{EndpointRole, ReconcileConfig, RolePolicy};
pub use engine::{PassReport, RecordFailure, Reconciler, SkippedInterface};
pub use error::{ReconcileError, Result};
pub use info::{
    apply_info_reply, build_info_request, build_v4_info_replies, build_v4_info_request,
    build_v6_info_replies, build_v6_info_request, InfoRequest,
};
pub use inventory::{JsonFileInventory, MemoryInventory, TunnelInventory};
pub use notify::{ChannelNotifier, LogNotifier, TunnelEvent, TunnelNotifier};
pub use record::{ChangedFields, TunnelField, TunnelRecord, STATUS_UP};
