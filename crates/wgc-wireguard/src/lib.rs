//! `WireGuard` live state for wgconnect.
//!
//! This crate turns `wg show <if> dump` output into an [`InterfaceSnapshot`]
//! and exposes the host as a [`LiveStateSource`]: interface enumeration,
//! per-interface dumps, and local address resolution towards a peer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dump;
pub mod error;
mod keys;
pub mod source;
pub mod types;

pub use dump::{parse_all_dump, parse_dump, parse_peer_line};
pub use error::{Result, WireGuardError};
pub use keys::{PublicKey, SecretKey, KEY_SIZE};
pub use source::{FakeSource, HostInterface, LiveStateSource, SystemSource};
pub use types::{Endpoint, InterfaceSnapshot, Peer};
