//! Reconciliation context.
//!
//! A [`ReconcileConfig`] is built once at startup and handed to the engine.
//! It names which interfaces belong to which family, which control ports
//! each family uses, and which endpoint roles new tunnels receive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use wgc_proto::{AddressFamily, V4_DEFAULT_PORT, V6_DEFAULT_PORT};

use crate::error::ReconcileError;

/// Role an endpoint plays in a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    /// Accepting side.
    Server,
    /// Initiating side.
    Client,
}

impl fmt::Display for EndpointRole {
    /// Wire form used in endpoint-type options.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("Server"),
            Self::Client => f.write_str("Client"),
        }
    }
}

impl FromStr for EndpointRole {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            other => Err(ReconcileError::Config(format!("unknown endpoint role '{other}'"))),
        }
    }
}

/// Endpoint roles assigned to newly discovered tunnels of one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    /// Role of this host.
    pub local: EndpointRole,
    /// Role of the peer.
    pub remote: EndpointRole,
}

impl RolePolicy {
    /// Default for v4 tunnels: this host serves, the peer is a client.
    pub const V4_DEFAULT: Self = Self {
        local: EndpointRole::Server,
        remote: EndpointRole::Client,
    };

    /// Default for v6 tunnels: both sides are clients.
    pub const V6_DEFAULT: Self = Self {
        local: EndpointRole::Client,
        remote: EndpointRole::Client,
    };

    /// Returns `true` if both sides have the same role.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        self.local == self.remote
    }
}

/// Context value for a reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Interface name prefix for v4 tunnels.
    pub v4_interface_prefix: String,
    /// Interface name prefix for v6 tunnels.
    pub v6_interface_prefix: String,
    /// Control port for v4 tunnels.
    pub v4_port: u16,
    /// Control port for v6 tunnels.
    pub v6_port: u16,
    /// Keepalive written to new records when the peer reports none, in seconds.
    pub persistent_keepalive: u32,
    /// Roles for new v4 tunnels.
    pub v4_roles: RolePolicy,
    /// Roles for new v6 tunnels.
    pub v6_roles: RolePolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            v4_interface_prefix: "v4wgconnect".to_string(),
            v6_interface_prefix: "v6wgconnect".to_string(),
            v4_port: V4_DEFAULT_PORT,
            v6_port: V6_DEFAULT_PORT,
            persistent_keepalive: 0,
            v4_roles: RolePolicy::V4_DEFAULT,
            v6_roles: RolePolicy::V6_DEFAULT,
        }
    }
}

impl ReconcileConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a prefix is empty, both prefixes are equal or one
    /// is a prefix of the other, or a port is zero.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.v4_interface_prefix.is_empty() || self.v6_interface_prefix.is_empty() {
            return Err(ReconcileError::Config(
                "interface prefixes cannot be empty".to_string(),
            ));
        }
        if self.v4_interface_prefix.starts_with(&self.v6_interface_prefix)
            || self.v6_interface_prefix.starts_with(&self.v4_interface_prefix)
        {
            return Err(ReconcileError::Config(
                "v4 and v6 interface prefixes must not overlap".to_string(),
            ));
        }
        if self.v4_port == 0 || self.v6_port == 0 {
            return Err(ReconcileError::Config("ports cannot be zero".to_string()));
        }
        Ok(())
    }

    /// Family of a tunnel interface, or `None` if the name carries neither prefix.
    #[must_use]
    pub fn family_for(&self, interface: &str) -> Option<AddressFamily> {
        if interface.starts_with(&self.v4_interface_prefix) {
            Some(AddressFamily::V4)
        } else if interface.starts_with(&self.v6_interface_prefix) {
            Some(AddressFamily::V6)
        } else {
            None
        }
    }

    /// Control port for a family.
    #[must_use]
    pub const fn port(&self, family: AddressFamily) -> u16 {
        match family {
            AddressFamily::V4 => self.v4_port,
            AddressFamily::V6 => self.v6_port,
        }
    }

    /// Role policy for a family.
    #[must_use]
    pub const fn roles(&self, family: AddressFamily) -> RolePolicy {
        match family {
            AddressFamily::V4 => self.v4_roles,
            AddressFamily::V6 => self.v6_roles,
        }
    }
}
