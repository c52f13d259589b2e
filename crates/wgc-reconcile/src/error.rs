//! Error types for reconciliation.

use thiserror::Error;
use uuid::Uuid;
use wgc_proto::ProtoError;
use wgc_wireguard::WireGuardError;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors raised by the reconciliation engine and its collaborators.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Local interfaces could not be listed; the pass is abandoned.
    #[error("network enumeration failed: {message}")]
    Enumeration {
        /// Description of the failure.
        message: String,
    },

    /// The inventory rejected a save or update for one record.
    #[error("persistence failed for tunnel {id}: {reason}")]
    Persistence {
        /// Record that could not be written.
        id: Uuid,
        /// Reason reported by the inventory.
        reason: String,
    },

    /// A record lacks a field needed to build a message.
    #[error("tunnel {id} has no {field}")]
    IncompleteRecord {
        /// Record id.
        id: Uuid,
        /// Missing field name.
        field: &'static str,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Message encoding or decoding failed.
    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// Live-state source failed.
    #[error("live state error: {0}")]
    Source(#[from] WireGuardError),
}

impl ReconcileError {
    /// Creates a `Persistence` error.
    #[must_use]
    pub fn persistence(id: Uuid, reason: impl Into<String>) -> Self {
        Self::Persistence {
            id,
            reason: reason.into(),
        }
    }

    /// Creates an `Enumeration` error.
    #[must_use]
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::Enumeration {
            message: message.into(),
        }
    }

    /// Returns `true` if the error aborts a whole pass rather than one
    /// interface or record.
    #[must_use]
    pub const fn is_fatal_for_pass(&self) -> bool {
        matches!(self, Self::Enumeration { .. } | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_is_not_fatal() {
        let err = ReconcileError::persistence(Uuid::nil(), "disk full");
        assert!(!err.is_fatal_for_pass());
        assert_eq!(
            err.to_string(),
            "persistence failed for tunnel 00000000-0000-0000-0000-000000000000: disk full"
        );
    }

    #[test]
    fn enumeration_is_fatal() {
        let err = ReconcileError::enumeration("no netlink");
        assert!(err.is_fatal_for_pass());
    }

    #[test]
    fn proto_error_converts() {
        let err: ReconcileError = ProtoError::MissingOption(157).into();
        assert_eq!(err.to_string(), "protocol error: missing option 157");
    }
}
