//! Error types for encoding and decoding protocol messages.

use crate::option::OptionKind;
use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;

/// Errors raised while building, encoding or decoding messages.
///
/// Unrecognized option codes are never an error; they decode to
/// [`OptionValue::Unknown`](crate::OptionValue::Unknown).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// The buffer ended before a fixed-width field could be read.
    #[error("truncated {context}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        /// What was being read.
        context: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A registered option carried a payload of the wrong size.
    #[error("option {code}: invalid length {actual}, expected {expected}")]
    InvalidLength {
        /// Option code.
        code: u32,
        /// Expected length description.
        expected: &'static str,
        /// Actual payload length.
        actual: usize,
    },

    /// A value was outside the range its kind allows.
    #[error("option {code}: invalid value: {reason}")]
    InvalidValue {
        /// Option code.
        code: u32,
        /// Why the value was rejected.
        reason: String,
    },

    /// A value of the wrong kind was supplied for a registered code.
    #[error("option {code}: expected {expected} value, got {actual}")]
    KindMismatch {
        /// Option code.
        code: u32,
        /// Kind registered for the code.
        expected: OptionKind,
        /// Kind that was supplied.
        actual: OptionKind,
    },

    /// A string option was not valid UTF-8.
    #[error("option {code}: payload is not valid UTF-8")]
    InvalidUtf8 {
        /// Option code.
        code: u32,
    },

    /// The reserved end-of-options code was used as an option.
    #[error("option code {0} is reserved")]
    ReservedCode(u32),

    /// The v4 magic cookie was missing or wrong.
    #[error("bad magic cookie: {0:?}")]
    BadMagicCookie([u8; 4]),

    /// The v4 operation byte was neither request nor reply.
    #[error("unknown operation code {0}")]
    UnknownOperation(u8),

    /// A header port field did not fit in 16 bits.
    #[error("invalid port {0}")]
    InvalidPort(u32),

    /// A message type discriminator had no known meaning.
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// A required option was absent from a received message.
    #[error("missing option {0}")]
    MissingOption(u32),
}

impl ProtoError {
    /// Creates a `Truncated` error.
    #[must_use]
    pub const fn truncated(context: &'static str, needed: usize, remaining: usize) -> Self {
        Self::Truncated {
            context,
            needed,
            remaining,
        }
    }

    /// Creates an `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(code: u32, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            code,
            reason: reason.into(),
        }
    }

    /// Returns `true` if the error came from the framing rather than a value.
    ///
    /// Framing errors mean the rest of the buffer cannot be trusted.
    #[must_use]
    pub const fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::BadMagicCookie(_) | Self::UnknownOperation(_)
        )
    }
}
