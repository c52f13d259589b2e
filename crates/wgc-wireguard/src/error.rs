//! Error types for `WireGuard` live-state operations.

use thiserror::Error;

/// Result type alias for live-state operations.
pub type Result<T> = std::result::Result<T, WireGuardError>;

/// Errors that can occur while reading live interface state.
#[derive(Debug, Error)]
pub enum WireGuardError {
    /// A dump line had too few fields or a non-numeric numeric field.
    #[error("malformed dump at line {line}: {reason}")]
    MalformedDump {
        /// 1-based line number within the dump.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// An endpoint token could not be split into host and port.
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// A CLI tool could not be started.
    #[error("{command} not installed: {message}")]
    NotInstalled {
        /// The program that was executed.
        command: String,
        /// Error from the spawn attempt.
        message: String,
    },

    /// A CLI tool exited unsuccessfully.
    #[error("command failed: {command} exited with {exit_code}: {stderr}")]
    CommandFailed {
        /// The command line that was executed.
        command: String,
        /// Exit code of the command.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// Local network interfaces could not be listed.
    #[error("interface enumeration failed: {message}")]
    Enumeration {
        /// Description of the failure.
        message: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireGuardError {
    /// Creates a `MalformedDump` error.
    #[must_use]
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedDump {
            line,
            reason: reason.into(),
        }
    }

    /// Creates a `CommandFailed` error.
    #[must_use]
    pub fn command_failed(
        command: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Creates an `Enumeration` error.
    #[must_use]
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::Enumeration {
            message: message.into(),
        }
    }

    /// Returns `true` if the failure is scoped to one interface.
    ///
    /// Enumeration and installation failures affect every interface.
    #[must_use]
    pub const fn is_interface_scoped(&self) -> bool {
        matches!(
            self,
            Self::MalformedDump { .. } | Self::InvalidEndpoint(_) | Self::CommandFailed { .. }
        )
    }
}
