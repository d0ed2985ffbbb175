//! Error types for node transports

use thiserror::Error;

/// Unified error type for every transport operation
#[derive(Error, Debug)]
pub enum Error {
    /// Session or authentication setup failed
    #[error("failed to initialise transport for {node}: {reason}")]
    TransportInit {
        /// The node identity the transport was being opened for
        node: String,
        /// The reason for the failure
        reason: String,
    },

    /// The command was denied by the safety filter and never dispatched
    #[error("refusing to run unsafe command: {command}")]
    UnsafeCommand {
        /// The rejected command
        command: String,
    },

    /// The local watchdog expired before the call returned
    #[error("{operation} timed out after {seconds}s")]
    CommandTimeout {
        /// Description of the bounded operation
        operation: String,
        /// The limit that expired
        seconds: u64,
    },

    /// The command ran but reported failure
    #[error("command `{command}` failed: {output}")]
    CommandFailed {
        /// The command that failed
        command: String,
        /// Captured output describing the failure
        output: String,
    },

    /// A helper program could not be started
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// Download, upload or exec-protocol failure
    #[error("transfer failed: {reason}")]
    Transfer {
        /// The reason for the transfer failure
        reason: String,
    },

    /// The backend has no way to perform this operation
    #[error("{operation} is not supported by the {transport} transport")]
    Unsupported {
        /// The requested operation
        operation: String,
        /// The transport kind that refused it
        transport: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WebSocket error on a pod exec channel
    #[cfg(feature = "kube")]
    #[error("exec channel error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

impl Error {
    /// Create a transport initialisation error
    pub fn init(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransportInit {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a transfer error
    pub fn transfer(reason: impl Into<String>) -> Self {
        Self::Transfer {
            reason: reason.into(),
        }
    }

    /// Create a command failure error
    pub fn command_failed(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>, transport: impl std::fmt::Display) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            transport: transport.to_string(),
        }
    }

    /// Returns true for errors raised before the transport ever ran the command
    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::UnsafeCommand { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
