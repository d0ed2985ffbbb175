//! Error types for log gathering

use thiserror::Error;

/// Errors raised while gathering from one node, or while checking a run's
/// configuration
#[derive(Error, Debug)]
pub enum Error {
    /// A transport call failed
    #[error(transparent)]
    Transport(#[from] node_transport::Error),

    /// Discovery and selection left nothing to collect
    #[error("no {scope} log files selected in {dir}")]
    DiscoveryEmpty {
        /// The scope that was searched
        scope: String,
        /// The remote log directory
        dir: String,
    },

    /// More files were selected than the run allows
    #[error("too many files: {count} selected, limit is {limit}")]
    TooManyFiles {
        /// Number of selected files
        count: usize,
        /// Configured file number limit
        limit: usize,
    },

    /// The packaged bundle is zero bytes
    #[error("bundle {path} is empty")]
    EmptyBundle {
        /// Remote bundle path
        path: String,
    },

    /// The packaged bundle exceeds the size limit
    #[error("bundle {path} is {size} bytes, limit is {limit}")]
    BundleTooLarge {
        /// Remote bundle path
        path: String,
        /// Reported bundle size
        size: u64,
        /// Configured size limit
        limit: u64,
    },

    /// A timestamp or duration given by the operator could not be parsed
    #[error("invalid time value `{value}`: {reason}")]
    InvalidTimestamp {
        /// The offending input
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The run configuration is unusable; raised before any node is touched
    #[error("invalid gather configuration: {0}")]
    Config(String),

    /// Unexpected output from a remote command
    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput {
        /// The command that was run
        command: String,
        /// What it printed
        output: String,
    },
}

impl Error {
    /// Create an invalid timestamp error
    pub fn invalid_timestamp(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
