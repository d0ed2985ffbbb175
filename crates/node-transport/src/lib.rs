//! Safe, timeout-bounded command execution and single-file transfer
//!
//! This crate hides the differences between a local child process, an SSH
//! session, a Docker container and a Kubernetes pod behind one
//! [`Transport`] contract. Callers open a [`TransportSession`] through a
//! [`Connector`] (normally the [`TransportRouter`]); the session screens every
//! command with the [`SafetyFilter`] and bounds every call with a watchdog
//! timeout.

#![warn(missing_docs)]

pub mod archive;
pub mod backends;
pub mod command;
pub mod error;
pub mod node;
pub mod process;
pub mod router;
pub mod safety;
pub mod session;
pub mod shell;
pub mod timeout;
pub mod transport;

pub use backends::{DockerTransport, LocalTransport, SshConfig, SshTransport};
#[cfg(feature = "kube")]
pub use backends::KubeTransport;
pub use command::Command;
pub use error::{Error, Result};
pub use node::{Node, TransportKind};
pub use process::{CommandOutput, ExitStatus};
pub use router::{LocalAddresses, TransportRouter, is_local_address};
pub use safety::SafetyFilter;
pub use session::TransportSession;
pub use timeout::{DEFAULT_CMD_TIMEOUT, bounded};
pub use transport::{Connector, Transport};
