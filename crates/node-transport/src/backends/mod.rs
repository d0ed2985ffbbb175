//! Transport backends, one per remote-execution mechanism
//!
//! Each backend implements [`Transport`](crate::transport::Transport) with
//! the raw mechanism only. Callers reach them through
//! [`TransportSession`](crate::session::TransportSession), which applies the
//! safety filter and the watchdog timeout.

pub mod docker;
pub mod local;
pub mod ssh;

#[cfg(feature = "kube")]
pub mod kube;

pub use docker::DockerTransport;
pub use local::LocalTransport;
pub use ssh::{SshConfig, SshTransport};

#[cfg(feature = "kube")]
pub use kube::KubeTransport;
