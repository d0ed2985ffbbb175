//! The transport contract shared by every backend

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::node::{Node, TransportKind};

/// Executes commands and moves single files against one node
///
/// Backends implement the raw mechanism only. The safety filter and the
/// watchdog timeout are applied by [`TransportSession`](crate::TransportSession),
/// which is the only way callers reach a backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The mechanism this backend uses
    fn kind(&self) -> TransportKind;

    /// Run a shell command and return its textual output
    async fn exec(&self, command: &str) -> Result<String>;

    /// Copy one remote file to `local`, creating local parent directories
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Copy one local file to the remote path `remote`
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Run a command as another user through an interactive `su` switch
    ///
    /// The output is whatever accumulated after waiting `wait`; completion of
    /// the command is not detected. Implementations must return within
    /// `wait + SU_SWITCH_ALLOWANCE`.
    async fn exec_as(
        &self,
        user: &str,
        password: &str,
        command: &str,
        wait: Duration,
    ) -> Result<String> {
        let _ = (user, password, command, wait);
        Err(Error::unsupported("su exec", self.kind()))
    }

    /// Release the underlying connection
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Time a transport may spend switching user on top of the caller's wait
pub const SU_SWITCH_ALLOWANCE: Duration = Duration::from_secs(5);

/// Produces a connected transport for a node
#[async_trait]
pub trait Connector: Send + Sync {
    /// Resolve and connect the transport for `node`
    async fn connect(&self, node: &Node) -> Result<Box<dyn Transport>>;
}

/// Create the parent directory of a local destination
pub(crate) async fn ensure_parent(local: &Path) -> Result<()> {
    if let Some(parent) = local.parent() {
        if !parent.as_os_str().is_empty() {
            async_fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}
