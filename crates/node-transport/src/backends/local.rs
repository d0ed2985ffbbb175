//! Local child-process backend

use async_trait::async_trait;
use std::path::Path;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::node::TransportKind;
use crate::transport::{Transport, ensure_parent};

/// Runs commands as `sh -c` children of this process
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl LocalTransport {
    /// Create a local transport
    pub fn new() -> Self {
        Self
    }

    fn shell(command: &str) -> Command {
        // Merge stderr into stdout for the whole script, not just its last pipeline
        Command::builder("sh")
            .arg("-c")
            .arg(format!("exec 2>&1\n{}", command))
            .build()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    async fn exec(&self, command: &str) -> Result<String> {
        tracing::debug!("local exec: {}", command);
        let output = Self::shell(command).run().await?;
        let text = output.stdout_lossy();
        if output.status.success() {
            Ok(text)
        } else {
            Err(Error::command_failed(command, text.trim()))
        }
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        ensure_parent(local).await?;
        async_fs::copy(remote, local)
            .await
            .map_err(|e| Error::transfer(format!("copy {} -> {}: {}", remote, local.display(), e)))?;
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        ensure_parent(Path::new(remote)).await?;
        async_fs::copy(local, remote)
            .await
            .map_err(|e| Error::transfer(format!("copy {} -> {}: {}", local.display(), remote, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_exec_merges_streams() {
        let transport = LocalTransport::new();
        let out = transport.exec("echo out; echo err >&2").await.unwrap();
        assert!(out.contains("out"));
        assert!(out.contains("err"));
    }

    #[smol_potat::test]
    async fn test_nonzero_exit_fails_with_output() {
        let transport = LocalTransport::new();
        match transport.exec("echo broken; exit 2").await {
            Err(Error::CommandFailed { output, .. }) => assert_eq!(output, "broken"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[smol_potat::test]
    async fn test_download_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("observer.log");
        std::fs::write(&source, "hello").unwrap();
        let dest = dir.path().join("a/b/c/observer.log");

        LocalTransport::new()
            .download(source.to_str().unwrap(), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "hello");
    }

    #[smol_potat::test]
    async fn test_download_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalTransport::new()
            .download("/nonexistent/observer.log", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transfer { .. }));
    }
}
