//! Docker container backend using the docker CLI
//!
//! Commands run through `docker exec`. Files move through the runtime's
//! archive primitives: `docker cp` to or from `-` streams a tar archive,
//! which is built or unpacked in memory by [`crate::archive`].

use async_trait::async_trait;
use std::path::Path;

use crate::archive;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::node::{Node, TransportKind};
use crate::shell;
use crate::transport::Transport;

/// A node living in a named Docker container
#[derive(Debug, Clone)]
pub struct DockerTransport {
    container: String,
    /// Docker binary, overridable for podman-compatible CLIs
    binary: String,
}

impl DockerTransport {
    /// Create a transport without checking the container
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            binary: "docker".to_string(),
        }
    }

    /// Use a different docker-compatible binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Resolve the container for `node` and verify that it is running
    pub async fn connect(node: &Node) -> Result<Self> {
        let container = node
            .container
            .clone()
            .ok_or_else(|| Error::init(node.identity(), "docker node has no container name"))?;
        let mut transport = Self::new(container);
        if let Some(binary) = &node.docker_binary {
            transport = transport.with_binary(binary.clone());
        }

        let output = transport
            .docker(["inspect", "-f", "{{.State.Running}}", transport.container.as_str()])
            .run()
            .await
            .map_err(|e| Error::init(node.identity(), e.to_string()))?;
        if !output.status.success() {
            return Err(Error::init(node.identity(), output.combined()));
        }
        if output.stdout_lossy().trim() != "true" {
            return Err(Error::init(
                node.identity(),
                format!("container {} is not running", transport.container),
            ));
        }

        tracing::debug!("Docker container {} is running", transport.container);
        Ok(transport)
    }

    fn docker<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::builder(&self.binary).args(args).build()
    }

    fn exec_command(&self, command: &str) -> Command {
        self.docker(["exec", self.container.as_str(), "sh", "-c", command])
    }
}

#[async_trait]
impl Transport for DockerTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Docker
    }

    async fn exec(&self, command: &str) -> Result<String> {
        tracing::debug!("docker exec in {}: {}", self.container, command);
        let output = self.exec_command(command).run().await?;
        if output.status.success() {
            Ok(output.stdout_lossy())
        } else {
            Err(Error::command_failed(command, output.combined()))
        }
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let source = format!("{}:{}", self.container, remote);
        let output = self.docker(["cp", source.as_str(), "-"]).run().await?;
        if !output.status.success() {
            return Err(Error::transfer(format!(
                "docker cp {}: {}",
                source,
                output.combined()
            )));
        }

        let (_, name) = shell::split_remote_path(remote);
        archive::unpack_to(&output.stdout, name, local).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let (dir, name) = shell::split_remote_path(remote);
        let data = archive::pack_file(local, name).await?;

        let dest = format!("{}:{}", self.container, dir);
        let mut cmd = self.docker(["cp", "-", dest.as_str()]);
        cmd.stdin_bytes(data);
        let output = cmd.run().await?;
        if !output.status.success() {
            return Err(Error::transfer(format!(
                "docker cp to {}: {}",
                dest,
                output.combined()
            )));
        }
        Ok(())
    }
}
