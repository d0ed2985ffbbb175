//! SSH backend using the OpenSSH CLI
//!
//! One authenticated session per node is realised as a control-master
//! connection owned by the transport. Every exec and file transfer opens a
//! fresh channel multiplexed over that master, so authentication happens
//! exactly once per run.

use async_io::Timer;
use async_process::{Child, Stdio};
use async_trait::async_trait;
use futures_lite::future;
use futures_lite::io::{AsyncReadExt, AsyncWriteExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::node::{Node, TransportKind};
use crate::shell;
use crate::transport::{Transport, ensure_parent};

/// How long a batch-mode master may take to authenticate
const BATCH_READY_TIMEOUT: Duration = Duration::from_secs(30);
/// How long the operator has to answer an interactive password prompt
const INTERACTIVE_READY_TIMEOUT: Duration = Duration::from_secs(300);
/// Poll interval while waiting for the master socket
const READY_POLL: Duration = Duration::from_millis(100);
/// Pause between the lines typed into a `su` shell
const SU_PROMPT_PAUSE: Duration = Duration::from_millis(500);

/// SSH connection configuration
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP)
    host: String,
    /// SSH user (optional, uses system default if not specified)
    user: Option<String>,
    /// SSH port (optional, defaults to 22)
    port: Option<u16>,
    /// Path to identity file (private key)
    identity_file: Option<PathBuf>,
    /// Password supplied through `sshpass` when key auth is rejected
    password: Option<String>,
    /// Additional SSH arguments
    extra_args: Vec<String>,
}

impl SshConfig {
    /// Create a new SSH configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
            password: None,
            extra_args: Vec::new(),
        }
    }

    /// Build the configuration from a node descriptor
    pub fn from_node(node: &Node) -> Result<Self> {
        let host = node
            .address
            .clone()
            .ok_or_else(|| Error::init(node.identity(), "ssh node has no address"))?;
        let mut config = Self::new(host);
        config.user = node.user.clone();
        config.port = node.port;
        config.identity_file = node.key_file.clone();
        config.password = node.password.clone();
        for option in &node.ssh_options {
            config = config.with_extra_arg(option.clone());
        }
        Ok(config)
    }

    /// Set the SSH user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the identity file (private key)
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Set the fallback password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add extra SSH arguments
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Get the host string (user@host if user is specified)
    pub fn host_string(&self) -> String {
        if let Some(user) = &self.user {
            format!("{}@{}", user, self.host)
        } else {
            self.host.clone()
        }
    }
}

/// How the master connection authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthMode {
    /// Keys or agent only, never prompt
    Batch,
    /// Password fed by `sshpass` from the environment
    Sshpass,
    /// Prompt the operator on the controlling terminal
    Interactive,
}

/// A node reached through an OpenSSH control master
pub struct SshTransport {
    config: SshConfig,
    node: String,
    control_path: PathBuf,
    master: Option<Child>,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("host", &self.config.host_string())
            .field("control_path", &self.control_path)
            .finish()
    }
}

impl SshTransport {
    /// Open and authenticate the master connection for `node`
    pub async fn connect(node: &Node) -> Result<Self> {
        let config = SshConfig::from_node(node)?;
        Self::open(config, node.identity()).await
    }

    /// Open and authenticate a master connection from an explicit config
    pub async fn open(config: SshConfig, node: impl Into<String>) -> Result<Self> {
        let control_path = std::env::temp_dir().join(format!(
            "gather-ssh-{}.sock",
            &uuid::Uuid::new_v4().simple().to_string()[..12]
        ));
        let mut transport = Self {
            config,
            node: node.into(),
            control_path,
            master: None,
        };

        match transport.start_master(AuthMode::Batch).await {
            Ok(()) => {}
            Err(reason) if is_auth_failure(&reason) => {
                let mode = if transport.config.password.is_some() {
                    AuthMode::Sshpass
                } else {
                    AuthMode::Interactive
                };
                tracing::info!(
                    "Key authentication rejected by {}, retrying with {:?} password auth",
                    transport.node,
                    mode
                );
                transport
                    .start_master(mode)
                    .await
                    .map_err(|reason| Error::init(&transport.node, reason))?;
            }
            Err(reason) => return Err(Error::init(&transport.node, reason)),
        }

        tracing::debug!(
            "SSH master for {} ready at {}",
            transport.node,
            transport.control_path.display()
        );
        Ok(transport)
    }

    fn common_options(&self, cmd: &mut Command) {
        cmd.arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-o")
            .arg("LogLevel=ERROR");
        if let Some(port) = self.config.port {
            cmd.arg("-o").arg(format!("Port={}", port));
        }
        for arg in &self.config.extra_args {
            cmd.arg(arg);
        }
    }

    fn master_command(&self, mode: AuthMode) -> Command {
        let mut cmd = match mode {
            AuthMode::Sshpass => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh");
                if let Some(password) = &self.config.password {
                    cmd.env("SSHPASS", password);
                }
                cmd
            }
            _ => Command::new("ssh"),
        };

        cmd.arg("-M").arg("-N");
        self.common_options(&mut cmd);
        cmd.args(["-o", "ControlPersist=no", "-o", "ConnectTimeout=10"]);
        cmd.args(["-o", "StrictHostKeyChecking=accept-new"]);

        match mode {
            AuthMode::Batch => {
                cmd.args(["-o", "BatchMode=yes"]);
                if let Some(identity) = &self.config.identity_file {
                    cmd.arg("-i").arg(identity);
                }
            }
            AuthMode::Sshpass | AuthMode::Interactive => {
                cmd.args([
                    "-o",
                    "BatchMode=no",
                    "-o",
                    "PreferredAuthentications=password,keyboard-interactive",
                    "-o",
                    "PubkeyAuthentication=no",
                ]);
            }
        }

        cmd.arg(self.config.host_string());
        cmd
    }

    /// Spawn the master and wait until its socket answers, returning the
    /// master's stderr as the failure reason
    async fn start_master(&mut self, mode: AuthMode) -> std::result::Result<(), String> {
        let mut cmd = self.master_command(mode).prepare();
        cmd.stdin(if mode == AuthMode::Interactive {
            Stdio::inherit()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn ssh master: {}", e))?;

        let limit = if mode == AuthMode::Interactive {
            INTERACTIVE_READY_TIMEOUT
        } else {
            BATCH_READY_TIMEOUT
        };
        let deadline = Instant::now() + limit;

        loop {
            if let Some(status) = child.try_status().map_err(|e| e.to_string())? {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                let stderr = stderr.trim();
                return Err(if stderr.is_empty() {
                    format!("ssh master exited with {:?}", status.code())
                } else {
                    stderr.to_string()
                });
            }

            if self.check_master().await {
                self.master = Some(child);
                return Ok(());
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                return Err(format!(
                    "ssh master not ready after {}s",
                    limit.as_secs()
                ));
            }
            Timer::after(READY_POLL).await;
        }
    }

    async fn check_master(&self) -> bool {
        let mut cmd = Command::new("ssh");
        self.common_options(&mut cmd);
        cmd.arg("-O").arg("check").arg(self.config.host_string());
        matches!(cmd.run().await, Ok(output) if output.status.success())
    }

    fn channel(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        self.common_options(&mut cmd);
        cmd.args(["-o", "BatchMode=yes"]);
        cmd
    }

    async fn sftp(&self, script: String) -> Result<()> {
        let mut cmd = self.channel("sftp");
        cmd.arg("-b").arg("-").arg(self.config.host_string());
        cmd.stdin_bytes(script.clone());

        let output = cmd.run().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::transfer(format!(
                "sftp `{}` on {}: {}",
                script.trim(),
                self.node,
                output.combined()
            )))
        }
    }
}

/// Quote a path for an sftp batch script
fn sftp_quote(path: &str) -> String {
    format!("\"{}\"", path.replace('\\', "\\\\").replace('"', "\\\""))
}

fn is_auth_failure(stderr: &str) -> bool {
    stderr.contains("Permission denied") || stderr.contains("Too many authentication failures")
}

#[async_trait]
impl Transport for SshTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    async fn exec(&self, command: &str) -> Result<String> {
        tracing::debug!("ssh exec on {}: {}", self.node, command);
        let mut cmd = self.channel("ssh");
        cmd.arg(self.config.host_string()).arg("--").arg(command);

        let output = cmd.run().await?;
        let stderr = output.stderr_lossy();
        if !stderr.trim().is_empty() {
            return Err(Error::command_failed(command, stderr.trim()));
        }
        Ok(output.stdout_lossy())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        ensure_parent(local).await?;
        let local = local.to_string_lossy();
        self.sftp(format!("get {} {}\n", sftp_quote(remote), sftp_quote(&local)))
            .await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let local = local.to_string_lossy();
        self.sftp(format!("put {} {}\n", sftp_quote(&local), sftp_quote(remote)))
            .await
    }

    async fn exec_as(
        &self,
        user: &str,
        password: &str,
        command: &str,
        wait: Duration,
    ) -> Result<String> {
        tracing::debug!("ssh su exec on {} as {}: {}", self.node, user, command);
        let mut cmd = self.channel("ssh").prepare();
        cmd.arg("-tt").arg(self.config.host_string());
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn_failed(format!("failed to spawn ssh shell: {}", e)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::spawn_failed("ssh shell has no stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::spawn_failed("ssh shell has no stdout"))?;

        let mut collected = Vec::new();
        let typing = async {
            stdin
                .write_all(format!("su - {}\n", shell::quote(user)).as_bytes())
                .await?;
            Timer::after(SU_PROMPT_PAUSE).await;
            stdin.write_all(format!("{}\n", password).as_bytes()).await?;
            Timer::after(SU_PROMPT_PAUSE).await;
            stdin.write_all(format!("{}\n", command).as_bytes()).await?;
            stdin.flush().await?;
            Timer::after(wait).await;
            Ok::<(), std::io::Error>(())
        };
        let reading = async {
            let mut buf = [0u8; 4096];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => collected.extend_from_slice(&buf[..n]),
                }
            }
            // The shell closed early; let the fixed wait finish anyway
            future::pending::<()>().await;
            Ok(())
        };

        let typed = future::or(typing, reading).await;
        let _ = child.kill();
        typed?;

        Ok(String::from_utf8_lossy(&collected).into_owned())
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut master) = self.master.take() else {
            return Ok(());
        };

        let mut cmd = Command::new("ssh");
        self.common_options(&mut cmd);
        cmd.arg("-O").arg("exit").arg(self.config.host_string());
        if let Err(e) = cmd.run().await {
            tracing::debug!("ssh -O exit for {} failed: {}", self.node, e);
        }

        let _ = master.kill();
        let _ = master.status().await;
        let _ = async_fs::remove_file(&self.control_path).await;
        tracing::debug!("Closed SSH master for {}", self.node);
        Ok(())
    }
}
