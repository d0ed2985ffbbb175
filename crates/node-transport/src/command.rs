//! Helper-process command builder
//!
//! Every backend except the Kubernetes one reaches its node through a helper
//! program (`sh`, `ssh`, `sftp`, `docker`). This type describes one such
//! invocation and runs it with captured output.

use async_process::{Command as AsyncCommand, Stdio};
use futures_lite::io::AsyncWriteExt;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};

use crate::error::{Error, Result};
use crate::process::{CommandOutput, ExitStatus};

/// A helper command to be executed
///
/// Unlike `async_process::Command`, this type is `Clone` and can be reused,
/// which lets the SSH backend retry the same invocation with different
/// authentication settings.
#[derive(Debug, Clone)]
pub struct Command {
    /// The program to execute
    program: OsString,
    /// The arguments to pass to the program
    args: Vec<OsString>,
    /// Environment variables to set
    env: HashMap<OsString, OsString>,
    /// Bytes written to the child's stdin before it is closed
    stdin: Option<Vec<u8>>,
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            env: HashMap::new(),
            stdin: None,
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(&mut self, key: K, val: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Feed these bytes to the child's stdin
    pub fn stdin_bytes(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.stdin = Some(data.into());
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Get the environment variables
    pub fn get_envs(&self) -> &HashMap<OsString, OsString> {
        &self.env
    }

    /// Human readable form used in log lines and error messages
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    /// Convert to an `async_process::Command`
    ///
    /// The child is killed when its handle is dropped, so abandoning a call
    /// (for instance on timeout) never leaks the local helper process.
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args);
        for (key, val) in &self.env {
            cmd.env(key, val);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run to completion, capturing stdout and stderr
    pub async fn run(&self) -> Result<CommandOutput> {
        let mut cmd = self.prepare();
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            Error::spawn_failed(format!(
                "failed to spawn {}: {}",
                self.program.to_string_lossy(),
                e
            ))
        })?;

        let stdin = child.stdin.take();
        let data = self.stdin.clone();
        let feed = async move {
            if let (Some(mut pipe), Some(data)) = (stdin, data) {
                pipe.write_all(&data).await?;
                pipe.close().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (fed, output) = futures_lite::future::zip(feed, child.output()).await;
        let output = output?;
        // A child that exits before draining stdin yields a broken pipe; its
        // exit status and stderr carry the real story.
        if let Err(e) = fed {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e.into());
            }
        }

        Ok(CommandOutput {
            status: ExitStatus::from(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Builder pattern helper
impl Command {
    /// Create a builder for this command (for chaining)
    pub fn builder<S: AsRef<OsStr>>(program: S) -> CommandBuilder {
        CommandBuilder(Command::new(program))
    }
}

/// Builder wrapper for more ergonomic command construction
pub struct CommandBuilder(Command);

impl CommandBuilder {
    /// Add an argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.0.arg(arg);
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0.args(args);
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.0.env(key, val);
        self
    }

    /// Feed bytes to stdin
    pub fn stdin_bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.0.stdin_bytes(data);
        self
    }

    /// Build the command
    pub fn build(self) -> Command {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = Command::builder("docker")
            .arg("exec")
            .args(["app", "sh"])
            .env("DOCKER_HOST", "unix:///var/run/docker.sock")
            .build();

        assert_eq!(cmd.get_program(), "docker");
        assert_eq!(cmd.get_args().len(), 3);
        assert_eq!(cmd.display(), "docker exec app sh");
        assert_eq!(
            cmd.get_envs().get(OsStr::new("DOCKER_HOST")),
            Some(&OsString::from("unix:///var/run/docker.sock"))
        );
    }

    #[smol_potat::test]
    async fn test_run_captures_streams() {
        let cmd = Command::builder("sh")
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3")
            .build();

        let output = cmd.run().await.unwrap();
        assert_eq!(output.status.code, Some(3));
        assert_eq!(output.stdout_lossy(), "out\n");
        assert_eq!(output.stderr_lossy(), "err\n");
    }

    #[smol_potat::test]
    async fn test_run_feeds_stdin() {
        let cmd = Command::builder("cat").stdin_bytes("piped input").build();

        let output = cmd.run().await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout_lossy(), "piped input");
    }

    #[smol_potat::test]
    async fn test_missing_program_is_spawn_failure() {
        let cmd = Command::new("this_command_does_not_exist_12345");
        let err = cmd.run().await.unwrap_err();
        assert!(matches!(err, Error::SpawnFailed { .. }));
    }
}
