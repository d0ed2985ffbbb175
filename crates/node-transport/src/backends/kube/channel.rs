//! Channel multiplexing for the `v4.channel.k8s.io` exec protocol
//!
//! Every WebSocket frame starts with one channel byte followed by payload.
//! The status channel carries a JSON `Status` object once the remote process
//! has ended.

use serde::Deserialize;

/// WebSocket subprotocol negotiated with the API server
pub const PROTOCOL: &str = "v4.channel.k8s.io";

/// Bytes sent to the remote process
pub const STDIN: u8 = 0;
/// Remote standard output
pub const STDOUT: u8 = 1;
/// Remote standard error
pub const STDERR: u8 = 2;
/// Final status of the remote process
pub const STATUS: u8 = 3;

/// Upload payloads are written in chunks of this size
pub const STDIN_CHUNK: usize = 4096;

/// Outcome reported on the status channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    /// The process exited zero
    Success,
    /// The exec failed or the process exited non-zero
    Failure {
        /// Human readable message
        message: String,
        /// Machine readable reason, e.g. `NonZeroExitCode`
        reason: Option<String>,
    },
}

impl ExecStatus {
    /// Decode a status-channel payload
    pub fn parse(payload: &[u8]) -> Self {
        #[derive(Deserialize)]
        struct Status {
            #[serde(default)]
            status: Option<String>,
            #[serde(default)]
            message: Option<String>,
            #[serde(default)]
            reason: Option<String>,
        }

        match serde_json::from_slice::<Status>(payload) {
            Ok(status) if status.status.as_deref() == Some("Success") => ExecStatus::Success,
            Ok(status) => ExecStatus::Failure {
                message: status.message.unwrap_or_default(),
                reason: status.reason,
            },
            Err(_) => ExecStatus::Failure {
                message: String::from_utf8_lossy(payload).trim().to_string(),
                reason: None,
            },
        }
    }

    /// The API server refused to exec because the container has no init process
    pub fn is_missing_init_process(&self) -> bool {
        matches!(self, ExecStatus::Failure { message, .. } if message.contains("init process"))
    }
}

/// Accumulates frames of one exec call by channel
#[derive(Debug, Default)]
pub struct Demultiplexer {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: Option<ExecStatus>,
}

impl Demultiplexer {
    /// Create an empty demultiplexer
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one frame; frames on unknown channels are ignored
    pub fn push(&mut self, frame: &[u8]) {
        let Some((&channel, payload)) = frame.split_first() else {
            return;
        };
        match channel {
            STDOUT => self.stdout.extend_from_slice(payload),
            STDERR => self.stderr.extend_from_slice(payload),
            STATUS if !payload.is_empty() => self.status = Some(ExecStatus::parse(payload)),
            other => tracing::trace!("ignoring frame on channel {}", other),
        }
    }

    /// Collected standard output
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Collected standard error
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Status frame, if the server sent one
    pub fn status(&self) -> Option<&ExecStatus> {
        self.status.as_ref()
    }

    /// Whether the status channel reported failure
    pub fn failed(&self) -> bool {
        matches!(self.status, Some(ExecStatus::Failure { .. }))
    }

    /// Standard error and failure message joined, for error reports
    pub fn error_text(&self) -> String {
        let mut parts = Vec::new();
        let stderr = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if !stderr.is_empty() {
            parts.push(stderr);
        }
        if let Some(ExecStatus::Failure { message, .. }) = &self.status {
            if !message.is_empty() {
                parts.push(message.clone());
            }
        }
        parts.join("\n")
    }

    /// Take the collected standard output
    pub fn into_stdout(self) -> Vec<u8> {
        self.stdout
    }
}

/// Prefix a chunk of input with the stdin channel byte
pub fn stdin_frame(chunk: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(chunk.len() + 1);
    frame.push(STDIN);
    frame.extend_from_slice(chunk);
    frame
}
