//! Kubernetes pod exec backend
//!
//! Each call opens one WebSocket to the pod's `exec` subresource using the
//! `v4.channel.k8s.io` subprotocol, runs one process and reads frames until
//! the server closes the socket. Files travel as tar streams: `tar cf -` on
//! stdout for downloads and `tar xvf -` fed through stdin for uploads.

pub mod channel;
pub mod config;
pub mod tls;

use async_net::TcpStream;
use async_trait::async_trait;
use async_tungstenite::tungstenite::client::IntoClientRequest;
use async_tungstenite::tungstenite::http::{HeaderValue, Uri};
use async_tungstenite::tungstenite::{self, Message};
use async_tungstenite::{WebSocketStream, client_async};
use futures::StreamExt;
use futures_rustls::TlsConnector;
use futures_rustls::client::TlsStream;
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use std::path::Path;
use std::sync::Arc;

use crate::archive;
use crate::error::{Error, Result};
use crate::node::{Node, TransportKind};
use crate::shell;
use crate::transport::Transport;

use channel::{Demultiplexer, STDIN_CHUNK};
pub use config::{ClusterAccess, Credentials};

/// Tar reads input in records of this size
const TAR_RECORD: usize = 10240;

/// One exec WebSocket, plain or over TLS
enum ExecSocket {
    Plain(WebSocketStream<TcpStream>),
    Tls(WebSocketStream<TlsStream<TcpStream>>),
}

impl ExecSocket {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        let message = Message::Binary(frame.into());
        match self {
            Self::Plain(ws) => ws.send(message).await?,
            Self::Tls(ws) => ws.send(message).await?,
        }
        Ok(())
    }

    async fn next(&mut self) -> Option<tungstenite::Result<Message>> {
        match self {
            Self::Plain(ws) => ws.next().await,
            Self::Tls(ws) => ws.next().await,
        }
    }

    async fn close(&mut self) {
        let _ = match self {
            Self::Plain(ws) => ws.close(None).await,
            Self::Tls(ws) => ws.close(None).await,
        };
    }
}

/// A node living in a Kubernetes pod
pub struct KubeTransport {
    access: Arc<ClusterAccess>,
    tls: Option<Arc<ClientConfig>>,
    namespace: String,
    pod: String,
    container: Option<String>,
}

impl std::fmt::Debug for KubeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeTransport")
            .field("server", &self.access.server)
            .field("namespace", &self.namespace)
            .field("pod", &self.pod)
            .field("container", &self.container)
            .finish()
    }
}

impl KubeTransport {
    /// Load cluster access for `node` and verify the pod accepts exec
    pub async fn connect(node: &Node) -> Result<Self> {
        let identity = node.identity();
        let access = ClusterAccess::load(node.kubeconfig.as_deref())
            .await
            .map_err(|e| Error::init(&identity, e.to_string()))?;

        let namespace = node
            .namespace
            .clone()
            .or_else(|| access.namespace.clone())
            .unwrap_or_else(|| "default".to_string());
        let pod = node
            .pod
            .clone()
            .ok_or_else(|| Error::init(&identity, "kube node has no pod name"))?;

        let transport = Self::with_access(access, namespace, pod, node.container.clone())
            .map_err(|e| Error::init(&identity, e.to_string()))?;

        transport
            .exec("true")
            .await
            .map_err(|e| Error::init(&identity, e.to_string()))?;
        tracing::debug!("Pod {}/{} accepts exec", transport.namespace, transport.pod);
        Ok(transport)
    }

    /// Build a transport from already-loaded cluster access
    pub fn with_access(
        access: ClusterAccess,
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: Option<String>,
    ) -> Result<Self> {
        let tls = if access.uses_tls() {
            Some(tls::client_config(&access)?)
        } else {
            None
        };
        Ok(Self {
            access: Arc::new(access),
            tls,
            namespace: namespace.into(),
            pod: pod.into(),
            container,
        })
    }

    /// WebSocket URL of the exec subresource running `argv`
    pub fn exec_url(&self, argv: &[&str], stdin: bool) -> String {
        let base = if let Some(rest) = self.access.server.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.access.server.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.access.server.clone()
        };

        let mut query: Vec<String> = argv
            .iter()
            .map(|arg| format!("command={}", percent_encode(arg)))
            .collect();
        if let Some(container) = &self.container {
            query.push(format!("container={}", percent_encode(container)));
        }
        query.push(format!("stdin={}", stdin));
        query.push("stdout=true".to_string());
        query.push("stderr=true".to_string());
        query.push("tty=false".to_string());

        format!(
            "{}/api/v1/namespaces/{}/pods/{}/exec?{}",
            base,
            percent_encode(&self.namespace),
            percent_encode(&self.pod),
            query.join("&")
        )
    }

    async fn open(&self, url: &str) -> Result<ExecSocket> {
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::transfer(format!("invalid exec url {}: {}", url, e)))?;
        let host = uri
            .host()
            .ok_or_else(|| Error::transfer(format!("exec url {} has no host", url)))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = uri
            .port_u16()
            .unwrap_or(if self.tls.is_some() { 443 } else { 80 });

        let mut request = url.into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(channel::PROTOCOL),
        );
        if let Some(auth) = self.access.credentials.header() {
            let value = HeaderValue::from_str(&auth)
                .map_err(|e| Error::transfer(format!("invalid credentials header: {}", e)))?;
            headers.insert("Authorization", value);
        }

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        match &self.tls {
            Some(config) => {
                let server_name = ServerName::try_from(host.clone())
                    .map_err(|e| Error::transfer(format!("invalid server name {}: {}", host, e)))?;
                let tls_stream = TlsConnector::from(config.clone())
                    .connect(server_name, stream)
                    .await?;
                let (ws, _) = client_async(request, tls_stream).await?;
                Ok(ExecSocket::Tls(ws))
            }
            None => {
                let (ws, _) = client_async(request, stream).await?;
                Ok(ExecSocket::Plain(ws))
            }
        }
    }

    /// Run `argv` in the pod, feeding `input` to stdin, and collect all frames
    async fn run(&self, argv: &[&str], input: Option<&[u8]>) -> Result<Demultiplexer> {
        let url = self.exec_url(argv, input.is_some());
        tracing::debug!("pod exec in {}/{}: {:?}", self.namespace, self.pod, argv);
        let mut socket = self.open(&url).await?;

        if let Some(input) = input {
            for chunk in input.chunks(STDIN_CHUNK) {
                socket.send(channel::stdin_frame(chunk)).await?;
            }
        }

        let mut demux = Demultiplexer::new();
        while let Some(message) = socket.next().await {
            match message {
                Ok(Message::Binary(frame)) => demux.push(&frame),
                Ok(Message::Text(text)) => demux.push(text.as_str().as_bytes()),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed)
                | Err(tungstenite::Error::Protocol(
                    tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
                )) => break,
                Err(e) => return Err(e.into()),
            }
        }
        socket.close().await;
        Ok(demux)
    }
}

#[async_trait]
impl Transport for KubeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Kube
    }

    async fn exec(&self, command: &str) -> Result<String> {
        let demux = self.run(&["/bin/sh", "-c", command], None).await?;

        if let Some(status) = demux.status() {
            if status.is_missing_init_process() {
                tracing::debug!("pod {}/{} has no init process", self.namespace, self.pod);
                return Ok(String::new());
            }
        }
        if demux.failed() {
            return Err(Error::command_failed(command, demux.error_text()));
        }

        let mut output = String::from_utf8_lossy(demux.stdout()).into_owned();
        output.push_str(&String::from_utf8_lossy(demux.stderr()));
        Ok(output)
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let (dir, name) = shell::split_remote_path(remote);
        let demux = self.run(&["tar", "cf", "-", "-C", dir, name], None).await?;
        if !demux.stderr().is_empty() || demux.failed() {
            return Err(Error::transfer(format!(
                "tar of {} in {}/{}: {}",
                remote,
                self.namespace,
                self.pod,
                demux.error_text()
            )));
        }
        archive::unpack_to(demux.stdout(), name, local).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let (dir, name) = shell::split_remote_path(remote);
        let mut data = archive::pack_file(local, name).await?;
        let padded = data.len().div_ceil(TAR_RECORD) * TAR_RECORD;
        data.resize(padded, 0);

        let demux = self.run(&["tar", "xvf", "-", "-C", dir], Some(&data)).await?;
        if !demux.stderr().is_empty() || demux.failed() {
            return Err(Error::transfer(format!(
                "untar into {} in {}/{}: {}",
                dir,
                self.namespace,
                self.pod,
                demux.error_text()
            )));
        }
        Ok(())
    }
}

/// Percent-encode a query or path component
fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
