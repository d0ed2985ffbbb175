//! A connected transport bound to one node

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::node::{Node, TransportKind};
use crate::safety::SafetyFilter;
use crate::timeout::{DEFAULT_CMD_TIMEOUT, bounded};
use crate::transport::{Connector, SU_SWITCH_ALLOWANCE, Transport};

/// The only way callers reach a backend
///
/// Every exec goes through the safety filter first, and every call is bounded
/// by the session timeout. A session lives for one pipeline run and must be
/// closed at the end of it.
pub struct TransportSession {
    node: Node,
    transport: Box<dyn Transport>,
    filter: Arc<SafetyFilter>,
    connector: Arc<dyn Connector>,
    timeout: Duration,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("node", &self.node.identity())
            .field("kind", &self.transport.kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TransportSession {
    /// Resolve and connect the transport for `node` under the default timeout
    pub async fn open(
        node: Node,
        connector: Arc<dyn Connector>,
        filter: Arc<SafetyFilter>,
    ) -> Result<Self> {
        Self::open_with_timeout(node, connector, filter, DEFAULT_CMD_TIMEOUT).await
    }

    /// Resolve and connect the transport for `node`
    ///
    /// `timeout` bounds the connect itself, including any probe the backend
    /// runs, and every later call on the session.
    pub async fn open_with_timeout(
        node: Node,
        connector: Arc<dyn Connector>,
        filter: Arc<SafetyFilter>,
        timeout: Duration,
    ) -> Result<Self> {
        let operation = format!("connect {}", node.identity());
        let transport = bounded(timeout, &operation, connector.connect(&node)).await?;
        tracing::debug!("Opened {} session for {}", transport.kind(), node.identity());
        Ok(Self {
            node,
            transport,
            filter,
            connector,
            timeout,
        })
    }

    /// Set the bound applied to each call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The node this session is bound to
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// The backend actually in use, after any local downgrade
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// The per-call bound
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a command under the session timeout
    pub async fn exec(&self, command: &str) -> Result<String> {
        self.exec_with_timeout(command, self.timeout).await
    }

    /// Run a command under an explicit timeout
    pub async fn exec_with_timeout(&self, command: &str, timeout: Duration) -> Result<String> {
        self.filter.check(command)?;
        tracing::debug!("[{}] exec: {}", self.node.identity(), command);
        bounded(timeout, command, self.transport.exec(command)).await
    }

    /// Run a command as the node's `su_user`, returning output accumulated
    /// after `wait`
    pub async fn exec_as_su(&self, command: &str, wait: Duration) -> Result<String> {
        self.filter.check(command)?;
        let user = self
            .node
            .su_user
            .as_deref()
            .ok_or_else(|| Error::init(self.node.identity(), "node has no su_user"))?;
        let password = self.node.su_password.as_deref().unwrap_or_default();
        tracing::debug!("[{}] exec as {}: {}", self.node.identity(), user, command);
        bounded(
            self.timeout.max(wait + SU_SWITCH_ALLOWANCE),
            command,
            self.transport.exec_as(user, password, command, wait),
        )
        .await
    }

    /// Copy one remote file to a local path
    pub async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        tracing::debug!("[{}] download {} -> {}", self.node.identity(), remote, local.display());
        let operation = format!("download {}", remote);
        bounded(self.timeout, &operation, self.transport.download(remote, local)).await
    }

    /// Copy one local file to a remote path
    pub async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        tracing::debug!("[{}] upload {} -> {}", self.node.identity(), local.display(), remote);
        let operation = format!("upload {}", remote);
        bounded(self.timeout, &operation, self.transport.upload(local, remote)).await
    }

    /// Dispose of the current backend and resolve a fresh one
    pub async fn reconnect(&mut self) -> Result<()> {
        if let Err(e) = self.transport.close().await {
            tracing::debug!("Closing stale transport for {}: {}", self.node.identity(), e);
        }
        let operation = format!("connect {}", self.node.identity());
        self.transport = bounded(
            self.timeout,
            &operation,
            self.connector.connect(&self.node),
        )
        .await?;
        tracing::info!("Reconnected to {}", self.node.identity());
        Ok(())
    }

    /// Release the underlying connection
    pub async fn close(mut self) -> Result<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts connections and always hands out an `Echo` backend
    struct Recorder {
        connects: AtomicUsize,
    }

    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        fn kind(&self) -> TransportKind {
            TransportKind::Local
        }

        async fn exec(&self, command: &str) -> Result<String> {
            if command.starts_with("sleep") {
                async_io::Timer::after(Duration::from_secs(5)).await;
            }
            Ok(format!("ran: {}", command))
        }

        async fn download(&self, _remote: &str, _local: &Path) -> Result<()> {
            Ok(())
        }

        async fn upload(&self, _local: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }

        async fn exec_as(
            &self,
            user: &str,
            _password: &str,
            command: &str,
            wait: Duration,
        ) -> Result<String> {
            // Typing the switch costs a little beyond the caller's wait
            async_io::Timer::after(wait + Duration::from_secs(1)).await;
            Ok(format!("{}: {}", user, command))
        }
    }

    #[async_trait]
    impl Connector for Recorder {
        async fn connect(&self, _node: &Node) -> Result<Box<dyn Transport>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Echo))
        }
    }

    /// Accepts the connect and never answers
    struct Silent;

    #[async_trait]
    impl Connector for Silent {
        async fn connect(&self, _node: &Node) -> Result<Box<dyn Transport>> {
            std::future::pending::<()>().await;
            Ok(Box::new(Echo))
        }
    }

    async fn session(connector: Arc<Recorder>) -> TransportSession {
        TransportSession::open(
            Node::local(),
            connector,
            Arc::new(SafetyFilter::standard().unwrap()),
        )
        .await
        .unwrap()
    }

    fn recorder() -> Arc<Recorder> {
        Arc::new(Recorder {
            connects: AtomicUsize::new(0),
        })
    }

    #[smol_potat::test]
    async fn test_safe_command_reaches_backend() {
        let session = session(recorder()).await;
        assert_eq!(session.exec("ls /tmp").await.unwrap(), "ran: ls /tmp");
    }

    #[smol_potat::test]
    async fn test_unsafe_command_never_dispatched() {
        let session = session(recorder()).await;
        let err = session.exec("reboot").await.unwrap_err();
        assert!(matches!(err, Error::UnsafeCommand { .. }));
        let err = session.exec("kill -9 1234").await.unwrap_err();
        assert!(err.is_rejected());
    }

    #[smol_potat::test]
    async fn test_exec_timeout() {
        let session = session(recorder()).await;
        let err = session
            .exec_with_timeout("sleep 10", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }));
    }

    #[smol_potat::test]
    async fn test_reconnect_resolves_again() {
        let connector = recorder();
        let mut session = session(connector.clone()).await;
        session.reconnect().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        session.close().await.unwrap();
    }

    #[smol_potat::test]
    async fn test_su_requires_user() {
        let session = session(recorder()).await;
        let err = session
            .exec_as_su("cat /root/x", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransportInit { .. }));
    }

    #[smol_potat::test]
    async fn test_connect_is_bounded() {
        let err = TransportSession::open_with_timeout(
            Node::local().with_name("stuck"),
            Arc::new(Silent),
            Arc::new(SafetyFilter::standard().unwrap()),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        match err {
            Error::CommandTimeout { operation, .. } => assert_eq!(operation, "connect stuck"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[smol_potat::test]
    async fn test_open_timeout_applies_to_calls() {
        let session = TransportSession::open_with_timeout(
            Node::local(),
            recorder(),
            Arc::new(SafetyFilter::standard().unwrap()),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(session.timeout(), Duration::from_millis(100));
        let err = session.exec("sleep 10").await.unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }));
    }

    #[smol_potat::test]
    async fn test_su_wait_at_timeout_still_returns_output() {
        let mut node = Node::local();
        node.su_user = Some("admin".to_string());
        let wait = Duration::from_millis(200);
        let session = TransportSession::open(
            node,
            recorder(),
            Arc::new(SafetyFilter::standard().unwrap()),
        )
        .await
        .unwrap()
        .with_timeout(wait);

        let output = session.exec_as_su("cat /root/x", wait).await.unwrap();
        assert_eq!(output, "admin: cat /root/x");
    }
}
