//! Transport selection for a node
//!
//! The router picks the backend from the node's transport selector. An SSH
//! node whose address belongs to this machine is downgraded to the local
//! backend, so gathering from the operator's own host never needs sshd.

use async_trait::async_trait;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};

use crate::backends::{DockerTransport, LocalTransport, SshTransport};
use crate::error::Result;
use crate::node::{Node, TransportKind};
use crate::transport::{Connector, Transport};

/// Addresses and names that identify this machine
#[derive(Debug, Clone, Default)]
pub struct LocalAddresses {
    ips: HashSet<IpAddr>,
    names: HashSet<String>,
}

impl LocalAddresses {
    /// Collect interface addresses and the hostname of this machine
    pub fn discover() -> Self {
        let mut ips = HashSet::new();
        match nix::ifaddrs::getifaddrs() {
            Ok(interfaces) => {
                for interface in interfaces {
                    let Some(address) = interface.address else {
                        continue;
                    };
                    if let Some(sin) = address.as_sockaddr_in() {
                        ips.insert(IpAddr::V4(*SocketAddrV4::from(*sin).ip()));
                    } else if let Some(sin6) = address.as_sockaddr_in6() {
                        ips.insert(IpAddr::V6(*SocketAddrV6::from(*sin6).ip()));
                    }
                }
            }
            Err(e) => tracing::warn!("Cannot list interface addresses: {}", e),
        }

        let mut names = Vec::new();
        match nix::unistd::gethostname() {
            Ok(hostname) => names.push(hostname.to_string_lossy().into_owned()),
            Err(e) => tracing::warn!("Cannot read hostname: {}", e),
        }

        Self::from_parts(ips, names)
    }

    /// Build from explicit parts; loopback and `localhost` are always included
    pub fn from_parts<I, N>(ips: I, names: N) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
        N: IntoIterator<Item = String>,
    {
        let mut ips: HashSet<IpAddr> = ips.into_iter().collect();
        ips.insert(IpAddr::from([127, 0, 0, 1]));
        ips.insert(IpAddr::from([0u16, 0, 0, 0, 0, 0, 0, 1]));

        let mut set = HashSet::new();
        set.insert("localhost".to_string());
        for name in names {
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }
            // Also match the short form of a fully qualified hostname
            if let Some((short, _)) = name.split_once('.') {
                set.insert(short.to_string());
            }
            set.insert(name);
        }

        Self { ips, names: set }
    }

    /// Whether an IP belongs to this machine
    pub fn contains_ip(&self, ip: &IpAddr) -> bool {
        ip.is_loopback() || self.ips.contains(ip)
    }
}

/// Whether `address` names this machine, without any network lookup
pub fn is_local_address(address: &str, locals: &LocalAddresses) -> bool {
    let address = address
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    if address.is_empty() {
        return false;
    }
    match address.parse::<IpAddr>() {
        Ok(ip) => locals.contains_ip(&ip),
        Err(_) => locals.names.contains(&address.to_ascii_lowercase()),
    }
}

/// Resolves nodes to connected transports
#[derive(Debug, Clone)]
pub struct TransportRouter {
    locals: LocalAddresses,
}

impl Default for TransportRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportRouter {
    /// Create a router that knows this machine's addresses
    pub fn new() -> Self {
        Self {
            locals: LocalAddresses::discover(),
        }
    }

    /// Create a router with a fixed notion of "this machine"
    pub fn with_local_addresses(locals: LocalAddresses) -> Self {
        Self { locals }
    }

    /// The transport kind that will actually be used for `node`
    pub async fn resolve_kind(&self, node: &Node) -> TransportKind {
        if !node.transport.is_remote_host() {
            return node.transport;
        }
        let Some(address) = node.address.as_deref() else {
            return node.transport;
        };
        if self.is_local(address).await {
            tracing::debug!("{} is this machine, using the local transport", address);
            TransportKind::Local
        } else {
            node.transport
        }
    }

    async fn is_local(&self, address: &str) -> bool {
        if is_local_address(address, &self.locals) {
            return true;
        }
        if address.parse::<IpAddr>().is_ok() {
            return false;
        }
        match async_net::resolve((address, 0)).await {
            Ok(resolved) => resolved
                .iter()
                .any(|addr| self.locals.contains_ip(&addr.ip())),
            Err(e) => {
                tracing::debug!("Cannot resolve {}: {}", address, e);
                false
            }
        }
    }
}

#[async_trait]
impl Connector for TransportRouter {
    async fn connect(&self, node: &Node) -> Result<Box<dyn Transport>> {
        let kind = self.resolve_kind(node).await;
        tracing::debug!("Connecting to {} via {}", node.identity(), kind);

        let transport: Box<dyn Transport> = match kind {
            TransportKind::Local => Box::new(LocalTransport::new()),
            TransportKind::Ssh => Box::new(SshTransport::connect(node).await?),
            TransportKind::Docker => Box::new(DockerTransport::connect(node).await?),
            #[cfg(feature = "kube")]
            TransportKind::Kube => Box::new(crate::backends::KubeTransport::connect(node).await?),
            #[cfg(not(feature = "kube"))]
            TransportKind::Kube => {
                return Err(crate::error::Error::init(
                    node.identity(),
                    "built without Kubernetes support",
                ));
            }
        };
        Ok(transport)
    }
}
