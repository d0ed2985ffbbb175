//! Node descriptors

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which remote-execution mechanism reaches a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child processes on this machine
    Local,
    /// An SSH session
    Ssh,
    /// `docker exec` into a named container
    Docker,
    /// Kubernetes pod exec
    Kube,
}

impl TransportKind {
    /// Whether reaching a node of this kind crosses a network hop to its address
    pub fn is_remote_host(&self) -> bool {
        matches!(self, TransportKind::Ssh)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Local => "local",
            TransportKind::Ssh => "ssh",
            TransportKind::Docker => "docker",
            TransportKind::Kube => "kube",
        };
        f.write_str(name)
    }
}

/// One managed host, container or pod to collect from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Identity used in results and bundle names; defaults to the address
    #[serde(default)]
    pub name: Option<String>,

    /// Transport selector
    pub transport: TransportKind,

    /// Host address (IP or hostname)
    #[serde(default)]
    pub address: Option<String>,

    /// Login user
    #[serde(default)]
    pub user: Option<String>,

    /// Login password, used when key authentication is rejected
    #[serde(default)]
    pub password: Option<String>,

    /// Private key file for key authentication
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// SSH port
    #[serde(default)]
    pub port: Option<u16>,

    /// User to switch to with `su` for privileged reads
    #[serde(default)]
    pub su_user: Option<String>,

    /// Password for the `su` switch
    #[serde(default)]
    pub su_password: Option<String>,

    /// Container name (docker) or container inside the pod (kube)
    #[serde(default)]
    pub container: Option<String>,

    /// Pod namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// Pod name
    #[serde(default)]
    pub pod: Option<String>,

    /// Kubeconfig path; defaults to `$KUBECONFIG` then `~/.kube/config`
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Install root of the diagnosed process
    #[serde(default)]
    pub home_path: Option<String>,

    /// Log directory; defaults to `<home_path>/log`
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Scratch directory on the node
    #[serde(default)]
    pub temp_dir: Option<String>,

    /// Extra arguments passed to every `ssh`/`sftp` invocation, e.g. `-o ProxyJump=bastion`
    #[serde(default)]
    pub ssh_options: Vec<String>,

    /// Docker-compatible CLI used for docker nodes; defaults to `docker`
    #[serde(default)]
    pub docker_binary: Option<String>,
}

impl Node {
    /// A node with only the transport selector set
    pub fn new(transport: TransportKind) -> Self {
        Self {
            name: None,
            transport,
            address: None,
            user: None,
            password: None,
            key_file: None,
            port: None,
            su_user: None,
            su_password: None,
            container: None,
            namespace: None,
            pod: None,
            kubeconfig: None,
            home_path: None,
            log_dir: None,
            temp_dir: None,
            ssh_options: Vec::new(),
            docker_binary: None,
        }
    }

    /// A node on this machine
    pub fn local() -> Self {
        Self::new(TransportKind::Local).with_address("127.0.0.1")
    }

    /// A node reached over SSH
    pub fn ssh(address: impl Into<String>) -> Self {
        Self::new(TransportKind::Ssh).with_address(address)
    }

    /// A named Docker container
    pub fn docker(container: impl Into<String>) -> Self {
        let mut node = Self::new(TransportKind::Docker);
        node.container = Some(container.into());
        node
    }

    /// A Kubernetes pod
    pub fn kube(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        let mut node = Self::new(TransportKind::Kube);
        node.namespace = Some(namespace.into());
        node.pod = Some(pod.into());
        node
    }

    /// Set the identity
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the host address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the login user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the container name
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Set the install root
    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = Some(path.into());
        self
    }

    /// Set the log directory explicitly
    pub fn with_log_dir(mut self, dir: impl Into<String>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Set the scratch directory
    pub fn with_temp_dir(mut self, dir: impl Into<String>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Identity shown in results
    pub fn identity(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match self.transport {
            TransportKind::Docker => self
                .container
                .clone()
                .unwrap_or_else(|| "docker".to_string()),
            TransportKind::Kube => match (&self.namespace, &self.pod) {
                (Some(ns), Some(pod)) => format!("{}/{}", ns, pod),
                (_, Some(pod)) => pod.clone(),
                _ => "pod".to_string(),
            },
            _ => self
                .address
                .clone()
                .unwrap_or_else(|| "localhost".to_string()),
        }
    }

    /// Directory holding the diagnosed process's logs
    pub fn log_dir(&self) -> Option<String> {
        self.log_dir.clone().or_else(|| {
            self.home_path
                .as_ref()
                .map(|home| format!("{}/log", home.trim_end_matches('/')))
        })
    }
}
