//! Cluster access parameters from a kubeconfig file

use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(rename = "current-context", default)]
    current_context: Option<String>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: Cluster,
}

#[derive(Debug, Deserialize)]
struct Cluster {
    server: String,
    #[serde(rename = "certificate-authority-data", default)]
    ca_data: Option<String>,
    #[serde(rename = "certificate-authority", default)]
    ca_file: Option<PathBuf>,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure: bool,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: Context,
}

#[derive(Debug, Deserialize)]
struct Context {
    cluster: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: AuthInfo,
}

#[derive(Debug, Default, Deserialize)]
struct AuthInfo {
    #[serde(default)]
    token: Option<String>,
    #[serde(rename = "tokenFile", default)]
    token_file: Option<PathBuf>,
    #[serde(rename = "client-certificate-data", default)]
    client_cert_data: Option<String>,
    #[serde(rename = "client-certificate", default)]
    client_cert_file: Option<PathBuf>,
    #[serde(rename = "client-key-data", default)]
    client_key_data: Option<String>,
    #[serde(rename = "client-key", default)]
    client_key_file: Option<PathBuf>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Credentials presented to the API server
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No request header; client certificate or anonymous
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `Authorization: Basic <user:password>`
    Basic {
        /// Login name
        username: String,
        /// Password
        password: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Bearer(_) => f.write_str("Bearer(..)"),
            Credentials::Basic { username, .. } => write!(f, "Basic({}, ..)", username),
        }
    }
}

impl Credentials {
    /// Value of the `Authorization` header, if any
    pub fn header(&self) -> Option<String> {
        match self {
            Credentials::None => None,
            Credentials::Bearer(token) => Some(format!("Bearer {}", token)),
            Credentials::Basic { username, password } => {
                let raw = format!("{}:{}", username, password);
                Some(format!(
                    "Basic {}",
                    base64::engine::general_purpose::STANDARD.encode(raw)
                ))
            }
        }
    }
}

/// Everything needed to reach one cluster's API server
#[derive(Debug, Clone)]
pub struct ClusterAccess {
    /// API server URL, e.g. `https://10.0.0.1:6443`
    pub server: String,
    /// PEM bundle of trusted CAs; the public roots are used when absent
    pub ca_pem: Option<Vec<u8>>,
    /// Skip server certificate verification
    pub insecure: bool,
    /// Request credentials
    pub credentials: Credentials,
    /// PEM client certificate chain
    pub client_cert_pem: Option<Vec<u8>>,
    /// PEM client private key
    pub client_key_pem: Option<Vec<u8>>,
    /// Namespace of the current context
    pub namespace: Option<String>,
}

impl ClusterAccess {
    /// Load the current context from `path`, `$KUBECONFIG` or `~/.kube/config`
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_path()?,
        };
        let text = async_fs::read_to_string(&path).await.map_err(|e| {
            Error::init("kubeconfig", format!("cannot read {}: {}", path.display(), e))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&text, base).await
    }

    /// Parse kubeconfig text; relative file references resolve against `base`
    pub async fn from_yaml(text: &str, base: &Path) -> Result<Self> {
        let config: Kubeconfig = serde_yaml::from_str(text)
            .map_err(|e| Error::init("kubeconfig", format!("invalid kubeconfig: {}", e)))?;

        let context_name = config
            .current_context
            .clone()
            .or_else(|| config.contexts.first().map(|c| c.name.clone()))
            .ok_or_else(|| Error::init("kubeconfig", "no context defined"))?;
        let context = config
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| {
                Error::init("kubeconfig", format!("context {} not found", context_name))
            })?;
        let cluster = config
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                Error::init("kubeconfig", format!("cluster {} not found", context.cluster))
            })?;
        let empty = AuthInfo::default();
        let user = context
            .user
            .as_ref()
            .and_then(|name| config.users.iter().find(|u| &u.name == name))
            .map(|u| &u.user)
            .unwrap_or(&empty);

        let ca_pem = pem_source(cluster.ca_data.as_deref(), cluster.ca_file.as_deref(), base).await?;
        let client_cert_pem =
            pem_source(user.client_cert_data.as_deref(), user.client_cert_file.as_deref(), base)
                .await?;
        let client_key_pem =
            pem_source(user.client_key_data.as_deref(), user.client_key_file.as_deref(), base)
                .await?;

        let token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(file)) => Some(
                async_fs::read_to_string(resolve(base, file))
                    .await
                    .map_err(|e| Error::init("kubeconfig", format!("cannot read token file: {}", e)))?
                    .trim()
                    .to_string(),
            ),
            (None, None) => None,
        };
        let credentials = match (token, &user.username, &user.password) {
            (Some(token), _, _) => Credentials::Bearer(token),
            (None, Some(username), Some(password)) => Credentials::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Credentials::None,
        };

        Ok(Self {
            server: cluster.server.trim_end_matches('/').to_string(),
            ca_pem,
            insecure: cluster.insecure,
            credentials,
            client_cert_pem,
            client_key_pem,
            namespace: context.namespace.clone(),
        })
    }

    /// Whether the API server is reached over TLS
    pub fn uses_tls(&self) -> bool {
        self.server.starts_with("https://")
    }
}

fn default_path() -> Result<PathBuf> {
    if let Some(value) = std::env::var_os("KUBECONFIG") {
        if let Some(first) = std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty()) {
            return Ok(first);
        }
    }
    dirs::home_dir()
        .map(|home| home.join(".kube").join("config"))
        .ok_or_else(|| Error::init("kubeconfig", "cannot determine home directory"))
}

fn resolve(base: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base.join(file)
    }
}

/// Inline base64 data wins over a file reference
async fn pem_source(data: Option<&str>, file: Option<&Path>, base: &Path) -> Result<Option<Vec<u8>>> {
    if let Some(data) = data {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| Error::init("kubeconfig", format!("invalid base64 data: {}", e)))?;
        return Ok(Some(decoded));
    }
    match file {
        Some(file) => {
            let path = resolve(base, file);
            let bytes = async_fs::read(&path).await.map_err(|e| {
                Error::init("kubeconfig", format!("cannot read {}: {}", path.display(), e))
            })?;
            Ok(Some(bytes))
        }
        None => Ok(None),
    }
}
