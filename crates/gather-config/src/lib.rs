//! # Gather Configuration
//!
//! YAML inventory parser for fleet log gathering.
//!
//! A configuration file lists the nodes to collect from, optional extra log
//! scopes and default run settings. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`.

#![warn(missing_docs)]

use log_gather::config::{DEFAULT_FILE_NUMBER_LIMIT, DEFAULT_FILE_SIZE_LIMIT};
use log_gather::{GatherConfig, ScopeCatalog, Selection};
use node_transport::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod parser;
pub mod resolver;

/// Supported configuration version
pub const CONFIG_VERSION: &str = "1.0";

/// Where bundles land when neither the file nor the command line says
pub const DEFAULT_STORE_DIR: &str = "gather_pack";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Environment variable not found
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    /// Node reference not found
    #[error("Node '{0}' not found")]
    NodeNotFound(String),

    /// The gather settings were rejected
    #[error(transparent)]
    Gather(#[from] log_gather::Error),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Optional fleet name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Default run settings
    #[serde(default, skip_serializing_if = "Settings::is_default")]
    pub settings: Settings,

    /// Extra scopes, or replacements for built-in ones
    #[serde(default)]
    pub scopes: BTreeMap<String, Vec<String>>,

    /// Nodes to collect from
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// Default run settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// Scope collected when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Local bundle directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,

    /// Remote scratch directory for every node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,

    /// Default relative window, `<n><m|h|d>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,

    /// Default per-type retention count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent: Option<usize>,

    /// Default grep terms
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grep: Vec<String>,

    /// Maximum files per node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_number_limit: Option<usize>,

    /// Maximum bundle size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_limit: Option<u64>,

    /// Per-call timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd_exec_timeout: Option<u64>,

    /// Nodes processed at once
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
}

impl Settings {
    /// Check if settings are default (all None)
    fn is_default(&self) -> bool {
        self == &Settings::default()
    }
}

impl Config {
    /// Built-in scopes plus the ones defined in this file
    pub fn catalog(&self) -> ScopeCatalog {
        let mut catalog = ScopeCatalog::standard();
        for (name, patterns) in &self.scopes {
            catalog.insert(name.clone(), patterns.iter().cloned());
        }
        catalog
    }

    /// The run configuration described by `settings`
    ///
    /// The result is checked against [`Config::catalog`], so a bad scope or
    /// limit is reported here rather than when the first node is reached.
    pub fn gather_config(&self) -> Result<GatherConfig> {
        let settings = &self.settings;
        let scope = settings
            .scope
            .clone()
            .unwrap_or_else(|| log_gather::catalog::ALL_SCOPE.to_string());
        let store_dir = settings
            .store_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_DIR));

        let selection =
            Selection::from_options(None, None, settings.since.as_deref(), settings.recent)?;
        let mut config = GatherConfig::new(scope, store_dir)
            .with_selection(selection)
            .with_file_number_limit(settings.file_number_limit.unwrap_or(DEFAULT_FILE_NUMBER_LIMIT))
            .with_file_size_limit(settings.file_size_limit.unwrap_or(DEFAULT_FILE_SIZE_LIMIT))
            .with_parallelism(settings.parallelism.unwrap_or(1));
        if let Some(seconds) = settings.cmd_exec_timeout {
            config = config.with_timeout(Duration::from_secs(seconds));
        }
        if let Some(dir) = &settings.temp_dir {
            config = config.with_temp_dir(dir.clone());
        }
        for term in &settings.grep {
            config = config.with_grep(term.clone());
        }

        config.validate(&self.catalog())?;
        Ok(config)
    }

    /// All nodes, or only those whose identity is listed in `names`
    pub fn select_nodes(&self, names: &[String]) -> Result<Vec<Node>> {
        if names.is_empty() {
            return Ok(self.nodes.clone());
        }
        names
            .iter()
            .map(|name| {
                self.nodes
                    .iter()
                    .find(|node| &node.identity() == name)
                    .cloned()
                    .ok_or_else(|| ConfigError::NodeNotFound(name.clone()))
            })
            .collect()
    }
}
