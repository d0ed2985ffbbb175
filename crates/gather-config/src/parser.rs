//! Configuration parser with environment variable substitution

use crate::resolver::{Resolver, env_resolver};
use crate::{CONFIG_VERSION, Config, ConfigError, Result};
use log_gather::catalog::ALL_SCOPE;
use node_transport::TransportKind;
use std::collections::HashSet;
use std::path::Path;

/// Parse a YAML configuration file, resolving variables from the environment
pub fn parse_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    tracing::debug!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse YAML configuration from a string, resolving variables from the
/// environment
pub fn parse_str(content: &str) -> Result<Config> {
    parse_with(content, &env_resolver()?)
}

/// Parse YAML configuration from a string with a custom variable lookup
pub fn parse_with<F>(content: &str, resolver: &Resolver<F>) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut document: serde_yaml::Value = serde_yaml::from_str(content)?;
    resolver.resolve_value(&mut document)?;
    let config: Config = serde_yaml::from_value(document)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    // Check version
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::ValidationError(format!(
            "Unsupported version: {}, expected {}",
            config.version, CONFIG_VERSION
        )));
    }

    if config.nodes.is_empty() {
        return Err(ConfigError::ValidationError(
            "No nodes defined".to_string(),
        ));
    }

    for (name, patterns) in &config.scopes {
        if name == ALL_SCOPE {
            return Err(ConfigError::ValidationError(format!(
                "Scope name '{}' is reserved",
                ALL_SCOPE
            )));
        }
        if patterns.is_empty() || patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "Scope '{}' needs at least one non-empty pattern",
                name
            )));
        }
    }

    // Node identities name bundles and results, so they must be unique
    let mut seen = HashSet::new();
    for node in &config.nodes {
        let identity = node.identity();
        if !seen.insert(identity.clone()) {
            return Err(ConfigError::ValidationError(format!(
                "Duplicate node '{}'",
                identity
            )));
        }

        let missing = match node.transport {
            TransportKind::Local => None,
            TransportKind::Ssh if node.address.is_none() => Some("address"),
            TransportKind::Docker if node.container.is_none() => Some("container"),
            TransportKind::Kube if node.pod.is_none() => Some("pod"),
            _ => None,
        };
        if let Some(field) = missing {
            return Err(ConfigError::ValidationError(format!(
                "Node '{}' uses the {} transport but has no {}",
                identity, node.transport, field
            )));
        }

        if node.log_dir().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Node '{}' needs log_dir or home_path",
                identity
            )));
        }
        if node.su_password.is_some() && node.su_user.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Node '{}' sets su_password without su_user",
                identity
            )));
        }
    }

    Ok(())
}
