use anyhow::{Context, Result};
use gather_config::parser;
use node_transport::TransportKind;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating {}...", config_path.display());

    // Structural validation is done during parsing
    let config = parser::parse_file(config_path).context("Failed to parse configuration")?;
    let gather = config
        .gather_config()
        .context("Invalid gather settings")?;

    println!("✓ Configuration valid");
    println!("  Version: {}", config.version);
    if let Some(name) = &config.name {
        println!("  Name: {}", name);
    }

    let count = |kind: TransportKind| config.nodes.iter().filter(|n| n.transport == kind).count();
    println!(
        "  Nodes: {} (local {}, ssh {}, docker {}, kube {})",
        config.nodes.len(),
        count(TransportKind::Local),
        count(TransportKind::Ssh),
        count(TransportKind::Docker),
        count(TransportKind::Kube)
    );

    let catalog = config.catalog();
    println!("  Scopes: {}", catalog.names().collect::<Vec<_>>().join(", "));
    println!("  Default scope: {}", gather.scope);
    println!("  Store directory: {}", gather.store_dir.display());

    for node in &config.nodes {
        if node.transport == TransportKind::Ssh && node.key_file.is_none() && node.password.is_none()
        {
            println!(
                "  ⚠ Node '{}' has neither key_file nor password; relying on the SSH agent",
                node.identity()
            );
        }
    }

    Ok(())
}
