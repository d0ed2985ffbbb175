use crate::{Format, LogArgs};
use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table};
use gather_config::parser;
use log_gather::result::summarize;
use log_gather::{GatherConfig, GatherResult, GatherRunner, Selection};
use node_transport::{SafetyFilter, TransportRouter};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(config_path: &Path, args: LogArgs) -> Result<()> {
    let config = parser::parse_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let gather = apply_overrides(config.gather_config()?, &args)?;
    let nodes = config.select_nodes(&args.nodes)?;

    let runner = GatherRunner::new(
        gather,
        config.catalog(),
        Arc::new(TransportRouter::new()),
        Arc::new(SafetyFilter::standard()?),
    );
    let results = runner.run(nodes).await.context("Gather refused to start")?;

    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        Format::Table => {
            println!("{}", results_table(&results));
            let (ok, failed) = summarize(&results);
            println!(
                "{} of {} nodes succeeded, {} failed; bundles in {}",
                ok,
                results.len(),
                failed,
                runner.config().store_dir.display()
            );
        }
    }
    Ok(())
}

/// Command-line flags win over file settings
pub fn apply_overrides(mut config: GatherConfig, args: &LogArgs) -> Result<GatherConfig> {
    if let Some(scope) = &args.scope {
        config.scope = scope.clone();
    }
    if args.from.is_some() || args.to.is_some() || args.since.is_some() || args.recent.is_some() {
        config.selection = Selection::from_options(
            args.from.as_deref(),
            args.to.as_deref(),
            args.since.as_deref(),
            args.recent,
        )?;
    }
    if !args.grep.is_empty() {
        config.grep = args.grep.clone();
    }
    if let Some(dir) = &args.store_dir {
        config.store_dir = dir.clone();
    }
    if let Some(dir) = &args.temp_dir {
        config.temp_dir = Some(dir.clone());
    }
    if let Some(limit) = args.file_number_limit {
        config.file_number_limit = limit;
    }
    if let Some(limit) = args.file_size_limit {
        config.file_size_limit = limit;
    }
    if let Some(seconds) = args.timeout {
        config.cmd_exec_timeout = Duration::from_secs(seconds);
    }
    if let Some(parallel) = args.parallel {
        config.parallelism = parallel;
    }
    Ok(config)
}

fn results_table(results: &[GatherResult]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["NODE", "STATUS", "FILES", "SIZE", "TIME", "BUNDLE / INFO"]);

    for result in results {
        let (status, color, detail) = if result.success {
            let bundle = result
                .bundle_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            ("ok", Color::Green, bundle)
        } else {
            ("failed", Color::Red, result.info.clone())
        };

        table.add_row(vec![
            Cell::new(&result.node),
            Cell::new(status).fg(color),
            Cell::new(result.file_count),
            Cell::new(result.file_size.map(format_size).unwrap_or_else(|| "-".to_string())),
            Cell::new(format!("{:.1}s", result.elapsed_ms as f64 / 1000.0)),
            Cell::new(detail),
        ]);
    }
    table
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
