//! The per-node collection pipeline
//!
//! Stages run strictly in order: stage a scratch root, discover, validate,
//! copy or grep into the staging directory, package, check the size,
//! download. The scratch root is removed afterwards whatever happened, and
//! any stage error becomes a failed [`GatherResult`].

use chrono::NaiveDateTime;
use node_transport::{TransportSession, shell};
use std::path::PathBuf;
use std::time::Instant;

use crate::catalog::{ScopeCatalog, find_command, parse_listing};
use crate::config::{DEFAULT_TEMP_DIR, GatherConfig, Selection};
use crate::error::{Error, Result};
use crate::result::GatherResult;
use crate::selection::select;
use crate::timestamp::LogFile;

/// Remote and local names for one run on one node
#[derive(Debug, Clone)]
struct RunPaths {
    /// Scratch root removed at the end of the run
    root: String,
    /// Directory inside the root that gets packaged
    stage: String,
    /// Name of the staging directory, which is also the bundle stem
    stem: String,
    /// Remote bundle path
    bundle: String,
    /// Local destination of the bundle
    local: PathBuf,
}

/// What the stages produced on success
#[derive(Debug)]
struct Collected {
    file_count: usize,
    size: u64,
    local: PathBuf,
}

/// Collects one scope's logs from one node per call to [`Pipeline::run`]
#[derive(Debug, Clone)]
pub struct Pipeline<'a> {
    config: &'a GatherConfig,
    catalog: &'a ScopeCatalog,
    now: Option<NaiveDateTime>,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline for a validated configuration
    pub fn new(config: &'a GatherConfig, catalog: &'a ScopeCatalog) -> Self {
        Self {
            config,
            catalog,
            now: None,
        }
    }

    /// Evaluate relative windows against a fixed moment instead of the clock
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    fn now(&self) -> NaiveDateTime {
        self.now
            .unwrap_or_else(|| chrono::Local::now().naive_local())
    }

    /// Gather from the node behind `session`; never fails
    pub async fn run(&self, session: &TransportSession) -> GatherResult {
        let started = Instant::now();
        let node = session.node().identity();
        let now = self.now();
        let paths = self.paths(session, &node, now);

        tracing::info!("[{}] gathering {} logs", node, self.config.scope);
        let outcome = self.stages(session, &paths, now).await;
        self.cleanup(session, &node, &paths).await;

        let result = match outcome {
            Ok(collected) => {
                tracing::info!(
                    "[{}] downloaded {} ({} files, {} bytes)",
                    node,
                    collected.local.display(),
                    collected.file_count,
                    collected.size
                );
                GatherResult::success(&node, collected.local, collected.size, collected.file_count)
            }
            Err(e) => {
                tracing::warn!("[{}] gather failed: {}", node, e);
                GatherResult::failure(&node, e.to_string())
            }
        };
        result.with_elapsed(started.elapsed())
    }

    fn paths(&self, session: &TransportSession, node: &str, now: NaiveDateTime) -> RunPaths {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let suffix = &suffix[..8];

        let temp_dir = self
            .config
            .temp_dir
            .clone()
            .or_else(|| session.node().temp_dir.clone())
            .unwrap_or_else(|| DEFAULT_TEMP_DIR.to_string());
        let root = shell::join_remote(&temp_dir, &format!("log_gather_{}", suffix));

        let span = match &self.config.selection {
            Selection::Recent(count) => format!("recent{}", count),
            selection => match selection.window(now) {
                Some((from, to)) => format!(
                    "{}_{}",
                    from.format("%Y%m%d%H%M%S"),
                    to.format("%Y%m%d%H%M%S")
                ),
                None => "all".to_string(),
            },
        };
        let stem = format!(
            "{}_log_{}_{}_{}",
            self.config.scope,
            sanitize(node),
            span,
            suffix
        );

        RunPaths {
            stage: shell::join_remote(&root, &stem),
            bundle: shell::join_remote(&root, &format!("{}.tar.gz", stem)),
            local: self.config.store_dir.join(format!("{}.tar.gz", stem)),
            stem,
            root,
        }
    }

    async fn stages(
        &self,
        session: &TransportSession,
        paths: &RunPaths,
        now: NaiveDateTime,
    ) -> Result<Collected> {
        let node = session.node().identity();

        // STAGE
        tracing::debug!("[{}] staging in {}", node, paths.root);
        session
            .exec(&format!("mkdir -p {}", shell::quote(&paths.stage)))
            .await?;

        // DISCOVER
        let log_dir = session.node().log_dir().ok_or_else(|| {
            Error::config(format!("node {} has neither log_dir nor home_path", node))
        })?;
        let patterns = self.catalog.patterns(&self.config.scope)?;
        let listing = session.exec(&find_command(&log_dir, &patterns)).await?;
        let discovered: Vec<LogFile> = parse_listing(&listing)
            .into_iter()
            .map(LogFile::parse)
            .collect();
        tracing::debug!("[{}] discovered {} files", node, discovered.len());
        let files = select(discovered, &self.config.selection, now);

        // VALIDATE
        if files.is_empty() {
            return Err(Error::DiscoveryEmpty {
                scope: self.config.scope.clone(),
                dir: log_dir,
            });
        }
        if files.len() > self.config.file_number_limit {
            return Err(Error::TooManyFiles {
                count: files.len(),
                limit: self.config.file_number_limit,
            });
        }
        tracing::info!("[{}] selected {} files", node, files.len());

        // TRANSFORM
        for file in &files {
            let source = shell::join_remote(&log_dir, file.name());
            let target = shell::join_remote(&paths.stage, file.name());
            session.exec(&self.transform_command(file, &source, &target)).await?;
        }

        // PACKAGE
        session
            .exec(&format!(
                "tar -czf {} -C {} {}",
                shell::quote(&paths.bundle),
                shell::quote(&paths.root),
                shell::quote(&paths.stem)
            ))
            .await?;

        // SIZE-CHECK
        let stat = format!("stat -c %s {}", shell::quote(&paths.bundle));
        let output = session.exec(&stat).await?;
        let size: u64 = output.trim().parse().map_err(|_| Error::UnexpectedOutput {
            command: stat.clone(),
            output: output.trim().to_string(),
        })?;
        if size == 0 {
            return Err(Error::EmptyBundle {
                path: paths.bundle.clone(),
            });
        }
        if size > self.config.file_size_limit {
            return Err(Error::BundleTooLarge {
                path: paths.bundle.clone(),
                size,
                limit: self.config.file_size_limit,
            });
        }

        // DOWNLOAD
        session.download(&paths.bundle, &paths.local).await?;

        Ok(Collected {
            file_count: files.len(),
            size,
            local: paths.local.clone(),
        })
    }

    fn transform_command(&self, file: &LogFile, source: &str, target: &str) -> String {
        let source = shell::quote(source);
        let target = shell::quote(target);
        if file.is_compressed() || self.config.grep.is_empty() {
            return format!("cp {} {}", source, target);
        }
        let chain = self
            .config
            .grep
            .iter()
            .enumerate()
            .map(|(index, term)| match index {
                0 => format!("grep -e {} {}", shell::quote(term), source),
                _ => format!("grep -e {}", shell::quote(term)),
            })
            .collect::<Vec<_>>()
            .join(" | ");
        // grep exits 1 when nothing matches and 2 on errors; only 1 is tolerated
        format!(
            "if [ ! -r {src} ]; then echo {src}: cannot read >&2; exit 2; fi; \
             (set -o pipefail) 2>/dev/null && set -o pipefail; \
             {chain} > {dst}; [ $? -le 1 ]",
            src = source,
            chain = chain,
            dst = target
        )
    }

    async fn cleanup(&self, session: &TransportSession, node: &str, paths: &RunPaths) {
        if let Err(e) = session
            .exec(&format!("rm -rf {}", shell::quote(&paths.root)))
            .await
        {
            tracing::warn!("[{}] failed to remove {}: {}", node, paths.root, e);
        }
    }
}

/// Make a node identity safe for use in a file name
fn sanitize(identity: &str) -> String {
    identity
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("10.0.0.5"), "10.0.0.5");
        assert_eq!(sanitize("ob/obcluster-0"), "ob_obcluster-0");
        assert_eq!(sanitize("[::1]:2881"), "___1__2881");
    }

    #[test]
    fn test_transform_commands() {
        let catalog = ScopeCatalog::standard();
        let plain = GatherConfig::new("observer", "/store");
        let pipeline = Pipeline::new(&plain, &catalog);
        let file = LogFile::parse("observer.log");
        assert_eq!(
            pipeline.transform_command(&file, "/log/observer.log", "/tmp/s/observer.log"),
            "cp /log/observer.log /tmp/s/observer.log"
        );

        let grep = GatherConfig::new("observer", "/store")
            .with_grep("trace_id")
            .with_grep("ERROR");
        let pipeline = Pipeline::new(&grep, &catalog);
        assert_eq!(
            pipeline.transform_command(&file, "/log/observer.log", "/tmp/s/observer.log"),
            "if [ ! -r /log/observer.log ]; then echo /log/observer.log: cannot read >&2; exit 2; fi; \
             (set -o pipefail) 2>/dev/null && set -o pipefail; \
             grep -e trace_id /log/observer.log | grep -e ERROR > /tmp/s/observer.log; [ $? -le 1 ]"
        );

        let compressed = LogFile::parse("observer.log.20240101000000000.gz");
        assert!(
            pipeline
                .transform_command(&compressed, "/log/a.gz", "/tmp/s/a.gz")
                .starts_with("cp ")
        );
    }
}
