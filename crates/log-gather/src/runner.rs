//! Running the pipeline across a fleet

use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use node_transport::{Connector, Node, SafetyFilter, TransportSession};
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::ScopeCatalog;
use crate::config::GatherConfig;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::result::{GatherResult, summarize};

/// Gathers one scope from many nodes
///
/// Nodes are processed up to `parallelism` at a time. Each node gets its own
/// session, and nothing is shared between nodes except the store directory,
/// where bundle names carry a random suffix.
pub struct GatherRunner {
    config: GatherConfig,
    catalog: ScopeCatalog,
    connector: Arc<dyn Connector>,
    filter: Arc<SafetyFilter>,
    now: Option<NaiveDateTime>,
}

impl GatherRunner {
    /// Create a runner
    pub fn new(
        config: GatherConfig,
        catalog: ScopeCatalog,
        connector: Arc<dyn Connector>,
        filter: Arc<SafetyFilter>,
    ) -> Self {
        Self {
            config,
            catalog,
            connector,
            filter,
            now: None,
        }
    }

    /// Evaluate relative windows against a fixed moment
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = Some(now);
        self
    }

    /// The run configuration
    pub fn config(&self) -> &GatherConfig {
        &self.config
    }

    /// Gather from every node, returning one result per node in input order
    ///
    /// Only configuration problems are errors; they are reported before any
    /// node is contacted. Node failures, including a run where every node
    /// fails, are ordinary results.
    pub async fn run(&self, nodes: Vec<Node>) -> Result<Vec<GatherResult>> {
        self.config.validate(&self.catalog)?;
        async_fs::create_dir_all(&self.config.store_dir)
            .await
            .map_err(|e| {
                Error::config(format!(
                    "cannot create store directory {}: {}",
                    self.config.store_dir.display(),
                    e
                ))
            })?;
        tracing::info!(
            "Gathering {} logs from {} nodes ({} at a time)",
            self.config.scope,
            nodes.len(),
            self.config.parallelism
        );

        let results: Vec<GatherResult> = stream::iter(nodes)
            .map(|node| self.gather_one(node))
            .buffered(self.config.parallelism)
            .collect()
            .await;

        let (ok, failed) = summarize(&results);
        tracing::info!("Gather finished: {} succeeded, {} failed", ok, failed);
        Ok(results)
    }

    async fn gather_one(&self, node: Node) -> GatherResult {
        let started = Instant::now();
        let identity = node.identity();

        let session = match TransportSession::open_with_timeout(
            node,
            self.connector.clone(),
            self.filter.clone(),
            self.config.cmd_exec_timeout,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("[{}] cannot connect: {}", identity, e);
                return GatherResult::failure(identity, e.to_string())
                    .with_elapsed(started.elapsed());
            }
        };

        let mut pipeline = Pipeline::new(&self.config, &self.catalog);
        if let Some(now) = self.now {
            pipeline = pipeline.with_now(now);
        }
        let result = pipeline.run(&session).await;

        if let Err(e) = session.close().await {
            tracing::debug!("[{}] closing session: {}", identity, e);
        }
        result.with_elapsed(started.elapsed())
    }
}
