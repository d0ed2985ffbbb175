//! Per-node outcome of a gather run

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// What happened on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherResult {
    /// Node identity
    pub node: String,
    /// Whether a bundle was downloaded
    pub success: bool,
    /// Human readable outcome or failure reason
    pub info: String,
    /// Size of the bundle in bytes, once known
    pub file_size: Option<u64>,
    /// Local path of the downloaded bundle
    pub bundle_path: Option<PathBuf>,
    /// Number of log files packaged
    pub file_count: usize,
    /// Wall time spent on the node
    pub elapsed_ms: u64,
}

impl GatherResult {
    /// A successful gather
    pub fn success(
        node: impl Into<String>,
        bundle_path: PathBuf,
        file_size: u64,
        file_count: usize,
    ) -> Self {
        Self {
            node: node.into(),
            success: true,
            info: "ok".to_string(),
            file_size: Some(file_size),
            bundle_path: Some(bundle_path),
            file_count,
            elapsed_ms: 0,
        }
    }

    /// A failed gather
    pub fn failure(node: impl Into<String>, info: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            success: false,
            info: info.into(),
            file_size: None,
            bundle_path: None,
            file_count: 0,
            elapsed_ms: 0,
        }
    }

    /// Record the wall time
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis().min(u64::MAX as u128) as u64;
        self
    }
}

/// Counts of successes and failures in a run
pub fn summarize(results: &[GatherResult]) -> (usize, usize) {
    let ok = results.iter().filter(|r| r.success).count();
    (ok, results.len() - ok)
}
