//! Fleet log gathering
//!
//! For every node, a [`Pipeline`] discovers rotated log files for a named
//! scope, selects them by time window or per-type retention, stages and
//! optionally greps them on the node, packages one gzip bundle, checks its
//! size and downloads it. The remote staging area is always removed. The
//! [`GatherRunner`] fans a run out over many nodes and turns every per-node
//! failure into a [`GatherResult`] instead of an error.

#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod result;
pub mod runner;
pub mod selection;
pub mod timestamp;

pub use catalog::ScopeCatalog;
pub use config::{GatherConfig, Selection};
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use result::GatherResult;
pub use runner::GatherRunner;
pub use timestamp::{LogFile, Stamp};
