//! Named scopes and file discovery
//!
//! A scope names a family of log files and expands to filename glob
//! patterns. All patterns of a scope are searched with one `find` so
//! discovery costs a single directory scan on the node.

use node_transport::shell;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// The scope that expands to every known scope
pub const ALL_SCOPE: &str = "all";

/// Scope name to filename patterns
#[derive(Debug, Clone)]
pub struct ScopeCatalog {
    scopes: BTreeMap<String, Vec<String>>,
}

impl Default for ScopeCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl ScopeCatalog {
    /// A catalog with no scopes
    pub fn empty() -> Self {
        Self {
            scopes: BTreeMap::new(),
        }
    }

    /// The built-in observer, election and rootservice scopes
    pub fn standard() -> Self {
        Self::empty()
            .with_scope("observer", ["observer.log*"])
            .with_scope("election", ["election.log*"])
            .with_scope("rootservice", ["rootservice.log*"])
    }

    /// Add or replace a scope
    pub fn with_scope<I, S>(mut self, name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(name, patterns);
        self
    }

    /// Add or replace a scope in place
    pub fn insert<I, S>(&mut self, name: impl Into<String>, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes
            .insert(name.into(), patterns.into_iter().map(Into::into).collect());
    }

    /// Whether `scope` can be expanded
    pub fn contains(&self, scope: &str) -> bool {
        scope == ALL_SCOPE || self.scopes.contains_key(scope)
    }

    /// Names of the defined scopes, without `all`
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// Expand a scope into its patterns; `all` is the union of every scope
    pub fn patterns(&self, scope: &str) -> Result<Vec<String>> {
        if let Some(patterns) = self.scopes.get(scope) {
            if patterns.is_empty() {
                return Err(Error::config(format!("scope {} has no patterns", scope)));
            }
            return Ok(patterns.clone());
        }
        if scope == ALL_SCOPE {
            let mut all: Vec<String> = Vec::new();
            for pattern in self.scopes.values().flatten() {
                if !all.contains(pattern) {
                    all.push(pattern.clone());
                }
            }
            if all.is_empty() {
                return Err(Error::config("no scopes defined"));
            }
            return Ok(all);
        }
        Err(Error::config(format!(
            "unknown scope `{}`; known scopes: {}, {}",
            scope,
            self.names().collect::<Vec<_>>().join(", "),
            ALL_SCOPE
        )))
    }
}

/// One `find` invocation listing regular files in `dir` matching any pattern
///
/// A missing directory lists nothing rather than failing.
pub fn find_command(dir: &str, patterns: &[String]) -> String {
    let alternation = patterns
        .iter()
        .map(|p| format!("-name {}", shell::quote(p)))
        .collect::<Vec<_>>()
        .join(" -o ");
    format!(
        "find {}/ -maxdepth 1 -type f \\( {} \\) 2>/dev/null || true",
        shell::quote(dir.trim_end_matches('/')),
        alternation
    )
}

/// File names from `find` output, in listing order
pub fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (_, name) = shell::split_remote_path(line);
            name.to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}
