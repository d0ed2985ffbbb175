//! Environment variable resolver
//!
//! Resolves `${VAR}` and `${VAR:-default}` in every string of a parsed YAML
//! document. Values come from a lookup function so callers and tests can
//! supply their own environment.

use crate::{ConfigError, Result};
use regex::Regex;
use serde_yaml::Value;

const VAR_PATTERN: &str = r"\$\{([^}]+)\}";

/// Substitutes variables using a lookup function
pub struct Resolver<F> {
    pattern: Regex,
    lookup: F,
}

impl<F> Resolver<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Create a resolver backed by `lookup`
    pub fn new(lookup: F) -> Result<Self> {
        let pattern = Regex::new(VAR_PATTERN)
            .map_err(|e| ConfigError::ValidationError(format!("variable pattern: {}", e)))?;
        Ok(Self { pattern, lookup })
    }

    /// Resolve all variables in a string
    pub fn resolve_string(&self, input: &str) -> Result<String> {
        let mut missing = Vec::new();
        let resolved = self.substitute(input, &mut missing);
        if missing.is_empty() {
            Ok(resolved)
        } else {
            Err(ConfigError::EnvVarNotFound(missing.join(", ")))
        }
    }

    /// Resolve all variables in every string of `value`, in place
    ///
    /// Only string values are touched; every missing variable is reported
    /// at once.
    pub fn resolve_value(&self, value: &mut Value) -> Result<()> {
        let mut missing = Vec::new();
        self.walk(value, &mut missing);
        if missing.is_empty() {
            Ok(())
        } else {
            missing.sort();
            missing.dedup();
            Err(ConfigError::EnvVarNotFound(missing.join(", ")))
        }
    }

    fn walk(&self, value: &mut Value, missing: &mut Vec<String>) {
        match value {
            Value::String(text) => {
                if text.contains("${") {
                    *text = self.substitute(text, missing);
                }
            }
            Value::Sequence(items) => {
                for item in items {
                    self.walk(item, missing);
                }
            }
            Value::Mapping(map) => {
                for (_, item) in map.iter_mut() {
                    self.walk(item, missing);
                }
            }
            Value::Tagged(tagged) => self.walk(&mut tagged.value, missing),
            _ => {}
        }
    }

    fn substitute(&self, input: &str, missing: &mut Vec<String>) -> String {
        self.pattern
            .replace_all(input, |caps: &regex::Captures<'_>| {
                let expr = &caps[1];
                let (name, default) = match expr.find(":-") {
                    Some(pos) => (&expr[..pos], Some(&expr[pos + 2..])),
                    None => (expr, None),
                };
                match ((self.lookup)(name), default) {
                    (Some(value), _) => value,
                    (None, Some(default)) => default.to_string(),
                    (None, None) => {
                        missing.push(name.to_string());
                        String::new()
                    }
                }
            })
            .into_owned()
    }
}

/// A resolver reading the process environment
pub fn env_resolver() -> Result<Resolver<fn(&str) -> Option<String>>> {
    Resolver::new(lookup_env as fn(&str) -> Option<String>)
}

fn lookup_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
