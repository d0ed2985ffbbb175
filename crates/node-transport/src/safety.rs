//! Command safety filter
//!
//! Every command passes through [`SafetyFilter::check`] before any transport
//! sees it. Collaborators rely on this gate to keep destructive operator input
//! away from managed hosts, so the deny lists are part of the public contract.

use regex::RegexSet;

use crate::error::{Error, Result};

/// Commands refused when they match exactly (after trimming whitespace)
pub const DENIED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "rm -rf ~",
    "rm -rf ~/*",
    "rm -rf .",
    "dd if=/dev/zero of=/dev/sda",
    "dd if=/dev/random of=/dev/sda",
    "mkfs",
    "mkfs.ext4 /dev/sda",
    ":(){ :|:& };:",
    "reboot",
    "shutdown",
    "shutdown -h now",
    "shutdown -r now",
    "halt",
    "poweroff",
    "init 0",
    "init 6",
    "chmod -R 777 /",
    "mv / /dev/null",
];

/// Patterns refused anywhere in a command line
pub const DENIED_PATTERNS: &[&str] = &[
    r"\bkill\s+-(?:9|KILL|SIGKILL)\s+-?\d+",
    r"\bkillall\s+-(?:9|KILL|SIGKILL)\b",
    r"\brm\s+-[a-zA-Z]*[rR][a-zA-Z]*\s+/\s*(?:$|[;&|])",
    r"\bmkfs(?:\.\w+)?\s+/dev/",
    r"\bdd\s+.*\bof=/dev/(?:sd|nvme|hd|vd)",
    r">\s*/dev/(?:sd|nvme|hd|vd)[a-z0-9]*\b",
];

/// Deny-list gate applied to every command
///
/// The compiled pattern set lives in the filter value itself; build one per
/// run and share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    exact: Vec<String>,
    patterns: RegexSet,
}

impl SafetyFilter {
    /// The standard deny lists
    pub fn standard() -> Result<Self> {
        Self::new(
            DENIED_COMMANDS.iter().map(|s| s.to_string()),
            DENIED_PATTERNS.iter().copied(),
        )
    }

    /// Build a filter from custom deny lists
    pub fn new<I, P, S>(exact: I, patterns: P) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = RegexSet::new(patterns)
            .map_err(|e| Error::init("safety-filter", format!("invalid deny pattern: {}", e)))?;
        Ok(Self {
            exact: exact.into_iter().map(|s| s.trim().to_string()).collect(),
            patterns,
        })
    }

    /// Returns true if the command may be dispatched
    pub fn is_allowed(&self, command: &str) -> bool {
        let trimmed = command.trim();
        !self.exact.iter().any(|denied| denied == trimmed) && !self.patterns.is_match(trimmed)
    }

    /// Fail with [`Error::UnsafeCommand`] if the command is denied
    pub fn check(&self, command: &str) -> Result<()> {
        if self.is_allowed(command) {
            Ok(())
        } else {
            tracing::warn!("Rejected unsafe command: {}", command);
            Err(Error::UnsafeCommand {
                command: command.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> SafetyFilter {
        SafetyFilter::standard().unwrap()
    }

    #[test]
    fn test_exact_denials() {
        let filter = filter();
        assert!(filter.check("reboot").is_err());
        assert!(filter.check("  shutdown -h now ").is_err());
        assert!(filter.check(":(){ :|:& };:").is_err());
        assert!(filter.check("rm -rf /").is_err());
    }

    #[test]
    fn test_pattern_denials() {
        let filter = filter();
        let err = filter.check("kill -9 1234").unwrap_err();
        assert!(matches!(err, Error::UnsafeCommand { .. }));
        assert!(err.is_rejected());
        assert!(filter.check("ps aux; kill -KILL 42").is_err());
        assert!(filter.check("rm -rf / ; echo").is_err());
        assert!(filter.check("mkfs.xfs /dev/sdb").is_err());
    }

    #[test]
    fn test_allowed_commands() {
        let filter = filter();
        assert!(filter.check("kill -15 1234").is_ok());
        assert!(filter.check("rm -rf /tmp/gather_abc123").is_ok());
        assert!(filter.check("echo reboot").is_ok());
        assert!(filter.check("grep -e 'shutdown' observer.log").is_ok());
        assert!(filter.check("tar -czf /tmp/a.tar.gz -C /tmp stage").is_ok());
    }

    #[test]
    fn test_custom_filter() {
        let filter = SafetyFilter::new(vec!["drop".to_string()], [r"^truncate\b"]).unwrap();
        assert!(!filter.is_allowed("drop"));
        assert!(!filter.is_allowed("truncate table t"));
        assert!(filter.is_allowed("reboot"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let result = SafetyFilter::new(Vec::new(), ["(unclosed"]);
        assert!(matches!(result, Err(Error::TransportInit { .. })));
    }
}
