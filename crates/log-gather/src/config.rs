//! Run configuration for a gather

use chrono::NaiveDateTime;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::ScopeCatalog;
use crate::error::{Error, Result};

/// Format of `from` / `to` values
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Default number of files one node may contribute
pub const DEFAULT_FILE_NUMBER_LIMIT: usize = 20;
/// Default bundle size limit (2 GiB)
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 2 * 1024 * 1024 * 1024;
/// Default window when no selection is given
pub const DEFAULT_SINCE: Duration = Duration::from_secs(30 * 60);
/// Default remote scratch directory
pub const DEFAULT_TEMP_DIR: &str = "/tmp";

/// Which rotated files to keep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Files rotated within `[from, to]`, plus current files
    Window {
        /// Start of the window, inclusive
        from: NaiveDateTime,
        /// End of the window, inclusive
        to: NaiveDateTime,
    },
    /// Files rotated within the trailing duration, plus current files
    Since(Duration),
    /// Per log type, the N newest rotated files plus current files
    Recent(usize),
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Since(DEFAULT_SINCE)
    }
}

impl Selection {
    /// Build a selection from operator input
    ///
    /// `from` and `to` must be given together; `recent` excludes both a window
    /// and `since`. With nothing given, the last 30 minutes are selected.
    pub fn from_options(
        from: Option<&str>,
        to: Option<&str>,
        since: Option<&str>,
        recent: Option<usize>,
    ) -> Result<Self> {
        let window = from.is_some() || to.is_some();
        let modes = [window, since.is_some(), recent.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if modes > 1 {
            return Err(Error::config(
                "choose one of from/to, since or recent",
            ));
        }

        if let Some(count) = recent {
            return Ok(Selection::Recent(count));
        }
        if let Some(since) = since {
            return Ok(Selection::Since(parse_since(since)?));
        }
        match (from, to) {
            (Some(from), Some(to)) => Ok(Selection::Window {
                from: parse_datetime(from)?,
                to: parse_datetime(to)?,
            }),
            (None, None) => Ok(Selection::default()),
            _ => Err(Error::config("from and to must be given together")),
        }
    }

    /// The time window this selection covers at `now`, if it is time based
    pub fn window(&self, now: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
        match self {
            Selection::Window { from, to } => Some((*from, *to)),
            Selection::Since(duration) => {
                let span = chrono::Duration::from_std(*duration).unwrap_or(chrono::Duration::MAX);
                let from = now.checked_sub_signed(span).unwrap_or(NaiveDateTime::MIN);
                Some((from, now))
            }
            Selection::Recent(_) => None,
        }
    }
}

/// Parse `yyyy-mm-dd hh:mm:ss`
pub fn parse_datetime(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), DATETIME_FORMAT).map_err(|e| {
        Error::invalid_timestamp(value, format!("expected yyyy-mm-dd hh:mm:ss ({})", e))
    })
}

/// Parse a relative duration `<n><m|h|d>`
pub fn parse_since(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    let Some(unit) = trimmed.chars().last() else {
        return Err(Error::invalid_timestamp(value, "empty duration"));
    };
    let digits = &trimmed[..trimmed.len() - unit.len_utf8()];
    let amount: u64 = digits
        .parse()
        .map_err(|_| Error::invalid_timestamp(value, "expected <n><m|h|d>"))?;
    if amount == 0 {
        return Err(Error::invalid_timestamp(value, "duration must be positive"));
    }
    let seconds = match unit.to_ascii_lowercase() {
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return Err(Error::invalid_timestamp(value, "unit must be m, h or d")),
    };
    amount
        .checked_mul(seconds)
        .map(Duration::from_secs)
        .ok_or_else(|| Error::invalid_timestamp(value, "duration too large"))
}

/// Settings shared by every node in one run
#[derive(Debug, Clone)]
pub struct GatherConfig {
    /// Scope to collect, e.g. `observer` or `all`
    pub scope: String,
    /// Which files to keep
    pub selection: Selection,
    /// Every term must match for a line to be kept; empty keeps whole files
    pub grep: Vec<String>,
    /// Local directory receiving bundles
    pub store_dir: PathBuf,
    /// Remote scratch directory overriding each node's own
    pub temp_dir: Option<String>,
    /// Maximum files per node
    pub file_number_limit: usize,
    /// Maximum bundle size in bytes
    pub file_size_limit: u64,
    /// Bound on each remote call
    pub cmd_exec_timeout: Duration,
    /// Nodes processed concurrently
    pub parallelism: usize,
}

impl GatherConfig {
    /// A configuration with default limits
    pub fn new(scope: impl Into<String>, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            scope: scope.into(),
            selection: Selection::default(),
            grep: Vec::new(),
            store_dir: store_dir.into(),
            temp_dir: None,
            file_number_limit: DEFAULT_FILE_NUMBER_LIMIT,
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
            cmd_exec_timeout: node_transport::DEFAULT_CMD_TIMEOUT,
            parallelism: 1,
        }
    }

    /// Set the selection
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    /// Add a grep term
    pub fn with_grep(mut self, term: impl Into<String>) -> Self {
        self.grep.push(term.into());
        self
    }

    /// Set the remote scratch directory
    pub fn with_temp_dir(mut self, dir: impl Into<String>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Set the file number limit
    pub fn with_file_number_limit(mut self, limit: usize) -> Self {
        self.file_number_limit = limit;
        self
    }

    /// Set the bundle size limit
    pub fn with_file_size_limit(mut self, limit: u64) -> Self {
        self.file_size_limit = limit;
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.cmd_exec_timeout = timeout;
        self
    }

    /// Set how many nodes run at once
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Reject configurations that cannot work for any node
    pub fn validate(&self, catalog: &ScopeCatalog) -> Result<()> {
        catalog.patterns(&self.scope)?;
        if self.file_number_limit == 0 {
            return Err(Error::config("file_number_limit must be at least 1"));
        }
        if self.file_size_limit == 0 {
            return Err(Error::config("file_size_limit must be at least 1 byte"));
        }
        if self.cmd_exec_timeout.is_zero() {
            return Err(Error::config("cmd_exec_timeout must be positive"));
        }
        if self.parallelism == 0 {
            return Err(Error::config("parallelism must be at least 1"));
        }
        match &self.selection {
            Selection::Window { from, to } if from > to => Err(Error::config(format!(
                "window start {} is after its end {}",
                from.format(DATETIME_FORMAT),
                to.format(DATETIME_FORMAT)
            ))),
            Selection::Recent(0) => Err(Error::config("recent count must be at least 1")),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_since("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_since("2d").unwrap(), Duration::from_secs(172_800));
        assert!(parse_since("0h").is_err());
        assert!(parse_since("h").is_err());
        assert!(parse_since("5w").is_err());
        assert!(parse_since("").is_err());
    }

    #[test]
    fn test_parse_datetime() {
        let parsed = parse_datetime("2024-01-01 23:59:00").unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap()
        );
        assert!(matches!(
            parse_datetime("2024/01/01"),
            Err(Error::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_selection_from_options() {
        assert_eq!(
            Selection::from_options(None, None, None, None).unwrap(),
            Selection::Since(DEFAULT_SINCE)
        );
        assert_eq!(
            Selection::from_options(None, None, None, Some(3)).unwrap(),
            Selection::Recent(3)
        );
        assert!(Selection::from_options(Some("2024-01-01 00:00:00"), None, None, None).is_err());
        assert!(Selection::from_options(None, None, Some("1h"), Some(2)).is_err());
    }

    #[test]
    fn test_since_window() {
        let now = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let (from, to) = Selection::Since(Duration::from_secs(3600))
            .window(now)
            .unwrap();
        assert_eq!(to, now);
        assert_eq!(from, now - chrono::Duration::hours(1));
        assert_eq!(Selection::Recent(2).window(now), None);
    }

    #[test]
    fn test_validate() {
        let catalog = ScopeCatalog::standard();
        let config = GatherConfig::new("observer", "/tmp/store");
        assert!(config.validate(&catalog).is_ok());
        assert_eq!(config.file_number_limit, 20);
        assert_eq!(config.file_size_limit, 2 * 1024 * 1024 * 1024);

        let bad_scope = GatherConfig::new("nope", "/tmp/store");
        assert!(matches!(bad_scope.validate(&catalog), Err(Error::Config(_))));

        let inverted = GatherConfig::new("observer", "/tmp/store").with_selection(Selection::Window {
            from: parse_datetime("2024-01-02 00:00:00").unwrap(),
            to: parse_datetime("2024-01-01 00:00:00").unwrap(),
        });
        assert!(inverted.validate(&catalog).is_err());
    }
}
