//! Rotation timestamps in log file names
//!
//! A rotated file carries a dotted 17-digit suffix `YYYYMMDDHHMMSSmmm`
//! (`observer.log.20250101120000123`), optionally followed by a compression
//! extension. A file without a decodable suffix is the one still being
//! written and is called "current".

use chrono::{NaiveDateTime, Timelike};
use std::fmt;

/// Digits in a rotation suffix
pub const SUFFIX_LEN: usize = 17;

/// Extensions marking an already-compressed rotated file
pub const COMPRESSED_EXTENSIONS: &[&str] = &["gz", "zst", "xz", "bz2", "lz4", "zip"];

/// When a log file was rotated
///
/// `Current` orders after every timestamp: it is the newest file of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stamp {
    /// Rotated at this moment
    At(NaiveDateTime),
    /// Still being written
    Current,
}

impl Stamp {
    /// Whether this is the file still being written
    pub fn is_current(&self) -> bool {
        matches!(self, Stamp::Current)
    }

    /// The rotation moment, if any
    pub fn moment(&self) -> Option<NaiveDateTime> {
        match self {
            Stamp::At(moment) => Some(*moment),
            Stamp::Current => None,
        }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stamp::At(moment) => write!(f, "{}", moment.format("%Y-%m-%d %H:%M:%S%.3f")),
            Stamp::Current => f.write_str("current"),
        }
    }
}

/// Decode a 17-digit rotation suffix; anything else yields `None`
pub fn parse_suffix(suffix: &str) -> Option<NaiveDateTime> {
    if suffix.len() != SUFFIX_LEN || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let seconds = NaiveDateTime::parse_from_str(&suffix[..14], "%Y%m%d%H%M%S").ok()?;
    let millis: u32 = suffix[14..].parse().ok()?;
    seconds.with_nanosecond(millis * 1_000_000)
}

/// Stamp of a file name: the moment in its suffix, or `Current`
pub fn stamp_of(name: &str) -> Stamp {
    let (base, _) = strip_compression(name);
    base.rsplit_once('.')
        .and_then(|(_, suffix)| parse_suffix(suffix))
        .map(Stamp::At)
        .unwrap_or(Stamp::Current)
}

fn strip_compression(name: &str) -> (&str, bool) {
    match name.rsplit_once('.') {
        Some((base, ext)) if COMPRESSED_EXTENSIONS.contains(&ext) => (base, true),
        _ => (name, false),
    }
}

/// One discovered log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    name: String,
    stamp: Stamp,
    log_type: String,
    compressed: bool,
}

impl LogFile {
    /// Describe a file by its name in the log directory
    pub fn parse(name: impl Into<String>) -> Self {
        let name = name.into();
        let (base, compressed) = strip_compression(&name);
        let (stamp, log_type) = match base.rsplit_once('.') {
            Some((head, suffix)) => match parse_suffix(suffix) {
                Some(moment) => (Stamp::At(moment), head.to_string()),
                None => (Stamp::Current, base.to_string()),
            },
            None => (Stamp::Current, base.to_string()),
        };
        Self {
            log_type,
            stamp,
            compressed,
            name,
        }
    }

    /// File name inside the log directory
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rotation stamp
    pub fn stamp(&self) -> Stamp {
        self.stamp
    }

    /// File name with the rotation suffix and compression extension removed
    pub fn log_type(&self) -> &str {
        &self.log_type
    }

    /// Whether the file is already compressed and must be copied verbatim
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }
}
