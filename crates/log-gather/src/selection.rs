//! Choosing which discovered files to collect
//!
//! Both modes keep every current file and preserve discovery order.

use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};

use crate::config::Selection;
use crate::timestamp::{LogFile, Stamp};

/// Apply `selection` to discovered files at `now`
pub fn select(files: Vec<LogFile>, selection: &Selection, now: NaiveDateTime) -> Vec<LogFile> {
    match selection {
        Selection::Recent(count) => select_recent(files, *count),
        _ => match selection.window(now) {
            Some((from, to)) => select_window(files, from, to),
            None => files,
        },
    }
}

/// Keep files rotated within `[from, to]` inclusive, plus current files
pub fn select_window(files: Vec<LogFile>, from: NaiveDateTime, to: NaiveDateTime) -> Vec<LogFile> {
    files
        .into_iter()
        .filter(|file| match file.stamp() {
            Stamp::Current => true,
            Stamp::At(moment) => from <= moment && moment <= to,
        })
        .collect()
}

/// Per log type, keep current files plus the `count` newest rotated files
pub fn select_recent(files: Vec<LogFile>, count: usize) -> Vec<LogFile> {
    let mut by_type: HashMap<&str, Vec<(NaiveDateTime, usize)>> = HashMap::new();
    for (index, file) in files.iter().enumerate() {
        if let Stamp::At(moment) = file.stamp() {
            by_type
                .entry(file.log_type())
                .or_default()
                .push((moment, index));
        }
    }

    let mut keep: HashSet<usize> = HashSet::new();
    for rotated in by_type.values_mut() {
        rotated.sort_by(|a, b| b.cmp(a));
        keep.extend(rotated.iter().take(count).map(|(_, index)| *index));
    }

    files
        .into_iter()
        .enumerate()
        .filter(|(index, file)| file.stamp().is_current() || keep.contains(index))
        .map(|(_, file)| file)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn rotated(log_type: &str, at: NaiveDateTime) -> LogFile {
        LogFile::parse(format!("{}.{}", log_type, at.format("%Y%m%d%H%M%S%3f")))
    }

    fn names(files: &[LogFile]) -> Vec<&str> {
        files.iter().map(LogFile::name).collect()
    }

    #[test]
    fn test_window_keeps_inside_and_current() {
        let t = now();
        let two_hours = rotated("observer.log", t - Duration::hours(2));
        let one_hour = rotated("observer.log", t - Duration::hours(1));
        let current = LogFile::parse("observer.log");
        let files = vec![two_hours, one_hour.clone(), current.clone()];

        let selected = select_window(files, t - Duration::minutes(90), t);
        assert_eq!(selected, vec![one_hour, current]);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let t = now();
        let from = t - Duration::hours(1);
        let files = vec![rotated("a.log", from), rotated("a.log", t)];
        assert_eq!(select_window(files, from, t).len(), 2);
    }

    #[test]
    fn test_widening_never_removes() {
        let t = now();
        let files: Vec<LogFile> = (0..10)
            .map(|h| rotated("a.log", t - Duration::hours(h)))
            .chain([LogFile::parse("a.log")])
            .collect();

        let narrow = select_window(files.clone(), t - Duration::hours(3), t);
        let wide = select_window(files, t - Duration::hours(6), t);
        for file in &narrow {
            assert!(wide.contains(file));
        }
        assert!(wide.len() > narrow.len());
    }

    #[test]
    fn test_retention_is_per_type() {
        let t = now();
        let mut files = Vec::new();
        for h in 1..=5 {
            files.push(rotated("a.log", t - Duration::hours(h)));
        }
        files.push(LogFile::parse("a.log"));
        for h in 1..=3 {
            files.push(rotated("b.log", t - Duration::hours(h * 10)));
        }

        let selected = select_recent(files, 2);
        let a_newest = rotated("a.log", t - Duration::hours(1));
        let a_second = rotated("a.log", t - Duration::hours(2));
        let b_newest = rotated("b.log", t - Duration::hours(10));
        let b_second = rotated("b.log", t - Duration::hours(20));

        assert_eq!(
            names(&selected),
            vec![
                a_newest.name(),
                a_second.name(),
                "a.log",
                b_newest.name(),
                b_second.name(),
            ]
        );
    }

    #[test]
    fn test_retention_keeps_all_current_files() {
        let files = vec![
            LogFile::parse("observer.log"),
            LogFile::parse("observer.log.wf"),
            LogFile::parse("observer.log.20240101000000000"),
        ];
        let selected = select_recent(files, 1);
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_discovery_order_preserved() {
        let t = now();
        let files = vec![
            LogFile::parse("observer.log"),
            rotated("observer.log", t - Duration::minutes(5)),
            rotated("observer.log", t - Duration::minutes(50)),
        ];
        let selected = select(
            files.clone(),
            &Selection::Since(std::time::Duration::from_secs(3600)),
            t,
        );
        assert_eq!(selected, files);
    }
}
