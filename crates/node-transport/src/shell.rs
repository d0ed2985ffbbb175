//! Shell quoting for command lines sent to remote shells

/// Escape a string for safe inclusion in a `sh -c` command line
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.contains(|c: char| c.is_whitespace() || "\"'\\$`!*?<>|&;()[]{}#~".contains(c)) {
        // Use single quotes and escape any single quotes in the string
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    } else {
        s.to_string()
    }
}

/// Parent directory and file name of a remote POSIX path
pub fn split_remote_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
        None => (".", trimmed),
    }
}

/// Join a remote directory and a file name
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("simple"), "simple");
        assert_eq!(quote("with space"), "'with space'");
        assert_eq!(quote("with'quote"), "'with'\"'\"'quote'");
        assert_eq!(quote("$variable"), "'$variable'");
        assert_eq!(quote("observer.log*"), "'observer.log*'");
        assert_eq!(quote("path/to/file"), "path/to/file");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_split_remote_path() {
        assert_eq!(
            split_remote_path("/home/admin/log/observer.log"),
            ("/home/admin/log", "observer.log")
        );
        assert_eq!(split_remote_path("/observer.log"), ("/", "observer.log"));
        assert_eq!(split_remote_path("observer.log"), (".", "observer.log"));
        assert_eq!(split_remote_path("/tmp/stage/"), ("/tmp", "stage"));
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/tmp", "a.gz"), "/tmp/a.gz");
        assert_eq!(join_remote("/tmp/", "a.gz"), "/tmp/a.gz");
    }
}
