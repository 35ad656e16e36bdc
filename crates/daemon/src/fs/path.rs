//! Canonical path handling for remote filesystem operations.
//!
//! Every path a client supplies goes through [`normalize_path`] before it is
//! used in an SFTP request or a constructed shell command. Normalization is
//! purely syntactic: it never touches the remote filesystem and never
//! resolves symlinks.

use protocol::SessionError;

/// Normalize an arbitrary client-supplied path into canonical absolute form.
///
/// POSIX rules: redundant separators collapse, `.` segments disappear, `..`
/// segments consume the preceding segment (and are dropped at the root), and
/// the result always starts with `/`. The root itself is the only result
/// with a trailing separator.
///
/// Normalization is idempotent: applying it to its own output is a no-op.
///
/// # Errors
///
/// Returns [`SessionError::Validation`] for empty input.
pub fn normalize_path(path: &str) -> Result<String, SessionError> {
    if path.is_empty() {
        return Err(SessionError::Validation("invalid path".to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Join an entry name onto a canonical directory path.
///
/// `dir` must already be normalized; `name` must be a plain entry name
/// without separators (directory listings guarantee this).
pub fn join_path(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// The final component of a path, with trailing separators ignored.
///
/// Mirrors POSIX `basename`: `base_name("/a/b/") == "b"`. The root and an
/// all-separator input yield an empty string.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, name)) => name,
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_forces_leading_slash() {
        assert_eq!(normalize_path("home/user").unwrap(), "/home/user");
        assert_eq!(normalize_path("/home/user").unwrap(), "/home/user");
    }

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(normalize_path("//var///log").unwrap(), "/var/log");
    }

    #[test]
    fn test_normalize_resolves_dot_segments() {
        assert_eq!(normalize_path("/a/./b/./c").unwrap(), "/a/b/c");
        assert_eq!(normalize_path("/a/b/../c").unwrap(), "/a/c");
    }

    #[test]
    fn test_normalize_clamps_parent_traversal_at_root() {
        assert_eq!(normalize_path("/../../etc/passwd").unwrap(), "/etc/passwd");
        assert_eq!(normalize_path("../..").unwrap(), "/");
    }

    #[test]
    fn test_normalize_drops_trailing_slash() {
        assert_eq!(normalize_path("/var/log/").unwrap(), "/var/log");
        assert_eq!(normalize_path("/").unwrap(), "/");
    }

    #[test]
    fn test_normalize_rejects_empty_input() {
        assert!(matches!(
            normalize_path(""),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in [
            "a//b/../c/./d",
            "/..",
            "relative/path",
            "/weird/..name/still..here",
            "///",
        ] {
            let once = normalize_path(input).unwrap();
            let twice = normalize_path(&once).unwrap();
            assert_eq!(once, twice, "normalize not idempotent for {input:?}");
            assert!(once.starts_with('/'));
        }
    }

    #[test]
    fn test_normalize_keeps_dotted_names() {
        assert_eq!(normalize_path("/a/..b/c.").unwrap(), "/a/..b/c.");
    }

    #[test]
    fn test_join_path_at_root() {
        assert_eq!(join_path("/", "etc"), "/etc");
        assert_eq!(join_path("/var", "log"), "/var/log");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/a/b/c.txt"), "c.txt");
        assert_eq!(base_name("/a/b/"), "b");
        assert_eq!(base_name("plain"), "plain");
        assert_eq!(base_name("/"), "");
    }
}
