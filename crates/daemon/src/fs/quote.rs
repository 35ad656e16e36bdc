//! Shell-token escaping for constructed remote commands.
//!
//! Bulk operations (delete, move, copy, compress, extract) have no SFTP
//! primitive and are issued as shell commands instead. Every path that goes
//! into such a command passes through [`quote`] so it is interpreted as
//! exactly one token, never as a second command, a flag, or an expansion.

/// Escape a string as a single shell token.
///
/// Single-quote discipline: the value is wrapped in `'…'` and every
/// embedded `'` is replaced with `'\''`. Inside single quotes the shell
/// performs no expansion at all, so spaces, globs, `$`, backticks and
/// semicolons all come through literally.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Quote every element and join with single spaces.
pub fn quote_all<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| quote(s.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_path() {
        assert_eq!(quote("/var/log"), "'/var/log'");
    }

    #[test]
    fn test_quote_spaces_and_metacharacters() {
        assert_eq!(quote("/tmp/my file"), "'/tmp/my file'");
        assert_eq!(quote("a;rm -rf /"), "'a;rm -rf /'");
        assert_eq!(quote("$(reboot)"), "'$(reboot)'");
        assert_eq!(quote("`id`"), "'`id`'");
        assert_eq!(quote("a&&b"), "'a&&b'");
    }

    #[test]
    fn test_quote_embedded_single_quote() {
        assert_eq!(quote("it's"), r"'it'\''s'");
        // A value that is nothing but quotes still round-trips to one token.
        assert_eq!(quote("''"), r"''\'''\'''");
    }

    #[test]
    fn test_quote_empty_string_is_one_empty_token() {
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_all_joins_with_spaces() {
        assert_eq!(
            quote_all(["/a", "/b c", "/d"]),
            "'/a' '/b c' '/d'"
        );
    }
}
