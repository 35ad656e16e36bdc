//! Translation of raw SFTP attributes into wire-facing records.
//!
//! The SFTP layer reports optional numeric metadata; clients expect the
//! stable [`FileAttributes`] / [`DirectoryEntry`] shapes with a rendered
//! permission string and exactly one type flag set. File-type classification
//! uses the `S_IFMT` bits of the mode, so a symlink stays a symlink even
//! when its target is a directory (all stats here are link-status).

use protocol::{DirectoryEntry, FileAttributes};
use russh_sftp::protocol::FileAttributes as SftpAttributes;

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Render the nine-character `rwxrwxrwx` permission string for a mode.
///
/// Order is fixed: user, group, other; each bit is tested independently and
/// an absent bit renders as `-`.
pub fn permission_string(mode: u32) -> String {
    let mut out = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Whether the mode's type bits mark a directory.
pub fn is_directory(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

/// Whether the mode's type bits mark a symbolic link.
pub fn is_symlink(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

/// Translate raw SFTP attributes for `path` into a [`FileAttributes`] record.
///
/// Missing metadata degrades to neutral values: no size reads as 0, no
/// mtime as unknown, no permissions as mode 0 (which classifies as a plain
/// file with an all-dashes permission string).
pub fn translate_attributes(path: &str, attrs: &SftpAttributes) -> FileAttributes {
    let mode = attrs.permissions.unwrap_or(0);
    let dir = is_directory(mode);
    let link = is_symlink(mode);

    FileAttributes {
        path: path.to_string(),
        size: attrs.size.unwrap_or(0),
        modified: attrs.mtime.map(u64::from),
        mode,
        permissions: permission_string(mode),
        is_directory: dir,
        is_file: !dir && !link,
        is_symlink: link,
    }
}

/// The owner reported for an entry, or the empty string.
///
/// SFTP servers that speak a long-name dialect put a user name in the
/// attributes; older ones only supply a numeric uid. Either is surfaced,
/// preferring the name.
pub fn owner_string(attrs: &SftpAttributes) -> String {
    attrs
        .user
        .clone()
        .or_else(|| attrs.uid.map(|uid| uid.to_string()))
        .unwrap_or_default()
}

/// Build a [`DirectoryEntry`] from a stat result.
pub fn directory_entry(name: String, owner: String, attrs: FileAttributes) -> DirectoryEntry {
    let kind = if attrs.is_directory {
        "directory"
    } else if attrs.is_symlink {
        "symlink"
    } else {
        "file"
    };

    DirectoryEntry {
        name,
        size: attrs.size,
        modified: attrs.modified,
        permissions: attrs.permissions,
        owner,
        is_directory: attrs.is_directory,
        is_symlink: attrs.is_symlink,
        is_file: attrs.is_file,
        kind: kind.to_string(),
        path: attrs.path,
    }
}

/// The fallback record for an entry whose stat failed: zero size, unknown
/// mtime, all-dashes permissions, classified as a plain file. Listings use
/// this so one unreadable entry never sinks the whole directory.
pub fn fallback_entry(name: String, path: String) -> DirectoryEntry {
    DirectoryEntry {
        name,
        path,
        size: 0,
        modified: None,
        permissions: "---------".to_string(),
        owner: String::new(),
        is_directory: false,
        is_symlink: false,
        is_file: true,
        kind: "file".to_string(),
    }
}
