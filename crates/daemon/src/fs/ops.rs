//! Remote filesystem operations.
//!
//! Built on one session's [`SshConnection`]: metadata and content go through
//! the SFTP subsystem channel, while bulk and recursive operations (delete,
//! move, copy, archive, extract) have no SFTP primitive and are issued as
//! constructed shell commands over an execution channel.
//!
//! Every path argument is normalized before use; a normalization failure is
//! a local validation error and never reaches the remote host. Every value
//! that ends up inside a constructed command is escaped as a single shell
//! token (see [`super::quote`]).

use std::sync::Arc;

use futures_util::future::join_all;
use protocol::{DirectoryEntry, FileAttributes, SessionError};
use russh_sftp::protocol::FileAttributes as SftpAttributes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::attrs::{directory_entry, fallback_entry, owner_string, translate_attributes};
use super::path::{base_name, join_path, normalize_path};
use super::quote::{quote, quote_all};
use crate::session::connection::SshConnection;

/// Archive suffixes recognized when deriving an extraction directory.
const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".zip", ".tar"];

/// Remote filesystem operations for one connection.
///
/// Cheap to clone per call site; all state lives in the connection. No
/// serialization is imposed across operations: the SFTP channel multiplexes
/// outstanding requests and execution channels are independent, so callers
/// may overlap operations freely (and get whatever ordering the remote host
/// delivers).
#[derive(Clone)]
pub struct RemoteFs {
    conn: Arc<SshConnection>,
}

impl RemoteFs {
    /// Wrap a live connection.
    pub fn new(conn: Arc<SshConnection>) -> Self {
        Self { conn }
    }

    /// Link-status attributes of a single path.
    ///
    /// Uses lstat, so symlinks describe the link itself, never the target.
    pub async fn stat(&self, path: &str) -> Result<FileAttributes, SessionError> {
        let target = normalize_path(path)?;
        let sftp = self.conn.sftp().await?;
        let attrs = sftp
            .symlink_metadata(&target)
            .await
            .map_err(operation_error)?;
        Ok(translate_attributes(&target, &attrs))
    }

    /// List a directory, one record per entry.
    ///
    /// The `.` and `..` pseudo-entries are discarded; every remaining entry
    /// is stat-ed concurrently. A failing per-entry stat yields the
    /// fallback record rather than failing the listing, so the caller
    /// always receives a complete set.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, SessionError> {
        let dir = normalize_path(path)?;
        let sftp = self.conn.sftp().await?;
        let entries = sftp.read_dir(&dir).await.map_err(operation_error)?;

        let lookups = entries
            .into_iter()
            .filter(|e| {
                let name = e.file_name();
                name != "." && name != ".."
            })
            .map(|e| {
                let name = e.file_name();
                let owner = owner_string(&e.metadata());
                let full = join_path(&dir, &name);
                async move {
                    match self.stat(&full).await {
                        Ok(attrs) => directory_entry(name, owner, attrs),
                        Err(_) => fallback_entry(name, full),
                    }
                }
            })
            .collect::<Vec<_>>();

        Ok(join_all(lookups).await)
    }

    /// Rename a path.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError> {
        let src = normalize_path(from)?;
        let dst = normalize_path(to)?;
        let sftp = self.conn.sftp().await?;
        sftp.rename(&src, &dst).await.map_err(operation_error)
    }

    /// Create a directory.
    pub async fn mkdir(&self, path: &str) -> Result<(), SessionError> {
        let target = normalize_path(path)?;
        let sftp = self.conn.sftp().await?;
        sftp.create_dir(&target).await.map_err(operation_error)
    }

    /// Change permissions of a path from an octal mode string.
    pub async fn chmod(&self, path: &str, mode: &str) -> Result<(), SessionError> {
        let target = normalize_path(path)?;
        let mode = parse_octal_mode(mode)?;
        let sftp = self.conn.sftp().await?;
        let mut attrs = SftpAttributes::default();
        attrs.permissions = Some(mode);
        sftp.set_metadata(&target, attrs)
            .await
            .map_err(operation_error)
    }

    /// Delete one or more paths recursively.
    pub async fn delete_many(&self, paths: &[String]) -> Result<(), SessionError> {
        self.run_checked(delete_command(paths)?).await
    }

    /// Move one or more paths into a destination directory.
    pub async fn move_many(
        &self,
        sources: &[String],
        destination_dir: &str,
    ) -> Result<(), SessionError> {
        self.run_checked(move_command(sources, destination_dir)?)
            .await
    }

    /// Copy one or more paths into a destination directory, recursively.
    pub async fn copy_many(
        &self,
        sources: &[String],
        destination_dir: &str,
    ) -> Result<(), SessionError> {
        self.run_checked(copy_command(sources, destination_dir)?)
            .await
    }

    /// Build a gzip tar archive from items under a working directory.
    pub async fn compress(
        &self,
        working_dir: &str,
        archive_name: &str,
        items: &[String],
    ) -> Result<(), SessionError> {
        self.run_checked(compress_command(working_dir, archive_name, items)?)
            .await
    }

    /// Extract archives, each into its own directory under `working_dir`.
    pub async fn extract(
        &self,
        working_dir: &str,
        archives: &[String],
    ) -> Result<(), SessionError> {
        self.run_checked(extract_command(working_dir, archives)?)
            .await
    }

    /// Read a remote file's full content.
    pub async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, SessionError> {
        let target = normalize_path(path)?;
        let sftp = self.conn.sftp().await?;
        let mut file = sftp.open(&target).await.map_err(operation_error)?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .await
            .map_err(operation_error)?;
        Ok(content)
    }

    /// Write content to a remote file, creating or truncating it.
    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), SessionError> {
        let target = normalize_path(path)?;
        let sftp = self.conn.sftp().await?;
        let mut file = sftp.create(&target).await.map_err(operation_error)?;
        file.write_all(content).await.map_err(operation_error)?;
        file.shutdown().await.map_err(operation_error)
    }

    /// Run a constructed command and fail on a non-zero exit.
    ///
    /// The remote stderr text becomes the error message when there is any;
    /// completed steps of a chained command stay completed either way.
    async fn run_checked(&self, command: String) -> Result<(), SessionError> {
        tracing::debug!(command = %command, "running constructed command");
        let result = self.conn.execute(&command).await?;
        if result.exit_code == Some(0) {
            return Ok(());
        }

        let stderr = result.error_output.trim();
        if stderr.is_empty() {
            Err(SessionError::Operation(format!(
                "command failed: {command}"
            )))
        } else {
            Err(SessionError::Operation(stderr.to_string()))
        }
    }
}

/// Map an SFTP or I/O failure into an operation error.
fn operation_error<E: std::fmt::Display>(err: E) -> SessionError {
    SessionError::Operation(err.to_string())
}

/// Parse an octal permission string such as "644" or "0755".
///
/// Malformed input is a validation failure, never silently coerced.
pub(crate) fn parse_octal_mode(mode: &str) -> Result<u32, SessionError> {
    let parsed = u32::from_str_radix(mode.trim(), 8)
        .map_err(|_| SessionError::Validation(format!("invalid chmod mode: {mode:?}")))?;
    if parsed > 0o7777 {
        return Err(SessionError::Validation(format!(
            "chmod mode out of range: {mode:?}"
        )));
    }
    Ok(parsed)
}

/// Require a non-empty bulk list before any command is constructed.
fn require_items(items: &[String], what: &str) -> Result<(), SessionError> {
    if items.is_empty() {
        return Err(SessionError::Validation(format!("no {what} given")));
    }
    Ok(())
}

/// `rm -rf` over every normalized, quoted path.
pub(crate) fn delete_command(paths: &[String]) -> Result<String, SessionError> {
    require_items(paths, "paths")?;
    let quoted = paths
        .iter()
        .map(|p| Ok(quote(&normalize_path(p)?)))
        .collect::<Result<Vec<_>, SessionError>>()?;
    Ok(format!("rm -rf {}", quoted.join(" ")))
}

/// `mv` of every normalized source into a normalized destination directory.
pub(crate) fn move_command(
    sources: &[String],
    destination_dir: &str,
) -> Result<String, SessionError> {
    require_items(sources, "sources")?;
    let dest = normalize_path(destination_dir)?;
    let quoted = sources
        .iter()
        .map(|p| Ok(quote(&normalize_path(p)?)))
        .collect::<Result<Vec<_>, SessionError>>()?;
    Ok(format!("mv {} {}", quoted.join(" "), quote(&dest)))
}

/// `cp -r` of every normalized source into a normalized destination
/// directory.
pub(crate) fn copy_command(
    sources: &[String],
    destination_dir: &str,
) -> Result<String, SessionError> {
    require_items(sources, "sources")?;
    let dest = normalize_path(destination_dir)?;
    let quoted = sources
        .iter()
        .map(|p| Ok(quote(&normalize_path(p)?)))
        .collect::<Result<Vec<_>, SessionError>>()?;
    Ok(format!("cp -r {} {}", quoted.join(" "), quote(&dest)))
}

/// `tar -czf` anchored at the working directory.
///
/// Only the base name of every item is used, so entries are stored relative
/// to the working directory and a crafted item name cannot reach outside it
/// or smuggle an absolute path into the archive. The archive name itself is
/// reduced to a base name for the same reason.
pub(crate) fn compress_command(
    working_dir: &str,
    archive_name: &str,
    items: &[String],
) -> Result<String, SessionError> {
    require_items(items, "items")?;
    let cwd = normalize_path(working_dir)?;

    let archive = base_name(archive_name);
    if archive.is_empty() {
        return Err(SessionError::Validation(
            "archive name must not be empty".to_string(),
        ));
    }
    let archive_path = join_path(&cwd, archive);

    let names = items
        .iter()
        .map(|item| {
            let name = base_name(item);
            if name.is_empty() || name == "." || name == ".." {
                return Err(SessionError::Validation(format!(
                    "invalid archive item: {item:?}"
                )));
            }
            Ok(name)
        })
        .collect::<Result<Vec<_>, SessionError>>()?;

    Ok(format!(
        "tar -czf {} -C {} {}",
        quote(&archive_path),
        quote(&cwd),
        quote_all(names)
    ))
}

/// Per-archive `mkdir -p … && tar -xzf …` sequences, chained with `&&`.
///
/// Chaining makes the bulk policy fail-fast: archive N+1 is only attempted
/// when archive N succeeded.
pub(crate) fn extract_command(
    working_dir: &str,
    archives: &[String],
) -> Result<String, SessionError> {
    require_items(archives, "archives")?;
    let cwd = normalize_path(working_dir)?;

    let steps = archives
        .iter()
        .map(|archive| {
            let path = normalize_path(archive)?;
            let stem = strip_archive_suffix(base_name(&path));
            let dest = if stem.is_empty() {
                cwd.clone()
            } else {
                join_path(&cwd, stem)
            };
            Ok(format!(
                "mkdir -p {dest} && tar -xzf {path} -C {dest}",
                dest = quote(&dest),
                path = quote(&path)
            ))
        })
        .collect::<Result<Vec<_>, SessionError>>()?;

    Ok(steps.join(" && "))
}

/// Drop a recognized archive suffix from a file name, if one is present.
fn strip_archive_suffix(name: &str) -> &str {
    for suffix in ARCHIVE_SUFFIXES {
        if let Some(stem) = name.strip_suffix(suffix) {
            return stem;
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_octal_mode() {
        assert_eq!(parse_octal_mode("644").unwrap(), 0o644);
        assert_eq!(parse_octal_mode("0755").unwrap(), 0o755);
        assert_eq!(parse_octal_mode(" 700 ").unwrap(), 0o700);
    }

    #[test]
    fn test_parse_octal_mode_rejects_garbage() {
        for bad in ["", "rwx", "79", "0x1ff", "10000"] {
            assert!(
                matches!(parse_octal_mode(bad), Err(SessionError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_delete_command_quotes_every_path() {
        let cmd = delete_command(&["/tmp/a".to_string(), "/tmp/b c".to_string()]).unwrap();
        assert_eq!(cmd, "rm -rf '/tmp/a' '/tmp/b c'");
    }

    #[test]
    fn test_delete_command_neutralizes_metacharacters() {
        let cmd = delete_command(&["/tmp/x; reboot".to_string()]).unwrap();
        assert_eq!(cmd, "rm -rf '/tmp/x; reboot'");
    }

    #[test]
    fn test_delete_command_normalizes_paths() {
        let cmd = delete_command(&["/tmp/../etc//motd".to_string()]).unwrap();
        assert_eq!(cmd, "rm -rf '/etc/motd'");
    }

    #[test]
    fn test_delete_command_rejects_empty_list() {
        assert!(matches!(
            delete_command(&[]),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_move_command_shape() {
        let cmd = move_command(
            &["/a/one".to_string(), "/a/two".to_string()],
            "/b",
        )
        .unwrap();
        assert_eq!(cmd, "mv '/a/one' '/a/two' '/b'");
    }

    #[test]
    fn test_copy_command_is_recursive() {
        let cmd = copy_command(&["/a".to_string()], "/b").unwrap();
        assert_eq!(cmd, "cp -r '/a' '/b'");
    }

    #[test]
    fn test_move_copy_reject_empty_sources() {
        assert!(matches!(
            move_command(&[], "/b"),
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            copy_command(&[], "/b"),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_compress_command_uses_item_base_names() {
        // A traversal attempt contributes only its base name, anchored at
        // the working directory.
        let cmd = compress_command(
            "/tmp",
            "a.tar.gz",
            &["../../etc/passwd".to_string(), "notes.txt".to_string()],
        )
        .unwrap();
        assert_eq!(
            cmd,
            "tar -czf '/tmp/a.tar.gz' -C '/tmp' 'passwd' 'notes.txt'"
        );
    }

    #[test]
    fn test_compress_command_strips_archive_directory_components() {
        let cmd = compress_command("/srv", "../escape/out.tar.gz", &["data".to_string()]).unwrap();
        assert_eq!(cmd, "tar -czf '/srv/out.tar.gz' -C '/srv' 'data'");
    }

    #[test]
    fn test_compress_command_rejects_empty_items() {
        assert!(matches!(
            compress_command("/tmp", "a.tar.gz", &[]),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_compress_command_rejects_dot_dot_item() {
        assert!(matches!(
            compress_command("/tmp", "a.tar.gz", &["..".to_string()]),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_extract_command_single_archive() {
        let cmd = extract_command("/tmp", &["/tmp/a.tar.gz".to_string()]).unwrap();
        assert_eq!(
            cmd,
            "mkdir -p '/tmp/a' && tar -xzf '/tmp/a.tar.gz' -C '/tmp/a'"
        );
    }

    #[test]
    fn test_extract_command_chains_fail_fast() {
        let cmd = extract_command(
            "/tmp",
            &["/tmp/a.tar.gz".to_string(), "/tmp/b.tgz".to_string()],
        )
        .unwrap();
        assert_eq!(
            cmd,
            "mkdir -p '/tmp/a' && tar -xzf '/tmp/a.tar.gz' -C '/tmp/a' \
             && mkdir -p '/tmp/b' && tar -xzf '/tmp/b.tgz' -C '/tmp/b'"
        );
    }

    #[test]
    fn test_extract_command_rejects_empty_archives() {
        assert!(matches!(
            extract_command("/tmp", &[]),
            Err(SessionError::Validation(_))
        ));
    }

    #[test]
    fn test_strip_archive_suffix() {
        assert_eq!(strip_archive_suffix("a.tar.gz"), "a");
        assert_eq!(strip_archive_suffix("a.tgz"), "a");
        assert_eq!(strip_archive_suffix("a.zip"), "a");
        assert_eq!(strip_archive_suffix("a.tar"), "a");
        assert_eq!(strip_archive_suffix("a.rar"), "a.rar");
        assert_eq!(strip_archive_suffix("archive.tar.gz.bak"), "archive.tar.gz.bak");
    }

    #[test]
    fn test_bulk_validation_happens_before_any_normalization_error() {
        // An empty list wins over a bad destination: nothing is built.
        let err = move_command(&[], "").unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }
}
