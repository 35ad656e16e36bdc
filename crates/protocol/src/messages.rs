//! Wire message definitions for Gangway.
//!
//! This module defines the request and event types exchanged between the
//! daemon and its clients over the relay. Messages are serialized as JSON
//! text frames: one [`ClientRequest`] per inbound frame, one [`ServerEvent`]
//! per outbound frame. Type tags are kebab-case, payload fields camelCase,
//! matching what browser-side clients expect.

use serde::{Deserialize, Serialize};

/// Default port for the remote-login protocol.
pub const DEFAULT_SSH_PORT: u16 = 22;

// ============================================================================
// Inbound requests
// ============================================================================

/// Requests a client may send to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientRequest {
    /// Open a new remote session with the given credentials.
    Connect(ConnectRequest),
    /// Raw input for the interactive shell.
    Write {
        /// Bytes to forward to the shell, as text.
        data: String,
    },
    /// Resize the interactive shell's terminal window.
    Resize {
        /// Terminal width in columns.
        cols: u32,
        /// Terminal height in rows.
        rows: u32,
    },
    /// Run a one-off command to completion.
    Execute {
        /// Command line to execute on the remote host.
        command: String,
    },
    /// List a remote directory.
    List {
        /// Directory to list.
        path: String,
    },
    /// Inspect a single remote path (link-status, not dereferencing).
    Stat {
        /// Path to inspect.
        path: String,
    },
    /// Rename a remote path.
    Rename {
        /// Current path.
        from: String,
        /// New path.
        to: String,
    },
    /// Create a remote directory.
    Mkdir {
        /// Directory to create.
        path: String,
    },
    /// Change permissions of a remote path.
    Chmod {
        /// Path to modify.
        path: String,
        /// Octal mode string, e.g. "644".
        mode: String,
    },
    /// Delete one or more remote paths recursively.
    Delete {
        /// Paths to delete. Must be non-empty.
        paths: Vec<String>,
    },
    /// Move one or more remote paths into a destination directory.
    Move {
        /// Source paths. Must be non-empty.
        sources: Vec<String>,
        /// Destination directory.
        destination_dir: String,
    },
    /// Copy one or more remote paths into a destination directory.
    Copy {
        /// Source paths. Must be non-empty.
        sources: Vec<String>,
        /// Destination directory.
        destination_dir: String,
    },
    /// Build a compressed archive from items under a working directory.
    Compress {
        /// Directory the archive entries are stored relative to.
        working_dir: String,
        /// Name of the archive to create under the working directory.
        archive_name: String,
        /// Item names to include. Must be non-empty.
        items: Vec<String>,
    },
    /// Extract one or more archives, each into its own directory.
    Extract {
        /// Directory the per-archive destination directories are created in.
        working_dir: String,
        /// Archive paths to extract. Must be non-empty.
        archives: Vec<String>,
    },
    /// Fetch a remote file's content.
    Fetch {
        /// File to read.
        path: String,
    },
    /// Write content to a remote file, creating or truncating it.
    WriteFile {
        /// File to write.
        path: String,
        /// File content, base64-encoded.
        content: String,
    },
    /// Tear the session down.
    Disconnect,
}

/// Credentials payload for [`ClientRequest::Connect`].
///
/// `password` and `private_key` are both optional on the wire; the daemon
/// resolves them into exactly one authentication method, with key material
/// taking precedence over a password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Remote host name or address.
    pub host: String,
    /// Remote port. Defaults to 22 when absent.
    pub port: Option<u16>,
    /// Login user name.
    pub username: String,
    /// Password authentication, ignored when key material is present.
    pub password: Option<String>,
    /// PEM-encoded private key material.
    pub private_key: Option<String>,
    /// Passphrase for the private key, if it is encrypted.
    pub passphrase: Option<String>,
}

// ============================================================================
// Outbound events
// ============================================================================

/// Events and results the daemon sends back to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The session reached ready: shell channel is open.
    Ready,
    /// A chunk of interactive shell output.
    Data {
        /// Output bytes, as text.
        data: String,
    },
    /// The session failed. Terminal.
    Error {
        /// Human-readable cause.
        message: String,
    },
    /// The session closed. Terminal.
    Close,
    /// Result of an [`ClientRequest::Execute`] request.
    CommandResult(CommandResult),
    /// Result of a [`ClientRequest::List`] request.
    DirectoryListing {
        /// The listed directory, as requested.
        path: String,
        /// One record per directory entry.
        entries: Vec<DirectoryEntry>,
    },
    /// Result of a [`ClientRequest::Stat`] request.
    FileAttributes(FileAttributes),
    /// Result of a [`ClientRequest::Fetch`] request.
    FileContent {
        /// The fetched file, as requested.
        path: String,
        /// File content, base64-encoded.
        content: String,
    },
    /// An operation without a payload result completed.
    ActionOk {
        /// The request's type tag.
        action: String,
    },
    /// An operation failed.
    ActionError {
        /// The request's type tag.
        action: String,
        /// Stable error tag, see `SessionError::kind`.
        kind: String,
        /// Human-readable cause.
        message: String,
    },
}

/// Outcome of running a one-off command to completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// Collected standard output.
    pub output: String,
    /// Collected standard error.
    pub error_output: String,
    /// Exit code, absent when the process was terminated by a signal.
    pub exit_code: Option<u32>,
    /// Terminating signal name, when one was delivered.
    pub signal: Option<String>,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Entry name without directory components.
    pub name: String,
    /// Absolute canonical path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time as Unix seconds, absent when unknown.
    pub modified: Option<u64>,
    /// Nine-character permission string, "---------" when unknown.
    pub permissions: String,
    /// Owning user, empty when the server does not report one.
    pub owner: String,
    /// True for directories.
    pub is_directory: bool,
    /// True for symbolic links (never dereferenced).
    pub is_symlink: bool,
    /// True for anything that is neither a directory nor a symlink.
    pub is_file: bool,
    /// Type tag: "directory", "symlink" or "file".
    #[serde(rename = "type")]
    pub kind: String,
}

/// Attributes of a single remote path, from link-status inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileAttributes {
    /// Absolute canonical path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time as Unix seconds, absent when unknown.
    pub modified: Option<u64>,
    /// Raw numeric mode including type bits.
    pub mode: u32,
    /// Nine-character permission string.
    pub permissions: String,
    /// True for directories.
    pub is_directory: bool,
    /// True for anything that is neither a directory nor a symlink.
    pub is_file: bool,
    /// True for symbolic links.
    pub is_symlink: bool,
}

impl ClientRequest {
    /// The request's wire tag, used for `action-ok` / `action-error` frames.
    pub fn action(&self) -> &'static str {
        match self {
            ClientRequest::Connect(_) => "connect",
            ClientRequest::Write { .. } => "write",
            ClientRequest::Resize { .. } => "resize",
            ClientRequest::Execute { .. } => "execute",
            ClientRequest::List { .. } => "list",
            ClientRequest::Stat { .. } => "stat",
            ClientRequest::Rename { .. } => "rename",
            ClientRequest::Mkdir { .. } => "mkdir",
            ClientRequest::Chmod { .. } => "chmod",
            ClientRequest::Delete { .. } => "delete",
            ClientRequest::Move { .. } => "move",
            ClientRequest::Copy { .. } => "copy",
            ClientRequest::Compress { .. } => "compress",
            ClientRequest::Extract { .. } => "extract",
            ClientRequest::Fetch { .. } => "fetch",
            ClientRequest::WriteFile { .. } => "write-file",
            ClientRequest::Disconnect => "disconnect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_serialization() {
        let request = ClientRequest::Connect(ConnectRequest {
            host: "example.com".to_string(),
            port: None,
            username: "deploy".to_string(),
            password: Some("hunter2".to_string()),
            private_key: None,
            passphrase: None,
        });

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""type":"connect""#));
        assert!(json.contains(r#""host":"example.com""#));

        let deserialized: ClientRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, request);
    }

    #[test]
    fn test_connect_request_port_defaults_to_absent() {
        let json = r#"{"type":"connect","host":"h","username":"u","password":"p"}"#;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        match request {
            ClientRequest::Connect(c) => {
                assert_eq!(c.port, None);
                assert_eq!(c.private_key, None);
            }
            other => panic!("expected connect, got {other:?}"),
        }
    }

    #[test]
    fn test_move_request_field_names_are_camel_case() {
        let request = ClientRequest::Move {
            sources: vec!["/a".to_string()],
            destination_dir: "/b".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""destinationDir":"/b""#));

        let deserialized: ClientRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, request);
    }

    #[test]
    fn test_write_file_tag_is_kebab_case() {
        let request = ClientRequest::WriteFile {
            path: "/tmp/x".to_string(),
            content: "aGk=".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""type":"write-file""#));
        assert_eq!(request.action(), "write-file");
    }

    #[test]
    fn test_compress_request_round_trip() {
        let request = ClientRequest::Compress {
            working_dir: "/srv".to_string(),
            archive_name: "backup.tar.gz".to_string(),
            items: vec!["logs".to_string(), "conf".to_string()],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""workingDir":"/srv""#));
        assert!(json.contains(r#""archiveName":"backup.tar.gz""#));

        let deserialized: ClientRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, request);
    }

    #[test]
    fn test_disconnect_request_is_bare_tag() {
        let json = r#"{"type":"disconnect"}"#;
        let request: ClientRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request, ClientRequest::Disconnect);
    }

    #[test]
    fn test_ready_event_serialization() {
        let json = serde_json::to_string(&ServerEvent::Ready).unwrap();
        assert_eq!(json, r#"{"type":"ready"}"#);
    }

    #[test]
    fn test_command_result_event_round_trip() {
        let event = ServerEvent::CommandResult(CommandResult {
            output: "hi\n".to_string(),
            error_output: String::new(),
            exit_code: Some(0),
            signal: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"command-result""#));
        assert!(json.contains(r#""exitCode":0"#));
        assert!(json.contains(r#""errorOutput":"""#));

        let deserialized: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_directory_entry_type_field_name() {
        let entry = DirectoryEntry {
            name: "logs".to_string(),
            path: "/var/logs".to_string(),
            size: 4096,
            modified: Some(1_700_000_000),
            permissions: "rwxr-xr-x".to_string(),
            owner: "root".to_string(),
            is_directory: true,
            is_symlink: false,
            is_file: false,
            kind: "directory".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains(r#""type":"directory""#));
        assert!(json.contains(r#""isDirectory":true"#));

        let deserialized: DirectoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, entry);
    }

    #[test]
    fn test_action_error_event_round_trip() {
        let event = ServerEvent::ActionError {
            action: "delete".to_string(),
            kind: "validation".to_string(),
            message: "empty path list".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"action-error""#));

        let deserialized: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_file_attributes_round_trip() {
        let attrs = FileAttributes {
            path: "/etc/hosts".to_string(),
            size: 212,
            modified: Some(1_650_000_000),
            mode: 0o100644,
            permissions: "rw-r--r--".to_string(),
            is_directory: false,
            is_file: true,
            is_symlink: false,
        };
        let event = ServerEvent::FileAttributes(attrs.clone());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"file-attributes""#));

        let deserialized: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, ServerEvent::FileAttributes(attrs));
    }
}
