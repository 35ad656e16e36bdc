//! # Gangway Daemon Library
//!
//! This crate provides the daemon (server) functionality for Gangway,
//! letting thin clients drive remote machines over SSH.
//!
//! ## Overview
//!
//! The daemon accepts WebSocket clients and, for each one, manages a single
//! authenticated SSH session to a remote host of the client's choosing:
//!
//! - **Interactive Shell**: a PTY-backed shell channel streamed to the client
//! - **Command Execution**: one-off commands with separated output and exit status
//! - **File Management**: list, inspect, create, rename, delete, move, copy,
//!   archive, extract, read and write against the remote filesystem
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Relay (WebSocket)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     Router (per client)                     │
//! ├───────────────┬─────────────────────────────────────────────┤
//! │   Session     │          Session Registry                   │
//! │  ┌─────────┐  │                                             │
//! │  │  Shell  │  │   client id → at most one live session      │
//! │  │  Exec   │  │                                             │
//! │  │  SFTP   │  │                                             │
//! │  └─────────┘  │                                             │
//! ├───────────────┴─────────────────────────────────────────────┤
//! │             SSH transport (russh / russh-sftp)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: configuration loading and defaults
//! - [`session`]: session lifecycle, SSH connection, registry
//! - [`fs`]: path canonicalization, attribute translation, remote operations
//! - [`router`]: request dispatch and event forwarding per client
//! - [`relay`]: the WebSocket listener

pub mod config;
pub mod fs;
pub mod relay;
pub mod router;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export session types for convenience
pub use session::connection::{AuthMethod, Credentials, SshConnection};
pub use session::registry::SessionRegistry;
pub use session::{Session, SessionEvent, SessionState};

// Re-export relay types for convenience
pub use relay::Relay;
pub use router::ClientContext;

// Re-export filesystem types for convenience
pub use fs::{normalize_path, permission_string, RemoteFs};
