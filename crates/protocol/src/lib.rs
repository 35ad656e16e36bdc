//! # Gangway Protocol Library
//!
//! This crate defines the wire contract between the Gangway daemon and its
//! clients.
//!
//! ## Overview
//!
//! Everything a client and the daemon agree on lives here:
//!
//! - **Message Definitions**: [`ClientRequest`] / [`ServerEvent`] JSON frames
//!   for session control, the interactive shell, and file management
//! - **Attribute Records**: [`DirectoryEntry`] and [`FileAttributes`], the
//!   stable shapes every listing and stat resolves to
//! - **Error Taxonomy**: [`SessionError`], the typed failure surface every
//!   operation resolves to
//!
//! The crate is transport-agnostic: it knows nothing about WebSockets or
//! SSH, only about the JSON shapes that cross the relay boundary.
//!
//! ## Modules
//!
//! - [`messages`]: request and event definitions
//! - [`error`]: error types

pub mod error;
pub mod messages;

pub use error::{Result, SessionError};
pub use messages::{
    ClientRequest, CommandResult, ConnectRequest, DirectoryEntry, FileAttributes, ServerEvent,
    DEFAULT_SSH_PORT,
};
