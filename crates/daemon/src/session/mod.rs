//! Remote session management.
//!
//! A [`Session`] couples one client to one authenticated SSH connection and
//! everything derived from it: the interactive shell channel, one-shot
//! command execution, and the remote filesystem operations. It is the unit
//! of concurrency and teardown: distinct sessions share nothing, and all
//! teardown paths (explicit disconnect, transport error, transport end)
//! converge on one idempotent routine.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use protocol::{CommandResult, DirectoryEntry, FileAttributes, SessionError};
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::sync::{broadcast, mpsc, OnceCell};

pub mod connection;
pub mod registry;

use crate::config::SshConfig;
use crate::fs::RemoteFs;
use connection::{Credentials, SshConnection};

/// PTY geometry used until the client sends its first resize.
const DEFAULT_COLS: u32 = 80;
const DEFAULT_ROWS: u32 = 24;

/// Capacity of the per-session event broadcast.
const EVENT_CAPACITY: usize = 256;

/// Lifecycle states of a session.
///
/// `Error` and `Closed` are both terminal; a session is never reused, a new
/// connect request creates a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Created, no connect request yet.
    Idle = 0,
    /// Transport establishment and authentication in progress.
    Connecting = 1,
    /// Connection authenticated and shell channel open.
    Ready = 2,
    /// Failed while connecting or from a fatal channel error.
    Error = 3,
    /// Torn down.
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Ready,
            3 => SessionState::Error,
            _ => SessionState::Closed,
        }
    }

    /// Whether the state can never be left again.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Error | SessionState::Closed)
    }
}

/// Events a session broadcasts to its subscribers.
///
/// Delivery is ordered per session; every subscriber sees the same
/// sequence. `Closed` is always the final event.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The session reached ready.
    Ready,
    /// A chunk of interactive shell output (stdout and stderr merged, the
    /// way a terminal displays them).
    Data(Bytes),
    /// The session failed. Followed by `Closed`.
    Error(String),
    /// The session is gone.
    Closed,
}

/// Commands for the shell pump task.
enum ShellCommand {
    Write(Bytes),
    Resize { cols: u32, rows: u32 },
}

/// One client's remote session.
pub struct Session {
    /// The owning client's identifier.
    id: String,
    state: AtomicU8,
    events: broadcast::Sender<SessionEvent>,
    conn: OnceCell<Arc<SshConnection>>,
    shell: OnceCell<mpsc::UnboundedSender<ShellCommand>>,
    torn_down: AtomicBool,
}

impl Session {
    /// Create a new idle session for a client.
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            id: id.into(),
            state: AtomicU8::new(SessionState::Idle as u8),
            events,
            conn: OnceCell::new(),
            shell: OnceCell::new(),
            torn_down: AtomicBool::new(false),
        })
    }

    /// The owning client's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Whether the session is ready for operations.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Subscribe to the session's event stream.
    ///
    /// Any number of independent subscribers may attach; each receives the
    /// session's events in order.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Establish the connection and open the interactive shell.
    ///
    /// On success the session is `Ready` and has emitted
    /// [`SessionEvent::Ready`]. On failure it is terminal: the error is
    /// emitted as an event, teardown has run, and the error is also
    /// returned to the caller.
    pub async fn connect(
        self: &Arc<Self>,
        credentials: Credentials,
        config: &SshConfig,
    ) -> Result<(), SessionError> {
        if self.state() != SessionState::Idle {
            return Err(SessionError::Validation(
                "session already connected; open a new session instead".to_string(),
            ));
        }
        self.set_state(SessionState::Connecting);

        let conn = match SshConnection::connect(&credentials, config).await {
            Ok(conn) => Arc::new(conn),
            Err(err) => {
                self.fail(err.to_string()).await;
                return Err(err);
            }
        };
        // Stored before the shell attempt so teardown can reach it.
        let _ = self.conn.set(Arc::clone(&conn));

        let channel = match conn.open_shell(DEFAULT_COLS, DEFAULT_ROWS).await {
            Ok(channel) => channel,
            Err(err) => {
                self.fail(err.to_string()).await;
                return Err(err);
            }
        };

        let (shell_tx, shell_rx) = mpsc::unbounded_channel();
        let _ = self.shell.set(shell_tx);
        self.spawn_shell_pump(channel, shell_rx);

        self.set_state(SessionState::Ready);
        let _ = self.events.send(SessionEvent::Ready);
        tracing::info!(session_id = %self.id, "session ready");
        Ok(())
    }

    /// Drive the shell channel: remote output becomes `Data` events, queued
    /// writes and resizes go out, and channel close triggers teardown.
    fn spawn_shell_pump(
        self: &Arc<Self>,
        mut channel: Channel<Msg>,
        mut commands: mpsc::UnboundedReceiver<ShellCommand>,
    ) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = channel.wait() => match msg {
                        Some(ChannelMsg::Data { data }) => {
                            let _ = session
                                .events
                                .send(SessionEvent::Data(Bytes::copy_from_slice(&data)));
                        }
                        Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                            let _ = session
                                .events
                                .send(SessionEvent::Data(Bytes::copy_from_slice(&data)));
                        }
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                        Some(_) => {}
                    },
                    cmd = commands.recv() => match cmd {
                        Some(ShellCommand::Write(data)) => {
                            if channel.data(&data[..]).await.is_err() {
                                break;
                            }
                        }
                        Some(ShellCommand::Resize { cols, rows }) => {
                            let _ = channel.window_change(cols, rows, 0, 0).await;
                        }
                        // All senders dropped: teardown is already running.
                        None => break,
                    },
                }
            }
            tracing::debug!(session_id = %session.id, "shell channel closed");
            session.teardown(SessionState::Closed).await;
        });
    }

    /// Forward bytes to the interactive shell.
    ///
    /// A no-op unless the session is ready; never raises.
    pub fn write(&self, data: &[u8]) {
        if !self.is_ready() {
            return;
        }
        if let Some(shell) = self.shell.get() {
            let _ = shell.send(ShellCommand::Write(Bytes::copy_from_slice(data)));
        }
    }

    /// Adjust the shell's terminal window. Same guard as [`Session::write`].
    pub fn resize(&self, cols: u32, rows: u32) {
        if !self.is_ready() {
            return;
        }
        if let Some(shell) = self.shell.get() {
            let _ = shell.send(ShellCommand::Resize { cols, rows });
        }
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn connection(&self) -> Result<&Arc<SshConnection>, SessionError> {
        self.ensure_ready()?;
        self.conn.get().ok_or(SessionError::NotConnected)
    }

    /// The remote filesystem operations for this session.
    fn fs(&self) -> Result<RemoteFs, SessionError> {
        Ok(RemoteFs::new(Arc::clone(self.connection()?)))
    }

    /// Run a one-off command to completion.
    ///
    /// Rejected immediately with [`SessionError::NotConnected`] unless the
    /// session is ready; a non-zero exit code is a result, not an error.
    pub async fn execute(&self, command: &str) -> Result<CommandResult, SessionError> {
        self.connection()?.execute(command).await
    }

    /// See [`RemoteFs::stat`].
    pub async fn stat(&self, path: &str) -> Result<FileAttributes, SessionError> {
        self.fs()?.stat(path).await
    }

    /// See [`RemoteFs::list_directory`].
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, SessionError> {
        self.fs()?.list_directory(path).await
    }

    /// See [`RemoteFs::rename`].
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError> {
        self.fs()?.rename(from, to).await
    }

    /// See [`RemoteFs::mkdir`].
    pub async fn mkdir(&self, path: &str) -> Result<(), SessionError> {
        self.fs()?.mkdir(path).await
    }

    /// See [`RemoteFs::chmod`].
    pub async fn chmod(&self, path: &str, mode: &str) -> Result<(), SessionError> {
        self.fs()?.chmod(path, mode).await
    }

    /// See [`RemoteFs::delete_many`].
    pub async fn delete_many(&self, paths: &[String]) -> Result<(), SessionError> {
        self.fs()?.delete_many(paths).await
    }

    /// See [`RemoteFs::move_many`].
    pub async fn move_many(
        &self,
        sources: &[String],
        destination_dir: &str,
    ) -> Result<(), SessionError> {
        self.fs()?.move_many(sources, destination_dir).await
    }

    /// See [`RemoteFs::copy_many`].
    pub async fn copy_many(
        &self,
        sources: &[String],
        destination_dir: &str,
    ) -> Result<(), SessionError> {
        self.fs()?.copy_many(sources, destination_dir).await
    }

    /// See [`RemoteFs::compress`].
    pub async fn compress(
        &self,
        working_dir: &str,
        archive_name: &str,
        items: &[String],
    ) -> Result<(), SessionError> {
        self.fs()?.compress(working_dir, archive_name, items).await
    }

    /// See [`RemoteFs::extract`].
    pub async fn extract(
        &self,
        working_dir: &str,
        archives: &[String],
    ) -> Result<(), SessionError> {
        self.fs()?.extract(working_dir, archives).await
    }

    /// See [`RemoteFs::fetch_file`].
    pub async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, SessionError> {
        self.fs()?.fetch_file(path).await
    }

    /// See [`RemoteFs::write_file`].
    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), SessionError> {
        self.fs()?.write_file(path, content).await
    }

    /// Emit an error event and tear down into the `Error` state.
    async fn fail(&self, message: String) {
        tracing::warn!(session_id = %self.id, error = %message, "session failed");
        let _ = self.events.send(SessionEvent::Error(message));
        self.teardown(SessionState::Error).await;
    }

    /// Tear the session down. Runs at most once; later calls are no-ops.
    ///
    /// All paths end here: explicit disconnect, a failed connect, and the
    /// shell pump observing transport or channel close. In-flight
    /// operations resolve with failures as their channels die.
    async fn teardown(&self, terminal: SessionState) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(terminal);
        if let Some(conn) = self.conn.get() {
            conn.disconnect().await;
        }
        let _ = self.events.send(SessionEvent::Closed);
        tracing::info!(session_id = %self.id, state = ?terminal, "session torn down");
    }

    /// Tear the session down into `Closed`. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        self.teardown(SessionState::Closed).await;
    }
}
