//! The authenticated SSH connection owned by a session.
//!
//! One [`SshConnection`] wraps one `russh` client handle and exposes the
//! three channel primitives the rest of the daemon is built on: the
//! interactive shell channel, one-shot execution channels, and the cached
//! SFTP subsystem channel. Transport keep-alive and teardown live here too.
//!
//! No reconnection is attempted at this layer: when the transport dies the
//! connection is finished and the owning session must be replaced by a
//! fresh connect request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use protocol::{CommandResult, ConnectRequest, SessionError, DEFAULT_SSH_PORT};
use russh::client::{self, Handle, Handler, Msg};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::{decode_secret_key, PublicKey};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::config::SshConfig;

/// Terminal type requested for the interactive shell.
const SHELL_TERM: &str = "xterm-256color";

/// Upper bound on a graceful disconnect, so a dead peer cannot hang teardown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How a remote host is authenticated. Exactly one method is ever in effect.
#[derive(Clone)]
pub enum AuthMethod {
    /// Password authentication.
    Password(String),
    /// Private key authentication.
    PrivateKey {
        /// PEM-encoded key material.
        key: String,
        /// Passphrase for encrypted keys.
        passphrase: Option<String>,
    },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never echo secrets into logs.
        match self {
            AuthMethod::Password(_) => f.write_str("AuthMethod::Password"),
            AuthMethod::PrivateKey { .. } => f.write_str("AuthMethod::PrivateKey"),
        }
    }
}

/// Resolved credentials for one connect request.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Login user name.
    pub username: String,
    /// The single authentication method in effect.
    pub auth: AuthMethod,
}

impl Credentials {
    /// Resolve a wire-level connect payload into effective credentials.
    ///
    /// Key material, when present and non-empty, takes precedence and the
    /// password is discarded. A payload with neither is a validation
    /// failure before any network activity.
    pub fn from_request(request: ConnectRequest) -> Result<Self, SessionError> {
        if request.host.is_empty() {
            return Err(SessionError::Validation("host must not be empty".to_string()));
        }
        if request.username.is_empty() {
            return Err(SessionError::Validation(
                "username must not be empty".to_string(),
            ));
        }

        let auth = match request.private_key.filter(|k| !k.is_empty()) {
            Some(key) => AuthMethod::PrivateKey {
                key,
                passphrase: request.passphrase,
            },
            None => match request.password.filter(|p| !p.is_empty()) {
                Some(password) => AuthMethod::Password(password),
                None => {
                    return Err(SessionError::Validation(
                        "either a password or a private key is required".to_string(),
                    ))
                }
            },
        };

        Ok(Self {
            host: request.host,
            port: request.port.unwrap_or(DEFAULT_SSH_PORT),
            username: request.username,
            auth,
        })
    }
}

/// Client-side transport event handler.
///
/// Host keys are accepted as presented; clients of this daemon connect to
/// hosts they name themselves and no pinning store exists at this layer.
struct ClientHandler;

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One authenticated transport to one remote host.
///
/// Owned exclusively by its session and never shared across sessions. The
/// SFTP subsystem channel is opened at most once and cached; execution
/// channels are opened per call and are independent of each other.
pub struct SshConnection {
    handle: Handle<ClientHandler>,
    sftp: OnceCell<SftpSession>,
    closed: AtomicBool,
}

impl SshConnection {
    /// Open and authenticate a transport to the host in `credentials`.
    ///
    /// The whole establishment (TCP, key exchange, authentication) is
    /// bounded by the configured connect timeout. Keep-alive probes run for
    /// the life of the transport; after the configured number of missed
    /// probes the transport is treated as failed and every channel on it
    /// errors out.
    pub async fn connect(
        credentials: &Credentials,
        config: &SshConfig,
    ) -> Result<Self, SessionError> {
        let ssh_config = Arc::new(client::Config {
            keepalive_interval: Some(Duration::from_secs(config.keepalive_interval_secs)),
            keepalive_max: config.keepalive_count_max,
            ..Default::default()
        });

        let addr = format!("{}:{}", credentials.host, credentials.port);
        tracing::info!(
            host = %credentials.host,
            port = credentials.port,
            username = %credentials.username,
            "opening ssh transport"
        );

        let mut handle = timeout(
            Duration::from_secs(config.connect_timeout_secs),
            client::connect(ssh_config, &addr, ClientHandler),
        )
        .await
        .map_err(|_| {
            SessionError::Connection(format!(
                "connection to {addr} timed out after {}s",
                config.connect_timeout_secs
            ))
        })?
        .map_err(|e| SessionError::Connection(e.to_string()))?;

        Self::authenticate(&mut handle, credentials).await?;

        tracing::info!(host = %credentials.host, "ssh transport ready");

        Ok(Self {
            handle,
            sftp: OnceCell::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Authenticate using the single method carried by the credentials.
    async fn authenticate(
        handle: &mut Handle<ClientHandler>,
        credentials: &Credentials,
    ) -> Result<(), SessionError> {
        let accepted = match &credentials.auth {
            AuthMethod::Password(password) => handle
                .authenticate_password(&credentials.username, password)
                .await
                .map_err(|e| SessionError::Connection(e.to_string()))?
                .success(),
            AuthMethod::PrivateKey { key, passphrase } => {
                let secret = decode_secret_key(key, passphrase.as_deref())
                    .map_err(|e| SessionError::Connection(format!("invalid private key: {e}")))?;
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .ok()
                    .flatten()
                    .flatten();
                handle
                    .authenticate_publickey(
                        &credentials.username,
                        PrivateKeyWithHashAlg::new(Arc::new(secret), hash_alg),
                    )
                    .await
                    .map_err(|e| SessionError::Connection(e.to_string()))?
                    .success()
            }
        };

        if !accepted {
            tracing::warn!(
                host = %credentials.host,
                username = %credentials.username,
                "authentication rejected"
            );
            return Err(SessionError::Connection(format!(
                "authentication rejected for {}@{}",
                credentials.username, credentials.host
            )));
        }
        Ok(())
    }

    /// Open the interactive shell channel with a PTY of the given size.
    pub async fn open_shell(&self, cols: u32, rows: u32) -> Result<Channel<Msg>, SessionError> {
        let shell_err = |reason: String| SessionError::Channel {
            channel: "shell",
            reason,
        };

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| shell_err(e.to_string()))?;
        channel
            .request_pty(true, SHELL_TERM, cols, rows, 0, 0, &[])
            .await
            .map_err(|e| shell_err(e.to_string()))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| shell_err(e.to_string()))?;

        Ok(channel)
    }

    /// Run one command to completion on a dedicated execution channel.
    ///
    /// Standard output and standard error are collected separately; the
    /// result resolves once the remote process ends, carrying its exit code
    /// or terminating signal. A non-zero exit code is a result, not an
    /// error. Concurrent executions on the same connection are independent.
    pub async fn execute(&self, command: &str) -> Result<CommandResult, SessionError> {
        if self.is_closed() {
            return Err(SessionError::NotConnected);
        }

        let exec_err = |reason: String| SessionError::Channel {
            channel: "exec",
            reason,
        };

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| exec_err(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| exec_err(e.to_string()))?;

        let mut output = Vec::new();
        let mut error_output = Vec::new();
        let mut exit_code = None;
        let mut signal = None;

        // ExitStatus may arrive before or after Eof; drain until the
        // channel fully closes.
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == 1 => {
                    error_output.extend_from_slice(&data);
                }
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    signal = Some(format!("{signal_name:?}"));
                }
                _ => {}
            }
        }

        Ok(CommandResult {
            output: String::from_utf8_lossy(&output).into_owned(),
            error_output: String::from_utf8_lossy(&error_output).into_owned(),
            exit_code,
            signal,
        })
    }

    /// The SFTP subsystem channel, opened on first use and cached for the
    /// connection's lifetime.
    ///
    /// Fails with [`SessionError::NotConnected`] once the connection is
    /// closed rather than blocking on a dead transport. The returned
    /// session multiplexes concurrent requests, so callers never serialize
    /// around it.
    pub async fn sftp(&self) -> Result<&SftpSession, SessionError> {
        if self.is_closed() {
            return Err(SessionError::NotConnected);
        }

        self.sftp
            .get_or_try_init(|| async {
                let sftp_err = |reason: String| SessionError::Channel {
                    channel: "sftp",
                    reason,
                };

                let channel = self
                    .handle
                    .channel_open_session()
                    .await
                    .map_err(|e| sftp_err(e.to_string()))?;
                channel
                    .request_subsystem(true, "sftp")
                    .await
                    .map_err(|e| sftp_err(e.to_string()))?;

                tracing::debug!("sftp subsystem channel opened");

                SftpSession::new(channel.into_stream())
                    .await
                    .map_err(|e| sftp_err(e.to_string()))
            })
            .await
    }

    /// Whether [`SshConnection::disconnect`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Request graceful shutdown of the transport. Idempotent.
    ///
    /// Channels on the transport (shell, sftp, in-flight executions) error
    /// out as the transport goes away; their owners observe that, this
    /// method does not chase them individually.
    pub async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!("disconnecting ssh transport");
        let _ = timeout(
            DISCONNECT_TIMEOUT,
            self.handle.disconnect(Disconnect::ByApplication, "", "en"),
        )
        .await;
    }
}
