//! Request routing between one connected client and its session.
//!
//! A [`ClientContext`] is the relay's view of one client: it decodes nothing
//! and owns no socket, it only maps inbound [`ClientRequest`]s onto session
//! operations and shapes results and session events into [`ServerEvent`]s on
//! the client's outbound queue.
//!
//! Each operation runs in its own task, so a slow directory listing never
//! blocks shell input and overlapping operations on one session are allowed
//! to race exactly as the remote host resolves them.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use protocol::{ClientRequest, ConnectRequest, ServerEvent, SessionError};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::config::Config;
use crate::session::connection::Credentials;
use crate::session::registry::SessionRegistry;
use crate::session::{Session, SessionEvent};

/// Per-client dispatch state.
pub struct ClientContext {
    /// Identifier the registry keys this client's session under.
    client_id: String,
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl ClientContext {
    /// Create the dispatch context for one connected client.
    pub fn new(
        client_id: String,
        registry: Arc<SessionRegistry>,
        config: Arc<Config>,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            client_id,
            registry,
            config,
            outbound,
        }
    }

    fn send(&self, event: ServerEvent) {
        let _ = self.outbound.send(event);
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.registry.get(&self.client_id)
    }

    /// Route one decoded request.
    ///
    /// Shell input and resize are forwarded inline (they are non-blocking
    /// no-ops unless the session is ready). Everything else is serviced on
    /// its own task.
    pub async fn handle(&self, request: ClientRequest) {
        match request {
            ClientRequest::Connect(connect) => self.handle_connect(connect),
            ClientRequest::Write { data } => {
                if let Some(session) = self.session() {
                    session.write(data.as_bytes());
                }
            }
            ClientRequest::Resize { cols, rows } => {
                if let Some(session) = self.session() {
                    session.resize(cols, rows);
                }
            }
            ClientRequest::Disconnect => {
                if let Some(session) = self.registry.remove(&self.client_id) {
                    session.disconnect().await;
                }
            }
            operation => self.dispatch_operation(operation),
        }
    }

    /// The relay's socket to this client went away: tear its session down.
    pub async fn client_closed(&self) {
        if let Some(session) = self.registry.remove(&self.client_id) {
            session.disconnect().await;
        }
    }

    /// Build a fresh session for this client and start connecting it.
    ///
    /// The event forwarder is subscribed before the connect begins so no
    /// event is missed; a live predecessor session is torn down by the
    /// registry before the replacement becomes visible.
    fn handle_connect(&self, connect: ConnectRequest) {
        let credentials = match Credentials::from_request(connect) {
            Ok(credentials) => credentials,
            Err(err) => {
                self.send(ServerEvent::Error {
                    message: err.to_string(),
                });
                return;
            }
        };

        let session = Session::new(self.client_id.clone());
        let registry = Arc::clone(&self.registry);
        let config = Arc::clone(&self.config);
        let outbound = self.outbound.clone();
        let client_id = self.client_id.clone();

        tokio::spawn(async move {
            let events = session.subscribe();
            spawn_event_forwarder(
                events,
                outbound,
                Arc::clone(&registry),
                client_id.clone(),
                Arc::clone(&session),
            );
            registry.replace(&client_id, Arc::clone(&session)).await;

            if let Err(err) = session.connect(credentials, &config.ssh).await {
                // The session has already emitted error and close events.
                debug!(client_id = %client_id, error = %err, "connect failed");
            }
        });
    }

    /// Service an operation request on its own task.
    fn dispatch_operation(&self, request: ClientRequest) {
        let action = request.action();
        let Some(session) = self.session() else {
            self.send(action_error(action, &SessionError::NotConnected));
            return;
        };

        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            let event = run_operation(&session, request).await;
            let _ = outbound.send(event);
        });
    }
}

/// Execute one operation request against a session and shape the outcome.
async fn run_operation(session: &Session, request: ClientRequest) -> ServerEvent {
    let action = request.action();
    let result = match request {
        ClientRequest::Execute { command } => session
            .execute(&command)
            .await
            .map(ServerEvent::CommandResult),
        ClientRequest::List { path } => session
            .list_directory(&path)
            .await
            .map(|entries| ServerEvent::DirectoryListing { path, entries }),
        ClientRequest::Stat { path } => {
            session.stat(&path).await.map(ServerEvent::FileAttributes)
        }
        ClientRequest::Rename { from, to } => session
            .rename(&from, &to)
            .await
            .map(|()| action_ok(action)),
        ClientRequest::Mkdir { path } => {
            session.mkdir(&path).await.map(|()| action_ok(action))
        }
        ClientRequest::Chmod { path, mode } => session
            .chmod(&path, &mode)
            .await
            .map(|()| action_ok(action)),
        ClientRequest::Delete { paths } => session
            .delete_many(&paths)
            .await
            .map(|()| action_ok(action)),
        ClientRequest::Move {
            sources,
            destination_dir,
        } => session
            .move_many(&sources, &destination_dir)
            .await
            .map(|()| action_ok(action)),
        ClientRequest::Copy {
            sources,
            destination_dir,
        } => session
            .copy_many(&sources, &destination_dir)
            .await
            .map(|()| action_ok(action)),
        ClientRequest::Compress {
            working_dir,
            archive_name,
            items,
        } => session
            .compress(&working_dir, &archive_name, &items)
            .await
            .map(|()| action_ok(action)),
        ClientRequest::Extract {
            working_dir,
            archives,
        } => session
            .extract(&working_dir, &archives)
            .await
            .map(|()| action_ok(action)),
        ClientRequest::Fetch { path } => {
            session.fetch_file(&path).await.map(|content| {
                ServerEvent::FileContent {
                    path,
                    content: BASE64.encode(content),
                }
            })
        }
        ClientRequest::WriteFile { path, content } => match BASE64.decode(content.as_bytes()) {
            Ok(bytes) => session
                .write_file(&path, &bytes)
                .await
                .map(|()| action_ok(action)),
            Err(err) => Err(SessionError::Validation(format!(
                "content is not valid base64: {err}"
            ))),
        },
        _ => Err(SessionError::Validation(
            "not an operation request".to_string(),
        )),
    };

    match result {
        Ok(event) => event,
        Err(err) => action_error(action, &err),
    }
}

fn action_ok(action: &str) -> ServerEvent {
    ServerEvent::ActionOk {
        action: action.to_string(),
    }
}

fn action_error(action: &str, err: &SessionError) -> ServerEvent {
    ServerEvent::ActionError {
        action: action.to_string(),
        kind: err.kind().to_string(),
        message: err.to_string(),
    }
}

/// Forward one session's events to the client until the session closes.
///
/// On `Closed` the registry entry is released, but only if it still holds
/// this exact session; a replacement that already took the slot stays.
fn spawn_event_forwarder(
    mut events: broadcast::Receiver<SessionEvent>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    registry: Arc<SessionRegistry>,
    client_id: String,
    session: Arc<Session>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Ready) => {
                    let _ = outbound.send(ServerEvent::Ready);
                }
                Ok(SessionEvent::Data(data)) => {
                    let _ = outbound.send(ServerEvent::Data {
                        data: String::from_utf8_lossy(&data).into_owned(),
                    });
                }
                Ok(SessionEvent::Error(message)) => {
                    let _ = outbound.send(ServerEvent::Error { message });
                }
                Ok(SessionEvent::Closed) => {
                    let _ = outbound.send(ServerEvent::Close);
                    registry.remove_exact(&client_id, &session);
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        client_id = %client_id,
                        skipped,
                        "client event stream lagged"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn context() -> (ClientContext, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = ClientContext::new(
            "client-1".to_string(),
            Arc::new(SessionRegistry::new()),
            Arc::new(Config::default()),
            tx,
        );
        (ctx, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("outbound channel closed")
    }

    fn connect_request(password: Option<&str>) -> ConnectRequest {
        ConnectRequest {
            host: "example.com".to_string(),
            port: None,
            username: "deploy".to_string(),
            password: password.map(str::to_string),
            private_key: None,
            passphrase: None,
        }
    }

    #[tokio::test]
    async fn test_operation_without_session_is_not_connected() {
        let (ctx, mut rx) = context();
        ctx.handle(ClientRequest::List {
            path: "/".to_string(),
        })
        .await;

        match next_event(&mut rx).await {
            ServerEvent::ActionError { action, kind, .. } => {
                assert_eq!(action, "list");
                assert_eq!(kind, "not-connected");
            }
            other => panic!("expected action-error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_without_credentials_is_a_validation_error() {
        let (ctx, mut rx) = context();
        ctx.handle(ClientRequest::Connect(connect_request(None)))
            .await;

        match next_event(&mut rx).await {
            ServerEvent::Error { message } => {
                assert!(message.contains("validation failed"), "{message}");
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_without_session_is_silent() {
        let (ctx, mut rx) = context();
        ctx.handle(ClientRequest::Write {
            data: "ls\n".to_string(),
        })
        .await;
        ctx.handle(ClientRequest::Resize { cols: 80, rows: 24 })
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_silent() {
        let (ctx, mut rx) = context();
        ctx.handle(ClientRequest::Disconnect).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_operation_on_idle_session_fails_fast() {
        let (ctx, mut rx) = context();
        // A session that never connected: every operation must be rejected
        // without touching the network.
        ctx.registry
            .replace("client-1", Session::new("client-1"))
            .await;

        ctx.handle(ClientRequest::Delete {
            paths: vec!["/tmp/x".to_string()],
        })
        .await;

        match next_event(&mut rx).await {
            ServerEvent::ActionError { action, kind, .. } => {
                assert_eq!(action, "delete");
                assert_eq!(kind, "not-connected");
            }
            other => panic!("expected action-error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_file_with_bad_base64_is_a_validation_error() {
        let (ctx, mut rx) = context();
        ctx.registry
            .replace("client-1", Session::new("client-1"))
            .await;

        ctx.handle(ClientRequest::WriteFile {
            path: "/tmp/x".to_string(),
            content: "not base64!!".to_string(),
        })
        .await;

        match next_event(&mut rx).await {
            ServerEvent::ActionError { action, kind, .. } => {
                assert_eq!(action, "write-file");
                assert_eq!(kind, "validation");
            }
            other => panic!("expected action-error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_closed_tears_session_down() {
        let (ctx, _rx) = context();
        let session = Session::new("client-1");
        ctx.registry
            .replace("client-1", Arc::clone(&session))
            .await;

        ctx.client_closed().await;

        assert_eq!(ctx.registry.count(), 0);
        assert_eq!(session.state(), crate::session::SessionState::Closed);
    }
}
