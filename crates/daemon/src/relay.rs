//! WebSocket relay between clients and their sessions.
//!
//! The relay owns the listening socket. Each accepted client gets a fresh
//! identifier, an outbound event queue with a single writer task, and a
//! [`ClientContext`] that maps its JSON frames onto session operations.
//! When a client's socket goes away, its session is torn down with it.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use protocol::{ClientRequest, ServerEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::router::ClientContext;
use crate::session::registry::SessionRegistry;

/// Errors that can occur while serving one client socket.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// WebSocket handshake or transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The daemon's client-facing server.
pub struct Relay {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl Relay {
    /// Create a relay with an empty session registry.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            config,
        }
    }

    /// The registry of live sessions, shared with the shutdown path.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Accept clients forever.
    ///
    /// Runs until the surrounding task is dropped (the caller races this
    /// against the shutdown signal); individual client failures are logged
    /// and never stop the accept loop.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let relay = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(err) = relay.handle_client(stream, addr).await {
                            debug!(%addr, error = %err, "client connection ended with error");
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "failed to accept client connection");
                }
            }
        }
    }

    /// Serve one client socket to completion.
    async fn handle_client(&self, stream: TcpStream, addr: SocketAddr) -> Result<(), RelayError> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let client_id = Uuid::new_v4().to_string();
        info!(client_id = %client_id, %addr, "client connected");

        let (mut sink, mut source) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

        // Single writer task: everything outbound funnels through one queue
        // so concurrent operations never interleave frames.
        tokio::spawn(async move {
            while let Some(event) = out_rx.recv().await {
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(error = %err, "failed to encode outbound event");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let context = ClientContext::new(
            client_id.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
            out_tx.clone(),
        );

        while let Some(msg) = source.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientRequest>(&text) {
                    Ok(request) => context.handle(request).await,
                    Err(err) => {
                        debug!(client_id = %client_id, error = %err, "malformed request frame");
                        let _ = out_tx.send(ServerEvent::Error {
                            message: format!("malformed request: {err}"),
                        });
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    debug!(client_id = %client_id, error = %err, "client socket error");
                    break;
                }
            }
        }

        context.client_closed().await;
        info!(client_id = %client_id, "client disconnected");
        Ok(())
    }
}
