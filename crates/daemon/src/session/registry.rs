//! Process-wide mapping from client identifier to live session.
//!
//! The registry is the only state shared across sessions. Its invariant:
//! at most one live session per client identifier at any time. A second
//! connect request for an identifier that already has a live entry tears
//! the prior session down to completion before the replacement is inserted.

use std::sync::Arc;

use dashmap::DashMap;

use super::Session;

/// Thread-safe registry of live sessions, keyed by client identifier.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Insert a session for a client, replacing any live predecessor.
    ///
    /// The predecessor's teardown runs to completion before the new entry
    /// becomes visible, so the one-live-session invariant holds at every
    /// observable instant.
    pub async fn replace(&self, client_id: &str, session: Arc<Session>) {
        if let Some((_, previous)) = self.sessions.remove(client_id) {
            tracing::info!(client_id = %client_id, "replacing live session");
            previous.disconnect().await;
        }
        self.sessions.insert(client_id.to_string(), session);
    }

    /// The live session for a client, if any.
    pub fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(client_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and return a client's session without tearing it down.
    pub fn remove(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(client_id).map(|(_, session)| session)
    }

    /// Remove a client's entry only if it still holds this exact session.
    ///
    /// Event forwarders use this when a session reports `Closed`: by then a
    /// replacement may already occupy the slot, and that replacement must
    /// not be evicted.
    pub fn remove_exact(&self, client_id: &str, session: &Arc<Session>) -> bool {
        self.sessions
            .remove_if(client_id, |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Tear down every live session and empty the registry.
    ///
    /// Used on process shutdown.
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.disconnect().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[tokio::test]
    async fn test_replace_and_get() {
        let registry = SessionRegistry::new();
        let session = Session::new("c1");

        registry.replace("c1", Arc::clone(&session)).await;
        assert_eq!(registry.count(), 1);

        let found = registry.get("c1").unwrap();
        assert!(Arc::ptr_eq(&found, &session));
        assert!(registry.get("c2").is_none());
    }

    #[tokio::test]
    async fn test_replace_tears_down_predecessor_first() {
        let registry = SessionRegistry::new();
        let first = Session::new("c1");
        let second = Session::new("c1");

        registry.replace("c1", Arc::clone(&first)).await;
        registry.replace("c1", Arc::clone(&second)).await;

        // Invariant: one entry, and the predecessor is fully closed.
        assert_eq!(registry.count(), 1);
        assert_eq!(first.state(), SessionState::Closed);
        assert!(Arc::ptr_eq(&registry.get("c1").unwrap(), &second));
    }

    #[tokio::test]
    async fn test_remove_exact_spares_a_replacement() {
        let registry = SessionRegistry::new();
        let old = Session::new("c1");
        let new = Session::new("c1");

        registry.replace("c1", Arc::clone(&new)).await;

        // A stale forwarder for `old` must not evict `new`.
        assert!(!registry.remove_exact("c1", &old));
        assert_eq!(registry.count(), 1);

        assert!(registry.remove_exact("c1", &new));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_all_closes_every_session() {
        let registry = SessionRegistry::new();
        let a = Session::new("a");
        let b = Session::new("b");
        registry.replace("a", Arc::clone(&a)).await;
        registry.replace("b", Arc::clone(&b)).await;

        registry.shutdown_all().await;

        assert_eq!(registry.count(), 0);
        assert_eq!(a.state(), SessionState::Closed);
        assert_eq!(b.state(), SessionState::Closed);
    }
}
