use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::handlers::ws::ServerEvent;

/// Outbound half of one live WebSocket session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl SessionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            sender,
        }
    }

    /// Queues an event for the session's writer task. Returns false once the
    /// session has gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Which session, if any, each user is currently connected through.
/// One entry per user; a new connection replaces the previous one.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session this one displaced, if any.
    pub async fn register(&self, user_id: Uuid, handle: SessionHandle) -> Option<SessionHandle> {
        self.sessions.write().await.insert(user_id, handle)
    }

    pub async fn unregister(&self, user_id: Uuid) -> Option<SessionHandle> {
        self.sessions.write().await.remove(&user_id)
    }

    /// Removes the entry only while it still belongs to `session_id`, so a
    /// superseded session closing late cannot evict its replacement.
    pub async fn unregister_session(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&user_id) {
            Some(current) if current.session_id == session_id => {
                sessions.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&user_id).cloned()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
