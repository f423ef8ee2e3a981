use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Role;

/// SessionData
///
/// What the server remembers about a logged-in user. The session carries
/// only the username and role.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub nombre: String,
    pub rol: Role,
    pub expires_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(nombre: impl Into<String>, rol: Role, ttl: Duration) -> Self {
        Self {
            nombre: nombre.into(),
            rol,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// SessionStore
///
/// Server-side session registry. Tokens handed to clients only name a session;
/// revoking it here invalidates the token immediately.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Registers a session and returns its fresh identifier.
    async fn create(&self, data: SessionData) -> Uuid;

    /// Live session for `id`, or `None` if unknown, revoked or expired.
    async fn get(&self, id: Uuid) -> Option<SessionData>;

    /// Returns true if a session was removed.
    async fn revoke(&self, id: Uuid) -> bool;

    /// Removes every session opened by `nombre` and returns how many there were.
    async fn revoke_user(&self, nombre: &str) -> usize;
}

/// SessionState
///
/// Shared handle to the session store used across the application state.
pub type SessionState = Arc<dyn SessionStore>;

/// MemorySessionStore
///
/// In-process store. Sessions do not survive a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, data: SessionData) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        // Purge on write so abandoned sessions cannot pile up.
        sessions.retain(|_, s| !s.is_expired(now));
        sessions.insert(id, data);
        id
    }

    async fn get(&self, id: Uuid) -> Option<SessionData> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                Some(s) if !s.is_expired(now) => return Some(s.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().await.remove(&id);
        None
    }

    async fn revoke(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    async fn revoke_user(&self, nombre: &str) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.nombre != nombre);
        before - sessions.len()
    }
}
