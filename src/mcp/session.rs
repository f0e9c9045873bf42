use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::server::ProtocolState;
use super::types::ClientInfo;

/// A server-side MCP session created by `initialize` over HTTP.
#[derive(Debug, Clone)]
pub struct ServerSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub state: ProtocolState,
    last_activity: Instant,
}

impl ServerSession {
    fn is_expired(&self, idle_timeout: Duration, now: Instant) -> bool {
        now.duration_since(self.last_activity) >= idle_timeout
    }
}

/// Live sessions keyed by id, expired after an idle period.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, ServerSession>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Allocate a fresh session id with an empty protocol state.
    pub async fn create(&self) -> ServerSession {
        let id = Uuid::new_v4().to_string();
        let session = ServerSession {
            id: id.clone(),
            created_at: Utc::now(),
            state: ProtocolState {
                session_id: Some(id.clone()),
                ..Default::default()
            },
            last_activity: Instant::now(),
        };

        self.sessions.write().await.insert(id.clone(), session.clone());
        info!(session_id = %id, "session created");
        session
    }

    /// Look up a session and mark it active. Expired sessions are removed and
    /// reported as missing.
    pub async fn touch(&self, id: &str) -> Option<ServerSession> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();

        let expired = sessions.get(id)?.is_expired(self.idle_timeout, now);
        if expired {
            sessions.remove(id);
            info!(session_id = %id, "session expired");
            return None;
        }

        let session = sessions.get_mut(id)?;
        session.last_activity = now;
        Some(session.clone())
    }

    /// Record the client that initialized the session. Returns false if the
    /// session disappeared in the meantime.
    pub async fn record_client(&self, id: &str, client: ClientInfo) -> bool {
        self.modify(id, |state| state.client = Some(client)).await
    }

    /// Flag the session as initialized. The flag is only ever set, so a
    /// request that started earlier cannot clear it.
    pub async fn mark_initialized(&self, id: &str) -> bool {
        self.modify(id, |state| state.initialized = true).await
    }

    async fn modify(&self, id: &str, change: impl FnOnce(&mut ProtocolState)) -> bool {
        match self.sessions.write().await.get_mut(id) {
            Some(session) => {
                change(&mut session.state);
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session_id = %id, "session closed");
        }
        removed
    }

    /// Drop every session idle longer than the timeout.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.idle_timeout, now));

        let expired = before - sessions.len();
        if expired > 0 {
            info!(expired, remaining = sessions.len(), "expired idle sessions");
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Run [`SessionStore::sweep`] periodically until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let expired = self.sweep().await;
                debug!(expired, "session sweep");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_touch() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.create().await;

        assert_eq!(session.state.session_id.as_deref(), Some(session.id.as_str()));
        assert!(!session.state.initialized);

        let found = store.touch(&session.id).await.unwrap();
        assert_eq!(found.id, session.id);
        assert!(store.touch("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_mark_initialized_and_record_client() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.create().await;

        assert!(store.mark_initialized(&session.id).await);
        assert!(
            store
                .record_client(
                    &session.id,
                    ClientInfo {
                        name: "test".to_string(),
                        version: "1.0".to_string(),
                    },
                )
                .await
        );

        let state = store.touch(&session.id).await.unwrap().state;
        assert!(state.initialized);
        assert_eq!(state.client.unwrap().name, "test");

        assert!(!store.mark_initialized("gone").await);
    }

    #[tokio::test]
    async fn test_stale_snapshot_cannot_clear_initialized() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.create().await;

        // Snapshot taken by a request still in flight
        let before = store.touch(&session.id).await.unwrap();
        store.mark_initialized(&session.id).await;

        // Recording the client afterwards leaves the flag alone
        let client = ClientInfo {
            name: "late".to_string(),
            version: "0".to_string(),
        };
        store.record_client(&session.id, client).await;

        assert!(!before.state.initialized);
        assert!(store.touch(&session.id).await.unwrap().state.initialized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_expires_lazily() {
        let store = SessionStore::new(Duration::from_secs(30));
        let session = store.create().await;

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(store.touch(&session.id).await.is_some());

        // Activity resets the idle clock
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(store.touch(&session.id).await.is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(store.touch(&session.id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_idle_sessions() {
        let store = SessionStore::new(Duration::from_secs(30));
        let idle = store.create().await;
        tokio::time::advance(Duration::from_secs(25)).await;
        let fresh = store.create().await;
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.touch(&idle.id).await.is_none());
        assert!(store.touch(&fresh.id).await.is_some());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.create().await;
        assert!(store.remove(&session.id).await);
        assert!(!store.remove(&session.id).await);
    }
}
