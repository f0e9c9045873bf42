use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{McpError, McpResult};
use crate::mcp::types::JsonRpcRequest;

use super::transport::{HandshakeRequest, SessionTransport};

/// Lifecycle of the cached session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Invalidating,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    session: Option<Session>,
}

/// Keeps one provider session per client and renews it when the provider
/// rejects it.
///
/// The stored id is assumed valid until a call is rejected. A rejected call
/// is retried exactly once on a fresh session.
pub struct SessionManager {
    transport: Arc<dyn SessionTransport>,
    handshake: HandshakeRequest,
    inner: Mutex<Inner>,
    next_request_id: AtomicU64,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn SessionTransport>, handshake: HandshakeRequest) -> Self {
        Self {
            transport,
            handshake,
            inner: Mutex::new(Inner {
                state: SessionState::Uninitialized,
                session: None,
            }),
            next_request_id: AtomicU64::new(1),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.lock().await.session.clone()
    }

    /// Return the stored session id, performing the handshake if there is none.
    pub async fn ensure_session(&self) -> McpResult<String> {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.session.as_ref().filter(|s| s.is_active) {
            debug!(session_id = %session.session_id, "reusing session");
            return Ok(session.session_id.clone());
        }

        match self.transport.handshake(&self.handshake).await {
            Ok(response) => {
                info!(
                    session_id = %response.session_id,
                    server = %response.server_info.name,
                    protocol = %response.protocol_version,
                    "session created"
                );
                inner.session = Some(Session {
                    session_id: response.session_id.clone(),
                    created_at: Utc::now(),
                    is_active: true,
                });
                inner.state = SessionState::Active;
                Ok(response.session_id)
            }
            Err(e) => {
                if inner.state == SessionState::Invalidating {
                    error!("session re-initialization failed: {}", e);
                    inner.state = SessionState::Fatal;
                } else {
                    warn!("session initialization failed: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Discard the stored id so the next call re-initializes.
    pub async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner.session.take() {
            info!(session_id = %session.session_id, "session invalidated");
            inner.state = SessionState::Invalidating;
        }
    }

    /// Discard the stored id only if it is still `session_id`. A concurrent
    /// call may already have replaced it with a fresh one.
    async fn invalidate_if_current(&self, session_id: &str) {
        let mut inner = self.inner.lock().await;
        let is_current = inner
            .session
            .as_ref()
            .is_some_and(|s| s.session_id == session_id);
        if is_current {
            inner.session = None;
            inner.state = SessionState::Invalidating;
            warn!(session_id, "session invalidated after rejection");
        }
    }

    async fn mark_fatal(&self, session_id: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(session) = inner
            .session
            .as_mut()
            .filter(|s| s.session_id == session_id)
        {
            session.is_active = false;
        }
        inner.state = SessionState::Fatal;
    }

    /// Send `method` under the current session, renewing the session once if
    /// the provider rejects it.
    pub async fn call_with_session(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        let session_id = self.ensure_session().await?;

        match self.send(&session_id, method, params.clone()).await {
            Err(e) if e.is_session_rejected() => {
                warn!(session_id = %session_id, method, "session rejected, re-initializing: {}", e);
                self.invalidate_if_current(&session_id).await;

                let fresh_id = self.ensure_session().await?;
                match self.send(&fresh_id, method, params).await {
                    Err(e) if e.is_session_rejected() => {
                        error!(session_id = %fresh_id, method, "fresh session rejected: {}", e);
                        self.mark_fatal(&fresh_id).await;
                        Err(McpError::SessionRejected(format!(
                            "session rejected again after re-initialization: {}",
                            e
                        )))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Close the current session with the provider, if any.
    pub async fn close(&self) -> McpResult<()> {
        let session = {
            let mut inner = self.inner.lock().await;
            inner.state = SessionState::Uninitialized;
            inner.session.take()
        };

        if let Some(session) = session {
            info!(session_id = %session.session_id, "closing session");
            self.transport.close(&session.session_id).await?;
        }
        Ok(())
    }

    async fn send(&self, session_id: &str, method: &str, params: Option<Value>) -> McpResult<Value> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        self.transport
            .send(session_id, JsonRpcRequest::new(id, method, params))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::{HandshakeResponse, MockSessionTransport};
    use crate::mcp::types::{ServerCapabilities, ServerInfo};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;

    /// Issues sequential session ids and rejects any id it has expired.
    #[derive(Default)]
    struct ExpiringTransport {
        handshakes: AtomicUsize,
        sends: AtomicUsize,
        expired: StdMutex<HashSet<String>>,
        reject_everything: bool,
    }

    impl ExpiringTransport {
        fn expire(&self, session_id: &str) {
            self.expired.lock().unwrap().insert(session_id.to_string());
        }
    }

    #[async_trait]
    impl SessionTransport for ExpiringTransport {
        async fn handshake(&self, _request: &HandshakeRequest) -> McpResult<HandshakeResponse> {
            let n = self.handshakes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(HandshakeResponse {
                session_id: format!("session-{}", n),
                protocol_version: "2025-06-18".to_string(),
                capabilities: ServerCapabilities::default(),
                server_info: ServerInfo {
                    name: "stand-in".to_string(),
                    version: "0".to_string(),
                },
            })
        }

        async fn send(&self, session_id: &str, request: JsonRpcRequest) -> McpResult<Value> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.reject_everything || self.expired.lock().unwrap().contains(session_id) {
                return Err(McpError::SessionRejected(session_id.to_string()));
            }
            Ok(json!({"session": session_id, "method": request.method}))
        }
    }

    fn manager(transport: Arc<ExpiringTransport>) -> SessionManager {
        SessionManager::new(transport, HandshakeRequest::new("test", "1.0"))
    }

    #[tokio::test]
    async fn test_session_reused_across_calls() {
        let transport = Arc::new(ExpiringTransport::default());
        let manager = manager(transport.clone());
        assert_eq!(manager.state().await, SessionState::Uninitialized);

        manager.call_with_session("tools/list", None).await.unwrap();
        let result = manager.call_with_session("tools/list", None).await.unwrap();

        assert_eq!(result["session"], "session-1");
        assert_eq!(transport.handshakes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state().await, SessionState::Active);

        let session = manager.session().await.unwrap();
        assert_eq!(session.session_id, "session-1");
        assert!(session.is_active);
    }

    #[tokio::test]
    async fn test_rejected_session_reinitializes_exactly_once() {
        let transport = Arc::new(ExpiringTransport::default());
        let manager = manager(transport.clone());
        manager.ensure_session().await.unwrap();
        transport.expire("session-1");

        let result = manager
            .call_with_session("tools/call", Some(json!({"name": "get_weather"})))
            .await
            .unwrap();

        assert_eq!(result["session"], "session-2");
        assert_eq!(transport.handshakes.load(Ordering::SeqCst), 2);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 2);
        assert_eq!(manager.state().await, SessionState::Active);
    }

    #[tokio::test]
    async fn test_second_rejection_is_fatal() {
        let transport = Arc::new(ExpiringTransport {
            reject_everything: true,
            ..Default::default()
        });
        let manager = manager(transport.clone());

        let err = manager.call_with_session("tools/list", None).await.unwrap_err();

        assert!(err.is_session_rejected());
        assert_eq!(transport.handshakes.load(Ordering::SeqCst), 2);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 2);
        assert_eq!(manager.state().await, SessionState::Fatal);
        assert!(!manager.session().await.unwrap().is_active);

        // The next call starts over with a new handshake
        let _ = manager.call_with_session("tools/list", None).await;
        assert_eq!(transport.handshakes.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_handshake() {
        let transport = Arc::new(ExpiringTransport::default());
        let manager = manager(transport.clone());

        assert_eq!(manager.ensure_session().await.unwrap(), "session-1");
        manager.invalidate().await;
        assert_eq!(manager.state().await, SessionState::Invalidating);
        assert!(manager.session().await.is_none());

        assert_eq!(manager.ensure_session().await.unwrap(), "session-2");
    }

    #[tokio::test]
    async fn test_stale_rejection_keeps_newer_session() {
        let transport = Arc::new(ExpiringTransport::default());
        let manager = manager(transport.clone());
        manager.ensure_session().await.unwrap();
        manager.invalidate().await;
        manager.ensure_session().await.unwrap();

        // A late rejection for the old id must not discard session-2
        manager.invalidate_if_current("session-1").await;
        assert_eq!(manager.session().await.unwrap().session_id, "session-2");
        assert_eq!(manager.state().await, SessionState::Active);
    }

    #[tokio::test]
    async fn test_failed_reinitialization_is_fatal() {
        let mut transport = MockSessionTransport::new();
        let mut handshakes = 0;
        transport.expect_handshake().times(2).returning(move |_| {
            handshakes += 1;
            if handshakes == 1 {
                Ok(HandshakeResponse {
                    session_id: "only".to_string(),
                    protocol_version: "2024-11-05".to_string(),
                    capabilities: ServerCapabilities::default(),
                    server_info: ServerInfo {
                        name: "mock".to_string(),
                        version: "0".to_string(),
                    },
                })
            } else {
                Err(McpError::Transport("connection refused".to_string()))
            }
        });
        transport
            .expect_send()
            .times(1)
            .returning(|id, _| Err(McpError::SessionRejected(id.to_string())));

        let manager = SessionManager::new(Arc::new(transport), HandshakeRequest::new("test", "1.0"));
        let err = manager.call_with_session("ping", None).await.unwrap_err();

        assert!(matches!(err, McpError::Transport(_)));
        assert_eq!(manager.state().await, SessionState::Fatal);
    }

    #[tokio::test]
    async fn test_initial_handshake_failure_stays_uninitialized() {
        let mut transport = MockSessionTransport::new();
        transport
            .expect_handshake()
            .returning(|_| Err(McpError::Transport("connection refused".to_string())));
        transport.expect_send().never();

        let manager = SessionManager::new(Arc::new(transport), HandshakeRequest::new("test", "1.0"));
        assert!(manager.call_with_session("ping", None).await.is_err());
        assert_eq!(manager.state().await, SessionState::Uninitialized);
    }
}
