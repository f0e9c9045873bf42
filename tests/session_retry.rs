mod common;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

use common::{CountingSource, fresh_cache, handler_with};
use weather_mcp::client::{
    HandshakeRequest, HandshakeResponse, HttpSessionTransport, McpClient, SessionManager,
    SessionState, SessionTransport,
};
use weather_mcp::error::{McpError, McpResult};
use weather_mcp::mcp::types::{JsonRpcRequest, ServerCapabilities, ServerInfo};
use weather_mcp::mcp::{McpServer, SessionStore};

/// Provider that accepts only the most recently issued session id.
#[derive(Default)]
struct RotatingProvider {
    handshakes: AtomicUsize,
    current: Mutex<Option<String>>,
}

impl RotatingProvider {
    fn rotate(&self) {
        *self.current.lock().unwrap() = Some("revoked".to_string());
    }
}

#[async_trait]
impl SessionTransport for RotatingProvider {
    async fn handshake(&self, _request: &HandshakeRequest) -> McpResult<HandshakeResponse> {
        let n = self.handshakes.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("sid-{}", n);
        *self.current.lock().unwrap() = Some(id.clone());
        Ok(HandshakeResponse {
            session_id: id,
            protocol_version: "2025-06-18".to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: "rotating".to_string(),
                version: "0".to_string(),
            },
        })
    }

    async fn send(&self, session_id: &str, _request: JsonRpcRequest) -> McpResult<Value> {
        if self.current.lock().unwrap().as_deref() == Some(session_id) {
            Ok(json!({ "servedBy": session_id }))
        } else {
            Err(McpError::SessionRejected(session_id.to_string()))
        }
    }
}

#[tokio::test]
async fn rejected_session_triggers_exactly_one_reinitialization() {
    let provider = Arc::new(RotatingProvider::default());
    let manager = SessionManager::new(provider.clone(), HandshakeRequest::new("test", "1.0"));

    manager.call_with_session("tools/list", None).await.unwrap();
    provider.rotate();

    let result = manager.call_with_session("tools/list", None).await.unwrap();

    assert_eq!(result["servedBy"], "sid-2");
    assert_eq!(provider.handshakes.load(Ordering::SeqCst), 2);
    assert_eq!(manager.state().await, SessionState::Active);
}

#[tokio::test]
async fn concurrent_rejections_settle_on_one_live_session() {
    let provider = Arc::new(RotatingProvider::default());
    let manager = Arc::new(SessionManager::new(
        provider.clone(),
        HandshakeRequest::new("test", "1.0"),
    ));
    manager.ensure_session().await.unwrap();
    provider.rotate();

    let calls: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.call_with_session("ping", None).await })
        })
        .collect();
    for call in calls {
        call.await.unwrap().unwrap();
    }

    let session = manager.session().await.unwrap();
    assert!(session.is_active);
    assert_eq!(manager.state().await, SessionState::Active);
    assert_eq!(provider.handshakes.load(Ordering::SeqCst), 2);
}

async fn spawn_mcp_server(sessions: Arc<SessionStore>) -> String {
    let source = Arc::new(CountingSource::default());
    let handler = handler_with(source, fresh_cache(), None);
    let app = weather_mcp::mcp::http::router(McpServer::new(Arc::new(handler)), sessions);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/mcp", addr)
}

#[tokio::test]
async fn client_recovers_when_server_forgets_its_session() {
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(60)));
    let endpoint = spawn_mcp_server(sessions.clone()).await;
    let transport = HttpSessionTransport::new(&endpoint, Duration::from_secs(5)).unwrap();
    let client = McpClient::new(Arc::new(transport));

    let first = client
        .call_tool("get_weather", json!({"city": "Lisbon"}))
        .await
        .unwrap();
    assert!(!first.is_error);
    let old_id = client.sessions().session().await.unwrap().session_id;

    // Server-side expiry
    assert!(sessions.remove(&old_id).await);

    let second = client
        .call_tool("get_weather", json!({"city": "Lisbon", "units": "fahrenheit"}))
        .await
        .unwrap();
    assert!(!second.is_error);
    assert!(second.text_content().contains("°F"));

    let new_id = client.sessions().session().await.unwrap().session_id;
    assert_ne!(old_id, new_id);
    assert_eq!(sessions.len().await, 1);
}

#[tokio::test]
async fn tool_errors_travel_as_results_over_http() {
    let sessions = Arc::new(SessionStore::new(Duration::from_secs(60)));
    let endpoint = spawn_mcp_server(sessions).await;
    let transport = HttpSessionTransport::new(&endpoint, Duration::from_secs(5)).unwrap();
    let client = McpClient::new(Arc::new(transport));

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 5);

    let result = client.call_tool("get_weather", json!({})).await.unwrap();
    assert!(result.is_error);
    assert!(result.text_content().contains("city"));

    client.close().await.unwrap();
    assert_eq!(client.session_state().await, SessionState::Uninitialized);
}
