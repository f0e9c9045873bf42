use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;

use super::server::McpServer;
use super::session::SessionStore;
use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, SESSION_HEADER};

#[derive(Clone)]
struct HttpState {
    server: McpServer,
    sessions: Arc<SessionStore>,
}

/// Routes for the streamable MCP endpoint plus a health check.
pub fn router(server: McpServer, sessions: Arc<SessionStore>) -> Router {
    Router::new()
        .route("/mcp", post(handle_post).delete(handle_delete))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { server, sessions })
}

/// Serve MCP over HTTP until ctrl-c.
pub async fn serve(server: McpServer, config: &ServerConfig) -> anyhow::Result<()> {
    let idle_timeout = Duration::from_secs(config.session_idle_timeout_seconds);
    let sessions = Arc::new(SessionStore::new(idle_timeout));
    let sweeper = sessions
        .clone()
        .spawn_sweeper((idle_timeout / 4).max(Duration::from_secs(1)));

    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;
    info!("MCP HTTP server listening on {}", listener.local_addr()?);

    let result = axum::serve(listener, router(server, sessions))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await;

    sweeper.abort();
    result.map_err(|e| anyhow::anyhow!("Server error: {}", e))
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn session_not_found(id: Option<serde_json::Value>, session_id: Option<&str>) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(JsonRpcResponse::error(
            id,
            JsonRpcError::session_not_found(session_id),
        )),
    )
        .into_response()
}

async fn handle_post(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Failed to parse request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(None, JsonRpcError::parse_error())),
            )
                .into_response();
        }
    };
    debug!(method = %request.method, "HTTP request");

    if request.method == "initialize" {
        return handle_initialize(state, request).await;
    }

    let Some(id) = session_id(&headers) else {
        warn!(method = %request.method, "request without session id");
        return session_not_found(request.id, None);
    };

    let Some(session) = state.sessions.touch(&id).await else {
        warn!(session_id = %id, "request for unknown session");
        return session_not_found(request.id, Some(&id));
    };

    let mut protocol = session.state.clone();
    let request_id = request.id.clone();
    let outcome = state.server.handle(request, &mut protocol).await;
    if protocol.initialized && !session.state.initialized {
        state.sessions.mark_initialized(&id).await;
    }

    match outcome {
        Ok(Some(response)) => {
            (StatusCode::OK, [(SESSION_HEADER, id)], Json(response)).into_response()
        }
        Ok(None) => (StatusCode::ACCEPTED, [(SESSION_HEADER, id)]).into_response(),
        Err(e) => {
            error!("Error processing request: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(JsonRpcResponse::error(
                    request_id,
                    JsonRpcError::internal_error(e.to_string()),
                )),
            )
                .into_response()
        }
    }
}

async fn handle_initialize(state: HttpState, request: JsonRpcRequest) -> Response {
    let session = state.sessions.create().await;
    let mut protocol = session.state;
    let request_id = request.id.clone();

    match state.server.handle(request, &mut protocol).await {
        Ok(Some(response)) if response.error.is_none() => {
            if let Some(client) = protocol.client {
                state.sessions.record_client(&session.id, client).await;
            }
            (StatusCode::OK, [(SESSION_HEADER, session.id)], Json(response)).into_response()
        }
        Ok(Some(response)) => {
            state.sessions.remove(&session.id).await;
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => {
            state.sessions.remove(&session.id).await;
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            state.sessions.remove(&session.id).await;
            error!("Initialize failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(JsonRpcResponse::error(
                    request_id,
                    JsonRpcError::internal_error(e.to_string()),
                )),
            )
                .into_response()
        }
    }
}

async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    match session_id(&headers) {
        Some(id) if state.sessions.remove(&id).await => StatusCode::NO_CONTENT.into_response(),
        Some(id) => session_not_found(None, Some(&id)),
        None => session_not_found(None, None),
    }
}

async fn handle_health(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len().await,
        "tools": state.server.handler().tool_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;
    use crate::mcp::handlers::RequestHandler;
    use crate::mcp::types::error_codes;
    use crate::weather::client::MockWeatherSource;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    async fn spawn_server() -> String {
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(60),
            Duration::from_secs(3600),
        ));
        let handler = RequestHandler::new(cache, Arc::new(MockWeatherSource::new()), None).unwrap();
        let app = router(
            McpServer::new(Arc::new(handler)),
            Arc::new(SessionStore::new(Duration::from_secs(60))),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn initialize_body() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"}
            }
        })
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/mcp", base))
            .json(&initialize_body())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let header_id = response
            .headers()
            .get(SESSION_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["result"]["sessionId"], header_id.as_str());

        let response = client
            .post(format!("{}/mcp", base))
            .header(SESSION_HEADER, &header_id)
            .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);

        let body: Value = client
            .post(format!("{}/mcp", base))
            .header(SESSION_HEADER, &header_id)
            .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["result"]["tools"][0]["name"], "get_weather");

        let health: Value = client
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["sessions"], 1);
        assert_eq!(health["tools"], 5);

        let response = client
            .delete(format!("{}/mcp", base))
            .header(SESSION_HEADER, &header_id)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 204);

        let response = client
            .post(format!("{}/mcp", base))
            .header(SESSION_HEADER, &header_id)
            .json(&json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], error_codes::SESSION_NOT_FOUND);
        assert_eq!(body["id"], 3);
    }

    #[tokio::test]
    async fn test_concurrent_request_keeps_initialized_flag() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();
        let url = format!("{}/mcp", base);

        let response = client.post(&url).json(&initialize_body()).send().await.unwrap();
        let id = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();

        let ping = client
            .post(&url)
            .header(SESSION_HEADER, &id)
            .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
            .send();
        let note = client
            .post(&url)
            .header(SESSION_HEADER, &id)
            .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .send();
        let (ping, note) = tokio::join!(ping, note);
        assert_eq!(ping.unwrap().status(), 200);
        assert_eq!(note.unwrap().status(), 202);

        let body: Value = client
            .post(&url)
            .header(SESSION_HEADER, &id)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {"name": "clear_cache", "arguments": {}}
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(body["error"].is_null(), "{}", body);
        assert_eq!(body["result"]["isError"], false);
    }

    #[tokio::test]
    async fn test_missing_session_header_is_rejected() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{}/mcp", base))
            .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], error_codes::SESSION_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let base = spawn_server().await;
        let response = reqwest::Client::new()
            .post(format!("{}/mcp", base))
            .body("{oops")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["code"], error_codes::PARSE_ERROR);
    }
}
