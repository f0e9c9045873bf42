use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{McpError, McpResult};
use crate::mcp::types::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, SESSION_HEADER, error_codes,
};
use crate::weather::client::map_request_error;

use super::transport::{HandshakeRequest, HandshakeResponse, SessionTransport};

/// Talks JSON-RPC to an MCP server's streamable HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSessionTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSessionTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> McpResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(
        &self,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> McpResult<reqwest::Response> {
        let mut builder = self.http.post(&self.endpoint).json(request);
        if let Some(id) = session_id {
            builder = builder.header(SESSION_HEADER, id);
        }

        builder
            .send()
            .await
            .map_err(|e| map_request_error(&self.endpoint, e))
    }
}

/// Unwrap a JSON-RPC envelope, sorting errors into session rejections and
/// provider failures.
fn into_result(response: JsonRpcResponse) -> McpResult<Value> {
    match response.error {
        Some(error) if error.code == error_codes::SESSION_NOT_FOUND => {
            Err(McpError::SessionRejected(error.message))
        }
        Some(error) => Err(McpError::Provider(format!(
            "MCP error {}: {}",
            error.code, error.message
        ))),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

async fn read_envelope(response: reqwest::Response) -> McpResult<JsonRpcResponse> {
    let status = response.status();
    match response.json::<JsonRpcResponse>().await {
        Ok(envelope) => Ok(envelope),
        Err(_) if status == StatusCode::NOT_FOUND => Err(McpError::SessionRejected(
            "server does not recognize the session".to_string(),
        )),
        Err(e) => Err(McpError::Provider(format!(
            "unreadable MCP response (HTTP {}): {}",
            status.as_u16(),
            e
        ))),
    }
}

#[async_trait]
impl SessionTransport for HttpSessionTransport {
    async fn handshake(&self, request: &HandshakeRequest) -> McpResult<HandshakeResponse> {
        let initialize = JsonRpcRequest::new(0, "initialize", Some(serde_json::to_value(request)?));
        let response = self.post(None, &initialize).await?;

        let header_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let result: InitializeResult = serde_json::from_value(into_result(read_envelope(response).await?)?)?;

        let session_id = header_id
            .or(result.session_id)
            .ok_or_else(|| McpError::Provider("initialize response carried no session id".to_string()))?;
        debug!(session_id = %session_id, "handshake accepted");

        let notification = JsonRpcRequest::notification("notifications/initialized");
        let ack = self.post(Some(&session_id), &notification).await?;
        if ack.status() == StatusCode::NOT_FOUND {
            return Err(McpError::SessionRejected(session_id));
        }
        if !ack.status().is_success() {
            return Err(McpError::Provider(format!(
                "initialized notification returned HTTP {}",
                ack.status().as_u16()
            )));
        }

        Ok(HandshakeResponse {
            session_id,
            protocol_version: result.protocol_version,
            capabilities: result.capabilities,
            server_info: result.server_info,
        })
    }

    async fn send(&self, session_id: &str, request: JsonRpcRequest) -> McpResult<Value> {
        let response = self.post(Some(session_id), &request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            // Body may still say why; it is a session rejection either way
            let message = read_envelope(response)
                .await
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or_else(|| format!("Session not found: {}", session_id));
            return Err(McpError::SessionRejected(message));
        }

        into_result(read_envelope(response).await?)
    }

    async fn close(&self, session_id: &str) -> McpResult<()> {
        let response = self
            .http
            .delete(&self.endpoint)
            .header(SESSION_HEADER, session_id)
            .send()
            .await
            .map_err(|e| map_request_error(&self.endpoint, e))?;
        debug!(session_id, status = response.status().as_u16(), "session close");
        Ok(())
    }
}
