use serde_json::{Value, json};
use std::sync::Arc;

use crate::config::{ConnectionConfig, GatewayConfig};
use crate::error::{IntoMcpError, McpResult};
use crate::mcp::types::{CallToolRequest, ListToolsResult, Tool, ToolResult};

use super::http::HttpSessionTransport;
use super::session::{SessionManager, SessionState};
use super::transport::{HandshakeRequest, SessionTransport};

pub const CLIENT_NAME: &str = "weather-chat-gateway";

/// Typed tool calls over a managed MCP session.
pub struct McpClient {
    sessions: SessionManager,
}

impl McpClient {
    pub fn new(transport: Arc<dyn SessionTransport>) -> Self {
        let handshake = HandshakeRequest::new(CLIENT_NAME, env!("CARGO_PKG_VERSION"));
        Self {
            sessions: SessionManager::new(transport, handshake),
        }
    }

    pub fn from_config(gateway: &GatewayConfig, connection: &ConnectionConfig) -> McpResult<Self> {
        let transport = HttpSessionTransport::new(&gateway.mcp_url, connection.timeout())?;
        Ok(Self::new(Arc::new(transport)))
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn session_state(&self) -> SessionState {
        self.sessions.state().await
    }

    pub async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        let result = self.sessions.call_with_session("tools/list", None).await?;
        let list: ListToolsResult =
            serde_json::from_value(result).mcp_context("Malformed tools/list result")?;
        Ok(list.tools)
    }

    /// Call a tool. Tool-level failures arrive as `is_error` results; only
    /// session and transport problems are `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<ToolResult> {
        let params = serde_json::to_value(CallToolRequest {
            name: name.to_string(),
            arguments,
        })?;
        let result = self
            .sessions
            .call_with_session("tools/call", Some(params))
            .await?;
        serde_json::from_value(result).mcp_context("Malformed tools/call result")
    }

    /// Liveness probe through the session.
    pub async fn ping(&self) -> McpResult<()> {
        self.sessions.call_with_session("ping", Some(json!({}))).await?;
        Ok(())
    }

    pub async fn close(&self) -> McpResult<()> {
        self.sessions.close().await
    }
}
