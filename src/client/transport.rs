use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpResult;
use crate::mcp::types::{InitializeRequest, JsonRpcRequest, ServerCapabilities, ServerInfo};

pub type HandshakeRequest = InitializeRequest;

/// What a successful `initialize` handshake hands back.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub session_id: String,
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

/// A connection to a stateful MCP provider.
///
/// Implementations report an unknown or expired session id as
/// `McpError::SessionRejected`, an unreachable provider as
/// `McpError::Transport`, and any other JSON-RPC error as `McpError::Provider`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn handshake(&self, request: &HandshakeRequest) -> McpResult<HandshakeResponse>;

    /// Send one request under `session_id` and return its `result`.
    async fn send(&self, session_id: &str, request: JsonRpcRequest) -> McpResult<Value>;

    async fn close(&self, _session_id: &str) -> McpResult<()> {
        Ok(())
    }
}
