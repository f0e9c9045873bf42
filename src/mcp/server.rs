use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use super::handlers::RequestHandler;
use super::types::*;

pub const SERVER_NAME: &str = "Weather MCP Server";

/// Protocol state of one client connection (one stdio stream or one HTTP session).
#[derive(Debug, Clone, Default)]
pub struct ProtocolState {
    pub initialized: bool,
    pub session_id: Option<String>,
    pub client: Option<ClientInfo>,
}

/// Transport-independent JSON-RPC method router.
#[derive(Clone)]
pub struct McpServer {
    handler: Arc<RequestHandler>,
}

impl McpServer {
    pub fn new(handler: Arc<RequestHandler>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// Serve line-delimited JSON-RPC over stdin/stdout with one implicit session.
    pub async fn run(&self) -> Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        self.serve_lines(reader, tokio::io::stdout()).await
    }

    pub async fn serve_lines<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut state = ProtocolState::default();
        let mut buffer = String::new();
        let mut empty_reads = 0;

        loop {
            buffer.clear();

            match reader.read_line(&mut buffer).await {
                Ok(0) => {
                    empty_reads += 1;

                    // Give it a few chances before exiting
                    if empty_reads > 3 {
                        break;
                    }
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                    continue;
                }
                Ok(_) => {
                    empty_reads = 0;
                    let trimmed = buffer.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match self.process_request(trimmed, &mut state).await {
                        Ok(Some(response)) => response,
                        Ok(None) => continue,
                        Err(e) => {
                            error!("Error processing request: {}", e);
                            JsonRpcResponse::error(None, JsonRpcError::internal_error(e.to_string()))
                        }
                    };

                    let response_str = serde_json::to_string(&response)?;
                    writer.write_all(response_str.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                Err(e) => {
                    error!("Error reading from stdin: {}", e);
                    break;
                }
            }
        }

        info!("stdio transport closed");
        Ok(())
    }

    pub async fn process_request(
        &self,
        input: &str,
        state: &mut ProtocolState,
    ) -> Result<Option<JsonRpcResponse>> {
        let request: JsonRpcRequest = match serde_json::from_str(input) {
            Ok(req) => req,
            Err(e) => {
                warn!("Failed to parse request: {}", e);
                return Ok(Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(),
                )));
            }
        };

        self.handle(request, state).await
    }

    /// Route one parsed request. Notifications yield `None`.
    pub async fn handle(
        &self,
        request: JsonRpcRequest,
        state: &mut ProtocolState,
    ) -> Result<Option<JsonRpcResponse>> {
        if request.jsonrpc != "2.0" {
            return Ok(Some(JsonRpcResponse::error(
                request.id.clone(),
                JsonRpcError::invalid_request(),
            )));
        }

        debug!(method = %request.method, "handling request");
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request, state).await.map(Some),
            "initialized" | "notifications/initialized" => {
                Ok(self.handle_initialized(request, state))
            }
            "ping" => Ok(Some(JsonRpcResponse::success(request.id, json!({})))),
            "tools/list" => self.handle_list_tools(request).map(Some),
            "tools/call" => self.handle_call_tool(request, state).await.map(Some),
            "prompts/list" => Ok(Some(JsonRpcResponse::success(
                request.id,
                json!({ "prompts": [] }),
            ))),
            "resources/list" => Ok(Some(JsonRpcResponse::success(
                request.id,
                json!({ "resources": [] }),
            ))),
            method if request.id.is_none() => {
                debug!("Ignoring notification: {}", method);
                Ok(None)
            }
            _ => {
                warn!("Unknown method: {}", request.method);
                Ok(Some(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::method_not_found(&request.method),
                )))
            }
        }
    }

    async fn handle_initialize(
        &self,
        request: JsonRpcRequest,
        state: &mut ProtocolState,
    ) -> Result<JsonRpcResponse> {
        let params: InitializeRequest = match request.params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return Ok(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)),
                ));
            }
            None => {
                return Ok(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("Missing params".to_string()),
                ));
            }
        };

        // Support both protocol versions
        let protocol_version = if params.protocol_version.starts_with("2025") {
            PROTOCOL_VERSION_2025.to_string()
        } else {
            PROTOCOL_VERSION.to_string()
        };

        info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            protocol = %protocol_version,
            "client initializing"
        );
        state.client = Some(params.client_info);

        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: HashMap::new(),
                experimental: Default::default(),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            session_id: state.session_id.clone(),
        };

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }

    fn handle_initialized(
        &self,
        request: JsonRpcRequest,
        state: &mut ProtocolState,
    ) -> Option<JsonRpcResponse> {
        state.initialized = true;

        // Notifications don't get responses
        if request.id.is_none() {
            None
        } else {
            Some(JsonRpcResponse::success(request.id, Value::Null))
        }
    }

    fn handle_list_tools(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        let result = ListToolsResult {
            tools: self.handler.list_tools(),
        };

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }

    async fn handle_call_tool(
        &self,
        request: JsonRpcRequest,
        state: &ProtocolState,
    ) -> Result<JsonRpcResponse> {
        if !state.initialized {
            return Ok(JsonRpcResponse::error(
                request.id,
                JsonRpcError::not_initialized(),
            ));
        }

        let params: CallToolRequest = match request.params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return Ok(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params(format!("Invalid tool call params: {}", e)),
                ));
            }
            None => {
                return Ok(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("Missing params".to_string()),
                ));
            }
        };

        // Tool failures come back as isError results, never as JSON-RPC errors
        let result = self.handler.call_tool(&params.name, params.arguments).await;

        Ok(JsonRpcResponse::success(
            request.id,
            serde_json::to_value(result)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;
    use crate::weather::client::MockWeatherSource;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn server() -> McpServer {
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(60),
            Duration::from_secs(3600),
        ));
        let handler = RequestHandler::new(cache, Arc::new(MockWeatherSource::new()), None).unwrap();
        McpServer::new(Arc::new(handler))
    }

    fn initialize_line() -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"}
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let server = server();
        let mut state = ProtocolState::default();

        let response = server
            .process_request(&initialize_line(), &mut state)
            .await
            .unwrap()
            .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION_2025);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result.get("sessionId").is_none());
        assert_eq!(state.client.unwrap().name, "test");
    }

    #[tokio::test]
    async fn test_parse_error() {
        let server = server();
        let mut state = ProtocolState::default();
        let response = server
            .process_request("{not json", &mut state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_call_requires_initialized_notification() {
        let server = server();
        let mut state = ProtocolState::default();
        let call = JsonRpcRequest::new(
            2,
            "tools/call",
            Some(json!({"name": "clear_cache", "arguments": {}})),
        );

        let response = server.handle(call.clone(), &mut state).await.unwrap().unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::NOT_INITIALIZED);

        let note = JsonRpcRequest::notification("notifications/initialized");
        assert!(server.handle(note, &mut state).await.unwrap().is_none());

        let response = server.handle(call, &mut state).await.unwrap().unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["text"], "Cleared 0 cached entries.");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let server = server();
        let mut state = ProtocolState {
            initialized: true,
            ..Default::default()
        };
        let call = JsonRpcRequest::new(
            3,
            "tools/call",
            Some(json!({"name": "nonexistent_tool_xyz", "arguments": {}})),
        );

        let response = server.handle(call, &mut state).await.unwrap().unwrap();
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(
            result["content"][0]["text"]
                .as_str()
                .unwrap()
                .contains("nonexistent_tool_xyz")
        );
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = server();
        let mut state = ProtocolState::default();
        let response = server
            .handle(JsonRpcRequest::new(4, "sampling/create", None), &mut state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_lines_round_trip() {
        let server = server();
        let input = format!(
            "{}\n{}\n{}\n",
            initialize_line(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        );
        let mut output = Vec::new();

        server
            .serve_lines(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["id"], 2);
        assert_eq!(lines[1]["result"]["tools"].as_array().unwrap().len(), 5);
    }
}
