use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{McpError, McpResult};
use crate::mcp::types::Tool as ToolSummary;

use super::schema::InputSchema;
use super::{Tool, ToolResult};

/// A registered tool: name, declared schema and handler.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
    handler: Arc<dyn Tool>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

impl ToolDescriptor {
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.to_json_schema(),
        }
    }
}

/// Name → handler table that normalizes every outcome into a [`ToolResult`].
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> McpResult<()> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn Tool>) -> McpResult<()> {
        let name = handler.name().to_string();
        if self.index.contains_key(&name) {
            return Err(McpError::DuplicateTool(name));
        }

        self.index.insert(name.clone(), self.tools.len());
        self.tools.push(ToolDescriptor {
            name,
            description: handler.description().to_string(),
            input_schema: handler.input_schema(),
            handler,
        });
        Ok(())
    }

    /// Summaries in registration order.
    pub fn list(&self) -> Vec<ToolSummary> {
        self.tools.iter().map(ToolDescriptor::summary).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up, validates and runs a tool. Never returns an error: unknown
    /// names, bad arguments, handler failures and handler panics all come
    /// back as `is_error` results.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(descriptor) = self.get(name) else {
            warn!(tool = name, "call to unknown tool");
            return ToolResult::from_error(&McpError::UnknownTool(name.to_string()));
        };

        let args = match descriptor.input_schema.validate(arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!(tool = name, "rejected arguments: {}", e);
                return ToolResult::from_error(&e);
            }
        };

        info!(tool = name, "calling tool");
        let handler = descriptor.handler.clone();
        let task = tokio::spawn(async move { handler.execute(args).await });

        match task.await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = name, kind = e.kind().as_str(), "tool failed: {}", e);
                ToolResult::from_error(&e)
            }
            Err(join_error) => {
                error!(tool = name, "tool task aborted: {}", join_error);
                ToolResult::from_error(&McpError::Internal(format!(
                    "tool '{}' stopped unexpectedly",
                    name
                )))
            }
        }
    }
}
