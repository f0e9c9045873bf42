pub mod cache;
pub mod registry;
pub mod response;
pub mod schema;
pub mod weather;

use crate::error::McpResult;
use async_trait::async_trait;

pub use registry::{ToolDescriptor, ToolRegistry};
pub use response::{ToolContent, ToolResult};
pub use schema::{InputSchema, ParamSpec, ParamType, ToolArgs};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> InputSchema;
    async fn execute(&self, args: ToolArgs) -> McpResult<ToolResult>;
}
