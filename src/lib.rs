pub mod cache;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod tools;
pub mod utils;
pub mod weather;

pub use config::Config;
pub use error::{McpError, McpResult};
