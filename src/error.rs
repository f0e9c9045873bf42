use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Session rejected: {0}")]
    SessionRejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used for branching and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownTool,
    InvalidArguments,
    ProviderFailure,
    SessionRejected,
    TransportFailure,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownTool => "unknown_tool",
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::ProviderFailure => "provider_failure",
            ErrorKind::SessionRejected => "session_rejected",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl McpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::UnknownTool(_) => ErrorKind::UnknownTool,
            McpError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            McpError::Provider(_) | McpError::NotFound(_) | McpError::Serialization(_) => {
                ErrorKind::ProviderFailure
            }
            McpError::SessionRejected(_) => ErrorKind::SessionRejected,
            McpError::Transport(_) | McpError::Io(_) => ErrorKind::TransportFailure,
            McpError::Network(e) if e.is_connect() => ErrorKind::TransportFailure,
            McpError::Network(_) => ErrorKind::ProviderFailure,
            McpError::DuplicateTool(_) | McpError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_session_rejected(&self) -> bool {
        matches!(self, McpError::SessionRejected(_))
    }
}

impl From<anyhow::Error> for McpError {
    fn from(err: anyhow::Error) -> Self {
        McpError::Internal(err.to_string())
    }
}

pub type McpResult<T> = std::result::Result<T, McpError>;

/// Extension trait for converting errors to McpError with context
pub trait IntoMcpError<T> {
    fn mcp_context(self, context: &str) -> McpResult<T>;
}

impl<T, E: std::fmt::Display> IntoMcpError<T> for Result<T, E> {
    fn mcp_context(self, context: &str) -> McpResult<T> {
        self.map_err(|e| McpError::Internal(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(McpError::UnknownTool("x".into()), ErrorKind::UnknownTool)]
    #[case(McpError::InvalidArguments("x".into()), ErrorKind::InvalidArguments)]
    #[case(McpError::Provider("x".into()), ErrorKind::ProviderFailure)]
    #[case(McpError::SessionRejected("x".into()), ErrorKind::SessionRejected)]
    #[case(McpError::Transport("x".into()), ErrorKind::TransportFailure)]
    #[case(McpError::Internal("x".into()), ErrorKind::Internal)]
    fn test_error_kind(#[case] err: McpError, #[case] expected: ErrorKind) {
        assert_eq!(err.kind(), expected);
    }

    #[test]
    fn test_unknown_tool_message_names_tool() {
        let err = McpError::UnknownTool("nonexistent_tool_xyz".to_string());
        assert_eq!(err.to_string(), "unknown tool: nonexistent_tool_xyz");
    }

    #[test]
    fn test_mcp_context_wraps_message() {
        let result: Result<(), String> = Err("boom".to_string());
        let err = result.mcp_context("Failed to fetch").unwrap_err();
        assert_eq!(err.to_string(), "Internal error: Failed to fetch: boom");
    }

    #[test]
    fn test_is_session_rejected() {
        assert!(McpError::SessionRejected("gone".into()).is_session_rejected());
        assert!(!McpError::Transport("down".into()).is_session_rejected());
    }
}
