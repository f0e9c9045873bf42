pub mod http;
pub mod session;
pub mod tools;
pub mod transport;

pub use http::HttpSessionTransport;
pub use session::{Session, SessionManager, SessionState};
pub use tools::McpClient;
pub use transport::{HandshakeRequest, HandshakeResponse, SessionTransport};
