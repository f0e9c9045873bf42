pub mod handlers;
pub mod http;
pub mod server;
pub mod session;
pub mod types;

pub use handlers::RequestHandler;
pub use server::{McpServer, ProtocolState};
pub use session::{ServerSession, SessionStore};
