//! Transports for MCP servers
//!
//! Three flavors, each feeding the same dispatch engine:
//!
//! - [`stdio`] - line-delimited JSON over subprocess pipes
//! - [`http`] - plain request/response HTTP
//! - [`sse`] - streaming-event HTTP (operational, not recommended for new
//!   deployments)
//!
//! A transport's whole contract is: read frames, hand each to
//! [`McpServer::handle_message`](crate::McpServer::handle_message) together
//! with an [`AuthRequest`](crate::auth::AuthRequest) describing the
//! transport's credentials, and write back whatever comes out.

pub mod http;
pub mod sse;
pub mod stdio;

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;
