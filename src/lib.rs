//! # beacon-mcp
//!
//! A server framework for the Model Context Protocol (MCP): applications
//! declaratively register *tools* (callable functions), *resources*
//! (URI-addressed data), *resource templates* (parameterized URIs), and
//! *prompts* (message generators), then expose them over subprocess pipes,
//! request/response HTTP, or streaming-event HTTP — with pluggable
//! authentication, per-component authorization predicates, and a chainable
//! hook-based middleware pipeline.
//!
//! ## Example
//!
//! ```rust,no_run
//! use beacon_mcp::{McpServer, StdioTransport, ToolBuilder};
//! use beacon_mcp::schema::{ParamSpec, ParamType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let echo = ToolBuilder::new("echo")
//!         .description("Echo the given text")
//!         .param(ParamSpec::required("text", ParamType::String))
//!         .handler(|args, _ctx| async move {
//!             Ok(args["text"].as_str().unwrap_or_default().to_string())
//!         });
//!
//!     let server = McpServer::new()
//!         .server_info("my-server", "1.0.0")
//!         .tool(echo);
//!
//!     let mut transport = StdioTransport::new(server);
//!     transport.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Bytes flow through [`codec`] into [`server::McpServer::dispatch`], which
//! runs authentication ([`auth`]), the initialization gate, and the
//! [`middleware`] chain around a terminal handler selected by method; results
//! and typed errors are encoded back into JSON-RPC envelopes at that single
//! boundary. Components live in a read-only [`registry`] after startup.

pub mod auth;
pub mod codec;
pub mod error;
pub mod middleware;
pub mod prompt;
pub mod protocol;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod server;
pub mod testing;
pub mod tool;
pub mod transport;
pub mod uri_template;

// Re-exports
pub use auth::{AuthProvider, AuthRequest, AuthResult, AuthenticatedUser, AuthorizationContext};
pub use error::{Error, ErrorCode, ProtocolError, Result};
pub use middleware::{LoggingMiddleware, Middleware, MiddlewareContext, Next};
pub use prompt::{Prompt, PromptBuilder};
pub use protocol::{Content, Request, RequestId, ToolResult, PROTOCOL_VERSION};
pub use resource::{Resource, ResourceBuilder, ResourceTemplate, ResourceTemplateBuilder};
pub use server::{DispatchRequest, McpServer};
pub use testing::TestClient;
pub use tool::{CallContext, Tool, ToolBuilder};
pub use transport::{HttpTransport, SseTransport, StdioTransport};
