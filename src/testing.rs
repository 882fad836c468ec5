//! Test utilities for MCP servers.
//!
//! [`TestClient`] wraps an [`McpServer`] for writing concise tests without
//! manual JSON-RPC construction.
//!
//! # Quick Start
//!
//! ```rust
//! use beacon_mcp::{McpServer, TestClient, ToolBuilder};
//! use beacon_mcp::schema::{ParamSpec, ParamType};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let echo = ToolBuilder::new("echo")
//!     .description("Echo a message")
//!     .param(ParamSpec::required("message", ParamType::String))
//!     .handler(|args, _ctx| async move {
//!         Ok(args["message"].as_str().unwrap_or_default().to_string())
//!     });
//!
//! let server = McpServer::new()
//!     .server_info("test-server", "1.0.0")
//!     .tool(echo);
//!
//! let mut client = TestClient::new(server);
//! client.initialize().await;
//!
//! let result = client.call_tool("echo", json!({"message": "hello"})).await;
//! assert_eq!(result["content"][0]["text"], json!("hello"));
//! # }
//! ```

use serde_json::{json, Value};

use crate::auth::AuthRequest;
use crate::server::McpServer;

/// An in-process client driving an [`McpServer`] through raw JSON frames.
pub struct TestClient {
    server: McpServer,
    auth: AuthRequest,
    next_id: i64,
}

impl TestClient {
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            auth: AuthRequest::default(),
            next_id: 1,
        }
    }

    /// Attach credentials sent with every request.
    pub fn with_auth(mut self, auth: AuthRequest) -> Self {
        self.auth = auth;
        self
    }

    pub fn server(&self) -> &McpServer {
        &self.server
    }

    /// Send a request and return the full response envelope.
    pub async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();

        let response = self
            .server
            .handle_message(&frame, self.auth.clone())
            .await
            .expect("request should produce a response");
        serde_json::from_str(&response).expect("response should be valid JSON")
    }

    /// Send a request and return its `result`, panicking on an error
    /// envelope.
    pub async fn expect_result(&mut self, method: &str, params: Value) -> Value {
        let envelope = self.request(method, params).await;
        if let Some(error) = envelope.get("error") {
            panic!("expected result for {}, got error: {}", method, error);
        }
        envelope["result"].clone()
    }

    /// Send a request and return the error code, panicking on success.
    pub async fn expect_error(&mut self, method: &str, params: Value) -> i64 {
        let envelope = self.request(method, params).await;
        match envelope["error"]["code"].as_i64() {
            Some(code) => code,
            None => panic!("expected error for {}, got: {}", method, envelope),
        }
    }

    /// Send a notification frame; asserts no response is produced.
    pub async fn notify(&mut self, method: &str, params: Value) {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        })
        .to_string();
        let response = self.server.handle_message(&frame, self.auth.clone()).await;
        assert!(response.is_none(), "notifications must not produce responses");
    }

    /// Perform the initialize handshake and return its result.
    pub async fn initialize(&mut self) -> Value {
        self.expect_result("initialize", json!({})).await
    }

    pub async fn list_tools(&mut self) -> Value {
        self.expect_result("tools/list", json!({})).await
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Value {
        self.expect_result("tools/call", json!({"name": name, "arguments": arguments}))
            .await
    }

    pub async fn list_resources(&mut self) -> Value {
        self.expect_result("resources/list", json!({})).await
    }

    pub async fn list_resource_templates(&mut self) -> Value {
        self.expect_result("resources/templates/list", json!({})).await
    }

    pub async fn read_resource(&mut self, uri: &str) -> Value {
        self.expect_result("resources/read", json!({"uri": uri})).await
    }

    pub async fn list_prompts(&mut self) -> Value {
        self.expect_result("prompts/list", json!({})).await
    }

    pub async fn get_prompt(&mut self, name: &str, arguments: Value) -> Value {
        self.expect_result("prompts/get", json!({"name": name, "arguments": arguments}))
            .await
    }
}
