//! Request/response HTTP transport for MCP
//!
//! One POST endpoint (default `/mcp`, trailing slash accepted) carrying one
//! JSON-RPC message per request. JSON-RPC errors are returned with HTTP 200
//! per the MCP convention; only transport-level envelope problems (an empty
//! body) use a 4xx status. `GET` on the endpoint is 405, `OPTIONS` answers
//! CORS preflight, and `/health` reports liveness.
//!
//! Credentials are forwarded to the dispatcher as an
//! [`AuthRequest`](crate::auth::AuthRequest) carrying the request's headers
//! and query parameters.
//!
//! # Example
//!
//! ```rust,no_run
//! use beacon_mcp::{HttpTransport, McpServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = McpServer::new().server_info("my-server", "1.0.0");
//!     HttpTransport::new(server).serve("127.0.0.1:3000").await?;
//!     Ok(())
//! }
//! ```

use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::auth::AuthRequest;
use crate::codec;
use crate::error::{Error, ProtocolError, Result};
use crate::server::McpServer;
use crate::uri_template::parse_query;

/// Default endpoint path.
const DEFAULT_PATH: &str = "/mcp";

#[derive(Clone)]
struct HttpState {
    server: McpServer,
}

/// Plain request/response HTTP transport.
pub struct HttpTransport {
    server: McpServer,
    path: String,
}

impl HttpTransport {
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            path: DEFAULT_PATH.to_string(),
        }
    }

    /// Override the endpoint path (default `/mcp`).
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Build the axum router. Useful for embedding into a larger app.
    pub fn router(&self) -> Router {
        let state = HttpState {
            server: self.server.clone(),
        };
        let endpoint = axum::routing::post(handle_post)
            .options(handle_options)
            .get(handle_get);

        let mut router = Router::new()
            .route(&self.path, endpoint.clone())
            .route("/health", get(handle_health));
        if !self.path.ends_with('/') {
            router = router.route(&format!("{}/", self.path), endpoint);
        }
        router.with_state(state)
    }

    /// Bind and serve until the process ends.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind {}: {}", addr, e)))?;
        tracing::info!(addr = %addr, path = %self.path, "HTTP transport listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Transport(format!("Server error: {}", e)))
    }
}

/// Build the dispatcher's credential facade from an HTTP request.
fn auth_request(headers: &HeaderMap, query: Option<&str>, body: &str) -> AuthRequest {
    let mut auth = AuthRequest::new().with_body(body.as_bytes().to_vec());
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            auth = auth.with_header(name.as_str(), value);
        }
    }
    for (key, value) in parse_query(query.unwrap_or("")) {
        auth = auth.with_query_param(key, value);
    }
    auth
}

async fn handle_post(
    State(state): State<HttpState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> Response {
    if body.trim().is_empty() {
        let envelope =
            codec::error_envelope(None, &ProtocolError::invalid_request("Empty request body"));
        return (StatusCode::BAD_REQUEST, Json(envelope)).into_response();
    }

    let auth = auth_request(&headers, query.as_deref(), &body);
    match state.server.handle_message(&body, auth).await {
        Some(response) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            response,
        )
            .into_response(),
        // Notification: nothing to send back.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_options() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Content-Type, Authorization, X-API-TOKEN",
            ),
        ],
    )
        .into_response()
}

async fn handle_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn handle_health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}
