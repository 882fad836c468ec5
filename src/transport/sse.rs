//! Streaming-event HTTP (SSE) transport for MCP
//!
//! Operational but not recommended for new deployments; prefer
//! [`HttpTransport`](crate::HttpTransport).
//!
//! `GET /sse` opens the event stream. The server generates a session id
//! (128 bits of randomness, hex-encoded), stores the request's credentials
//! against it, and emits an `endpoint` event pointing the client at
//! `POST /message?sessionId=<id>`. A `ping` event carrying the epoch time is
//! emitted every 15 seconds. Out-of-band POSTs are re-associated with their
//! stream's credentials through the session table; the table entry is
//! removed when the stream closes.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::json;
use tokio_stream::wrappers::IntervalStream;

use crate::auth::AuthRequest;
use crate::codec;
use crate::error::{Error, ProtocolError, Result};
use crate::server::McpServer;
use crate::uri_template::parse_query;

/// Interval between `ping` events.
const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Session state kept between the stream open and subsequent POSTs.
struct SseSession {
    auth: AuthRequest,
    #[allow(dead_code)]
    created_at: Instant,
}

type SessionTable = Arc<RwLock<HashMap<String, SseSession>>>;

#[derive(Clone)]
struct SseState {
    server: McpServer,
    sessions: SessionTable,
    ping_interval: Duration,
}

/// Streaming-event HTTP transport.
pub struct SseTransport {
    server: McpServer,
    sessions: SessionTable,
    ping_interval: Duration,
}

impl SseTransport {
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ping_interval: PING_INTERVAL,
        }
    }

    /// Override the ping cadence (default 15s).
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Build the axum router. Useful for embedding into a larger app.
    pub fn router(&self) -> Router {
        let state = SseState {
            server: self.server.clone(),
            sessions: self.sessions.clone(),
            ping_interval: self.ping_interval,
        };
        Router::new()
            .route("/sse", get(handle_sse))
            .route("/message", post(handle_message))
            .with_state(state)
    }

    /// Bind and serve until the process ends.
    pub async fn serve(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind {}: {}", addr, e)))?;
        tracing::info!(addr = %addr, "SSE transport listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Transport(format!("Server error: {}", e)))
    }

    #[cfg(test)]
    fn session_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Removes the session entry when its stream is dropped.
struct SessionGuard {
    id: String,
    sessions: SessionTable,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&self.id);
        }
        tracing::debug!(session_id = %self.id, "SSE session closed");
    }
}

async fn handle_sse(
    State(state): State<SseState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let session_id = uuid::Uuid::new_v4().simple().to_string();

    let mut auth = AuthRequest::new();
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            auth = auth.with_header(name.as_str(), value);
        }
    }
    for (key, value) in parse_query(query.as_deref().unwrap_or("")) {
        auth = auth.with_query_param(key, value);
    }

    if let Ok(mut sessions) = state.sessions.write() {
        sessions.insert(
            session_id.clone(),
            SseSession {
                auth,
                created_at: Instant::now(),
            },
        );
    }
    tracing::info!(session_id = %session_id, "SSE session opened");

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let endpoint = Event::default().event("endpoint").data(
        json!({"uri": format!("http://{}/message?sessionId={}", host, session_id)}).to_string(),
    );

    let guard = SessionGuard {
        id: session_id,
        sessions: state.sessions.clone(),
    };
    let interval = tokio::time::interval_at(
        tokio::time::Instant::now() + state.ping_interval,
        state.ping_interval,
    );
    let pings = IntervalStream::new(interval).map(move |_| {
        let _ = &guard;
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok::<Event, Infallible>(
            Event::default()
                .event("ping")
                .data(json!({"time": epoch}).to_string()),
        )
    });
    let stream = futures::stream::once(async move { Ok(endpoint) }).chain(pings);

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream),
    )
        .into_response()
}

async fn handle_message(
    State(state): State<SseState>,
    RawQuery(query): RawQuery,
    body: String,
) -> Response {
    let query = parse_query(query.as_deref().unwrap_or(""));
    let Some(session_id) = query.get("sessionId") else {
        return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response();
    };

    let auth = state
        .sessions
        .read()
        .ok()
        .and_then(|sessions| sessions.get(session_id).map(|s| s.auth.clone()));
    let Some(auth) = auth else {
        tracing::debug!(session_id = %session_id, "Unknown SSE session");
        return (StatusCode::BAD_REQUEST, "Unknown session").into_response();
    };

    if body.trim().is_empty() {
        let envelope =
            codec::error_envelope(None, &ProtocolError::invalid_request("Empty request body"));
        return (StatusCode::BAD_REQUEST, Json(envelope)).into_response();
    }

    match state.server.handle_message(&body, auth).await {
        Some(response) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            response,
        )
            .into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
