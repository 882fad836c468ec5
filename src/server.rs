//! MCP dispatch engine
//!
//! [`McpServer`] is the protocol state machine and method router. It
//! validates the JSON-RPC envelope (via [`crate::codec`]), enforces the
//! initialization handshake, runs authentication, wraps the terminal handler
//! in the middleware chain, and translates raised errors into JSON-RPC
//! error envelopes at exactly one boundary.
//!
//! The server is cheap to clone (shared inner state) and implements
//! `tower_service::Service`, so standard tower middleware composes around it.
//!
//! # Example
//!
//! ```rust
//! use beacon_mcp::{McpServer, ToolBuilder};
//! use beacon_mcp::schema::{ParamSpec, ParamType};
//!
//! let echo = ToolBuilder::new("echo")
//!     .description("Echo the given text")
//!     .param(ParamSpec::required("text", ParamType::String))
//!     .handler(|args, _ctx| async move {
//!         Ok(args["text"].as_str().unwrap_or_default().to_string())
//!     });
//!
//! let server = McpServer::new()
//!     .server_info("my-server", "1.0.0")
//!     .tool(echo);
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::{json, Map, Value};
use tower_service::Service;

use crate::auth::{
    AuthAction, AuthPredicate, AuthProvider, AuthRequest, AuthResult, AuthenticatedUser,
    AuthorizationContext, ComponentType,
};
use crate::codec;
use crate::error::{Error, ProtocolError, Result};
use crate::middleware::{hook_for, Middleware, MiddlewareContext, Next, AUTH_REQUEST_ATTRIBUTE};
use crate::prompt::Prompt;
use crate::protocol::{
    methods, notifications, CancelledParams, CapabilityMarker, Implementation, InitializeResult,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, Message,
    Notification, ProgressParams, Request, ServerCapabilities, PROTOCOL_VERSION,
};
use crate::registry::ComponentRegistry;
use crate::resource::{Resource, ResourceTemplate};
use crate::tool::{CallContext, Tool};

/// Methods that skip authentication regardless of provider presence.
const PUBLIC_METHODS: &[&str] = &[methods::INITIALIZE, methods::INITIALIZED, methods::PING];

/// Methods legal before `initialize`. The list-discovery methods are
/// included so clients can introspect the capability surface up front.
const PRE_INIT_METHODS: &[&str] = &[
    methods::INITIALIZE,
    methods::INITIALIZED,
    methods::PING,
    methods::TOOLS_LIST,
    methods::RESOURCES_LIST,
    methods::RESOURCES_TEMPLATES_LIST,
    methods::PROMPTS_LIST,
];

struct ServerInner {
    name: String,
    version: String,
    instructions: Option<String>,
    registry: ComponentRegistry,
    middlewares: Vec<Arc<dyn Middleware>>,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    auth_required: bool,
    /// Monotonic: set by the first successful `initialize`, never cleared.
    initialized: AtomicBool,
}

impl Clone for ServerInner {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            version: self.version.clone(),
            instructions: self.instructions.clone(),
            registry: self.registry.clone(),
            middlewares: self.middlewares.clone(),
            auth_provider: self.auth_provider.clone(),
            auth_required: self.auth_required,
            initialized: AtomicBool::new(self.initialized.load(Ordering::Acquire)),
        }
    }
}

/// MCP server: component registry + dispatch engine.
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<ServerInner>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version)
            .field("registry", &self.inner.registry)
            .field("middlewares", &self.inner.middlewares.len())
            .field("auth", &self.inner.auth_provider.is_some())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Default for McpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl McpServer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ServerInner {
                name: "beacon-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                instructions: None,
                registry: ComponentRegistry::new(),
                middlewares: Vec::new(),
                auth_provider: None,
                auth_required: false,
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Set server info advertised in the `initialize` result.
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        let inner = Arc::make_mut(&mut self.inner);
        inner.name = name.into();
        inner.version = version.into();
        self
    }

    /// Set instructions for LLMs describing how to use this server.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).instructions = Some(instructions.into());
        self
    }

    /// Register a tool.
    pub fn tool(mut self, tool: Tool) -> Self {
        Arc::make_mut(&mut self.inner).registry.add_tool(tool, None);
        self
    }

    /// Register a tool gated by an authorization predicate.
    pub fn guarded_tool<P>(mut self, tool: Tool, predicate: P) -> Self
    where
        P: Fn(&AuthorizationContext) -> bool + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.inner)
            .registry
            .add_tool(tool, Some(Arc::new(predicate) as AuthPredicate));
        self
    }

    /// Register a resource.
    pub fn resource(mut self, resource: Resource) -> Self {
        Arc::make_mut(&mut self.inner).registry.add_resource(resource, None);
        self
    }

    /// Register a resource gated by an authorization predicate.
    pub fn guarded_resource<P>(mut self, resource: Resource, predicate: P) -> Self
    where
        P: Fn(&AuthorizationContext) -> bool + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.inner)
            .registry
            .add_resource(resource, Some(Arc::new(predicate) as AuthPredicate));
        self
    }

    /// Register a resource template.
    pub fn resource_template(mut self, template: ResourceTemplate) -> Self {
        Arc::make_mut(&mut self.inner)
            .registry
            .add_resource_template(template, None);
        self
    }

    /// Register a resource template gated by an authorization predicate.
    pub fn guarded_resource_template<P>(mut self, template: ResourceTemplate, predicate: P) -> Self
    where
        P: Fn(&AuthorizationContext) -> bool + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.inner)
            .registry
            .add_resource_template(template, Some(Arc::new(predicate) as AuthPredicate));
        self
    }

    /// Register a prompt.
    pub fn prompt(mut self, prompt: Prompt) -> Self {
        Arc::make_mut(&mut self.inner).registry.add_prompt(prompt, None);
        self
    }

    /// Register a prompt gated by an authorization predicate.
    pub fn guarded_prompt<P>(mut self, prompt: Prompt, predicate: P) -> Self
    where
        P: Fn(&AuthorizationContext) -> bool + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.inner)
            .registry
            .add_prompt(prompt, Some(Arc::new(predicate) as AuthPredicate));
        self
    }

    /// Append a middleware. The first-registered middleware is outermost.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        Arc::make_mut(&mut self.inner)
            .middlewares
            .push(Arc::new(middleware));
        self
    }

    /// Set the authentication provider. Without one, all requests are
    /// anonymous.
    pub fn auth_provider<P: AuthProvider + 'static>(mut self, provider: P) -> Self {
        Arc::make_mut(&mut self.inner).auth_provider = Some(Arc::new(provider));
        self
    }

    /// Reject unauthenticated requests to non-public methods.
    pub fn require_auth(mut self) -> Self {
        Arc::make_mut(&mut self.inner).auth_required = true;
        self
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.inner.registry
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Parse a raw frame, dispatch it, and encode the response.
    ///
    /// Returns `None` for notifications. Parse and dispatch failures are
    /// returned as encoded error envelopes; the id echoes the request when
    /// known and is `null` when the parse itself failed.
    pub async fn handle_message(&self, raw: &str, auth: AuthRequest) -> Option<String> {
        let message = match codec::parse(raw.as_bytes()) {
            Ok(message) => message,
            Err(e) => return Some(codec::encode_error(None, &e)),
        };

        match message {
            Message::Notification(notification) => {
                self.handle_notification(notification);
                None
            }
            Message::Request(request) => {
                let id = request.id.clone();
                match self.dispatch(request, Arc::new(auth)).await {
                    Ok(result) => Some(codec::encode_result(&id, result, None)),
                    Err(e) => Some(codec::encode_error(Some(&id), &e.into_protocol())),
                }
            }
        }
    }

    /// Dispatch a parsed request through auth, the init gate, and the
    /// middleware chain to its terminal handler.
    pub async fn dispatch(&self, request: Request, auth: Arc<AuthRequest>) -> Result<Value> {
        let method = request.method.clone();

        let mut user: Option<AuthenticatedUser> = None;
        let mut workspace: Option<String> = None;
        if let Some(provider) = &self.inner.auth_provider {
            if !PUBLIC_METHODS.contains(&method.as_str()) {
                match provider.authenticate(&auth).await {
                    AuthResult::Success {
                        user: authenticated,
                        workspace: scoped,
                    } => {
                        workspace = scoped.or_else(|| authenticated.workspace.clone());
                        user = Some(authenticated);
                    }
                    AuthResult::Failed { reason } => {
                        tracing::debug!(method = %method, reason = %reason, "Authentication failed");
                        return Err(ProtocolError::unauthorized(reason).into());
                    }
                    AuthResult::Unauthenticated => {
                        if self.inner.auth_required {
                            return Err(
                                ProtocolError::unauthorized("Authentication required").into()
                            );
                        }
                    }
                }
            }
        }

        if !self.is_initialized() && !PRE_INIT_METHODS.contains(&method.as_str()) {
            tracing::warn!(method = %method, "Request rejected: server not initialized");
            return Err(ProtocolError::invalid_request("Server not initialized").into());
        }

        let request = Arc::new(request);
        let ctx = MiddlewareContext::new(request, user, workspace);
        ctx.set_attribute(AUTH_REQUEST_ATTRIBUTE, auth);

        let server = self.clone();
        let next = Next::new(
            &self.inner.middlewares,
            hook_for(&method),
            Box::new(move |ctx| Box::pin(async move { server.handle_method(ctx).await })),
        );
        next.run(ctx).await
    }

    /// Handle a notification. Never produces a response.
    pub fn handle_notification(&self, notification: Notification) {
        match notification.method.as_str() {
            notifications::INITIALIZED | methods::INITIALIZED => {
                tracing::info!("Client initialization acknowledged");
            }
            notifications::CANCELLED => {
                match serde_json::from_value::<CancelledParams>(Value::Object(notification.params))
                {
                    Ok(params) => tracing::info!(
                        request_id = %params.request_id,
                        reason = params.reason.as_deref(),
                        "Request cancellation noted"
                    ),
                    Err(_) => tracing::debug!("Malformed cancellation notification"),
                }
            }
            notifications::PROGRESS => {
                match serde_json::from_value::<ProgressParams>(Value::Object(notification.params)) {
                    Ok(params) => tracing::debug!(
                        progress = params.progress,
                        total = params.total,
                        "Progress notification"
                    ),
                    Err(_) => tracing::debug!("Malformed progress notification"),
                }
            }
            method => {
                tracing::debug!(method = %method, "Unhandled notification");
            }
        }
    }

    // =========================================================================
    // Terminal handlers
    // =========================================================================

    async fn handle_method(&self, ctx: MiddlewareContext) -> Result<Value> {
        match ctx.method() {
            methods::INITIALIZE => self.handle_initialize(),
            methods::INITIALIZED => Ok(json!({})),
            methods::PING => Ok(json!({"pong": true})),
            methods::TOOLS_LIST => self.handle_list_tools(&ctx),
            methods::TOOLS_CALL => self.handle_call_tool(&ctx).await,
            methods::RESOURCES_LIST => self.handle_list_resources(&ctx),
            methods::RESOURCES_TEMPLATES_LIST => self.handle_list_resource_templates(&ctx),
            methods::RESOURCES_READ => self.handle_read_resource(&ctx).await,
            methods::PROMPTS_LIST => self.handle_list_prompts(&ctx),
            methods::PROMPTS_GET => self.handle_get_prompt(&ctx).await,
            method => Err(ProtocolError::method_not_found(method).into()),
        }
    }

    fn handle_initialize(&self) -> Result<Value> {
        // Idempotent: the first call flips the flag, later calls return the
        // same info.
        self.inner.initialized.store(true, Ordering::Release);
        tracing::info!(server = %self.inner.name, "Session initialized");

        let registry = &self.inner.registry;
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: registry.has_tools().then(CapabilityMarker::default),
                resources: registry.has_resources().then(CapabilityMarker::default),
                prompts: registry.has_prompts().then(CapabilityMarker::default),
            },
            server_info: Implementation {
                name: self.inner.name.clone(),
                version: self.inner.version.clone(),
            },
            instructions: self.inner.instructions.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }

    fn handle_list_tools(&self, ctx: &MiddlewareContext) -> Result<Value> {
        let mut tools: Vec<_> = self
            .inner
            .registry
            .tools()
            .iter()
            .filter(|entry| {
                self.is_visible(
                    &entry.predicate,
                    ctx,
                    ComponentType::Tool,
                    &entry.component.name,
                    AuthAction::Call,
                )
            })
            .map(|entry| entry.component.descriptor())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }

    async fn handle_call_tool(&self, ctx: &MiddlewareContext) -> Result<Value> {
        let request = ctx.message();
        let name = match request.params.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                return Err(ProtocolError::invalid_params("Tool name must be a string").into());
            }
            None => return Err(ProtocolError::invalid_params("Missing tool name").into()),
        };
        let arguments = match request.params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(
                    ProtocolError::invalid_params("Tool arguments must be an object").into(),
                );
            }
        };

        let entry = self
            .inner
            .registry
            .get_tool(&name)
            .ok_or_else(|| ProtocolError::not_found(format!("Unknown tool: {}", name)))?;

        // Predicate and scope gates are independent; either denial is
        // Forbidden.
        self.check_predicate(
            &entry.predicate,
            ctx,
            ComponentType::Tool,
            &name,
            AuthAction::Call,
            arguments.clone(),
        )?;
        if let Some(user) = ctx.user() {
            if !user.scopes.is_empty() && !user.has_scope(&format!("tools:{}", name)) {
                tracing::debug!(tool = %name, user = %user.id, "Scope denied");
                return Err(ProtocolError::forbidden(format!(
                    "Missing scope for tool '{}'",
                    name
                ))
                .into());
            }
        }

        let call_ctx = CallContext::new(request.id.to_string());
        tracing::debug!(tool = %name, "Calling tool");
        let result = entry.component.execute(arguments, call_ctx).await;
        Ok(serde_json::to_value(result)?)
    }

    fn handle_list_resources(&self, ctx: &MiddlewareContext) -> Result<Value> {
        let mut resources: Vec<_> = self
            .inner
            .registry
            .resources()
            .iter()
            .filter(|entry| {
                self.is_visible(
                    &entry.predicate,
                    ctx,
                    ComponentType::Resource,
                    &entry.component.uri,
                    AuthAction::Read,
                )
            })
            .map(|entry| entry.component.descriptor())
            .collect();
        resources.sort_by(|a, b| a.uri.cmp(&b.uri));

        Ok(serde_json::to_value(ListResourcesResult { resources })?)
    }

    fn handle_list_resource_templates(&self, ctx: &MiddlewareContext) -> Result<Value> {
        let mut resource_templates: Vec<_> = self
            .inner
            .registry
            .resource_templates()
            .iter()
            .filter(|entry| {
                self.is_visible(
                    &entry.predicate,
                    ctx,
                    ComponentType::Resource,
                    &entry.component.uri_template,
                    AuthAction::Read,
                )
            })
            .map(|entry| entry.component.descriptor())
            .collect();
        resource_templates.sort_by(|a, b| a.uri_template.cmp(&b.uri_template));

        Ok(serde_json::to_value(ListResourceTemplatesResult {
            resource_templates,
        })?)
    }

    async fn handle_read_resource(&self, ctx: &MiddlewareContext) -> Result<Value> {
        let request = ctx.message();
        let uri = request
            .string_param("uri")
            .ok_or_else(|| ProtocolError::invalid_params("Missing resource uri"))?
            .to_string();

        if let Some(entry) = self.inner.registry.get_resource(&uri) {
            self.check_predicate(
                &entry.predicate,
                ctx,
                ComponentType::Resource,
                &uri,
                AuthAction::Read,
                Map::new(),
            )?;
            tracing::debug!(uri = %uri, "Reading resource");
            let result = entry.component.read().await?;
            return Ok(serde_json::to_value(result)?);
        }

        // Templates are consulted in registration order, first match wins.
        for entry in self.inner.registry.resource_templates() {
            if let Some(variables) = entry.component.matches(&uri) {
                self.check_predicate(
                    &entry.predicate,
                    ctx,
                    ComponentType::Resource,
                    &entry.component.uri_template,
                    AuthAction::Read,
                    Map::new(),
                )?;
                tracing::debug!(
                    uri = %uri,
                    template = %entry.component.uri_template,
                    "Reading resource via template"
                );
                let result = entry.component.read(&uri, variables).await?;
                return Ok(serde_json::to_value(result)?);
            }
        }

        Err(ProtocolError::not_found(format!("Unknown resource: {}", uri)).into())
    }

    fn handle_list_prompts(&self, ctx: &MiddlewareContext) -> Result<Value> {
        let mut prompts: Vec<_> = self
            .inner
            .registry
            .prompts()
            .iter()
            .filter(|entry| {
                self.is_visible(
                    &entry.predicate,
                    ctx,
                    ComponentType::Prompt,
                    &entry.component.name,
                    AuthAction::Get,
                )
            })
            .map(|entry| entry.component.descriptor())
            .collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(serde_json::to_value(ListPromptsResult { prompts })?)
    }

    async fn handle_get_prompt(&self, ctx: &MiddlewareContext) -> Result<Value> {
        let request = ctx.message();
        let name = request
            .string_param("name")
            .ok_or_else(|| ProtocolError::invalid_params("Missing prompt name"))?
            .to_string();

        let entry = self
            .inner
            .registry
            .get_prompt(&name)
            .ok_or_else(|| ProtocolError::not_found(format!("Unknown prompt: {}", name)))?;

        let arguments = match request.params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(
                    ProtocolError::invalid_params("Prompt arguments must be an object").into(),
                );
            }
        };
        self.check_predicate(
            &entry.predicate,
            ctx,
            ComponentType::Prompt,
            &name,
            AuthAction::Get,
            arguments.clone(),
        )?;

        let mut args: HashMap<String, String> = HashMap::new();
        for (key, value) in arguments {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            args.insert(key, text);
        }

        tracing::debug!(prompt = %name, "Getting prompt");
        let result = entry.component.get(args).await?;
        Ok(serde_json::to_value(result)?)
    }

    // =========================================================================
    // Authorization
    // =========================================================================

    /// Discovery visibility: a component is visible when it has no
    /// predicate, or when an authenticated user passes it. An absent user
    /// hides every predicate-bearing component.
    fn is_visible(
        &self,
        predicate: &Option<AuthPredicate>,
        ctx: &MiddlewareContext,
        component_type: ComponentType,
        component_name: &str,
        action: AuthAction,
    ) -> bool {
        let Some(predicate) = predicate else {
            return true;
        };
        let Some(user) = ctx.user() else {
            return false;
        };
        predicate(&AuthorizationContext {
            user: user.clone(),
            component_type,
            component_name: component_name.to_string(),
            action,
            arguments: Map::new(),
            workspace: ctx.workspace().map(str::to_string),
        })
    }

    /// Invocation gate mirroring [`Self::is_visible`]: predicate denial (or
    /// a predicate with no user) is `Forbidden`.
    fn check_predicate(
        &self,
        predicate: &Option<AuthPredicate>,
        ctx: &MiddlewareContext,
        component_type: ComponentType,
        component_name: &str,
        action: AuthAction,
        arguments: Map<String, Value>,
    ) -> Result<()> {
        let Some(predicate) = predicate else {
            return Ok(());
        };
        let denied = || {
            ProtocolError::forbidden(format!(
                "Access to {} '{}' denied",
                component_type, component_name
            ))
        };
        let Some(user) = ctx.user() else {
            return Err(denied().into());
        };
        let auth_ctx = AuthorizationContext {
            user: user.clone(),
            component_type,
            component_name: component_name.to_string(),
            action,
            arguments,
            workspace: ctx.workspace().map(str::to_string),
        };
        if predicate(&auth_ctx) {
            Ok(())
        } else {
            tracing::debug!(
                component = %component_name,
                user = %user.id,
                "Authorization predicate denied"
            );
            Err(denied().into())
        }
    }
}

// =============================================================================
// Tower Service implementation
// =============================================================================

/// Request type for the tower `Service` implementation: one parsed request
/// plus its transport credentials.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub request: Request,
    pub auth: AuthRequest,
}

impl DispatchRequest {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            auth: AuthRequest::default(),
        }
    }

    pub fn with_auth(mut self, auth: AuthRequest) -> Self {
        self.auth = auth;
        self
    }
}

impl Service<DispatchRequest> for McpServer {
    /// The full JSON-RPC envelope. Errors live inside it; the service never
    /// fails at the tower level.
    type Response = Value;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Value, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        let server = self.clone();
        Box::pin(async move {
            let id = req.request.id.clone();
            let envelope = match server.dispatch(req.request, Arc::new(req.auth)).await {
                Ok(result) => codec::result_envelope(&id, result, None),
                Err(e) => codec::error_envelope(Some(&id), &e.into_protocol()),
            };
            Ok(envelope)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptBuilder;
    use crate::protocol::PromptMessage;
    use crate::resource::{ResourceBuilder, ResourceTemplateBuilder};
    use crate::schema::{ParamSpec, ParamType};
    use crate::tool::ToolBuilder;

    fn echo_tool() -> Tool {
        ToolBuilder::new("echo")
            .description("Echo the given text")
            .param(ParamSpec::required("text", ParamType::String))
            .handler(|args, _ctx| async move {
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            })
    }

    fn test_server() -> McpServer {
        McpServer::new().server_info("Test", "1.0.0").tool(echo_tool())
    }

    async fn send(server: &McpServer, raw: &str) -> Value {
        let response = server
            .handle_message(raw, AuthRequest::default())
            .await
            .expect("expected a response");
        serde_json::from_str(&response).unwrap()
    }

    async fn initialize(server: &McpServer) {
        send(
            server,
            r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{}}"#,
        )
        .await;
    }

    #[tokio::test]
    async fn initialize_advertises_present_categories() {
        let server = test_server();
        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;

        assert_eq!(
            response["result"],
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "Test", "version": "1.0.0"},
            })
        );
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let server = test_server();
        let first = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;
        let second = send(
            &server,
            r#"{"jsonrpc":"2.0","id":2,"method":"initialize","params":{}}"#,
        )
        .await;
        assert_eq!(first["result"], second["result"]);
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn pre_init_gate_rejects_non_whitelisted_methods() {
        let server = test_server();
        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], json!(-32600));
        assert_eq!(response["error"]["message"], json!("Server not initialized"));
    }

    #[tokio::test]
    async fn list_methods_are_allowed_before_init() {
        let server = test_server();
        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#,
        )
        .await;
        assert_eq!(response["result"]["tools"][0]["name"], json!("echo"));
    }

    #[tokio::test]
    async fn ping_returns_pong() {
        let server = test_server();
        let response = send(&server, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
        assert_eq!(response["result"], json!({"pong": true}));
    }

    #[tokio::test]
    async fn unknown_method_after_init() {
        let server = test_server();
        initialize(&server).await;
        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/frobnicate","params":{}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn call_tool_returns_text_content() {
        let server = test_server();
        initialize(&server).await;
        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"echo","arguments":{"text":"hi"}}}"#,
        )
        .await;
        assert_eq!(
            response["result"],
            json!({"content": [{"type": "text", "text": "hi"}]})
        );
    }

    #[tokio::test]
    async fn call_tool_requires_string_name() {
        let server = test_server();
        initialize(&server).await;
        for params in [r#"{}"#, r#"{"name":7}"#] {
            let raw = format!(
                r#"{{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{}}}"#,
                params
            );
            let response = send(&server, &raw).await;
            assert_eq!(response["error"]["code"], json!(-32602));
        }
    }

    #[tokio::test]
    async fn call_unknown_tool_is_not_found() {
        let server = test_server();
        initialize(&server).await;
        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"nope"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], json!(-32001));
    }

    #[tokio::test]
    async fn tool_exceptions_are_not_protocol_errors() {
        let failing = ToolBuilder::new("fail")
            .handler(|_args, _ctx| async move { Err::<String, _>(Error::handler("kaput")) });
        let server = McpServer::new().tool(failing);
        initialize(&server).await;

        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"fail"}}"#,
        )
        .await;
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], json!(true));
        assert_eq!(response["result"]["content"][0]["text"], json!("kaput"));
    }

    #[tokio::test]
    async fn template_read_binds_typed_variables() {
        let server = McpServer::new().resource_template(
            ResourceTemplateBuilder::new("users://{id}")
                .param(ParamSpec::required("id", ParamType::Integer))
                .handler(|args| async move {
                    let id = args["id"].as_i64().unwrap();
                    Ok(json!({"id": id, "name": format!("User {}", id)}).into())
                }),
        );
        initialize(&server).await;

        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"users://42"}}"#,
        )
        .await;
        let text = response["result"]["contents"][0]["text"].as_str().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"id": 42, "name": "User 42"}));
    }

    #[tokio::test]
    async fn exact_resource_wins_over_template() {
        let server = McpServer::new()
            .resource(ResourceBuilder::new("users://42").text("static"))
            .resource_template(
                ResourceTemplateBuilder::new("users://{id}")
                    .handler(|_args| async move { Ok("templated".into()) }),
            );
        initialize(&server).await;

        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"users://42"}}"#,
        )
        .await;
        assert_eq!(response["result"]["contents"][0]["text"], json!("static"));
    }

    #[tokio::test]
    async fn unmatched_resource_is_not_found() {
        let server = McpServer::new().resource(ResourceBuilder::new("a://b").text("x"));
        initialize(&server).await;
        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"c://d"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], json!(-32001));
    }

    #[tokio::test]
    async fn templates_are_not_listed_as_resources() {
        let server = McpServer::new()
            .resource(ResourceBuilder::new("a://b").text("x"))
            .resource_template(
                ResourceTemplateBuilder::new("t://{v}").handler(|_| async move { Ok("".into()) }),
            );
        initialize(&server).await;

        let resources = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"resources/list","params":{}}"#,
        )
        .await;
        assert_eq!(resources["result"]["resources"].as_array().unwrap().len(), 1);

        let templates = send(
            &server,
            r#"{"jsonrpc":"2.0","id":2,"method":"resources/templates/list","params":{}}"#,
        )
        .await;
        assert_eq!(
            templates["result"]["resourceTemplates"][0]["uriTemplate"],
            json!("t://{v}")
        );
    }

    #[tokio::test]
    async fn prompt_get_renders_messages() {
        let server = McpServer::new().prompt(
            PromptBuilder::new("greet")
                .required_arg("name", None)
                .handler(|args| async move {
                    Ok(PromptMessage::user(format!(
                        "Hello {}",
                        args.get("name").map(String::as_str).unwrap_or("?")
                    )))
                }),
        );
        initialize(&server).await;

        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"prompts/get","params":{"name":"greet","arguments":{"name":"Ada"}}}"#,
        )
        .await;
        assert_eq!(
            response["result"]["messages"][0]["content"]["text"],
            json!("Hello Ada")
        );
    }

    #[tokio::test]
    async fn unknown_prompt_is_not_found() {
        let server = McpServer::new();
        initialize(&server).await;
        let response = send(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"prompts/get","params":{"name":"x"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], json!(-32001));
    }

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let server = test_server();
        let response = server
            .handle_message(
                r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1}}"#,
                AuthRequest::default(),
            )
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn parse_error_has_null_id() {
        let server = test_server();
        let response = send(&server, "not json").await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], json!(-32700));
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Parse error"));
    }

    #[tokio::test]
    async fn tower_service_wraps_dispatch() {
        use tower::ServiceExt;

        let server = test_server();
        initialize(&server).await;

        let request = Request::new(5, methods::PING);
        let envelope = server
            .clone()
            .oneshot(DispatchRequest::new(request))
            .await
            .unwrap();
        assert_eq!(envelope["result"], json!({"pong": true}));
        assert_eq!(envelope["id"], json!(5));
    }
}
