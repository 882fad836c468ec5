//! Hook-based middleware chain
//!
//! Middleware entries expose eight optional hooks keyed by MCP method:
//! `on_initialize`, `on_call_tool`, `on_list_tools`, `on_read_resource`,
//! `on_list_resources`, `on_get_prompt`, `on_list_prompts`, and the
//! catch-all `on_request`. A method maps to its hook through a fixed table;
//! methods without a specific hook run through `on_request` only.
//!
//! For each request every middleware contributes two layers: an `on_request`
//! outer layer and a method-specific inner layer. The first-registered
//! middleware is outermost in both phases, so with middlewares `[m1, m2]`
//! execution runs `m1.on_request → m2.on_request → m1.on_<hook> →
//! m2.on_<hook> → handler` and unwinds in reverse.
//!
//! A hook either awaits `next.run(ctx)` (possibly rewriting the returned
//! result) or returns its own result without calling `next`, short-circuiting
//! everything below it. Errors raised in hooks propagate outward untouched;
//! the dispatcher boundary turns them into `InternalError` envelopes unless
//! they are typed protocol errors.
//!
//! # Example
//!
//! ```rust
//! use beacon_mcp::middleware::{Middleware, MiddlewareContext, Next};
//! use beacon_mcp::Result;
//! use serde_json::Value;
//!
//! struct Stamp;
//!
//! #[async_trait::async_trait]
//! impl Middleware for Stamp {
//!     async fn on_call_tool(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
//!         let mut result = next.run(ctx).await?;
//!         if let Some(obj) = result.as_object_mut() {
//!             obj.insert("stamped".into(), Value::Bool(true));
//!         }
//!         Ok(result)
//!     }
//! }
//! ```

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::{AuthRequest, AuthenticatedUser};
use crate::error::Result;
use crate::protocol::Request;
use crate::tool::BoxFuture;

/// Attribute key under which the dispatcher stores the incoming
/// [`AuthRequest`], so authentication middleware can read it.
pub const AUTH_REQUEST_ATTRIBUTE: &str = "authRequest";

type AttributeMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Per-request context flowing through the middleware chain.
///
/// Identity fields are read-only; [`with_user`](Self::with_user) and
/// [`with_workspace`](Self::with_workspace) produce new instances so earlier
/// layers keep their pre-authentication view. The `attributes` map is the
/// only mutable channel and is shared by all copies for the request.
#[derive(Clone)]
pub struct MiddlewareContext {
    message: Arc<Request>,
    timestamp: SystemTime,
    user: Option<AuthenticatedUser>,
    workspace: Option<String>,
    attributes: Arc<RwLock<AttributeMap>>,
}

impl std::fmt::Debug for MiddlewareContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareContext")
            .field("method", &self.message.method)
            .field("user", &self.user.as_ref().map(|u| &u.id))
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

impl MiddlewareContext {
    pub(crate) fn new(
        message: Arc<Request>,
        user: Option<AuthenticatedUser>,
        workspace: Option<String>,
    ) -> Self {
        Self {
            message,
            timestamp: SystemTime::now(),
            user,
            workspace,
            attributes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn message(&self) -> &Request {
        &self.message
    }

    pub fn method(&self) -> &str {
        &self.message.method
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        self.user.as_ref()
    }

    pub fn workspace(&self) -> Option<&str> {
        self.workspace.as_deref()
    }

    /// A copy of this context with the user attached. The attributes map is
    /// shared with the original.
    pub fn with_user(&self, user: AuthenticatedUser) -> Self {
        let mut ctx = self.clone();
        ctx.user = Some(user);
        ctx
    }

    /// A copy of this context with the workspace attached.
    pub fn with_workspace(&self, workspace: impl Into<String>) -> Self {
        let mut ctx = self.clone();
        ctx.workspace = Some(workspace.into());
        ctx
    }

    pub fn set_attribute<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        if let Ok(mut attrs) = self.attributes.write() {
            attrs.insert(key.into(), Arc::new(value));
        }
    }

    pub fn get_attribute<T: Any + Send + Sync + Clone>(&self, key: &str) -> Option<T> {
        self.attributes
            .read()
            .ok()
            .and_then(|attrs| attrs.get(key).cloned())
            .and_then(|any| any.downcast_ref::<T>().cloned())
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes
            .read()
            .map(|attrs| attrs.contains_key(key))
            .unwrap_or(false)
    }

    /// The transport's credential facade, attached by the dispatcher under
    /// [`AUTH_REQUEST_ATTRIBUTE`].
    pub fn auth_request(&self) -> Option<Arc<AuthRequest>> {
        self.get_attribute::<Arc<AuthRequest>>(AUTH_REQUEST_ATTRIBUTE)
    }
}

/// Method-specific hook selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hook {
    Initialize,
    CallTool,
    ListTools,
    ReadResource,
    ListResources,
    GetPrompt,
    ListPrompts,
}

/// The fixed method → hook table. Unlisted methods use `on_request` only.
pub(crate) fn hook_for(method: &str) -> Option<Hook> {
    use crate::protocol::methods;
    match method {
        methods::INITIALIZE => Some(Hook::Initialize),
        methods::TOOLS_CALL => Some(Hook::CallTool),
        methods::TOOLS_LIST => Some(Hook::ListTools),
        methods::RESOURCES_READ => Some(Hook::ReadResource),
        methods::RESOURCES_LIST | methods::RESOURCES_TEMPLATES_LIST => Some(Hook::ListResources),
        methods::PROMPTS_GET => Some(Hook::GetPrompt),
        methods::PROMPTS_LIST => Some(Hook::ListPrompts),
        _ => None,
    }
}

/// An interceptor in the middleware chain. All hooks default to passing
/// through.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn on_request(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        next.run(ctx).await
    }

    async fn on_initialize(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        next.run(ctx).await
    }

    async fn on_call_tool(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        next.run(ctx).await
    }

    async fn on_list_tools(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        next.run(ctx).await
    }

    async fn on_read_resource(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        next.run(ctx).await
    }

    async fn on_list_resources(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        next.run(ctx).await
    }

    async fn on_get_prompt(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        next.run(ctx).await
    }

    async fn on_list_prompts(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        next.run(ctx).await
    }
}

#[derive(Clone, Copy)]
enum LayerKind {
    Request,
    Method(Hook),
}

/// The terminal handler at the center of the chain.
pub(crate) type Terminal = Box<dyn FnOnce(MiddlewareContext) -> BoxFuture<'static, Result<Value>> + Send>;

/// The remainder of the chain below the current hook.
///
/// Await [`run`](Self::run) to continue; drop without calling it to
/// short-circuit.
pub struct Next {
    layers: VecDeque<(Arc<dyn Middleware>, LayerKind)>,
    terminal: Terminal,
}

impl Next {
    /// Assemble the two-phase layer list around a terminal handler: every
    /// middleware's `on_request` layer first (registration order), then the
    /// method-specific layers (registration order), then the terminal.
    pub(crate) fn new(
        chain: &[Arc<dyn Middleware>],
        hook: Option<Hook>,
        terminal: Terminal,
    ) -> Self {
        let mut layers = VecDeque::with_capacity(chain.len() * 2);
        for mw in chain {
            layers.push_back((mw.clone(), LayerKind::Request));
        }
        if let Some(hook) = hook {
            for mw in chain {
                layers.push_back((mw.clone(), LayerKind::Method(hook)));
            }
        }
        Self { layers, terminal }
    }

    /// Run the rest of the chain.
    pub async fn run(mut self, ctx: MiddlewareContext) -> Result<Value> {
        match self.layers.pop_front() {
            None => (self.terminal)(ctx).await,
            Some((mw, LayerKind::Request)) => mw.on_request(ctx, self).await,
            Some((mw, LayerKind::Method(hook))) => match hook {
                Hook::Initialize => mw.on_initialize(ctx, self).await,
                Hook::CallTool => mw.on_call_tool(ctx, self).await,
                Hook::ListTools => mw.on_list_tools(ctx, self).await,
                Hook::ReadResource => mw.on_read_resource(ctx, self).await,
                Hook::ListResources => mw.on_list_resources(ctx, self).await,
                Hook::GetPrompt => mw.on_get_prompt(ctx, self).await,
                Hook::ListPrompts => mw.on_list_prompts(ctx, self).await,
            },
        }
    }
}

/// Middleware that logs every request with its duration and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware {
    _priv: (),
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn on_request(&self, ctx: MiddlewareContext, next: Next) -> Result<Value> {
        let method = ctx.method().to_string();
        let request_id = ctx.message().id.to_string();
        let start = std::time::Instant::now();

        let result = next.run(ctx).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => {
                tracing::info!(
                    method = %method,
                    request_id = %request_id,
                    duration_ms = duration_ms,
                    "MCP request completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    method = %method,
                    request_id = %request_id,
                    duration_ms = duration_ms,
                    error = %e,
                    "MCP request failed"
                );
            }
        }

        result
    }
}
