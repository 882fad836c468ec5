//! Tool definition and builder API
//!
//! Provides two ways to define MCP tools:
//!
//! 1. **Parameter list** - declare each parameter with [`ParamSpec`]; the
//!    framework derives the input schema, binds arguments in declared order
//!    (defaults, nullable fill, required presence), and coerces
//!    string-sourced values to the declared type.
//! 2. **Typed input** - declare a `JsonSchema + DeserializeOwned` input
//!    struct; the schema comes from `schemars` and the whole arguments
//!    object is deserialized into it.
//!
//! Either way, handler return values are normalized through
//! [`IntoToolResult`], and handler errors become `{isError: true}` results
//! rather than protocol errors.
//!
//! # Example
//!
//! ```rust
//! use beacon_mcp::tool::{Tool, ToolBuilder};
//! use beacon_mcp::schema::{ParamSpec, ParamType};
//!
//! let echo = ToolBuilder::new("echo")
//!     .description("Echo the given text")
//!     .param(ParamSpec::required("text", ParamType::String))
//!     .handler(|args, _ctx| async move {
//!         let text = args["text"].as_str().unwrap_or_default().to_string();
//!         Ok(text)
//!     });
//! assert_eq!(echo.name, "echo");
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::protocol::{Content, ToolDescriptor, ToolResult};
use crate::schema::{self, ParamSpec};

/// A boxed future for tool handlers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-invocation context passed to any callable that declares a context
/// parameter. Never shared across requests.
///
/// Logging happens through `tracing`; the context carries the request
/// identity so handlers can attach it to their own spans.
#[derive(Clone)]
pub struct CallContext {
    request_id: String,
    client_id: Option<String>,
    state: Arc<RwLock<HashMap<String, Value>>>,
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("request_id", &self.request_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl CallContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client_id: None,
            state: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Store transient per-call state.
    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut state) = self.state.write() {
            state.insert(key.into(), value);
        }
    }

    /// Read transient per-call state.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.read().ok().and_then(|s| s.get(key).cloned())
    }
}

/// Conversion of handler return values into the wire result shape.
///
/// Recognized shapes: a string becomes one text block; a structural value is
/// JSON-serialized into a single text block (kept as `structuredContent`); a
/// list of content blocks is taken as-is; a [`ToolResult`] passes through.
pub trait IntoToolResult {
    fn into_tool_result(self) -> ToolResult;
}

impl IntoToolResult for ToolResult {
    fn into_tool_result(self) -> ToolResult {
        self
    }
}

impl IntoToolResult for String {
    fn into_tool_result(self) -> ToolResult {
        ToolResult::text(self)
    }
}

impl IntoToolResult for &str {
    fn into_tool_result(self) -> ToolResult {
        ToolResult::text(self)
    }
}

impl IntoToolResult for Value {
    fn into_tool_result(self) -> ToolResult {
        match self {
            Value::String(s) => ToolResult::text(s),
            other => ToolResult::json(other),
        }
    }
}

impl IntoToolResult for Vec<Content> {
    fn into_tool_result(self) -> ToolResult {
        ToolResult {
            content: self,
            is_error: false,
            structured_content: None,
            meta: None,
        }
    }
}

impl IntoToolResult for Content {
    fn into_tool_result(self) -> ToolResult {
        vec![self].into_tool_result()
    }
}

/// Tool handler trait - the core abstraction for tool execution
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with already-bound arguments.
    fn call(&self, args: Map<String, Value>, ctx: CallContext) -> BoxFuture<'_, Result<ToolResult>>;
}

/// A complete tool definition with handler.
pub struct Tool {
    pub name: String,
    /// Human text; may be empty.
    pub description: String,
    /// Advisory metadata.
    pub tags: Vec<String>,
    /// Advisory execution budget; enforcement surfaces as a handler-level
    /// error, never a protocol error.
    pub timeout: Option<Duration>,
    params: Vec<ParamSpec>,
    input_schema: Value,
    handler: Arc<dyn ToolHandler>,
}

impl Clone for Tool {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            timeout: self.timeout,
            params: self.params.clone(),
            input_schema: self.input_schema.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Tool {
    /// Create a new tool builder
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(name)
    }

    /// The tools/list entry for this tool.
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Execute the tool against raw client arguments.
    ///
    /// Binding failures and handler errors both produce `isError` results;
    /// this method is infallible at the protocol tier.
    pub async fn execute(&self, arguments: Map<String, Value>, ctx: CallContext) -> ToolResult {
        let bound = if self.params.is_empty() {
            Ok(arguments)
        } else {
            bind_arguments(&self.params, arguments)
        };
        let bound = match bound {
            Ok(bound) => bound,
            Err(message) => {
                tracing::debug!(tool = %self.name, error = %message, "Argument binding failed");
                return ToolResult::error(message);
            }
        };

        match self.handler.call(bound, ctx).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(tool = %self.name, error = %e, "Tool execution failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}

/// Bind client arguments against a declared parameter list.
///
/// For each declared parameter in order: use the matching key when present
/// (coercing string-sourced values to the declared type), else the default,
/// else `null` for nullable parameters, else fail.
pub(crate) fn bind_arguments(
    params: &[ParamSpec],
    mut arguments: Map<String, Value>,
) -> std::result::Result<Map<String, Value>, String> {
    let mut bound = Map::new();
    for param in params {
        if param.is_context() {
            continue;
        }
        match arguments.remove(&param.name) {
            Some(value) => {
                let value = schema::coerce(&param.name, value, &param.ty)?;
                bound.insert(param.name.clone(), value);
            }
            None => {
                if let Some(default) = &param.default {
                    bound.insert(param.name.clone(), default.clone());
                } else if param.ty.is_nullable() {
                    bound.insert(param.name.clone(), Value::Null);
                } else {
                    return Err(format!("Missing required argument: {}", param.name));
                }
            }
        }
    }
    Ok(bound)
}

// =============================================================================
// Builder API
// =============================================================================

/// Builder for creating tools with a fluent API
///
/// # Example
///
/// ```rust,ignore
/// let tool = ToolBuilder::new("greet")
///     .description("Greet someone by name")
///     .param(ParamSpec::required("name", ParamType::String))
///     .handler(|args, _ctx| async move {
///         Ok(format!("Hello, {}!", args["name"].as_str().unwrap_or("?")))
///     });
/// ```
pub struct ToolBuilder {
    name: String,
    description: String,
    tags: Vec<String>,
    timeout: Option<Duration>,
    params: Vec<ParamSpec>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            timeout: None,
            params: Vec::new(),
        }
    }

    /// Set the tool description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add an advisory tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the advisory timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declare a parameter. Order matters for binding.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Declare a context parameter the server fills per call.
    pub fn context_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamSpec::context(name));
        self
    }

    /// Finish with a handler receiving the bound arguments and call context.
    pub fn handler<F, Fut, R>(self, handler: F) -> Tool
    where
        F: Fn(Map<String, Value>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoToolResult + Send + 'static,
    {
        let input_schema = schema::input_schema(&self.params);
        Tool {
            name: self.name,
            description: self.description,
            tags: self.tags,
            timeout: self.timeout,
            params: self.params,
            input_schema,
            handler: Arc::new(FnHandler { handler }),
        }
    }

    /// Finish with a typed handler; the input schema is derived from `I`.
    ///
    /// Declared [`ParamSpec`]s are ignored on this path; the whole arguments
    /// object is deserialized into `I`.
    pub fn typed_handler<I, F, Fut, R>(self, handler: F) -> Tool
    where
        I: JsonSchema + DeserializeOwned + Send + Sync + 'static,
        F: Fn(I, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoToolResult + Send + 'static,
    {
        let input_schema = serde_json::to_value(schemars::schema_for!(I))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
        Tool {
            name: self.name,
            description: self.description,
            tags: self.tags,
            timeout: self.timeout,
            params: Vec::new(),
            input_schema,
            handler: Arc::new(TypedHandler {
                handler,
                _phantom: std::marker::PhantomData::<fn() -> I>,
            }),
        }
    }
}

/// Handler over bound argument maps
struct FnHandler<F> {
    handler: F,
}

impl<F, Fut, R> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: IntoToolResult + Send + 'static,
{
    fn call(&self, args: Map<String, Value>, ctx: CallContext) -> BoxFuture<'_, Result<ToolResult>> {
        let fut = (self.handler)(args, ctx);
        Box::pin(async move { fut.await.map(IntoToolResult::into_tool_result) })
    }
}

/// Handler that deserializes arguments into a typed input
struct TypedHandler<I, F> {
    handler: F,
    _phantom: std::marker::PhantomData<fn() -> I>,
}

impl<I, F, Fut, R> ToolHandler for TypedHandler<I, F>
where
    I: JsonSchema + DeserializeOwned + Send + Sync + 'static,
    F: Fn(I, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: IntoToolResult + Send + 'static,
{
    fn call(&self, args: Map<String, Value>, ctx: CallContext) -> BoxFuture<'_, Result<ToolResult>> {
        let input: std::result::Result<I, _> = serde_json::from_value(Value::Object(args));
        match input {
            Ok(input) => {
                let fut = (self.handler)(input, ctx);
                Box::pin(async move { fut.await.map(IntoToolResult::into_tool_result) })
            }
            Err(e) => Box::pin(async move { Err(Error::handler(format!("Invalid arguments: {}", e))) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamType;
    use serde::Deserialize;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn ctx() -> CallContext {
        CallContext::new("1")
    }

    #[tokio::test]
    async fn param_handler_receives_bound_arguments() {
        let tool = ToolBuilder::new("echo")
            .description("Echo text")
            .param(ParamSpec::required("text", ParamType::String))
            .handler(|args, _ctx| async move {
                Ok(args["text"].as_str().unwrap_or_default().to_string())
            });

        let result = tool.execute(args(json!({"text": "hi"})), ctx()).await;
        assert!(!result.is_error);
        assert_eq!(result.first_text(), Some("hi"));
    }

    #[tokio::test]
    async fn defaults_fill_missing_arguments() {
        let tool = ToolBuilder::new("pow")
            .param(ParamSpec::required("base", ParamType::Integer))
            .param(ParamSpec::optional("exp", ParamType::Integer, json!(2)))
            .handler(|args, _ctx| async move {
                let base = args["base"].as_i64().unwrap_or(0);
                let exp = args["exp"].as_i64().unwrap_or(0) as u32;
                Ok(base.pow(exp).to_string())
            });

        let result = tool.execute(args(json!({"base": 3})), ctx()).await;
        assert_eq!(result.first_text(), Some("9"));
    }

    #[tokio::test]
    async fn nullable_params_fill_with_null() {
        let tool = ToolBuilder::new("maybe")
            .param(ParamSpec::nullable("note", ParamType::String))
            .handler(|args, _ctx| async move {
                Ok(if args["note"].is_null() { "none" } else { "some" }.to_string())
            });

        let result = tool.execute(Map::new(), ctx()).await;
        assert_eq!(result.first_text(), Some("none"));
    }

    #[tokio::test]
    async fn missing_required_argument_is_handler_error() {
        let tool = ToolBuilder::new("echo")
            .param(ParamSpec::required("text", ParamType::String))
            .handler(|_args, _ctx| async move { Ok("unreachable".to_string()) });

        let result = tool.execute(Map::new(), ctx()).await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("Missing required argument: text"));
    }

    #[tokio::test]
    async fn string_arguments_coerce_to_declared_types() {
        let tool = ToolBuilder::new("add_one")
            .param(ParamSpec::required("n", ParamType::Integer))
            .handler(|args, _ctx| async move { Ok((args["n"].as_i64().unwrap() + 1).to_string()) });

        let result = tool.execute(args(json!({"n": "41"})), ctx()).await;
        assert_eq!(result.first_text(), Some("42"));
    }

    #[tokio::test]
    async fn handler_errors_become_is_error_results() {
        let tool = ToolBuilder::new("fail")
            .handler(|_args, _ctx| async move {
                Err::<String, _>(Error::handler("database unavailable"))
            });

        let result = tool.execute(Map::new(), ctx()).await;
        assert!(result.is_error);
        assert_eq!(result.first_text(), Some("database unavailable"));
    }

    #[tokio::test]
    async fn structural_returns_are_serialized_with_structured_content() {
        let tool = ToolBuilder::new("info")
            .handler(|_args, _ctx| async move { Ok(json!({"version": 1})) });

        let result = tool.execute(Map::new(), ctx()).await;
        assert_eq!(result.structured_content, Some(json!({"version": 1})));
        assert_eq!(result.first_text(), Some(r#"{"version":1}"#));
    }

    #[tokio::test]
    async fn content_block_lists_pass_through() {
        let tool = ToolBuilder::new("blocks").handler(|_args, _ctx| async move {
            Ok(vec![Content::text("a"), Content::text("b")])
        });

        let result = tool.execute(Map::new(), ctx()).await;
        assert_eq!(result.content.len(), 2);
    }

    #[tokio::test]
    async fn tool_result_passes_through_unchanged() {
        let tool = ToolBuilder::new("raw")
            .handler(|_args, _ctx| async move { Ok(ToolResult::error("soft failure")) });

        let result = tool.execute(Map::new(), ctx()).await;
        assert!(result.is_error);
    }

    #[test]
    fn context_param_absent_from_schema() {
        let tool = ToolBuilder::new("ctxful")
            .param(ParamSpec::required("q", ParamType::String))
            .context_param("ctx")
            .handler(|_args, _ctx| async move { Ok("ok".to_string()) });

        let schema = tool.input_schema();
        assert!(schema["properties"].get("ctx").is_none());
        assert!(schema["properties"].get("q").is_some());
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct AddInput {
        a: i64,
        b: i64,
    }

    #[tokio::test]
    async fn typed_handler_deserializes_input() {
        let tool = ToolBuilder::new("add")
            .description("Add two numbers")
            .typed_handler(|input: AddInput, _ctx| async move {
                Ok((input.a + input.b).to_string())
            });

        let result = tool.execute(args(json!({"a": 1, "b": 2})), ctx()).await;
        assert_eq!(result.first_text(), Some("3"));
    }

    #[tokio::test]
    async fn typed_handler_rejects_bad_input_as_handler_error() {
        let tool = ToolBuilder::new("add")
            .typed_handler(|input: AddInput, _ctx| async move {
                Ok((input.a + input.b).to_string())
            });

        let result = tool.execute(args(json!({"a": "x"})), ctx()).await;
        assert!(result.is_error);
    }

    #[test]
    fn call_context_state_is_per_call() {
        let ctx = CallContext::new("7").with_client_id("cli");
        ctx.set_state("k", json!(1));
        assert_eq!(ctx.get_state("k"), Some(json!(1)));
        assert_eq!(ctx.request_id(), "7");
        assert_eq!(ctx.client_id(), Some("cli"));

        let other = CallContext::new("8");
        assert!(other.get_state("k").is_none());
    }
}
