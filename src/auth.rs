//! Authentication and authorization for MCP servers
//!
//! Two seams:
//!
//! - [`AuthProvider`] turns transport credentials ([`AuthRequest`]) into an
//!   [`AuthResult`]. Providers may perform I/O (token introspection, database
//!   lookup); the dispatcher awaits them once per request, skipping the
//!   public methods (`initialize`, `initialized`, `ping`).
//! - Per-component *authorization predicates* (`Fn(&AuthorizationContext) ->
//!   bool`) gate both discovery (the list methods) and invocation of a single
//!   registered tool, resource, template, or prompt.
//!
//! # Example
//!
//! ```rust
//! use beacon_mcp::auth::{AuthProvider, AuthRequest, AuthResult, AuthenticatedUser};
//!
//! struct HeaderProvider;
//!
//! #[async_trait::async_trait]
//! impl AuthProvider for HeaderProvider {
//!     async fn authenticate(&self, request: &AuthRequest) -> AuthResult {
//!         match request.token() {
//!             Some(token) if token == "sk-valid" => {
//!                 AuthResult::success(AuthenticatedUser::new("user-1"))
//!             }
//!             Some(_) => AuthResult::failed("Invalid token"),
//!             None => AuthResult::Unauthenticated,
//!         }
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An authenticated caller. Lower `level` values are more privileged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Access level; lower is more privileged.
    pub level: i32,
    /// Scope patterns like `"tools:echo"`, `"tools:*"`, `"*:*"`. An empty
    /// set means no scope restrictions apply.
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub scopes: HashSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Free-form provider-specific data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl AuthenticatedUser {
    /// Create a user with the default (least privileged) level and no scopes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            email: None,
            level: 100,
            scopes: HashSet::new(),
            workspace: None,
            extra: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Scope check: the user holds `required` when their scopes contain
    /// `*:*`, contain `required` exactly, or contain `"<category>:*"` for a
    /// `required` of the form `"category:action"`.
    pub fn has_scope(&self, required: &str) -> bool {
        if self.scopes.contains("*:*") || self.scopes.contains(required) {
            return true;
        }
        match required.split_once(':') {
            Some((category, _)) => self.scopes.contains(&format!("{}:*", category)),
            None => false,
        }
    }

    /// Level check: `true` when `level <= required`.
    pub fn has_level(&self, required: i32) -> bool {
        self.level <= required
    }
}

/// Credential-carrying facade over any transport.
///
/// Header names are normalized to lowercase on insertion and lookup.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    body: Option<Vec<u8>>,
    /// Transport-specific extras (e.g. a peer identity).
    pub extra: Map<String, Value>,
}

impl AuthRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Header lookup, case-insensitive on the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Token part of an `authorization` header whose value begins
    /// (case-insensitively) with `bearer `.
    pub fn bearer_token(&self) -> Option<String> {
        let value = self.header("authorization")?.trim();
        let scheme = value.get(..7)?;
        if scheme.eq_ignore_ascii_case("bearer ") {
            Some(value[7..].trim().to_string()).filter(|t| !t.is_empty())
        } else {
            None
        }
    }

    /// Value of the `x-api-token` header.
    pub fn api_token(&self) -> Option<String> {
        self.header("x-api-token").map(str::to_string)
    }

    /// Value of the given query parameter (conventionally `"key"`).
    pub fn query_token(&self, param: &str) -> Option<String> {
        self.query_param(param).map(str::to_string)
    }

    /// First non-empty of API token, bearer token, and `key` query
    /// parameter, in that precedence order. An empty value at one step
    /// falls through to the next.
    pub fn token(&self) -> Option<String> {
        self.api_token()
            .filter(|t| !t.is_empty())
            .or_else(|| self.bearer_token())
            .or_else(|| self.query_token("key").filter(|t| !t.is_empty()))
    }
}

/// Outcome of an authentication attempt.
#[derive(Debug, Clone)]
pub enum AuthResult {
    /// Credentials were valid; the workspace overrides the user's own when
    /// present.
    Success {
        user: AuthenticatedUser,
        workspace: Option<String>,
    },
    /// Credentials were presented and rejected.
    Failed { reason: String },
    /// No credentials were presented.
    Unauthenticated,
}

impl AuthResult {
    pub fn success(user: AuthenticatedUser) -> Self {
        AuthResult::Success {
            user,
            workspace: None,
        }
    }

    pub fn success_in_workspace(user: AuthenticatedUser, workspace: impl Into<String>) -> Self {
        AuthResult::Success {
            user,
            workspace: Some(workspace.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        AuthResult::Failed {
            reason: reason.into(),
        }
    }
}

/// Pluggable credential validation.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> AuthResult;
}

/// Category of a registered component, as seen by predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Tool,
    Resource,
    Prompt,
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentType::Tool => write!(f, "tool"),
            ComponentType::Resource => write!(f, "resource"),
            ComponentType::Prompt => write!(f, "prompt"),
        }
    }
}

/// Action being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthAction {
    Call,
    Read,
    Get,
}

/// Everything a predicate sees when deciding visibility or invocation.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    pub user: AuthenticatedUser,
    pub component_type: ComponentType,
    pub component_name: String,
    pub action: AuthAction,
    pub arguments: Map<String, Value>,
    pub workspace: Option<String>,
}

/// A pure boolean function gating a single registered component.
pub type AuthPredicate = Arc<dyn Fn(&AuthorizationContext) -> bool + Send + Sync>;

/// In-memory token provider mapping opaque tokens to users.
///
/// Useful for tests and small deployments; production providers validate
/// against external systems.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, AuthenticatedUser>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, user: AuthenticatedUser) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn authenticate(&self, request: &AuthRequest) -> AuthResult {
        match request.token() {
            Some(token) => match self.tokens.get(&token) {
                Some(user) => AuthResult::success(user.clone()),
                None => AuthResult::failed("Invalid token"),
            },
            None => AuthResult::Unauthenticated,
        }
    }
}
