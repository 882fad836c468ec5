//! Resource definition and builder API
//!
//! Two kinds of readable data:
//!
//! 1. **Resources** - an exact URI bound to a zero-argument read function.
//! 2. **Resource templates** - a URI pattern with `{var}` placeholders;
//!    reads are served by matching a concrete URI against the pattern and
//!    passing the bound (and type-coerced) variables to the handler.
//!
//! Templates are consulted only when no exact resource matches, in
//! registration order.
//!
//! # Example
//!
//! ```rust
//! use beacon_mcp::resource::ResourceBuilder;
//!
//! let config = ResourceBuilder::new("config://app")
//!     .name("Configuration")
//!     .mime_type("application/json")
//!     .reader(|| async { Ok(serde_json::json!({"debug": false}).into()) });
//! assert_eq!(config.uri, "config://app");
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::protocol::{
    ReadResourceResult, ResourceContents, ResourceDescriptor, ResourceTemplateDescriptor,
};
use crate::schema::ParamSpec;
use crate::tool::BoxFuture;
use crate::uri_template::UriTemplate;

/// Value produced by a resource read, before envelope encoding.
///
/// Strings become `text` contents; structural values are JSON-serialized
/// into `text`; binary data becomes a base64 `blob`.
#[derive(Debug, Clone)]
pub enum ResourceValue {
    Text(String),
    Json(Value),
    Blob { data: Vec<u8>, mime_type: Option<String> },
}

impl From<String> for ResourceValue {
    fn from(s: String) -> Self {
        ResourceValue::Text(s)
    }
}

impl From<&str> for ResourceValue {
    fn from(s: &str) -> Self {
        ResourceValue::Text(s.to_string())
    }
}

impl From<Value> for ResourceValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => ResourceValue::Text(s),
            other => ResourceValue::Json(other),
        }
    }
}

impl From<Vec<u8>> for ResourceValue {
    fn from(data: Vec<u8>) -> Self {
        ResourceValue::Blob {
            data,
            mime_type: None,
        }
    }
}

impl ResourceValue {
    /// Encode into one resources/read contents entry for the given URI.
    pub(crate) fn into_contents(self, uri: &str, mime_type: Option<&str>) -> Result<ResourceContents> {
        Ok(match self {
            ResourceValue::Text(text) => ResourceContents {
                uri: uri.to_string(),
                mime_type: mime_type.map(str::to_string),
                text: Some(text),
                blob: None,
            },
            ResourceValue::Json(value) => ResourceContents {
                uri: uri.to_string(),
                mime_type: mime_type.map(str::to_string),
                text: Some(serde_json::to_string(&value)?),
                blob: None,
            },
            ResourceValue::Blob { data, mime_type: blob_mime } => ResourceContents {
                uri: uri.to_string(),
                mime_type: blob_mime.or_else(|| mime_type.map(str::to_string)),
                text: None,
                blob: Some(BASE64.encode(data)),
            },
        })
    }
}

/// Resource reader trait - a zero-argument read
pub trait ResourceReader: Send + Sync {
    fn read(&self) -> BoxFuture<'_, Result<ResourceValue>>;
}

struct FnReader<F> {
    reader: F,
}

impl<F, Fut> ResourceReader for FnReader<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResourceValue>> + Send + 'static,
{
    fn read(&self) -> BoxFuture<'_, Result<ResourceValue>> {
        Box::pin((self.reader)())
    }
}

/// A URI-addressed datum with a read function.
pub struct Resource {
    /// Exact URI, unique key within the registry.
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    reader: Arc<dyn ResourceReader>,
}

impl Clone for Resource {
    fn clone(&self) -> Self {
        Self {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            reader: self.reader.clone(),
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

impl Resource {
    pub fn builder(uri: impl Into<String>) -> ResourceBuilder {
        ResourceBuilder::new(uri)
    }

    /// The resources/list entry for this resource.
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            uri: self.uri.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    /// Read and encode into the result envelope.
    pub async fn read(&self) -> Result<ReadResourceResult> {
        let value = self.reader.read().await?;
        Ok(ReadResourceResult {
            contents: vec![value.into_contents(&self.uri, self.mime_type.as_deref())?],
        })
    }
}

/// Builder for creating resources with a fluent API
pub struct ResourceBuilder {
    uri: String,
    name: Option<String>,
    description: Option<String>,
    mime_type: Option<String>,
}

impl ResourceBuilder {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            description: None,
            mime_type: None,
        }
    }

    /// Set the resource name (defaults to the URI)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Finish with the read function.
    pub fn reader<F, Fut>(self, reader: F) -> Resource
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceValue>> + Send + 'static,
    {
        let name = self.name.unwrap_or_else(|| self.uri.clone());
        Resource {
            uri: self.uri,
            name,
            description: self.description,
            mime_type: self.mime_type,
            reader: Arc::new(FnReader { reader }),
        }
    }

    /// Finish with fixed text contents.
    pub fn text(self, text: impl Into<String>) -> Resource {
        let text = text.into();
        self.reader(move || {
            let text = text.clone();
            async move { Ok(ResourceValue::Text(text)) }
        })
    }
}

// =============================================================================
// Resource templates
// =============================================================================

/// Template handler trait - receives the bound URI variables
pub trait TemplateHandler: Send + Sync {
    fn read(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<ResourceValue>>;
}

struct FnTemplateHandler<F> {
    handler: F,
}

impl<F, Fut> TemplateHandler for FnTemplateHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ResourceValue>> + Send + 'static,
{
    fn read(&self, args: Map<String, Value>) -> BoxFuture<'_, Result<ResourceValue>> {
        Box::pin((self.handler)(args))
    }
}

/// A parameterized resource matched by URI pattern.
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
    params: Vec<ParamSpec>,
    template: UriTemplate,
    handler: Arc<dyn TemplateHandler>,
}

impl Clone for ResourceTemplate {
    fn clone(&self) -> Self {
        Self {
            uri_template: self.uri_template.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            params: self.params.clone(),
            template: self.template.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl std::fmt::Debug for ResourceTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTemplate")
            .field("uri_template", &self.uri_template)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ResourceTemplate {
    pub fn builder(uri_template: impl Into<String>) -> ResourceTemplateBuilder {
        ResourceTemplateBuilder::new(uri_template)
    }

    /// The resources/templates/list entry for this template.
    pub fn descriptor(&self) -> ResourceTemplateDescriptor {
        ResourceTemplateDescriptor {
            uri_template: self.uri_template.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    /// Match a concrete URI, returning the captured variables.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        self.template.matches(uri)
    }

    /// Read the resource at a matched URI.
    ///
    /// Captured variables are string-valued; each declared parameter is
    /// coerced to its type, defaults fill omitted optionals, and a missing
    /// required variable is an error.
    pub async fn read(
        &self,
        uri: &str,
        variables: HashMap<String, String>,
    ) -> Result<ReadResourceResult> {
        let args = self.bind_variables(variables)?;
        let value = self.handler.read(args).await?;
        Ok(ReadResourceResult {
            contents: vec![value.into_contents(uri, self.mime_type.as_deref())?],
        })
    }

    fn bind_variables(&self, variables: HashMap<String, String>) -> Result<Map<String, Value>> {
        let mut raw = Map::new();
        for (key, value) in variables {
            raw.insert(key, Value::String(value));
        }
        if self.params.is_empty() {
            return Ok(raw);
        }
        crate::tool::bind_arguments(&self.params, raw).map_err(crate::error::Error::Handler)
    }
}

/// Builder for creating resource templates
///
/// # Example
///
/// ```rust
/// use beacon_mcp::resource::ResourceTemplateBuilder;
/// use beacon_mcp::schema::{ParamSpec, ParamType};
/// use serde_json::json;
///
/// let users = ResourceTemplateBuilder::new("users://{id}")
///     .name("User records")
///     .param(ParamSpec::required("id", ParamType::Integer))
///     .handler(|args| async move {
///         let id = args["id"].as_i64().unwrap_or(0);
///         Ok(json!({"id": id, "name": format!("User {}", id)}).into())
///     });
/// assert!(users.matches("users://42").is_some());
/// ```
pub struct ResourceTemplateBuilder {
    uri_template: String,
    name: Option<String>,
    description: Option<String>,
    mime_type: Option<String>,
    params: Vec<ParamSpec>,
}

impl ResourceTemplateBuilder {
    pub fn new(uri_template: impl Into<String>) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: None,
            description: None,
            mime_type: None,
            params: Vec::new(),
        }
    }

    /// Set the template name (defaults to the URI template)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Declare a variable's type for coercion and defaults.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Finish with the read handler.
    pub fn handler<F, Fut>(self, handler: F) -> ResourceTemplate
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ResourceValue>> + Send + 'static,
    {
        let template = UriTemplate::parse(&self.uri_template);
        let name = self.name.unwrap_or_else(|| self.uri_template.clone());
        ResourceTemplate {
            uri_template: self.uri_template,
            name,
            description: self.description,
            mime_type: self.mime_type,
            params: self.params,
            template,
            handler: Arc::new(FnTemplateHandler { handler }),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ParamType;
    use serde_json::json;

    #[tokio::test]
    async fn text_resource_reads_as_text_contents() {
        let resource = ResourceBuilder::new("file:///readme")
            .name("README")
            .mime_type("text/plain")
            .text("# Hello");

        let result = resource.read().await.unwrap();
        assert_eq!(result.contents.len(), 1);
        let contents = &result.contents[0];
        assert_eq!(contents.uri, "file:///readme");
        assert_eq!(contents.text.as_deref(), Some("# Hello"));
        assert_eq!(contents.mime_type.as_deref(), Some("text/plain"));
        assert!(contents.blob.is_none());
    }

    #[tokio::test]
    async fn structural_values_serialize_to_text() {
        let resource = ResourceBuilder::new("config://app")
            .reader(|| async { Ok(json!({"debug": true}).into()) });

        let result = resource.read().await.unwrap();
        let text = result.contents[0].text.as_deref().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"debug": true}));
    }

    #[tokio::test]
    async fn binary_values_encode_as_base64_blob() {
        let resource = ResourceBuilder::new("img://logo")
            .reader(|| async {
                Ok(ResourceValue::Blob {
                    data: vec![1, 2, 3],
                    mime_type: Some("image/png".to_string()),
                })
            });

        let result = resource.read().await.unwrap();
        let contents = &result.contents[0];
        assert!(contents.text.is_none());
        assert_eq!(contents.blob.as_deref(), Some("AQID"));
        assert_eq!(contents.mime_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn template_binds_and_coerces_variables() {
        let template = ResourceTemplateBuilder::new("users://{id}")
            .param(ParamSpec::required("id", ParamType::Integer))
            .handler(|args| async move {
                let id = args["id"].as_i64().unwrap();
                Ok(json!({"id": id, "name": format!("User {}", id)}).into())
            });

        let vars = template.matches("users://42").unwrap();
        let result = template.read("users://42", vars).await.unwrap();
        let text = result.contents[0].text.as_deref().unwrap();
        let parsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(parsed, json!({"id": 42, "name": "User 42"}));
    }

    #[tokio::test]
    async fn template_without_params_passes_strings() {
        let template = ResourceTemplateBuilder::new("notes://{slug}")
            .handler(|args| async move {
                Ok(format!("note: {}", args["slug"].as_str().unwrap()).into())
            });

        let vars = template.matches("notes://today").unwrap();
        let result = template.read("notes://today", vars).await.unwrap();
        assert_eq!(result.contents[0].text.as_deref(), Some("note: today"));
    }

    #[test]
    fn template_mismatch_returns_none() {
        let template = ResourceTemplateBuilder::new("users://{id}")
            .handler(|_| async move { Ok("".into()) });
        assert!(template.matches("posts://42").is_none());
    }

    #[test]
    fn descriptors_expose_metadata() {
        let template = ResourceTemplateBuilder::new("users://{id}")
            .name("Users")
            .description("User records")
            .mime_type("application/json")
            .handler(|_| async move { Ok("".into()) });

        let descriptor = template.descriptor();
        assert_eq!(descriptor.uri_template, "users://{id}");
        assert_eq!(descriptor.name, "Users");
        assert_eq!(descriptor.description.as_deref(), Some("User records"));
    }
}
