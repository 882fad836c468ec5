//! Prompt definition and builder API
//!
//! A prompt is a named generator producing conversation messages. Handlers
//! may return a single [`PromptMessage`], a list of messages, or a full
//! [`GetPromptResult`] carrying a description; [`IntoPromptResult`]
//! normalizes the shapes at one place.
//!
//! # Example
//!
//! ```rust
//! use beacon_mcp::prompt::PromptBuilder;
//! use beacon_mcp::protocol::PromptMessage;
//!
//! let greet = PromptBuilder::new("greet")
//!     .description("Greet someone")
//!     .required_arg("name", Some("Name to greet"))
//!     .handler(|args| async move {
//!         let name = args.get("name").map(String::as_str).unwrap_or("World");
//!         Ok(PromptMessage::user(format!("Say hello to {}.", name)))
//!     });
//! assert_eq!(greet.name, "greet");
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::protocol::{GetPromptResult, PromptArgumentDescriptor, PromptDescriptor, PromptMessage};
use crate::tool::BoxFuture;

/// Conversion of prompt handler return values into the wire result shape.
pub trait IntoPromptResult {
    fn into_prompt_result(self) -> GetPromptResult;
}

impl IntoPromptResult for GetPromptResult {
    fn into_prompt_result(self) -> GetPromptResult {
        self
    }
}

impl IntoPromptResult for PromptMessage {
    fn into_prompt_result(self) -> GetPromptResult {
        GetPromptResult {
            description: None,
            messages: vec![self],
        }
    }
}

impl IntoPromptResult for Vec<PromptMessage> {
    fn into_prompt_result(self) -> GetPromptResult {
        GetPromptResult {
            description: None,
            messages: self,
        }
    }
}

/// Prompt generator trait
pub trait PromptHandler: Send + Sync {
    fn generate(&self, args: HashMap<String, String>) -> BoxFuture<'_, Result<GetPromptResult>>;
}

struct FnPromptHandler<F> {
    handler: F,
}

impl<F, Fut, R> PromptHandler for FnPromptHandler<F>
where
    F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    R: IntoPromptResult + Send + 'static,
{
    fn generate(&self, args: HashMap<String, String>) -> BoxFuture<'_, Result<GetPromptResult>> {
        let fut = (self.handler)(args);
        Box::pin(async move { fut.await.map(IntoPromptResult::into_prompt_result) })
    }
}

/// One declared prompt argument.
#[derive(Debug, Clone)]
pub struct PromptArgument {
    pub name: String,
    pub required: bool,
    pub description: Option<String>,
}

/// A named message generator.
pub struct Prompt {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<PromptArgument>,
    handler: Arc<dyn PromptHandler>,
}

impl Clone for Prompt {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self.arguments.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

impl Prompt {
    pub fn builder(name: impl Into<String>) -> PromptBuilder {
        PromptBuilder::new(name)
    }

    /// The prompts/list entry for this prompt.
    pub fn descriptor(&self) -> PromptDescriptor {
        PromptDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            arguments: self
                .arguments
                .iter()
                .map(|a| PromptArgumentDescriptor {
                    name: a.name.clone(),
                    required: a.required,
                    description: a.description.clone(),
                })
                .collect(),
        }
    }

    /// Invoke the generator.
    pub async fn get(&self, args: HashMap<String, String>) -> Result<GetPromptResult> {
        self.handler.generate(args).await
    }
}

/// Builder for creating prompts with a fluent API
pub struct PromptBuilder {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgument>,
}

impl PromptBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a required argument.
    pub fn required_arg(mut self, name: impl Into<String>, description: Option<&str>) -> Self {
        self.arguments.push(PromptArgument {
            name: name.into(),
            required: true,
            description: description.map(str::to_string),
        });
        self
    }

    /// Declare an optional argument.
    pub fn optional_arg(mut self, name: impl Into<String>, description: Option<&str>) -> Self {
        self.arguments.push(PromptArgument {
            name: name.into(),
            required: false,
            description: description.map(str::to_string),
        });
        self
    }

    /// Finish with the generator. The handler receives the client's
    /// arguments map; return shapes are normalized via [`IntoPromptResult`].
    pub fn handler<F, Fut, R>(self, handler: F) -> Prompt
    where
        F: Fn(HashMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: IntoPromptResult + Send + 'static,
    {
        Prompt {
            name: self.name,
            description: self.description,
            arguments: self.arguments,
            handler: Arc::new(FnPromptHandler { handler }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Role;

    #[tokio::test]
    async fn single_message_return_normalizes() {
        let prompt = PromptBuilder::new("greet")
            .handler(|_args| async move { Ok(PromptMessage::user("hello")) });

        let result = prompt.get(HashMap::new()).await.unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].role, Role::User);
        assert!(result.description.is_none());
    }

    #[tokio::test]
    async fn message_list_return_normalizes() {
        let prompt = PromptBuilder::new("chat").handler(|_args| async move {
            Ok(vec![
                PromptMessage::user("question"),
                PromptMessage::assistant("answer"),
            ])
        });

        let result = prompt.get(HashMap::new()).await.unwrap();
        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn full_result_passes_through() {
        let prompt = PromptBuilder::new("doc").handler(|_args| async move {
            Ok(GetPromptResult {
                description: Some("annotated".to_string()),
                messages: vec![PromptMessage::user("body")],
            })
        });

        let result = prompt.get(HashMap::new()).await.unwrap();
        assert_eq!(result.description.as_deref(), Some("annotated"));
    }

    #[tokio::test]
    async fn arguments_reach_the_generator() {
        let prompt = PromptBuilder::new("greet")
            .required_arg("name", Some("Name to greet"))
            .handler(|args| async move {
                Ok(PromptMessage::user(format!(
                    "Hello {}",
                    args.get("name").map(String::as_str).unwrap_or("?")
                )))
            });

        let mut args = HashMap::new();
        args.insert("name".to_string(), "Ada".to_string());
        let result = prompt.get(args).await.unwrap();
        match &result.messages[0].content {
            crate::protocol::PromptContent::Single(crate::protocol::Content::Text { text }) => {
                assert_eq!(text, "Hello Ada");
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn descriptor_carries_argument_list() {
        let prompt = PromptBuilder::new("greet")
            .description("Greet someone")
            .required_arg("name", Some("Name to greet"))
            .optional_arg("tone", None)
            .handler(|_args| async move { Ok(PromptMessage::user("hi")) });

        let descriptor = prompt.descriptor();
        assert_eq!(descriptor.arguments.len(), 2);
        assert!(descriptor.arguments[0].required);
        assert!(!descriptor.arguments[1].required);
        assert_eq!(descriptor.arguments[1].description, None);
    }
}
