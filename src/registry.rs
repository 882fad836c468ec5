//! Component registry
//!
//! Holds the named tools, URI-keyed resources, URI-template resources, and
//! named prompts, each with an optional authorization predicate. Components
//! are registered at server construction, live for the process lifetime, and
//! are read-only thereafter; registering a name (or URI) twice replaces the
//! earlier entry.
//!
//! Registration order is preserved: resource templates are matched in the
//! order they were added.

use std::sync::Arc;

use crate::auth::AuthPredicate;
use crate::prompt::Prompt;
use crate::resource::{Resource, ResourceTemplate};
use crate::tool::Tool;

/// A component plus its optional authorization predicate.
pub struct Registered<T> {
    pub component: Arc<T>,
    pub predicate: Option<AuthPredicate>,
}

impl<T> Clone for Registered<T> {
    fn clone(&self) -> Self {
        Self {
            component: self.component.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Registered<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registered")
            .field("component", &self.component)
            .field("guarded", &self.predicate.is_some())
            .finish()
    }
}

/// Registry of callable components.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    tools: Vec<Registered<Tool>>,
    resources: Vec<Registered<Resource>>,
    templates: Vec<Registered<ResourceTemplate>>,
    prompts: Vec<Registered<Prompt>>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("tools", &self.tools.len())
            .field("resources", &self.resources.len())
            .field("templates", &self.templates.len())
            .field("prompts", &self.prompts.len())
            .finish()
    }
}

fn upsert<T>(entries: &mut Vec<Registered<T>>, key: impl Fn(&T) -> &str, entry: Registered<T>) {
    let name = key(entry.component.as_ref()).to_string();
    match entries
        .iter_mut()
        .find(|e| key(e.component.as_ref()) == name)
    {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tool(&mut self, tool: Tool, predicate: Option<AuthPredicate>) {
        upsert(
            &mut self.tools,
            |t| &t.name,
            Registered {
                component: Arc::new(tool),
                predicate,
            },
        );
    }

    pub fn add_resource(&mut self, resource: Resource, predicate: Option<AuthPredicate>) {
        upsert(
            &mut self.resources,
            |r| &r.uri,
            Registered {
                component: Arc::new(resource),
                predicate,
            },
        );
    }

    pub fn add_resource_template(
        &mut self,
        template: ResourceTemplate,
        predicate: Option<AuthPredicate>,
    ) {
        upsert(
            &mut self.templates,
            |t| &t.uri_template,
            Registered {
                component: Arc::new(template),
                predicate,
            },
        );
    }

    pub fn add_prompt(&mut self, prompt: Prompt, predicate: Option<AuthPredicate>) {
        upsert(
            &mut self.prompts,
            |p| &p.name,
            Registered {
                component: Arc::new(prompt),
                predicate,
            },
        );
    }

    pub fn tools(&self) -> &[Registered<Tool>] {
        &self.tools
    }

    pub fn resources(&self) -> &[Registered<Resource>] {
        &self.resources
    }

    pub fn resource_templates(&self) -> &[Registered<ResourceTemplate>] {
        &self.templates
    }

    pub fn prompts(&self) -> &[Registered<Prompt>] {
        &self.prompts
    }

    pub fn get_tool(&self, name: &str) -> Option<&Registered<Tool>> {
        self.tools.iter().find(|t| t.component.name == name)
    }

    pub fn get_resource(&self, uri: &str) -> Option<&Registered<Resource>> {
        self.resources.iter().find(|r| r.component.uri == uri)
    }

    pub fn get_prompt(&self, name: &str) -> Option<&Registered<Prompt>> {
        self.prompts.iter().find(|p| p.component.name == name)
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Resources and resource templates share the `resources` capability.
    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty() || !self.templates.is_empty()
    }

    pub fn has_prompts(&self) -> bool {
        !self.prompts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolBuilder;

    fn make_tool(name: &str, description: &str) -> Tool {
        ToolBuilder::new(name)
            .description(description)
            .handler(|_args, _ctx| async move { Ok("ok".to_string()) })
    }

    #[test]
    fn registration_preserves_order() {
        let mut registry = ComponentRegistry::new();
        registry.add_tool(make_tool("b", ""), None);
        registry.add_tool(make_tool("a", ""), None);

        let names: Vec<&str> = registry
            .tools()
            .iter()
            .map(|t| t.component.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn same_name_replaces_in_place() {
        let mut registry = ComponentRegistry::new();
        registry.add_tool(make_tool("echo", "v1"), None);
        registry.add_tool(make_tool("echo", "v2"), None);

        assert_eq!(registry.tools().len(), 1);
        assert_eq!(registry.get_tool("echo").unwrap().component.description, "v2");
    }

    #[test]
    fn predicates_travel_with_components() {
        let mut registry = ComponentRegistry::new();
        registry.add_tool(make_tool("open", ""), None);
        registry.add_tool(make_tool("guarded", ""), Some(Arc::new(|_ctx| false)));

        assert!(registry.get_tool("open").unwrap().predicate.is_none());
        assert!(registry.get_tool("guarded").unwrap().predicate.is_some());
    }

    #[test]
    fn capability_flags_follow_contents() {
        let mut registry = ComponentRegistry::new();
        assert!(!registry.has_tools());
        assert!(!registry.has_resources());

        registry.add_resource_template(
            crate::resource::ResourceTemplateBuilder::new("users://{id}")
                .handler(|_| async move { Ok("".into()) }),
            None,
        );
        assert!(registry.has_resources());
    }
}
