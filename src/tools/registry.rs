//! Name-indexed tool registry shared by sessions.

use std::sync::Arc;

use crate::error::GlimpseError;
use crate::provider::ToolDefinition;

use super::tool::Tool;

/// Immutable set of tools.
///
/// Cloning is cheap; registering a tool on a clone leaves every other clone
/// untouched, so a registry handed to running sessions never changes under
/// them.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<Vec<Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), GlimpseError> {
        if self.get(tool.name()).is_some() {
            return Err(GlimpseError::InvalidArgument(format!(
                "tool '{}' is already registered",
                tool.name()
            )));
        }
        Arc::make_mut(&mut self.tools).push(tool);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, tool: impl Tool + 'static) -> Result<Self, GlimpseError> {
        self.register(Arc::new(tool))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    /// Definitions sent to providers, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FnTool, ToolParameters};

    fn noop(name: &str) -> FnTool {
        FnTool::new(name, "does nothing", ToolParameters::empty(), |_, _| async {
            Ok(serde_json::Value::Null)
        })
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(noop("calc"))).unwrap();
        assert!(registry.register(Arc::new(noop("calc"))).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clones_are_isolated() {
        let base = ToolRegistry::new().with(noop("a")).unwrap();
        let mut extended = base.clone();
        extended.register(Arc::new(noop("b"))).unwrap();
        assert_eq!(base.names().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(extended.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(extended.definitions()[1].name, "b");
    }
}
