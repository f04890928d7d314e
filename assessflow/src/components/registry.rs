//! Registry of component implementations keyed by name.

use std::collections::HashMap;
use std::sync::Arc;

use super::Component;
use crate::pipeline::PipelineSpec;

/// Maps descriptor names to component implementations.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component under its own name, returning any replaced one.
    pub fn register(&mut self, component: Arc<dyn Component>) -> Option<Arc<dyn Component>> {
        self.components.insert(component.name().to_string(), component)
    }

    /// Registers a component (builder form).
    #[must_use]
    pub fn with_component(mut self, component: Arc<dyn Component>) -> Self {
        self.register(component);
        self
    }

    /// Looks up a component.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).cloned()
    }

    /// Returns true if a component is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.components.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns descriptor names in `spec` with no registered implementation.
    #[must_use]
    pub fn missing_for(&self, spec: &PipelineSpec) -> Vec<String> {
        spec.all_descriptors()
            .filter(|d| !self.contains(&d.name))
            .map(|d| d.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ComponentDescriptor, PipelineBuilder};
    use crate::testing::SucceedingComponent;
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.is_empty());

        let replaced = registry.register(Arc::new(SucceedingComponent::new("pagespeed", json!({}))));
        assert!(replaced.is_none());
        let replaced = registry.register(Arc::new(SucceedingComponent::new("pagespeed", json!({"v": 2}))));
        assert!(replaced.is_some());

        assert_eq!(registry.len(), 1);
        assert!(registry.get("pagespeed").is_some());
        assert!(registry.get("ghost").is_none());
    }

    #[test]
    fn test_missing_for() {
        let registry = ComponentRegistry::new()
            .with_component(Arc::new(SucceedingComponent::new("a", json!(null))));
        let spec = PipelineBuilder::new("test")
            .component(ComponentDescriptor::new("a"))
            .finishing(ComponentDescriptor::new("b"))
            .build()
            .unwrap();

        assert_eq!(registry.missing_for(&spec), vec!["b".to_string()]);
        assert_eq!(registry.names(), vec!["a"]);
    }
}
