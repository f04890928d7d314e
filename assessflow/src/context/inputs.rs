//! Component inputs with strictness enforcement.

use crate::errors::UndeclaredDependencyError;
use std::collections::{HashMap, HashSet};

/// Provides an immutable view of prior component payloads.
///
/// In strict mode, accessing a component outside the declared
/// `depends_on` set raises an error.
#[derive(Debug, Clone, Default)]
pub struct ComponentInputs {
    /// Payloads of components that succeeded earlier in the execution.
    payloads: HashMap<String, serde_json::Value>,
    /// The declared dependencies of the reading component.
    declared_dependencies: HashSet<String>,
    /// The reading component (for error messages).
    component_name: String,
    /// Whether strict mode is enabled.
    strict: bool,
}

impl ComponentInputs {
    /// Creates strict inputs limited to the declared dependencies.
    #[must_use]
    pub fn strict(
        payloads: HashMap<String, serde_json::Value>,
        declared_dependencies: HashSet<String>,
        component_name: impl Into<String>,
    ) -> Self {
        Self {
            payloads,
            declared_dependencies,
            component_name: component_name.into(),
            strict: true,
        }
    }

    /// Creates permissive inputs (finishing components read everything).
    #[must_use]
    pub fn permissive(
        payloads: HashMap<String, serde_json::Value>,
        component_name: impl Into<String>,
    ) -> Self {
        Self {
            declared_dependencies: payloads.keys().cloned().collect(),
            payloads,
            component_name: component_name.into(),
            strict: false,
        }
    }

    /// Gets the payload produced by a component.
    ///
    /// Returns `Ok(None)` when the component is declared but produced no
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` in strict mode if the component
    /// is not a declared dependency.
    pub fn get(&self, component: &str) -> Result<Option<&serde_json::Value>, UndeclaredDependencyError> {
        if self.strict && !self.declared_dependencies.contains(component) {
            return Err(UndeclaredDependencyError::new(&self.component_name, component));
        }
        Ok(self.payloads.get(component))
    }

    /// Gets a top-level field from a component's payload.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` in strict mode if the component
    /// is not a declared dependency.
    pub fn get_field(
        &self,
        component: &str,
        key: &str,
    ) -> Result<Option<&serde_json::Value>, UndeclaredDependencyError> {
        Ok(self.get(component)?.and_then(|payload| payload.get(key)))
    }

    /// Checks if a payload exists for a component.
    #[must_use]
    pub fn contains(&self, component: &str) -> bool {
        self.payloads.contains_key(component)
    }

    /// Returns the names of components with payloads, sorted.
    #[must_use]
    pub fn components(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.payloads.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn declared_dependencies(&self) -> &HashSet<String> {
        &self.declared_dependencies
    }

    /// Returns whether strict mode is enabled.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }
}
