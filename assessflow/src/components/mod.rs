//! Component trait, registry and runner.
//!
//! Components are the opaque units of work of an assessment: each wraps
//! one external API call (performance audit, screenshot capture, vision
//! review...). The engine only knows their name and their descriptor.

mod registry;
mod runner;

pub use registry::ComponentRegistry;
pub use runner::ComponentRunner;

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

use crate::context::ComponentContext;
use crate::core::ComponentOutput;
use crate::errors::ComponentError;

/// Trait for assessment components.
///
/// Implementations should classify failures: [`ComponentError::transient`]
/// for anything a retry may fix, [`ComponentError::permanent`] otherwise.
#[async_trait]
pub trait Component: Send + Sync + Debug {
    /// Returns the name of the component.
    fn name(&self) -> &str;

    /// Performs one attempt.
    async fn invoke(&self, ctx: &ComponentContext) -> Result<ComponentOutput, ComponentError>;
}

/// An async function-based component.
pub struct AsyncFnComponent<F, Fut>
where
    F: Fn(ComponentContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ComponentOutput, ComponentError>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnComponent<F, Fut>
where
    F: Fn(ComponentContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ComponentOutput, ComponentError>> + Send,
{
    /// Creates a new async function-based component.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnComponent<F, Fut>
where
    F: Fn(ComponentContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ComponentOutput, ComponentError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnComponent")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> Component for AsyncFnComponent<F, Fut>
where
    F: Fn(ComponentContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ComponentOutput, ComponentError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: &ComponentContext) -> Result<ComponentOutput, ComponentError> {
        (self.func)(ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ComponentInputs, SubjectContext};
    use crate::core::{ExecutionId, SubjectId};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_async_fn_component() {
        let component = AsyncFnComponent::new("echo", |ctx: ComponentContext| async move {
            let website = ctx.subject().get_str("website").map(str::to_string);
            Ok::<_, ComponentError>(ComponentOutput::new(json!({ "website": website, "attempt": ctx.attempt() })))
        });

        let subject = SubjectContext::new(SubjectId::from("lead-1")).with_field("website", json!("https://a.io"));
        let ctx = ComponentContext::new(ExecutionId::new(), Arc::new(subject), ComponentInputs::default());

        assert_eq!(component.name(), "echo");
        let output = component.invoke(&ctx).await.unwrap();
        assert_eq!(output.payload, json!({"website": "https://a.io", "attempt": 1}));
        assert!(format!("{component:?}").contains("echo"));
    }
}
